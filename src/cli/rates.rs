use super::ui;
use crate::core::conversion::{ConversionEngine, ResolutionPath, ResolvedRate};
use crate::core::currency::{Currency, ExchangeRate};
use crate::core::rates::RateStore;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use comfy_table::{Cell, CellAlignment};

fn describe_path(path: &ResolutionPath) -> String {
    match path {
        ResolutionPath::AtOrBefore { fetched_at } => {
            format!("snapshot from {}", fetched_at.format("%Y-%m-%d %H:%M UTC"))
        }
        ResolutionPath::After { fetched_at } => format!(
            "later snapshot from {}",
            fetched_at.format("%Y-%m-%d %H:%M UTC")
        ),
        ResolutionPath::Fallback => "static fallback".to_string(),
        ResolutionPath::Identity => "same currency".to_string(),
    }
}

pub fn display_rate(
    from: Currency,
    to: Currency,
    on: NaiveDate,
    resolved: Option<&ResolvedRate>,
    history: &[ExchangeRate],
) -> String {
    let headline = match resolved {
        Some(r) => format!(
            "1 {from} = {:.6} {to} on {on} ({})",
            r.rate,
            describe_path(&r.path)
        ),
        None => ui::style_text(
            &format!("No rate available for {from}->{to} on {on}"),
            ui::StyleType::Error,
        ),
    };

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Id"),
        ui::header_cell("Fetched at"),
        ui::header_cell("Rate"),
        ui::header_cell("Source"),
    ]);
    for row in history.iter().rev() {
        table.add_row(vec![
            Cell::new(row.id),
            Cell::new(row.fetched_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(format!("{:.6}", row.rate)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:?}", row.source)),
        ]);
    }

    format!(
        "{}\n\n{}\n\n{}\n{}",
        ui::style_text(&format!("{from} -> {to}"), ui::StyleType::Title),
        headline,
        ui::style_text("Stored snapshots", ui::StyleType::Subtle),
        table
    )
}

pub async fn run(
    engine: &ConversionEngine,
    store: &dyn RateStore,
    from: Currency,
    to: Currency,
    on: NaiveDate,
) -> Result<()> {
    let resolved = engine
        .resolve(from, to, on)
        .await
        .with_context(|| format!("Failed to resolve {from}->{to}"))?;
    let history = store
        .history(from, to)
        .await
        .with_context(|| format!("Failed to read history for {from}->{to}"))?;
    println!(
        "{}",
        display_rate(from, to, on, resolved.as_ref(), &history)
    );
    ui::print_separator();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::RateSource;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_display_rate_with_history() {
        let fetched_at = Utc.with_ymd_and_hms(2025, 1, 2, 6, 0, 0).unwrap();
        let history = vec![ExchangeRate {
            id: 4,
            from_currency: Currency::Eur,
            to_currency: Currency::Mkd,
            rate: 61.55,
            source: RateSource::Live,
            fetched_at,
            created_at: fetched_at,
        }];
        let resolved = ResolvedRate {
            rate: 61.55,
            path: ResolutionPath::AtOrBefore { fetched_at },
        };
        let output = console::strip_ansi_codes(&display_rate(
            Currency::Eur,
            Currency::Mkd,
            "2025-01-03".parse().unwrap(),
            Some(&resolved),
            &history,
        ))
        .to_string();
        assert!(output.contains("1 EUR = 61.550000 MKD on 2025-01-03 (snapshot from 2025-01-02 06:00 UTC)"));
        assert!(output.contains("2025-01-02 06:00:00"));
    }

    #[test]
    fn test_display_missing_rate() {
        let output = console::strip_ansi_codes(&display_rate(
            Currency::Aud,
            Currency::Chf,
            "2025-01-03".parse().unwrap(),
            None,
            &[],
        ))
        .to_string();
        assert!(output.contains("No rate available for AUD->CHF on 2025-01-03"));
    }
}
