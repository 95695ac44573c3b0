use super::ui;
use crate::core::currency::Currency;
use crate::scheduler::{RateRefreshJob, RefreshReport};
use anyhow::{Context, Result};
use comfy_table::{Cell, CellAlignment, Color};
use tracing::info;

impl RefreshReport {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Base"),
            ui::header_cell("Rows stored"),
            ui::header_cell("Status"),
        ]);
        for (base, rows) in &self.stored {
            table.add_row(vec![
                Cell::new(base.code()),
                Cell::new(rows).set_alignment(CellAlignment::Right),
                Cell::new("ok").fg(Color::Green),
            ]);
        }
        for (base, error) in &self.failed {
            table.add_row(vec![
                Cell::new(base.code()),
                ui::format_optional_cell(None::<usize>, |n| n.to_string()),
                Cell::new(error).fg(Color::Red),
            ]);
        }
        format!(
            "{}\n\n{}\n\nTotal rows stored: {}",
            ui::style_text("Rate refresh", ui::StyleType::Title),
            table,
            self.total_rows()
        )
    }
}

/// One scheduled pass over all bases with a progress bar.
pub async fn run(job: &RateRefreshJob) -> Result<()> {
    let pb = ui::new_progress_bar(Currency::ALL.len() as u64, true);
    pb.set_message("Fetching rates...");
    let report = job
        .tick_with(|base| {
            pb.set_message(format!("Fetched {base} rates"));
            pb.inc(1);
        })
        .await;
    pb.finish_and_clear();

    println!("{}", report.display_as_table());
    if report.stored.is_empty() {
        anyhow::bail!("No base currency could be refreshed");
    }
    Ok(())
}

/// Runs the scheduler until Ctrl-C.
pub async fn watch(job: RateRefreshJob) -> Result<()> {
    let handle = job.start();
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");
    handle.stop().await;
    Ok(())
}
