use crate::core::export::RecordExporter;
use crate::core::ledger::{DateRange, UserId};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Writes the CSV to `output`, or to stdout when no file is given.
pub async fn run(
    exporter: &RecordExporter,
    user_id: UserId,
    range: DateRange,
    output: Option<&Path>,
) -> Result<()> {
    let bytes = exporter
        .export_records_csv(user_id, range)
        .await
        .with_context(|| format!("Failed to export records for user {user_id}"))?;

    match output {
        Some(path) => {
            std::fs::write(path, &bytes)
                .with_context(|| format!("Failed to write export to {}", path.display()))?;
            info!(path = %path.display(), bytes = bytes.len(), "Wrote export");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&bytes)
                .context("Failed to write export to stdout")?;
            stdout.flush()?;
        }
    }
    Ok(())
}
