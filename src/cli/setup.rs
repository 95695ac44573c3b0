use crate::core::config::AppConfig;
use anyhow::{Context, Result};
use std::path::Path;

const EXAMPLE_CONFIG: &str = include_str!("../../docs/example_config.yaml");
const EXAMPLE_LEDGER: &str = include_str!("../../docs/example_ledger.yaml");

/// Creates a default configuration file with example content at the default location
pub fn setup() -> Result<()> {
    let path = AppConfig::default_config_path()?;
    setup_at_path(path)
}

/// Creates a default configuration file at the specified path, plus an example
/// ledger next to it when none exists yet.
pub fn setup_at_path<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    std::fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;
    tracing::info!("Created default configuration at {}", path.display());

    let ledger_path = path.with_file_name("ledger.yaml");
    if !ledger_path.exists() {
        std::fs::write(&ledger_path, EXAMPLE_LEDGER).with_context(|| {
            format!("Failed to write ledger file to {}", ledger_path.display())
        })?;
        tracing::info!("Created example ledger at {}", ledger_path.display());
    }
    Ok(())
}
