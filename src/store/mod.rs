pub mod disk;
pub mod ledger_file;
pub mod memory;

use crate::core::config::AppConfig;
use crate::core::rates::RateStore;
use anyhow::{Context, Result};
use disk::DiskRateStore;
use memory::MemoryRateStore;
use std::sync::Arc;
use tracing::debug;

pub use ledger_file::FileLedger;

/// Opens the configured rate store: fjall under the data path, or in memory.
pub fn open_rate_store(config: &AppConfig) -> Result<Arc<dyn RateStore>> {
    if !config.store.persist {
        debug!("Using in-memory rate store");
        return Ok(Arc::new(MemoryRateStore::new()));
    }
    let path = config.default_data_path()?.join("rates");
    let store = DiskRateStore::open(&path)
        .with_context(|| format!("Failed to open rate store at {}", path.display()))?;
    Ok(Arc::new(store))
}
