use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

pub const API_KEY_ENV: &str = "EXCHANGE_RATE_API_KEY";

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("org", "fxtally", "fxtally").context("Could not determine project directories")
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CurrencyApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for CurrencyApiConfig {
    fn default() -> Self {
        CurrencyApiConfig {
            base_url: "https://v6.exchangerate-api.com/v6".to_string(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl CurrencyApiConfig {
    /// The configured key, else the `EXCHANGE_RATE_API_KEY` environment variable.
    pub fn api_key(&self) -> String {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .unwrap_or_default()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_hours: u64,
    pub tick_timeout_secs: u64,
    pub retries: usize,
    pub retry_delay_ms: u64,
    pub retention_days: Option<u64>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            interval_hours: 24,
            tick_timeout_secs: 30,
            retries: 2,
            retry_delay_ms: 500,
            retention_days: None,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours.max(1) * 3600)
    }

    pub fn tick_timeout(&self) -> Duration {
        Duration::from_secs(self.tick_timeout_secs)
    }

    pub fn retention(&self) -> Option<chrono::Duration> {
        self.retention_days
            .and_then(|days| i64::try_from(days).ok())
            .map(chrono::Duration::days)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub persist: bool,
    pub data_path: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            persist: true,
            data_path: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub currency_api: CurrencyApiConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub ledger_path: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.store.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        Ok(project_dirs()?.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        // A relative ledger path is relative to the config file
        let ledger = PathBuf::from(&config.ledger_path);
        if ledger.is_relative() {
            if let Some(parent) = path.as_ref().parent() {
                config.ledger_path = parent.join(ledger).to_string_lossy().into_owned();
            }
        }
        debug!("Successfully loaded config");
        Ok(config)
    }
}
