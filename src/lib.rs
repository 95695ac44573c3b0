pub mod cli;
pub mod core;
pub mod providers;
pub mod scheduler;
pub mod store;

use crate::core::aggregation::{Aggregator, StatisticsQuery, SummaryQuery};
use crate::core::config::AppConfig;
use crate::core::conversion::ConversionEngine;
use crate::core::currency::Currency;
use crate::core::export::RecordExporter;
use crate::core::fallback::FallbackRates;
use crate::core::ledger::{DateRange, UserId};
use crate::core::rates::RateStore;
use crate::providers::ExchangeRateApiProvider;
use crate::scheduler::{RateRefreshJob, RefreshSettings};
use crate::store::{FileLedger, open_rate_store};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub enum AppCommand {
    Refresh,
    Watch,
    Stats {
        user_id: UserId,
        query: StatisticsQuery,
    },
    Summary {
        user_id: UserId,
        query: SummaryQuery,
    },
    Export {
        user_id: UserId,
        range: DateRange,
        output: Option<PathBuf>,
    },
    Rates {
        from: Currency,
        to: Currency,
        on: NaiveDate,
    },
}

struct App {
    config: AppConfig,
    store: Arc<dyn RateStore>,
}

impl App {
    async fn init(config: AppConfig) -> Result<Self> {
        let store = open_rate_store(&config)?;
        let seeded = store
            .seed_fallback_rates(FallbackRates::standard(), Utc::now())
            .await
            .context("Failed to seed fallback rates")?;
        if seeded > 0 {
            info!(rows = seeded, "Seeded fallback rates");
        }
        Ok(Self { config, store })
    }

    fn refresh_job(&self) -> Result<RateRefreshJob> {
        let api = &self.config.currency_api;
        let provider = ExchangeRateApiProvider::new(&api.base_url, &api.api_key(), api.timeout())?;
        Ok(RateRefreshJob::new(
            Arc::new(provider),
            Arc::clone(&self.store),
            RefreshSettings::from(&self.config.refresh),
        ))
    }

    fn ledger(&self) -> Result<Arc<FileLedger>> {
        Ok(Arc::new(FileLedger::load(&self.config.ledger_path)?))
    }

    fn engine(&self) -> ConversionEngine {
        ConversionEngine::new(Arc::clone(&self.store))
    }

    fn aggregator(&self) -> Result<Aggregator> {
        let ledger = self.ledger()?;
        Ok(Aggregator::new(ledger.clone(), ledger, self.engine()))
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!(ledger = %config.ledger_path, persist = config.store.persist, "Loaded config");

    let app = App::init(config).await?;
    match command {
        AppCommand::Refresh => cli::refresh::run(&app.refresh_job()?).await,
        AppCommand::Watch => cli::refresh::watch(app.refresh_job()?).await,
        AppCommand::Stats { user_id, query } => {
            cli::stats::run(&app.aggregator()?, user_id, &query).await
        }
        AppCommand::Summary { user_id, query } => {
            cli::summary::run(&app.aggregator()?, user_id, &query).await
        }
        AppCommand::Export {
            user_id,
            range,
            output,
        } => {
            let ledger = app.ledger()?;
            let exporter = RecordExporter::new(ledger.clone(), ledger);
            cli::export::run(&exporter, user_id, range, output.as_deref()).await
        }
        AppCommand::Rates { from, to, on } => {
            cli::rates::run(&app.engine(), app.store.as_ref(), from, to, on).await
        }
    }
}
