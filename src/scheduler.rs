//! Periodic refresh of live rates for every supported base currency.
use crate::core::config::RefreshConfig;
use crate::core::currency::{Currency, RateProvider};
use crate::core::error::FxResult;
use crate::core::rates::RateStore;
use crate::providers::util::with_retry;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub interval: Duration,
    pub tick_timeout: Duration,
    pub retries: usize,
    pub retry_delay_ms: u64,
    pub retention: Option<chrono::Duration>,
}

impl From<&RefreshConfig> for RefreshSettings {
    fn from(config: &RefreshConfig) -> Self {
        RefreshSettings {
            interval: config.interval(),
            tick_timeout: config.tick_timeout(),
            retries: config.retries,
            retry_delay_ms: config.retry_delay_ms,
            retention: config.retention(),
        }
    }
}

/// Outcome of one pass over all bases.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RefreshReport {
    pub stored: Vec<(Currency, usize)>,
    pub failed: Vec<(Currency, String)>,
}

impl RefreshReport {
    pub fn total_rows(&self) -> usize {
        self.stored.iter().map(|(_, n)| n).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct RateRefreshJob {
    provider: Arc<dyn RateProvider>,
    store: Arc<dyn RateStore>,
    settings: RefreshSettings,
}

impl RateRefreshJob {
    pub fn new(
        provider: Arc<dyn RateProvider>,
        store: Arc<dyn RateStore>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            provider,
            store,
            settings,
        }
    }

    /// Fetches one base (with retries) and stores the response atomically.
    pub async fn refresh_base(&self, base: Currency) -> FxResult<usize> {
        let rates = with_retry(
            || self.provider.fetch_rates(base),
            self.settings.retries,
            self.settings.retry_delay_ms,
        )
        .await?;
        self.store.store_live_rates(base, &rates, Utc::now()).await
    }

    /// Refreshes every base. A failing or slow base never stops the others.
    pub async fn refresh_all(&self) -> RefreshReport {
        self.refresh_all_with(|_| {}).await
    }

    /// Refreshes all bases concurrently, each bounded by the tick timeout,
    /// calling `on_base` as each one settles.
    pub async fn refresh_all_with(&self, on_base: impl Fn(Currency)) -> RefreshReport {
        let deadline = self.settings.tick_timeout;
        let on_base = &on_base;
        let outcomes = join_all(Currency::ALL.into_iter().map(|base| async move {
            let outcome = match timeout(deadline, self.refresh_base(base)).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err(format!("timed out after {}s", deadline.as_secs())),
            };
            on_base(base);
            (base, outcome)
        }))
        .await;

        let mut report = RefreshReport::default();
        for (base, outcome) in outcomes {
            match outcome {
                Ok(rows) => {
                    debug!(base = %base, rows, "Refreshed rates");
                    report.stored.push((base, rows));
                }
                Err(e) => {
                    warn!(base = %base, error = %e, "Failed to refresh rates");
                    report.failed.push((base, e));
                }
            }
        }
        report
    }

    /// One scheduled pass: bounded refresh, then retention.
    pub async fn tick(&self) -> RefreshReport {
        self.tick_with(|_| {}).await
    }

    pub async fn tick_with(&self, on_base: impl Fn(Currency)) -> RefreshReport {
        let report = self.refresh_all_with(on_base).await;
        info!(
            rows = report.total_rows(),
            failed = report.failed.len(),
            "Rate refresh finished"
        );

        if let Some(retention) = self.settings.retention {
            let cutoff = Utc::now() - retention;
            match self.store.prune(cutoff).await {
                Ok(removed) => debug!(removed, "Applied rate retention"),
                Err(e) => warn!(error = %e, "Failed to prune rates"),
            }
        }
        report
    }

    /// Runs a tick immediately and then every interval until stopped.
    pub fn start(self) -> RefreshHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = interval(self.settings.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_secs = self.settings.interval.as_secs(),
                "Rate refresh scheduler started"
            );

            let run = async {
                loop {
                    ticker.tick().await;
                    self.tick().await;
                }
            };
            tokio::select! {
                _ = run => {}
                _ = stop_rx.changed() => {}
            }
            info!("Rate refresh scheduler stopped");
        });
        RefreshHandle {
            stop: stop_tx,
            task,
        }
    }
}

pub struct RefreshHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Stops future ticks, cancelling one in flight, and waits for the task.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Scheduler task ended abnormally");
        }
    }
}
