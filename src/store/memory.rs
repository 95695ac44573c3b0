use crate::core::currency::{Currency, ExchangeRate, RateSource};
use crate::core::error::{FxError, FxResult};
use crate::core::fallback::FallbackRates;
use crate::core::rates::{RateStore, live_rows, prunable};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct Inner {
    next_id: u64,
    /// Live rows per pair, sorted by `(fetched_at, id)`.
    live: BTreeMap<(Currency, Currency), Vec<ExchangeRate>>,
    fallback: Vec<ExchangeRate>,
}

impl Inner {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory rate store; contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryRateStore {
    inner: RwLock<Inner>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeded fallback rows, for provenance only.
    pub async fn fallback_rows(&self) -> Vec<ExchangeRate> {
        self.inner.read().await.fallback.clone()
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn store_live_rates(
        &self,
        base: Currency,
        rates: &HashMap<Currency, f64>,
        fetched_at: DateTime<Utc>,
    ) -> FxResult<usize> {
        let rows = live_rows(base, rates, fetched_at);
        let created_at = Utc::now();

        // One write lock for the whole response, so readers never see part of it
        let mut inner = self.inner.write().await;
        for row in &rows {
            let id = inner.next_id();
            let pair = inner
                .live
                .entry((row.from_currency, row.to_currency))
                .or_default();
            let at = pair.partition_point(|r| (r.fetched_at, r.id) <= (row.fetched_at, id));
            pair.insert(
                at,
                ExchangeRate {
                    id,
                    from_currency: row.from_currency,
                    to_currency: row.to_currency,
                    rate: row.rate,
                    source: RateSource::Live,
                    fetched_at: row.fetched_at,
                    created_at,
                },
            );
        }
        debug!(base = %base, rows = rows.len(), "Stored live rates");
        Ok(rows.len())
    }

    async fn seed_fallback_rates(
        &self,
        table: &FallbackRates,
        seeded_at: DateTime<Utc>,
    ) -> FxResult<usize> {
        let mut inner = self.inner.write().await;
        if !inner.fallback.is_empty() {
            return Ok(0);
        }
        let entries = table.entries();
        for (from, to, rate) in &entries {
            let id = inner.next_id();
            inner.fallback.push(ExchangeRate {
                id,
                from_currency: *from,
                to_currency: *to,
                rate: *rate,
                source: RateSource::Fallback,
                fetched_at: seeded_at,
                created_at: seeded_at,
            });
        }
        Ok(entries.len())
    }

    async fn resolve_rate(
        &self,
        from: Currency,
        to: Currency,
        as_of: DateTime<Utc>,
    ) -> FxResult<ExchangeRate> {
        let inner = self.inner.read().await;
        let rows = inner.live.get(&(from, to)).map(Vec::as_slice).unwrap_or(&[]);
        let split = rows.partition_point(|r| r.fetched_at <= as_of);
        let found = if split > 0 {
            rows.get(split - 1)
        } else {
            rows.first()
        };
        found
            .cloned()
            .ok_or(FxError::RateNotFound { from, to, as_of })
    }

    async fn history(&self, from: Currency, to: Currency) -> FxResult<Vec<ExchangeRate>> {
        let inner = self.inner.read().await;
        Ok(inner.live.get(&(from, to)).cloned().unwrap_or_default())
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> FxResult<usize> {
        let mut inner = self.inner.write().await;
        let mut removed = 0;
        for rows in inner.live.values_mut() {
            let drop = prunable(rows, cutoff).len();
            rows.drain(..drop);
            removed += drop;
        }
        debug!(removed, %cutoff, "Pruned live rates");
        Ok(removed)
    }
}
