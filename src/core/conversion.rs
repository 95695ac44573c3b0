//! Converts heterogeneous record amounts into a single target currency.
//!
//! Rates are resolved once per distinct `(date, from_currency)` pair in a
//! batch, walking: stored snapshot at or before the date, stored snapshot
//! after it, static fallback table. Anything else fails the whole batch.

use crate::core::currency::Currency;
use crate::core::error::{FxError, FxResult};
use crate::core::fallback::FallbackRates;
use crate::core::rates::{RateStore, end_of_day};
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// One amount awaiting conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConversionRequest {
    pub record_id: u64,
    pub amount: f64,
    pub currency: Currency,
    pub date: NaiveDate,
}

/// Composite key for a per-batch rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub date: NaiveDate,
    pub from: Currency,
    pub to: Currency,
}

/// Where a resolved rate came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolutionPath {
    /// Latest stored snapshot fetched at or before the as-of instant.
    AtOrBefore { fetched_at: DateTime<Utc> },
    /// Earliest stored snapshot fetched after it.
    After { fetched_at: DateTime<Utc> },
    Fallback,
    /// Source and target are the same currency.
    Identity,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedRate {
    pub rate: f64,
    pub path: ResolutionPath,
}

/// Multiplies an amount by a resolved rate.
pub fn apply(amount: f64, rate: f64) -> f64 {
    amount * rate
}

/// Rates resolved for one batch, all targeting the same currency.
#[derive(Debug, Clone)]
pub struct RateTable {
    target: Currency,
    rates: HashMap<RateKey, f64>,
}

impl RateTable {
    pub fn new(target: Currency) -> Self {
        Self {
            target,
            rates: HashMap::new(),
        }
    }

    pub fn target(&self) -> Currency {
        self.target
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn insert(&mut self, date: NaiveDate, from: Currency, rate: f64) {
        let key = RateKey {
            date,
            from,
            to: self.target,
        };
        self.rates.insert(key, rate);
    }

    pub fn rate(&self, date: NaiveDate, from: Currency) -> Option<f64> {
        if from == self.target {
            return Some(1.0);
        }
        self.rates
            .get(&RateKey {
                date,
                from,
                to: self.target,
            })
            .copied()
    }

    /// Converts one request. Same-currency amounts pass through unchanged.
    pub fn convert(&self, request: &ConversionRequest) -> FxResult<f64> {
        if request.currency == self.target {
            return Ok(request.amount);
        }
        self.rate(request.date, request.currency)
            .map(|rate| apply(request.amount, rate))
            .ok_or(FxError::ResolutionExhausted {
                record_id: request.record_id,
                from: request.currency,
                to: self.target,
                date: request.date,
            })
    }
}

#[derive(Clone)]
pub struct ConversionEngine {
    store: Arc<dyn RateStore>,
    fallback: &'static FallbackRates,
}

impl ConversionEngine {
    pub fn new(store: Arc<dyn RateStore>) -> Self {
        Self::with_fallback(store, FallbackRates::standard())
    }

    pub fn with_fallback(store: Arc<dyn RateStore>, fallback: &'static FallbackRates) -> Self {
        Self { store, fallback }
    }

    /// Resolves a single pair for a calendar date.
    pub async fn resolve(
        &self,
        from: Currency,
        to: Currency,
        date: NaiveDate,
    ) -> FxResult<Option<ResolvedRate>> {
        if from == to {
            return Ok(Some(ResolvedRate {
                rate: 1.0,
                path: ResolutionPath::Identity,
            }));
        }

        let as_of = end_of_day(date);
        match self.store.resolve_rate(from, to, as_of).await {
            Ok(row) => {
                let path = if row.fetched_at <= as_of {
                    ResolutionPath::AtOrBefore {
                        fetched_at: row.fetched_at,
                    }
                } else {
                    ResolutionPath::After {
                        fetched_at: row.fetched_at,
                    }
                };
                debug!(%from, %to, %date, rate = row.rate, ?path, "Resolved stored rate");
                Ok(Some(ResolvedRate {
                    rate: row.rate,
                    path,
                }))
            }
            Err(FxError::RateNotFound { .. }) => {
                let resolved = self.fallback.lookup(from, to).map(|rate| ResolvedRate {
                    rate,
                    path: ResolutionPath::Fallback,
                });
                match resolved {
                    Some(r) => warn!(%from, %to, %date, rate = r.rate, "Using static fallback rate"),
                    None => warn!(%from, %to, %date, "No rate available for pair"),
                }
                Ok(resolved)
            }
            Err(e) => Err(e),
        }
    }

    /// Resolves every distinct `(date, currency)` pair among `requests` that
    /// differs from `target`, exactly once each.
    pub async fn convert_batch(
        &self,
        requests: &[ConversionRequest],
        target: Currency,
    ) -> FxResult<RateTable> {
        // First record seen per key, so failures can name it.
        let mut pending: HashMap<(NaiveDate, Currency), u64> = HashMap::new();
        for request in requests.iter().filter(|r| r.currency != target) {
            pending
                .entry((request.date, request.currency))
                .or_insert(request.record_id);
        }

        let mut table = RateTable::new(target);
        if pending.is_empty() {
            return Ok(table);
        }
        debug!(
            requests = requests.len(),
            distinct = pending.len(),
            %target,
            "Resolving batch rates"
        );

        let lookups = pending.into_iter().map(|((date, from), record_id)| async move {
            let resolved = self.resolve(from, target, date).await?;
            resolved
                .map(|r| (date, from, r.rate))
                .ok_or(FxError::ResolutionExhausted {
                    record_id,
                    from,
                    to: target,
                    date,
                })
        });

        for (date, from, rate) in try_join_all(lookups).await? {
            table.insert(date, from, rate);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::{ExchangeRate, RateSource};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves fixed rows and counts lookups.
    struct MockRateStore {
        rows: Vec<ExchangeRate>,
        calls: AtomicUsize,
        broken: bool,
    }

    impl MockRateStore {
        fn new(rows: Vec<ExchangeRate>) -> Self {
            Self {
                rows,
                calls: AtomicUsize::new(0),
                broken: false,
            }
        }
    }

    #[async_trait]
    impl RateStore for MockRateStore {
        async fn store_live_rates(
            &self,
            _base: Currency,
            _rates: &HashMap<Currency, f64>,
            _fetched_at: DateTime<Utc>,
        ) -> FxResult<usize> {
            unimplemented!()
        }

        async fn seed_fallback_rates(
            &self,
            _table: &FallbackRates,
            _seeded_at: DateTime<Utc>,
        ) -> FxResult<usize> {
            unimplemented!()
        }

        async fn resolve_rate(
            &self,
            from: Currency,
            to: Currency,
            as_of: DateTime<Utc>,
        ) -> FxResult<ExchangeRate> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.broken {
                return Err(FxError::Storage("disk on fire".to_string()));
            }
            let pair: Vec<_> = self
                .rows
                .iter()
                .filter(|r| r.from_currency == from && r.to_currency == to)
                .collect();
            pair.iter()
                .filter(|r| r.fetched_at <= as_of)
                .max_by_key(|r| r.fetched_at)
                .or_else(|| {
                    pair.iter()
                        .filter(|r| r.fetched_at > as_of)
                        .min_by_key(|r| r.fetched_at)
                })
                .map(|r| (*r).clone())
                .ok_or(FxError::RateNotFound { from, to, as_of })
        }

        async fn history(&self, _from: Currency, _to: Currency) -> FxResult<Vec<ExchangeRate>> {
            Ok(self.rows.clone())
        }

        async fn prune(&self, _cutoff: DateTime<Utc>) -> FxResult<usize> {
            Ok(0)
        }
    }

    fn rate(from: Currency, to: Currency, rate: f64, fetched_at: DateTime<Utc>) -> ExchangeRate {
        ExchangeRate {
            id: 0,
            from_currency: from,
            to_currency: to,
            rate,
            source: RateSource::Live,
            fetched_at,
            created_at: fetched_at,
        }
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn request(record_id: u64, amount: f64, currency: Currency, d: &str) -> ConversionRequest {
        ConversionRequest {
            record_id,
            amount,
            currency,
            date: date(d),
        }
    }

    #[tokio::test]
    async fn test_same_currency_is_identity() {
        let store = Arc::new(MockRateStore::new(vec![]));
        let engine = ConversionEngine::with_fallback(store.clone(), FallbackRates::none());
        let requests = [request(1, 42.5, Currency::Mkd, "2025-01-01")];

        let table = engine.convert_batch(&requests, Currency::Mkd).await.unwrap();

        assert!(table.is_empty());
        assert_eq!(table.convert(&requests[0]).unwrap(), 42.5);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_batch_deduplicates_pairs() {
        let fetched = Utc.with_ymd_and_hms(2024, 12, 31, 8, 0, 0).unwrap();
        let store = Arc::new(MockRateStore::new(vec![rate(
            Currency::Eur,
            Currency::Mkd,
            61.55,
            fetched,
        )]));
        let engine = ConversionEngine::with_fallback(store.clone(), FallbackRates::none());
        let requests: Vec<_> = (1..=50)
            .map(|id| request(id, 10.0, Currency::Eur, "2025-01-05"))
            .collect();

        let table = engine.convert_batch(&requests, Currency::Mkd).await.unwrap();

        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(table.len(), 1);
        for r in &requests {
            assert!((table.convert(r).unwrap() - 615.5).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_prefers_latest_snapshot_before_date() {
        let store = Arc::new(MockRateStore::new(vec![
            rate(
                Currency::Usd,
                Currency::Mkd,
                50.0,
                Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            ),
            rate(
                Currency::Usd,
                Currency::Mkd,
                51.0,
                Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap(),
            ),
            rate(
                Currency::Usd,
                Currency::Mkd,
                53.0,
                Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap(),
            ),
        ]));
        let engine = ConversionEngine::with_fallback(store, FallbackRates::none());

        let resolved = engine
            .resolve(Currency::Usd, Currency::Mkd, date("2025-01-15"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.rate, 51.0);
        assert!(matches!(resolved.path, ResolutionPath::AtOrBefore { .. }));
    }

    #[tokio::test]
    async fn test_same_day_snapshot_counts_as_before() {
        let store = Arc::new(MockRateStore::new(vec![rate(
            Currency::Usd,
            Currency::Mkd,
            52.0,
            Utc.with_ymd_and_hms(2025, 1, 15, 18, 30, 0).unwrap(),
        )]));
        let engine = ConversionEngine::with_fallback(store, FallbackRates::none());

        let resolved = engine
            .resolve(Currency::Usd, Currency::Mkd, date("2025-01-15"))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(resolved.path, ResolutionPath::AtOrBefore { .. }));
    }

    #[tokio::test]
    async fn test_backfills_from_later_snapshot() {
        let store = Arc::new(MockRateStore::new(vec![rate(
            Currency::Gbp,
            Currency::Eur,
            1.16,
            Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        )]));
        let engine = ConversionEngine::with_fallback(store, FallbackRates::none());

        let resolved = engine
            .resolve(Currency::Gbp, Currency::Eur, date("2024-01-01"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.rate, 1.16);
        assert!(matches!(resolved.path, ResolutionPath::After { .. }));
    }

    #[tokio::test]
    async fn test_falls_back_to_static_table() {
        let store = Arc::new(MockRateStore::new(vec![]));
        let engine = ConversionEngine::new(store);
        let requests = [request(3, 10.0, Currency::Usd, "2025-01-01")];

        let table = engine.convert_batch(&requests, Currency::Mkd).await.unwrap();

        assert!((table.convert(&requests[0]).unwrap() - 524.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_exhausted_resolution_names_record() {
        let store = Arc::new(MockRateStore::new(vec![]));
        let engine = ConversionEngine::with_fallback(store, FallbackRates::none());
        let requests = [request(77, 10.0, Currency::Aud, "2025-03-04")];

        let err = engine
            .convert_batch(&requests, Currency::Chf)
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "no exchange rate for record #77 (AUD->CHF on 2025-03-04)"
        );
    }

    #[tokio::test]
    async fn test_storage_errors_are_not_masked_by_fallback() {
        let mut store = MockRateStore::new(vec![]);
        store.broken = true;
        let engine = ConversionEngine::new(Arc::new(store));
        let requests = [request(1, 10.0, Currency::Usd, "2025-01-01")];

        let err = engine
            .convert_batch(&requests, Currency::Mkd)
            .await
            .unwrap_err();
        assert!(matches!(err, FxError::Storage(_)));
    }

    #[test]
    fn test_missing_key_in_table_is_an_error() {
        let table = RateTable::new(Currency::Mkd);
        let err = table
            .convert(&request(9, 1.0, Currency::Eur, "2025-01-01"))
            .unwrap_err();
        assert!(matches!(err, FxError::ResolutionExhausted { record_id: 9, .. }));
    }
}
