//! Rate store abstractions.
//!
//! Rows are append-only. A pair may hold many snapshots over time and
//! `fetched_at` orders them. The store answers "which rate was in effect at
//! instant T" with a nearest-snapshot policy: the latest row at or before T,
//! otherwise the earliest row after T.

use crate::core::currency::{Currency, ExchangeRate};
use crate::core::error::FxResult;
use crate::core::fallback::FallbackRates;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::collections::HashMap;

/// A row about to be written; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRate {
    pub from_currency: Currency,
    pub to_currency: Currency,
    pub rate: f64,
    pub fetched_at: DateTime<Utc>,
}

#[async_trait]
pub trait RateStore: Send + Sync {
    /// Stores one provider response for `base` as a single atomic unit.
    ///
    /// The provider quotes "target per 1 base"; rows are stored inverted as
    /// `target -> base` ("base per 1 target"). Returns the number of rows written.
    async fn store_live_rates(
        &self,
        base: Currency,
        rates: &HashMap<Currency, f64>,
        fetched_at: DateTime<Utc>,
    ) -> FxResult<usize>;

    /// Records the static fallback constants for provenance. No-op once seeded.
    async fn seed_fallback_rates(
        &self,
        table: &FallbackRates,
        seeded_at: DateTime<Utc>,
    ) -> FxResult<usize>;

    /// Nearest-snapshot lookup over live rows.
    ///
    /// Fails with `FxError::RateNotFound` when the pair has no live row at all.
    async fn resolve_rate(
        &self,
        from: Currency,
        to: Currency,
        as_of: DateTime<Utc>,
    ) -> FxResult<ExchangeRate>;

    /// All live rows for a pair, oldest first.
    async fn history(&self, from: Currency, to: Currency) -> FxResult<Vec<ExchangeRate>>;

    /// Drops live rows older than `cutoff`, keeping per pair the newest row
    /// at or before it. Returns the number of rows removed.
    async fn prune(&self, cutoff: DateTime<Utc>) -> FxResult<usize>;
}

/// Turns a provider response for `base` into the inverted rows the store keeps.
pub fn live_rows(
    base: Currency,
    rates: &HashMap<Currency, f64>,
    fetched_at: DateTime<Utc>,
) -> Vec<NewRate> {
    let mut rows: Vec<NewRate> = rates
        .iter()
        .filter(|(target, rate)| **target != base && rate.is_finite() && **rate > 0.0)
        .map(|(target, rate)| NewRate {
            from_currency: *target,
            to_currency: base,
            rate: 1.0 / rate,
            fetched_at,
        })
        .collect();
    rows.sort_by_key(|row| row.from_currency);
    rows
}

/// The instant a calendar date is resolved against: the last millisecond of that day, UTC.
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    let last = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    date.and_time(last).and_utc()
}

/// Given one pair's rows sorted by `fetched_at`, returns the indexes retention removes.
pub(crate) fn prunable(rows: &[ExchangeRate], cutoff: DateTime<Utc>) -> Vec<usize> {
    let older = rows.partition_point(|row| row.fetched_at < cutoff);
    let exact = rows.get(older).is_some_and(|row| row.fetched_at == cutoff);
    let removable = if exact {
        older
    } else {
        older.saturating_sub(1)
    };
    (0..removable).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::RateSource;
    use chrono::{Duration, TimeZone};

    fn row(id: u64, fetched_at: DateTime<Utc>) -> ExchangeRate {
        ExchangeRate {
            id,
            from_currency: Currency::Eur,
            to_currency: Currency::Mkd,
            rate: 61.5,
            source: RateSource::Live,
            fetched_at,
            created_at: fetched_at,
        }
    }

    #[test]
    fn test_live_rows_are_inverted() {
        // Provider quote for base MKD: 1 MKD = 0.01625 EUR
        let rates = HashMap::from([
            (Currency::Mkd, 1.0),
            (Currency::Eur, 0.01625),
            (Currency::Usd, 0.019),
        ]);
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let rows = live_rows(Currency::Mkd, &rates, at);

        assert_eq!(rows.len(), 2);
        let eur = rows
            .iter()
            .find(|r| r.from_currency == Currency::Eur)
            .unwrap();
        assert_eq!(eur.to_currency, Currency::Mkd);
        // 1 EUR = 61.538... MKD
        assert!((eur.rate - 1.0 / 0.01625).abs() < 1e-9);
        assert!(rows.iter().all(|r| r.to_currency == Currency::Mkd));
    }

    #[test]
    fn test_live_rows_skip_invalid_quotes() {
        let rates = HashMap::from([(Currency::Eur, 0.0), (Currency::Usd, f64::NAN)]);
        let rows = live_rows(Currency::Mkd, &rates, Utc::now());
        assert!(rows.is_empty());
    }

    #[test]
    fn test_end_of_day() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let instant = end_of_day(date);
        assert_eq!(instant.to_rfc3339(), "2025-03-10T23:59:59.999+00:00");
    }

    #[test]
    fn test_prunable_keeps_newest_before_cutoff() {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let rows: Vec<_> = (0..5)
            .map(|i| row(i, base + Duration::days(i as i64)))
            .collect();
        let cutoff = base + Duration::days(2) + Duration::hours(1);
        // rows 0 and 1 go, row 2 is the newest before the cutoff and stays
        assert_eq!(prunable(&rows, cutoff), vec![0, 1]);
    }

    #[test]
    fn test_prunable_nothing_old() {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let rows = vec![row(1, base), row(2, base + Duration::days(1))];
        assert!(prunable(&rows, base - Duration::days(1)).is_empty());
        assert!(prunable(&[], base).is_empty());
    }
}
