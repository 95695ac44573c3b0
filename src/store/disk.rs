use crate::core::currency::{Currency, ExchangeRate, RateSource};
use crate::core::error::{FxError, FxResult};
use crate::core::fallback::FallbackRates;
use crate::core::rates::{RateStore, live_rows, prunable};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

const LIVE_PARTITION: &str = "live_rates";
const FALLBACK_PARTITION: &str = "fallback_rates";
const META_PARTITION: &str = "meta";
const NEXT_ID_KEY: &[u8] = b"next_id";

/// `from(3) | to(3)`, shared by every row of a pair.
fn pair_prefix(from: Currency, to: Currency) -> Vec<u8> {
    let mut key = Vec::with_capacity(22);
    key.extend_from_slice(from.code().as_bytes());
    key.extend_from_slice(to.code().as_bytes());
    key
}

/// Millisecond timestamp with the sign bit flipped, so byte order matches time order.
fn ordered_millis(at: DateTime<Utc>) -> [u8; 8] {
    ((at.timestamp_millis() as u64) ^ (1 << 63)).to_be_bytes()
}

/// `pair_prefix | fetched_at | id`; keys of one pair sort by fetch time.
fn row_key(from: Currency, to: Currency, fetched_at: DateTime<Utc>, id: u64) -> Vec<u8> {
    let mut key = pair_prefix(from, to);
    key.extend_from_slice(&ordered_millis(fetched_at));
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn decode(value: &[u8]) -> FxResult<ExchangeRate> {
    Ok(serde_json::from_slice(value)?)
}

/// Rate store persisted in a fjall keyspace.
pub struct DiskRateStore {
    keyspace: Keyspace,
    live: PartitionHandle,
    fallback: PartitionHandle,
    meta: PartitionHandle,
    // Serializes writers so id allocation and batches do not interleave
    write_lock: Mutex<()>,
}

impl DiskRateStore {
    pub fn open(path: &Path) -> FxResult<Self> {
        std::fs::create_dir_all(path)
            .map_err(|e| FxError::Storage(format!("{}: {e}", path.display())))?;
        let keyspace = Config::new(path).open()?;
        let live = keyspace.open_partition(LIVE_PARTITION, PartitionCreateOptions::default())?;
        let fallback =
            keyspace.open_partition(FALLBACK_PARTITION, PartitionCreateOptions::default())?;
        let meta = keyspace.open_partition(META_PARTITION, PartitionCreateOptions::default())?;
        debug!(path = %path.display(), "Opened rate store");
        Ok(Self {
            keyspace,
            live,
            fallback,
            meta,
            write_lock: Mutex::new(()),
        })
    }

    /// Reserves `count` consecutive ids, returning the first one.
    fn reserve_ids(&self, count: u64) -> FxResult<u64> {
        let current = match self.meta.get(NEXT_ID_KEY)? {
            Some(bytes) => {
                let raw = <[u8; 8]>::try_from(&bytes[..])
                    .map_err(|_| FxError::Storage("corrupt id counter".to_string()))?;
                u64::from_be_bytes(raw)
            }
            None => 1,
        };
        self.meta
            .insert(NEXT_ID_KEY, (current + count).to_be_bytes())?;
        Ok(current)
    }

    fn pair_rows(&self, from: Currency, to: Currency) -> FxResult<Vec<ExchangeRate>> {
        self.live
            .prefix(pair_prefix(from, to))
            .map(|kv| {
                let (_, value) = kv?;
                decode(&value)
            })
            .collect()
    }

    /// Seeded fallback rows, for provenance only.
    pub fn fallback_rows(&self) -> FxResult<Vec<ExchangeRate>> {
        self.fallback
            .iter()
            .map(|kv| {
                let (_, value) = kv?;
                decode(&value)
            })
            .collect()
    }
}

#[async_trait]
impl RateStore for DiskRateStore {
    async fn store_live_rates(
        &self,
        base: Currency,
        rates: &HashMap<Currency, f64>,
        fetched_at: DateTime<Utc>,
    ) -> FxResult<usize> {
        let rows = live_rows(base, rates, fetched_at);
        if rows.is_empty() {
            return Ok(0);
        }
        let _guard = self.write_lock.lock().await;
        let first_id = self.reserve_ids(rows.len() as u64)?;
        let created_at = Utc::now();

        let mut batch = self.keyspace.batch();
        for (id, row) in (first_id..).zip(&rows) {
            let record = ExchangeRate {
                id,
                from_currency: row.from_currency,
                to_currency: row.to_currency,
                rate: row.rate,
                source: RateSource::Live,
                fetched_at: row.fetched_at,
                created_at,
            };
            batch.insert(
                &self.live,
                row_key(row.from_currency, row.to_currency, row.fetched_at, id),
                serde_json::to_vec(&record)?,
            );
        }
        batch.commit()?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!(base = %base, rows = rows.len(), "Stored live rates");
        Ok(rows.len())
    }

    async fn seed_fallback_rates(
        &self,
        table: &FallbackRates,
        seeded_at: DateTime<Utc>,
    ) -> FxResult<usize> {
        let _guard = self.write_lock.lock().await;
        if !self.fallback.is_empty()? {
            debug!("Fallback rates already seeded");
            return Ok(0);
        }
        let entries = table.entries();
        if entries.is_empty() {
            return Ok(0);
        }
        let first_id = self.reserve_ids(entries.len() as u64)?;

        let mut batch = self.keyspace.batch();
        for (id, (from, to, rate)) in (first_id..).zip(&entries) {
            let record = ExchangeRate {
                id,
                from_currency: *from,
                to_currency: *to,
                rate: *rate,
                source: RateSource::Fallback,
                fetched_at: seeded_at,
                created_at: seeded_at,
            };
            batch.insert(
                &self.fallback,
                pair_prefix(*from, *to),
                serde_json::to_vec(&record)?,
            );
        }
        batch.commit()?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(entries.len())
    }

    async fn resolve_rate(
        &self,
        from: Currency,
        to: Currency,
        as_of: DateTime<Utc>,
    ) -> FxResult<ExchangeRate> {
        let prefix = pair_prefix(from, to);
        let mut upper = prefix.clone();
        upper.extend_from_slice(&ordered_millis(as_of));
        upper.extend_from_slice(&u64::MAX.to_be_bytes());

        if let Some(kv) = self.live.range(prefix.clone()..=upper).next_back() {
            let (_, value) = kv?;
            return decode(&value);
        }
        match self.live.prefix(prefix).next() {
            Some(kv) => {
                let (_, value) = kv?;
                decode(&value)
            }
            None => Err(FxError::RateNotFound { from, to, as_of }),
        }
    }

    async fn history(&self, from: Currency, to: Currency) -> FxResult<Vec<ExchangeRate>> {
        self.pair_rows(from, to)
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> FxResult<usize> {
        let _guard = self.write_lock.lock().await;
        let mut batch = self.keyspace.batch();
        let mut removed = 0;
        for from in Currency::ALL {
            for to in Currency::ALL.into_iter().filter(|to| *to != from) {
                let rows = self.pair_rows(from, to)?;
                for index in prunable(&rows, cutoff) {
                    let row = &rows[index];
                    batch.remove(&self.live, row_key(from, to, row.fetched_at, row.id));
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            batch.commit()?;
            self.keyspace.persist(PersistMode::SyncAll)?;
        }
        debug!(removed, %cutoff, "Pruned live rates");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, d, 12, 0, 0).unwrap()
    }

    fn eur_quote(mkd_per_eur: f64) -> HashMap<Currency, f64> {
        HashMap::from([(Currency::Eur, 1.0 / mkd_per_eur), (Currency::Mkd, 1.0)])
    }

    #[test]
    fn test_ordered_millis_sorts_like_time() {
        let before_epoch = Utc.with_ymd_and_hms(1960, 1, 1, 0, 0, 0).unwrap();
        let after_epoch = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(ordered_millis(before_epoch) < ordered_millis(after_epoch));
    }

    #[tokio::test]
    async fn test_disk_store_resolves_nearest() {
        let dir = tempdir().unwrap();
        let store = DiskRateStore::open(dir.path()).unwrap();
        store
            .store_live_rates(Currency::Mkd, &eur_quote(61.5), day(3))
            .await
            .unwrap();
        store
            .store_live_rates(Currency::Mkd, &eur_quote(61.7), day(9))
            .await
            .unwrap();

        let before = store
            .resolve_rate(Currency::Eur, Currency::Mkd, day(5))
            .await
            .unwrap();
        assert!((before.rate - 61.5).abs() < 1e-9);

        let after = store
            .resolve_rate(Currency::Eur, Currency::Mkd, day(1))
            .await
            .unwrap();
        assert_eq!(after.fetched_at, day(3));

        let missing = store
            .resolve_rate(Currency::Gbp, Currency::Mkd, day(5))
            .await
            .unwrap_err();
        assert!(matches!(missing, FxError::RateNotFound { .. }));
    }

    #[tokio::test]
    async fn test_disk_store_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = DiskRateStore::open(dir.path()).unwrap();
            store
                .store_live_rates(Currency::Mkd, &eur_quote(61.5), day(3))
                .await
                .unwrap();
            store
                .seed_fallback_rates(FallbackRates::standard(), day(1))
                .await
                .unwrap();
        }

        let store = DiskRateStore::open(dir.path()).unwrap();
        let history = store.history(Currency::Eur, Currency::Mkd).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].source, RateSource::Live);

        // Already seeded, and ids keep growing across reopen
        assert_eq!(
            store
                .seed_fallback_rates(FallbackRates::standard(), day(2))
                .await
                .unwrap(),
            0
        );
        store
            .store_live_rates(Currency::Mkd, &eur_quote(61.6), day(4))
            .await
            .unwrap();
        let history = store.history(Currency::Eur, Currency::Mkd).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[1].id > history[0].id);

        let fallback = store.fallback_rows().unwrap();
        assert!(fallback.iter().all(|r| r.source == RateSource::Fallback));
        assert!(!fallback.is_empty());
    }

    #[tokio::test]
    async fn test_disk_store_prune() {
        let dir = tempdir().unwrap();
        let store = DiskRateStore::open(dir.path()).unwrap();
        for d in [1, 2, 3, 4] {
            store
                .store_live_rates(Currency::Mkd, &eur_quote(61.0 + d as f64 / 10.0), day(d))
                .await
                .unwrap();
        }

        let removed = store.prune(day(3) + Duration::minutes(5)).await.unwrap();
        assert_eq!(removed, 2);
        let history = store.history(Currency::Eur, Currency::Mkd).await.unwrap();
        let times: Vec<_> = history.iter().map(|r| r.fetched_at).collect();
        assert_eq!(times, vec![day(3), day(4)]);
    }
}
