//! Ledger and settings read from a YAML file.
use crate::core::error::{FxError, FxResult};
use crate::core::ledger::{
    Category, LedgerSource, PaymentMethod, Record, RecordFilter, SettingsSource, SortBy,
    SortOrder, UserId, UserSettings,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct LedgerRecord {
    #[serde(flatten)]
    record: Record,
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Deserialize)]
struct LedgerUser {
    id: UserId,
    settings: Option<UserSettings>,
    #[serde(default)]
    categories: Vec<Category>,
    #[serde(default)]
    payment_methods: Vec<PaymentMethod>,
    #[serde(default)]
    records: Vec<LedgerRecord>,
}

#[derive(Debug, Deserialize)]
struct LedgerDocument {
    #[serde(default)]
    users: Vec<LedgerUser>,
}

/// Read-only ledger loaded once from YAML.
#[derive(Debug)]
pub struct FileLedger {
    users: HashMap<UserId, LedgerUser>,
}

impl FileLedger {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read ledger file: {}", path.as_ref().display()))?;
        Self::from_yaml_str(&text)
            .with_context(|| format!("Failed to parse ledger file: {}", path.as_ref().display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let document: LedgerDocument = serde_yaml::from_str(text)?;
        let users = document.users.into_iter().map(|u| (u.id, u)).collect();
        let ledger = Self { users };
        debug!(users = ledger.users.len(), "Loaded ledger");
        Ok(ledger)
    }
}

fn compare(a: &Record, b: &Record, sort_by: SortBy, order: SortOrder) -> Ordering {
    let primary = match sort_by {
        SortBy::Date => a.date.cmp(&b.date),
        SortBy::Amount => a.amount.total_cmp(&b.amount),
    };
    let primary = match order {
        SortOrder::Asc => primary,
        SortOrder::Desc => primary.reverse(),
    };
    primary.then_with(|| b.id.cmp(&a.id))
}

#[async_trait]
impl LedgerSource for FileLedger {
    async fn list_records(&self, user_id: UserId, filter: &RecordFilter) -> FxResult<Vec<Record>> {
        let Some(user) = self.users.get(&user_id) else {
            return Ok(Vec::new());
        };
        let mut records: Vec<Record> = user
            .records
            .iter()
            .filter(|r| !r.deleted && filter.matches(&r.record))
            .map(|r| r.record.clone())
            .collect();
        records.sort_by(|a, b| compare(a, b, filter.sort_by, filter.sort_order));
        Ok(records)
    }

    async fn list_categories(&self, user_id: UserId) -> FxResult<Vec<Category>> {
        Ok(self
            .users
            .get(&user_id)
            .map(|u| u.categories.clone())
            .unwrap_or_default())
    }

    async fn list_payment_methods(&self, user_id: UserId) -> FxResult<Vec<PaymentMethod>> {
        Ok(self
            .users
            .get(&user_id)
            .map(|u| u.payment_methods.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl SettingsSource for FileLedger {
    async fn settings(&self, user_id: UserId) -> FxResult<UserSettings> {
        self.users
            .get(&user_id)
            .and_then(|u| u.settings.clone())
            .ok_or(FxError::MissingSettings(user_id))
    }
}
