//! Read-only views of the tracker's records, categories and user settings.
//!
//! These are owned by the surrounding application; the rate and aggregation
//! components only consume them.

use crate::core::currency::Currency;
use crate::core::error::{FxError, FxResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

pub type UserId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CategoryType {
    Income,
    Expense,
}

impl Display for CategoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CategoryType::Income => f.write_str("INCOME"),
            CategoryType::Expense => f.write_str("EXPENSE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub category_type: CategoryType,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    pub amount: f64,
    pub currency: Currency,
    pub category_id: u64,
    pub payment_method_id: u64,
    pub date: NaiveDate,
    #[serde(default)]
    pub description: Option<String>,
}

/// Interface languages with localized export headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    En,
    Mk,
}

impl Language {
    pub fn from_code(code: &str) -> Option<Language> {
        match code.trim().to_uppercase().as_str() {
            "EN" => Some(Language::En),
            "MK" => Some(Language::Mk),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub currency: Currency,
    /// Raw language code as stored; unknown codes are tolerated by consumers.
    pub language: String,
}

/// Inclusive calendar date range; either end may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> FxResult<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(FxError::InvalidInput(format!(
                    "start date {s} is after end date {e}"
                )));
            }
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.start
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    Date,
    Amount,
}

impl FromStr for SortBy {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "date" => Ok(SortBy::Date),
            "amount" => Ok(SortBy::Amount),
            _ => Err(FxError::InvalidInput(format!("invalid sort field: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(FxError::InvalidInput(format!("invalid sort order: {s}"))),
        }
    }
}

/// Storage-level record filter. Free-text search is not part of it.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub range: DateRange,
    pub payment_method_ids: Vec<u64>,
    pub category_id: Option<u64>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl RecordFilter {
    pub fn matches(&self, record: &Record) -> bool {
        self.range.contains(record.date)
            && (self.payment_method_ids.is_empty()
                || self.payment_method_ids.contains(&record.payment_method_id))
            && self.category_id.is_none_or(|id| id == record.category_id)
    }
}

/// Access to a user's non-deleted records, categories and payment methods.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Records matching `filter`, ordered by the filter's sort (ties by id descending).
    async fn list_records(&self, user_id: UserId, filter: &RecordFilter) -> FxResult<Vec<Record>>;
    async fn list_categories(&self, user_id: UserId) -> FxResult<Vec<Category>>;
    async fn list_payment_methods(&self, user_id: UserId) -> FxResult<Vec<PaymentMethod>>;
}

/// Access to per-user preferences. A user without settings is an error.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn settings(&self, user_id: UserId) -> FxResult<UserSettings>;

    async fn currency_preference(&self, user_id: UserId) -> FxResult<Currency> {
        Ok(self.settings(user_id).await?.currency)
    }

    async fn language_preference(&self, user_id: UserId) -> FxResult<String> {
        Ok(self.settings(user_id).await?.language)
    }
}

/// Rejects the zero user id before any other work happens.
pub fn validate_user(user_id: UserId) -> FxResult<UserId> {
    if user_id == 0 {
        return Err(FxError::InvalidInput("invalid user id".to_string()));
    }
    Ok(user_id)
}
