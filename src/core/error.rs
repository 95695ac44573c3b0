//! Error taxonomy shared by the rate and aggregation components.

use crate::core::currency::Currency;
use crate::core::ledger::UserId;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

/// Result alias for core operations.
pub type FxResult<T> = Result<T, FxError>;

#[derive(Debug, Error)]
pub enum FxError {
    /// The rate provider was unreachable or answered with something unusable.
    #[error("rate provider unavailable: {0}")]
    Upstream(String),

    /// The store holds no snapshot for the pair, neither before nor after `as_of`.
    #[error("no stored rate for {from}->{to} as of {as_of}")]
    RateNotFound {
        from: Currency,
        to: Currency,
        as_of: DateTime<Utc>,
    },

    /// Snapshot lookup and static fallback both failed for a record.
    #[error("no exchange rate for record #{record_id} ({from}->{to} on {date})")]
    ResolutionExhausted {
        record_id: u64,
        from: Currency,
        to: Currency,
        date: NaiveDate,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no settings found for user {0}")]
    MissingSettings(UserId),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("export error: {0}")]
    Export(String),
}

impl From<fjall::Error> for FxError {
    fn from(value: fjall::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<serde_json::Error> for FxError {
    fn from(value: serde_json::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<csv::Error> for FxError {
    fn from(value: csv::Error) -> Self {
        Self::Export(value.to_string())
    }
}
