//! Currency abstractions and exchange-rate types

use crate::core::error::{FxError, FxResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

/// The fixed set of currencies the tracker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Mkd,
    Eur,
    Usd,
    Aud,
    Chf,
    Gbp,
}

impl Currency {
    pub const ALL: [Currency; 6] = [
        Currency::Mkd,
        Currency::Eur,
        Currency::Usd,
        Currency::Aud,
        Currency::Chf,
        Currency::Gbp,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Mkd => "MKD",
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
            Currency::Aud => "AUD",
            Currency::Chf => "CHF",
            Currency::Gbp => "GBP",
        }
    }

    /// Looks up a supported currency by its ISO code. Unknown codes yield `None`.
    pub fn from_code(code: &str) -> Option<Currency> {
        Currency::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(code.trim()))
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::from_code(s)
            .ok_or_else(|| FxError::InvalidInput(format!("unsupported currency: {s}")))
    }
}

/// Provenance of a stored rate row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateSource {
    Live,
    Fallback,
}

/// A persisted, directional conversion factor: `amount * rate` converts an
/// amount in `from_currency` into `to_currency`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub id: u64,
    pub from_currency: Currency,
    pub to_currency: Currency,
    pub rate: f64,
    pub source: RateSource,
    pub fetched_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Fetches the latest rates quoted against a base currency.
///
/// The returned map reads "units of key per one unit of `base`", exactly as
/// the provider quotes it. Implementations never return a partial map: any
/// failure is an error.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn fetch_rates(&self, base: Currency) -> FxResult<HashMap<Currency, f64>>;
}
