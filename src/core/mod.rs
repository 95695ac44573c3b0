//! Core rate, conversion and aggregation logic

pub mod aggregation;
pub mod config;
pub mod conversion;
pub mod currency;
pub mod error;
pub mod export;
pub mod fallback;
pub mod ledger;
pub mod log;
pub mod rates;

// Re-export main types for cleaner imports
pub use aggregation::{Aggregator, Statistics, StatisticsQuery, Summary, SummaryQuery};
pub use conversion::{ConversionEngine, ResolutionPath, ResolvedRate};
pub use currency::{Currency, ExchangeRate, RateProvider, RateSource};
pub use error::{FxError, FxResult};
pub use fallback::FallbackRates;
pub use ledger::{DateRange, LedgerSource, SettingsSource, UserId};
pub use rates::RateStore;
