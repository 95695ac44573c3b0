//! Static fallback rates, consulted only when no stored snapshot resolves.

use crate::core::currency::Currency;
use std::collections::HashMap;
use std::sync::LazyLock;

/// `(from, to, rate)` constants; `amount_in_from * rate = amount_in_to`.
const STANDARD_RATES: &[(Currency, Currency, f64)] = &[
    (Currency::Eur, Currency::Mkd, 61.55),
    (Currency::Usd, Currency::Mkd, 52.40),
    (Currency::Gbp, Currency::Mkd, 71.90),
    (Currency::Chf, Currency::Mkd, 65.80),
    (Currency::Aud, Currency::Mkd, 34.60),
    (Currency::Eur, Currency::Usd, 1.17),
    (Currency::Eur, Currency::Gbp, 0.86),
    (Currency::Eur, Currency::Chf, 0.94),
    (Currency::Eur, Currency::Aud, 1.78),
    (Currency::Gbp, Currency::Usd, 1.36),
    (Currency::Usd, Currency::Chf, 0.80),
    (Currency::Usd, Currency::Aud, 1.52),
    (Currency::Gbp, Currency::Chf, 1.09),
    (Currency::Gbp, Currency::Aud, 2.07),
    (Currency::Chf, Currency::Aud, 1.89),
];

static STANDARD: LazyLock<FallbackRates> =
    LazyLock::new(|| FallbackRates::from_entries(STANDARD_RATES));

static NONE: LazyLock<FallbackRates> = LazyLock::new(|| FallbackRates::from_entries(&[]));

/// Immutable fallback table keyed by currency pair.
#[derive(Debug)]
pub struct FallbackRates {
    rates: HashMap<(Currency, Currency), f64>,
}

impl FallbackRates {
    /// The process-wide table seeded at deploy time.
    pub fn standard() -> &'static FallbackRates {
        &STANDARD
    }

    /// An empty table; every lookup misses.
    pub fn none() -> &'static FallbackRates {
        &NONE
    }

    pub fn from_entries(entries: &[(Currency, Currency, f64)]) -> Self {
        let rates = entries
            .iter()
            .filter(|(_, _, rate)| rate.is_finite() && *rate > 0.0)
            .map(|(from, to, rate)| ((*from, *to), *rate))
            .collect();
        Self { rates }
    }

    /// Looks up the pair directly, then through its inverse.
    pub fn lookup(&self, from: Currency, to: Currency) -> Option<f64> {
        if from == to {
            return Some(1.0);
        }
        self.rates
            .get(&(from, to))
            .copied()
            .or_else(|| self.rates.get(&(to, from)).map(|rate| 1.0 / rate))
    }

    /// The directly declared pairs, in a stable order.
    pub fn entries(&self) -> Vec<(Currency, Currency, f64)> {
        let mut entries: Vec<_> = self
            .rates
            .iter()
            .map(|((from, to), rate)| (*from, *to, *rate))
            .collect();
        entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_has_documented_pairs() {
        let table = FallbackRates::standard();
        assert_eq!(table.lookup(Currency::Usd, Currency::Mkd), Some(52.40));
        assert_eq!(table.lookup(Currency::Eur, Currency::Mkd), Some(61.55));
    }

    #[test]
    fn test_inverse_lookup() {
        let table = FallbackRates::standard();
        let rate = table.lookup(Currency::Mkd, Currency::Usd).unwrap();
        assert!((rate - 1.0 / 52.40).abs() < 1e-12);
    }

    #[test]
    fn test_every_supported_pair_resolves() {
        let table = FallbackRates::standard();
        for from in Currency::ALL {
            for to in Currency::ALL {
                assert!(table.lookup(from, to).is_some(), "{from}->{to} missing");
            }
        }
    }

    #[test]
    fn test_empty_table_misses() {
        let table = FallbackRates::none();
        assert!(table.is_empty());
        assert_eq!(table.lookup(Currency::Usd, Currency::Mkd), None);
    }

    #[test]
    fn test_invalid_constants_are_dropped() {
        let table = FallbackRates::from_entries(&[(Currency::Eur, Currency::Usd, 0.0)]);
        assert!(table.is_empty());
    }
}
