//! Money and denomination arithmetic.
//!
//! The drawer is counted in two currencies: córdobas (NIO, local) and US
//! dollars (USD, foreign). Denomination sets are fixed configuration, not
//! computed. Totals are always recomputed from counts — a stored total is
//! display data, never an input.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Drawer currency. NIO is the local currency; cash sales feed into its
/// expected balance, never into USD's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "NIO")]
    Nio,
    #[serde(rename = "USD")]
    Usd,
}

impl Currency {
    pub const ALL: [Currency; 2] = [Currency::Nio, Currency::Usd];

    /// Parse a currency code, accepting the symbols printed on older tickets.
    pub fn parse(s: &str) -> Option<Currency> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NIO" | "C$" => Some(Currency::Nio),
            "USD" | "US$" | "$" => Some(Currency::Usd),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Nio => "NIO",
            Currency::Usd => "USD",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Nio => "C$",
            Currency::Usd => "US$",
        }
    }

    /// True for the currency that receives local cash sales.
    pub fn is_local(&self) -> bool {
        matches!(self, Currency::Nio)
    }

    /// Legal-tender denominations for this currency, ascending.
    pub fn denominations(&self) -> &'static [(&'static str, f64)] {
        match self {
            Currency::Nio => NIO_DENOMS,
            Currency::Usd => USD_DENOMS,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Córdoba notes in circulation.
const NIO_DENOMS: &[(&str, f64)] = &[
    ("1", 1.0),
    ("5", 5.0),
    ("10", 10.0),
    ("20", 20.0),
    ("50", 50.0),
    ("100", 100.0),
    ("200", 200.0),
    ("500", 500.0),
    ("1000", 1000.0),
];

/// US dollar notes in circulation.
const USD_DENOMS: &[(&str, f64)] = &[
    ("1", 1.0),
    ("2", 2.0),
    ("5", 5.0),
    ("10", 10.0),
    ("20", 20.0),
    ("50", 50.0),
    ("100", 100.0),
];

/// Round to 2 decimals. Non-finite input (NaN, ±inf) coerces to 0.
pub fn round_money(x: f64) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    (x * 100.0).round() / 100.0
}

/// Coerce one raw count value (number or numeric string) to a non-negative
/// integer: truncate toward zero, clamp negatives to 0, anything unparseable
/// to 0.
fn coerce_count(raw: Option<&serde_json::Value>) -> i64 {
    let n = match raw {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if !n.is_finite() {
        return 0;
    }
    let truncated = n.trunc() as i64;
    truncated.max(0)
}

/// Normalize a raw denomination map for `currency`: every valid denomination
/// gets an entry (missing defaults to 0), counts coerced to non-negative
/// integers, unknown keys dropped.
pub fn normalize_denom_counts(
    currency: Currency,
    raw: &serde_json::Value,
) -> BTreeMap<String, i64> {
    let obj = raw.as_object();
    currency
        .denominations()
        .iter()
        .map(|(key, _)| {
            let count = coerce_count(obj.and_then(|o| o.get(*key)));
            (key.to_string(), count)
        })
        .collect()
}

/// Canonicalize an already-typed count map: known denominations only,
/// negatives clamped to 0, missing entries filled with 0.
pub fn sanitize_counts(currency: Currency, counts: &BTreeMap<String, i64>) -> BTreeMap<String, i64> {
    currency
        .denominations()
        .iter()
        .map(|(key, _)| {
            let count = counts.get(*key).copied().unwrap_or(0).max(0);
            (key.to_string(), count)
        })
        .collect()
}

/// Σ(denomination value × count), rounded to 2 decimals. Unknown keys in
/// `counts` contribute nothing.
pub fn sum_denom_total(currency: Currency, counts: &BTreeMap<String, i64>) -> f64 {
    let sum = currency
        .denominations()
        .iter()
        .map(|(key, value)| value * counts.get(*key).copied().unwrap_or(0).max(0) as f64)
        .sum();
    round_money(sum)
}

// ---------------------------------------------------------------------------
// Per-currency drawer count
// ---------------------------------------------------------------------------

/// One currency's drawer count: the denomination map plus its derived total.
/// The total is recomputed from the counts on every construction; a stored
/// total is never trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyCount {
    pub denom_counts: BTreeMap<String, i64>,
    pub total: f64,
}

impl CurrencyCount {
    /// Build from a typed count map, canonicalizing and recomputing the total.
    pub fn from_counts(currency: Currency, counts: &BTreeMap<String, i64>) -> CurrencyCount {
        let denom_counts = sanitize_counts(currency, counts);
        let total = sum_denom_total(currency, &denom_counts);
        CurrencyCount {
            denom_counts,
            total,
        }
    }

    /// Build from raw JSON of shape `{denomCounts, total}` (or anything
    /// looser). A stored `total` is ignored and recomputed.
    pub fn from_raw(currency: Currency, raw: &serde_json::Value) -> CurrencyCount {
        let counts_raw = raw.get("denomCounts").unwrap_or(&serde_json::Value::Null);
        let denom_counts = normalize_denom_counts(currency, counts_raw);
        let total = sum_denom_total(currency, &denom_counts);
        CurrencyCount { denom_counts, total }
    }

    /// Empty count (all denominations zero).
    pub fn zero(currency: Currency) -> CurrencyCount {
        CurrencyCount::from_counts(currency, &BTreeMap::new())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
