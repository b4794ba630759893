//! Market codes and the per-code price sanity band.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Market code in the upstream feed's notation, e.g. `KRW-BTC`.
///
/// The inner String is private so construction goes through the defined
/// constructors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketCode(String);

impl MarketCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MarketCode {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for MarketCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Codes the platform supports end to end: feed subscription, matching, and
/// order validation all use this universe.
pub const SUPPORTED_CODES: [&str; 10] = [
    "KRW-BTC", "KRW-ETH", "KRW-XRP", "KRW-SOL", "KRW-DOGE", "KRW-ADA", "KRW-AVAX", "KRW-DOT",
    "KRW-LINK", "KRW-MATIC",
];

/// Rough per-code KRW price ranges. An order price outside half the lower
/// bound or twice the upper bound is rejected outright, regardless of what
/// the feed currently says.
const PRICE_RANGES: [(&str, i64, i64); 10] = [
    ("KRW-BTC", 50_000_000, 200_000_000),
    ("KRW-ETH", 2_000_000, 10_000_000),
    ("KRW-XRP", 300, 5_000),
    ("KRW-SOL", 50_000, 500_000),
    ("KRW-DOGE", 100, 2_000),
    ("KRW-ADA", 200, 3_000),
    ("KRW-AVAX", 10_000, 200_000),
    ("KRW-DOT", 3_000, 50_000),
    ("KRW-LINK", 5_000, 100_000),
    ("KRW-MATIC", 200, 5_000),
];

/// The accepted `[min, max]` price interval for a code, or `None` when no
/// range is defined (such codes pass validation).
#[must_use]
pub fn sanity_band(code: &str) -> Option<(Decimal, Decimal)> {
    PRICE_RANGES
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, min, max)| (Decimal::from(*min) / Decimal::TWO, Decimal::from(*max) * Decimal::TWO))
}

/// Whether `price` is inside the sanity band for `code`.
#[must_use]
pub fn within_sanity_band(code: &str, price: Decimal) -> bool {
    match sanity_band(code) {
        Some((min, max)) => price >= min && price <= max,
        None => true,
    }
}
