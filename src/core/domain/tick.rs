//! The upstream ticker frame.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One market-data update for one code, as decoded from the upstream feed.
///
/// Modeled as a closed record: the fields below are recognized, anything
/// else in the frame is ignored. Price and volume fields are decimals from
/// the moment of decode; they never pass through a binary float.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub code: String,
    pub trade_price: Decimal,
    /// Feed receipt time in epoch milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub opening_price: Option<Decimal>,
    #[serde(default)]
    pub high_price: Option<Decimal>,
    #[serde(default)]
    pub low_price: Option<Decimal>,
    #[serde(default)]
    pub prev_closing_price: Option<Decimal>,
    #[serde(default)]
    pub change: Option<String>,
    #[serde(default)]
    pub change_price: Option<Decimal>,
    #[serde(default)]
    pub signed_change_price: Option<Decimal>,
    #[serde(default)]
    pub change_rate: Option<Decimal>,
    #[serde(default)]
    pub signed_change_rate: Option<Decimal>,
    #[serde(default)]
    pub trade_volume: Option<Decimal>,
    #[serde(default)]
    pub acc_trade_volume: Option<Decimal>,
    #[serde(default)]
    pub acc_trade_volume_24h: Option<Decimal>,
    #[serde(default)]
    pub acc_trade_price: Option<Decimal>,
    #[serde(default)]
    pub acc_trade_price_24h: Option<Decimal>,
    #[serde(default)]
    pub trade_timestamp: Option<i64>,
    #[serde(default)]
    pub ask_bid: Option<String>,
    #[serde(default)]
    pub acc_ask_volume: Option<Decimal>,
    #[serde(default)]
    pub acc_bid_volume: Option<Decimal>,
}

impl Ticker {
    /// Feed receipt time as a UTC timestamp.
    #[must_use]
    pub fn received_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or_else(Utc::now)
    }
}
