//! Orders: the user-facing unit of execution.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{OrderId, ParticipantId};
use super::market::MarketCode;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            other => Err(Error::Parse(format!("unknown side: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Limit => "limit",
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "market" => Ok(Self::Market),
            "limit" => Ok(Self::Limit),
            other => Err(Error::Parse(format!("unknown order type: {other}"))),
        }
    }
}

/// Order lifecycle state. Orders only move forward: a market order is born
/// `filled`; a limit order is born `pending` and ends `filled` or
/// `cancelled`. Terminal orders are never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
}

impl OrderStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Filled => "filled",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "filled" => Ok(Self::Filled),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(Error::Parse(format!("unknown order status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub participant_id: ParticipantId,
    pub code: MarketCode,
    pub side: Side,
    pub order_type: OrderType,
    /// Limit price. `None` for market orders.
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub filled_price: Option<Decimal>,
    pub fee: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// A market order, born filled at `price`.
    #[must_use]
    pub fn market_fill(
        participant_id: ParticipantId,
        code: MarketCode,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        fee: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            participant_id,
            code,
            side,
            order_type: OrderType::Market,
            price: None,
            quantity,
            filled_quantity: quantity,
            filled_price: Some(price),
            fee,
            status: OrderStatus::Filled,
            created_at: now,
            filled_at: Some(now),
            cancelled_at: None,
        }
    }

    /// A resting limit order, born pending with its reservation already taken.
    #[must_use]
    pub fn pending_limit(
        participant_id: ParticipantId,
        code: MarketCode,
        side: Side,
        quantity: Decimal,
        limit_price: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            participant_id,
            code,
            side,
            order_type: OrderType::Limit,
            price: Some(limit_price),
            quantity,
            filled_quantity: Decimal::ZERO,
            filled_price: None,
            fee: Decimal::ZERO,
            status: OrderStatus::Pending,
            created_at: now,
            filled_at: None,
            cancelled_at: None,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }
}

/// Order placement request, the body of `POST /orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub code: MarketCode,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Required for limit orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// Optional client-chosen duplicate-suppression key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}
