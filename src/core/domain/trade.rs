//! Immutable fill records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{OrderId, ParticipantId, TradeId};
use super::market::MarketCode;
use super::order::Side;

/// Emitted exactly once when an order reaches `filled`; never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub order_id: OrderId,
    pub participant_id: ParticipantId,
    pub code: MarketCode,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub total_amount: Decimal,
    pub fee: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Trade {
    /// Build the fill record for an order executed at `price`.
    #[must_use]
    pub fn for_fill(
        order_id: OrderId,
        participant_id: ParticipantId,
        code: MarketCode,
        side: Side,
        price: Decimal,
        quantity: Decimal,
        fee: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TradeId::new(),
            order_id,
            participant_id,
            code,
            side,
            price,
            quantity,
            total_amount: price * quantity,
            fee,
            created_at: now,
        }
    }
}
