//! Coin positions held by participants.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::ParticipantId;
use super::market::MarketCode;

/// A participant's holding in one coin. Unique per `(participant, code)`;
/// created lazily on the first buy fill and deleted once drained below ε.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub participant_id: ParticipantId,
    pub code: MarketCode,
    pub quantity: Decimal,
    /// Weighted-average acquisition price.
    pub avg_buy_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Total acquisition cost of the holding.
    #[must_use]
    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.avg_buy_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn cost_basis_is_quantity_times_avg() {
        let position = Position {
            participant_id: ParticipantId::new(),
            code: MarketCode::from("KRW-BTC"),
            quantity: dec!(0.01),
            avg_buy_price: dec!(95_000_000),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(position.cost_basis(), dec!(950_000));
    }
}
