//! Operator tool: repair the fill price of a corrupted filled order.
//!
//! Best-effort bookkeeping repair, not part of the order invariants: the
//! balance and average-price adjustments undo the bad fill's contribution
//! and apply the corrected one, which is not always an exact inverse of the
//! original transaction. Dry-run by default; `apply` performs the mutation
//! in one ledger transaction.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::core::domain::{within_sanity_band, OrderId, OrderStatus, Side};
use crate::core::ledger::Ledger;
use crate::error::{Error, Result};

/// What a repair would (or did) change.
#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    pub order_id: OrderId,
    pub code: String,
    pub side: Side,
    pub quantity: Decimal,
    pub old_filled_price: Decimal,
    pub new_filled_price: Decimal,
    pub old_fee: Decimal,
    pub new_fee: Decimal,
    /// Signed balance adjustment (positive = refund to the participant).
    pub balance_delta: Decimal,
    /// Corrected average buy price, when a buy-side position still exists.
    pub new_avg_buy_price: Option<Decimal>,
}

pub struct RepairService<L: Ledger> {
    ledger: Arc<L>,
}

impl<L: Ledger> RepairService<L> {
    #[must_use]
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// Compute the repair without touching anything.
    pub fn plan(&self, order_id: OrderId, correct_price: Decimal) -> Result<RepairReport> {
        let order = self
            .ledger
            .get_order(order_id)?
            .ok_or(Error::NotFound("order"))?;
        if order.status != OrderStatus::Filled {
            return Err(Error::Invalid("only filled orders can be repaired".into()));
        }
        if !within_sanity_band(order.code.as_str(), correct_price) {
            return Err(Error::PriceOutOfBand {
                code: order.code.as_str().to_string(),
                price: correct_price,
            });
        }

        let participant = self
            .ledger
            .get_participant(order.participant_id)?
            .ok_or(Error::NotFound("participant"))?;
        let competition = self
            .ledger
            .get_competition(participant.competition_id)?
            .ok_or(Error::NotFound("competition"))?;

        let old_price = order.filled_price.unwrap_or(Decimal::ZERO);
        let quantity = order.quantity;
        let old_total = old_price * quantity;
        let new_total = correct_price * quantity;
        let old_fee = old_total * competition.fee_rate;
        let new_fee = new_total * competition.fee_rate;

        let balance_delta = match order.side {
            // Paid (old_total + old_fee), should have paid (new_total + new_fee).
            Side::Buy => (old_total + old_fee) - (new_total + new_fee),
            // Received (old_total - old_fee), should have received (new_total - new_fee).
            Side::Sell => (new_total - new_fee) - (old_total - old_fee),
        };

        // For buys, swap this order's contribution out of the position's
        // weighted average.
        let new_avg_buy_price = if order.side == Side::Buy {
            self.ledger
                .get_position(participant.id, &order.code)?
                .filter(|p| p.quantity > Decimal::ZERO)
                .map(|p| (p.cost_basis() - old_total + new_total) / p.quantity)
        } else {
            None
        };

        Ok(RepairReport {
            order_id,
            code: order.code.as_str().to_string(),
            side: order.side,
            quantity,
            old_filled_price: old_price,
            new_filled_price: correct_price,
            old_fee,
            new_fee,
            balance_delta,
            new_avg_buy_price,
        })
    }

    /// Apply the repair in one transaction and return what changed.
    pub fn apply(&self, order_id: OrderId, correct_price: Decimal) -> Result<RepairReport> {
        let report = self.plan(order_id, correct_price)?;
        let order = self
            .ledger
            .get_order(order_id)?
            .ok_or(Error::NotFound("order"))?;
        let participant_id = order.participant_id;

        self.ledger.with_tx(|tx| {
            tx.credit_balance(participant_id, report.balance_delta)?;
            if let Some(avg) = report.new_avg_buy_price {
                tx.set_position_avg_price(participant_id, &order.code, avg)?;
            }
            tx.set_order_fill_price(order_id, report.new_filled_price, report.new_fee)?;
            tx.update_trade_fill(
                order_id,
                report.new_filled_price,
                report.new_filled_price * report.quantity,
                report.new_fee,
            )?;
            Ok(())
        })?;

        info!(
            order_id = %order_id,
            old_price = %report.old_filled_price,
            new_price = %report.new_filled_price,
            balance_delta = %report.balance_delta,
            "order repaired"
        );
        Ok(report)
    }
}
