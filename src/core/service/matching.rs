//! Matching of resting limit orders against the live tick stream.
//!
//! Stateless between ticks: eligibility is read from the ledger each time,
//! and the order service performs the fills. Crossing limits are always
//! satisfied at the current tick price, so price-time priority collapses to
//! time priority within a tick.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::orders::OrderService;
use crate::core::domain::{MarketCode, Ticker};
use crate::core::ledger::Ledger;

pub struct MatchingEngine<L: Ledger> {
    ledger: Arc<L>,
    orders: Arc<OrderService<L>>,
}

impl<L: Ledger> MatchingEngine<L> {
    #[must_use]
    pub fn new(ledger: Arc<L>, orders: Arc<OrderService<L>>) -> Self {
        Self { ledger, orders }
    }

    /// Fill every resting limit order the tick makes eligible, oldest first.
    /// A failure on one order is logged and skipped; it never aborts the
    /// batch. Returns the number of fills.
    pub async fn process_tick(&self, tick: &Ticker) -> usize {
        let code = MarketCode::from(tick.code.as_str());
        let price = tick.trade_price;
        let mut filled = 0;

        let buys = match self.ledger.eligible_buy_orders(&code, price) {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, code = %code, "eligible buy query failed, skipping tick");
                return 0;
            }
        };
        let sells = match self.ledger.eligible_sell_orders(&code, price) {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, code = %code, "eligible sell query failed, skipping tick");
                return 0;
            }
        };

        for order in buys.iter().chain(sells.iter()) {
            match self.orders.execute_limit(order, price).await {
                Ok(_) => {
                    filled += 1;
                    info!(
                        order_id = %order.id,
                        side = %order.side,
                        code = %code,
                        price = %price,
                        "matched resting order"
                    );
                }
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "limit execution failed, skipping");
                }
            }
        }

        if filled == 0 {
            debug!(code = %code, price = %price, "tick matched no resting orders");
        }
        filled
    }
}
