//! The order service: transactional create / cancel / fill of market and
//! limit orders.
//!
//! Every mutation runs inside one ledger transaction. Cross-request safety
//! comes from the conditional primitives (atomic guards) in the ledger, not
//! from the per-user mutex: the mutex only serializes rapid retries so the
//! loser sees a clean insufficiency error instead of a guard conflict.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::core::archive::PriceSource;
use crate::core::cache::{keys, CacheStore};
use crate::core::domain::{
    within_sanity_band, Competition, MarketCode, Order, OrderId, OrderRequest, OrderType,
    Participant, Position, Side, Trade, UserId, MAX_PRICE_DEVIATION,
};
use crate::core::ledger::Ledger;
use crate::error::{Error, Result};

/// Poll step while waiting on the per-user order mutex.
const LOCK_RETRY_STEP: Duration = Duration::from_millis(50);

pub struct OrderService<L: Ledger> {
    ledger: Arc<L>,
    cache: Arc<dyn CacheStore>,
    prices: Arc<PriceSource>,
}

impl<L: Ledger> OrderService<L> {
    #[must_use]
    pub fn new(ledger: Arc<L>, cache: Arc<dyn CacheStore>, prices: Arc<PriceSource>) -> Self {
        Self {
            ledger,
            cache,
            prices,
        }
    }

    /// The operation behind `POST /orders`: resolve the participant, reject
    /// duplicates, serialize per user, validate the price against the
    /// archive, then dispatch to the market or limit flow.
    pub async fn place_order(
        &self,
        user: UserId,
        request: &OrderRequest,
        client_price: Decimal,
    ) -> Result<Order> {
        if request.quantity <= Decimal::ZERO {
            return Err(Error::Invalid("quantity must be positive".into()));
        }
        if client_price <= Decimal::ZERO {
            return Err(Error::Invalid("current_price must be positive".into()));
        }

        let (participant, competition) = self
            .ledger
            .find_active_participation(user)?
            .ok_or(Error::NotFound("participant"))?;

        let now = Utc::now();
        if !competition.is_open_at(now) {
            return Err(Error::CompetitionClosed(format!(
                "competition window is {} .. {}",
                competition.start_time, competition.end_time
            )));
        }

        self.suppress_duplicates(user, request).await?;

        let lock_name = keys::order_lock(user);
        let token = self.acquire_order_lock(&lock_name).await?;
        let result = self
            .dispatch(&participant, &competition, request, client_price)
            .await;
        self.cache.release_lock(&lock_name, &token).await;
        result
    }

    async fn dispatch(
        &self,
        participant: &Participant,
        competition: &Competition,
        request: &OrderRequest,
        client_price: Decimal,
    ) -> Result<Order> {
        let market_price = self
            .resolve_market_price(request.code.as_str(), client_price)
            .await?;

        match request.order_type {
            OrderType::Market => {
                self.create_market_order(
                    participant,
                    competition,
                    &request.code,
                    request.side,
                    request.quantity,
                    market_price,
                )
                .await
            }
            OrderType::Limit => {
                let limit_price = request
                    .price
                    .ok_or_else(|| Error::Invalid("limit order requires a price".into()))?;
                self.create_limit_order(
                    participant,
                    competition,
                    &request.code,
                    request.side,
                    request.quantity,
                    limit_price,
                    market_price,
                )
                .await
            }
        }
    }

    /// Authoritative fill price: the archived market price when available
    /// (after checking the client's view is within ±10% of it), otherwise
    /// the client-supplied price.
    async fn resolve_market_price(&self, code: &str, client_price: Decimal) -> Result<Decimal> {
        match self.prices.latest(code).await? {
            Some(server_price) if server_price > Decimal::ZERO => {
                let deviation = (client_price - server_price).abs() / server_price;
                if deviation > MAX_PRICE_DEVIATION {
                    return Err(Error::PriceMismatch {
                        client: client_price,
                        server: server_price,
                    });
                }
                Ok(server_price)
            }
            _ => Ok(client_price),
        }
    }

    /// Create and immediately fill a market order at `price`.
    pub async fn create_market_order(
        &self,
        participant: &Participant,
        competition: &Competition,
        code: &MarketCode,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Order> {
        if !within_sanity_band(code.as_str(), price) {
            return Err(Error::PriceOutOfBand {
                code: code.as_str().to_string(),
                price,
            });
        }

        let total = price * quantity;
        let fee = total * competition.fee_rate;
        let now = Utc::now();
        let participant_id = participant.id;
        let code = code.clone();

        let order = self.ledger.with_tx(|tx| {
            match side {
                Side::Buy => {
                    let total_cost = total + fee;
                    let current = tx
                        .get_participant(participant_id)?
                        .ok_or(Error::NotFound("participant"))?;
                    if current.balance < total_cost {
                        return Err(Error::InsufficientFunds);
                    }
                    if !tx.debit_balance(participant_id, total_cost)? {
                        return Err(Error::ConcurrentRequest);
                    }
                }
                Side::Sell => {
                    let held = tx
                        .get_position(participant_id, &code)?
                        .map_or(Decimal::ZERO, |p| p.quantity);
                    if held < quantity {
                        return Err(Error::InsufficientPosition);
                    }
                    if !tx.debit_position(participant_id, &code, quantity)? {
                        return Err(Error::ConcurrentRequest);
                    }
                }
            }

            let order = Order::market_fill(participant_id, code.clone(), side, quantity, price, fee, now);
            tx.insert_order(&order)?;

            match side {
                Side::Buy => tx.upsert_position(participant_id, &code, quantity, price, now)?,
                Side::Sell => {
                    tx.credit_balance(participant_id, total - fee)?;
                    tx.cleanup_dust_position(participant_id, &code)?;
                }
            }

            tx.insert_trade(&Trade::for_fill(
                order.id,
                participant_id,
                code.clone(),
                side,
                price,
                quantity,
                fee,
                now,
            ))?;
            Ok(order)
        })?;

        info!(
            order_id = %order.id,
            side = %side,
            code = %order.code,
            quantity = %quantity,
            price = %price,
            "market order filled"
        );
        Ok(order)
    }

    /// Create a limit order: escalate to a market order when it crosses the
    /// market, otherwise reserve funds or coin and rest it.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_limit_order(
        &self,
        participant: &Participant,
        competition: &Competition,
        code: &MarketCode,
        side: Side,
        quantity: Decimal,
        limit_price: Decimal,
        market_price: Decimal,
    ) -> Result<Order> {
        if !within_sanity_band(code.as_str(), limit_price) {
            return Err(Error::PriceOutOfBand {
                code: code.as_str().to_string(),
                price: limit_price,
            });
        }

        if market_price > Decimal::ZERO {
            // A limit a full band away from the market is not a price the
            // matching engine could ever reach honestly; reject at the
            // boundary.
            let deviation = (limit_price - market_price).abs() / market_price;
            if deviation >= MAX_PRICE_DEVIATION {
                return Err(Error::PriceOutOfBand {
                    code: code.as_str().to_string(),
                    price: limit_price,
                });
            }

            // A limit at or beyond the market is satisfiable right now;
            // execute it as a market order at the market price.
            let crosses = match side {
                Side::Buy => limit_price >= market_price,
                Side::Sell => limit_price <= market_price,
            };
            if crosses {
                return self
                    .create_market_order(
                        participant,
                        competition,
                        code,
                        side,
                        quantity,
                        market_price,
                    )
                    .await;
            }
        }

        let total = limit_price * quantity;
        let fee = total * competition.fee_rate;
        let now = Utc::now();
        let participant_id = participant.id;
        let code = code.clone();

        let order = self.ledger.with_tx(|tx| {
            match side {
                Side::Buy => {
                    let total_cost = total + fee;
                    let current = tx
                        .get_participant(participant_id)?
                        .ok_or(Error::NotFound("participant"))?;
                    if current.balance < total_cost {
                        return Err(Error::InsufficientFunds);
                    }
                    if !tx.debit_balance(participant_id, total_cost)? {
                        return Err(Error::ConcurrentRequest);
                    }
                }
                Side::Sell => {
                    let held = tx
                        .get_position(participant_id, &code)?
                        .map_or(Decimal::ZERO, |p| p.quantity);
                    if held < quantity {
                        return Err(Error::InsufficientPosition);
                    }
                    if !tx.debit_position(participant_id, &code, quantity)? {
                        return Err(Error::ConcurrentRequest);
                    }
                    // Reserving the whole holding may drain the row to zero;
                    // cancel recreates it through the UPSERT.
                    tx.cleanup_dust_position(participant_id, &code)?;
                }
            }

            let order =
                Order::pending_limit(participant_id, code.clone(), side, quantity, limit_price, now);
            tx.insert_order(&order)?;
            Ok(order)
        })?;

        info!(
            order_id = %order.id,
            side = %side,
            code = %order.code,
            quantity = %quantity,
            limit_price = %limit_price,
            "limit order resting"
        );
        Ok(order)
    }

    /// Cancel a pending limit order, refunding exactly what was reserved at
    /// create time. The coin refund tolerates the position row having been
    /// dust-cleaned away in the meantime.
    pub async fn cancel_order(&self, user: UserId, order_id: OrderId) -> Result<Order> {
        let order = self
            .ledger
            .get_order(order_id)?
            .ok_or(Error::NotFound("order"))?;
        let participant = self
            .ledger
            .get_participant(order.participant_id)?
            .ok_or(Error::NotFound("participant"))?;
        if participant.user_id != user {
            return Err(Error::NotFound("order"));
        }
        if order.order_type != OrderType::Limit || !order.is_pending() {
            return Err(Error::Invalid(
                "only pending limit orders can be cancelled".into(),
            ));
        }
        let competition = self
            .ledger
            .get_competition(participant.competition_id)?
            .ok_or(Error::NotFound("competition"))?;

        let limit_price = order
            .price
            .ok_or_else(|| Error::Database("limit order without price".into()))?;
        let total = limit_price * order.quantity;
        let fee = total * competition.fee_rate;
        let now = Utc::now();

        self.ledger.with_tx(|tx| {
            if !tx.mark_order_cancelled(order.id, now)? {
                // Filled or cancelled since we looked.
                return Err(Error::ConcurrentRequest);
            }
            match order.side {
                Side::Buy => tx.credit_balance(participant.id, total + fee)?,
                Side::Sell => {
                    tx.restore_position(participant.id, &order.code, order.quantity, limit_price, now)?;
                }
            }
            Ok(())
        })?;

        info!(order_id = %order.id, "limit order cancelled");
        self.ledger
            .get_order(order_id)?
            .ok_or(Error::NotFound("order"))
    }

    /// Fill a resting limit order at `execution_price`. Called by the
    /// matching engine; the reservation was taken at create time, so only
    /// the other side of the ledger moves here.
    pub async fn execute_limit(&self, order: &Order, execution_price: Decimal) -> Result<Order> {
        if !within_sanity_band(order.code.as_str(), execution_price) {
            return Err(Error::PriceOutOfBand {
                code: order.code.as_str().to_string(),
                price: execution_price,
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
        let limit_price = order
            .price
            .ok_or_else(|| Error::Database("limit order without price".into()))?;

        let quantity = order.quantity;
        let total = execution_price * quantity;
        let fee = total * competition.fee_rate;
        let now = Utc::now();

        self.ledger.with_tx(|tx| {
            if !tx.mark_order_filled(order.id, execution_price, quantity, fee, now)? {
                return Err(Error::ConcurrentRequest);
            }
            match order.side {
                Side::Buy => {
                    tx.upsert_position(participant.id, &order.code, quantity, execution_price, now)?;
                    // The reserve was taken at the limit price; hand back the
                    // savings from a better fill.
                    let price_diff = limit_price - execution_price;
                    if price_diff > Decimal::ZERO {
                        tx.credit_balance(participant.id, price_diff * quantity)?;
                    }
                }
                Side::Sell => {
                    tx.credit_balance(participant.id, total - fee)?;
                    tx.cleanup_dust_position(participant.id, &order.code)?;
                }
            }
            tx.insert_trade(&Trade::for_fill(
                order.id,
                participant.id,
                order.code.clone(),
                order.side,
                execution_price,
                quantity,
                fee,
                now,
            ))?;
            Ok(())
        })?;

        info!(
            order_id = %order.id,
            side = %order.side,
            code = %order.code,
            execution_price = %execution_price,
            "limit order executed"
        );
        self.ledger
            .get_order(order.id)?
            .ok_or(Error::NotFound("order"))
    }

    // Read-through projections for the GET endpoints.

    pub fn balance(&self, user: UserId) -> Result<(Participant, Competition)> {
        self.ledger
            .find_active_participation(user)?
            .ok_or(Error::NotFound("participant"))
    }

    pub fn positions(&self, user: UserId) -> Result<Vec<Position>> {
        let (participant, _) = self.balance(user)?;
        self.ledger.list_positions(participant.id)
    }

    pub fn orders(&self, user: UserId) -> Result<Vec<Order>> {
        let (participant, _) = self.balance(user)?;
        self.ledger.list_orders(participant.id)
    }

    pub fn trades(&self, user: UserId) -> Result<Vec<Trade>> {
        let (participant, _) = self.balance(user)?;
        self.ledger.list_trades(participant.id)
    }

    async fn suppress_duplicates(&self, user: UserId, request: &OrderRequest) -> Result<()> {
        let accepted = match &request.idempotency_key {
            Some(key) => {
                self.cache
                    .set_nx_ex(
                        &keys::order_idempotency(user, key),
                        "1",
                        keys::TTL_IDEMPOTENCY,
                    )
                    .await
            }
            None => {
                let digest = content_digest(request);
                self.cache
                    .set_nx_ex(&keys::order_hash(user, &digest), "1", keys::TTL_ORDER_HASH)
                    .await
            }
        };
        if accepted {
            Ok(())
        } else {
            warn!(user = %user, "duplicate order suppressed");
            Err(Error::DuplicateOrder)
        }
    }

    /// Acquire the per-user order mutex within the wait budget. A backend
    /// outage fails open inside the cache store, so this only times out under
    /// real contention.
    async fn acquire_order_lock(&self, name: &str) -> Result<String> {
        let deadline = tokio::time::Instant::now() + keys::ORDER_LOCK_WAIT;
        loop {
            if let Some(token) = self.cache.acquire_lock(name, keys::TTL_ORDER_LOCK).await {
                return Ok(token);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::ContentionTimeout);
            }
            tokio::time::sleep(LOCK_RETRY_STEP).await;
        }
    }
}

/// Stable digest of the order content used for keyless duplicate
/// suppression: `(code, side, order_type, quantity, price)`.
fn content_digest(request: &OrderRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.code.as_str());
    hasher.update(b":");
    hasher.update(request.side.as_str());
    hasher.update(b":");
    hasher.update(request.order_type.as_str());
    hasher.update(b":");
    hasher.update(request.quantity.to_string());
    hasher.update(b":");
    if let Some(price) = request.price {
        hasher.update(price.to_string());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(price: Option<Decimal>) -> OrderRequest {
        OrderRequest {
            code: MarketCode::from("KRW-BTC"),
            side: Side::Buy,
            order_type: OrderType::Limit,
            quantity: dec!(0.01),
            price,
            idempotency_key: None,
        }
    }

    #[test]
    fn content_digest_is_stable_and_price_sensitive() {
        let a = content_digest(&request(Some(dec!(95_000_000))));
        let b = content_digest(&request(Some(dec!(95_000_000))));
        let c = content_digest(&request(Some(dec!(96_000_000))));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
