//! The relational ledger: competitions, participants, balances, positions,
//! orders and trades.
//!
//! All cross-row safety inside an order operation comes from the conditional
//! primitives defined here (the atomic-guard pattern) executed inside one
//! transaction, not from application-level locking. [`LedgerTx`] is the
//! transaction-scoped surface; [`Ledger`] adds the plain queries and the
//! transaction wrapper.
//!
//! Two implementations: [`postgres::PgLedger`] over Diesel, and
//! [`memory::MemoryLedger`] for tests and offline tooling.

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedger;
pub use postgres::PgLedger;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::core::domain::{
    ApiKey, ApiKeyId, Competition, CompetitionId, CompetitionStatus, MarketCode, Order, OrderId,
    Participant, ParticipantId, Position, Trade, User, UserId,
};
use crate::error::Result;

/// Transaction-scoped ledger operations.
///
/// Methods returning `bool` are conditional single-statement updates: `false`
/// means the guard fired (precondition no longer held) and nothing changed.
pub trait LedgerTx {
    /// `balance -= amount` iff `balance >= amount`.
    fn debit_balance(&mut self, participant: ParticipantId, amount: Decimal) -> Result<bool>;

    /// Unconditionally add `delta` to the balance. Negative deltas are only
    /// used by the operator repair tool.
    fn credit_balance(&mut self, participant: ParticipantId, delta: Decimal) -> Result<()>;

    /// `position.quantity -= qty` iff the row exists and `quantity >= qty`.
    fn debit_position(
        &mut self,
        participant: ParticipantId,
        code: &MarketCode,
        qty: Decimal,
    ) -> Result<bool>;

    /// UPSERT bound to the `(participant, code)` uniqueness constraint:
    /// insert the row, or add `qty` and fold `price` into the weighted
    /// average buy price.
    fn upsert_position(
        &mut self,
        participant: ParticipantId,
        code: &MarketCode,
        qty: Decimal,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// UPSERT that only restores quantity (cancel refunds): add `qty` to an
    /// existing row without touching its average, or recreate the row at
    /// `fallback_price` when dust cleanup already deleted it.
    fn restore_position(
        &mut self,
        participant: ParticipantId,
        code: &MarketCode,
        qty: Decimal,
        fallback_price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Delete the position row once it is at or below ε.
    fn cleanup_dust_position(
        &mut self,
        participant: ParticipantId,
        code: &MarketCode,
    ) -> Result<usize>;

    /// Overwrite the stored average buy price (operator repair only).
    fn set_position_avg_price(
        &mut self,
        participant: ParticipantId,
        code: &MarketCode,
        avg_buy_price: Decimal,
    ) -> Result<bool>;

    fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// `pending -> filled` with fill details; `false` if the order was no
    /// longer pending.
    fn mark_order_filled(
        &mut self,
        order: OrderId,
        filled_price: Decimal,
        filled_quantity: Decimal,
        fee: Decimal,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// `pending -> cancelled`; `false` if the order was no longer pending.
    fn mark_order_cancelled(&mut self, order: OrderId, now: DateTime<Utc>) -> Result<bool>;

    /// Overwrite the fill price and fee of a filled order (operator repair).
    fn set_order_fill_price(&mut self, order: OrderId, price: Decimal, fee: Decimal) -> Result<()>;

    fn insert_trade(&mut self, trade: &Trade) -> Result<()>;

    /// Rewrite a trade's fill figures (operator repair).
    fn update_trade_fill(
        &mut self,
        order: OrderId,
        price: Decimal,
        total_amount: Decimal,
        fee: Decimal,
    ) -> Result<()>;

    fn get_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    fn get_participant(&mut self, id: ParticipantId) -> Result<Option<Participant>>;

    fn get_position(
        &mut self,
        participant: ParticipantId,
        code: &MarketCode,
    ) -> Result<Option<Position>>;
}

/// The ledger store: transaction wrapper plus plain queries.
pub trait Ledger: Send + Sync + 'static {
    /// Run `f` inside a single database transaction. Any error rolls the
    /// whole transaction back.
    fn with_tx<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T>;

    // Users and API keys.

    /// Find or create the user mapped from an external identity subject.
    fn upsert_user(&self, external_id: &str, email: &str, username: Option<&str>) -> Result<User>;
    fn get_user(&self, id: UserId) -> Result<Option<User>>;
    fn insert_api_key(&self, key: &ApiKey) -> Result<()>;
    fn count_active_api_keys(&self, user: UserId) -> Result<usize>;
    fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>>;
    fn touch_api_key(&self, id: ApiKeyId, now: DateTime<Utc>) -> Result<()>;
    fn deactivate_api_key(&self, user: UserId, id: ApiKeyId) -> Result<bool>;

    // Competitions and participants.

    fn insert_competition(&self, competition: &Competition) -> Result<()>;
    fn get_competition(&self, id: CompetitionId) -> Result<Option<Competition>>;
    fn list_competitions(&self, status: Option<CompetitionStatus>) -> Result<Vec<Competition>>;
    /// Explicit (admin-driven) status transition.
    fn set_competition_status(
        &self,
        id: CompetitionId,
        status: CompetitionStatus,
        now: DateTime<Utc>,
    ) -> Result<bool>;
    /// `pending -> active` for competitions whose start time has passed.
    fn activate_due_competitions(&self, now: DateTime<Utc>) -> Result<usize>;
    /// `active -> ended` for competitions whose end time has passed.
    fn end_due_competitions(&self, now: DateTime<Utc>) -> Result<usize>;
    fn count_participants(&self, competition: CompetitionId) -> Result<u64>;

    fn insert_participant(&self, participant: &Participant) -> Result<()>;
    fn get_participant(&self, id: ParticipantId) -> Result<Option<Participant>>;
    fn find_participant(
        &self,
        competition: CompetitionId,
        user: UserId,
    ) -> Result<Option<Participant>>;
    /// The user's participation in any currently `active` competition.
    fn find_active_participation(&self, user: UserId)
        -> Result<Option<(Participant, Competition)>>;
    fn list_participants_with_users(
        &self,
        competition: CompetitionId,
    ) -> Result<Vec<(Participant, User)>>;

    // Positions, orders, trades.

    fn get_position(
        &self,
        participant: ParticipantId,
        code: &MarketCode,
    ) -> Result<Option<Position>>;
    fn list_positions(&self, participant: ParticipantId) -> Result<Vec<Position>>;

    fn get_order(&self, id: OrderId) -> Result<Option<Order>>;
    fn list_orders(&self, participant: ParticipantId) -> Result<Vec<Order>>;
    fn list_pending_orders(&self, participant: ParticipantId) -> Result<Vec<Order>>;

    /// Pending limit buys for `code` with `price >= tick_price`, oldest first.
    fn eligible_buy_orders(&self, code: &MarketCode, tick_price: Decimal) -> Result<Vec<Order>>;
    /// Pending limit sells for `code` with `price <= tick_price`, oldest first.
    fn eligible_sell_orders(&self, code: &MarketCode, tick_price: Decimal) -> Result<Vec<Order>>;

    fn list_trades(&self, participant: ParticipantId) -> Result<Vec<Trade>>;
    fn count_trades(&self, participant: ParticipantId) -> Result<u64>;
    fn find_trade_by_order(&self, order: OrderId) -> Result<Option<Trade>>;
}
