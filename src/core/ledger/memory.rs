//! In-memory ledger for tests and offline tooling.
//!
//! Mirrors the SQL semantics of the postgres implementation: conditional
//! primitives check-and-mutate under one lock, and `with_tx` snapshots the
//! state so an error rolls everything back.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use super::{Ledger, LedgerTx};
use crate::core::domain::{
    ApiKey, ApiKeyId, Competition, CompetitionId, CompetitionStatus, MarketCode, Order, OrderId,
    OrderStatus, Participant, ParticipantId, Position, Trade, User, UserId, POSITION_EPSILON,
};
use crate::error::{Error, Result};

#[derive(Default, Clone)]
struct State {
    users: Vec<User>,
    api_keys: Vec<ApiKey>,
    competitions: Vec<Competition>,
    participants: Vec<Participant>,
    positions: Vec<Position>,
    orders: Vec<Order>,
    trades: Vec<Trade>,
}

/// Ledger kept entirely in process memory.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemTx<'a> {
    state: &'a mut State,
}

impl LedgerTx for MemTx<'_> {
    fn debit_balance(&mut self, participant: ParticipantId, amount: Decimal) -> Result<bool> {
        match self
            .state
            .participants
            .iter_mut()
            .find(|p| p.id == participant && p.balance >= amount)
        {
            Some(p) => {
                p.balance -= amount;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn credit_balance(&mut self, participant: ParticipantId, delta: Decimal) -> Result<()> {
        if let Some(p) = self
            .state
            .participants
            .iter_mut()
            .find(|p| p.id == participant)
        {
            p.balance += delta;
        }
        Ok(())
    }

    fn debit_position(
        &mut self,
        participant: ParticipantId,
        code: &MarketCode,
        qty: Decimal,
    ) -> Result<bool> {
        match self
            .state
            .positions
            .iter_mut()
            .find(|p| p.participant_id == participant && p.code == *code && p.quantity >= qty)
        {
            Some(p) => {
                p.quantity -= qty;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn upsert_position(
        &mut self,
        participant: ParticipantId,
        code: &MarketCode,
        qty: Decimal,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match self
            .state
            .positions
            .iter_mut()
            .find(|p| p.participant_id == participant && p.code == *code)
        {
            Some(p) => {
                let new_qty = p.quantity + qty;
                if new_qty > Decimal::ZERO {
                    p.avg_buy_price =
                        (p.quantity * p.avg_buy_price + qty * price) / new_qty;
                }
                p.quantity = new_qty;
                p.updated_at = now;
            }
            None => self.state.positions.push(Position {
                participant_id: participant,
                code: code.clone(),
                quantity: qty,
                avg_buy_price: price,
                created_at: now,
                updated_at: now,
            }),
        }
        Ok(())
    }

    fn restore_position(
        &mut self,
        participant: ParticipantId,
        code: &MarketCode,
        qty: Decimal,
        fallback_price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match self
            .state
            .positions
            .iter_mut()
            .find(|p| p.participant_id == participant && p.code == *code)
        {
            Some(p) => {
                p.quantity += qty;
                p.updated_at = now;
            }
            None => self.state.positions.push(Position {
                participant_id: participant,
                code: code.clone(),
                quantity: qty,
                avg_buy_price: fallback_price,
                created_at: now,
                updated_at: now,
            }),
        }
        Ok(())
    }

    fn cleanup_dust_position(
        &mut self,
        participant: ParticipantId,
        code: &MarketCode,
    ) -> Result<usize> {
        let before = self.state.positions.len();
        self.state.positions.retain(|p| {
            !(p.participant_id == participant && p.code == *code && p.quantity <= POSITION_EPSILON)
        });
        Ok(before - self.state.positions.len())
    }

    fn set_position_avg_price(
        &mut self,
        participant: ParticipantId,
        code: &MarketCode,
        avg_buy_price: Decimal,
    ) -> Result<bool> {
        match self
            .state
            .positions
            .iter_mut()
            .find(|p| p.participant_id == participant && p.code == *code)
        {
            Some(p) => {
                p.avg_buy_price = avg_buy_price;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.state.orders.push(order.clone());
        Ok(())
    }

    fn mark_order_filled(
        &mut self,
        order: OrderId,
        filled_price: Decimal,
        filled_quantity: Decimal,
        fee: Decimal,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        match self
            .state
            .orders
            .iter_mut()
            .find(|o| o.id == order && o.status == OrderStatus::Pending)
        {
            Some(o) => {
                o.status = OrderStatus::Filled;
                o.filled_price = Some(filled_price);
                o.filled_quantity = filled_quantity;
                o.fee = fee;
                o.filled_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn mark_order_cancelled(&mut self, order: OrderId, now: DateTime<Utc>) -> Result<bool> {
        match self
            .state
            .orders
            .iter_mut()
            .find(|o| o.id == order && o.status == OrderStatus::Pending)
        {
            Some(o) => {
                o.status = OrderStatus::Cancelled;
                o.cancelled_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_order_fill_price(&mut self, order: OrderId, price: Decimal, fee: Decimal) -> Result<()> {
        if let Some(o) = self.state.orders.iter_mut().find(|o| o.id == order) {
            o.filled_price = Some(price);
            o.fee = fee;
        }
        Ok(())
    }

    fn insert_trade(&mut self, trade: &Trade) -> Result<()> {
        self.state.trades.push(trade.clone());
        Ok(())
    }

    fn update_trade_fill(
        &mut self,
        order: OrderId,
        price: Decimal,
        total_amount: Decimal,
        fee: Decimal,
    ) -> Result<()> {
        if let Some(t) = self.state.trades.iter_mut().find(|t| t.order_id == order) {
            t.price = price;
            t.total_amount = total_amount;
            t.fee = fee;
        }
        Ok(())
    }

    fn get_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.orders.iter().find(|o| o.id == id).cloned())
    }

    fn get_participant(&mut self, id: ParticipantId) -> Result<Option<Participant>> {
        Ok(self.state.participants.iter().find(|p| p.id == id).cloned())
    }

    fn get_position(
        &mut self,
        participant: ParticipantId,
        code: &MarketCode,
    ) -> Result<Option<Position>> {
        Ok(self
            .state
            .positions
            .iter()
            .find(|p| p.participant_id == participant && p.code == *code)
            .cloned())
    }
}

impl Ledger for MemoryLedger {
    fn with_tx<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T>,
    {
        let mut state = self.state.lock();
        let snapshot = state.clone();
        let result = f(&mut MemTx { state: &mut state });
        if result.is_err() {
            *state = snapshot;
        }
        result
    }

    fn upsert_user(&self, external_id: &str, email: &str, username: Option<&str>) -> Result<User> {
        let mut state = self.state.lock();
        let now = Utc::now();
        if let Some(user) = state
            .users
            .iter_mut()
            .find(|u| u.external_id == external_id)
        {
            user.email = email.to_string();
            user.updated_at = now;
            return Ok(user.clone());
        }
        let user = User {
            id: UserId::new(),
            external_id: external_id.to_string(),
            email: email.to_string(),
            username: username.map(str::to_string),
            is_admin: false,
            created_at: now,
            updated_at: now,
        };
        state.users.push(user.clone());
        Ok(user)
    }

    fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.state.lock().users.iter().find(|u| u.id == id).cloned())
    }

    fn insert_api_key(&self, key: &ApiKey) -> Result<()> {
        self.state.lock().api_keys.push(key.clone());
        Ok(())
    }

    fn count_active_api_keys(&self, user: UserId) -> Result<usize> {
        Ok(self
            .state
            .lock()
            .api_keys
            .iter()
            .filter(|k| k.user_id == user && k.is_active)
            .count())
    }

    fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        Ok(self
            .state
            .lock()
            .api_keys
            .iter()
            .find(|k| k.key_hash == key_hash && k.is_active)
            .cloned())
    }

    fn touch_api_key(&self, id: ApiKeyId, now: DateTime<Utc>) -> Result<()> {
        if let Some(k) = self.state.lock().api_keys.iter_mut().find(|k| k.id == id) {
            k.last_used_at = Some(now);
        }
        Ok(())
    }

    fn deactivate_api_key(&self, user: UserId, id: ApiKeyId) -> Result<bool> {
        match self
            .state
            .lock()
            .api_keys
            .iter_mut()
            .find(|k| k.id == id && k.user_id == user)
        {
            Some(k) => {
                k.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn insert_competition(&self, competition: &Competition) -> Result<()> {
        self.state.lock().competitions.push(competition.clone());
        Ok(())
    }

    fn get_competition(&self, id: CompetitionId) -> Result<Option<Competition>> {
        Ok(self
            .state
            .lock()
            .competitions
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    fn list_competitions(&self, status: Option<CompetitionStatus>) -> Result<Vec<Competition>> {
        let mut competitions: Vec<Competition> = self
            .state
            .lock()
            .competitions
            .iter()
            .filter(|c| status.map_or(true, |s| c.status == s))
            .cloned()
            .collect();
        competitions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(competitions)
    }

    fn set_competition_status(
        &self,
        id: CompetitionId,
        status: CompetitionStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        match self
            .state
            .lock()
            .competitions
            .iter_mut()
            .find(|c| c.id == id)
        {
            Some(c) => {
                c.status = status;
                c.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn activate_due_competitions(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut updated = 0;
        for c in self.state.lock().competitions.iter_mut() {
            if c.status == CompetitionStatus::Pending && c.start_time <= now {
                c.status = CompetitionStatus::Active;
                c.updated_at = now;
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn end_due_competitions(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut updated = 0;
        for c in self.state.lock().competitions.iter_mut() {
            if c.status == CompetitionStatus::Active && c.end_time < now {
                c.status = CompetitionStatus::Ended;
                c.updated_at = now;
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn count_participants(&self, competition: CompetitionId) -> Result<u64> {
        Ok(self
            .state
            .lock()
            .participants
            .iter()
            .filter(|p| p.competition_id == competition)
            .count() as u64)
    }

    fn insert_participant(&self, participant: &Participant) -> Result<()> {
        let mut state = self.state.lock();
        if state.participants.iter().any(|p| {
            p.competition_id == participant.competition_id && p.user_id == participant.user_id
        }) {
            return Err(Error::Database(
                "duplicate key value violates unique constraint \"uq_participant_competition_user\""
                    .into(),
            ));
        }
        state.participants.push(participant.clone());
        Ok(())
    }

    fn get_participant(&self, id: ParticipantId) -> Result<Option<Participant>> {
        Ok(self
            .state
            .lock()
            .participants
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    fn find_participant(
        &self,
        competition: CompetitionId,
        user: UserId,
    ) -> Result<Option<Participant>> {
        Ok(self
            .state
            .lock()
            .participants
            .iter()
            .find(|p| p.competition_id == competition && p.user_id == user)
            .cloned())
    }

    fn find_active_participation(
        &self,
        user: UserId,
    ) -> Result<Option<(Participant, Competition)>> {
        let state = self.state.lock();
        for p in state.participants.iter().filter(|p| p.user_id == user) {
            if let Some(c) = state
                .competitions
                .iter()
                .find(|c| c.id == p.competition_id && c.status == CompetitionStatus::Active)
            {
                return Ok(Some((p.clone(), c.clone())));
            }
        }
        Ok(None)
    }

    fn list_participants_with_users(
        &self,
        competition: CompetitionId,
    ) -> Result<Vec<(Participant, User)>> {
        let state = self.state.lock();
        Ok(state
            .participants
            .iter()
            .filter(|p| p.competition_id == competition)
            .filter_map(|p| {
                state
                    .users
                    .iter()
                    .find(|u| u.id == p.user_id)
                    .map(|u| (p.clone(), u.clone()))
            })
            .collect())
    }

    fn get_position(
        &self,
        participant: ParticipantId,
        code: &MarketCode,
    ) -> Result<Option<Position>> {
        Ok(self
            .state
            .lock()
            .positions
            .iter()
            .find(|p| p.participant_id == participant && p.code == *code)
            .cloned())
    }

    fn list_positions(&self, participant: ParticipantId) -> Result<Vec<Position>> {
        let mut positions: Vec<Position> = self
            .state
            .lock()
            .positions
            .iter()
            .filter(|p| p.participant_id == participant)
            .cloned()
            .collect();
        positions.sort_by(|a, b| a.code.as_str().cmp(b.code.as_str()));
        Ok(positions)
    }

    fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.lock().orders.iter().find(|o| o.id == id).cloned())
    }

    fn list_orders(&self, participant: ParticipantId) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .state
            .lock()
            .orders
            .iter()
            .filter(|o| o.participant_id == participant)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    fn list_pending_orders(&self, participant: ParticipantId) -> Result<Vec<Order>> {
        Ok(self
            .state
            .lock()
            .orders
            .iter()
            .filter(|o| o.participant_id == participant && o.status == OrderStatus::Pending)
            .cloned()
            .collect())
    }

    fn eligible_buy_orders(&self, code: &MarketCode, tick_price: Decimal) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .state
            .lock()
            .orders
            .iter()
            .filter(|o| {
                o.code == *code
                    && o.status == OrderStatus::Pending
                    && o.side == crate::core::domain::Side::Buy
                    && o.price.is_some_and(|p| p >= tick_price)
            })
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    fn eligible_sell_orders(&self, code: &MarketCode, tick_price: Decimal) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .state
            .lock()
            .orders
            .iter()
            .filter(|o| {
                o.code == *code
                    && o.status == OrderStatus::Pending
                    && o.side == crate::core::domain::Side::Sell
                    && o.price.is_some_and(|p| p <= tick_price)
            })
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    fn list_trades(&self, participant: ParticipantId) -> Result<Vec<Trade>> {
        let mut trades: Vec<Trade> = self
            .state
            .lock()
            .trades
            .iter()
            .filter(|t| t.participant_id == participant)
            .cloned()
            .collect();
        trades.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(trades)
    }

    fn count_trades(&self, participant: ParticipantId) -> Result<u64> {
        Ok(self
            .state
            .lock()
            .trades
            .iter()
            .filter(|t| t.participant_id == participant)
            .count() as u64)
    }

    fn find_trade_by_order(&self, order: OrderId) -> Result<Option<Trade>> {
        Ok(self
            .state
            .lock()
            .trades
            .iter()
            .find(|t| t.order_id == order)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn seeded() -> (MemoryLedger, ParticipantId) {
        let ledger = MemoryLedger::new();
        let participant = Participant {
            id: ParticipantId::new(),
            competition_id: CompetitionId::new(),
            user_id: UserId::new(),
            balance: dec!(1_000_000),
            joined_at: Utc::now(),
        };
        let id = participant.id;
        ledger.state.lock().participants.push(participant);
        (ledger, id)
    }

    #[test]
    fn debit_balance_guard_fires_on_shortfall() {
        let (ledger, id) = seeded();
        ledger
            .with_tx(|tx| {
                assert!(tx.debit_balance(id, dec!(600_000))?);
                assert!(!tx.debit_balance(id, dec!(600_000))?);
                Ok(())
            })
            .unwrap();
        assert_eq!(ledger.get_participant(id).unwrap().unwrap().balance, dec!(400_000));
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let (ledger, id) = seeded();
        let result: Result<()> = ledger.with_tx(|tx| {
            tx.debit_balance(id, dec!(500_000))?;
            Err(Error::Database("forced".into()))
        });
        assert!(result.is_err());
        assert_eq!(
            ledger.get_participant(id).unwrap().unwrap().balance,
            dec!(1_000_000)
        );
    }

    #[test]
    fn upsert_position_folds_weighted_average() {
        let (ledger, id) = seeded();
        let code = MarketCode::from("KRW-BTC");
        ledger
            .with_tx(|tx| {
                tx.upsert_position(id, &code, dec!(0.01), dec!(100_000_000), Utc::now())?;
                tx.upsert_position(id, &code, dec!(0.01), dec!(110_000_000), Utc::now())?;
                Ok(())
            })
            .unwrap();
        let position = ledger.get_position(id, &code).unwrap().unwrap();
        assert_eq!(position.quantity, dec!(0.02));
        assert_eq!(position.avg_buy_price, dec!(105_000_000));
    }
}
