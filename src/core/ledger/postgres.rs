//! Postgres ledger implementation using Diesel.
//!
//! The conditional primitives are single `UPDATE ... WHERE precondition`
//! statements, and the position write is an `INSERT ... ON CONFLICT` bound to
//! `uq_position_participant_code`, so concurrent requests race on rows inside
//! the database rather than in application code.

use chrono::{DateTime, Utc};
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::Numeric;
use diesel::upsert::excluded;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{Ledger, LedgerTx};
use crate::core::db::model::{
    ApiKeyRow, CompetitionRow, OrderRow, ParticipantRow, PositionRow, TradeRow, UserRow,
};
use crate::core::db::schema::{api_keys, competitions, orders, participants, positions, trades, users};
use crate::core::db::DbPool;
use crate::core::domain::{
    ApiKey, ApiKeyId, Competition, CompetitionId, CompetitionStatus, MarketCode, Order, OrderId,
    OrderStatus, Participant, ParticipantId, Position, Trade, User, UserId, POSITION_EPSILON,
};
use crate::error::{Error, Result};

/// Postgres-backed ledger.
pub struct PgLedger {
    pool: DbPool,
}

impl PgLedger {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>>> {
        self.pool.get().map_err(|e| Error::Connection(e.to_string()))
    }
}

struct PgTx<'a> {
    conn: &'a mut PgConnection,
}

impl LedgerTx for PgTx<'_> {
    fn debit_balance(&mut self, participant: ParticipantId, amount: Decimal) -> Result<bool> {
        let updated = diesel::update(
            participants::table.filter(
                participants::id
                    .eq(participant.as_uuid())
                    .and(participants::balance.ge(amount)),
            ),
        )
        .set(participants::balance.eq(participants::balance - amount))
        .execute(self.conn)?;
        Ok(updated > 0)
    }

    fn credit_balance(&mut self, participant: ParticipantId, delta: Decimal) -> Result<()> {
        diesel::update(participants::table.filter(participants::id.eq(participant.as_uuid())))
            .set(participants::balance.eq(participants::balance + delta))
            .execute(self.conn)?;
        Ok(())
    }

    fn debit_position(
        &mut self,
        participant: ParticipantId,
        code: &MarketCode,
        qty: Decimal,
    ) -> Result<bool> {
        let updated = diesel::update(
            positions::table.filter(
                positions::participant_id
                    .eq(participant.as_uuid())
                    .and(positions::code.eq(code.as_str()))
                    .and(positions::quantity.ge(qty)),
            ),
        )
        .set(positions::quantity.eq(positions::quantity - qty))
        .execute(self.conn)?;
        Ok(updated > 0)
    }

    fn upsert_position(
        &mut self,
        participant: ParticipantId,
        code: &MarketCode,
        qty: Decimal,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let row = PositionRow {
            id: Uuid::new_v4(),
            participant_id: participant.as_uuid(),
            code: code.as_str().to_string(),
            quantity: qty,
            avg_buy_price: price,
            created_at: now,
            updated_at: now,
        };
        diesel::insert_into(positions::table)
            .values(&row)
            .on_conflict((positions::participant_id, positions::code))
            .do_update()
            .set((
                positions::quantity.eq(positions::quantity + excluded(positions::quantity)),
                positions::avg_buy_price.eq(sql::<Numeric>(
                    "CASE WHEN positions.quantity + excluded.quantity > 0 \
                     THEN (positions.quantity * positions.avg_buy_price \
                           + excluded.quantity * excluded.avg_buy_price) \
                          / (positions.quantity + excluded.quantity) \
                     ELSE positions.avg_buy_price END",
                )),
                positions::updated_at.eq(now),
            ))
            .execute(self.conn)?;
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
        let row = PositionRow {
            id: Uuid::new_v4(),
            participant_id: participant.as_uuid(),
            code: code.as_str().to_string(),
            quantity: qty,
            avg_buy_price: fallback_price,
            created_at: now,
            updated_at: now,
        };
        diesel::insert_into(positions::table)
            .values(&row)
            .on_conflict((positions::participant_id, positions::code))
            .do_update()
            .set((
                positions::quantity.eq(positions::quantity + excluded(positions::quantity)),
                positions::updated_at.eq(now),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    fn cleanup_dust_position(
        &mut self,
        participant: ParticipantId,
        code: &MarketCode,
    ) -> Result<usize> {
        let deleted = diesel::delete(
            positions::table.filter(
                positions::participant_id
                    .eq(participant.as_uuid())
                    .and(positions::code.eq(code.as_str()))
                    .and(positions::quantity.le(POSITION_EPSILON)),
            ),
        )
        .execute(self.conn)?;
        Ok(deleted)
    }

    fn set_position_avg_price(
        &mut self,
        participant: ParticipantId,
        code: &MarketCode,
        avg_buy_price: Decimal,
    ) -> Result<bool> {
        let updated = diesel::update(
            positions::table.filter(
                positions::participant_id
                    .eq(participant.as_uuid())
                    .and(positions::code.eq(code.as_str())),
            ),
        )
        .set(positions::avg_buy_price.eq(avg_buy_price))
        .execute(self.conn)?;
        Ok(updated > 0)
    }

    fn insert_order(&mut self, order: &Order) -> Result<()> {
        diesel::insert_into(orders::table)
            .values(OrderRow::from(order))
            .execute(self.conn)?;
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
        let updated = diesel::update(
            orders::table.filter(
                orders::id
                    .eq(order.as_uuid())
                    .and(orders::status.eq(OrderStatus::Pending.as_str())),
            ),
        )
        .set((
            orders::status.eq(OrderStatus::Filled.as_str()),
            orders::filled_price.eq(Some(filled_price)),
            orders::filled_quantity.eq(filled_quantity),
            orders::fee.eq(fee),
            orders::filled_at.eq(Some(now)),
        ))
        .execute(self.conn)?;
        Ok(updated > 0)
    }

    fn mark_order_cancelled(&mut self, order: OrderId, now: DateTime<Utc>) -> Result<bool> {
        let updated = diesel::update(
            orders::table.filter(
                orders::id
                    .eq(order.as_uuid())
                    .and(orders::status.eq(OrderStatus::Pending.as_str())),
            ),
        )
        .set((
            orders::status.eq(OrderStatus::Cancelled.as_str()),
            orders::cancelled_at.eq(Some(now)),
        ))
        .execute(self.conn)?;
        Ok(updated > 0)
    }

    fn set_order_fill_price(&mut self, order: OrderId, price: Decimal, fee: Decimal) -> Result<()> {
        diesel::update(orders::table.filter(orders::id.eq(order.as_uuid())))
            .set((orders::filled_price.eq(Some(price)), orders::fee.eq(fee)))
            .execute(self.conn)?;
        Ok(())
    }

    fn insert_trade(&mut self, trade: &Trade) -> Result<()> {
        diesel::insert_into(trades::table)
            .values(TradeRow::from(trade))
            .execute(self.conn)?;
        Ok(())
    }

    fn update_trade_fill(
        &mut self,
        order: OrderId,
        price: Decimal,
        total_amount: Decimal,
        fee: Decimal,
    ) -> Result<()> {
        diesel::update(trades::table.filter(trades::order_id.eq(order.as_uuid())))
            .set((
                trades::price.eq(price),
                trades::total_amount.eq(total_amount),
                trades::fee.eq(fee),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    fn get_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row: Option<OrderRow> = orders::table
            .find(id.as_uuid())
            .first(self.conn)
            .optional()?;
        row.map(Order::try_from).transpose()
    }

    fn get_participant(&mut self, id: ParticipantId) -> Result<Option<Participant>> {
        let row: Option<ParticipantRow> = participants::table
            .find(id.as_uuid())
            .first(self.conn)
            .optional()?;
        Ok(row.map(Participant::from))
    }

    fn get_position(
        &mut self,
        participant: ParticipantId,
        code: &MarketCode,
    ) -> Result<Option<Position>> {
        let row: Option<PositionRow> = positions::table
            .filter(
                positions::participant_id
                    .eq(participant.as_uuid())
                    .and(positions::code.eq(code.as_str())),
            )
            .first(self.conn)
            .optional()?;
        Ok(row.map(Position::from))
    }
}

impl Ledger for PgLedger {
    fn with_tx<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T>,
    {
        let mut conn = self.conn()?;
        conn.transaction(|conn| f(&mut PgTx { conn }))
    }

    fn upsert_user(&self, external_id: &str, email: &str, username: Option<&str>) -> Result<User> {
        let mut conn = self.conn()?;
        let now = Utc::now();
        let row = UserRow {
            id: Uuid::new_v4(),
            external_id: external_id.to_string(),
            email: email.to_string(),
            username: username.map(str::to_string),
            is_admin: false,
            created_at: now,
            updated_at: now,
        };
        let stored: UserRow = diesel::insert_into(users::table)
            .values(&row)
            .on_conflict(users::external_id)
            .do_update()
            .set((
                users::email.eq(excluded(users::email)),
                users::updated_at.eq(now),
            ))
            .get_result(&mut conn)?;
        Ok(stored.into())
    }

    fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let mut conn = self.conn()?;
        let row: Option<UserRow> = users::table.find(id.as_uuid()).first(&mut conn).optional()?;
        Ok(row.map(User::from))
    }

    fn insert_api_key(&self, key: &ApiKey) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::insert_into(api_keys::table)
            .values(ApiKeyRow::from(key))
            .execute(&mut conn)?;
        Ok(())
    }

    fn count_active_api_keys(&self, user: UserId) -> Result<usize> {
        let mut conn = self.conn()?;
        let count: i64 = api_keys::table
            .filter(
                api_keys::user_id
                    .eq(user.as_uuid())
                    .and(api_keys::is_active.eq(true)),
            )
            .count()
            .get_result(&mut conn)?;
        Ok(count as usize)
    }

    fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        let mut conn = self.conn()?;
        let row: Option<ApiKeyRow> = api_keys::table
            .filter(
                api_keys::key_hash
                    .eq(key_hash)
                    .and(api_keys::is_active.eq(true)),
            )
            .first(&mut conn)
            .optional()?;
        Ok(row.map(ApiKey::from))
    }

    fn touch_api_key(&self, id: ApiKeyId, now: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(api_keys::table.find(id.as_uuid()))
            .set(api_keys::last_used_at.eq(Some(now)))
            .execute(&mut conn)?;
        Ok(())
    }

    fn deactivate_api_key(&self, user: UserId, id: ApiKeyId) -> Result<bool> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            api_keys::table.filter(
                api_keys::id
                    .eq(id.as_uuid())
                    .and(api_keys::user_id.eq(user.as_uuid())),
            ),
        )
        .set(api_keys::is_active.eq(false))
        .execute(&mut conn)?;
        Ok(updated > 0)
    }

    fn insert_competition(&self, competition: &Competition) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::insert_into(competitions::table)
            .values(CompetitionRow::from(competition))
            .execute(&mut conn)?;
        Ok(())
    }

    fn get_competition(&self, id: CompetitionId) -> Result<Option<Competition>> {
        let mut conn = self.conn()?;
        let row: Option<CompetitionRow> = competitions::table
            .find(id.as_uuid())
            .first(&mut conn)
            .optional()?;
        row.map(Competition::try_from).transpose()
    }

    fn list_competitions(&self, status: Option<CompetitionStatus>) -> Result<Vec<Competition>> {
        let mut conn = self.conn()?;
        let rows: Vec<CompetitionRow> = match status {
            Some(status) => competitions::table
                .filter(competitions::status.eq(status.as_str()))
                .order(competitions::start_time.desc())
                .load(&mut conn)?,
            None => competitions::table
                .order(competitions::start_time.desc())
                .load(&mut conn)?,
        };
        rows.into_iter().map(Competition::try_from).collect()
    }

    fn set_competition_status(
        &self,
        id: CompetitionId,
        status: CompetitionStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.conn()?;
        let updated = diesel::update(competitions::table.find(id.as_uuid()))
            .set((
                competitions::status.eq(status.as_str()),
                competitions::updated_at.eq(now),
            ))
            .execute(&mut conn)?;
        Ok(updated > 0)
    }

    fn activate_due_competitions(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            competitions::table.filter(
                competitions::status
                    .eq(CompetitionStatus::Pending.as_str())
                    .and(competitions::start_time.le(now)),
            ),
        )
        .set((
            competitions::status.eq(CompetitionStatus::Active.as_str()),
            competitions::updated_at.eq(now),
        ))
        .execute(&mut conn)?;
        Ok(updated)
    }

    fn end_due_competitions(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            competitions::table.filter(
                competitions::status
                    .eq(CompetitionStatus::Active.as_str())
                    .and(competitions::end_time.lt(now)),
            ),
        )
        .set((
            competitions::status.eq(CompetitionStatus::Ended.as_str()),
            competitions::updated_at.eq(now),
        ))
        .execute(&mut conn)?;
        Ok(updated)
    }

    fn count_participants(&self, competition: CompetitionId) -> Result<u64> {
        let mut conn = self.conn()?;
        let count: i64 = participants::table
            .filter(participants::competition_id.eq(competition.as_uuid()))
            .count()
            .get_result(&mut conn)?;
        Ok(count as u64)
    }

    fn insert_participant(&self, participant: &Participant) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::insert_into(participants::table)
            .values(ParticipantRow::from(participant))
            .execute(&mut conn)?;
        Ok(())
    }

    fn get_participant(&self, id: ParticipantId) -> Result<Option<Participant>> {
        let mut conn = self.conn()?;
        let row: Option<ParticipantRow> = participants::table
            .find(id.as_uuid())
            .first(&mut conn)
            .optional()?;
        Ok(row.map(Participant::from))
    }

    fn find_participant(
        &self,
        competition: CompetitionId,
        user: UserId,
    ) -> Result<Option<Participant>> {
        let mut conn = self.conn()?;
        let row: Option<ParticipantRow> = participants::table
            .filter(
                participants::competition_id
                    .eq(competition.as_uuid())
                    .and(participants::user_id.eq(user.as_uuid())),
            )
            .first(&mut conn)
            .optional()?;
        Ok(row.map(Participant::from))
    }

    fn find_active_participation(
        &self,
        user: UserId,
    ) -> Result<Option<(Participant, Competition)>> {
        let mut conn = self.conn()?;
        let row: Option<(ParticipantRow, CompetitionRow)> = participants::table
            .inner_join(competitions::table)
            .filter(
                participants::user_id
                    .eq(user.as_uuid())
                    .and(competitions::status.eq(CompetitionStatus::Active.as_str())),
            )
            .select((ParticipantRow::as_select(), CompetitionRow::as_select()))
            .first(&mut conn)
            .optional()?;
        row.map(|(p, c)| Ok((Participant::from(p), Competition::try_from(c)?)))
            .transpose()
    }

    fn list_participants_with_users(
        &self,
        competition: CompetitionId,
    ) -> Result<Vec<(Participant, User)>> {
        let mut conn = self.conn()?;
        let rows: Vec<(ParticipantRow, UserRow)> = participants::table
            .inner_join(users::table)
            .filter(participants::competition_id.eq(competition.as_uuid()))
            .select((ParticipantRow::as_select(), UserRow::as_select()))
            .load(&mut conn)?;
        Ok(rows
            .into_iter()
            .map(|(p, u)| (Participant::from(p), User::from(u)))
            .collect())
    }

    fn get_position(
        &self,
        participant: ParticipantId,
        code: &MarketCode,
    ) -> Result<Option<Position>> {
        let mut conn = self.conn()?;
        let row: Option<PositionRow> = positions::table
            .filter(
                positions::participant_id
                    .eq(participant.as_uuid())
                    .and(positions::code.eq(code.as_str())),
            )
            .first(&mut conn)
            .optional()?;
        Ok(row.map(Position::from))
    }

    fn list_positions(&self, participant: ParticipantId) -> Result<Vec<Position>> {
        let mut conn = self.conn()?;
        let rows: Vec<PositionRow> = positions::table
            .filter(positions::participant_id.eq(participant.as_uuid()))
            .order(positions::code.asc())
            .load(&mut conn)?;
        Ok(rows.into_iter().map(Position::from).collect())
    }

    fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let mut conn = self.conn()?;
        let row: Option<OrderRow> = orders::table
            .find(id.as_uuid())
            .first(&mut conn)
            .optional()?;
        row.map(Order::try_from).transpose()
    }

    fn list_orders(&self, participant: ParticipantId) -> Result<Vec<Order>> {
        let mut conn = self.conn()?;
        let rows: Vec<OrderRow> = orders::table
            .filter(orders::participant_id.eq(participant.as_uuid()))
            .order(orders::created_at.desc())
            .load(&mut conn)?;
        rows.into_iter().map(Order::try_from).collect()
    }

    fn list_pending_orders(&self, participant: ParticipantId) -> Result<Vec<Order>> {
        let mut conn = self.conn()?;
        let rows: Vec<OrderRow> = orders::table
            .filter(
                orders::participant_id
                    .eq(participant.as_uuid())
                    .and(orders::status.eq(OrderStatus::Pending.as_str())),
            )
            .order(orders::created_at.asc())
            .load(&mut conn)?;
        rows.into_iter().map(Order::try_from).collect()
    }

    fn eligible_buy_orders(&self, code: &MarketCode, tick_price: Decimal) -> Result<Vec<Order>> {
        let mut conn = self.conn()?;
        let rows: Vec<OrderRow> = orders::table
            .filter(
                orders::code
                    .eq(code.as_str())
                    .and(orders::status.eq(OrderStatus::Pending.as_str()))
                    .and(orders::order_type.eq("limit"))
                    .and(orders::side.eq("buy"))
                    .and(orders::price.ge(Some(tick_price))),
            )
            .order(orders::created_at.asc())
            .load(&mut conn)?;
        rows.into_iter().map(Order::try_from).collect()
    }

    fn eligible_sell_orders(&self, code: &MarketCode, tick_price: Decimal) -> Result<Vec<Order>> {
        let mut conn = self.conn()?;
        let rows: Vec<OrderRow> = orders::table
            .filter(
                orders::code
                    .eq(code.as_str())
                    .and(orders::status.eq(OrderStatus::Pending.as_str()))
                    .and(orders::order_type.eq("limit"))
                    .and(orders::side.eq("sell"))
                    .and(orders::price.le(Some(tick_price))),
            )
            .order(orders::created_at.asc())
            .load(&mut conn)?;
        rows.into_iter().map(Order::try_from).collect()
    }

    fn list_trades(&self, participant: ParticipantId) -> Result<Vec<Trade>> {
        let mut conn = self.conn()?;
        let rows: Vec<TradeRow> = trades::table
            .filter(trades::participant_id.eq(participant.as_uuid()))
            .order(trades::created_at.desc())
            .load(&mut conn)?;
        rows.into_iter().map(Trade::try_from).collect()
    }

    fn count_trades(&self, participant: ParticipantId) -> Result<u64> {
        let mut conn = self.conn()?;
        let count: i64 = trades::table
            .filter(trades::participant_id.eq(participant.as_uuid()))
            .count()
            .get_result(&mut conn)?;
        Ok(count as u64)
    }

    fn find_trade_by_order(&self, order: OrderId) -> Result<Option<Trade>> {
        let mut conn = self.conn()?;
        let row: Option<TradeRow> = trades::table
            .filter(trades::order_id.eq(order.as_uuid()))
            .first(&mut conn)
            .optional()?;
        row.map(Trade::try_from).transpose()
    }
}
