//! Database row types for Diesel ORM and their domain conversions.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::schema::{api_keys, competitions, orders, participants, positions, trades, upbit_ticker, users};
use crate::core::domain::{
    ApiKey, Competition, CompetitionStatus, MarketCode, Order, OrderStatus, OrderType, Participant,
    Position, Side, Ticker, Trade, User,
};
use crate::error::{Error, Result};

/// Database row for a user.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub id: Uuid,
    pub external_id: String,
    pub email: String,
    pub username: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id.into(),
            external_id: row.external_id,
            email: row.email,
            username: row.username,
            is_admin: row.is_admin,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Database row for an API key.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = api_keys)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ApiKeyRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub key_hash: String,
    pub key_prefix: String,
    pub name: String,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ApiKeyRow> for ApiKey {
    fn from(row: ApiKeyRow) -> Self {
        Self {
            id: row.id.into(),
            user_id: row.user_id.into(),
            key_hash: row.key_hash,
            key_prefix: row.key_prefix,
            name: row.name,
            is_active: row.is_active,
            last_used_at: row.last_used_at,
            created_at: row.created_at,
        }
    }
}

impl From<&ApiKey> for ApiKeyRow {
    fn from(key: &ApiKey) -> Self {
        Self {
            id: key.id.as_uuid(),
            user_id: key.user_id.as_uuid(),
            key_hash: key.key_hash.clone(),
            key_prefix: key.key_prefix.clone(),
            name: key.name.clone(),
            is_active: key.is_active,
            last_used_at: key.last_used_at,
            created_at: key.created_at,
        }
    }
}

/// Database row for a competition.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = competitions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CompetitionRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub initial_balance: Decimal,
    pub fee_rate: Decimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CompetitionRow> for Competition {
    type Error = Error;

    fn try_from(row: CompetitionRow) -> Result<Self> {
        Ok(Self {
            id: row.id.into(),
            name: row.name,
            description: row.description,
            initial_balance: row.initial_balance,
            fee_rate: row.fee_rate,
            start_time: row.start_time,
            end_time: row.end_time,
            status: row.status.parse::<CompetitionStatus>()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<&Competition> for CompetitionRow {
    fn from(comp: &Competition) -> Self {
        Self {
            id: comp.id.as_uuid(),
            name: comp.name.clone(),
            description: comp.description.clone(),
            initial_balance: comp.initial_balance,
            fee_rate: comp.fee_rate,
            start_time: comp.start_time,
            end_time: comp.end_time,
            status: comp.status.as_str().to_string(),
            created_at: comp.created_at,
            updated_at: comp.updated_at,
        }
    }
}

/// Database row for a participant.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = participants)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ParticipantRow {
    pub id: Uuid,
    pub competition_id: Uuid,
    pub user_id: Uuid,
    pub balance: Decimal,
    pub joined_at: DateTime<Utc>,
}

impl From<ParticipantRow> for Participant {
    fn from(row: ParticipantRow) -> Self {
        Self {
            id: row.id.into(),
            competition_id: row.competition_id.into(),
            user_id: row.user_id.into(),
            balance: row.balance,
            joined_at: row.joined_at,
        }
    }
}

impl From<&Participant> for ParticipantRow {
    fn from(p: &Participant) -> Self {
        Self {
            id: p.id.as_uuid(),
            competition_id: p.competition_id.as_uuid(),
            user_id: p.user_id.as_uuid(),
            balance: p.balance,
            joined_at: p.joined_at,
        }
    }
}

/// Database row for a position.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = positions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PositionRow {
    pub id: Uuid,
    pub participant_id: Uuid,
    pub code: String,
    pub quantity: Decimal,
    pub avg_buy_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PositionRow> for Position {
    fn from(row: PositionRow) -> Self {
        Self {
            participant_id: row.participant_id.into(),
            code: MarketCode::from(row.code),
            quantity: row.quantity,
            avg_buy_price: row.avg_buy_price,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Database row for an order.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderRow {
    pub id: Uuid,
    pub participant_id: Uuid,
    pub code: String,
    pub side: String,
    pub order_type: String,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub filled_price: Option<Decimal>,
    pub fee: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = Error;

    fn try_from(row: OrderRow) -> Result<Self> {
        Ok(Self {
            id: row.id.into(),
            participant_id: row.participant_id.into(),
            code: MarketCode::from(row.code),
            side: row.side.parse::<Side>()?,
            order_type: row.order_type.parse::<OrderType>()?,
            price: row.price,
            quantity: row.quantity,
            filled_quantity: row.filled_quantity,
            filled_price: row.filled_price,
            fee: row.fee,
            status: row.status.parse::<OrderStatus>()?,
            created_at: row.created_at,
            filled_at: row.filled_at,
            cancelled_at: row.cancelled_at,
        })
    }
}

impl From<&Order> for OrderRow {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.as_uuid(),
            participant_id: order.participant_id.as_uuid(),
            code: order.code.as_str().to_string(),
            side: order.side.as_str().to_string(),
            order_type: order.order_type.as_str().to_string(),
            price: order.price,
            quantity: order.quantity,
            filled_quantity: order.filled_quantity,
            filled_price: order.filled_price,
            fee: order.fee,
            status: order.status.as_str().to_string(),
            created_at: order.created_at,
            filled_at: order.filled_at,
            cancelled_at: order.cancelled_at,
        }
    }
}

/// Database row for a trade.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = trades)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TradeRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub participant_id: Uuid,
    pub code: String,
    pub side: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub total_amount: Decimal,
    pub fee: Decimal,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TradeRow> for Trade {
    type Error = Error;

    fn try_from(row: TradeRow) -> Result<Self> {
        Ok(Self {
            id: row.id.into(),
            order_id: row.order_id.into(),
            participant_id: row.participant_id.into(),
            code: MarketCode::from(row.code),
            side: row.side.parse::<Side>()?,
            price: row.price,
            quantity: row.quantity,
            total_amount: row.total_amount,
            fee: row.fee,
            created_at: row.created_at,
        })
    }
}

impl From<&Trade> for TradeRow {
    fn from(trade: &Trade) -> Self {
        Self {
            id: trade.id.as_uuid(),
            order_id: trade.order_id.as_uuid(),
            participant_id: trade.participant_id.as_uuid(),
            code: trade.code.as_str().to_string(),
            side: trade.side.as_str().to_string(),
            price: trade.price,
            quantity: trade.quantity,
            total_amount: trade.total_amount,
            fee: trade.fee,
            created_at: trade.created_at,
        }
    }
}

/// Database row for an archived tick.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = upbit_ticker)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TickerRow {
    pub code: String,
    pub timestamp: DateTime<Utc>,
    pub opening_price: Option<Decimal>,
    pub high_price: Option<Decimal>,
    pub low_price: Option<Decimal>,
    pub trade_price: Decimal,
    pub prev_closing_price: Option<Decimal>,
    pub change: Option<String>,
    pub change_price: Option<Decimal>,
    pub signed_change_price: Option<Decimal>,
    pub change_rate: Option<Decimal>,
    pub signed_change_rate: Option<Decimal>,
    pub trade_volume: Option<Decimal>,
    pub acc_trade_volume: Option<Decimal>,
    pub acc_trade_volume_24h: Option<Decimal>,
    pub acc_trade_price: Option<Decimal>,
    pub acc_trade_price_24h: Option<Decimal>,
    pub trade_timestamp: Option<i64>,
    pub ask_bid: Option<String>,
    pub acc_ask_volume: Option<Decimal>,
    pub acc_bid_volume: Option<Decimal>,
}

impl From<TickerRow> for Ticker {
    fn from(row: TickerRow) -> Self {
        Self {
            code: row.code,
            trade_price: row.trade_price,
            timestamp: row.timestamp.timestamp_millis(),
            opening_price: row.opening_price,
            high_price: row.high_price,
            low_price: row.low_price,
            prev_closing_price: row.prev_closing_price,
            change: row.change,
            change_price: row.change_price,
            signed_change_price: row.signed_change_price,
            change_rate: row.change_rate,
            signed_change_rate: row.signed_change_rate,
            trade_volume: row.trade_volume,
            acc_trade_volume: row.acc_trade_volume,
            acc_trade_volume_24h: row.acc_trade_volume_24h,
            acc_trade_price: row.acc_trade_price,
            acc_trade_price_24h: row.acc_trade_price_24h,
            trade_timestamp: row.trade_timestamp,
            ask_bid: row.ask_bid,
            acc_ask_volume: row.acc_ask_volume,
            acc_bid_volume: row.acc_bid_volume,
        }
    }
}

impl From<&Ticker> for TickerRow {
    fn from(tick: &Ticker) -> Self {
        Self {
            code: tick.code.clone(),
            timestamp: tick.received_at(),
            opening_price: tick.opening_price,
            high_price: tick.high_price,
            low_price: tick.low_price,
            trade_price: tick.trade_price,
            prev_closing_price: tick.prev_closing_price,
            change: tick.change.clone(),
            change_price: tick.change_price,
            signed_change_price: tick.signed_change_price,
            change_rate: tick.change_rate,
            signed_change_rate: tick.signed_change_rate,
            trade_volume: tick.trade_volume,
            acc_trade_volume: tick.acc_trade_volume,
            acc_trade_volume_24h: tick.acc_trade_volume_24h,
            acc_trade_price: tick.acc_trade_price,
            acc_trade_price_24h: tick.acc_trade_price_24h,
            trade_timestamp: tick.trade_timestamp,
            ask_bid: tick.ask_bid.clone(),
            acc_ask_volume: tick.acc_ask_volume,
            acc_bid_volume: tick.acc_bid_volume,
        }
    }
}
