//! Postgres tick archive.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use rust_decimal::Decimal;

use super::TickArchive;
use crate::core::db::model::TickerRow;
use crate::core::db::schema::upbit_ticker;
use crate::core::db::DbPool;
use crate::core::domain::Ticker;
use crate::error::{Error, Result};

pub struct PgTickArchive {
    pool: DbPool,
}

impl PgTickArchive {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TickArchive for PgTickArchive {
    async fn insert_batch(&self, ticks: &[Ticker]) -> Result<usize> {
        if ticks.is_empty() {
            return Ok(0);
        }
        // A replay inside one batch would make ON CONFLICT touch the same
        // row twice, which postgres refuses; collapse to the last tick per
        // (code, timestamp) first.
        let mut by_key: HashMap<(String, DateTime<Utc>), TickerRow> = HashMap::new();
        for tick in ticks {
            let row = TickerRow::from(tick);
            by_key.insert((row.code.clone(), row.timestamp), row);
        }
        let rows: Vec<TickerRow> = by_key.into_values().collect();
        let mut conn = self.pool.get().map_err(|e| Error::Connection(e.to_string()))?;

        // Latest row wins: a replayed (code, timestamp) overwrites in place.
        let written = diesel::insert_into(upbit_ticker::table)
            .values(&rows)
            .on_conflict((upbit_ticker::code, upbit_ticker::timestamp))
            .do_update()
            .set((
                upbit_ticker::trade_price.eq(excluded(upbit_ticker::trade_price)),
                upbit_ticker::opening_price.eq(excluded(upbit_ticker::opening_price)),
                upbit_ticker::high_price.eq(excluded(upbit_ticker::high_price)),
                upbit_ticker::low_price.eq(excluded(upbit_ticker::low_price)),
                upbit_ticker::prev_closing_price.eq(excluded(upbit_ticker::prev_closing_price)),
                upbit_ticker::change.eq(excluded(upbit_ticker::change)),
                upbit_ticker::change_price.eq(excluded(upbit_ticker::change_price)),
                upbit_ticker::signed_change_price.eq(excluded(upbit_ticker::signed_change_price)),
                upbit_ticker::change_rate.eq(excluded(upbit_ticker::change_rate)),
                upbit_ticker::signed_change_rate.eq(excluded(upbit_ticker::signed_change_rate)),
                upbit_ticker::trade_volume.eq(excluded(upbit_ticker::trade_volume)),
                upbit_ticker::acc_trade_volume.eq(excluded(upbit_ticker::acc_trade_volume)),
                upbit_ticker::acc_trade_volume_24h.eq(excluded(upbit_ticker::acc_trade_volume_24h)),
                upbit_ticker::acc_trade_price.eq(excluded(upbit_ticker::acc_trade_price)),
                upbit_ticker::acc_trade_price_24h.eq(excluded(upbit_ticker::acc_trade_price_24h)),
                upbit_ticker::trade_timestamp.eq(excluded(upbit_ticker::trade_timestamp)),
                upbit_ticker::ask_bid.eq(excluded(upbit_ticker::ask_bid)),
                upbit_ticker::acc_ask_volume.eq(excluded(upbit_ticker::acc_ask_volume)),
                upbit_ticker::acc_bid_volume.eq(excluded(upbit_ticker::acc_bid_volume)),
            ))
            .execute(&mut conn)?;
        Ok(written)
    }

    async fn latest(&self, code: &str) -> Result<Option<Decimal>> {
        let mut conn = self.pool.get().map_err(|e| Error::Connection(e.to_string()))?;
        let price: Option<Decimal> = upbit_ticker::table
            .filter(upbit_ticker::code.eq(code))
            .order(upbit_ticker::timestamp.desc())
            .select(upbit_ticker::trade_price)
            .first(&mut conn)
            .optional()?;
        Ok(price)
    }

    async fn range(
        &self,
        code: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Ticker>> {
        let mut conn = self.pool.get().map_err(|e| Error::Connection(e.to_string()))?;
        let rows: Vec<TickerRow> = upbit_ticker::table
            .filter(
                upbit_ticker::code
                    .eq(code)
                    .and(upbit_ticker::timestamp.ge(from))
                    .and(upbit_ticker::timestamp.lt(to)),
            )
            .order(upbit_ticker::timestamp.asc())
            .limit(limit)
            .load(&mut conn)?;
        Ok(rows.into_iter().map(Ticker::from).collect())
    }
}
