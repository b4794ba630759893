//! In-memory tick archive for tests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;

use super::TickArchive;
use crate::core::domain::Ticker;
use crate::error::Result;

/// Ticks per code, ordered by receipt time. Inserting an existing timestamp
/// replaces the row, matching the backing store's merge policy.
#[derive(Default)]
pub struct MemoryTickArchive {
    ticks: RwLock<HashMap<String, BTreeMap<DateTime<Utc>, Ticker>>>,
}

impl MemoryTickArchive {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TickArchive for MemoryTickArchive {
    async fn insert_batch(&self, ticks: &[Ticker]) -> Result<usize> {
        let mut map = self.ticks.write();
        for tick in ticks {
            map.entry(tick.code.clone())
                .or_default()
                .insert(tick.received_at(), tick.clone());
        }
        Ok(ticks.len())
    }

    async fn latest(&self, code: &str) -> Result<Option<Decimal>> {
        Ok(self
            .ticks
            .read()
            .get(code)
            .and_then(|by_time| by_time.values().next_back())
            .map(|tick| tick.trade_price))
    }

    async fn range(
        &self,
        code: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Ticker>> {
        Ok(self
            .ticks
            .read()
            .get(code)
            .map(|by_time| {
                by_time
                    .range(from..to)
                    .take(limit.max(0) as usize)
                    .map(|(_, tick)| tick.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}
