//! The tick archive: append-only store of raw feed ticks.
//!
//! Keyed by `(code, timestamp)` with latest-row-wins semantics so upstream
//! replays never inflate totals. The archive is the source of truth for the
//! "current market price" used by order validation.

pub mod batcher;
pub mod memory;
pub mod postgres;

pub use batcher::TickBatcher;
pub use memory::MemoryTickArchive;
pub use postgres::PgTickArchive;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::core::cache::{keys, CacheStore};
use crate::core::domain::Ticker;
use crate::error::Result;

#[async_trait]
pub trait TickArchive: Send + Sync {
    /// Append a batch of ticks; rows replaying an existing `(code, timestamp)`
    /// overwrite it. Returns the number of rows written.
    async fn insert_batch(&self, ticks: &[Ticker]) -> Result<usize>;

    /// Most recent archived trade price for `code`.
    async fn latest(&self, code: &str) -> Result<Option<Decimal>>;

    /// Archived ticks for `code` in `[from, to)`, oldest first, capped at
    /// `limit` rows. Backs the external read endpoints.
    async fn range(
        &self,
        code: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Ticker>>;
}

/// Market price reads for order validation: archive `latest` behind a ~1 s
/// cache so the hot path stays off the archive.
pub struct PriceSource {
    archive: Arc<dyn TickArchive>,
    cache: Arc<dyn CacheStore>,
}

impl PriceSource {
    #[must_use]
    pub fn new(archive: Arc<dyn TickArchive>, cache: Arc<dyn CacheStore>) -> Self {
        Self { archive, cache }
    }

    /// The current market price for `code`, or `None` when the archive has
    /// never seen the code.
    pub async fn latest(&self, code: &str) -> Result<Option<Decimal>> {
        let key = keys::ticker_latest(code);
        if let Some(cached) = self.cache.get(&key).await {
            if let Ok(price) = cached.parse::<Decimal>() {
                return Ok(Some(price));
            }
        }

        let price = self.archive.latest(code).await?;
        if let Some(price) = price {
            self.cache
                .set_ex(&key, &price.to_string(), keys::TTL_TICKER_LATEST)
                .await;
        }
        Ok(price)
    }
}
