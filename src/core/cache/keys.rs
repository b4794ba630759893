//! Cache key layout and TTLs.

use std::time::Duration;

use crate::core::domain::{CompetitionId, UserId};

pub const TTL_TICKER_LATEST: Duration = Duration::from_secs(1);
pub const TTL_LEADERBOARD: Duration = Duration::from_secs(10);
pub const TTL_IDEMPOTENCY: Duration = Duration::from_secs(5);
pub const TTL_ORDER_HASH: Duration = Duration::from_secs(2);
pub const TTL_ORDER_LOCK: Duration = Duration::from_secs(10);

/// Wait budget for the per-user order lock.
pub const ORDER_LOCK_WAIT: Duration = Duration::from_secs(5);

#[must_use]
pub fn ticker_latest(code: &str) -> String {
    format!("ticker:latest:{code}")
}

#[must_use]
pub fn leaderboard(competition: CompetitionId) -> String {
    format!("leaderboard:{competition}")
}

#[must_use]
pub fn order_idempotency(user: UserId, key: &str) -> String {
    format!("order:idempotency:{user}:{key}")
}

#[must_use]
pub fn order_hash(user: UserId, digest: &str) -> String {
    format!("order:hash:{user}:{digest}")
}

/// Name of the per-user order mutex; implementations prefix `lock:`.
#[must_use]
pub fn order_lock(user: UserId) -> String {
    format!("order:{user}")
}
