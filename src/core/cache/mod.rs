//! Cache and distributed-mutex store.
//!
//! All operations are best-effort and fail open: when the backend is
//! unreachable, reads miss, duplicate checks pass, and lock acquisition
//! returns a dummy lease. The atomic guards in the ledger remain the hard
//! correctness backstop, so an unavailable cache degrades error quality but
//! never correctness. Per-user mutex safety across replicas requires all
//! replicas to share one backend; that is a deployment precondition.

pub mod keys;
pub mod memory;
pub mod redis;

pub use memory::MemoryCache;
pub use redis::RedisCache;

use std::time::Duration;

use async_trait::async_trait;

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key` with a TTL. Returns whether the write stuck.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> bool;

    /// Set `key` only if absent (duplicate suppression). Returns `true` when
    /// the key was set (no duplicate), and `true` on backend failure.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> bool;

    async fn delete(&self, key: &str) -> bool;

    /// Acquire the named distributed lock. Returns the lease token, or a
    /// dummy token when the backend is unreachable (fail-open).
    async fn acquire_lock(&self, name: &str, ttl: Duration) -> Option<String>;

    /// Release the named lock iff `token` still holds the lease
    /// (compare-and-delete), so a late holder cannot release a newer lease.
    async fn release_lock(&self, name: &str, token: &str) -> bool;
}
