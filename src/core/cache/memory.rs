//! In-process cache and mutex, for tests and single-replica runs.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::CacheStore;

#[derive(Clone)]
struct ValueEntry {
    value: String,
    expires_at: Instant,
}

impl ValueEntry {
    fn live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// TTL map over a `DashMap`. Entry-level locking makes set-if-absent atomic.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, ValueEntry>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_if_absent(&self, key: String, value: String, ttl: Duration) -> bool {
        let fresh = ValueEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().live() {
                    false
                } else {
                    occupied.insert(fresh);
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                true
            }
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        entry.live().then(|| entry.value.clone())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> bool {
        self.entries.insert(
            key.to_string(),
            ValueEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        true
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> bool {
        self.insert_if_absent(key.to_string(), value.to_string(), ttl)
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    async fn acquire_lock(&self, name: &str, ttl: Duration) -> Option<String> {
        let token = Uuid::new_v4().to_string();
        self.insert_if_absent(format!("lock:{name}"), token.clone(), ttl)
            .then_some(token)
    }

    async fn release_lock(&self, name: &str, token: &str) -> bool {
        let key = format!("lock:{name}");
        match self.entries.entry(key) {
            Entry::Occupied(occupied) => {
                if occupied.get().value == token {
                    occupied.remove();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_nx_suppresses_until_expiry() {
        let cache = MemoryCache::new();
        assert!(cache.set_nx_ex("k", "v", Duration::from_secs(5)).await);
        assert!(!cache.set_nx_ex("k", "v", Duration::from_secs(5)).await);

        // An expired entry behaves as absent.
        cache
            .set_ex("stale", "v", Duration::from_millis(0))
            .await;
        assert!(cache.set_nx_ex("stale", "v2", Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn lock_release_requires_matching_token() {
        let cache = MemoryCache::new();
        let token = cache
            .acquire_lock("order:u1", Duration::from_secs(10))
            .await
            .unwrap();

        assert!(cache.acquire_lock("order:u1", Duration::from_secs(10)).await.is_none());
        assert!(!cache.release_lock("order:u1", "someone-else").await);
        assert!(cache.release_lock("order:u1", &token).await);
        assert!(cache.acquire_lock("order:u1", Duration::from_secs(10)).await.is_some());
    }
}
