//! Redis-backed cache and distributed mutex.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{info, warn};
use uuid::Uuid;

use super::CacheStore;

/// Compare-and-delete release: only the current lease holder may delete.
const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Redis cache. Holds a connection manager that reconnects on its own; when
/// the initial connection fails the cache runs disconnected and every
/// operation fails open.
pub struct RedisCache {
    conn: Option<ConnectionManager>,
}

impl RedisCache {
    /// Connect to the given redis URL. A failed connection is logged and
    /// yields a disconnected (fail-open) cache rather than an error.
    pub async fn connect(url: &str) -> Self {
        match Self::try_connect(url).await {
            Ok(conn) => {
                info!(url = %url, "Redis connected");
                Self { conn: Some(conn) }
            }
            Err(e) => {
                warn!(error = %e, "Redis connection failed, cache runs fail-open");
                Self { conn: None }
            }
        }
    }

    /// A cache with no backend; every operation fails open. Used when no
    /// redis URL is configured.
    #[must_use]
    pub fn disconnected() -> Self {
        Self { conn: None }
    }

    async fn try_connect(url: &str) -> redis::RedisResult<ConnectionManager> {
        let client = redis::Client::open(url)?;
        ConnectionManager::new(client).await
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.clone()?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, key, "cache get failed");
                None
            }
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let Some(mut conn) = self.conn.clone() else {
            return false;
        };
        match conn
            .set_ex::<_, _, ()>(key, value, ttl.as_secs())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, key, "cache set failed");
                false
            }
        }
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> bool {
        // Disconnected or erroring backends pass the duplicate check.
        let Some(mut conn) = self.conn.clone() else {
            return true;
        };
        let result: redis::RedisResult<Option<String>> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await;
        match result {
            Ok(reply) => reply.is_some(),
            Err(e) => {
                warn!(error = %e, key, "cache setnx failed");
                true
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        let Some(mut conn) = self.conn.clone() else {
            return false;
        };
        match conn.del::<_, ()>(key).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, key, "cache delete failed");
                false
            }
        }
    }

    async fn acquire_lock(&self, name: &str, ttl: Duration) -> Option<String> {
        // Without a backend the lock degrades to a no-op lease; the ledger's
        // atomic guards still keep concurrent requests correct.
        let Some(mut conn) = self.conn.clone() else {
            return Some(Uuid::new_v4().to_string());
        };
        let token = Uuid::new_v4().to_string();
        let result: redis::RedisResult<Option<String>> = redis::cmd("SET")
            .arg(format!("lock:{name}"))
            .arg(&token)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await;
        match result {
            Ok(Some(_)) => Some(token),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, name, "lock acquire failed");
                Some(Uuid::new_v4().to_string())
            }
        }
    }

    async fn release_lock(&self, name: &str, token: &str) -> bool {
        let Some(mut conn) = self.conn.clone() else {
            return true;
        };
        let result: redis::RedisResult<i64> = redis::Script::new(RELEASE_SCRIPT)
            .key(format!("lock:{name}"))
            .arg(token)
            .invoke_async(&mut conn)
            .await;
        match result {
            Ok(n) => n == 1,
            Err(e) => {
                warn!(error = %e, name, "lock release failed");
                false
            }
        }
    }
}
