//! Redis cache adapter.

use crate::error::{SessionError, SessionResult};
use crate::reply::{CacheReply, normalize, normalize_remove, normalize_write};
use crate::traits::{CacheAdapter, SessionData, decode_payload, encode_payload};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

/// Redis-backed [`CacheAdapter`].
///
/// Payloads are JSON strings written with `SET key value EX ttl`.
///
/// # Examples
///
/// ```no_run
/// use cachet_session::{RedisCache, SessionConfig, SessionManager};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let cache = RedisCache::new("redis://localhost:6379")
///         .await?
///         .with_namespace("myapp");
///
///     let manager = SessionManager::new(Arc::new(cache), SessionConfig::default())?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    namespace: Option<String>,
}

impl RedisCache {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `url` - `redis://` or `rediss://` connection URL
    pub async fn new(url: &str) -> SessionResult<Self> {
        check_url(url)?;

        let client =
            redis::Client::open(url).map_err(|e| SessionError::Connection(e.to_string()))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))?;

        Ok(Self {
            conn,
            namespace: None,
        })
    }

    /// Prefix every key with `namespace:`.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    fn key(&self, key: &str) -> String {
        namespaced(self.namespace.as_deref(), key)
    }
}

fn check_url(url: &str) -> SessionResult<()> {
    if url.starts_with("redis://") || url.starts_with("rediss://") {
        Ok(())
    } else {
        Err(SessionError::InvalidUrl(
            "Redis URL must start with redis:// or rediss://".to_string(),
        ))
    }
}

fn namespaced(namespace: Option<&str>, key: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{}:{}", ns, key),
        _ => key.to_string(),
    }
}

#[async_trait]
impl CacheAdapter for RedisCache {
    async fn get(&self, key: &str) -> SessionResult<Option<SessionData>> {
        let key = self.key(key);
        let mut conn = self.conn.clone();

        let raw: Result<Option<String>, redis::RedisError> = conn.get(&key).await;
        let miss = || SessionError::RequestFailed(format!("get {}", key));

        match normalize(CacheReply::from_lookup(raw), false, miss)? {
            Some(raw) => normalize(decode_payload(&raw), false, miss),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, data: &SessionData, ttl: Duration) -> SessionResult<()> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        let payload = encode_payload(data)?;

        // EX 0 is rejected by Redis; round sub-second TTLs up.
        let seconds = ttl.as_secs().max(1);
        let result: Result<(), redis::RedisError> = conn.set_ex(&key, payload, seconds).await;
        normalize_write(result.into())
    }

    async fn remove(&self, key: &str) -> SessionResult<()> {
        let key = self.key(key);
        let mut conn = self.conn.clone();

        let removed: Result<i64, redis::RedisError> = conn.del(&key).await;
        normalize_remove(CacheReply::from_ack(removed.map(|count| count > 0)), &key)
    }
}
