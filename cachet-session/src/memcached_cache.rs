//! Memcached cache adapter.
//!
//! This module requires the `memcached` feature flag.

use crate::cookie::expiry_timestamp;
use crate::error::{SessionError, SessionResult};
use crate::reply::{CacheReply, normalize, normalize_remove, normalize_write};
use crate::traits::{CacheAdapter, SessionData, decode_payload, encode_payload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Longest key memcached accepts, in bytes.
pub const MAX_KEY_LEN: usize = 250;

/// Expirations above this many seconds are read by memcached as absolute
/// Unix timestamps.
const RELATIVE_EXPIRATION_LIMIT: u64 = 60 * 60 * 24 * 30;

/// Memcached-backed [`CacheAdapter`].
///
/// The `memcache` client is blocking, so every call runs on
/// `spawn_blocking` behind a shared lock.
///
/// # Feature Flag
///
/// ```toml
/// [dependencies]
/// cachet-session = { version = "0.1", features = ["memcached"] }
/// ```
///
/// # Examples
///
/// ```ignore
/// use cachet_session::{MemcachedCache, SessionConfig, SessionManager};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let cache = MemcachedCache::new("memcache://localhost:11211").await?;
///     let manager = SessionManager::new(Arc::new(cache), SessionConfig::default())?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct MemcachedCache {
    client: Arc<Mutex<memcache::Client>>,
}

impl MemcachedCache {
    /// Connect to memcached.
    ///
    /// # Arguments
    ///
    /// * `url` - `memcache://host:port` or plain `host:port`
    pub async fn new(url: &str) -> SessionResult<Self> {
        let server_url = parse_url(url)?;

        let client = tokio::task::spawn_blocking(move || memcache::connect(server_url.as_str()))
            .await
            .map_err(|e| SessionError::Connection(format!("Failed to spawn task: {}", e)))?
            .map_err(|e| SessionError::Connection(format!("Failed to connect: {}", e)))?;

        Ok(Self {
            client: Arc::new(Mutex::new(client)),
        })
    }
}

fn parse_url(url: &str) -> SessionResult<String> {
    if url.starts_with("memcache://") {
        Ok(url.to_string())
    } else if url.contains(':') && !url.contains("://") {
        Ok(format!("memcache://{}", url))
    } else {
        Err(SessionError::InvalidUrl(format!(
            "Invalid Memcached URL: {}. Expected 'memcache://host:port' or 'host:port'",
            url
        )))
    }
}

/// Keys must be at most [`MAX_KEY_LEN`] bytes without whitespace or control
/// characters.
fn check_key(key: &str) -> SessionResult<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(SessionError::InvalidKey(format!(
            "length {} outside 1..={}",
            key.len(),
            MAX_KEY_LEN
        )));
    }
    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(SessionError::InvalidKey(format!(
            "{:?} contains whitespace or control characters",
            key
        )));
    }
    Ok(())
}

/// Memcached expiration for a TTL applied at `now`.
fn expiration(ttl: Duration, now: DateTime<Utc>) -> u32 {
    let secs = ttl.as_secs();
    if secs <= RELATIVE_EXPIRATION_LIMIT {
        return secs as u32;
    }
    let at = expiry_timestamp(now, i64::try_from(secs).unwrap_or(i64::MAX));
    u32::try_from(at.timestamp()).unwrap_or(u32::MAX)
}

fn join_error(e: tokio::task::JoinError) -> SessionError {
    SessionError::RequestFailed(format!("Task join error: {}", e))
}

#[async_trait]
impl CacheAdapter for MemcachedCache {
    async fn get(&self, key: &str) -> SessionResult<Option<SessionData>> {
        check_key(key)?;
        let owned = key.to_string();
        let client = self.client.clone();

        let raw = tokio::task::spawn_blocking(move || {
            let client = client.blocking_lock();
            client.get::<String>(&owned)
        })
        .await
        .map_err(join_error)?;

        let miss = || SessionError::RequestFailed(format!("get {}", key));
        match normalize(CacheReply::from_lookup(raw), false, miss)? {
            Some(raw) => normalize(decode_payload(&raw), false, miss),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, data: &SessionData, ttl: Duration) -> SessionResult<()> {
        check_key(key)?;
        let owned = key.to_string();
        let payload = encode_payload(data)?;
        let expires = expiration(ttl, Utc::now());
        let client = self.client.clone();

        let result = tokio::task::spawn_blocking(move || {
            let client = client.blocking_lock();
            client.set(&owned, payload.as_str(), expires)
        })
        .await
        .map_err(join_error)?;

        normalize_write(result.into())
    }

    async fn remove(&self, key: &str) -> SessionResult<()> {
        check_key(key)?;
        let owned = key.to_string();
        let client = self.client.clone();

        // `delete` answers `false` when the key was not stored.
        let removed = tokio::task::spawn_blocking(move || {
            let client = client.blocking_lock();
            client.delete(&owned)
        })
        .await
        .map_err(join_error)?;

        normalize_remove(CacheReply::from_ack(removed), key)
    }
}
