//! In-process cache adapter.
//!
//! Useful for tests and single-node deployments. Payloads are stored as
//! JSON text, the same shape the network backends store.

use crate::cookie::expiry_timestamp;
use crate::error::{SessionError, SessionResult};
use crate::reply::{CacheReply, normalize, normalize_remove, normalize_write};
use crate::traits::{CacheAdapter, SessionData, decode_payload, encode_payload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry {
    payload: String,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// In-memory [`CacheAdapter`] with per-entry TTL.
///
/// Clones share the same storage.
///
/// # Examples
///
/// ```
/// use cachet_session::{MemoryCache, SessionConfig, SessionManager};
/// use std::sync::Arc;
///
/// let cache = Arc::new(MemoryCache::new().with_max_entries(10_000));
/// let manager = SessionManager::new(cache, SessionConfig::default()).unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    max_entries: Option<usize>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse writes of new keys once `max` live entries are stored.
    ///
    /// Refused writes surface as [`SessionError::PersistFailed`].
    ///
    /// [`SessionError::PersistFailed`]: crate::SessionError::PersistFailed
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    /// Number of stored entries, expired ones included until purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Remaining lifetime of `key`, if present and live.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Utc::now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| (entry.expires_at - now).to_std().ok())
    }

    fn lookup(&self, entries: &HashMap<String, Entry>, key: &str) -> CacheReply<SessionData> {
        match entries.get(key) {
            Some(entry) if !entry.is_expired(Utc::now()) => decode_payload(&entry.payload),
            _ => CacheReply::False,
        }
    }
}

#[async_trait]
impl CacheAdapter for MemoryCache {
    async fn get(&self, key: &str) -> SessionResult<Option<SessionData>> {
        let reply = {
            let entries = self.entries.read().await;
            self.lookup(&entries, key)
        };
        normalize(reply, false, || {
            SessionError::RequestFailed(format!("get {}", key))
        })
    }

    async fn set(&self, key: &str, data: &SessionData, ttl: Duration) -> SessionResult<()> {
        let payload = encode_payload(data)?;
        let now = Utc::now();
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let entry = Entry {
            payload,
            expires_at: expiry_timestamp(now, ttl_secs),
        };

        let mut entries = self.entries.write().await;
        let accepted = match self.max_entries {
            Some(max) if !entries.contains_key(key) && entries.len() >= max => {
                entries.retain(|_, entry| !entry.is_expired(now));
                entries.len() < max
            }
            _ => true,
        };
        if accepted {
            entries.insert(key.to_string(), entry);
        }
        normalize_write(CacheReply::from_ack(Ok::<_, SessionError>(accepted)))
    }

    async fn remove(&self, key: &str) -> SessionResult<()> {
        let now = Utc::now();
        let removed = self
            .entries
            .write()
            .await
            .remove(key)
            .is_some_and(|entry| !entry.is_expired(now));
        normalize_remove(
            CacheReply::from_ack(Ok::<_, SessionError>(removed)),
            key,
        )
    }
}
