//! Collaborator traits and session token generation.

use crate::error::{SessionError, SessionResult};
use crate::reply::CacheReply;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Session payload: string keys to arbitrary JSON values.
pub type SessionData = HashMap<String, serde_json::Value>;

/// Key-value cache holding session payloads.
///
/// Implementations must never store a literal `false` as a session payload:
/// the store treats it as a miss.
///
/// # Examples
///
/// ```
/// use cachet_session::{CacheAdapter, MemoryCache, SessionData};
/// use std::time::Duration;
///
/// # async fn example() -> cachet_session::SessionResult<()> {
/// let cache = MemoryCache::new();
/// let mut data = SessionData::new();
/// data.insert("user_id".to_string(), 42.into());
///
/// cache.set("2::token", &data, Duration::from_secs(60)).await?;
/// assert_eq!(cache.get("2::token").await?, Some(data));
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait CacheAdapter: Send + Sync {
    /// Fetch the payload stored at `key`.
    ///
    /// Returns `Ok(None)` on a miss (absent, expired or literal `false`).
    async fn get(&self, key: &str) -> SessionResult<Option<SessionData>>;

    /// Store `data` at `key` for `ttl`.
    ///
    /// A write the cache refuses is reported as
    /// [`SessionError::PersistFailed`].
    async fn set(&self, key: &str, data: &SessionData, ttl: Duration) -> SessionResult<()>;

    /// Remove `key`.
    ///
    /// A removal the cache reports as unsuccessful (including an absent key)
    /// is [`SessionError::RequestFailed`].
    async fn remove(&self, key: &str) -> SessionResult<()>;
}

/// Outbound cookie writes for one response.
///
/// Reading cookies is not part of this trait: the store receives an
/// [`InboundCookies`](crate::InboundCookies) snapshot instead.
pub trait CookieGateway: Send + Sync {
    /// Set cookie `name` to `value` for `ttl`.
    fn set_cookie(&self, name: &str, value: &str, ttl: Duration);

    /// Expire cookie `name` on the client.
    fn remove_cookie(&self, name: &str);
}

/// Generate a new session token.
///
/// A time-ordered UUID followed by a random one, both without hyphens:
/// 64 lowercase hex characters.
pub fn generate_token() -> String {
    format!(
        "{}{}",
        uuid::Uuid::now_v7().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Serialize a payload for a string-valued cache.
pub(crate) fn encode_payload(data: &SessionData) -> SessionResult<String> {
    serde_json::to_string(data).map_err(|e| SessionError::Serialization(e.to_string()))
}

/// Decode a payload read from a string-valued cache.
///
/// A stored literal `false` reads as a miss.
pub(crate) fn decode_payload(raw: &str) -> CacheReply<SessionData> {
    if raw.trim() == "false" {
        return CacheReply::False;
    }
    match serde_json::from_str(raw) {
        Ok(data) => CacheReply::Value(data),
        Err(e) => CacheReply::Error(SessionError::Deserialization(e.to_string())),
    }
}
