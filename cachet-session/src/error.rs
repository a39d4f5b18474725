//! Error types for session operations.

use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Session-specific errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A required collaborator was not supplied at construction
    #[error("Missing required dependency: {0}")]
    MissingDependency(&'static str),

    /// `start` without create and the request carried no session cookie
    #[error("No session cookie found")]
    NoSessionCookie,

    /// `start` without create and the cookie's key missed in the cache
    #[error("No session found")]
    NoSessionFound,

    /// The cache reported failure for a session write
    #[error("Cache request failed while persisting session")]
    PersistFailed,

    /// The cache reported failure for any other request
    #[error("Cache request failed: {0}")]
    RequestFailed(String),

    /// Key rejected by the cache backend
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// Cookie name or prefix that cannot appear in a cookie header
    #[error("Invalid cookie name: {0}")]
    InvalidCookieName(String),

    /// Operation needs a session token but the store was never started
    #[error("Session has not been started")]
    NotStarted,

    /// `start`/`create` on a store that already holds a token
    #[error("Session already started")]
    AlreadyStarted,

    /// Redis-specific error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Memcached-specific error
    #[cfg(feature = "memcached")]
    #[error("Memcached error: {0}")]
    Memcached(#[from] memcache::MemcacheError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}
