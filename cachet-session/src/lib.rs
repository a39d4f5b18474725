//! Server-side sessions kept in a key-value cache and tied to the client by
//! a cookie.
//!
//! A request hands its cookies to a [`SessionStore`], which either loads the
//! session named by the session cookie or creates a new one. Reads and
//! writes happen in memory; the store remembers whether anything changed and
//! writes the whole session back to the cache on [`SessionStore::save`] or,
//! when dirty, on [`SessionStore::end`]. [`SessionStore::destroy`] removes
//! it from the cache and expires the cookie.
//!
//! Cache entries are keyed `version::token`. The cookie only ever carries the
//! token, so bumping [`SessionConfig::version`] invalidates every existing
//! session at once.
//!
//! # Features
//!
//! - `redis` - Redis cache adapter (enabled by default)
//! - `memcached` - Memcached cache adapter (requires opt-in)
//!
//! [`MemoryCache`] is always available.
//!
//! # Examples
//!
//! ```
//! use cachet_session::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SessionError> {
//!     let config = SessionConfig::default()
//!         .with_cookie_prefix("myapp")
//!         .with_create(true);
//!     let manager = SessionManager::new(Arc::new(MemoryCache::new()), config)?;
//!
//!     // First request: no cookie yet, so a session is created.
//!     let jar = Arc::new(manager.cookie_jar());
//!     let mut session = manager.open(&InboundCookies::new(), jar.clone()).await?;
//!     session.set("user_id", 123).await?;
//!     manager.close(&mut session).await?;
//!
//!     let issued = jar.take();
//!     let cookie = &issued[0];
//!     assert_eq!(cookie.name(), "myapp[session]");
//!
//!     // Next request carries the cookie back.
//!     let inbound: InboundCookies = [(cookie.name(), cookie.value())].into_iter().collect();
//!     let jar = Arc::new(manager.cookie_jar());
//!     let mut session = manager.open(&inbound, jar.clone()).await?;
//!     assert_eq!(session.get::<i32>("user_id"), Some(123));
//!
//!     // Logout.
//!     session.destroy().await?;
//!     assert!(jar.take()[0].is_removal());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod cookie;
pub mod error;
pub mod manager;
pub mod memory_cache;
pub mod reply;
pub mod session;
pub mod traits;

#[cfg(feature = "redis")]
pub mod redis_cache;

#[cfg(feature = "memcached")]
pub mod memcached_cache;

pub use config::SessionConfig;
pub use cookie::{
    CookieDirective, CookieJar, CookieOptions, InboundCookies, cookie_name, expiry_timestamp,
};
pub use error::{SessionError, SessionResult};
pub use manager::SessionManager;
pub use memory_cache::MemoryCache;
pub use reply::{CacheReply, Completion, normalize};
pub use session::{SessionStore, SessionStoreBuilder};
pub use traits::{CacheAdapter, CookieGateway, SessionData, generate_token};

#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;

#[cfg(feature = "memcached")]
pub use memcached_cache::MemcachedCache;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::SessionConfig;
    pub use crate::cookie::{CookieJar, InboundCookies};
    pub use crate::error::{SessionError, SessionResult};
    pub use crate::manager::SessionManager;
    pub use crate::memory_cache::MemoryCache;
    pub use crate::session::SessionStore;
    pub use crate::traits::{CacheAdapter, CookieGateway, SessionData};

    #[cfg(feature = "redis")]
    pub use crate::redis_cache::RedisCache;

    #[cfg(feature = "memcached")]
    pub use crate::memcached_cache::MemcachedCache;
}
