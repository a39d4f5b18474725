//! Request-scoped session handling over one shared cache.

use crate::config::SessionConfig;
use crate::cookie::{CookieJar, InboundCookies};
use crate::error::SessionResult;
use crate::session::SessionStore;
use crate::traits::{CacheAdapter, CookieGateway};
use cachet_log::info;
use std::sync::Arc;

/// Opens a [`SessionStore`] at the start of each request and ends it after
/// the handler.
///
/// Holds the cache adapter and configuration shared by all requests; each
/// request brings its own cookie gateway.
///
/// # Examples
///
/// ```
/// use cachet_session::*;
/// use std::sync::Arc;
///
/// # async fn handle(manager: &SessionManager, cookie_header: &str) -> SessionResult<()> {
/// let jar = Arc::new(manager.cookie_jar());
/// let mut session = manager
///     .open(&InboundCookies::from_header(cookie_header), jar.clone())
///     .await?;
///
/// let views: u64 = session.get_or("views", 0);
/// session.set("views", views + 1).await?;
///
/// manager.close(&mut session).await?;
/// for directive in jar.take() {
///     // write a Set-Cookie header for each directive
///     let _ = directive.name();
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SessionManager {
    cache: Arc<dyn CacheAdapter>,
    config: SessionConfig,
}

impl SessionManager {
    /// Create a manager. Fails if the configuration does not validate.
    pub fn new(cache: Arc<dyn CacheAdapter>, config: SessionConfig) -> SessionResult<Self> {
        config.validate()?;
        info!(
            "session manager ready: cookie={} version={} ttl={}s auto_save={}",
            config.session_cookie_name(),
            config.version,
            config.session_ttl.as_secs(),
            config.auto_save
        );
        Ok(Self { cache, config })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// A cookie jar carrying the configured cookie attributes.
    pub fn cookie_jar(&self) -> CookieJar {
        CookieJar::new(self.config.cookie.clone())
    }

    /// An unstarted store for one request.
    pub fn store(&self, cookies: Arc<dyn CookieGateway>) -> SessionResult<SessionStore> {
        SessionStore::new(self.cache.clone(), cookies, self.config.clone())
    }

    /// Build a store and start it, creating a session when the
    /// configuration's `create` flag is set.
    pub async fn open(
        &self,
        inbound: &InboundCookies,
        cookies: Arc<dyn CookieGateway>,
    ) -> SessionResult<SessionStore> {
        let mut store = self.store(cookies)?;
        store.start(inbound, self.config.create).await?;
        Ok(store)
    }

    /// End the request's use of the session.
    pub async fn close(&self, store: &mut SessionStore) -> SessionResult<()> {
        store.end().await
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::memory_cache::MemoryCache;

    #[tokio::test]
    async fn test_open_without_create_fails() {
        let manager = SessionManager::new(Arc::new(MemoryCache::new()), SessionConfig::default())
            .unwrap();
        let jar = Arc::new(manager.cookie_jar());
        let result = manager.open(&InboundCookies::new(), jar).await;
        assert!(matches!(result, Err(SessionError::NoSessionCookie)));
    }

    #[tokio::test]
    async fn test_session_survives_requests() {
        let manager = SessionManager::new(
            Arc::new(MemoryCache::new()),
            SessionConfig::default()
                .with_cookie_prefix("app")
                .with_create(true),
        )
        .unwrap();

        // First request: no cookie, a session is created.
        let jar = Arc::new(manager.cookie_jar());
        let mut session = manager.open(&InboundCookies::new(), jar.clone()).await.unwrap();
        session.set("views", 1).await.unwrap();
        manager.close(&mut session).await.unwrap();

        let directives = jar.take();
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].name(), "app[session]");
        let token = directives[0].value().to_string();

        // Second request presents the cookie.
        let header = format!("app[session]={}; other=1", token);
        let jar = Arc::new(manager.cookie_jar());
        let mut session = manager
            .open(&InboundCookies::from_header(&header), jar.clone())
            .await
            .unwrap();
        assert_eq!(session.token(), Some(token.as_str()));
        assert_eq!(session.get::<u32>("views"), Some(1));
        assert!(!session.is_dirty());
        manager.close(&mut session).await.unwrap();
        assert!(jar.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = SessionManager::new(
            Arc::new(MemoryCache::new()),
            SessionConfig::default().with_cookie_name(""),
        );
        assert!(matches!(result, Err(SessionError::InvalidCookieName(_))));
    }
}
