//! Per-request session store.

use crate::config::{KEY_SEPARATOR, SessionConfig};
use crate::cookie::InboundCookies;
use crate::error::{SessionError, SessionResult};
use crate::reply::Completion;
use crate::traits::{CacheAdapter, CookieGateway, SessionData, generate_token};
use cachet_log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// One client's session for the duration of one request.
///
/// The store holds the session data in memory, remembers whether it changed
/// since it was loaded or last saved, and talks to the cache and the cookie
/// gateway on `start`, `create`, `save`, `end` and `destroy`.
///
/// Build one per request; it is not meant to be shared across requests.
///
/// # Examples
///
/// ```
/// use cachet_session::*;
/// use std::sync::Arc;
///
/// # async fn example() -> SessionResult<()> {
/// let cache = Arc::new(MemoryCache::new());
/// let jar = Arc::new(CookieJar::default());
///
/// let mut session = SessionStore::builder()
///     .cache(cache)
///     .cookies(jar.clone())
///     .build()?;
///
/// session.start(&InboundCookies::new(), true).await?;
/// session.set("user_id", 42).await?;
/// assert_eq!(session.get::<u32>("user_id"), Some(42));
///
/// session.end().await?;
/// assert!(!session.is_dirty());
/// assert_eq!(jar.directives().len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct SessionStore {
    cache: Arc<dyn CacheAdapter>,
    cookies: Arc<dyn CookieGateway>,
    config: SessionConfig,
    token: Option<String>,
    versioned_key: Option<String>,
    data: SessionData,
    dirty: bool,
}

/// Builder for [`SessionStore`].
///
/// Both collaborators are required; `build` reports a missing one as
/// [`SessionError::MissingDependency`].
#[derive(Default)]
pub struct SessionStoreBuilder {
    cache: Option<Arc<dyn CacheAdapter>>,
    cookies: Option<Arc<dyn CookieGateway>>,
    config: SessionConfig,
}

impl SessionStoreBuilder {
    pub fn cache(mut self, cache: Arc<dyn CacheAdapter>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cookies(mut self, cookies: Arc<dyn CookieGateway>) -> Self {
        self.cookies = Some(cookies);
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> SessionResult<SessionStore> {
        let cache = self
            .cache
            .ok_or(SessionError::MissingDependency("cache adapter"))?;
        let cookies = self
            .cookies
            .ok_or(SessionError::MissingDependency("cookie gateway"))?;
        SessionStore::new(cache, cookies, self.config)
    }
}

impl SessionStore {
    /// Create an unstarted store.
    ///
    /// Fails if the configuration does not validate.
    pub fn new(
        cache: Arc<dyn CacheAdapter>,
        cookies: Arc<dyn CookieGateway>,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        config.validate()?;
        Ok(Self {
            cache,
            cookies,
            config,
            token: None,
            versioned_key: None,
            data: SessionData::new(),
            dirty: false,
        })
    }

    pub fn builder() -> SessionStoreBuilder {
        SessionStoreBuilder::default()
    }

    // ========== Lifecycle ==========

    /// Resolve the session named by the request's cookie.
    ///
    /// Without a cookie (or with an empty one), fails with
    /// [`SessionError::NoSessionCookie`] unless `allow_create`, in which case
    /// a new session is created without touching the cache. With a cookie,
    /// loads `version::token` from the cache; a miss, or a token the cache
    /// rejects as a key, is [`SessionError::NoSessionFound`] unless
    /// `allow_create`.
    pub async fn start(&mut self, inbound: &InboundCookies, allow_create: bool) -> SessionResult<()> {
        if self.token.is_some() {
            return Err(SessionError::AlreadyStarted);
        }

        let cookie_name = self.config.session_cookie_name();
        let token = match inbound.get(&cookie_name).filter(|value| !value.is_empty()) {
            Some(token) => token.to_string(),
            None if allow_create => return self.create().await,
            None => {
                debug!("no {} cookie on request", cookie_name);
                return Err(SessionError::NoSessionCookie);
            }
        };

        let key = self.config.versioned_key(&token);
        // The token comes from the client; one the backend cannot address
        // can never name a stored session.
        let lookup = match self.cache.get(&key).await {
            Err(SessionError::InvalidKey(reason)) => {
                debug!("session cookie is not a usable key: {}", reason);
                None
            }
            other => other?,
        };
        match lookup {
            Some(data) => {
                debug!("loaded session {} ({} keys)", redact(&token), data.len());
                self.token = Some(token);
                self.versioned_key = Some(key);
                self.data = data;
                self.dirty = false;
                Ok(())
            }
            None if allow_create => {
                debug!("session {} not in cache, creating", redact(&token));
                self.create().await
            }
            None => {
                debug!("session {} not in cache", redact(&token));
                Err(SessionError::NoSessionFound)
            }
        }
    }

    /// [`start`](Self::start), reporting to `completion` as well.
    pub async fn start_with(
        &mut self,
        inbound: &InboundCookies,
        allow_create: bool,
        completion: impl Into<Completion>,
    ) -> SessionResult<()> {
        let result = self.start(inbound, allow_create).await;
        completion.into().complete(result)
    }

    /// Start a brand-new session.
    ///
    /// Issues the session cookie with the bare token and marks the session
    /// dirty. Only persists right away under `auto_save`.
    pub async fn create(&mut self) -> SessionResult<()> {
        if self.token.is_some() {
            return Err(SessionError::AlreadyStarted);
        }

        let token = generate_token();
        let key = self.config.versioned_key(&token);
        self.cookies.set_cookie(
            &self.config.session_cookie_name(),
            &token,
            self.config.cookie.ttl,
        );
        debug!("created session {}", redact(&token));

        self.token = Some(token);
        self.versioned_key = Some(key);
        self.dirty = true;

        if self.config.auto_save {
            self.save().await
        } else {
            Ok(())
        }
    }

    /// [`create`](Self::create), reporting to `completion` as well.
    pub async fn create_with(&mut self, completion: impl Into<Completion>) -> SessionResult<()> {
        let result = self.create().await;
        completion.into().complete(result)
    }

    /// Write the full session data to the cache.
    ///
    /// Always writes, dirty or not. On failure the session stays dirty and
    /// the error is returned; nothing is retried.
    pub async fn save(&mut self) -> SessionResult<()> {
        let key = self.versioned_key.as_deref().ok_or(SessionError::NotStarted)?;

        match self.cache.set(key, &self.data, self.config.session_ttl).await {
            Ok(()) => {
                self.dirty = false;
                Ok(())
            }
            Err(e) => {
                warn!("failed to persist session {}: {}", redact_key(key), e);
                Err(e)
            }
        }
    }

    /// [`save`](Self::save), reporting to `completion` as well.
    pub async fn save_with(&mut self, completion: impl Into<Completion>) -> SessionResult<()> {
        let result = self.save().await;
        completion.into().complete(result)
    }

    /// Finish this request's use of the session: save if dirty, otherwise
    /// do nothing.
    pub async fn end(&mut self) -> SessionResult<()> {
        if self.dirty {
            self.save().await
        } else {
            Ok(())
        }
    }

    /// [`end`](Self::end), reporting to `completion` as well.
    pub async fn end_with(&mut self, completion: impl Into<Completion>) -> SessionResult<()> {
        let result = self.end().await;
        completion.into().complete(result)
    }

    /// Remove the session: clear the data, expire the cookie, delete the
    /// cache entry.
    ///
    /// Data and cookie are cleared before the cache is asked, so they stay
    /// cleared when the removal fails.
    pub async fn destroy(&mut self) -> SessionResult<()> {
        self.data.clear();
        self.dirty = false;
        self.cookies.remove_cookie(&self.config.session_cookie_name());

        let key = self.versioned_key.as_deref().ok_or(SessionError::NotStarted)?;
        debug!("destroying session {}", redact_key(key));
        self.cache.remove(key).await.inspect_err(|e| {
            warn!("failed to remove session {}: {}", redact_key(key), e);
        })
    }

    /// [`destroy`](Self::destroy), reporting to `completion` as well.
    pub async fn destroy_with(&mut self, completion: impl Into<Completion>) -> SessionResult<()> {
        let result = self.destroy().await;
        completion.into().complete(result)
    }

    // ========== Data ==========

    /// Value at `key`, deserialized into `T`.
    ///
    /// `None` when absent or not representable as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Value at `key`, or `default`.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Raw JSON value at `key`.
    pub fn get_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Store `value` at `key` and mark the session dirty.
    ///
    /// Persists immediately under `auto_save`; any error then comes from
    /// that save. Serialization failures leave the data untouched.
    pub async fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> SessionResult<()> {
        self.insert(key.into(), value)?;
        if self.config.auto_save {
            self.save().await
        } else {
            Ok(())
        }
    }

    /// Store `value` at `key` and persist right away, regardless of
    /// `auto_save`.
    pub async fn set_and_save<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> SessionResult<()> {
        self.insert(key.into(), value)?;
        self.save().await
    }

    /// Remove `key` and mark the session dirty. Persists under `auto_save`.
    ///
    /// Returns the removed value.
    pub async fn remove(&mut self, key: &str) -> SessionResult<Option<serde_json::Value>> {
        let removed = self.data.remove(key);
        self.dirty = true;
        if self.config.auto_save {
            self.save().await?;
        }
        Ok(removed)
    }

    fn insert<T: Serialize>(&mut self, key: String, value: T) -> SessionResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;
        self.data.insert(key, value);
        self.dirty = true;
        Ok(())
    }

    // ========== Accessors ==========

    /// Client-visible token, once started.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Cache key, once started. Never sent to the client.
    pub fn versioned_key(&self) -> Option<&str> {
        self.versioned_key.as_deref()
    }

    pub fn is_started(&self) -> bool {
        self.token.is_some()
    }

    /// Whether the data changed since it was loaded or last saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn data(&self) -> &SessionData {
        &self.data
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("token", &self.token.as_deref().map(redact))
            .field("keys", &self.data.len())
            .field("dirty", &self.dirty)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Shorten a token for logs.
fn redact(token: &str) -> String {
    match token.get(..8) {
        Some(head) if token.len() > 8 => format!("{}…", head),
        _ => "…".to_string(),
    }
}

fn redact_key(key: &str) -> String {
    match key.split_once(KEY_SEPARATOR) {
        Some((version, token)) => format!("{}{}{}", version, KEY_SEPARATOR, redact(token)),
        None => redact(key),
    }
}
