//! Session configuration.

use crate::cookie::{CookieOptions, cookie_name, validate_cookie_token};
use crate::error::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Separator between the version tag and the token in cache keys.
pub const KEY_SEPARATOR: &str = "::";

/// Base name of the session cookie before prefixing.
pub const DEFAULT_COOKIE_NAME: &str = "session";

/// Session configuration.
///
/// Can be built with the `with_*` methods, deserialized (durations are whole
/// seconds), or read from the environment with [`SessionConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Version tag baked into every cache key. Bumping it orphans every
    /// previously issued session.
    pub version: u32,
    /// Cookie namespace; the session cookie becomes `prefix[name]`
    pub cookie_prefix: String,
    /// Base cookie name
    pub cookie_name: String,
    /// TTL applied to the cache entry on every persist
    #[serde(with = "secs")]
    pub session_ttl: Duration,
    /// Persist on every mutation instead of at `save`/`end`
    pub auto_save: bool,
    /// Whether [`SessionManager::open`](crate::SessionManager::open) creates
    /// missing sessions
    pub create: bool,
    /// Attributes for the session cookie
    pub cookie: CookieOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            version: 2,
            cookie_prefix: String::new(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            session_ttl: Duration::from_secs(86400), // 1 day
            auto_save: false,
            create: false,
            cookie: CookieOptions::default(),
        }
    }
}

impl SessionConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from `<PREFIX>_*` environment variables.
    ///
    /// Recognized: `VERSION`, `COOKIE_PREFIX`, `COOKIE_NAME`, `TTL` (seconds),
    /// `AUTO_SAVE`, `CREATE`. Unset variables keep their defaults.
    ///
    /// ```
    /// use cachet_session::SessionConfig;
    ///
    /// let config = SessionConfig::from_env("CACHET_DOCTEST_UNSET").unwrap();
    /// assert_eq!(config, SessionConfig::default());
    /// ```
    pub fn from_env(prefix: &str) -> SessionResult<Self> {
        let var = |key: &str| env::var(format!("{}_{}", prefix, key)).ok();
        let mut config = Self::default();

        if let Some(raw) = var("VERSION") {
            config.version = parse_var("VERSION", &raw)?;
        }
        if let Some(raw) = var("COOKIE_PREFIX") {
            config.cookie_prefix = raw;
        }
        if let Some(raw) = var("COOKIE_NAME") {
            config.cookie_name = raw;
        }
        if let Some(raw) = var("TTL") {
            config.session_ttl = Duration::from_secs(parse_var("TTL", &raw)?);
        }
        if let Some(raw) = var("AUTO_SAVE") {
            config.auto_save = parse_bool("AUTO_SAVE", &raw)?;
        }
        if let Some(raw) = var("CREATE") {
            config.create = parse_bool("CREATE", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the version tag.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set the cookie prefix. An empty prefix leaves the name bare.
    pub fn with_cookie_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cookie_prefix = prefix.into();
        self
    }

    /// Set the base cookie name.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Set the session TTL.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Persist on every mutation.
    pub fn with_auto_save(mut self, auto_save: bool) -> Self {
        self.auto_save = auto_save;
        self
    }

    /// Create sessions for requests that do not carry one.
    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Set the session cookie attributes.
    pub fn with_cookie_options(mut self, options: CookieOptions) -> Self {
        self.cookie = options;
        self
    }

    /// Check the configuration for values that would produce unusable
    /// cookies or cache entries.
    pub fn validate(&self) -> SessionResult<()> {
        if self.cookie_name.is_empty() {
            return Err(SessionError::InvalidCookieName(
                "cookie name must not be empty".to_string(),
            ));
        }
        validate_cookie_token(&self.cookie_name)?;
        if !self.cookie_prefix.is_empty() {
            validate_cookie_token(&self.cookie_prefix)?;
        }
        if self.session_ttl.as_secs() == 0 {
            return Err(SessionError::Config(
                "session TTL must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    /// Full name of the session cookie, prefix applied.
    pub fn session_cookie_name(&self) -> String {
        cookie_name(&self.cookie_prefix, &self.cookie_name)
    }

    /// Cache key for a token: `version::token`.
    pub fn versioned_key(&self, token: &str) -> String {
        format!("{}{}{}", self.version, KEY_SEPARATOR, token)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> SessionResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| SessionError::Config(format!("invalid value for {}: {:?}", key, raw)))
}

fn parse_bool(key: &str, raw: &str) -> SessionResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(SessionError::Config(format!(
            "invalid value for {}: {:?}",
            key, raw
        ))),
    }
}

/// Serde helper: `Duration` as whole seconds.
pub(crate) mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
