//! Cookie naming, inbound snapshots and outbound cookie directives.

use crate::error::{SessionError, SessionResult};
use crate::traits::CookieGateway;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// TTL attached to removal directives so clients expire the cookie at once.
pub const REMOVAL_TTL_SECS: i64 = -3600;

/// Cookie name with an optional namespace: `prefix[name]`, or the bare name
/// when the prefix is empty.
pub fn cookie_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}[{}]", prefix, name)
    }
}

/// Absolute expiry for a cookie written at `now` with the given TTL.
///
/// Negative TTLs produce an instant in the past. Out of range results clamp
/// to the representable bounds.
pub fn expiry_timestamp(now: DateTime<Utc>, ttl_seconds: i64) -> DateTime<Utc> {
    TimeDelta::try_seconds(ttl_seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(if ttl_seconds >= 0 {
            DateTime::<Utc>::MAX_UTC
        } else {
            DateTime::<Utc>::MIN_UTC
        })
}

/// Reject names that would break a `Cookie`/`Set-Cookie` header.
pub(crate) fn validate_cookie_token(name: &str) -> SessionResult<()> {
    const SEPARATORS: &str = "()<>@,;:\\\"/[]?={}";

    match name
        .chars()
        .find(|c| !c.is_ascii() || c.is_ascii_control() || *c == ' ' || SEPARATORS.contains(*c))
    {
        Some(bad) => Err(SessionError::InvalidCookieName(format!(
            "{:?} contains {:?}",
            name, bad
        ))),
        None => Ok(()),
    }
}

/// Attributes attached to the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieOptions {
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    /// Cookie lifetime, independent of the cache TTL
    #[serde(with = "crate::config::secs")]
    pub ttl: Duration,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            secure: true,
            http_only: true,
            ttl: Duration::from_secs(7 * 86400), // 7 days
        }
    }
}

impl CookieOptions {
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Cookies sent with one request, keyed by name.
///
/// Immutable once built; the session store only reads from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundCookies {
    values: HashMap<String, String>,
}

impl InboundCookies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the value of a `Cookie` request header.
    ///
    /// Pairs without `=` are skipped. When a name repeats, the first value
    /// wins. Surrounding double quotes are stripped from values.
    pub fn from_header(header: &str) -> Self {
        let mut values = HashMap::new();
        for pair in header.split(';') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            values
                .entry(name.to_string())
                .or_insert_with(|| value.to_string());
        }
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<HashMap<String, String>> for InboundCookies {
    fn from(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for InboundCookies {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// An outbound cookie command for the HTTP layer to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieDirective {
    Set {
        name: String,
        value: String,
        ttl: Duration,
        options: CookieOptions,
    },
    Remove {
        name: String,
        options: CookieOptions,
    },
}

impl CookieDirective {
    pub fn name(&self) -> &str {
        match self {
            CookieDirective::Set { name, .. } | CookieDirective::Remove { name, .. } => name,
        }
    }

    /// Value to send; removals send an empty value.
    pub fn value(&self) -> &str {
        match self {
            CookieDirective::Set { value, .. } => value,
            CookieDirective::Remove { .. } => "",
        }
    }

    pub fn options(&self) -> &CookieOptions {
        match self {
            CookieDirective::Set { options, .. } | CookieDirective::Remove { options, .. } => {
                options
            }
        }
    }

    /// Signed lifetime in seconds.
    pub fn ttl_seconds(&self) -> i64 {
        match self {
            CookieDirective::Set { ttl, .. } => i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
            CookieDirective::Remove { .. } => REMOVAL_TTL_SECS,
        }
    }

    /// Absolute expiry when the directive is applied at `now`.
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        expiry_timestamp(now, self.ttl_seconds())
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, CookieDirective::Remove { .. })
    }
}

/// [`CookieGateway`] that records directives for the response.
///
/// One jar per request. The HTTP layer drains it with [`CookieJar::take`]
/// after the handler ran.
#[derive(Debug, Default)]
pub struct CookieJar {
    options: CookieOptions,
    directives: Mutex<Vec<CookieDirective>>,
}

impl CookieJar {
    pub fn new(options: CookieOptions) -> Self {
        Self {
            options,
            directives: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CookieDirective>> {
        // Directives stay consistent even if a holder panicked mid-push.
        self.directives
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of the recorded directives, oldest first.
    pub fn directives(&self) -> Vec<CookieDirective> {
        self.lock().clone()
    }

    /// Drain the recorded directives.
    pub fn take(&self) -> Vec<CookieDirective> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl CookieGateway for CookieJar {
    fn set_cookie(&self, name: &str, value: &str, ttl: Duration) {
        self.lock().push(CookieDirective::Set {
            name: name.to_string(),
            value: value.to_string(),
            ttl,
            options: self.options.clone(),
        });
    }

    fn remove_cookie(&self, name: &str) {
        self.lock().push(CookieDirective::Remove {
            name: name.to_string(),
            options: self.options.clone(),
        });
    }
}
