//! Integration tests for the session lifecycle

use async_trait::async_trait;
use cachet_session::reply::{normalize_remove, normalize_write};
use cachet_session::*;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Cache that answers in the single-channel style (payload or `false`) and
/// counts every request.
#[derive(Default)]
struct ScriptedCache {
    entries: Mutex<HashMap<String, serde_json::Value>>,
    gets: AtomicUsize,
    sets: AtomicUsize,
    removes: AtomicUsize,
    reject_writes: AtomicBool,
    reject_removes: AtomicBool,
    last_ttl: Mutex<Option<Duration>>,
}

impl ScriptedCache {
    fn with_entry(key: &str, value: serde_json::Value) -> Self {
        let cache = Self::default();
        cache.entries.lock().unwrap().insert(key.to_string(), value);
        cache
    }

    fn ops(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
            + self.sets.load(Ordering::SeqCst)
            + self.removes.load(Ordering::SeqCst)
    }

    fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    fn stored(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.lock().unwrap().get(key).cloned()
    }
}

/// Key rules of a memcached-style backend: 1..=250 bytes, no whitespace.
fn check_key(key: &str) -> SessionResult<()> {
    if key.is_empty() || key.len() > 250 || key.chars().any(char::is_whitespace) {
        return Err(SessionError::InvalidKey(key.len().to_string()));
    }
    Ok(())
}

#[async_trait]
impl CacheAdapter for ScriptedCache {
    async fn get(&self, key: &str) -> SessionResult<Option<SessionData>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        check_key(key)?;
        let reply = match self.stored(key) {
            Some(serde_json::Value::Bool(false)) | None => CacheReply::False,
            Some(value) => CacheReply::from(
                serde_json::from_value::<SessionData>(value)
                    .map_err(|e| SessionError::Deserialization(e.to_string())),
            ),
        };
        normalize(reply, false, || SessionError::RequestFailed(key.to_string()))
    }

    async fn set(&self, key: &str, data: &SessionData, ttl: Duration) -> SessionResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        *self.last_ttl.lock().unwrap() = Some(ttl);
        let accepted = !self.reject_writes.load(Ordering::SeqCst);
        if accepted {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), json!(data));
        }
        normalize_write(CacheReply::from_ack(Ok::<_, SessionError>(accepted)))
    }

    async fn remove(&self, key: &str) -> SessionResult<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        let removed = !self.reject_removes.load(Ordering::SeqCst)
            && self.entries.lock().unwrap().remove(key).is_some();
        normalize_remove(CacheReply::from_ack(Ok::<_, SessionError>(removed)), key)
    }
}

fn session(
    cache: &Arc<ScriptedCache>,
    config: SessionConfig,
) -> (SessionStore, Arc<CookieJar>) {
    let jar = Arc::new(CookieJar::new(config.cookie.clone()));
    let store = SessionStore::builder()
        .cache(cache.clone())
        .cookies(jar.clone())
        .config(config)
        .build()
        .unwrap();
    (store, jar)
}

fn cookies(pairs: &[(&str, &str)]) -> InboundCookies {
    pairs.iter().copied().collect()
}

#[tokio::test]
async fn test_start_without_cookie_or_create_fails_without_io() {
    let cache = Arc::new(ScriptedCache::default());
    let (mut store, jar) = session(&cache, SessionConfig::new().with_cookie_prefix("no-cookie"));

    let result = store.start(&InboundCookies::new(), false).await;

    assert!(matches!(result, Err(SessionError::NoSessionCookie)));
    assert_eq!(result.unwrap_err().to_string(), "No session cookie found");
    assert_eq!(cache.ops(), 0);
    assert!(jar.is_empty());
    assert!(!store.is_started());
}

#[tokio::test]
async fn test_start_with_unknown_cookie_and_no_create_fails() {
    let cache = Arc::new(ScriptedCache::default());
    let (mut store, _) = session(&cache, SessionConfig::new().with_cookie_prefix("no-create"));

    let result = store
        .start(&cookies(&[("no-create[session]", "abc")]), false)
        .await;

    assert!(matches!(result, Err(SessionError::NoSessionFound)));
    assert_eq!(cache.gets.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_cookie_counts_as_missing() {
    let cache = Arc::new(ScriptedCache::default());
    let (mut store, _) = session(&cache, SessionConfig::new());

    let result = store.start(&cookies(&[("session", "")]), false).await;

    assert!(matches!(result, Err(SessionError::NoSessionCookie)));
    assert_eq!(cache.ops(), 0);
}

#[tokio::test]
async fn test_start_loads_prefixed_session() {
    let cache = Arc::new(ScriptedCache::with_entry("2::abc", json!({"foo": "bar"})));
    let (mut store, jar) = session(&cache, SessionConfig::new().with_cookie_prefix("sess"));

    store
        .start(&cookies(&[("sess[session]", "abc")]), false)
        .await
        .unwrap();

    assert_eq!(store.get::<String>("foo").as_deref(), Some("bar"));
    assert_eq!(store.token(), Some("abc"));
    assert_eq!(store.versioned_key(), Some("2::abc"));
    assert!(!store.is_dirty());
    assert!(jar.is_empty());
}

#[tokio::test]
async fn test_stored_false_is_a_miss() {
    let cache = Arc::new(ScriptedCache::with_entry("2::abc", json!(false)));
    let (mut store, _) = session(&cache, SessionConfig::new());

    let result = store.start(&cookies(&[("session", "abc")]), false).await;
    assert!(matches!(result, Err(SessionError::NoSessionFound)));
}

#[tokio::test]
async fn test_start_miss_with_create_issues_new_token() {
    let cache = Arc::new(ScriptedCache::default());
    let (mut store, jar) = session(&cache, SessionConfig::new().with_cookie_prefix("create"));

    store
        .start(&cookies(&[("create[session]", "stale")]), true)
        .await
        .unwrap();

    let token = store.token().unwrap().to_string();
    assert_ne!(token, "stale");
    let directives = jar.directives();
    assert_eq!(directives.len(), 1);
    assert_eq!(directives[0].name(), "create[session]");
    assert_eq!(directives[0].value(), token);
    assert!(store.is_dirty());
    assert_eq!(cache.sets(), 0);
}

#[tokio::test]
async fn test_unaddressable_cookie_is_a_miss() {
    let long = "a".repeat(300);
    for token in ["abc def", long.as_str()] {
        let cache = Arc::new(ScriptedCache::default());
        let (mut store, jar) = session(&cache, SessionConfig::new());

        let result = store.start(&cookies(&[("session", token)]), false).await;

        assert!(matches!(result, Err(SessionError::NoSessionFound)));
        assert!(!store.is_started());
        assert!(jar.is_empty());
    }
}

#[tokio::test]
async fn test_unaddressable_cookie_with_create_issues_new_token() {
    let cache = Arc::new(ScriptedCache::default());
    let (mut store, jar) = session(&cache, SessionConfig::new());

    store
        .start(&cookies(&[("session", "abc def")]), true)
        .await
        .unwrap();

    let token = store.token().unwrap().to_string();
    assert_eq!(token.len(), 64);
    let directives = jar.directives();
    assert_eq!(directives.len(), 1);
    assert_eq!(directives[0].value(), token);
    assert!(store.is_dirty());
}

fn recorder(seen: &Arc<Mutex<Vec<bool>>>) -> impl FnOnce(&SessionResult<()>) + Send + 'static {
    let seen = seen.clone();
    move |result: &SessionResult<()>| seen.lock().unwrap().push(result.is_ok())
}

#[tokio::test]
async fn test_start_and_create_completions() {
    let cache = Arc::new(ScriptedCache::default());
    let (mut store, _) = session(&cache, SessionConfig::new());

    let seen = Arc::new(Mutex::new(Vec::new()));

    let result = store
        .start_with(&InboundCookies::new(), false, recorder(&seen))
        .await;
    assert!(matches!(result, Err(SessionError::NoSessionCookie)));

    store.create_with(recorder(&seen)).await.unwrap();
    assert!(matches!(
        store.create_with(recorder(&seen)).await,
        Err(SessionError::AlreadyStarted)
    ));

    assert_eq!(*seen.lock().unwrap(), vec![false, true, false]);
}

#[tokio::test]
async fn test_create_with_auto_save_persists_once() {
    let cache = Arc::new(ScriptedCache::default());
    let (mut store, jar) = session(&cache, SessionConfig::new().with_auto_save(true));

    store.start(&InboundCookies::new(), true).await.unwrap();

    let token = store.token().unwrap().to_string();
    let directives = jar.directives();
    assert_eq!(directives.len(), 1);
    assert_eq!(directives[0].name(), "session");
    // The cookie carries the bare token, never the versioned key.
    assert_eq!(directives[0].value(), token);
    assert!(!directives[0].value().contains("::"));

    assert_eq!(cache.sets(), 1);
    assert_eq!(cache.stored(&format!("2::{}", token)), Some(json!({})));
    assert!(!store.is_dirty());
}

#[tokio::test]
async fn test_create_without_auto_save_defers_write() {
    let cache = Arc::new(ScriptedCache::default());
    let (mut store, jar) = session(&cache, SessionConfig::new().with_cookie_prefix("no-cookie"));

    store.start(&InboundCookies::new(), true).await.unwrap();

    assert_eq!(jar.len(), 1);
    assert!(store.is_dirty());
    assert_eq!(cache.sets(), 0);
}

#[tokio::test]
async fn test_set_get_remove() {
    let cache = Arc::new(ScriptedCache::default());
    let (mut store, _) = session(&cache, SessionConfig::new());
    store.create().await.unwrap();

    store.set("foo", "bar").await.unwrap();
    assert_eq!(store.get::<String>("foo").as_deref(), Some("bar"));
    assert!(store.has("foo"));

    store.remove("foo").await.unwrap();
    assert!(!store.has("foo"));
    assert_eq!(store.get_or("foo", "def".to_string()), "def");
    assert_eq!(cache.sets(), 0);
}

#[tokio::test]
async fn test_dirty_tracking() {
    let cache = Arc::new(ScriptedCache::default());
    let (mut store, _) = session(&cache, SessionConfig::new());

    store.create().await.unwrap();
    assert!(store.is_dirty());

    store.save().await.unwrap();
    assert!(!store.is_dirty());

    store.set("a", 1).await.unwrap();
    assert!(store.is_dirty());
    store.save().await.unwrap();

    store.remove("a").await.unwrap();
    assert!(store.is_dirty());
}

#[tokio::test]
async fn test_failed_save_keeps_session_dirty() {
    let cache = Arc::new(ScriptedCache::default());
    let (mut store, _) = session(&cache, SessionConfig::new());
    store.create().await.unwrap();
    store.set("a", 1).await.unwrap();

    cache.reject_writes.store(true, Ordering::SeqCst);
    let result = store.save().await;

    assert!(matches!(result, Err(SessionError::PersistFailed)));
    assert!(store.is_dirty());
    assert_eq!(cache.sets(), 1);

    // Nothing retries on its own; a later save succeeds.
    cache.reject_writes.store(false, Ordering::SeqCst);
    store.save().await.unwrap();
    assert!(!store.is_dirty());
    assert_eq!(cache.sets(), 2);
}

#[tokio::test]
async fn test_save_completion_receives_persist_failure() {
    let cache = Arc::new(ScriptedCache::default());
    let (mut store, _) = session(&cache, SessionConfig::new());
    store.create().await.unwrap();
    cache.reject_writes.store(true, Ordering::SeqCst);

    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let result = store
        .save_with(move |result: &SessionResult<()>| {
            *sink.lock().unwrap() = result.as_ref().err().map(ToString::to_string);
        })
        .await;

    assert!(result.is_err());
    assert_eq!(
        seen.lock().unwrap().as_deref(),
        Some("Cache request failed while persisting session")
    );
    assert!(store.is_dirty());
}

#[tokio::test]
async fn test_end_writes_only_when_dirty() {
    let cache = Arc::new(ScriptedCache::with_entry("2::abc", json!({"n": 1})));
    let (mut store, _) = session(&cache, SessionConfig::new());
    store.start(&cookies(&[("session", "abc")]), false).await.unwrap();

    store.end().await.unwrap();
    assert_eq!(cache.sets(), 0);

    store.set("n", 2).await.unwrap();
    store.end_with(Completion::none()).await.unwrap();
    assert_eq!(cache.sets(), 1);
    assert_eq!(cache.stored("2::abc"), Some(json!({"n": 2})));

    store.end().await.unwrap();
    assert_eq!(cache.sets(), 1);
}

#[tokio::test]
async fn test_save_uses_configured_ttl() {
    let cache = Arc::new(ScriptedCache::default());
    let (mut store, _) = session(
        &cache,
        SessionConfig::new().with_session_ttl(Duration::from_secs(600)),
    );
    store.create().await.unwrap();
    store.save().await.unwrap();
    assert_eq!(*cache.last_ttl.lock().unwrap(), Some(Duration::from_secs(600)));
}

#[tokio::test]
async fn test_auto_save_persists_each_mutation() {
    let cache = Arc::new(ScriptedCache::default());
    let (mut store, _) = session(&cache, SessionConfig::new().with_auto_save(true));
    store.create().await.unwrap();

    store.set("a", 1).await.unwrap();
    store.remove("a").await.unwrap();

    assert_eq!(cache.sets(), 3);
    assert!(!store.is_dirty());
}

#[tokio::test]
async fn test_set_and_save_persists_without_auto_save() {
    let cache = Arc::new(ScriptedCache::default());
    let (mut store, _) = session(&cache, SessionConfig::new());
    store.create().await.unwrap();

    store.set_and_save("a", json!({"nested": [1, 2]})).await.unwrap();

    assert_eq!(cache.sets(), 1);
    assert!(!store.is_dirty());
}

#[tokio::test]
async fn test_destroy_clears_data_and_cookie() {
    let cache = Arc::new(ScriptedCache::with_entry("2::abc", json!({"foo": "bar"})));
    let (mut store, jar) = session(&cache, SessionConfig::new().with_cookie_prefix("sess"));
    store
        .start(&cookies(&[("sess[session]", "abc")]), false)
        .await
        .unwrap();

    store.destroy().await.unwrap();

    assert!(store.is_empty());
    assert_eq!(cache.stored("2::abc"), None);
    let directives = jar.directives();
    assert_eq!(directives.len(), 1);
    assert!(directives[0].is_removal());
    assert_eq!(directives[0].name(), "sess[session]");

    // Nothing left to persist at the end of the request.
    store.end().await.unwrap();
    assert_eq!(cache.sets(), 0);
}

#[tokio::test]
async fn test_destroy_surfaces_cache_failure_after_clearing() {
    let cache = Arc::new(ScriptedCache::with_entry("2::abc", json!({"foo": "bar"})));
    let (mut store, jar) = session(&cache, SessionConfig::new());
    store.start(&cookies(&[("session", "abc")]), false).await.unwrap();
    cache.reject_removes.store(true, Ordering::SeqCst);

    let errors = Arc::new(AtomicUsize::new(0));
    let counter = errors.clone();
    let result = store
        .destroy_with(move |result: &SessionResult<()>| {
            if result.is_err() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

    assert!(matches!(result, Err(SessionError::RequestFailed(_))));
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert!(store.is_empty());
    assert!(jar.directives()[0].is_removal());
}

#[tokio::test]
async fn test_version_bump_orphans_sessions() {
    let cache = Arc::new(ScriptedCache::default());
    let (mut store, jar) = session(&cache, SessionConfig::new());
    store.create().await.unwrap();
    store.set("user", "alice").await.unwrap();
    store.end().await.unwrap();
    let token = jar.directives()[0].value().to_string();

    let (mut same, _) = session(&cache, SessionConfig::new());
    same.start(&cookies(&[("session", token.as_str())]), false).await.unwrap();
    assert_eq!(same.get::<String>("user").as_deref(), Some("alice"));

    let (mut bumped, _) = session(&cache, SessionConfig::new().with_version(3));
    let result = bumped.start(&cookies(&[("session", token.as_str())]), false).await;
    assert!(matches!(result, Err(SessionError::NoSessionFound)));
}

#[tokio::test]
async fn test_tokens_are_unique() {
    let cache = Arc::new(ScriptedCache::default());
    let mut seen = std::collections::HashSet::new();
    for _ in 0..1_000 {
        let (mut store, _) = session(&cache, SessionConfig::new());
        store.create().await.unwrap();
        assert!(seen.insert(store.token().unwrap().to_string()));
    }
}

#[tokio::test]
async fn test_memory_cache_round_trip() {
    let cache = Arc::new(MemoryCache::new());
    let config = SessionConfig::new().with_create(true);
    let manager = SessionManager::new(cache.clone(), config).unwrap();

    let jar = Arc::new(manager.cookie_jar());
    let mut first = manager.open(&InboundCookies::new(), jar.clone()).await.unwrap();
    first.set("cart", vec!["apple", "pear"]).await.unwrap();
    manager.close(&mut first).await.unwrap();

    let token = jar.take()[0].value().to_string();
    let jar = Arc::new(manager.cookie_jar());
    let second = manager
        .open(&cookies(&[("session", token.as_str())]), jar)
        .await
        .unwrap();
    assert_eq!(
        second.get::<Vec<String>>("cart"),
        Some(vec!["apple".to_string(), "pear".to_string()])
    );
    assert_eq!(cache.len().await, 1);
}

// Note: These tests require Redis/Memcached running
// They are disabled by default but can be run with: cargo test -- --ignored

#[cfg(feature = "redis")]
#[tokio::test]
#[ignore]
async fn test_redis_session_round_trip() {
    let cache = Arc::new(
        RedisCache::new("redis://localhost:6379")
            .await
            .unwrap()
            .with_namespace("cachet-test"),
    );
    let jar = Arc::new(CookieJar::default());
    let mut store = SessionStore::new(cache.clone(), jar.clone(), SessionConfig::new()).unwrap();
    store.create().await.unwrap();
    store.set("k", "v").await.unwrap();
    store.end().await.unwrap();

    let token = jar.directives()[0].value().to_string();
    let mut again = SessionStore::new(cache, Arc::new(CookieJar::default()), SessionConfig::new())
        .unwrap();
    again.start(&cookies(&[("session", token.as_str())]), false).await.unwrap();
    assert_eq!(again.get::<String>("k").as_deref(), Some("v"));
    again.destroy().await.unwrap();
}

#[cfg(feature = "memcached")]
#[tokio::test]
#[ignore]
async fn test_memcached_session_round_trip() {
    let cache = Arc::new(MemcachedCache::new("localhost:11211").await.unwrap());
    let jar = Arc::new(CookieJar::default());
    let mut store = SessionStore::new(cache.clone(), jar, SessionConfig::new()).unwrap();
    store.create().await.unwrap();
    store.set("k", "v").await.unwrap();
    store.end().await.unwrap();
    store.destroy().await.unwrap();
    assert!(store.is_empty());
}
