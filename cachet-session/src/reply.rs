//! Normalization of single-channel cache replies.
//!
//! Many cache clients answer with one value that doubles as error, failure
//! flag and payload: an error, a bare `false` ("request failed" or "not
//! found"), or the data itself. [`CacheReply`] names those three cases and
//! [`normalize`] turns them into a plain `Result`, so the [`CacheAdapter`]
//! boundary only ever returns `SessionResult`.
//!
//! [`CacheAdapter`]: crate::CacheAdapter

use crate::error::{SessionError, SessionResult};

/// A raw reply from a cache client.
#[derive(Debug)]
pub enum CacheReply<T> {
    /// The request produced a value
    Value(T),
    /// The client answered with a bare `false`
    False,
    /// The client failed with an error
    Error(SessionError),
}

impl<T> CacheReply<T> {
    /// Map a lookup: `Some` is a value, `None` is `False`.
    pub fn from_lookup<E: Into<SessionError>>(result: Result<Option<T>, E>) -> Self {
        match result {
            Ok(Some(value)) => CacheReply::Value(value),
            Ok(None) => CacheReply::False,
            Err(e) => CacheReply::Error(e.into()),
        }
    }

    pub fn is_false(&self) -> bool {
        matches!(self, CacheReply::False)
    }
}

impl CacheReply<()> {
    /// Map an acknowledgement: `true` is success, `false` is `False`.
    pub fn from_ack<E: Into<SessionError>>(result: Result<bool, E>) -> Self {
        match result {
            Ok(true) => CacheReply::Value(()),
            Ok(false) => CacheReply::False,
            Err(e) => CacheReply::Error(e.into()),
        }
    }
}

impl<T, E: Into<SessionError>> From<Result<T, E>> for CacheReply<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => CacheReply::Value(value),
            Err(e) => CacheReply::Error(e.into()),
        }
    }
}

/// Turn a raw reply into a `Result`.
///
/// - `Error(e)` is returned as `Err(e)`.
/// - `False` is `Err(failure())` when `false_is_error`, otherwise `Ok(None)`.
/// - `Value(v)` is `Ok(Some(v))`, whatever `v` holds.
pub fn normalize<T>(
    reply: CacheReply<T>,
    false_is_error: bool,
    failure: impl FnOnce() -> SessionError,
) -> SessionResult<Option<T>> {
    match reply {
        CacheReply::Error(e) => Err(e),
        CacheReply::False if false_is_error => Err(failure()),
        CacheReply::False => Ok(None),
        CacheReply::Value(value) => Ok(Some(value)),
    }
}

/// Normalize the reply to a write; `False` becomes [`SessionError::PersistFailed`].
pub fn normalize_write(reply: CacheReply<()>) -> SessionResult<()> {
    normalize(reply, true, || SessionError::PersistFailed).map(|_| ())
}

/// Normalize the reply to a removal; `False` becomes
/// [`SessionError::RequestFailed`].
pub fn normalize_remove(reply: CacheReply<()>, key: &str) -> SessionResult<()> {
    normalize(reply, true, || {
        SessionError::RequestFailed(format!("remove {}", key))
    })
    .map(|_| ())
}

type Handler = Box<dyn FnOnce(&SessionResult<()>) + Send>;

/// Optional completion handler for an I/O operation.
///
/// An absent handler is a no-op, so callers never check for one.
#[derive(Default)]
pub struct Completion(Option<Handler>);

impl Completion {
    pub fn new(handler: impl FnOnce(&SessionResult<()>) + Send + 'static) -> Self {
        Self(Some(Box::new(handler)))
    }

    /// The no-op handler.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn is_noop(&self) -> bool {
        self.0.is_none()
    }

    /// Hand `result` to the handler and give it back to the caller.
    pub fn complete(self, result: SessionResult<()>) -> SessionResult<()> {
        if let Some(handler) = self.0 {
            handler(&result);
        }
        result
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Completion")
            .field(&if self.is_noop() { "noop" } else { "handler" })
            .finish()
    }
}

impl<F> From<F> for Completion
where
    F: FnOnce(&SessionResult<()>) + Send + 'static,
{
    fn from(handler: F) -> Self {
        Self::new(handler)
    }
}
