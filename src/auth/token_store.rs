use reqwest::header::HeaderValue;
use secrecy::{ExposeSecret, SecretString};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

/// The two credentials the service hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Long-lived token authorizing every call
    Session,
    /// Short-lived token additionally required by mutating calls
    Action,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Session => "session",
            TokenKind::Action => "action",
        }
    }
}

struct StoredToken {
    value: SecretString,
    acquired_at: Instant,
    ttl: Duration,
    /// A replacement is wanted, but the value stays usable until it lands
    superseded: bool,
}

impl StoredToken {
    fn is_expired(&self) -> bool {
        self.acquired_at.elapsed() >= self.ttl
    }
}

/// Holds both credentials and the readiness flag. No I/O.
///
/// Written only by the authenticator; everything else reads.
pub struct TokenStore {
    session: RwLock<Option<StoredToken>>,
    action: RwLock<Option<StoredToken>>,
    ready: AtomicBool,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("session", &self.is_valid(TokenKind::Session))
            .field("action", &self.is_valid(TokenKind::Action))
            .field("ready", &self.ready.load(Ordering::Acquire))
            .finish()
    }
}

impl TokenStore {
    pub fn new() -> Self {
        Self {
            session: RwLock::new(None),
            action: RwLock::new(None),
            ready: AtomicBool::new(false),
        }
    }

    fn slot(&self, kind: TokenKind) -> &RwLock<Option<StoredToken>> {
        match kind {
            TokenKind::Session => &self.session,
            TokenKind::Action => &self.action,
        }
    }

    /// Stores a freshly acquired token. Storing a session token marks the
    /// client ready.
    pub(crate) fn set(&self, kind: TokenKind, value: String, ttl: Duration) {
        *self
            .slot(kind)
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(StoredToken {
            value: SecretString::from(value),
            acquired_at: Instant::now(),
            ttl,
            superseded: false,
        });
        if kind == TokenKind::Session {
            self.ready.store(true, Ordering::Release);
        }
    }

    /// Discards both tokens and marks the client not ready.
    pub(crate) fn clear(&self) {
        self.ready.store(false, Ordering::Release);
        for kind in [TokenKind::Session, TokenKind::Action] {
            self.slot(kind)
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
        }
    }

    /// Flags a token for replacement without discarding it. It no longer
    /// counts as valid, but readers can still use it until the next `set`.
    pub(crate) fn supersede(&self, kind: TokenKind) {
        if let Some(token) = self
            .slot(kind)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            token.superseded = true;
        }
    }

    /// Marks the client not ready while keeping the stored tokens.
    pub(crate) fn mark_not_ready(&self) {
        self.ready.store(false, Ordering::Release);
    }

    /// True if the token is present, younger than its TTL and not
    /// superseded.
    pub fn is_valid(&self, kind: TokenKind) -> bool {
        self.slot(kind)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|token| !token.is_expired() && !token.superseded)
    }

    /// Time since the token was acquired.
    pub fn age(&self, kind: TokenKind) -> Option<Duration> {
        self.slot(kind)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|token| token.acquired_at.elapsed())
    }

    /// Session token present, unexpired and not known-invalid.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire) && self.is_valid(TokenKind::Session)
    }

    /// Runs `f` with the raw token if it has not expired. A superseded token
    /// is still handed out.
    pub(crate) fn with_token<R>(&self, kind: TokenKind, f: impl FnOnce(&str) -> R) -> Option<R> {
        self.slot(kind)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|token| !token.is_expired())
            .map(|token| f(token.value.expose_secret()))
    }

    /// `Authorization` header value for the current session token.
    pub(crate) fn authorization(&self) -> Option<HeaderValue> {
        self.with_token(TokenKind::Session, |token| {
            HeaderValue::from_str(&format!("GoogleLogin auth={}", token))
        })
        .and_then(|value| match value {
            Ok(mut value) => {
                value.set_sensitive(true);
                Some(value)
            }
            Err(_) => {
                tracing::warn!("Session token contains characters not allowed in a header");
                None
            }
        })
    }
}
