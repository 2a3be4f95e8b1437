use crate::auth::AuthError;
use crate::util::UrlValidationError;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced by the sync core to its callers.
///
/// Token acquisition problems are retried once by the dispatcher before they
/// reach this type; everything else is reported as-is.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// Credentials were rejected, including after the single re-authentication retry
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// Transport-level failure (DNS, TLS, connection reset, timeout)
    #[error("Network error: {0}")]
    NetworkFailure(String),

    /// The service rejected a subscribe, unsubscribe or label change
    #[error("Subscription change for {feed_url} failed: {source}")]
    Subscription {
        feed_url: String,
        #[source]
        source: Box<ReaderError>,
    },

    /// One or more feeds of a batch refresh failed; the others completed
    #[error("{failed} of {total} feeds failed to refresh")]
    PartialRefreshFailure { failed: usize, total: usize },

    /// Non-2xx response that is not an authentication rejection
    #[error("Server returned HTTP {0}")]
    HttpStatus(u16),

    /// Response body could not be understood
    #[error("Malformed response: {0}")]
    InvalidResponse(String),

    /// Request could not be constructed from the operation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid feed URL: {0}")]
    InvalidFeedUrl(#[from] UrlValidationError),

    /// A background task panicked
    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl ReaderError {
    /// Wraps an error with the feed it concerns.
    pub(crate) fn subscription(feed_url: &str, source: ReaderError) -> Self {
        ReaderError::Subscription {
            feed_url: feed_url.to_string(),
            source: Box::new(source),
        }
    }

    /// Returns true if the failure requires the user to sign in again.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            ReaderError::AuthFailure(_) => true,
            ReaderError::Subscription { source, .. } => source.is_auth_failure(),
            _ => false,
        }
    }

    /// Short human-readable category used in activity log lines.
    pub fn category(&self) -> &'static str {
        match self {
            ReaderError::AuthFailure(_) => "Authentication failed",
            ReaderError::NetworkFailure(_) => "Network error",
            ReaderError::Subscription { source, .. } => source.category(),
            ReaderError::PartialRefreshFailure { .. } => "Some feeds failed",
            ReaderError::HttpStatus(_) => "Server error",
            ReaderError::InvalidResponse(_) => "Malformed response",
            ReaderError::InvalidRequest(_) | ReaderError::InvalidFeedUrl(_) => "Invalid request",
            ReaderError::TaskFailed(_) => "Internal error",
            ReaderError::Cancelled => "Cancelled",
        }
    }
}

impl From<AuthError> for ReaderError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Network(msg) => ReaderError::NetworkFailure(msg),
            AuthError::InvalidResponse(msg) => ReaderError::InvalidResponse(msg),
            AuthError::MissingCredentials | AuthError::Rejected(_) | AuthError::Superseded => {
                ReaderError::AuthFailure(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_map_to_taxonomy() {
        assert!(matches!(
            ReaderError::from(AuthError::Rejected("BadAuthentication".into())),
            ReaderError::AuthFailure(_)
        ));
        assert!(matches!(
            ReaderError::from(AuthError::Network("reset".into())),
            ReaderError::NetworkFailure(_)
        ));
        assert!(matches!(
            ReaderError::from(AuthError::MissingCredentials),
            ReaderError::AuthFailure(_)
        ));
    }

    #[test]
    fn test_subscription_error_keeps_feed_context() {
        let err = ReaderError::subscription(
            "https://example.com/feed.xml",
            ReaderError::HttpStatus(400),
        );
        let msg = err.to_string();
        assert!(msg.contains("https://example.com/feed.xml"));
        assert!(msg.contains("HTTP 400"));
        assert_eq!(err.category(), "Server error");
    }

    #[test]
    fn test_nested_auth_failure_detected() {
        let err = ReaderError::subscription(
            "https://example.com/feed.xml",
            ReaderError::AuthFailure("rejected".into()),
        );
        assert!(err.is_auth_failure());
        assert!(!ReaderError::Cancelled.is_auth_failure());
    }
}
