//! Transport collaborator contract.
//!
//! The sync core hands fully constructed [`HttpRequest`]s to a [`Transport`]
//! and gets back status, headers and body. How the bytes travel (connection
//! pooling, concurrency limits, timeouts) is the transport's business:
//!
//! - [`HttpTransport`] - reqwest-backed implementation used in production
//!
//! Tests and embedding applications can supply their own implementation.

mod http;

pub use http::HttpTransport;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Form fields whose values must never be printed.
const SECRET_FIELDS: &[&str] = &["T", "Passwd"];

/// Errors raised while moving a request over the wire.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Exchange exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// The transport refused the request before sending it
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// A fully authenticated request ready for submission.
#[derive(Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// `application/x-www-form-urlencoded` body fields, in order
    pub form: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            form: Vec::new(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    /// Appends form fields to the request body.
    pub fn with_form<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.form
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Returns the first form value for `key`.
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Encodes the form body, or `None` when the request carries no form.
    pub fn encoded_form(&self) -> Option<String> {
        if self.form.is_empty() {
            return None;
        }
        Some(
            url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.form.iter())
                .finish(),
        )
    }
}

/// Tokens travel in the Authorization header and the `T` field, so Debug
/// prints only their presence.
impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let form: Vec<(&str, &str)> = self
            .form
            .iter()
            .map(|(k, v)| {
                if SECRET_FIELDS.contains(&k.as_str()) {
                    (k.as_str(), "[REDACTED]")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field(
                "authorization",
                &self.headers.get(AUTHORIZATION).map(|_| "[REDACTED]"),
            )
            .field("form", &form)
            .finish()
    }
}

/// Raw response handed back by the transport.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Case-insensitive header lookup returning the value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Submits requests and yields their responses.
///
/// Implementations own timeouts and the bound on simultaneous requests.
/// A timeout must be reported as an error, never as a response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn sample_url() -> Url {
        Url::parse("https://reader.example.com/reader/api/0/edit-tag").unwrap()
    }

    #[test]
    fn test_form_encoding_preserves_order_and_escapes() {
        let request = HttpRequest::post(sample_url()).with_form([
            ("s", "feed/https://example.com/feed?a=1&b=2"),
            ("a", "user/-/state/com.google/read"),
        ]);
        let body = request.encoded_form().unwrap();
        assert!(body.starts_with("s=feed%2Fhttps%3A%2F%2Fexample.com%2Ffeed%3Fa%3D1%26b%3D2"));
        assert!(body.ends_with("a=user%2F-%2Fstate%2Fcom.google%2Fread"));
    }

    #[test]
    fn test_empty_form_has_no_body() {
        assert!(HttpRequest::get(sample_url()).encoded_form().is_none());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let mut request = HttpRequest::post(sample_url())
            .with_form([("T", "action-secret"), ("i", "item-1")]);
        request.headers.insert(
            AUTHORIZATION,
            HeaderValue::from_static("GoogleLogin auth=session-secret"),
        );

        let debug_output = format!("{:?}", request);
        assert!(!debug_output.contains("action-secret"));
        assert!(!debug_output.contains("session-secret"));
        assert!(debug_output.contains("item-1"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_form_value_lookup() {
        let request = HttpRequest::post(sample_url()).with_form([("i", "1"), ("i", "2")]);
        assert_eq!(request.form_value("i"), Some("1"));
        assert_eq!(request.form_value("missing"), None);
    }
}
