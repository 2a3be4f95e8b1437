use super::{HttpRequest, HttpResponse, Transport, TransportError};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// reqwest-backed transport with a bounded number of in-flight requests.
///
/// Clone is cheap: the client and the limiter are shared.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
    limiter: Arc<Semaphore>,
    max_response_size: usize,
}

impl HttpTransport {
    /// Wraps an existing client.
    ///
    /// `max_concurrent` is clamped to at least one request.
    pub fn new(client: reqwest::Client, timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            client,
            timeout,
            limiter: Arc::new(Semaphore::new(max_concurrent.max(1))),
            max_response_size: MAX_RESPONSE_SIZE,
        }
    }

    /// Builds a client identifying itself as `client_name`.
    pub fn build(
        client_name: &str,
        timeout: Duration,
        max_concurrent: usize,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("{}/{}", client_name, env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::new(client, timeout, max_concurrent))
    }

    /// Overrides the response size limit.
    pub fn with_max_response_size(mut self, limit: usize) -> Self {
        self.max_response_size = limit;
        self
    }

    async fn exchange(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let body = request.encoded_form();
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = body {
            builder = builder
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = read_limited_bytes(response, self.max_response_size).await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| TransportError::InvalidRequest("transport is shut down".into()))?;

        tracing::trace!(method = %request.method, url = %request.url, "Submitting request");

        tokio::time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| TransportError::Timeout)?
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, TransportError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(TransportError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(TransportError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(timeout: Duration) -> HttpTransport {
        HttpTransport::new(reqwest::Client::new(), timeout, 4)
    }

    #[tokio::test]
    async fn test_posts_form_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/edit-tag"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("i=item-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/edit-tag", mock_server.uri())).unwrap();
        let request = HttpRequest::post(url).with_form([("i", "item-1")]);
        let response = transport(Duration::from_secs(5))
            .execute(request)
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.text(), "OK");
    }

    #[tokio::test]
    async fn test_timeout_reported_as_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/slow", mock_server.uri())).unwrap();
        let result = transport(Duration::from_millis(50))
            .execute(HttpRequest::get(url))
            .await;

        assert!(matches!(result, Err(TransportError::Timeout)));
    }

    #[tokio::test]
    async fn test_non_success_status_is_a_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/token", mock_server.uri())).unwrap();
        let response = transport(Duration::from_secs(5))
            .execute(HttpRequest::get(url))
            .await
            .unwrap();

        assert_eq!(response.status.as_u16(), 401);
    }

    #[tokio::test]
    async fn test_response_size_limit() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/big", mock_server.uri())).unwrap();
        let result = transport(Duration::from_secs(5))
            .with_max_response_size(1024)
            .execute(HttpRequest::get(url))
            .await;

        assert!(matches!(result, Err(TransportError::ResponseTooLarge)));
    }
}
