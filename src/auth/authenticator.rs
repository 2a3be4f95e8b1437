use super::token_store::{TokenKind, TokenStore};
use crate::config::{Config, ConfigError};
use crate::transport::{HttpRequest, HttpResponse, Transport};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use url::Url;

/// `tokio::time::interval` panics on a zero period.
const MIN_REFRESH_PERIOD: Duration = Duration::from_millis(10);

/// Errors raised while acquiring tokens.
///
/// Cloneable because one result is shared by every caller waiting on the
/// same in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no credentials configured")]
    MissingCredentials,
    /// The service refused the credentials (bad password, revoked session)
    #[error("credentials rejected: {0}")]
    Rejected(String),
    /// Transport failure or service unavailable
    #[error("network error during authentication: {0}")]
    Network(String),
    #[error("invalid authentication response: {0}")]
    InvalidResponse(String),
    /// Authentication was cleared while the request was in flight
    #[error("authentication was reset while a token request was in flight")]
    Superseded,
}

/// Lifetimes and proactive refresh periods of both tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    pub session_ttl: Duration,
    pub session_refresh: Duration,
    pub action_ttl: Duration,
    pub action_refresh: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl TokenPolicy {
    pub fn from_config(config: &Config) -> Self {
        let minutes = |m: u64| Duration::from_secs(m.saturating_mul(60));
        Self {
            session_ttl: minutes(config.session_ttl_minutes),
            session_refresh: minutes(config.session_refresh_minutes),
            action_ttl: minutes(config.action_token_ttl_minutes),
            action_refresh: minutes(config.action_token_refresh_minutes),
        }
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Session => self.session_ttl,
            TokenKind::Action => self.action_ttl,
        }
    }

    fn refresh_period(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Session => self.session_refresh,
            TokenKind::Action => self.action_refresh,
        }
    }
}

/// Where and as whom to authenticate.
#[derive(Debug)]
pub struct AuthSettings {
    /// ClientLogin endpoint
    pub auth_url: Url,
    /// Action token endpoint (`<api>/token`)
    pub token_url: Url,
    pub account_type: String,
    pub client_name: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

impl AuthSettings {
    pub fn new(auth_url: Url, token_url: Url) -> Self {
        let defaults = Config::default();
        Self {
            auth_url,
            token_url,
            account_type: defaults.account_type,
            client_name: defaults.client_name,
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: SecretString) -> Self {
        self.username = Some(username.into());
        self.password = Some(password);
        self
    }

    /// Validates the configured endpoints and resolves the password.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let token_url = config
            .api_base()?
            .join("token")
            .map_err(|e| ConfigError::InvalidUrl {
                field: "api_base_url",
                source: e.into(),
            })?;

        Ok(Self {
            auth_url: config.auth_endpoint()?,
            token_url,
            account_type: config.account_type.clone(),
            client_name: config.client_name.clone(),
            username: config.username.clone(),
            password: config.resolved_password(),
        })
    }
}

type TokenFlight = Shared<BoxFuture<'static, Result<(), AuthError>>>;

/// An outstanding token request every caller can join.
struct Flight {
    id: u64,
    future: TokenFlight,
}

/// Proactive refresh tasks; aborted when dropped.
struct RefreshTimers {
    session: JoinHandle<()>,
    action: JoinHandle<()>,
}

impl Drop for RefreshTimers {
    fn drop(&mut self) {
        self.session.abort();
        self.action.abort();
    }
}

struct Inner {
    settings: AuthSettings,
    policy: TokenPolicy,
    transport: Arc<dyn Transport>,
    store: TokenStore,
    /// Bumped on every clear; results fetched under an older epoch are dropped
    epoch: AtomicU64,
    next_flight: AtomicU64,
    session_flight: Mutex<Option<Flight>>,
    action_flight: Mutex<Option<Flight>>,
    timers: Mutex<Option<RefreshTimers>>,
}

/// Acquires, caches and proactively refreshes the session and action tokens.
///
/// Clone is cheap; all clones share one credential state. Concurrent callers
/// needing the same token are coalesced onto a single request.
#[derive(Clone)]
pub struct Authenticator {
    inner: Arc<Inner>,
}

impl Authenticator {
    pub fn new(settings: AuthSettings, policy: TokenPolicy, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                policy,
                transport,
                store: TokenStore::new(),
                epoch: AtomicU64::new(0),
                next_flight: AtomicU64::new(0),
                session_flight: Mutex::new(None),
                action_flight: Mutex::new(None),
                timers: Mutex::new(None),
            }),
        }
    }

    /// Session token present and not known-invalid.
    pub fn is_ready(&self) -> bool {
        self.inner.store.is_ready()
    }

    /// Read-only view of the credential state.
    pub fn tokens(&self) -> &TokenStore {
        &self.inner.store
    }

    /// Makes sure a usable session token exists, logging in if needed.
    pub async fn ensure_authenticated(&self) -> Result<(), AuthError> {
        if self.inner.store.is_ready() {
            return Ok(());
        }
        self.await_flight(TokenKind::Session, false).await
    }

    /// Makes sure an unexpired action token exists. The session token is
    /// ensured first since the action token is issued against it.
    pub async fn ensure_action_token(&self) -> Result<(), AuthError> {
        self.ensure_authenticated().await?;
        if self.inner.store.is_valid(TokenKind::Action) {
            return Ok(());
        }
        self.await_flight(TokenKind::Action, false).await
    }

    /// Fetches a fresh action token regardless of the cached one.
    pub async fn get_token(&self) -> Result<(), AuthError> {
        self.ensure_authenticated().await?;
        self.await_flight(TokenKind::Action, true).await
    }

    /// Discards both tokens and stops the refresh timers. The next call
    /// needing a token logs in again.
    pub fn clear_authentication(&self) {
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        self.discard_credentials();
        tracing::info!("Authentication cleared");
    }

    /// Clears authentication and immediately reacquires both tokens.
    pub async fn reset_authentication(&self) -> Result<(), AuthError> {
        self.clear_authentication();
        self.ensure_action_token().await
    }

    /// Stops the proactive refresh timers without touching the tokens.
    pub fn stop_timers(&self) {
        self.inner
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn timers_running(&self) -> bool {
        self.inner
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Current clear-generation, recorded by callers before using a token.
    pub(crate) fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::Acquire)
    }

    /// Re-authenticates after the service rejected tokens that were current
    /// at `seen_epoch`. If another caller already reset since then, its new
    /// tokens are joined instead of resetting again.
    pub(crate) async fn renew_after_rejection(
        &self,
        seen_epoch: u64,
        needs_action_token: bool,
    ) -> Result<(), AuthError> {
        let claimed = self
            .inner
            .epoch
            .compare_exchange(
                seen_epoch,
                seen_epoch.wrapping_add(1),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if claimed {
            tracing::info!("Credentials rejected by service, re-authenticating");
            self.discard_credentials();
        }

        self.ensure_authenticated().await?;
        if needs_action_token {
            self.ensure_action_token().await?;
        }
        Ok(())
    }

    pub(crate) fn authorization(&self) -> Option<HeaderValue> {
        self.inner.store.authorization()
    }

    pub(crate) fn action_token(&self) -> Option<String> {
        self.inner
            .store
            .with_token(TokenKind::Action, str::to_owned)
    }

    /// Forces a refresh of one token, as the timers do.
    pub async fn refresh_now(&self, kind: TokenKind) -> Result<(), AuthError> {
        match kind {
            TokenKind::Session => self.await_flight(TokenKind::Session, true).await,
            TokenKind::Action => self.get_token().await,
        }
    }

    fn discard_credentials(&self) {
        self.inner.store.clear();
        for kind in [TokenKind::Session, TokenKind::Action] {
            self.inner
                .flight_slot(kind)
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
        }
        self.stop_timers();
    }

    async fn await_flight(&self, kind: TokenKind, force: bool) -> Result<(), AuthError> {
        match self.inner.join_flight(kind, force).await {
            Err(AuthError::Superseded) => {
                tracing::debug!(token = kind.as_str(), "Token request superseded, joining the new one");
                self.inner.join_flight(kind, false).await
            }
            result => result,
        }
    }
}

impl Inner {
    fn flight_slot(&self, kind: TokenKind) -> &Mutex<Option<Flight>> {
        match kind {
            TokenKind::Session => &self.session_flight,
            TokenKind::Action => &self.action_flight,
        }
    }

    fn has_usable(&self, kind: TokenKind) -> bool {
        match kind {
            TokenKind::Session => self.store.is_ready(),
            TokenKind::Action => self.store.is_valid(kind),
        }
    }

    /// Returns the outstanding request for `kind`, starting one if needed.
    ///
    /// The usability re-check happens under the slot lock, so a caller
    /// arriving just after a flight finished sees its token instead of
    /// starting a second request.
    fn join_flight(self: &Arc<Self>, kind: TokenKind, force: bool) -> TokenFlight {
        let mut slot = self
            .flight_slot(kind)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(flight) = slot.as_ref() {
            tracing::trace!(token = kind.as_str(), "Joining in-flight token request");
            return flight.future.clone();
        }
        if !force && self.has_usable(kind) {
            return futures::future::ready(Ok(())).boxed().shared();
        }

        let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(self);
        let future = async move {
            let result = inner.fetch(kind).await;
            let mut slot = inner
                .flight_slot(kind)
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.as_ref().is_some_and(|flight| flight.id == id) {
                slot.take();
            }
            result
        }
        .boxed()
        .shared();

        *slot = Some(Flight {
            id,
            future: future.clone(),
        });
        future
    }

    async fn fetch(self: &Arc<Self>, kind: TokenKind) -> Result<(), AuthError> {
        let epoch = self.epoch.load(Ordering::Acquire);
        let result = match kind {
            TokenKind::Session => self.request_session_token().await,
            TokenKind::Action => self.request_action_token().await,
        };

        if self.epoch.load(Ordering::Acquire) != epoch {
            tracing::debug!(
                token = kind.as_str(),
                "Discarding token request result after authentication was cleared"
            );
            return Err(AuthError::Superseded);
        }

        match result {
            Ok(token) => {
                self.store.set(kind, token, self.policy.ttl(kind));
                tracing::info!(token = kind.as_str(), "Token acquired");
                if kind == TokenKind::Session {
                    // Action tokens are issued against a session; the old one
                    // stays usable until its replacement arrives
                    self.store.supersede(TokenKind::Action);
                    self.start_timers();
                }
                Ok(())
            }
            Err(AuthError::Rejected(reason)) => {
                tracing::warn!(
                    token = kind.as_str(),
                    reason = %reason,
                    "Credentials rejected, clearing authentication"
                );
                self.store.clear();
                Err(AuthError::Rejected(reason))
            }
            Err(err) => {
                tracing::warn!(token = kind.as_str(), error = %err, "Token request failed");
                self.store.mark_not_ready();
                Err(err)
            }
        }
    }

    async fn request_session_token(&self) -> Result<String, AuthError> {
        let (Some(username), Some(password)) = (
            self.settings.username.as_deref(),
            self.settings.password.as_ref(),
        ) else {
            return Err(AuthError::MissingCredentials);
        };

        let request = HttpRequest::post(self.settings.auth_url.clone()).with_form([
            ("Email", username),
            ("Passwd", password.expose_secret()),
            ("service", "reader"),
            ("accountType", self.settings.account_type.as_str()),
            ("source", self.settings.client_name.as_str()),
        ]);

        tracing::debug!(user = %username, "Requesting session token");
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.is_success() {
            return Err(classify_failure(&response, "login"));
        }
        parse_client_login(&response.text())
    }

    async fn request_action_token(&self) -> Result<String, AuthError> {
        let Some(authorization) = self.store.authorization() else {
            return Err(AuthError::Superseded);
        };

        let mut request = HttpRequest::get(self.settings.token_url.clone());
        request.headers.insert(AUTHORIZATION, authorization);

        tracing::debug!("Requesting action token");
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.is_success() {
            return Err(classify_failure(&response, "token request"));
        }

        let token = response.text().trim().to_string();
        if token.is_empty() {
            return Err(AuthError::InvalidResponse("empty action token".into()));
        }
        Ok(token)
    }

    fn start_timers(self: &Arc<Self>) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        if timers.is_some() {
            return;
        }
        tracing::debug!(
            session_secs = self.policy.session_refresh.as_secs(),
            action_secs = self.policy.action_refresh.as_secs(),
            "Starting token refresh timers"
        );
        *timers = Some(RefreshTimers {
            session: spawn_refresh_timer(
                Arc::downgrade(self),
                TokenKind::Session,
                self.policy.refresh_period(TokenKind::Session),
            ),
            action: spawn_refresh_timer(
                Arc::downgrade(self),
                TokenKind::Action,
                self.policy.refresh_period(TokenKind::Action),
            ),
        });
    }
}

/// Periodically refreshes one token while the client is ready.
///
/// Holds only a weak reference so the timer never keeps the authenticator alive.
fn spawn_refresh_timer(inner: Weak<Inner>, kind: TokenKind, period: Duration) -> JoinHandle<()> {
    let period = period.max(MIN_REFRESH_PERIOD);
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            // Lazily reacquired on next use instead
            if !inner.store.is_ready() {
                continue;
            }
            let authenticator = Authenticator { inner };
            tracing::debug!(token = kind.as_str(), "Proactive token refresh");
            if let Err(err) = authenticator.refresh_now(kind).await {
                tracing::warn!(token = kind.as_str(), error = %err, "Proactive token refresh failed");
            }
        }
    })
}

/// Maps a non-2xx auth response to an error.
fn classify_failure(response: &HttpResponse, what: &str) -> AuthError {
    let status = response.status.as_u16();
    match status {
        401 | 403 => {
            let reason = login_error(&response.text())
                .unwrap_or_else(|| format!("{} returned HTTP {}", what, status));
            AuthError::Rejected(reason)
        }
        500..=599 => AuthError::Network(format!("{} returned HTTP {}", what, status)),
        _ => AuthError::InvalidResponse(format!("{} returned HTTP {}", what, status)),
    }
}

fn login_error(body: &str) -> Option<String> {
    body.lines()
        .filter_map(|line| line.trim().split_once('='))
        .find(|(key, _)| *key == "Error")
        .map(|(_, value)| value.to_string())
}

/// Extracts the `Auth=` token from a ClientLogin response body
/// (`SID=...\nLSID=...\nAuth=...`).
pub(crate) fn parse_client_login(body: &str) -> Result<String, AuthError> {
    let token = body
        .lines()
        .filter_map(|line| line.trim().split_once('='))
        .find(|(key, value)| *key == "Auth" && !value.is_empty())
        .map(|(_, value)| value.to_string());

    match token {
        Some(token) => Ok(token),
        None => match login_error(body) {
            Some(reason) => Err(AuthError::Rejected(reason)),
            None => Err(AuthError::InvalidResponse(
                "login response has no Auth token".into(),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::HttpTransport;
    use proptest::prelude::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LOGIN_PATH: &str = "/accounts/ClientLogin";
    const TOKEN_PATH: &str = "/reader/api/0/token";

    fn settings(server: &MockServer) -> AuthSettings {
        AuthSettings::new(
            Url::parse(&format!("{}{}", server.uri(), LOGIN_PATH)).unwrap(),
            Url::parse(&format!("{}{}", server.uri(), TOKEN_PATH)).unwrap(),
        )
        .with_credentials("reader@example.com", SecretString::from("hunter2".to_string()))
    }

    fn authenticator(server: &MockServer, policy: TokenPolicy) -> Authenticator {
        let transport = HttpTransport::new(reqwest::Client::new(), Duration::from_secs(5), 8);
        Authenticator::new(settings(server), policy, Arc::new(transport))
    }

    async fn token_requests(server: &MockServer) -> usize {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == TOKEN_PATH)
            .count()
    }

    #[test]
    fn test_parse_client_login() {
        assert_eq!(
            parse_client_login("SID=s\nLSID=l\nAuth=abc123\n").unwrap(),
            "abc123"
        );
        assert_eq!(
            parse_client_login("Error=BadAuthentication\n"),
            Err(AuthError::Rejected("BadAuthentication".into()))
        );
        assert!(matches!(
            parse_client_login("<html>maintenance</html>"),
            Err(AuthError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_client_login("Auth=\n"),
            Err(AuthError::InvalidResponse(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_parse_client_login_finds_token(token in "[A-Za-z0-9_=-]{1,64}", sid in "[A-Za-z0-9]{0,16}") {
            let body = format!("SID={}\r\nLSID={}\r\nAuth={}\r\n", sid, sid, token);
            prop_assert_eq!(parse_client_login(&body), Ok(token));
        }
    }

    #[tokio::test]
    async fn test_login_sends_client_login_form() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .and(body_string_contains("Email=reader%40example.com"))
            .and(body_string_contains("service=reader"))
            .respond_with(ResponseTemplate::new(200).set_body_string("SID=x\nAuth=session-1\n"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let auth = authenticator(&mock_server, TokenPolicy::default());
        auth.ensure_authenticated().await.unwrap();

        assert!(auth.is_ready());
        assert_eq!(
            auth.authorization().unwrap().to_str().unwrap(),
            "GoogleLogin auth=session-1"
        );
        assert!(auth.timers_running());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_login() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("Auth=session-1\n")
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let auth = authenticator(&mock_server, TokenPolicy::default());
        let callers: Vec<_> = (0..8)
            .map(|_| {
                let auth = auth.clone();
                tokio::spawn(async move { auth.ensure_authenticated().await })
            })
            .collect();

        for caller in futures::future::join_all(callers).await {
            assert!(caller.unwrap().is_ok());
        }
        assert!(auth.is_ready());
    }

    #[tokio::test]
    async fn test_concurrent_failures_share_one_login() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_string("Error=BadAuthentication\n")
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let auth = authenticator(&mock_server, TokenPolicy::default());
        let (a, b) = tokio::join!(auth.ensure_authenticated(), auth.ensure_authenticated());

        assert_eq!(a, Err(AuthError::Rejected("BadAuthentication".into())));
        assert_eq!(a, b);
        assert!(!auth.is_ready());
    }

    #[tokio::test]
    async fn test_missing_credentials_make_no_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(reqwest::Client::new(), Duration::from_secs(5), 8);
        let settings = AuthSettings::new(
            Url::parse(&format!("{}{}", mock_server.uri(), LOGIN_PATH)).unwrap(),
            Url::parse(&format!("{}{}", mock_server.uri(), TOKEN_PATH)).unwrap(),
        );
        let auth = Authenticator::new(settings, TokenPolicy::default(), Arc::new(transport));

        assert_eq!(
            auth.ensure_authenticated().await,
            Err(AuthError::MissingCredentials)
        );
    }

    #[tokio::test]
    async fn test_network_failure_keeps_prior_token_but_not_ready() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("Auth=session-1\n"))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let auth = authenticator(&mock_server, TokenPolicy::default());
        auth.ensure_authenticated().await.unwrap();

        let result = auth.refresh_now(TokenKind::Session).await;
        assert!(matches!(result, Err(AuthError::Network(_))));
        assert!(!auth.is_ready());
        assert!(auth.tokens().is_valid(TokenKind::Session));
    }

    #[tokio::test]
    async fn test_action_token_cached_within_ttl() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("Auth=session-1\n"))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .and(header("authorization", "GoogleLogin auth=session-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("action-1"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let auth = authenticator(&mock_server, TokenPolicy::default());
        auth.ensure_action_token().await.unwrap();
        auth.ensure_action_token().await.unwrap();

        assert_eq!(auth.action_token().as_deref(), Some("action-1"));
    }

    #[tokio::test]
    async fn test_action_token_refetched_after_ttl() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("Auth=session-1\n"))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("action"))
            .expect(2)
            .mount(&mock_server)
            .await;

        let policy = TokenPolicy {
            action_ttl: Duration::from_millis(100),
            ..TokenPolicy::default()
        };
        let auth = authenticator(&mock_server, policy);

        auth.ensure_action_token().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!auth.tokens().is_valid(TokenKind::Action));
        auth.ensure_action_token().await.unwrap();
        assert!(auth.tokens().is_valid(TokenKind::Action));
    }

    #[tokio::test]
    async fn test_rejected_action_token_clears_credentials() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("Auth=session-1\n"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let auth = authenticator(&mock_server, TokenPolicy::default());
        let result = auth.ensure_action_token().await;

        assert!(matches!(result, Err(AuthError::Rejected(_))));
        assert!(!auth.is_ready());
        assert!(!auth.tokens().is_valid(TokenKind::Session));
    }

    #[tokio::test]
    async fn test_timer_refreshes_action_token_until_cleared() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("Auth=session-1\n"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("action"))
            .mount(&mock_server)
            .await;

        let policy = TokenPolicy {
            action_refresh: Duration::from_millis(100),
            ..TokenPolicy::default()
        };
        let auth = authenticator(&mock_server, policy);
        auth.ensure_authenticated().await.unwrap();

        tokio::time::sleep(Duration::from_millis(350)).await;
        let refreshed = token_requests(&mock_server).await;
        assert!(refreshed >= 2, "expected proactive refreshes, saw {}", refreshed);

        auth.clear_authentication();
        assert!(!auth.timers_running());
        assert!(!auth.is_ready());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(token_requests(&mock_server).await, refreshed);
    }

    #[tokio::test]
    async fn test_timer_refreshes_session_and_replaces_action_token() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("Auth=session-1\n"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("action-1"))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("action-2"))
            .mount(&mock_server)
            .await;

        let policy = TokenPolicy {
            session_refresh: Duration::from_millis(100),
            ..TokenPolicy::default()
        };
        let auth = authenticator(&mock_server, policy);
        auth.ensure_action_token().await.unwrap();
        assert_eq!(auth.action_token().as_deref(), Some("action-1"));

        tokio::time::sleep(Duration::from_millis(250)).await;
        let logins = mock_server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == LOGIN_PATH)
            .count();
        assert!(logins >= 2, "expected a proactive login, saw {}", logins);

        // Still usable, but due for replacement
        assert!(!auth.tokens().is_valid(TokenKind::Action));
        assert_eq!(auth.action_token().as_deref(), Some("action-1"));

        auth.ensure_action_token().await.unwrap();
        assert_eq!(auth.action_token().as_deref(), Some("action-2"));
        assert!(auth.is_ready());
        auth.stop_timers();
    }

    #[tokio::test]
    async fn test_reset_reacquires_both_tokens() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("Auth=session-1\n"))
            .expect(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("action"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let auth = authenticator(&mock_server, TokenPolicy::default());
        auth.ensure_authenticated().await.unwrap();
        auth.reset_authentication().await.unwrap();

        assert!(auth.is_ready());
        assert!(auth.tokens().is_valid(TokenKind::Action));
    }

    #[tokio::test]
    async fn test_renew_after_rejection_is_claimed_once() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("Auth=session-1\n")
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(2)
            .mount(&mock_server)
            .await;

        let auth = authenticator(&mock_server, TokenPolicy::default());
        auth.ensure_authenticated().await.unwrap();
        let seen = auth.epoch();

        let (a, b) = tokio::join!(
            auth.renew_after_rejection(seen, false),
            auth.renew_after_rejection(seen, false)
        );
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(auth.epoch(), seen + 1);
    }
}
