//! Configuration file parser for ~/.config/reader-sync/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use crate::util::validate_service_url;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Environment variable that overrides the configured password.
pub const PASSWORD_ENV_VAR: &str = "READER_PASSWORD";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A service URL failed validation.
    #[error("Invalid {field}: {source}")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: crate::util::UrlValidationError,
    },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level client configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
///
/// Custom Debug impl masks `password` to prevent secret leakage in logs,
/// error messages, and debug output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the reader API; must end with `/`.
    pub api_base_url: String,

    /// ClientLogin endpoint issuing session tokens.
    pub auth_url: String,

    /// `accountType` sent with the login form.
    pub account_type: String,

    /// Client name sent as `source` on login and `client` on API calls.
    pub client_name: String,

    /// Account name (usually an email address).
    pub username: Option<String>,

    /// Account password (alternative to READER_PASSWORD env var).
    /// Env var takes precedence over config file.
    pub password: Option<String>,

    /// Maximum articles requested per feed refresh.
    pub article_limit: u32,

    /// Lifetime of a session token in minutes.
    pub session_ttl_minutes: u64,

    /// Interval between proactive session token refreshes in minutes.
    pub session_refresh_minutes: u64,

    /// Lifetime of an action token in minutes.
    pub action_token_ttl_minutes: u64,

    /// Interval between proactive action token refreshes in minutes.
    pub action_token_refresh_minutes: u64,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum simultaneous requests to the service.
    pub max_concurrent_requests: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "https://theoldreader.com/reader/api/0/".to_string(),
            auth_url: "https://theoldreader.com/accounts/ClientLogin".to_string(),
            account_type: "HOSTED_OR_GOOGLE".to_string(),
            client_name: "reader-sync".to_string(),
            username: None,
            password: None,
            article_limit: 100,
            session_ttl_minutes: 24 * 60,
            session_refresh_minutes: 22 * 60,
            action_token_ttl_minutes: 30,
            action_token_refresh_minutes: 25,
            request_timeout_secs: 30,
            max_concurrent_requests: 10,
        }
    }
}

/// Mask password in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_base_url", &self.api_base_url)
            .field("auth_url", &self.auth_url)
            .field("account_type", &self.account_type)
            .field("client_name", &self.client_name)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("article_limit", &self.article_limit)
            .field("session_ttl_minutes", &self.session_ttl_minutes)
            .field("session_refresh_minutes", &self.session_refresh_minutes)
            .field("action_token_ttl_minutes", &self.action_token_ttl_minutes)
            .field(
                "action_token_refresh_minutes",
                &self.action_token_refresh_minutes,
            )
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 13] = [
        "api_base_url",
        "auth_url",
        "account_type",
        "client_name",
        "username",
        "password",
        "article_limit",
        "session_ttl_minutes",
        "session_refresh_minutes",
        "action_token_ttl_minutes",
        "action_token_refresh_minutes",
        "request_timeout_secs",
        "max_concurrent_requests",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to prevent memory exhaustion
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(api = %config.api_base_url, "Loaded configuration");
        Ok(config)
    }

    /// Password from READER_PASSWORD, falling back to the config file.
    pub fn resolved_password(&self) -> Option<SecretString> {
        std::env::var(PASSWORD_ENV_VAR)
            .ok()
            .filter(|p| !p.is_empty())
            .or_else(|| self.password.clone())
            .map(SecretString::from)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Validated API base URL, with a trailing `/` so relative paths join
    /// below it rather than replacing its last segment.
    pub fn api_base(&self) -> Result<Url, ConfigError> {
        let mut url = validate_service_url(&self.api_base_url).map_err(|source| {
            ConfigError::InvalidUrl {
                field: "api_base_url",
                source,
            }
        })?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Validated ClientLogin endpoint.
    pub fn auth_endpoint(&self) -> Result<Url, ConfigError> {
        validate_service_url(&self.auth_url).map_err(|source| ConfigError::InvalidUrl {
            field: "auth_url",
            source,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
