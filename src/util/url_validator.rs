use std::net::IpAddr;
use thiserror::Error;
use url::{Host, Url};

/// Errors that can occur during URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
    /// A service URL would send credentials over plain HTTP.
    #[error("Insecure service URL: HTTPS required (except localhost for testing)")]
    InsecureScheme,
}

/// Validates a feed URL before it is sent to the service for subscription.
///
/// The aggregation service fetches the URL on our behalf, so the same rules
/// apply as for a direct fetch: only `http`/`https`, no localhost, no
/// private, link-local or unspecified addresses.
///
/// # Examples
///
/// ```
/// use reader_sync::util::validate_feed_url;
///
/// assert!(validate_feed_url("https://example.com/feed.xml").is_ok());
/// assert!(validate_feed_url("http://localhost/feed").is_err());
/// assert!(validate_feed_url("http://192.168.1.1/feed").is_err());
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    match url.host() {
        None => return Err(UrlValidationError::MissingHost),
        Some(Host::Domain(domain)) => {
            if domain.eq_ignore_ascii_case("localhost") {
                return Err(UrlValidationError::Localhost);
            }
        }
        Some(Host::Ipv4(ip)) => check_public_ip(IpAddr::V4(ip))?,
        Some(Host::Ipv6(ip)) => check_public_ip(IpAddr::V6(ip))?,
    }

    Ok(url)
}

/// Validates the base URL of the aggregation service or its login endpoint.
///
/// Credentials travel with every request, so HTTPS is required. Plain HTTP
/// is accepted only for `localhost` and loopback addresses (local testing).
pub fn validate_service_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "https" => {}
        "http" => {
            if !is_local_host(&url) {
                tracing::error!(url = %url, "Rejecting non-HTTPS service URL");
                return Err(UrlValidationError::InsecureScheme);
            }
            tracing::warn!(url = %url, "Using non-HTTPS service URL (localhost only)");
        }
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host().is_none() {
        return Err(UrlValidationError::MissingHost);
    }

    Ok(url)
}

fn is_local_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

fn check_public_ip(ip: IpAddr) -> Result<(), UrlValidationError> {
    if ip.is_loopback() {
        return Err(UrlValidationError::Localhost);
    }
    if is_private_ip(&ip) {
        return Err(UrlValidationError::PrivateIp(ip.to_string()));
    }
    Ok(())
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => ipv4.is_private() || ipv4.is_link_local() || ipv4.is_unspecified(),
        IpAddr::V6(ipv6) => {
            if ipv6.is_unspecified() {
                return true;
            }
            let segments = ipv6.segments();
            // Unique Local (fc00::/7)
            let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
            // Link-Local (fe80::/10)
            let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
            is_unique_local || is_link_local
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_feed_urls_accepted() {
        assert!(validate_feed_url("https://example.com/feed.xml").is_ok());
        assert!(validate_feed_url("http://news.example.org").is_ok());
        assert!(validate_feed_url("  https://example.com:443/rss  ").is_ok());
    }

    #[test]
    fn test_feed_url_schemes() {
        assert!(matches!(
            validate_feed_url("ftp://example.com/feed"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
        assert!(validate_feed_url("file:///etc/passwd").is_err());
        assert!(matches!(
            validate_feed_url("not a url"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_feed_url_internal_hosts_rejected() {
        assert!(matches!(
            validate_feed_url("http://LOCALHOST/feed"),
            Err(UrlValidationError::Localhost)
        ));
        assert!(matches!(
            validate_feed_url("http://127.0.0.1/feed"),
            Err(UrlValidationError::Localhost)
        ));
        assert!(matches!(
            validate_feed_url("http://[::1]/feed"),
            Err(UrlValidationError::Localhost)
        ));
        assert!(matches!(
            validate_feed_url("http://10.0.0.1:3000/feed"),
            Err(UrlValidationError::PrivateIp(_))
        ));
        assert!(validate_feed_url("http://169.254.1.1/feed").is_err());
        assert!(validate_feed_url("http://[fe80::1]/feed").is_err());
        assert!(validate_feed_url("http://[fd00::1]/feed").is_err());
        assert!(validate_feed_url("http://0.0.0.0/feed").is_err());
    }

    #[test]
    fn test_service_url_requires_https() {
        assert!(validate_service_url("https://theoldreader.com/reader/api/0/").is_ok());
        assert!(matches!(
            validate_service_url("http://theoldreader.com/reader/api/0/"),
            Err(UrlValidationError::InsecureScheme)
        ));
    }

    #[test]
    fn test_service_url_allows_local_http() {
        assert!(validate_service_url("http://127.0.0.1:8080/reader/api/0/").is_ok());
        assert!(validate_service_url("http://localhost:8080/accounts/ClientLogin").is_ok());
    }
}
