//! CORS policy for the buyer-facing endpoints
//!
//! The storefront calls `/api/checkout` from the browser. Allowed origins are
//! the configured storefront origins plus, unless disabled, localhost on any
//! port for development. The webhook route is server-to-server and does not
//! need CORS, but sharing one layer is harmless.
//!
//! # Security Policy
//!
//! - **Allowed Origins**: configured list, plus `localhost`/`127.0.0.1`/`[::1]`
//! - **Allowed Methods**: GET, POST, OPTIONS (preflight)
//! - **Allowed Headers**: Content-Type, Authorization
//! - **Max Age**: 3600 seconds (1 hour) for preflight caching
//!
//! # Example
//!
//! ```rust
//! use shopfront_payments::cors::{cors_layer, CorsConfig};
//!
//! let config = CorsConfig::from_origin_list("https://shop.example.com");
//! let layer = cors_layer(config);
//! ```

use std::time::Duration;

use http::{header::HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use url::Url;

/// Standard allowed headers
pub const ALLOWED_HEADERS: [http::header::HeaderName; 2] =
    [http::header::CONTENT_TYPE, http::header::AUTHORIZATION];

/// Standard allowed methods
pub const ALLOWED_METHODS: [Method; 3] = [Method::GET, Method::POST, Method::OPTIONS];

/// Default max age for preflight cache (1 hour)
pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;

/// CORS configuration options.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Exact origins allowed, e.g. `https://shop.example.com`
    pub allowed_origins: Vec<String>,
    /// Whether to allow all localhost origins (default: true)
    pub allow_localhost: bool,
    /// Maximum age for preflight cache in seconds
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allow_localhost: true,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
        }
    }
}

impl CorsConfig {
    /// Parse a comma-separated origin list such as `SHOP_CORS_ORIGINS`.
    ///
    /// Entries are normalized to `scheme://host[:port]`; unparsable entries are
    /// dropped with a warning.
    pub fn from_origin_list(raw: &str) -> Self {
        let allowed_origins = raw
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| match normalize_origin(entry) {
                Some(origin) => Some(origin),
                None => {
                    tracing::warn!(origin = entry, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();

        Self {
            allowed_origins,
            ..Self::default()
        }
    }

    /// Disable localhost origin allowance.
    pub fn with_strict_origins(mut self) -> Self {
        self.allow_localhost = false;
        self
    }

    /// Whether `origin` passes this policy
    pub fn allows(&self, origin: &HeaderValue) -> bool {
        if self.allow_localhost && is_localhost_origin(origin) {
            return true;
        }
        origin
            .to_str()
            .ok()
            .and_then(normalize_origin)
            .map_or(false, |origin| self.allowed_origins.contains(&origin))
    }
}

/// Creates the CORS layer for `config`.
pub fn cors_layer(config: CorsConfig) -> CorsLayer {
    let max_age = Duration::from_secs(config.max_age_secs);
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| config.allows(origin)))
        .allow_methods(ALLOWED_METHODS)
        .allow_headers(ALLOWED_HEADERS)
        .max_age(max_age)
}

/// Checks if the given origin is a localhost origin.
///
/// ```rust
/// use http::header::HeaderValue;
/// use shopfront_payments::cors::is_localhost_origin;
///
/// assert!(is_localhost_origin(&HeaderValue::from_static("http://localhost:3000")));
/// assert!(!is_localhost_origin(&HeaderValue::from_static("http://localhost.evil.com")));
/// ```
pub fn is_localhost_origin(origin: &HeaderValue) -> bool {
    let Some(url) = origin.to_str().ok().and_then(|s| Url::parse(s).ok()) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    matches!(
        url.host_str(),
        Some("localhost") | Some("127.0.0.1") | Some("[::1]")
    )
}

fn normalize_origin(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    Some(url.origin().ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_localhost_origins() {
        for origin in [
            "http://localhost",
            "http://localhost:5173",
            "https://127.0.0.1:8443",
            "http://[::1]:3000",
        ] {
            assert!(
                is_localhost_origin(&HeaderValue::from_static(origin)),
                "{} should be allowed",
                origin
            );
        }
    }

    #[test]
    fn test_lookalike_origins_rejected() {
        for origin in [
            "http://localhost.evil.com",
            "http://localhostevil.com",
            "http://192.168.1.10",
            "file://localhost",
            "null",
        ] {
            assert!(!is_localhost_origin(&HeaderValue::from_static(origin)));
        }
    }

    #[test]
    fn test_configured_origins() {
        let config =
            CorsConfig::from_origin_list(" https://shop.example.com/ , not-a-url, http://admin.example.com:8080");
        assert_eq!(
            config.allowed_origins,
            vec![
                "https://shop.example.com".to_string(),
                "http://admin.example.com:8080".to_string()
            ]
        );

        assert!(config.allows(&HeaderValue::from_static("https://shop.example.com")));
        assert!(!config.allows(&HeaderValue::from_static("https://evil.example.com")));
        assert!(config.allows(&HeaderValue::from_static("http://localhost:3000")));

        let strict = config.with_strict_origins();
        assert!(!strict.allows(&HeaderValue::from_static("http://localhost:3000")));
    }

    #[test]
    fn test_empty_list_is_localhost_only() {
        let config = CorsConfig::from_origin_list("");
        assert!(config.allowed_origins.is_empty());
        assert!(config.allow_localhost);
    }
}
