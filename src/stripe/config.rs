//! Stripe configuration
//!
//! Secrets are loaded from the environment only. Both structs redact them in
//! their `Debug` output.

use std::env;
use std::fmt;
use std::time::Duration;

use crate::stripe::error::{StripeError, StripeResult};

/// Default tolerance for the signed webhook timestamp
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// Default Stripe REST base URL
pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Webhook verification and processing settings
#[derive(Clone)]
pub struct StripeWebhookConfig {
    /// Signing secret (`whsec_...`)
    pub webhook_secret: String,
    /// Accepted age of the signed timestamp, in either direction
    pub tolerance: Duration,
    /// Reject events whose `livemode` is false
    pub require_livemode: bool,
    /// Backoff applied per event and per line item
    pub retry: RetryPolicy,
    /// Upper bound for handling one event
    pub processing_timeout: Duration,
    /// Capacity of the background processing queue
    pub queue_capacity: usize,
    /// How long delivery records are remembered
    pub idempotency_ttl: Duration,
    /// Maximum number of delivery records kept
    pub idempotency_max_entries: usize,
}

impl StripeWebhookConfig {
    /// Create a config with the given secret and default policy
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            tolerance: Duration::from_secs(DEFAULT_TOLERANCE_SECS),
            require_livemode: false,
            retry: RetryPolicy::default(),
            processing_timeout: Duration::from_secs(30),
            queue_capacity: 1000,
            idempotency_ttl: Duration::from_secs(72 * 3600),
            idempotency_max_entries: 100_000,
        }
    }

    /// Load from environment variables.
    ///
    /// Reads:
    /// - `STRIPE_WEBHOOK_SECRET` (required)
    /// - `STRIPE_WEBHOOK_TOLERANCE_SECS` (default 300)
    /// - `STRIPE_WEBHOOK_MAX_RETRIES` (default 3)
    /// - `STRIPE_WEBHOOK_RETRY_BASE_MS` (default 500)
    /// - `STRIPE_WEBHOOK_TIMEOUT_SECS` (default 30)
    /// - `STRIPE_REQUIRE_LIVEMODE` (default false)
    pub fn from_env() -> StripeResult<Self> {
        let secret = env::var("STRIPE_WEBHOOK_SECRET").map_err(|_| {
            StripeError::InternalError("STRIPE_WEBHOOK_SECRET environment variable not set".into())
        })?;
        if secret.is_empty() {
            return Err(StripeError::InternalError(
                "STRIPE_WEBHOOK_SECRET cannot be empty".into(),
            ));
        }

        let mut config = Self::new(secret);
        config.tolerance = Duration::from_secs(env_number(
            "STRIPE_WEBHOOK_TOLERANCE_SECS",
            DEFAULT_TOLERANCE_SECS,
        )?);
        config.retry.max_retries = env_number("STRIPE_WEBHOOK_MAX_RETRIES", 3)?;
        config.retry.base_delay =
            Duration::from_millis(env_number("STRIPE_WEBHOOK_RETRY_BASE_MS", 500)?);
        config.processing_timeout =
            Duration::from_secs(env_number("STRIPE_WEBHOOK_TIMEOUT_SECS", 30)?);
        config.require_livemode = env::var("STRIPE_REQUIRE_LIVEMODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(config)
    }

    /// Fast-retry config for tests
    pub fn test_config() -> Self {
        let mut config = Self::new("whsec_test_secret");
        config.retry = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        };
        config.processing_timeout = Duration::from_secs(5);
        config.queue_capacity = 16;
        config.idempotency_ttl = Duration::from_secs(3600);
        config.idempotency_max_entries = 1000;
        config
    }

    /// Backoff before retry number `attempt` (0-based)
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry.delay(attempt)
    }
}

/// Exponential backoff settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First backoff delay; doubled on every further attempt
    pub base_delay: Duration,
    /// Upper bound for a single backoff delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt` (0-based): `base * 2^attempt`, capped
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl fmt::Debug for StripeWebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeWebhookConfig")
            .field("webhook_secret", &"[redacted]")
            .field("tolerance", &self.tolerance)
            .field("require_livemode", &self.require_livemode)
            .field("retry", &self.retry)
            .field("processing_timeout", &self.processing_timeout)
            .finish_non_exhaustive()
    }
}

/// REST client settings
#[derive(Clone)]
pub struct StripeClientConfig {
    /// Secret API key (`sk_live_...` / `sk_test_...`)
    pub secret_key: String,
    /// Base URL, overridable for local stubs
    pub api_base: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl StripeClientConfig {
    /// Create a config against the public API
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: Duration::from_secs(20),
        }
    }

    /// Load `STRIPE_SECRET_KEY` and optional `STRIPE_API_BASE`
    pub fn from_env() -> StripeResult<Self> {
        let key = env::var("STRIPE_SECRET_KEY").map_err(|_| {
            StripeError::InternalError("STRIPE_SECRET_KEY environment variable not set".into())
        })?;
        let mut config = Self::new(key);
        if let Ok(base) = env::var("STRIPE_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        Ok(config)
    }

    /// Point the client at a different base URL
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }
}

impl fmt::Debug for StripeClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeClientConfig")
            .field("secret_key", &"[redacted]")
            .field("api_base", &self.api_base)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn env_number<T>(name: &str, default: T) -> StripeResult<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| StripeError::InternalError(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}
