//! Stripe integration errors

use thiserror::Error;

/// Errors raised by the webhook path and the Stripe REST client
#[derive(Error, Debug)]
pub enum StripeError {
    /// `Stripe-Signature` header absent
    #[error("Missing Stripe-Signature header")]
    MissingSignature,

    /// Header present but not of the form `t=...,v1=...`
    #[error("Invalid Stripe-Signature header: {0}")]
    InvalidSignatureHeader(String),

    /// No `v1` signature matches the recomputed HMAC
    #[error("Webhook signature mismatch")]
    SignatureMismatch,

    /// Signed timestamp outside the configured tolerance window
    #[error("Webhook timestamp outside tolerance: age {age_secs}s, tolerance {tolerance_secs}s")]
    TimestampOutOfTolerance {
        /// Age of the signed timestamp (negative if in the future)
        age_secs: i64,
        /// Configured tolerance
        tolerance_secs: i64,
    },

    /// Test-mode event received while live mode is required
    #[error("Test mode events not accepted")]
    LivemodeRequired,

    /// Body or event object does not match the expected shape
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Provider returned 404 for the requested object
    #[error("Not found: {0}")]
    NotFound(String),

    /// Provider returned a non-success status
    #[error("Stripe API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error body
        message: String,
    },

    /// Transport failure talking to the provider
    #[error("Network error: {0}")]
    Network(String),

    /// Internal plumbing failure (queue closed, etc.)
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result alias for the Stripe module
pub type StripeResult<T> = std::result::Result<T, StripeError>;

impl StripeError {
    /// Whether the failure is an authentication rejection (400 to the provider)
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            Self::MissingSignature
                | Self::InvalidSignatureHeader(_)
                | Self::SignatureMismatch
                | Self::TimestampOutOfTolerance { .. }
                | Self::LivemodeRequired
        )
    }
}

impl From<reqwest::Error> for StripeError {
    fn from(err: reqwest::Error) -> Self {
        StripeError::Network(err.to_string())
    }
}
