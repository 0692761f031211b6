//! Error types for Shopfront Payments
//!
//! This module defines the crate-wide error taxonomy using `thiserror`.
//! Layer-specific errors (`StripeError`, `StoreError`) convert into [`Error`]
//! at the component boundary, and [`Error`] renders itself as a structured
//! JSON response for the synchronous HTTP endpoints.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;
use crate::stripe::StripeError;

/// The main error type for Shopfront Payments operations
#[derive(Error, Debug)]
pub enum Error {
    /// Buyer, product, or provider session does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Webhook signature or timestamp invalid
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Checkout metadata missing or unparsable at reconciliation time
    #[error("Malformed checkout intent: {0}")]
    MalformedIntent(String),

    /// Redelivery of an already-reconciled event or line item
    #[error("Duplicate delivery: {0}")]
    DuplicateDelivery(String),

    /// Persistence layer unavailable
    #[error("Transient store failure: {0}")]
    TransientStoreFailure(String),

    /// Buyer-supplied input rejected before any side effect
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Payment provider rejected the request
    #[error("Payment provider error: {0}")]
    Provider(String),

    /// Payment provider unreachable or overloaded
    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Operation exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Shopfront Payments operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a not-found error from a string
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a validation error from a string
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a malformed-intent error from a string
    pub fn malformed_intent<S: Into<String>>(msg: S) -> Self {
        Error::MalformedIntent(msg.into())
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TransientStoreFailure(_) | Error::ProviderUnavailable(_) | Error::Timeout(_)
        )
    }

    /// Stable machine-readable kind, used in response bodies and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::AuthenticationFailed(_) => "authentication_failed",
            Error::MalformedIntent(_) => "malformed_intent",
            Error::DuplicateDelivery(_) => "duplicate_delivery",
            Error::TransientStoreFailure(_) => "transient_store_failure",
            Error::Validation(_) => "validation",
            Error::Provider(_) => "provider",
            Error::ProviderUnavailable(_) => "provider_unavailable",
            Error::Timeout(_) => "timeout",
            Error::Config(_) => "config",
            Error::Json(_) => "json",
        }
    }

    /// HTTP status used when this error reaches a synchronous endpoint.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::AuthenticationFailed(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => Error::TransientStoreFailure(msg),
            StoreError::Conflict(msg) => Error::DuplicateDelivery(msg),
            StoreError::Missing(msg) => Error::NotFound(msg),
        }
    }
}

impl From<StripeError> for Error {
    fn from(err: StripeError) -> Self {
        match err {
            StripeError::MissingSignature
            | StripeError::InvalidSignatureHeader(_)
            | StripeError::SignatureMismatch
            | StripeError::TimestampOutOfTolerance { .. }
            | StripeError::LivemodeRequired => Error::AuthenticationFailed(err.to_string()),
            StripeError::NotFound(what) => Error::NotFound(what),
            StripeError::Network(_) => Error::ProviderUnavailable(err.to_string()),
            StripeError::Api { status, .. } if status == 429 || status >= 500 => {
                Error::ProviderUnavailable(err.to_string())
            }
            other => Error::Provider(other.to_string()),
        }
    }
}

/// JSON body returned by the synchronous endpoints on failure
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error kind
    pub error: &'static str,
    /// Human-readable message
    pub message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Internal detail stays in the logs
        let message = if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "Request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            error: self.kind(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("buyer b-404");
        assert_eq!(err.to_string(), "Not found: buyer b-404");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::validation("x").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            Error::AuthenticationFailed("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::malformed_intent("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_error_conversion() {
        let err: Error = StoreError::Unavailable("connection reset".into()).into();
        assert!(err.is_retryable());
        assert_eq!(err.kind(), "transient_store_failure");
    }

    #[test]
    fn test_signature_errors_become_authentication_failures() {
        let err: Error = StripeError::SignatureMismatch.into();
        assert!(matches!(err, Error::AuthenticationFailed(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_provider_outage_is_retryable() {
        let err: Error = StripeError::Api {
            status: 503,
            message: "overloaded".into(),
        }
        .into();
        assert!(err.is_retryable());

        let err: Error = StripeError::Api {
            status: 400,
            message: "bad param".into(),
        }
        .into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_provider_not_found_maps_to_not_found() {
        let err: Error = StripeError::NotFound("session cs_missing".into()).into();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
