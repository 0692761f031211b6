//! Health and metrics handlers
//!
//! - `/health` - Simple health check for systemd/load balancers
//! - `/metrics` - Reconciliation counters in Prometheus text format

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::handlers::AppState;

/// Server version from Cargo.toml
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Health check response for liveness checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Health status (always "healthy" if responding)
    pub status: String,
    /// Server version
    pub version: String,
    /// Seconds since start
    pub uptime_seconds: u64,
}

/// Health check endpoint handler.
///
/// # Route
/// `GET /health`
///
/// ```bash
/// curl http://localhost:3001/health
/// # {"status":"healthy","version":"0.1.0","uptime_seconds":42}
/// ```
#[instrument(skip_all)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    debug!("Health check requested");
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: SERVER_VERSION.to_string(),
            uptime_seconds: state.metrics.uptime_seconds(),
        }),
    )
}

/// Prometheus scrape endpoint.
///
/// # Route
/// `GET /metrics`
#[instrument(skip_all)]
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus_format(),
    )
}
