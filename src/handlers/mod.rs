//! HTTP surface
//!
//! ```text
//! POST /api/checkout                      -> CheckoutInitiator
//! GET  /api/checkout/status/:session_id   -> PaymentStatusQuery
//! POST /webhooks/stripe                   -> verify -> dedupe -> queue -> OrderReconciler
//! GET  /health, GET /metrics
//! ```

pub mod checkout;
pub mod status;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::checkout::{CheckoutInitiator, OrderReconciler, PaymentStatusQuery};
use crate::config::AppConfig;
use crate::cors::cors_layer;
use crate::metrics::Metrics;
use crate::store::Store;
use crate::stripe::{stripe_webhook_router, PaymentProvider, ProcessorHandle, StripeWebhookState};

pub use checkout::{create_checkout_handler, payment_status_handler, CheckoutRequest, CheckoutResponse};
pub use status::{health_handler, metrics_handler, HealthResponse};

/// State shared by the synchronous endpoints
#[derive(Clone)]
pub struct AppState {
    /// Checkout Session Initiator
    pub initiator: CheckoutInitiator,
    /// Payment Status Query
    pub status: PaymentStatusQuery,
    /// Shared counters
    pub metrics: Arc<Metrics>,
}

/// Routes for the synchronous endpoints
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/checkout", post(create_checkout_handler))
        .route("/api/checkout/status/:session_id", get(payment_status_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// A fully wired service
pub struct App {
    /// Every route, with tracing and CORS layers
    pub router: Router,
    /// Background event worker; spawn [`ProcessorHandle::run`]
    pub processor: ProcessorHandle,
    /// Counters shared by every component
    pub metrics: Arc<Metrics>,
}

/// Wire components over `store` and `provider`
pub fn build_app(
    config: &AppConfig,
    store: Arc<dyn Store>,
    provider: Arc<dyn PaymentProvider>,
) -> App {
    let metrics = Arc::new(Metrics::new());

    let state = AppState {
        initiator: CheckoutInitiator::new(
            provider.clone(),
            store.clone(),
            config.checkout.clone(),
            metrics.clone(),
        ),
        status: PaymentStatusQuery::new(provider.clone()),
        metrics: metrics.clone(),
    };

    let reconciler = Arc::new(OrderReconciler::new(
        store.clone(),
        provider,
        config.webhook.retry,
        metrics.clone(),
    ));
    let (webhook_state, processor) = StripeWebhookState::from_config(
        config.webhook.clone(),
        reconciler,
        store,
        metrics.clone(),
    );

    let router = api_router(state)
        .merge(stripe_webhook_router(webhook_state))
        .layer(cors_layer(config.cors.clone()))
        .layer(TraceLayer::new_for_http());

    App {
        router,
        processor,
        metrics,
    }
}
