//! Webhook HTTP endpoint
//!
//! The body is taken as raw `Bytes` and handed to the verifier untouched;
//! it is never decoded and re-encoded before the signature check.
//!
//! | Outcome                          | Status |
//! |----------------------------------|--------|
//! | verified, queued (or processed)  | 200    |
//! | verified, envelope unparsable    | 200    |
//! | verified, already seen           | 202    |
//! | missing/invalid signature        | 400    |

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;

use crate::metrics::Metrics;
use crate::store::Store;
use crate::stripe::config::StripeWebhookConfig;
use crate::stripe::error::StripeError;
use crate::stripe::idempotency::{DeliveryStatus, IdempotencyStore, InMemoryIdempotencyStore};
use crate::stripe::processor::{Acceptance, EventProcessor, PaymentEventHandler, ProcessorHandle};
use crate::stripe::signature::{SignatureVerifier, SIGNATURE_HEADER};

/// Path the provider posts to
pub const WEBHOOK_PATH: &str = "/webhooks/stripe";

/// Shared state for the webhook endpoint
#[derive(Clone)]
pub struct StripeWebhookState {
    verifier: Arc<SignatureVerifier>,
    idempotency_store: Arc<dyn IdempotencyStore>,
    processor: EventProcessor,
    metrics: Arc<Metrics>,
}

impl StripeWebhookState {
    /// Assemble state from existing parts
    pub fn new(
        verifier: SignatureVerifier,
        idempotency_store: Arc<dyn IdempotencyStore>,
        processor: EventProcessor,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            verifier: Arc::new(verifier),
            idempotency_store,
            processor,
            metrics,
        }
    }

    /// Build the full webhook pipeline for `handler` with an in-memory idempotency store.
    ///
    /// Accepted deliveries are recorded in `intake_store` before the ack.
    /// The returned [`ProcessorHandle`] must be spawned for queued events to run.
    pub fn from_config(
        config: StripeWebhookConfig,
        handler: Arc<dyn PaymentEventHandler>,
        intake_store: Arc<dyn Store>,
        metrics: Arc<Metrics>,
    ) -> (Self, ProcessorHandle) {
        let idempotency_store: Arc<dyn IdempotencyStore> = Arc::new(InMemoryIdempotencyStore::new(
            config.idempotency_ttl,
            config.idempotency_max_entries,
        ));
        let verifier = SignatureVerifier::from_config(&config);
        let (processor, handle) = EventProcessor::new(
            handler,
            idempotency_store.clone(),
            intake_store,
            config,
            metrics.clone(),
        );

        (
            Self::new(verifier, idempotency_store, processor, metrics),
            handle,
        )
    }
}

/// Acknowledgment body
#[derive(Debug, Serialize)]
struct WebhookAck {
    received: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    duplicate: bool,
}

/// Rejection body; carries no internal detail
#[derive(Debug, Serialize)]
struct WebhookRejection {
    error: &'static str,
}

/// Handle one provider delivery
pub async fn stripe_webhook_handler(
    State(state): State<StripeWebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.metrics.record_webhook_received();

    let event = match headers
        .get(SIGNATURE_HEADER)
        .ok_or(StripeError::MissingSignature)
        .and_then(|value| {
            value
                .to_str()
                .map_err(|_| StripeError::InvalidSignatureHeader("not ASCII".into()))
        })
        .and_then(|header| state.verifier.verify_and_parse(&body, header))
    {
        Ok(event) => event,
        Err(e) if e.is_authentication() => {
            state.metrics.record_webhook_rejected();
            tracing::warn!(error = %e, body_len = body.len(), "Rejected webhook delivery");
            return reject();
        }
        Err(e) => {
            // Authentic but unusable; a redelivery would fail the same way
            state.metrics.record_event_failed("invalid_payload");
            tracing::error!(error = %e, body_len = body.len(), "Verified webhook has an unparsable envelope");
            return acknowledge(StatusCode::OK, false);
        }
    };

    let event_id = event.id.clone();
    let event_type = event.event_type.clone();

    let status = match state.idempotency_store.check_and_record(&event_id).await {
        Ok(status) => status,
        Err(e) => {
            // Line-item keys still prevent double effects
            tracing::warn!(event_id = %event_id, error = %e, "Idempotency check failed, processing anyway");
            DeliveryStatus::New
        }
    };

    if !status.should_process() {
        state.metrics.record_webhook_duplicate();
        tracing::info!(event_id = %event_id, event_type = %event_type, ?status, "Duplicate delivery acknowledged");
        return acknowledge(StatusCode::ACCEPTED, true);
    }

    match state.processor.accept(event, &body).await {
        Acceptance::Queued => {
            tracing::info!(event_id = %event_id, event_type = %event_type, ?status, "Webhook accepted");
        }
        Acceptance::ProcessedInline(outcome) => {
            tracing::info!(event_id = %event_id, event_type = %event_type, ?outcome, "Webhook processed inline");
        }
    }

    acknowledge(StatusCode::OK, false)
}

fn acknowledge(status: StatusCode, duplicate: bool) -> Response {
    (
        status,
        Json(WebhookAck {
            received: true,
            duplicate,
        }),
    )
        .into_response()
}

fn reject() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(WebhookRejection {
            error: "invalid_signature",
        }),
    )
        .into_response()
}

/// Router exposing the webhook at [`WEBHOOK_PATH`]
pub fn stripe_webhook_router(state: StripeWebhookState) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(stripe_webhook_handler))
        .with_state(state)
}
