//! Stripe integration
//!
//! - **Signature Verification**: HMAC-SHA256 over the raw body, checked against the `stripe-signature` header
//! - **Idempotency**: delivery dedupe on event ids
//! - **Async Processing**: record the intake, acknowledge, dispatch in a background task
//! - **Recovery**: intakes left pending by a previous run are replayed at startup
//! - **Error Recovery**: exponential backoff, then failure recorded for redelivery
//! - **REST client**: customers and checkout sessions behind the [`PaymentProvider`] seam
//!
//! # Architecture
//!
//! ```text
//! Request -> Signature Verify -> Idempotency Check -> Intake -> Ack (200) -> Async Process
//!                   |                    |                                          |
//!                   v                    v                                          v
//!                  400              202 (already)                          dispatch -> handler
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shopfront_payments::metrics::Metrics;
//! use shopfront_payments::stripe::{stripe_webhook_router, StripeWebhookConfig, StripeWebhookState};
//! # use shopfront_payments::store::InMemoryStore;
//! # use shopfront_payments::stripe::PaymentEventHandler;
//! # fn handler() -> Arc<dyn PaymentEventHandler> { unimplemented!() }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = StripeWebhookConfig::from_env()?;
//! let (state, processor) = StripeWebhookState::from_config(
//!     config,
//!     handler(),
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(Metrics::new()),
//! );
//! tokio::spawn(processor.run());
//!
//! let app = stripe_webhook_router(state);
//! // ... serve with axum
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod handler;
pub mod idempotency;
pub mod processor;
pub mod signature;

// Re-export commonly used items
pub use client::{InMemoryPaymentProvider, PaymentProvider, StripeClient};
pub use config::{RetryPolicy, StripeClientConfig, StripeWebhookConfig};
pub use error::{StripeError, StripeResult};
pub use events::{CheckoutSessionEvent, PaymentIntentEvent, StripeEvent, StripeEventType};
pub use handler::{stripe_webhook_handler, stripe_webhook_router, StripeWebhookState};
pub use idempotency::{IdempotencyStore, InMemoryIdempotencyStore};
pub use processor::{
    dispatch, Acceptance, EventProcessor, PaymentEventHandler, ProcessingOutcome, ProcessorHandle,
};
pub use signature::SignatureVerifier;
