//! Shopfront Payments - checkout sessions and payment-event reconciliation
//!
//! This crate turns a buyer's cart into a hosted Stripe checkout session and,
//! when Stripe later reports the checkout complete, into exactly one order per
//! purchased line item with the matching stock decrement.
//!
//! # Features
//!
//! - **Checkout**: discounted minor-unit pricing, versioned intent snapshot on the provider customer
//! - **Webhooks**: raw-body HMAC verification, delivery dedupe, acknowledge-then-process
//! - **Reconciliation**: keyed order creation, clamped stock decrements, review-eligibility propagation
//! - **Recovery**: per-line retries with backoff, dead letters for what still fails
//!
//! # Architecture
//!
//! ```text
//! Buyer ──▶ POST /api/checkout ──▶ CheckoutInitiator ──▶ Stripe (customer + session)
//!                                                            │
//! Stripe ──▶ POST /webhooks/stripe ──▶ SignatureVerifier      │ checkout.session.completed
//!                                          │                  │
//!                                          ▼                  ▼
//!                                   IdempotencyStore ──▶ EventProcessor
//!                                                            │
//!                                                            ▼
//!                                                     OrderReconciler ──▶ Store
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shopfront_payments::config::AppConfig;
//! use shopfront_payments::handlers::build_app;
//! use shopfront_payments::store::InMemoryStore;
//! use shopfront_payments::stripe::StripeClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let provider = Arc::new(StripeClient::new(config.stripe_client.clone())?);
//!     let app = build_app(&config, Arc::new(InMemoryStore::new()), provider);
//!
//!     tokio::spawn(app.processor.run());
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3001").await?;
//!     axum::serve(listener, app.router).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod checkout;
pub mod config;
pub mod cors;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod store;
pub mod stripe;

// Re-exports for convenience
pub use checkout::{CheckoutInitiator, OrderReconciler, PaymentStatusQuery};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use metrics::Metrics;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
