//! Checkout and reconciliation
//!
//! ```text
//! buyer ──> CheckoutInitiator ──> provider customer (intent) + session
//!                                             │
//!                        checkout.session.completed (webhook)
//!                                             v
//!                                      OrderReconciler ──> orders, stock
//!
//! buyer ──> PaymentStatusQuery ──> provider session status
//! ```

pub mod config;
pub mod initiator;
pub mod intent;
pub mod pricing;
pub mod reconciler;
pub mod status;

pub use config::CheckoutConfig;
pub use initiator::{CheckoutInitiator, CheckoutRedirect};
pub use intent::{CheckoutIntent, IntentLineItem};
pub use pricing::{discounted_unit_amount, CartLineItem};
pub use reconciler::{LineItemOutcome, LineItemReport, OrderReconciler, ReconciliationReport};
pub use status::{PaymentStatus, PaymentStatusQuery};
