//! Order Reconciler
//!
//! Turns one `checkout.session.completed` event into orders and stock
//! decrements. The purchased lines come from the intent snapshot stored on
//! the provider customer, never from live cart or catalog state.
//!
//! Every line item is handled independently and concurrently:
//!
//! ```text
//! eligibility read -> keyed order insert -> conditional stock decrement
//!                          |                        |
//!                   Existing + applied       AlreadyApplied
//!                          v                        v
//!                      Duplicate                Duplicate
//! ```
//!
//! Orders are keyed by `(event id, line index)`, and the decrement is applied
//! through the order's `stock_applied` flag, so redeliveries and retries
//! after a crash converge on one order and one decrement per line. A store
//! that reports a key conflict instead of the existing order is answered by
//! reading the order back under the same key. Transient
//! store failures are retried with backoff; a line that still fails is
//! recorded as a dead letter and its siblings carry on.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::checkout::intent::{CheckoutIntent, IntentLineItem};
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::store::{
    DeadLetter, InsertOutcome, LineItemKey, NewOrder, Order, ShippingAddress, StockApplication,
    Store, StoreError,
};
use crate::stripe::client::PaymentProvider;
use crate::stripe::config::RetryPolicy;
use crate::stripe::events::{CheckoutSessionEvent, PaymentIntentEvent};
use crate::stripe::processor::PaymentEventHandler;

/// What happened to one line item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LineItemOutcome {
    /// New order written and stock adjusted
    Created {
        /// The new order
        order_id: Uuid,
        /// Inherited review eligibility
        review_eligible: bool,
        /// Stock after the decrement; `None` if the product is gone
        remaining_stock: Option<i64>,
    },
    /// Order existed from an interrupted attempt; its decrement was applied now
    Resumed {
        /// The existing order
        order_id: Uuid,
        /// Stock after the decrement; `None` if the product is gone
        remaining_stock: Option<i64>,
    },
    /// Order and decrement were both already recorded
    Duplicate {
        /// The existing order
        order_id: Uuid,
    },
    /// Line item could not be reconciled
    Failed {
        /// Last error
        reason: String,
        /// Whether a dead letter was persisted
        dead_lettered: bool,
    },
}

/// Outcome of one line item, with its key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItemReport {
    /// Dedupe key
    pub key: LineItemKey,
    /// Product bought
    pub product_id: String,
    /// Result
    pub outcome: LineItemOutcome,
}

/// Per-line results for one event, in intent order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    /// Provider event id
    pub event_id: String,
    /// Provider customer carrying the intent
    pub customer_id: String,
    /// One entry per intent line
    pub items: Vec<LineItemReport>,
}

impl ReconciliationReport {
    /// Lines that produced a new order
    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, LineItemOutcome::Created { .. }))
    }

    /// Lines whose order existed and whose decrement was applied now
    pub fn resumed(&self) -> usize {
        self.count(|o| matches!(o, LineItemOutcome::Resumed { .. }))
    }

    /// Lines that were already reconciled
    pub fn duplicates(&self) -> usize {
        self.count(|o| matches!(o, LineItemOutcome::Duplicate { .. }))
    }

    /// Lines that failed
    pub fn failures(&self) -> usize {
        self.count(|o| matches!(o, LineItemOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&LineItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|item| pred(&item.outcome)).count()
    }
}

/// Reconciles completed checkouts into orders and inventory
#[derive(Clone)]
pub struct OrderReconciler {
    store: Arc<dyn Store>,
    provider: Arc<dyn PaymentProvider>,
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl OrderReconciler {
    /// Create a reconciler; `retry` governs per-line backoff
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn PaymentProvider>,
        retry: RetryPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            provider,
            retry,
            metrics,
        }
    }

    /// Reconcile one completed checkout.
    ///
    /// Errors abort the whole event: `MalformedIntent` when the customer or
    /// its intent is missing or off-schema, and retryable provider errors
    /// while fetching the customer. Line-level failures are reported in the
    /// returned report instead.
    #[instrument(skip(self, event), fields(event_id = %event.event_id, session_id = %event.session.id))]
    pub async fn reconcile(&self, event: &CheckoutSessionEvent) -> Result<ReconciliationReport> {
        let customer_id = event
            .session
            .customer
            .clone()
            .ok_or_else(|| Error::malformed_intent("completed session has no customer"))?;

        let intent = self.load_intent(&customer_id).await?;
        let address = match event.shipping_address() {
            Some(address) => address.clone(),
            None => {
                warn!("Completed session carries no shipping address");
                ShippingAddress::default()
            }
        };

        let lines = intent.items.iter().enumerate().map(|(index, item)| {
            let key = LineItemKey::new(event.event_id.clone(), index);
            self.reconcile_line(key, item, &address)
        });
        let items = join_all(lines).await;

        let report = ReconciliationReport {
            event_id: event.event_id.clone(),
            customer_id,
            items,
        };
        info!(
            created = report.created(),
            resumed = report.resumed(),
            duplicates = report.duplicates(),
            failed = report.failures(),
            "Checkout reconciled"
        );
        Ok(report)
    }

    async fn load_intent(&self, customer_id: &str) -> Result<CheckoutIntent> {
        let customer = match self.provider.retrieve_customer(customer_id).await {
            Ok(customer) => customer,
            Err(e) => {
                return Err(match Error::from(e) {
                    Error::NotFound(what) => {
                        Error::malformed_intent(format!("intent holder missing: {}", what))
                    }
                    other => other,
                })
            }
        };
        CheckoutIntent::from_metadata(&customer.metadata)
    }

    /// Run one line to completion, retrying transient failures
    async fn reconcile_line(
        &self,
        key: LineItemKey,
        item: &IntentLineItem,
        address: &ShippingAddress,
    ) -> LineItemReport {
        let mut attempt = 0;
        let outcome = loop {
            match self.apply_line(&key, item, address).await {
                Ok(outcome) => break outcome,
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        line = %key,
                        product_id = %item.product_id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Line item failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(Error::DuplicateDelivery(reason)) => {
                    break self.settle_duplicate(&key, item, reason).await
                }
                Err(e) => break self.fail_line(&key, item, e).await,
            }
        };

        LineItemReport {
            key,
            product_id: item.product_id.clone(),
            outcome,
        }
    }

    async fn apply_line(
        &self,
        key: &LineItemKey,
        item: &IntentLineItem,
        address: &ShippingAddress,
    ) -> Result<LineItemOutcome> {
        let review_eligible = self
            .store
            .has_review_eligible_order(&item.product_id, &item.buyer_id)
            .await?;

        let order = NewOrder {
            product_id: item.product_id.clone(),
            buyer_id: item.buyer_id.clone(),
            size: item.size.clone(),
            color: item.color.clone(),
            quantity: item.quantity,
            shipping_address: address.clone(),
            review_eligible,
        };

        let inserted = match self.store.insert_order(key, order).await {
            Ok(inserted) => inserted,
            Err(StoreError::Conflict(reason)) => {
                debug!(line = %key, %reason, "Order key taken by a concurrent insert");
                InsertOutcome::Existing(self.existing_order(key, &reason).await?)
            }
            Err(e) => return Err(e.into()),
        };

        match inserted {
            InsertOutcome::Created(order) => {
                self.metrics.record_order_created();
                debug!(line = %key, order_id = %order.id, review_eligible, "Order created");
                match self.apply_stock(key, order.id, &item.product_id).await? {
                    StockApplication::AlreadyApplied => Ok(self.duplicate(key, order.id)),
                    applied => Ok(LineItemOutcome::Created {
                        order_id: order.id,
                        review_eligible: order.review_eligible,
                        remaining_stock: remaining(applied),
                    }),
                }
            }
            InsertOutcome::Existing(order) if order.stock_applied => {
                Ok(self.duplicate(key, order.id))
            }
            InsertOutcome::Existing(order) => {
                info!(line = %key, order_id = %order.id, "Resuming stock decrement for existing order");
                match self.apply_stock(key, order.id, &item.product_id).await? {
                    StockApplication::AlreadyApplied => Ok(self.duplicate(key, order.id)),
                    applied => Ok(LineItemOutcome::Resumed {
                        order_id: order.id,
                        remaining_stock: remaining(applied),
                    }),
                }
            }
        }
    }

    /// Read back the order a conflicting insert reported
    async fn existing_order(&self, key: &LineItemKey, reason: &str) -> Result<Order> {
        self.store.find_order(key).await?.ok_or_else(|| {
            Error::TransientStoreFailure(format!(
                "order for {} not readable after conflict: {}",
                key, reason
            ))
        })
    }

    /// A duplicate surfaced as an error; nothing new is written
    async fn settle_duplicate(
        &self,
        key: &LineItemKey,
        item: &IntentLineItem,
        reason: String,
    ) -> LineItemOutcome {
        match self.existing_order(key, &reason).await {
            Ok(order) => self.duplicate(key, order.id),
            Err(e) => self.fail_line(key, item, e).await,
        }
    }

    async fn apply_stock(
        &self,
        key: &LineItemKey,
        order_id: Uuid,
        product_id: &str,
    ) -> Result<StockApplication> {
        let applied = self.store.apply_order_stock(order_id).await?;
        match applied {
            StockApplication::Applied { .. } => self.metrics.record_stock_decrement(),
            StockApplication::ProductMissing => {
                warn!(line = %key, product_id, "Product no longer exists, stock not adjusted")
            }
            StockApplication::AlreadyApplied => {}
        }
        Ok(applied)
    }

    fn duplicate(&self, key: &LineItemKey, order_id: Uuid) -> LineItemOutcome {
        self.metrics.record_line_item_duplicate();
        debug!(line = %key, order_id = %order_id, "Line item already reconciled");
        LineItemOutcome::Duplicate { order_id }
    }

    async fn fail_line(&self, key: &LineItemKey, item: &IntentLineItem, err: Error) -> LineItemOutcome {
        self.metrics.record_line_item_failed(err.kind());

        let letter = DeadLetter {
            key: key.clone(),
            product_id: item.product_id.clone(),
            buyer_id: item.buyer_id.clone(),
            reason: err.to_string(),
            recorded_at: Utc::now(),
        };
        let dead_lettered = match self.store.record_dead_letter(letter).await {
            Ok(()) => {
                self.metrics.record_dead_letter();
                true
            }
            Err(store_err) => {
                error!(line = %key, error = %store_err, "Failed to record dead letter");
                false
            }
        };

        error!(
            line = %key,
            product_id = %item.product_id,
            buyer_id = %item.buyer_id,
            kind = err.kind(),
            error = %err,
            dead_lettered,
            "Line item could not be reconciled"
        );

        LineItemOutcome::Failed {
            reason: err.to_string(),
            dead_lettered,
        }
    }
}

fn remaining(applied: StockApplication) -> Option<i64> {
    match applied {
        StockApplication::Applied { remaining } => Some(remaining),
        _ => None,
    }
}

#[async_trait::async_trait]
impl PaymentEventHandler for OrderReconciler {
    async fn on_checkout_completed(&self, event: &CheckoutSessionEvent) -> Result<()> {
        self.reconcile(event).await.map(|_| ())
    }

    async fn on_payment_succeeded(&self, event: &PaymentIntentEvent) -> Result<()> {
        info!(
            event_id = %event.event_id,
            payment_intent = %event.intent.id,
            amount = event.intent.amount,
            currency = %event.intent.currency,
            "Payment intent succeeded"
        );
        Ok(())
    }
}
