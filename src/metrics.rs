//! Metrics Collection for the payment reconciliation path
//!
//! Atomic counters for webhook intake, event processing and line-item
//! outcomes, plus a per-kind failure breakdown, exported in Prometheus text
//! format at `GET /metrics`.
//!
//! # Example
//!
//! ```rust
//! use shopfront_payments::metrics::Metrics;
//!
//! let metrics = Metrics::new();
//! metrics.record_webhook_received();
//! metrics.record_order_created();
//!
//! let output = metrics.to_prometheus_format();
//! assert!(output.contains("shopfront_orders_created_total 1"));
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;

/// Metrics collection for the reconciliation path
///
/// Shared as `Arc<Metrics>` between the HTTP handlers, the event processor
/// and the reconciler.
#[derive(Debug)]
pub struct Metrics {
    // === Webhook intake ===
    /// Deliveries that reached the webhook endpoint
    pub webhooks_received: AtomicU64,
    /// Deliveries rejected by signature verification
    pub webhooks_rejected: AtomicU64,
    /// Deliveries acknowledged as redeliveries
    pub webhooks_duplicate: AtomicU64,

    // === Event processing ===
    /// Events handled successfully
    pub events_processed: AtomicU64,
    /// Events that failed permanently or exhausted retries
    pub events_failed: AtomicU64,
    /// Events of a type nobody handles
    pub events_ignored: AtomicU64,

    // === Line items ===
    /// Orders written
    pub orders_created: AtomicU64,
    /// Line items skipped because their order already existed
    pub line_items_duplicate: AtomicU64,
    /// Line items that failed
    pub line_items_failed: AtomicU64,
    /// Line items recorded to the dead-letter list
    pub dead_letters: AtomicU64,
    /// Stock decrements applied
    pub stock_decrements: AtomicU64,

    // === Checkout ===
    /// Provider checkout sessions created
    pub checkout_sessions_created: AtomicU64,

    /// Failures broken down by error kind
    failures_by_kind: RwLock<BTreeMap<String, u64>>,

    /// When collection started
    start_time: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self {
            webhooks_received: AtomicU64::new(0),
            webhooks_rejected: AtomicU64::new(0),
            webhooks_duplicate: AtomicU64::new(0),
            events_processed: AtomicU64::new(0),
            events_failed: AtomicU64::new(0),
            events_ignored: AtomicU64::new(0),
            orders_created: AtomicU64::new(0),
            line_items_duplicate: AtomicU64::new(0),
            line_items_failed: AtomicU64::new(0),
            dead_letters: AtomicU64::new(0),
            stock_decrements: AtomicU64::new(0),
            checkout_sessions_created: AtomicU64::new(0),
            failures_by_kind: RwLock::new(BTreeMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record an inbound webhook delivery
    pub fn record_webhook_received(&self) {
        self.webhooks_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivery rejected at authentication
    pub fn record_webhook_rejected(&self) {
        self.webhooks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a redelivery acknowledged without processing
    pub fn record_webhook_duplicate(&self) {
        self.webhooks_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successfully handled event
    pub fn record_event_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event that will not be retried further
    pub fn record_event_failed(&self, kind: &str) {
        self.events_failed.fetch_add(1, Ordering::Relaxed);
        self.record_failure(kind);
    }

    /// Record an event of an unhandled type
    pub fn record_event_ignored(&self) {
        self.events_ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a new order
    pub fn record_order_created(&self) {
        self.orders_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a line item whose order already existed
    pub fn record_line_item_duplicate(&self) {
        self.line_items_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed line item
    pub fn record_line_item_failed(&self, kind: &str) {
        self.line_items_failed.fetch_add(1, Ordering::Relaxed);
        self.record_failure(kind);
    }

    /// Record a dead-lettered line item
    pub fn record_dead_letter(&self) {
        self.dead_letters.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an applied stock decrement
    pub fn record_stock_decrement(&self) {
        self.stock_decrements.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a created checkout session
    pub fn record_checkout_session(&self) {
        self.checkout_sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self, kind: &str) {
        *self
            .failures_by_kind
            .write()
            .entry(kind.to_string())
            .or_insert(0) += 1;
    }

    /// Failure count for one error kind
    pub fn failures_of_kind(&self, kind: &str) -> u64 {
        self.failures_by_kind.read().get(kind).copied().unwrap_or(0)
    }

    /// Seconds since the metrics were created
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Convert metrics to Prometheus text format
    pub fn to_prometheus_format(&self) -> String {
        let counters: [(&str, &AtomicU64); 12] = [
            ("shopfront_webhooks_received_total", &self.webhooks_received),
            ("shopfront_webhooks_rejected_total", &self.webhooks_rejected),
            ("shopfront_webhooks_duplicate_total", &self.webhooks_duplicate),
            ("shopfront_events_processed_total", &self.events_processed),
            ("shopfront_events_failed_total", &self.events_failed),
            ("shopfront_events_ignored_total", &self.events_ignored),
            ("shopfront_orders_created_total", &self.orders_created),
            ("shopfront_line_items_duplicate_total", &self.line_items_duplicate),
            ("shopfront_line_items_failed_total", &self.line_items_failed),
            ("shopfront_dead_letters_total", &self.dead_letters),
            ("shopfront_stock_decrements_total", &self.stock_decrements),
            (
                "shopfront_checkout_sessions_created_total",
                &self.checkout_sessions_created,
            ),
        ];

        let mut output = String::new();
        for (name, counter) in counters {
            output.push_str(&format!("{} {}\n", name, counter.load(Ordering::Relaxed)));
        }

        for (kind, count) in self.failures_by_kind.read().iter() {
            output.push_str(&format!(
                "shopfront_failures_total{{kind=\"{}\"}} {}\n",
                kind, count
            ));
        }

        output.push_str(&format!(
            "shopfront_uptime_seconds {}\n",
            self.uptime_seconds()
        ));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_webhook_received();
        metrics.record_webhook_received();
        metrics.record_webhook_duplicate();
        assert_eq!(metrics.webhooks_received.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.webhooks_duplicate.load(Ordering::Relaxed), 1);

        metrics.record_line_item_failed("transient_store_failure");
        metrics.record_event_failed("malformed_intent");
        assert_eq!(metrics.failures_of_kind("transient_store_failure"), 1);
        assert_eq!(metrics.failures_of_kind("malformed_intent"), 1);
        assert_eq!(metrics.failures_of_kind("timeout"), 0);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_order_created();
        metrics.record_line_item_failed("timeout");

        let output = metrics.to_prometheus_format();
        assert!(output.contains("shopfront_orders_created_total 1\n"));
        assert!(output.contains("shopfront_line_items_failed_total 1\n"));
        assert!(output.contains("shopfront_failures_total{kind=\"timeout\"} 1\n"));
        assert!(output.contains("shopfront_uptime_seconds"));
    }
}
