//! Webhook delivery deduplication
//!
//! Stripe delivers events at least once. The webhook endpoint records every
//! event id before queuing it, so a redelivery that arrives while the first
//! copy is still queued or already done is acknowledged without reprocessing.
//! This is the fast path only: line-item writes are additionally keyed in the
//! store, which is what makes reconciliation safe after a restart.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::stripe::error::StripeResult;

/// Lifecycle of one delivered event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    /// Recorded and queued or being handled
    InProgress,
    /// Handled successfully
    Completed,
    /// Handled and gave up after retries
    Failed,
}

/// Result of recording a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// First sighting; caller owns processing
    New,
    /// Seen before and not failed; caller must not process again
    Duplicate(ProcessingState),
    /// Seen before and failed; caller owns reprocessing
    Retry,
}

impl DeliveryStatus {
    /// Whether the caller should process the event
    pub fn should_process(&self) -> bool {
        matches!(self, Self::New | Self::Retry)
    }
}

/// Storage for delivery records
#[async_trait::async_trait]
pub trait IdempotencyStore: Send + Sync + 'static {
    /// Atomically look up and record a delivery of `event_id`
    async fn check_and_record(&self, event_id: &str) -> StripeResult<DeliveryStatus>;

    /// Mark the event handled
    async fn mark_completed(&self, event_id: &str) -> StripeResult<()>;

    /// Mark the event failed; a later redelivery will be reprocessed
    async fn mark_failed(&self, event_id: &str, reason: &str) -> StripeResult<()>;

    /// Current state, if the event is known
    async fn state(&self, event_id: &str) -> StripeResult<Option<ProcessingState>>;
}

#[derive(Debug, Clone)]
struct DeliveryRecord {
    state: ProcessingState,
    recorded_at: Instant,
    failure: Option<String>,
}

/// Bounded, TTL-evicting in-process idempotency store
#[derive(Debug)]
pub struct InMemoryIdempotencyStore {
    records: Mutex<HashMap<String, DeliveryRecord>>,
    ttl: Duration,
    max_entries: usize,
}

impl InMemoryIdempotencyStore {
    /// Create a store remembering deliveries for `ttl`, holding at most `max_entries`
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Number of remembered deliveries
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether no delivery is remembered
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Failure reason recorded for `event_id`, if any
    pub fn failure_reason(&self, event_id: &str) -> Option<String> {
        self.records
            .lock()
            .get(event_id)
            .and_then(|r| r.failure.clone())
    }

    fn evict(&self, records: &mut HashMap<String, DeliveryRecord>, now: Instant) {
        records.retain(|_, r| now.duration_since(r.recorded_at) < self.ttl);

        while records.len() >= self.max_entries {
            // In-progress records are never evicted while others remain
            let victim = records
                .iter()
                .filter(|(_, r)| r.state != ProcessingState::InProgress)
                .min_by_key(|(_, r)| r.recorded_at)
                .or_else(|| records.iter().min_by_key(|(_, r)| r.recorded_at))
                .map(|(k, _)| k.clone());

            match victim {
                Some(key) => {
                    records.remove(&key);
                }
                None => break,
            }
        }
    }

    fn set_state(&self, event_id: &str, state: ProcessingState, failure: Option<String>) {
        let mut records = self.records.lock();
        let record = records
            .entry(event_id.to_string())
            .or_insert_with(|| DeliveryRecord {
                state,
                recorded_at: Instant::now(),
                failure: None,
            });
        record.state = state;
        record.failure = failure;
    }
}

#[async_trait::async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn check_and_record(&self, event_id: &str) -> StripeResult<DeliveryStatus> {
        let now = Instant::now();
        let mut records = self.records.lock();

        if let Some(record) = records.get_mut(event_id) {
            if now.duration_since(record.recorded_at) < self.ttl {
                return Ok(match record.state {
                    ProcessingState::Failed => {
                        record.state = ProcessingState::InProgress;
                        record.recorded_at = now;
                        DeliveryStatus::Retry
                    }
                    state => DeliveryStatus::Duplicate(state),
                });
            }
        }

        self.evict(&mut records, now);
        records.insert(
            event_id.to_string(),
            DeliveryRecord {
                state: ProcessingState::InProgress,
                recorded_at: now,
                failure: None,
            },
        );
        Ok(DeliveryStatus::New)
    }

    async fn mark_completed(&self, event_id: &str) -> StripeResult<()> {
        self.set_state(event_id, ProcessingState::Completed, None);
        Ok(())
    }

    async fn mark_failed(&self, event_id: &str, reason: &str) -> StripeResult<()> {
        self.set_state(event_id, ProcessingState::Failed, Some(reason.to_string()));
        Ok(())
    }

    async fn state(&self, event_id: &str) -> StripeResult<Option<ProcessingState>> {
        Ok(self.records.lock().get(event_id).map(|r| r.state))
    }
}
