//! Event dispatch and background processing
//!
//! The webhook endpoint acknowledges a verified delivery as soon as it is
//! queued; the event is then dispatched here, off the request path.
//!
//! # Architecture
//!
//! ```text
//! Webhook Received
//!       |
//!       v
//! [Verify Signature] ----------------------> 400
//!       |
//!       v
//! [Check Idempotency] --> Already seen? ---> 202
//!       |
//!       v
//! [Persist Intake, Queue Event] -----------> 200
//!       |                    (inline if either step fails)
//!       |
//!       v
//! [Dispatch by type, with timeout and retries]
//!       |
//!       v
//! [Update Idempotency Store, Resolve Intake]
//! ```
//!
//! Intakes still pending when the process stops are replayed by the next
//! [`ProcessorHandle::run`].

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::stripe::config::StripeWebhookConfig;
use crate::stripe::error::{StripeError, StripeResult};
use crate::stripe::events::{
    CheckoutSessionEvent, PaymentIntentEvent, StripeEvent, StripeEventType,
};
use crate::store::Store;
use crate::stripe::idempotency::{DeliveryStatus, IdempotencyStore};

/// Handler for the event types the store reacts to
#[async_trait::async_trait]
pub trait PaymentEventHandler: Send + Sync + 'static {
    /// A buyer finished a hosted checkout
    async fn on_checkout_completed(&self, event: &CheckoutSessionEvent) -> Result<()>;

    /// A payment intent settled
    async fn on_payment_succeeded(&self, event: &PaymentIntentEvent) -> Result<()>;
}

/// How dispatch treated an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Routed to a handler, which succeeded
    Handled,
    /// No handler for this type
    Ignored,
}

/// Final state of a processed event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// Handled or ignored, and marked completed
    Completed(DispatchOutcome),
    /// Gave up; marked failed so a redelivery is reprocessed
    Failed,
}

/// Route a verified event to `handler` by type. Unknown types are not an error.
pub async fn dispatch(
    handler: &dyn PaymentEventHandler,
    event: &StripeEvent,
) -> Result<DispatchOutcome> {
    match event.typed_event_type() {
        StripeEventType::CheckoutSessionCompleted => {
            let checkout = event.as_checkout_session().map_err(|e| {
                Error::malformed_intent(format!("checkout session payload: {}", e))
            })?;
            handler.on_checkout_completed(&checkout).await?;
            Ok(DispatchOutcome::Handled)
        }
        StripeEventType::PaymentIntentSucceeded => {
            let intent = event.as_payment_intent().map_err(Error::from)?;
            handler.on_payment_succeeded(&intent).await?;
            Ok(DispatchOutcome::Handled)
        }
        StripeEventType::Unknown => {
            tracing::debug!(
                event_id = %event.id,
                event_type = %event.event_type,
                "Ignoring unhandled event type"
            );
            Ok(DispatchOutcome::Ignored)
        }
    }
}

struct ProcessingContext {
    handler: Arc<dyn PaymentEventHandler>,
    idempotency_store: Arc<dyn IdempotencyStore>,
    intake_store: Arc<dyn Store>,
    config: StripeWebhookConfig,
    metrics: Arc<Metrics>,
}

/// A processing task sent to the background worker
struct ProcessingTask {
    event: StripeEvent,
    queued_at: Instant,
}

/// How a verified delivery was taken in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Intake persisted and queued for the background worker
    Queued,
    /// Handled in the caller's task because the intake could not be
    /// persisted or the queue was unavailable
    ProcessedInline(ProcessingOutcome),
}

/// Queues verified events for background processing
#[derive(Clone)]
pub struct EventProcessor {
    ctx: Arc<ProcessingContext>,
    /// Channel for background task processing
    task_sender: mpsc::Sender<ProcessingTask>,
}

impl EventProcessor {
    /// Create a processor and the handle that drains its queue.
    ///
    /// `intake_store` holds accepted deliveries until they reach a final
    /// outcome; [`ProcessorHandle::run`] replays whatever is still pending.
    pub fn new(
        handler: Arc<dyn PaymentEventHandler>,
        idempotency_store: Arc<dyn IdempotencyStore>,
        intake_store: Arc<dyn Store>,
        config: StripeWebhookConfig,
        metrics: Arc<Metrics>,
    ) -> (Self, ProcessorHandle) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let ctx = Arc::new(ProcessingContext {
            handler,
            idempotency_store,
            intake_store,
            config,
            metrics,
        });

        let processor = Self {
            ctx: ctx.clone(),
            task_sender: tx,
        };
        let handle = ProcessorHandle {
            ctx,
            task_receiver: rx,
        };

        (processor, handle)
    }

    /// Take in a verified delivery whose raw body is `payload`.
    ///
    /// The intake is persisted before the event is queued, so returning
    /// [`Acceptance::Queued`] means the event survives a restart. When
    /// either step fails the event is processed before returning.
    pub async fn accept(&self, event: StripeEvent, payload: &[u8]) -> Acceptance {
        let payload = String::from_utf8_lossy(payload);
        if let Err(e) = self.ctx.intake_store.record_intake(&event.id, &payload).await {
            tracing::warn!(event_id = %event.id, error = %e, "Intake not persisted, processing inline");
            return Acceptance::ProcessedInline(self.process_now(event).await);
        }

        match self.queue_event(event.clone()) {
            Ok(()) => Acceptance::Queued,
            Err(e) => {
                tracing::warn!(event_id = %event.id, error = %e, "Queue unavailable, processing inline");
                Acceptance::ProcessedInline(self.process_now(event).await)
            }
        }
    }

    /// Queue an event for async processing.
    ///
    /// Never waits: a full or closed queue is reported as an error so the
    /// caller can fall back to [`EventProcessor::process_now`].
    pub fn queue_event(&self, event: StripeEvent) -> StripeResult<()> {
        let task = ProcessingTask {
            event,
            queued_at: Instant::now(),
        };

        self.task_sender.try_send(task).map_err(|e| {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "processor stopped",
            };
            StripeError::InternalError(format!("Failed to queue event: {}", reason))
        })
    }

    /// Process an event in the caller's task, with the same retries and bookkeeping
    pub async fn process_now(&self, event: StripeEvent) -> ProcessingOutcome {
        process_with_retry(&self.ctx, event).await
    }
}

/// Handle for running the background processor
pub struct ProcessorHandle {
    ctx: Arc<ProcessingContext>,
    task_receiver: mpsc::Receiver<ProcessingTask>,
}

impl ProcessorHandle {
    /// Run the background processor until every [`EventProcessor`] is dropped.
    ///
    /// Intakes left pending by a previous run are replayed first. Events run
    /// concurrently; in-flight events are drained before returning.
    ///
    /// ```rust,ignore
    /// tokio::spawn(handle.run());
    /// ```
    pub async fn run(mut self) {
        tracing::info!("Starting payment event processor");
        let mut in_flight = JoinSet::new();

        for event in recover_pending(&self.ctx).await {
            let ctx = self.ctx.clone();
            in_flight.spawn(async move { process_with_retry(&ctx, event).await });
        }

        loop {
            tokio::select! {
                task = self.task_receiver.recv() => match task {
                    Some(task) => {
                        let ctx = self.ctx.clone();
                        in_flight.spawn(async move {
                            tracing::debug!(
                                event_id = %task.event.id,
                                queued_ms = task.queued_at.elapsed().as_millis() as u64,
                                "Dequeued event"
                            );
                            process_with_retry(&ctx, task.event).await
                        });
                    }
                    None => break,
                },
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    log_join_error(joined);
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            log_join_error(joined);
        }
        tracing::info!("Payment event processor shutting down");
    }
}

fn log_join_error(joined: std::result::Result<ProcessingOutcome, tokio::task::JoinError>) {
    // The task's in-flight guard has already marked its event failed
    if let Err(e) = joined {
        tracing::error!(error = %e, "Event processing task aborted");
    }
}

/// Pending intakes from earlier runs that this process now owns
async fn recover_pending(ctx: &ProcessingContext) -> Vec<StripeEvent> {
    let pending = match ctx.intake_store.pending_intakes().await {
        Ok(pending) => pending,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load pending intakes");
            return Vec::new();
        }
    };

    let mut events = Vec::with_capacity(pending.len());
    for intake in pending {
        let event = match StripeEvent::from_bytes(intake.payload.as_bytes()) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(event_id = %intake.event_id, error = %e, "Discarding unparsable intake");
                resolve_intake(ctx, &intake.event_id).await;
                continue;
            }
        };

        let status = match ctx.idempotency_store.check_and_record(&event.id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(event_id = %event.id, error = %e, "Idempotency check failed, replaying anyway");
                DeliveryStatus::New
            }
        };
        if status.should_process() {
            events.push(event);
        }
    }

    if !events.is_empty() {
        tracing::info!(count = events.len(), "Replaying pending intakes");
    }
    events
}

async fn resolve_intake(ctx: &ProcessingContext, event_id: &str) {
    if let Err(e) = ctx.intake_store.resolve_intake(event_id).await {
        // Inline fallbacks may have no intake
        tracing::debug!(event_id, error = %e, "Intake not resolved");
    }
}

/// Marks its event failed unless settled, so an event whose processing is
/// dropped (cancelled request, panicked task) is reprocessed on redelivery.
struct InFlight {
    idempotency_store: Arc<dyn IdempotencyStore>,
    event_id: String,
    settled: bool,
}

impl InFlight {
    fn new(ctx: &ProcessingContext, event_id: &str) -> Self {
        Self {
            idempotency_store: ctx.idempotency_store.clone(),
            event_id: event_id.to_string(),
            settled: false,
        }
    }

    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        tracing::warn!(event_id = %self.event_id, "Event processing interrupted");

        let store = self.idempotency_store.clone();
        let event_id = std::mem::take(&mut self.event_id);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = store.mark_failed(&event_id, "processing interrupted").await {
                        tracing::error!(event_id = %event_id, error = %e, "Failed to mark interrupted event");
                    }
                });
            }
            Err(_) => {
                tracing::error!(event_id = %event_id, "No runtime to mark interrupted event failed");
            }
        }
    }
}

/// Process a single event with retry logic
async fn process_with_retry(ctx: &ProcessingContext, event: StripeEvent) -> ProcessingOutcome {
    let event_id = event.id.clone();
    let event_type = event.event_type.clone();
    let max_retries = ctx.config.retry.max_retries;
    let in_flight = InFlight::new(ctx, &event_id);

    let mut attempt = 0;
    let result = loop {
        if attempt > 0 {
            let delay = ctx.config.retry_delay(attempt - 1);
            tracing::info!(
                event_id = %event_id,
                event_type = %event_type,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying event processing"
            );
            tokio::time::sleep(delay).await;
        }

        match process_single_event(ctx, &event).await {
            Err(e) if e.is_retryable() && attempt < max_retries => {
                tracing::warn!(
                    event_id = %event_id,
                    event_type = %event_type,
                    attempt = attempt + 1,
                    max_retries,
                    error = %e,
                    "Event processing failed"
                );
                attempt += 1;
            }
            result => break result,
        }
    };

    let outcome = match result {
        Ok(outcome) => {
            match outcome {
                DispatchOutcome::Handled => ctx.metrics.record_event_processed(),
                DispatchOutcome::Ignored => ctx.metrics.record_event_ignored(),
            }
            if let Err(e) = ctx.idempotency_store.mark_completed(&event_id).await {
                tracing::error!(
                    event_id = %event_id,
                    error = %e,
                    "Failed to mark event as completed in idempotency store"
                );
            }
            resolve_intake(ctx, &event_id).await;
            tracing::info!(
                event_id = %event_id,
                event_type = %event_type,
                attempts = attempt + 1,
                "Event processed successfully"
            );
            ProcessingOutcome::Completed(outcome)
        }
        Err(e) => {
            tracing::error!(
                event_id = %event_id,
                event_type = %event_type,
                attempts = attempt + 1,
                kind = e.kind(),
                error = %e,
                "Event processing abandoned"
            );
            ctx.metrics.record_event_failed(e.kind());
            if let Err(mark_err) = ctx
                .idempotency_store
                .mark_failed(&event_id, &e.to_string())
                .await
            {
                tracing::error!(
                    event_id = %event_id,
                    error = %mark_err,
                    "Failed to mark event as failed in idempotency store"
                );
            }
            // Retryable failures stay pending and are replayed on the next start
            if !e.is_retryable() {
                resolve_intake(ctx, &event_id).await;
            }
            ProcessingOutcome::Failed
        }
    };

    in_flight.settle();
    outcome
}

/// Dispatch once under the processing timeout
async fn process_single_event(
    ctx: &ProcessingContext,
    event: &StripeEvent,
) -> Result<DispatchOutcome> {
    match timeout(
        ctx.config.processing_timeout,
        dispatch(ctx.handler.as_ref(), event),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!(
            "processing exceeded {:?}",
            ctx.config.processing_timeout
        ))),
    }
}
