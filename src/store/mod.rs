//! Persisted store seam
//!
//! Orders, products and buyers live in a document store owned by the wider
//! application. Reconciliation needs only keyed creates, equality lookups and
//! conditional field updates, captured by the [`Store`] trait. Verified
//! webhook deliveries are written to the same store as intakes before they
//! are acknowledged, so queued work survives a restart. The
//! [`InMemoryStore`] backs tests and local runs.

pub mod memory;
pub mod models;

use thiserror::Error;
use uuid::Uuid;

pub use memory::InMemoryStore;
pub use models::{
    Buyer, DeadLetter, InsertOutcome, Intake, LineItemKey, NewOrder, Order, Product, SeedData,
    ShippingAddress, StockApplication,
};

/// Store failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend unreachable or timed out; retrying may succeed
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Write rejected because a record with the same key exists, e.g. a
    /// unique index losing a race between concurrent inserts
    #[error("conflicting write: {0}")]
    Conflict(String),

    /// Record addressed by an update does not exist
    #[error("record missing: {0}")]
    Missing(String),
}

/// Result alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Operations reconciliation and checkout need from the store
#[async_trait::async_trait]
pub trait Store: Send + Sync + 'static {
    /// Look up a buyer by id
    async fn find_buyer(&self, buyer_id: &str) -> StoreResult<Option<Buyer>>;

    /// Whether an order for (`product_id`, `buyer_id`) with review eligibility exists
    async fn has_review_eligible_order(&self, product_id: &str, buyer_id: &str)
        -> StoreResult<bool>;

    /// Create an order under `key` unless one already exists for it.
    ///
    /// Backends enforcing the key with a unique index may instead report a
    /// lost race as `Conflict`.
    async fn insert_order(&self, key: &LineItemKey, order: NewOrder) -> StoreResult<InsertOutcome>;

    /// The order created under `key`, if any
    async fn find_order(&self, key: &LineItemKey) -> StoreResult<Option<Order>>;

    /// Apply the stock decrement owed by `order_id` at most once.
    ///
    /// Decrements the ordered product (clamped at zero) and sets the order's
    /// `stock_applied` flag in one conditional update. `Missing` if the order
    /// does not exist.
    async fn apply_order_stock(&self, order_id: Uuid) -> StoreResult<StockApplication>;

    /// Persist a line item that could not be reconciled
    async fn record_dead_letter(&self, letter: DeadLetter) -> StoreResult<()>;

    /// Persist a verified delivery as pending. Recording an event id again
    /// replaces the payload and reopens it.
    async fn record_intake(&self, event_id: &str, payload: &str) -> StoreResult<()>;

    /// Mark an intake as having reached a final outcome
    async fn resolve_intake(&self, event_id: &str) -> StoreResult<()>;

    /// Pending intakes, oldest first
    async fn pending_intakes(&self) -> StoreResult<Vec<Intake>>;
}
