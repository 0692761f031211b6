// Field names mirror the document schema
#![allow(missing_docs)]

//! Persisted records shared with the catalog and account services

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Registered buyer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
    /// Buyer identifier
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Contact email, forwarded to the payment provider
    #[serde(default)]
    pub email: Option<String>,
}

/// Catalog product; only `stock` is written by reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product identifier
    pub id: String,
    /// Title
    pub title: String,
    /// Units on hand, never negative
    pub stock: i64,
}

/// Postal address as collected by the payment provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Dedupe key for one line item of one provider event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineItemKey {
    /// Provider event id
    pub event_id: String,
    /// Position of the line item in the checkout intent
    pub line_index: usize,
}

impl LineItemKey {
    /// Build a key
    pub fn new(event_id: impl Into<String>, line_index: usize) -> Self {
        Self {
            event_id: event_id.into(),
            line_index,
        }
    }
}

impl std::fmt::Display for LineItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.event_id, self.line_index)
    }
}

/// Fields supplied when creating an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub product_id: String,
    pub buyer_id: String,
    pub size: String,
    pub color: String,
    pub quantity: u32,
    pub shipping_address: ShippingAddress,
    pub review_eligible: bool,
}

/// Persisted order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    /// Originating line item; absent for orders imported from elsewhere
    #[serde(default)]
    pub source: Option<LineItemKey>,
    pub product_id: String,
    pub buyer_id: String,
    pub size: String,
    pub color: String,
    pub quantity: u32,
    pub shipping_address: ShippingAddress,
    pub review_eligible: bool,
    /// Whether the stock decrement for this order has been applied
    pub stock_applied: bool,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Materialize a new order for `source`
    pub fn from_new(new: NewOrder, source: Option<LineItemKey>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            product_id: new.product_id,
            buyer_id: new.buyer_id,
            size: new.size,
            color: new.color,
            quantity: new.quantity,
            shipping_address: new.shipping_address,
            review_eligible: new.review_eligible,
            stock_applied: false,
            created_at: Utc::now(),
        }
    }
}

/// Outcome of a keyed order insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new order was written
    Created(Order),
    /// An order already existed under the key; nothing written
    Existing(Order),
}

/// Result of applying an order's stock decrement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockApplication {
    /// Stock decremented; carries the new level
    Applied { remaining: i64 },
    /// Product no longer exists; nothing to decrement
    ProductMissing,
    /// Decrement was applied by an earlier attempt
    AlreadyApplied,
}

/// Line item that exhausted its retries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub key: LineItemKey,
    pub product_id: String,
    pub buyer_id: String,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

/// Verified webhook delivery persisted before it is acknowledged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intake {
    pub event_id: String,
    /// Raw verified body
    pub payload: String,
    pub received_at: DateTime<Utc>,
    /// Set once processing reached a final outcome
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Intake {
    pub fn is_pending(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// Boot-time fixture data for the in-memory store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub buyers: Vec<Buyer>,
    #[serde(default)]
    pub products: Vec<Product>,
}
