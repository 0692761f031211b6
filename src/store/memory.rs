//! In-process [`Store`] implementation
//!
//! All mutations happen under a single `RwLock`, so keyed order creation and
//! stock decrements are atomic with respect to concurrent deliveries.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::store::models::{
    Buyer, DeadLetter, InsertOutcome, Intake, LineItemKey, NewOrder, Order, Product, SeedData,
    StockApplication,
};
use crate::store::{Store, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Inner {
    buyers: HashMap<String, Buyer>,
    products: HashMap<String, Product>,
    orders: Vec<Order>,
    /// Line-item key -> position in `orders`
    order_keys: HashMap<LineItemKey, usize>,
    dead_letters: Vec<DeadLetter>,
    /// In receipt order
    intakes: Vec<Intake>,
}

/// Thread-safe in-memory store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `seed`
    pub fn with_seed(seed: SeedData) -> Self {
        let store = Self::new();
        store.load_seed(seed);
        store
    }

    /// Insert or replace buyers and products from `seed`
    pub fn load_seed(&self, seed: SeedData) {
        let mut inner = self.inner.write();
        for buyer in seed.buyers {
            inner.buyers.insert(buyer.id.clone(), buyer);
        }
        for mut product in seed.products {
            product.stock = product.stock.max(0);
            inner.products.insert(product.id.clone(), product);
        }
    }

    /// Insert or replace a buyer
    pub fn insert_buyer(&self, buyer: Buyer) {
        self.inner.write().buyers.insert(buyer.id.clone(), buyer);
    }

    /// Insert or replace a product
    pub fn insert_product(&self, product: Product) {
        self.inner
            .write()
            .products
            .insert(product.id.clone(), product);
    }

    /// Append an order that did not come from reconciliation (e.g. history import)
    pub fn import_order(&self, order: Order) {
        let mut inner = self.inner.write();
        let position = inner.orders.len();
        if let Some(key) = order.source.clone() {
            inner.order_keys.insert(key, position);
        }
        inner.orders.push(order);
    }

    /// Current stock for `product_id`
    pub fn stock_of(&self, product_id: &str) -> Option<i64> {
        self.inner.read().products.get(product_id).map(|p| p.stock)
    }

    /// Snapshot of every order
    pub fn orders(&self) -> Vec<Order> {
        self.inner.read().orders.clone()
    }

    /// Snapshot of every dead letter
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.read().dead_letters.clone()
    }

    /// Intake recorded for `event_id`, pending or resolved
    pub fn intake(&self, event_id: &str) -> Option<Intake> {
        self.inner
            .read()
            .intakes
            .iter()
            .find(|intake| intake.event_id == event_id)
            .cloned()
    }
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    async fn find_buyer(&self, buyer_id: &str) -> StoreResult<Option<Buyer>> {
        Ok(self.inner.read().buyers.get(buyer_id).cloned())
    }

    async fn has_review_eligible_order(
        &self,
        product_id: &str,
        buyer_id: &str,
    ) -> StoreResult<bool> {
        Ok(self
            .inner
            .read()
            .orders
            .iter()
            .any(|o| o.product_id == product_id && o.buyer_id == buyer_id && o.review_eligible))
    }

    async fn insert_order(&self, key: &LineItemKey, order: NewOrder) -> StoreResult<InsertOutcome> {
        let mut inner = self.inner.write();

        if let Some(&position) = inner.order_keys.get(key) {
            return inner
                .orders
                .get(position)
                .cloned()
                .map(InsertOutcome::Existing)
                .ok_or_else(|| StoreError::Missing(format!("order indexed under {}", key)));
        }

        let order = Order::from_new(order, Some(key.clone()));
        let position = inner.orders.len();
        inner.orders.push(order.clone());
        inner.order_keys.insert(key.clone(), position);
        Ok(InsertOutcome::Created(order))
    }

    async fn find_order(&self, key: &LineItemKey) -> StoreResult<Option<Order>> {
        let inner = self.inner.read();
        Ok(inner
            .order_keys
            .get(key)
            .and_then(|&position| inner.orders.get(position))
            .cloned())
    }

    async fn apply_order_stock(&self, order_id: Uuid) -> StoreResult<StockApplication> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let order = inner
            .orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| StoreError::Missing(format!("order {}", order_id)))?;
        if order.stock_applied {
            return Ok(StockApplication::AlreadyApplied);
        }
        order.stock_applied = true;

        Ok(match inner.products.get_mut(&order.product_id) {
            Some(product) => {
                product.stock = (product.stock - i64::from(order.quantity)).max(0);
                StockApplication::Applied {
                    remaining: product.stock,
                }
            }
            None => StockApplication::ProductMissing,
        })
    }

    async fn record_dead_letter(&self, letter: DeadLetter) -> StoreResult<()> {
        self.inner.write().dead_letters.push(letter);
        Ok(())
    }

    async fn record_intake(&self, event_id: &str, payload: &str) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.intakes.retain(|intake| intake.event_id != event_id);
        inner.intakes.push(Intake {
            event_id: event_id.to_string(),
            payload: payload.to_string(),
            received_at: Utc::now(),
            resolved_at: None,
        });
        Ok(())
    }

    async fn resolve_intake(&self, event_id: &str) -> StoreResult<()> {
        let mut inner = self.inner.write();
        match inner
            .intakes
            .iter_mut()
            .find(|intake| intake.event_id == event_id)
        {
            Some(intake) => {
                intake.resolved_at = Some(Utc::now());
                Ok(())
            }
            None => Err(StoreError::Missing(format!("intake {}", event_id))),
        }
    }

    async fn pending_intakes(&self) -> StoreResult<Vec<Intake>> {
        Ok(self
            .inner
            .read()
            .intakes
            .iter()
            .filter(|intake| intake.is_pending())
            .cloned()
            .collect())
    }
}
