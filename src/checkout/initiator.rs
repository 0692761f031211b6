//! Checkout Session Initiator
//!
//! Runs in the buyer's request. Prices the cart, stores the intent snapshot
//! on a fresh provider customer and opens a hosted checkout session. No local
//! state is written; orders only come from the webhook path.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::checkout::config::CheckoutConfig;
use crate::checkout::intent::CheckoutIntent;
use crate::checkout::pricing::CartLineItem;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::store::Store;
use crate::stripe::client::{
    CheckoutSessionRequest, CustomerRequest, PaymentProvider, SessionLineItem,
};

/// Where to send the buyer next
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRedirect {
    /// Provider session id
    pub session_id: String,
    /// Hosted payment page
    pub url: String,
}

/// Opens provider checkout sessions for carts
#[derive(Clone)]
pub struct CheckoutInitiator {
    provider: Arc<dyn PaymentProvider>,
    store: Arc<dyn Store>,
    config: CheckoutConfig,
    metrics: Arc<Metrics>,
}

impl CheckoutInitiator {
    /// Create an initiator
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        store: Arc<dyn Store>,
        config: CheckoutConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            provider,
            store,
            config,
            metrics,
        }
    }

    /// Price `cart`, register the intent and open a session.
    ///
    /// Fails with `Validation` for an unusable cart and `NotFound` for an
    /// unknown buyer, both before anything is sent to the provider.
    #[instrument(skip(self, cart), fields(lines = cart.len()))]
    pub async fn start_checkout(
        &self,
        buyer_id: &str,
        cart: &[CartLineItem],
    ) -> Result<CheckoutRedirect> {
        if cart.is_empty() {
            return Err(Error::validation("cart is empty"));
        }
        let line_items = cart
            .iter()
            .map(|line| {
                line.validate()?;
                Ok(SessionLineItem {
                    title: line.title.clone(),
                    unit_amount: line.unit_amount()?,
                    quantity: line.quantity,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let buyer = self
            .store
            .find_buyer(buyer_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("buyer {}", buyer_id)))?;

        let metadata = CheckoutIntent::from_cart(&buyer.id, cart).to_metadata()?;
        let customer = self
            .provider
            .create_customer(CustomerRequest {
                email: buyer.email.clone(),
                name: buyer.name.clone(),
                metadata,
            })
            .await?;
        debug!(customer_id = %customer.id, "Registered checkout intent");

        let session = self
            .provider
            .create_checkout_session(CheckoutSessionRequest {
                customer_id: customer.id,
                currency: self.config.currency.clone(),
                line_items,
                allowed_countries: self.config.allowed_countries.clone(),
                shipping_rate: self.config.shipping_rate.clone(),
                success_url: self.config.success_url(),
                cancel_url: self.config.cancel_url(),
            })
            .await?;

        self.metrics.record_checkout_session();
        info!(session_id = %session.id, "Checkout session created");

        Ok(CheckoutRedirect {
            session_id: session.id,
            url: session.url,
        })
    }
}
