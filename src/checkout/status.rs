//! Payment Status Query

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{Error, Result};
use crate::stripe::client::PaymentProvider;

/// Status of one checkout session as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatus {
    /// Provider session id
    pub session_id: String,
    /// Provider payment status, verbatim
    pub payment_status: String,
}

/// Read-only lookup of session payment status for client polling
#[derive(Clone)]
pub struct PaymentStatusQuery {
    provider: Arc<dyn PaymentProvider>,
}

impl PaymentStatusQuery {
    /// Create a query
    pub fn new(provider: Arc<dyn PaymentProvider>) -> Self {
        Self { provider }
    }

    /// Current payment status of `session_id`; `NotFound` if the provider has no such session
    #[instrument(skip(self))]
    pub async fn payment_status(&self, session_id: &str) -> Result<PaymentStatus> {
        if session_id.trim().is_empty() {
            return Err(Error::not_found("session id is empty"));
        }
        let session = self.provider.retrieve_session(session_id).await?;
        Ok(PaymentStatus {
            session_id: session.id,
            payment_status: session.payment_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stripe::client::{
        CheckoutSessionRequest, CustomerRequest, InMemoryPaymentProvider, ShippingRate,
    };

    #[tokio::test]
    async fn test_status_is_returned_verbatim() {
        let provider = Arc::new(InMemoryPaymentProvider::new());
        let customer = provider
            .create_customer(CustomerRequest::default())
            .await
            .unwrap();
        let session = provider
            .create_checkout_session(CheckoutSessionRequest {
                customer_id: customer.id,
                currency: "usd".into(),
                line_items: vec![],
                allowed_countries: vec!["US".into()],
                shipping_rate: ShippingRate::free(),
                success_url: "https://shop.test/ok".into(),
                cancel_url: "https://shop.test/cart".into(),
            })
            .await
            .unwrap();

        let query = PaymentStatusQuery::new(provider.clone());
        assert_eq!(
            query.payment_status(&session.id).await.unwrap().payment_status,
            "unpaid"
        );

        provider.set_payment_status(&session.id, "paid");
        assert_eq!(
            query.payment_status(&session.id).await.unwrap().payment_status,
            "paid"
        );
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let query = PaymentStatusQuery::new(Arc::new(InMemoryPaymentProvider::new()));
        assert!(matches!(
            query.payment_status("cs_missing").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            query.payment_status("").await,
            Err(Error::NotFound(_))
        ));
    }
}
