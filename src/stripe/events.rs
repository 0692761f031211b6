//! Stripe Event Types
//!
//! Strongly-typed representations of the Stripe webhook events the checkout
//! flow reacts to.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::store::ShippingAddress;
use crate::stripe::error::{StripeError, StripeResult};

/// Stripe event types we handle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StripeEventType {
    /// `checkout.session.completed`
    CheckoutSessionCompleted,

    /// `payment_intent.succeeded`
    PaymentIntentSucceeded,

    /// Any type we don't explicitly handle
    Unknown,
}

impl FromStr for StripeEventType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "payment_intent.succeeded" => Self::PaymentIntentSucceeded,
            _ => Self::Unknown,
        })
    }
}

impl StripeEventType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutSessionCompleted => "checkout.session.completed",
            Self::PaymentIntentSucceeded => "payment_intent.succeeded",
            Self::Unknown => "unknown",
        }
    }
}

/// Generic Stripe event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEvent {
    /// Unique identifier for the event; stable across redeliveries
    pub id: String,

    /// Type of event
    #[serde(rename = "type")]
    pub event_type: String,

    /// Time of event creation (Unix timestamp)
    pub created: i64,

    /// API version used to render data
    #[serde(default)]
    pub api_version: Option<String>,

    /// Whether this is a live mode event
    #[serde(default)]
    pub livemode: bool,

    /// Number of deliveries still pending for this event
    #[serde(default)]
    pub pending_webhooks: u32,

    /// Object containing event data
    pub data: EventData,
}

impl StripeEvent {
    /// Parse from raw JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> StripeResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| StripeError::InvalidPayload(e.to_string()))
    }

    /// Get the typed event type
    pub fn typed_event_type(&self) -> StripeEventType {
        match StripeEventType::from_str(&self.event_type) {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }

    /// Extract the checkout session from a `checkout.session.completed` event
    pub fn as_checkout_session(&self) -> StripeResult<CheckoutSessionEvent> {
        match self.typed_event_type() {
            StripeEventType::CheckoutSessionCompleted => {
                let session: CheckoutSessionObject =
                    serde_json::from_value(self.data.object.clone())
                        .map_err(|e| StripeError::InvalidPayload(e.to_string()))?;

                Ok(CheckoutSessionEvent {
                    event_id: self.id.clone(),
                    session,
                })
            }
            _ => Err(StripeError::InvalidPayload(format!(
                "Event {} is not a checkout session event",
                self.event_type
            ))),
        }
    }

    /// Extract the payment intent from a `payment_intent.succeeded` event
    pub fn as_payment_intent(&self) -> StripeResult<PaymentIntentEvent> {
        match self.typed_event_type() {
            StripeEventType::PaymentIntentSucceeded => {
                let intent: PaymentIntentObject = serde_json::from_value(self.data.object.clone())
                    .map_err(|e| StripeError::InvalidPayload(e.to_string()))?;

                Ok(PaymentIntentEvent {
                    event_id: self.id.clone(),
                    intent,
                })
            }
            _ => Err(StripeError::InvalidPayload(format!(
                "Event {} is not a payment intent event",
                self.event_type
            ))),
        }
    }
}

/// Event data container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    /// The actual event object
    pub object: serde_json::Value,
}

// =============================================================================
// Checkout Session Types
// =============================================================================

/// Completed checkout session with typed data
#[derive(Debug, Clone)]
pub struct CheckoutSessionEvent {
    /// The event ID
    pub event_id: String,
    /// The session object
    pub session: CheckoutSessionObject,
}

impl CheckoutSessionEvent {
    /// Shipping address collected by the provider.
    ///
    /// Prefers `shipping_details`, falling back to the customer's billing
    /// address when shipping was not collected.
    pub fn shipping_address(&self) -> Option<&ShippingAddress> {
        self.session
            .shipping_details
            .as_ref()
            .and_then(|s| s.address.as_ref())
            .or_else(|| {
                self.session
                    .customer_details
                    .as_ref()
                    .and_then(|c| c.address.as_ref())
            })
    }
}

/// Stripe checkout session object (subset)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSessionObject {
    /// Session ID (cs_...)
    pub id: String,
    /// Customer ID (cus_...)
    #[serde(default)]
    pub customer: Option<String>,
    /// `paid`, `unpaid` or `no_payment_required`
    #[serde(default)]
    pub payment_status: Option<String>,
    /// Amount total in minor units
    #[serde(default)]
    pub amount_total: Option<i64>,
    /// Currency
    #[serde(default)]
    pub currency: Option<String>,
    /// Collected shipping details
    #[serde(default)]
    pub shipping_details: Option<ShippingDetails>,
    /// Collected customer details
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
}

/// Shipping details block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingDetails {
    /// Recipient name
    #[serde(default)]
    pub name: Option<String>,
    /// Recipient address
    #[serde(default)]
    pub address: Option<ShippingAddress>,
}

/// Customer details block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerDetails {
    /// Email
    #[serde(default)]
    pub email: Option<String>,
    /// Billing address
    #[serde(default)]
    pub address: Option<ShippingAddress>,
}

// =============================================================================
// Payment Intent Types
// =============================================================================

/// Payment intent event with typed data
#[derive(Debug, Clone)]
pub struct PaymentIntentEvent {
    /// The event ID
    pub event_id: String,
    /// The payment intent object
    pub intent: PaymentIntentObject,
}

/// Stripe payment intent object (subset)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentObject {
    /// Payment intent ID (pi_...)
    pub id: String,
    /// Amount in minor units
    #[serde(default)]
    pub amount: i64,
    /// Currency
    #[serde(default)]
    pub currency: String,
    /// Status
    #[serde(default)]
    pub status: Option<String>,
    /// Customer ID
    #[serde(default)]
    pub customer: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_parsing() {
        assert_eq!(
            StripeEventType::from_str("checkout.session.completed").unwrap(),
            StripeEventType::CheckoutSessionCompleted
        );
        assert_eq!(
            StripeEventType::from_str("payment_intent.succeeded").unwrap(),
            StripeEventType::PaymentIntentSucceeded
        );
        assert_eq!(
            StripeEventType::from_str("invoice.paid").unwrap(),
            StripeEventType::Unknown
        );
    }

    #[test]
    fn test_parse_checkout_session_event() {
        let json = r#"{
            "id": "evt_checkout_1",
            "type": "checkout.session.completed",
            "created": 1700000000,
            "livemode": false,
            "pending_webhooks": 1,
            "data": {
                "object": {
                    "id": "cs_test_1",
                    "customer": "cus_123",
                    "payment_status": "paid",
                    "amount_total": 2700,
                    "currency": "usd",
                    "shipping_details": {
                        "name": "Ada",
                        "address": {
                            "line1": "1 Main St",
                            "city": "Springfield",
                            "postal_code": "12345",
                            "country": "US"
                        }
                    }
                }
            }
        }"#;

        let event = StripeEvent::from_bytes(json.as_bytes()).unwrap();
        assert_eq!(
            event.typed_event_type(),
            StripeEventType::CheckoutSessionCompleted
        );

        let checkout = event.as_checkout_session().unwrap();
        assert_eq!(checkout.event_id, "evt_checkout_1");
        assert_eq!(checkout.session.customer.as_deref(), Some("cus_123"));
        let address = checkout.shipping_address().unwrap();
        assert_eq!(address.city.as_deref(), Some("Springfield"));
        assert_eq!(address.country.as_deref(), Some("US"));
    }

    #[test]
    fn test_shipping_address_falls_back_to_customer_details() {
        let json = r#"{
            "id": "evt_2",
            "type": "checkout.session.completed",
            "created": 1700000000,
            "data": {
                "object": {
                    "id": "cs_2",
                    "customer": "cus_2",
                    "customer_details": {
                        "email": "a@example.com",
                        "address": { "line1": "9 Side Rd", "country": "CA" }
                    }
                }
            }
        }"#;

        let checkout = StripeEvent::from_bytes(json.as_bytes())
            .unwrap()
            .as_checkout_session()
            .unwrap();
        assert_eq!(
            checkout.shipping_address().unwrap().line1.as_deref(),
            Some("9 Side Rd")
        );
    }

    #[test]
    fn test_wrong_accessor_rejected() {
        let json = r#"{
            "id": "evt_3",
            "type": "payment_intent.succeeded",
            "created": 1700000000,
            "data": { "object": { "id": "pi_3", "amount": 900, "currency": "usd" } }
        }"#;

        let event = StripeEvent::from_bytes(json.as_bytes()).unwrap();
        assert!(event.as_checkout_session().is_err());
        assert_eq!(event.as_payment_intent().unwrap().intent.amount, 900);
    }

    #[test]
    fn test_invalid_json_is_invalid_payload() {
        assert!(matches!(
            StripeEvent::from_bytes(b"{not json"),
            Err(StripeError::InvalidPayload(_))
        ));
    }
}
