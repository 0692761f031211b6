//! Payment provider client
//!
//! [`PaymentProvider`] is the seam the checkout components depend on.
//! [`StripeClient`] talks to the Stripe REST API with form-encoded requests;
//! [`InMemoryPaymentProvider`] records calls in memory for tests and offline runs.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use serde::Deserialize;
use url::Url;

use crate::stripe::config::StripeClientConfig;
use crate::stripe::error::{StripeError, StripeResult};

/// Placeholder Stripe substitutes with the session id in redirect URLs
pub const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// Customer record to create provider-side
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerRequest {
    /// Contact email
    pub email: Option<String>,
    /// Display name
    pub name: Option<String>,
    /// Opaque key/value metadata stored with the customer
    pub metadata: BTreeMap<String, String>,
}

/// Customer record as held by the provider
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderCustomer {
    /// Customer ID (cus_...)
    pub id: String,
    /// Metadata attached at creation
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// One priced line of a checkout session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLineItem {
    /// Product title shown on the payment page
    pub title: String,
    /// Unit amount in minor currency units
    pub unit_amount: i64,
    /// Quantity
    pub quantity: u32,
}

/// Fixed-amount shipping option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippingRate {
    /// Label shown to the buyer
    pub display_name: String,
    /// Amount in minor units
    pub amount: i64,
}

impl ShippingRate {
    /// Zero-cost shipping
    pub fn free() -> Self {
        Self {
            display_name: "Free shipping".to_string(),
            amount: 0,
        }
    }
}

/// Parameters for a hosted checkout session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    /// Provider customer the session belongs to
    pub customer_id: String,
    /// ISO currency code, lowercase
    pub currency: String,
    /// One entry per cart line
    pub line_items: Vec<SessionLineItem>,
    /// ISO country codes shipping may be collected for
    pub allowed_countries: Vec<String>,
    /// The single shipping option offered
    pub shipping_rate: ShippingRate,
    /// Redirect after payment; may contain [`SESSION_ID_PLACEHOLDER`]
    pub success_url: String,
    /// Redirect on abandonment; may contain [`SESSION_ID_PLACEHOLDER`]
    pub cancel_url: String,
}

impl CheckoutSessionRequest {
    /// Stripe form encoding of the request
    pub fn to_form_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("mode".to_string(), "payment".to_string()),
            ("customer".to_string(), self.customer_id.clone()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
        ];

        for (i, country) in self.allowed_countries.iter().enumerate() {
            params.push((
                format!("shipping_address_collection[allowed_countries][{}]", i),
                country.clone(),
            ));
        }

        let rate = "shipping_options[0][shipping_rate_data]";
        params.push((format!("{}[type]", rate), "fixed_amount".to_string()));
        params.push((
            format!("{}[fixed_amount][amount]", rate),
            self.shipping_rate.amount.to_string(),
        ));
        params.push((
            format!("{}[fixed_amount][currency]", rate),
            self.currency.clone(),
        ));
        params.push((
            format!("{}[display_name]", rate),
            self.shipping_rate.display_name.clone(),
        ));

        for (i, item) in self.line_items.iter().enumerate() {
            let prefix = format!("line_items[{}]", i);
            params.push((
                format!("{}[price_data][currency]", prefix),
                self.currency.clone(),
            ));
            params.push((
                format!("{}[price_data][product_data][name]", prefix),
                item.title.clone(),
            ));
            params.push((
                format!("{}[price_data][unit_amount]", prefix),
                item.unit_amount.to_string(),
            ));
            params.push((format!("{}[quantity]", prefix), item.quantity.to_string()));
        }

        params
    }
}

/// Session returned by the provider
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSessionHandle {
    /// Session ID (cs_...)
    pub id: String,
    /// Hosted payment page
    pub url: String,
}

/// Current state of a session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionStatus {
    /// Session ID
    pub id: String,
    /// `open`, `complete` or `expired`
    #[serde(default)]
    pub status: Option<String>,
    /// `paid`, `unpaid` or `no_payment_required`
    pub payment_status: String,
}

/// Operations the checkout flow needs from the payment provider
#[async_trait::async_trait]
pub trait PaymentProvider: Send + Sync + 'static {
    /// Create a customer record carrying `request.metadata`
    async fn create_customer(&self, request: CustomerRequest) -> StripeResult<ProviderCustomer>;

    /// Create a hosted checkout session
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> StripeResult<CheckoutSessionHandle>;

    /// Fetch a session's status; `NotFound` if unknown
    async fn retrieve_session(&self, session_id: &str) -> StripeResult<SessionStatus>;

    /// Fetch a customer; `NotFound` if unknown
    async fn retrieve_customer(&self, customer_id: &str) -> StripeResult<ProviderCustomer>;
}

// =============================================================================
// Stripe REST client
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Stripe REST API client
#[derive(Debug, Clone)]
pub struct StripeClient {
    config: StripeClientConfig,
    http: reqwest::Client,
}

impl StripeClient {
    /// Build a client
    pub fn new(config: StripeClientConfig) -> StripeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, segments: &[&str]) -> StripeResult<Url> {
        let mut url = Url::parse(&self.config.api_base)
            .map_err(|e| StripeError::InternalError(format!("Invalid API base: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| StripeError::InternalError("API base cannot be a base URL".into()))?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    async fn send<T>(&self, request: reqwest::RequestBuilder, what: &str) -> StripeResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = request
            .basic_auth(&self.config.secret_key, Option::<&str>::None)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StripeError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .ok()
                .and_then(|e| e.error.message.or(e.error.code))
                .unwrap_or(body);
            tracing::error!(status = status.as_u16(), what, error = %message, "Stripe API call failed");
            return Err(StripeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| StripeError::InvalidPayload(format!("Unexpected {} response: {}", what, e)))
    }
}

#[async_trait::async_trait]
impl PaymentProvider for StripeClient {
    async fn create_customer(&self, request: CustomerRequest) -> StripeResult<ProviderCustomer> {
        let mut params: Vec<(String, String)> = Vec::new();
        if let Some(email) = request.email {
            params.push(("email".into(), email));
        }
        if let Some(name) = request.name {
            params.push(("name".into(), name));
        }
        for (key, value) in request.metadata {
            params.push((format!("metadata[{}]", key), value));
        }

        let url = self.endpoint(&["customers"])?;
        self.send(self.http.post(url).form(&params), "customer")
            .await
    }

    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> StripeResult<CheckoutSessionHandle> {
        let url = self.endpoint(&["checkout", "sessions"])?;
        self.send(
            self.http.post(url).form(&request.to_form_params()),
            "checkout session",
        )
        .await
    }

    async fn retrieve_session(&self, session_id: &str) -> StripeResult<SessionStatus> {
        let url = self.endpoint(&["checkout", "sessions", session_id])?;
        self.send(self.http.get(url), &format!("session {}", session_id))
            .await
    }

    async fn retrieve_customer(&self, customer_id: &str) -> StripeResult<ProviderCustomer> {
        let url = self.endpoint(&["customers", customer_id])?;
        self.send(self.http.get(url), &format!("customer {}", customer_id))
            .await
    }
}

// =============================================================================
// In-memory provider
// =============================================================================

#[derive(Debug, Default)]
struct ProviderState {
    customers: HashMap<String, ProviderCustomer>,
    sessions: HashMap<String, (CheckoutSessionRequest, String)>,
    next_id: u64,
}

/// Payment provider that keeps everything in memory
#[derive(Debug, Default)]
pub struct InMemoryPaymentProvider {
    state: Mutex<ProviderState>,
}

impl InMemoryPaymentProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a customer directly, e.g. one with hand-written metadata
    pub fn insert_customer(&self, id: impl Into<String>, metadata: BTreeMap<String, String>) {
        let id = id.into();
        self.state
            .lock()
            .customers
            .insert(id.clone(), ProviderCustomer { id, metadata });
    }

    /// Overwrite a session's payment status
    pub fn set_payment_status(&self, session_id: &str, payment_status: &str) -> bool {
        match self.state.lock().sessions.get_mut(session_id) {
            Some(entry) => {
                entry.1 = payment_status.to_string();
                true
            }
            None => false,
        }
    }

    /// Requests received for every created session, keyed by session id
    pub fn session_requests(&self) -> HashMap<String, CheckoutSessionRequest> {
        self.state
            .lock()
            .sessions
            .iter()
            .map(|(id, (req, _))| (id.clone(), req.clone()))
            .collect()
    }

    /// Number of customers held
    pub fn customer_count(&self) -> usize {
        self.state.lock().customers.len()
    }

    fn next_id(state: &mut ProviderState, prefix: &str) -> String {
        state.next_id += 1;
        format!("{}_{:06}", prefix, state.next_id)
    }
}

#[async_trait::async_trait]
impl PaymentProvider for InMemoryPaymentProvider {
    async fn create_customer(&self, request: CustomerRequest) -> StripeResult<ProviderCustomer> {
        let mut state = self.state.lock();
        let customer = ProviderCustomer {
            id: Self::next_id(&mut state, "cus"),
            metadata: request.metadata,
        };
        state.customers.insert(customer.id.clone(), customer.clone());
        Ok(customer)
    }

    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> StripeResult<CheckoutSessionHandle> {
        let mut state = self.state.lock();
        if !state.customers.contains_key(&request.customer_id) {
            return Err(StripeError::NotFound(format!(
                "customer {}",
                request.customer_id
            )));
        }
        let id = Self::next_id(&mut state, "cs_test");
        let handle = CheckoutSessionHandle {
            url: format!("https://checkout.stripe.test/pay/{}", id),
            id: id.clone(),
        };
        state.sessions.insert(id, (request, "unpaid".to_string()));
        Ok(handle)
    }

    async fn retrieve_session(&self, session_id: &str) -> StripeResult<SessionStatus> {
        self.state
            .lock()
            .sessions
            .get(session_id)
            .map(|(_, payment_status)| {
                let status = if payment_status == "paid" {
                    "complete"
                } else {
                    "open"
                };
                SessionStatus {
                    id: session_id.to_string(),
                    status: Some(status.to_string()),
                    payment_status: payment_status.clone(),
                }
            })
            .ok_or_else(|| StripeError::NotFound(format!("session {}", session_id)))
    }

    async fn retrieve_customer(&self, customer_id: &str) -> StripeResult<ProviderCustomer> {
        self.state
            .lock()
            .customers
            .get(customer_id)
            .cloned()
            .ok_or_else(|| StripeError::NotFound(format!("customer {}", customer_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_request() -> CheckoutSessionRequest {
        CheckoutSessionRequest {
            customer_id: "cus_1".into(),
            currency: "usd".into(),
            line_items: vec![
                SessionLineItem {
                    title: "Tee".into(),
                    unit_amount: 900,
                    quantity: 3,
                },
                SessionLineItem {
                    title: "Cap".into(),
                    unit_amount: 1500,
                    quantity: 1,
                },
            ],
            allowed_countries: vec!["US".into(), "CA".into()],
            shipping_rate: ShippingRate::free(),
            success_url: format!("https://shop.test/success?session_id={}", SESSION_ID_PLACEHOLDER),
            cancel_url: "https://shop.test/cart".into(),
        }
    }

    #[test]
    fn test_form_params_encode_lines_and_shipping() {
        let params: HashMap<_, _> = session_request().to_form_params().into_iter().collect();

        assert_eq!(params["mode"], "payment");
        assert_eq!(params["line_items[0][price_data][unit_amount]"], "900");
        assert_eq!(params["line_items[0][quantity]"], "3");
        assert_eq!(params["line_items[1][price_data][product_data][name]"], "Cap");
        assert_eq!(
            params["shipping_options[0][shipping_rate_data][fixed_amount][amount]"],
            "0"
        );
        assert_eq!(params["shipping_address_collection[allowed_countries][1]"], "CA");
        assert!(params["success_url"].ends_with("{CHECKOUT_SESSION_ID}"));
    }

    #[test]
    fn test_endpoint_escapes_path_segments() {
        let client =
            StripeClient::new(StripeClientConfig::new("sk_test").with_api_base("http://localhost:12111"))
                .unwrap();
        let url = client
            .endpoint(&["checkout", "sessions", "../customers"])
            .unwrap();
        assert_eq!(url.path(), "/v1/checkout/sessions/..%2Fcustomers");
    }

    #[tokio::test]
    async fn test_in_memory_provider_round_trip() {
        let provider = InMemoryPaymentProvider::new();
        let mut metadata = BTreeMap::new();
        metadata.insert("buyer_id".to_string(), "B1".to_string());

        let customer = provider
            .create_customer(CustomerRequest {
                metadata: metadata.clone(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(
            provider.retrieve_customer(&customer.id).await.unwrap().metadata,
            metadata
        );

        let mut request = session_request();
        request.customer_id = customer.id;
        let session = provider.create_checkout_session(request).await.unwrap();
        assert_eq!(
            provider.retrieve_session(&session.id).await.unwrap().payment_status,
            "unpaid"
        );

        assert!(provider.set_payment_status(&session.id, "paid"));
        let status = provider.retrieve_session(&session.id).await.unwrap();
        assert_eq!(status.payment_status, "paid");
        assert_eq!(status.status.as_deref(), Some("complete"));
    }

    #[tokio::test]
    async fn test_in_memory_provider_unknown_objects() {
        let provider = InMemoryPaymentProvider::new();
        assert!(matches!(
            provider.retrieve_session("cs_missing").await,
            Err(StripeError::NotFound(_))
        ));
        assert!(matches!(
            provider.retrieve_customer("cus_missing").await,
            Err(StripeError::NotFound(_))
        ));
    }
}
