//! Service configuration
//!
//! Everything is read from the process environment after `main` has loaded
//! any `.env` file with `dotenvy`. Components receive their slice of this
//! struct explicitly.

use std::env;

use crate::checkout::CheckoutConfig;
use crate::cors::CorsConfig;
use crate::error::{Error, Result};
use crate::stripe::{StripeClientConfig, StripeWebhookConfig};

/// Complete service configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Stripe REST client
    pub stripe_client: StripeClientConfig,
    /// Webhook verification and processing
    pub webhook: StripeWebhookConfig,
    /// Checkout session settings
    pub checkout: CheckoutConfig,
    /// Allowed browser origins
    pub cors: CorsConfig,
}

impl AppConfig {
    /// Load every section from the environment
    pub fn from_env() -> Result<Self> {
        let stripe_client = StripeClientConfig::from_env().map_err(|e| Error::Config(e.to_string()))?;
        let webhook = StripeWebhookConfig::from_env().map_err(|e| Error::Config(e.to_string()))?;
        let checkout = CheckoutConfig::from_env()?;
        let cors = CorsConfig::from_origin_list(&env::var("SHOP_CORS_ORIGINS").unwrap_or_default());

        Ok(Self {
            stripe_client,
            webhook,
            checkout,
            cors,
        })
    }

    /// Config for tests: fast retries, fake secrets, `https://shop.test` redirects
    pub fn test_config() -> Self {
        Self {
            stripe_client: StripeClientConfig::new("sk_test_dummy"),
            webhook: StripeWebhookConfig::test_config(),
            checkout: CheckoutConfig::test_config(),
            cors: CorsConfig::default(),
        }
    }
}
