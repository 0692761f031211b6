//! Checkout session settings

use std::env;

use url::Url;

use crate::error::{Error, Result};
use crate::stripe::client::{ShippingRate, SESSION_ID_PLACEHOLDER};

/// Default ISO currency code
pub const DEFAULT_CURRENCY: &str = "usd";

/// Default shipping destinations
pub const DEFAULT_ALLOWED_COUNTRIES: [&str; 2] = ["US", "CA"];

/// Settings the Checkout Session Initiator applies to every session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutConfig {
    /// Storefront base URL the provider redirects back to, without a trailing slash
    pub client_url: String,
    /// ISO currency code, lowercase
    pub currency: String,
    /// ISO country codes shipping may be collected for
    pub allowed_countries: Vec<String>,
    /// The single shipping option offered
    pub shipping_rate: ShippingRate,
}

impl CheckoutConfig {
    /// Defaults for everything except the client URL
    pub fn new(client_url: Url) -> Self {
        Self::with_base(client_url.as_str())
    }

    fn with_base(base: &str) -> Self {
        Self {
            client_url: base.trim_end_matches('/').to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
            allowed_countries: DEFAULT_ALLOWED_COUNTRIES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            shipping_rate: ShippingRate::free(),
        }
    }

    /// Load from `SHOP_CLIENT_URL`, `SHOP_CURRENCY`, `SHOP_ALLOWED_COUNTRIES`
    pub fn from_env() -> Result<Self> {
        let raw = env::var("SHOP_CLIENT_URL")
            .map_err(|_| Error::Config("SHOP_CLIENT_URL environment variable not set".into()))?;
        let mut config = Self::new(parse_client_url(&raw)?);

        if let Ok(currency) = env::var("SHOP_CURRENCY") {
            let currency = currency.trim().to_ascii_lowercase();
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(Error::Config(format!(
                    "SHOP_CURRENCY must be a 3-letter code, got {:?}",
                    currency
                )));
            }
            config.currency = currency;
        }

        if let Ok(countries) = env::var("SHOP_ALLOWED_COUNTRIES") {
            let countries = parse_countries(&countries);
            if countries.is_empty() {
                return Err(Error::Config(
                    "SHOP_ALLOWED_COUNTRIES must name at least one country".into(),
                ));
            }
            config.allowed_countries = countries;
        }

        Ok(config)
    }

    /// Config for tests, redirecting to `https://shop.test`
    pub fn test_config() -> Self {
        Self::with_base("https://shop.test")
    }

    /// Redirect after payment
    pub fn success_url(&self) -> String {
        format!(
            "{}/checkout-success?session_id={}",
            self.client_url, SESSION_ID_PLACEHOLDER
        )
    }

    /// Redirect when the buyer abandons the payment page
    pub fn cancel_url(&self) -> String {
        format!("{}/cart?session_id={}", self.client_url, SESSION_ID_PLACEHOLDER)
    }
}

/// Parse and check a storefront base URL
pub fn parse_client_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| Error::Config(format!("SHOP_CLIENT_URL is not a valid URL: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::Config(format!(
            "SHOP_CLIENT_URL must be http or https, got {}",
            other
        ))),
    }
}

fn parse_countries(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirects_carry_session_placeholder() {
        let config = CheckoutConfig::new(Url::parse("https://shop.example.com/").unwrap());
        assert_eq!(
            config.success_url(),
            "https://shop.example.com/checkout-success?session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(
            config.cancel_url(),
            "https://shop.example.com/cart?session_id={CHECKOUT_SESSION_ID}"
        );
    }

    #[test]
    fn test_defaults() {
        let config = CheckoutConfig::test_config();
        assert_eq!(config.client_url, "https://shop.test");
        assert_eq!(
            config.cancel_url(),
            "https://shop.test/cart?session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(config.currency, "usd");
        assert_eq!(config.allowed_countries, vec!["US", "CA"]);
        assert_eq!(config.shipping_rate.amount, 0);
    }

    #[test]
    fn test_client_url_must_be_web() {
        assert!(parse_client_url("https://shop.test").is_ok());
        assert!(parse_client_url("ftp://shop.test").is_err());
        assert!(parse_client_url("not a url").is_err());
    }

    #[test]
    fn test_country_list_parsing() {
        assert_eq!(parse_countries(" us, ca ,,gb"), vec!["US", "CA", "GB"]);
        assert!(parse_countries(" , ").is_empty());
    }
}
