//! Checkout Intent metadata schema
//!
//! The cart snapshot travels to the payment provider as customer metadata and
//! comes back, unchanged, when the session completes. It is the only record of
//! what was bought, so decoding fails closed: anything that does not match
//! version `1` exactly is a [`Error::MalformedIntent`].
//!
//! Layout (all values are strings):
//!
//! ```text
//! buyer_id        = <buyer>
//! intent_version  = "1"
//! cart            = [{"product_id","size","color","quantity","buyer_id"}, ...]
//! ```
//!
//! Provider metadata values are capped at 500 characters. Longer carts are
//! split into `cart_0 .. cart_{n-1}` with the count in `cart_parts`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::checkout::pricing::CartLineItem;
use crate::error::{Error, Result};

/// Schema version written by this crate
pub const INTENT_VERSION: &str = "1";

/// Metadata key holding the buyer reference
pub const BUYER_ID_KEY: &str = "buyer_id";
/// Metadata key holding the schema version
pub const VERSION_KEY: &str = "intent_version";
/// Metadata key holding the serialized cart when it fits one value
pub const CART_KEY: &str = "cart";
/// Metadata key holding the chunk count for split carts
pub const CART_PARTS_KEY: &str = "cart_parts";

/// Longest metadata value the provider accepts, in characters
pub const MAX_VALUE_CHARS: usize = 500;
/// Most metadata keys the provider accepts per object
pub const MAX_KEYS: usize = 50;

/// One purchased line as captured at session creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentLineItem {
    /// Product reference
    pub product_id: String,
    /// Chosen size
    pub size: String,
    /// Chosen color
    pub color: String,
    /// Units ordered
    pub quantity: u32,
    /// Buyer reference, repeated per line
    pub buyer_id: String,
}

/// Immutable snapshot of a checkout attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutIntent {
    /// Buyer reference
    pub buyer_id: String,
    /// Lines in cart order; the index is the line's dedupe position
    pub items: Vec<IntentLineItem>,
}

impl CheckoutIntent {
    /// Snapshot a cart; prices are deliberately left out
    pub fn from_cart(buyer_id: &str, cart: &[CartLineItem]) -> Self {
        let items = cart
            .iter()
            .map(|line| IntentLineItem {
                product_id: line.product_id.clone(),
                size: line.size.clone(),
                color: line.color.clone(),
                quantity: line.quantity,
                buyer_id: buyer_id.to_string(),
            })
            .collect();

        Self {
            buyer_id: buyer_id.to_string(),
            items,
        }
    }

    /// Encode as provider metadata
    pub fn to_metadata(&self) -> Result<BTreeMap<String, String>> {
        if self.buyer_id.chars().count() > MAX_VALUE_CHARS {
            return Err(Error::validation("buyer id too long for provider metadata"));
        }

        let cart = serde_json::to_string(&self.items)?;
        let mut metadata = BTreeMap::new();
        metadata.insert(BUYER_ID_KEY.to_string(), self.buyer_id.clone());
        metadata.insert(VERSION_KEY.to_string(), INTENT_VERSION.to_string());

        let chars: Vec<char> = cart.chars().collect();
        if chars.len() <= MAX_VALUE_CHARS {
            metadata.insert(CART_KEY.to_string(), cart);
            return Ok(metadata);
        }

        let parts: Vec<String> = chars
            .chunks(MAX_VALUE_CHARS)
            .map(|chunk| chunk.iter().collect())
            .collect();
        if parts.len() + 3 > MAX_KEYS {
            return Err(Error::validation(format!(
                "cart of {} lines is too large for provider metadata",
                self.items.len()
            )));
        }

        metadata.insert(CART_PARTS_KEY.to_string(), parts.len().to_string());
        for (i, part) in parts.into_iter().enumerate() {
            metadata.insert(format!("{}_{}", CART_KEY, i), part);
        }
        Ok(metadata)
    }

    /// Decode provider metadata, rejecting anything off-schema
    pub fn from_metadata(metadata: &BTreeMap<String, String>) -> Result<Self> {
        match metadata.get(VERSION_KEY).map(String::as_str) {
            Some(INTENT_VERSION) => {}
            Some(other) => {
                return Err(Error::malformed_intent(format!(
                    "unsupported intent version {:?}",
                    other
                )))
            }
            None => return Err(Error::malformed_intent("intent version missing")),
        }

        let buyer_id = metadata
            .get(BUYER_ID_KEY)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| Error::malformed_intent("buyer reference missing"))?
            .clone();

        let cart = Self::reassemble_cart(metadata)?;
        let items: Vec<IntentLineItem> = serde_json::from_str(&cart)
            .map_err(|e| Error::malformed_intent(format!("cart unparsable: {}", e)))?;

        if items.is_empty() {
            return Err(Error::malformed_intent("cart is empty"));
        }
        for (index, item) in items.iter().enumerate() {
            if item.quantity == 0 {
                return Err(Error::malformed_intent(format!(
                    "line {} has zero quantity",
                    index
                )));
            }
            if item.product_id.is_empty() {
                return Err(Error::malformed_intent(format!(
                    "line {} has no product reference",
                    index
                )));
            }
            if item.buyer_id != buyer_id {
                return Err(Error::malformed_intent(format!(
                    "line {} belongs to a different buyer",
                    index
                )));
            }
        }

        Ok(Self { buyer_id, items })
    }

    fn reassemble_cart(metadata: &BTreeMap<String, String>) -> Result<String> {
        if let Some(cart) = metadata.get(CART_KEY) {
            return Ok(cart.clone());
        }

        let parts: usize = metadata
            .get(CART_PARTS_KEY)
            .ok_or_else(|| Error::malformed_intent("cart missing"))?
            .parse()
            .map_err(|_| Error::malformed_intent("cart part count unparsable"))?;
        if parts == 0 || parts > MAX_KEYS {
            return Err(Error::malformed_intent("cart part count out of range"));
        }

        let mut cart = String::new();
        for i in 0..parts {
            let part = metadata
                .get(&format!("{}_{}", CART_KEY, i))
                .ok_or_else(|| Error::malformed_intent(format!("cart part {} missing", i)))?;
            cart.push_str(part);
        }
        Ok(cart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cart_line(product: &str, quantity: u32) -> CartLineItem {
        CartLineItem {
            product_id: product.to_string(),
            title: format!("Title {}", product),
            size: "L".to_string(),
            color: "navy".to_string(),
            quantity,
            price: 1000,
            discount: 10,
        }
    }

    #[test]
    fn test_snapshot_round_trips_through_metadata() {
        let intent = CheckoutIntent::from_cart("B1", &[cart_line("P1", 3), cart_line("P2", 1)]);
        let metadata = intent.to_metadata().unwrap();

        assert_eq!(metadata[VERSION_KEY], "1");
        assert_eq!(metadata[BUYER_ID_KEY], "B1");
        assert!(!metadata[CART_KEY].contains("price"));
        assert_eq!(CheckoutIntent::from_metadata(&metadata).unwrap(), intent);
    }

    #[test]
    fn test_large_cart_is_chunked() {
        let cart: Vec<_> = (0..20).map(|i| cart_line(&format!("PRODUCT-{}", i), 1)).collect();
        let intent = CheckoutIntent::from_cart("B1", &cart);
        let metadata = intent.to_metadata().unwrap();

        assert!(!metadata.contains_key(CART_KEY));
        let parts: usize = metadata[CART_PARTS_KEY].parse().unwrap();
        assert!(parts > 1);
        assert!(metadata
            .values()
            .all(|value| value.chars().count() <= MAX_VALUE_CHARS));
        assert_eq!(CheckoutIntent::from_metadata(&metadata).unwrap(), intent);
    }

    #[test]
    fn test_oversized_cart_rejected() {
        let cart: Vec<_> = (0..400).map(|i| cart_line(&format!("PRODUCT-{}", i), 1)).collect();
        let err = CheckoutIntent::from_cart("B1", &cart).to_metadata().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_missing_or_wrong_version_fails_closed() {
        let mut metadata = CheckoutIntent::from_cart("B1", &[cart_line("P1", 1)])
            .to_metadata()
            .unwrap();

        metadata.insert(VERSION_KEY.into(), "2".into());
        assert!(matches!(
            CheckoutIntent::from_metadata(&metadata),
            Err(Error::MalformedIntent(_))
        ));

        metadata.remove(VERSION_KEY);
        assert!(matches!(
            CheckoutIntent::from_metadata(&metadata),
            Err(Error::MalformedIntent(_))
        ));
    }

    #[test]
    fn test_schema_mismatch_fails_closed() {
        let mut metadata = BTreeMap::new();
        metadata.insert(VERSION_KEY.to_string(), "1".to_string());
        metadata.insert(BUYER_ID_KEY.to_string(), "B1".to_string());

        // extra field
        metadata.insert(
            CART_KEY.to_string(),
            r#"[{"product_id":"P1","size":"M","color":"red","quantity":1,"buyer_id":"B1","price":1}]"#
                .to_string(),
        );
        assert!(CheckoutIntent::from_metadata(&metadata).is_err());

        // empty cart
        metadata.insert(CART_KEY.to_string(), "[]".to_string());
        assert!(CheckoutIntent::from_metadata(&metadata).is_err());

        // zero quantity
        metadata.insert(
            CART_KEY.to_string(),
            r#"[{"product_id":"P1","size":"M","color":"red","quantity":0,"buyer_id":"B1"}]"#
                .to_string(),
        );
        assert!(CheckoutIntent::from_metadata(&metadata).is_err());

        // line for another buyer
        metadata.insert(
            CART_KEY.to_string(),
            r#"[{"product_id":"P1","size":"M","color":"red","quantity":1,"buyer_id":"B2"}]"#
                .to_string(),
        );
        assert!(CheckoutIntent::from_metadata(&metadata).is_err());

        // not JSON
        metadata.insert(CART_KEY.to_string(), "P1,M,red,1".to_string());
        assert!(CheckoutIntent::from_metadata(&metadata).is_err());
    }

    #[test]
    fn test_missing_chunk_fails_closed() {
        let cart: Vec<_> = (0..20).map(|i| cart_line(&format!("PRODUCT-{}", i), 1)).collect();
        let mut metadata = CheckoutIntent::from_cart("B1", &cart).to_metadata().unwrap();
        metadata.remove("cart_1");
        assert!(matches!(
            CheckoutIntent::from_metadata(&metadata),
            Err(Error::MalformedIntent(_))
        ));
    }
}
