//! Line-item pricing
//!
//! Prices are carried in minor currency units (cents). Discounts are whole
//! percentages. The discounted unit amount is
//! `round(price - price * discount / 100)`, rounded half up, computed in
//! integer arithmetic so no floating-point error can creep in.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest accepted discount
pub const MAX_DISCOUNT_PERCENT: u32 = 100;

/// Cart entry as submitted by the buyer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineItem {
    /// Product reference
    pub product_id: String,
    /// Display title forwarded to the payment page
    pub title: String,
    /// Chosen size
    #[serde(default)]
    pub size: String,
    /// Chosen color
    #[serde(default)]
    pub color: String,
    /// Units ordered
    pub quantity: u32,
    /// Unit price in minor units
    pub price: i64,
    /// Discount in whole percent
    #[serde(default)]
    pub discount: u32,
}

impl CartLineItem {
    /// Reject entries that cannot be priced or fulfilled
    pub fn validate(&self) -> Result<()> {
        if self.product_id.trim().is_empty() {
            return Err(Error::validation("product_id must not be empty"));
        }
        if self.quantity == 0 {
            return Err(Error::validation(format!(
                "quantity for {} must be at least 1",
                self.product_id
            )));
        }
        if self.price < 0 {
            return Err(Error::validation(format!(
                "price for {} must not be negative",
                self.product_id
            )));
        }
        if self.discount > MAX_DISCOUNT_PERCENT {
            return Err(Error::validation(format!(
                "discount for {} must be between 0 and {}",
                self.product_id, MAX_DISCOUNT_PERCENT
            )));
        }
        Ok(())
    }

    /// Discounted unit amount for this entry
    pub fn unit_amount(&self) -> Result<i64> {
        discounted_unit_amount(self.price, self.discount)
    }
}

/// `round(price - price * discount / 100)` in minor units, half rounded up
pub fn discounted_unit_amount(price: i64, discount_percent: u32) -> Result<i64> {
    if price < 0 {
        return Err(Error::validation("price must not be negative"));
    }
    if discount_percent > MAX_DISCOUNT_PERCENT {
        return Err(Error::validation(format!(
            "discount must be between 0 and {}",
            MAX_DISCOUNT_PERCENT
        )));
    }

    let kept = i128::from(MAX_DISCOUNT_PERCENT - discount_percent);
    let scaled = i128::from(price) * kept;
    let rounded = (scaled + 50) / 100;

    i64::try_from(rounded).map_err(|_| Error::validation("unit amount out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: u32, price: i64, discount: u32) -> CartLineItem {
        CartLineItem {
            product_id: "P1".into(),
            title: "Tee".into(),
            size: "M".into(),
            color: "black".into(),
            quantity,
            price,
            discount,
        }
    }

    #[test]
    fn test_ten_percent_off_one_thousand() {
        assert_eq!(discounted_unit_amount(1000, 10).unwrap(), 900);
    }

    #[test]
    fn test_rounding_half_up() {
        // 999 * 0.85 = 849.15
        assert_eq!(discounted_unit_amount(999, 15).unwrap(), 849);
        // 1 * 0.5 = 0.5
        assert_eq!(discounted_unit_amount(1, 50).unwrap(), 1);
        // 3 * 0.75 = 2.25
        assert_eq!(discounted_unit_amount(3, 25).unwrap(), 2);
        // 7 * 0.5 = 3.5
        assert_eq!(discounted_unit_amount(7, 50).unwrap(), 4);
    }

    #[test]
    fn test_bounds() {
        assert_eq!(discounted_unit_amount(1234, 0).unwrap(), 1234);
        assert_eq!(discounted_unit_amount(1234, 100).unwrap(), 0);
        assert!(discounted_unit_amount(1234, 101).is_err());
        assert!(discounted_unit_amount(-1, 0).is_err());
        assert_eq!(
            discounted_unit_amount(i64::MAX, 0).unwrap(),
            i64::MAX
        );
    }

    #[test]
    fn test_validate_line_item() {
        item(1, 1000, 10).validate().unwrap();
        assert!(item(0, 1000, 10).validate().is_err());
        assert!(item(1, -5, 10).validate().is_err());
        assert!(item(1, 1000, 120).validate().is_err());

        let mut blank = item(1, 1000, 0);
        blank.product_id = "  ".into();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_cart_item_deserializes_with_defaults() {
        let json = r#"{"product_id":"P1","title":"Tee","quantity":2,"price":1500}"#;
        let item: CartLineItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.discount, 0);
        assert_eq!(item.size, "");
        assert_eq!(item.unit_amount().unwrap(), 1500);
    }
}
