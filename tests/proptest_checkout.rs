//! Property-based tests for pricing, intent encoding and order stock application.

use proptest::prelude::*;

use shopfront_payments::checkout::intent::{CART_KEY, CART_PARTS_KEY, MAX_KEYS, MAX_VALUE_CHARS};
use shopfront_payments::checkout::{discounted_unit_amount, CheckoutIntent, IntentLineItem};
use shopfront_payments::store::{
    InMemoryStore, InsertOutcome, LineItemKey, NewOrder, Product, ShippingAddress,
    StockApplication, Store,
};

// ============================================================================
// STRATEGIES
// ============================================================================

fn arb_line(buyer_id: String) -> impl Strategy<Value = IntentLineItem> {
    (
        "[A-Za-z0-9]{1,24}",
        prop_oneof![Just("S"), Just("M"), Just("XL"), Just("")],
        "[a-z ]{0,12}",
        1u32..100,
    )
        .prop_map(move |(product_id, size, color, quantity)| IntentLineItem {
            product_id,
            size: size.to_string(),
            color,
            quantity,
            buyer_id: buyer_id.clone(),
        })
}

fn arb_intent() -> impl Strategy<Value = CheckoutIntent> {
    "[A-Za-z0-9]{1,24}".prop_flat_map(|buyer_id| {
        prop::collection::vec(arb_line(buyer_id.clone()), 1..30).prop_map(move |items| {
            CheckoutIntent {
                buyer_id: buyer_id.clone(),
                items,
            }
        })
    })
}

// ============================================================================
// PRICING
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn discount_matches_half_up_rounding(price in 0i64..10_000_000, discount in 0u32..=100) {
        let amount = discounted_unit_amount(price, discount).unwrap();
        let scaled = price * i64::from(100 - discount);
        let expected = scaled / 100 + i64::from(scaled % 100 >= 50);
        prop_assert_eq!(amount, expected);
    }

    #[test]
    fn discounted_amount_stays_within_price(price in 0i64..i64::MAX / 2, discount in 0u32..=100) {
        let amount = discounted_unit_amount(price, discount).unwrap();
        prop_assert!(amount >= 0);
        prop_assert!(amount <= price);
    }

    #[test]
    fn larger_discount_never_costs_more(price in 0i64..10_000_000, a in 0u32..=100, b in 0u32..=100) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            discounted_unit_amount(price, high).unwrap() <= discounted_unit_amount(price, low).unwrap()
        );
    }

    #[test]
    fn out_of_range_inputs_are_rejected(price in i64::MIN..0, discount in 101u32..10_000) {
        prop_assert!(discounted_unit_amount(price, 0).is_err());
        prop_assert!(discounted_unit_amount(0, discount).is_err());
    }
}

// ============================================================================
// INTENT METADATA
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn metadata_respects_provider_limits(intent in arb_intent()) {
        let metadata = intent.to_metadata().unwrap();

        prop_assert!(metadata.len() <= MAX_KEYS);
        for value in metadata.values() {
            prop_assert!(value.chars().count() <= MAX_VALUE_CHARS);
        }
        prop_assert!(metadata.contains_key(CART_KEY) != metadata.contains_key(CART_PARTS_KEY));
        prop_assert_eq!(CheckoutIntent::from_metadata(&metadata).unwrap(), intent);
    }
}

// ============================================================================
// STOCK
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn stock_never_goes_negative(
        initial in 0i64..500,
        quantities in prop::collection::vec(0u32..200, 0..20),
    ) {
        let store = InMemoryStore::new();
        store.insert_product(Product {
            id: "P1".into(),
            title: "Tee".into(),
            stock: initial,
        });

        let mut expected = initial;
        for (index, quantity) in quantities.into_iter().enumerate() {
            let order = NewOrder {
                product_id: "P1".into(),
                buyer_id: "B1".into(),
                size: "M".into(),
                color: "black".into(),
                quantity,
                shipping_address: ShippingAddress::default(),
                review_eligible: true,
            };
            let inserted =
                tokio_test::block_on(store.insert_order(&LineItemKey::new("evt", index), order)).unwrap();
            let InsertOutcome::Created(order) = inserted else {
                panic!("fresh key reported an existing order");
            };

            let applied = tokio_test::block_on(store.apply_order_stock(order.id)).unwrap();
            expected = (expected - i64::from(quantity)).max(0);
            prop_assert_eq!(applied, StockApplication::Applied { remaining: expected });

            let again = tokio_test::block_on(store.apply_order_stock(order.id)).unwrap();
            prop_assert_eq!(again, StockApplication::AlreadyApplied);
        }
        prop_assert_eq!(store.stock_of("P1"), Some(expected));
    }
}
