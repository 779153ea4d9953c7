//! Slot reconciliation tests
//!
//! - Largest positive quantity wins
//! - Zero-stock and unknown slots never replace a known address
//! - An empty report preserves every prior location

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{reconcile, ProductLocation, SlotCandidate, SlotDirectory};
use std::collections::HashMap;

fn candidate(product: &str, slot: &str, qty: i64) -> SlotCandidate {
    SlotCandidate {
        product_id: product.to_string(),
        slot_id: slot.to_string(),
        quantity: Decimal::from(qty),
    }
}

fn directory() -> SlotDirectory {
    [
        ("s1", "Стеллаж 1 полка 1 ячейка A"),
        ("s2", "Стелаж.41, полка 2, ячейка b"),
        ("s3", "Стеллаж 7 полка 3 ячейка C"),
    ]
    .into_iter()
    .collect()
}

fn located(product: &str, slot: &str, label: &str) -> ProductLocation {
    ProductLocation {
        product_id: product.to_string(),
        cell_address: Some(label.to_string()),
        slot_id: Some(slot.to_string()),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_largest_quantity_wins() {
        let candidates = vec![candidate("p1", "s1", 2), candidate("p1", "s2", 9)];
        let outcome = reconcile(&candidates, &directory(), &HashMap::new());

        let location = &outcome.locations["p1"];
        assert_eq!(location.slot_id.as_deref(), Some("s2"));
        assert_eq!(
            location.cell_address.as_deref(),
            Some("Стеллаж 41 полка 2 ячейка B")
        );
        assert_eq!(outcome.resolved, 1);
        assert_eq!(outcome.updated_count(), 1);
    }

    #[test]
    fn test_zero_stock_candidate_keeps_prior() {
        let mut prior = HashMap::new();
        prior.insert(
            "p1".to_string(),
            located("p1", "s1", "Стеллаж 1 полка 1 ячейка A"),
        );

        let outcome = reconcile(&[candidate("p1", "s3", 0)], &directory(), &prior);
        assert_eq!(outcome.locations, prior);
        assert_eq!(outcome.preserved, 1);
        assert!(outcome.changed.is_empty());
    }

    #[test]
    fn test_unknown_slot_is_discarded() {
        let candidates = vec![candidate("p1", "missing", 50), candidate("p1", "s3", 1)];
        let outcome = reconcile(&candidates, &directory(), &HashMap::new());
        assert_eq!(outcome.locations["p1"].slot_id.as_deref(), Some("s3"));
    }

    #[test]
    fn test_empty_report_changes_nothing() {
        let mut prior = HashMap::new();
        prior.insert("p1".to_string(), located("p1", "s1", "old"));
        prior.insert("p2".to_string(), located("p2", "s2", "older"));

        let outcome = reconcile(&[], &directory(), &prior);
        assert_eq!(outcome.locations, prior);
        assert_eq!(outcome.updated_count(), 0);
    }

    #[test]
    fn test_unchanged_location_not_rewritten() {
        let mut prior = HashMap::new();
        prior.insert(
            "p1".to_string(),
            located("p1", "s3", "Стеллаж 7 полка 3 ячейка C"),
        );

        let outcome = reconcile(&[candidate("p1", "s3", 4)], &directory(), &prior);
        assert_eq!(outcome.resolved, 1);
        assert_eq!(outcome.updated_count(), 0);
    }

    #[test]
    fn test_products_absent_from_report_untouched() {
        let mut prior = HashMap::new();
        prior.insert("other".to_string(), located("other", "s1", "kept"));

        let outcome = reconcile(&[candidate("p1", "s1", 1)], &directory(), &prior);
        assert_eq!(outcome.locations["other"].cell_address.as_deref(), Some("kept"));
        assert!(outcome.locations.contains_key("p1"));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn candidate_strategy() -> impl Strategy<Value = SlotCandidate> {
        (
            prop::sample::select(vec!["p1", "p2", "p3", "p4"]),
            prop::sample::select(vec!["s1", "s2", "s3", "unknown"]),
            -3i64..30,
        )
            .prop_map(|(p, s, q)| candidate(p, s, q))
    }

    fn prior_strategy() -> impl Strategy<Value = HashMap<String, ProductLocation>> {
        prop::collection::vec(
            (
                prop::sample::select(vec!["p1", "p2", "p3", "p4", "p5"]),
                "[a-z]{3,8}",
            ),
            0..5,
        )
        .prop_map(|entries| {
            entries
                .into_iter()
                .map(|(p, label)| (p.to_string(), located(p, "old", &label)))
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Same input, same output
        #[test]
        fn prop_reconcile_idempotent(
            candidates in prop::collection::vec(candidate_strategy(), 0..30),
            prior in prior_strategy(),
        ) {
            let dir = directory();
            let first = reconcile(&candidates, &dir, &prior);
            let second = reconcile(&candidates, &dir, &prior);
            prop_assert_eq!(&first.locations, &second.locations);

            // applying the result again changes nothing further
            let again = reconcile(&candidates, &dir, &first.locations);
            prop_assert_eq!(&again.locations, &first.locations);
            prop_assert_eq!(again.updated_count(), 0);
        }

        /// Zero candidates preserve every prior location
        #[test]
        fn prop_preserve_on_empty(prior in prior_strategy()) {
            let outcome = reconcile(&[], &directory(), &prior);
            prop_assert_eq!(outcome.locations, prior);
        }

        /// Non-positive candidates never produce a location
        #[test]
        fn prop_non_positive_never_selected(
            quantities in prop::collection::vec(-5i64..=0, 1..6),
            prior in prior_strategy(),
        ) {
            let candidates: Vec<SlotCandidate> = quantities
                .iter()
                .map(|q| candidate("p1", "s1", *q))
                .collect();
            let outcome = reconcile(&candidates, &directory(), &prior);
            prop_assert_eq!(outcome.locations.get("p1"), prior.get("p1"));
        }

        /// Chosen slot always carries the maximum usable quantity
        #[test]
        fn prop_choice_is_maximum(candidates in prop::collection::vec(candidate_strategy(), 1..30)) {
            let dir = directory();
            let outcome = reconcile(&candidates, &dir, &HashMap::new());
            for (product, location) in &outcome.locations {
                let usable: Vec<&SlotCandidate> = candidates
                    .iter()
                    .filter(|c| &c.product_id == product)
                    .filter(|c| c.quantity > Decimal::ZERO && dir.label(&c.slot_id).is_some())
                    .collect();
                let best = usable.iter().map(|c| c.quantity).max().unwrap();
                let chosen = location.slot_id.as_deref().unwrap();
                prop_assert!(usable.iter().any(|c| c.slot_id == chosen && c.quantity == best));
            }
        }
    }
}
