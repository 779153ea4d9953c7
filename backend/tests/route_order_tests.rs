//! Warehouse walking order tests
//!
//! - Known racks follow the table, not numeric order
//! - Unknown racks after known ones, lines without a rack last
//! - Table construction errors

use proptest::prelude::*;
use shared::{parse_cell_address, RouteOrderTable, RouteRank, RouteTableError, WAREHOUSE_RACK_ORDER};
use std::cmp::Ordering;

fn warehouse() -> RouteOrderTable {
    RouteOrderTable::new(&WAREHOUSE_RACK_ORDER).unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_walking_order_not_numeric() {
        let table = warehouse();
        let mut racks = vec![1u32, 52, 41];
        racks.sort_by_key(|r| table.rank(Some(*r)));
        assert_eq!(racks, vec![41, 52, 1]);
    }

    #[test]
    fn test_table_positions() {
        let table = warehouse();
        assert_eq!(table.rank(Some(41)).value(), 0);
        assert_eq!(table.rank(Some(52)).value(), 6);
        assert_eq!(table.rank(Some(1)).value(), 42);
        assert_eq!(table.order().len(), 52);
    }

    #[test]
    fn test_unknown_rack_between_known_and_missing() {
        let table = warehouse();
        assert!(!table.contains(99));
        assert_eq!(table.rank(Some(99)).value(), 1099);
        assert!(table.rank(Some(43)) < table.rank(Some(99)));
        assert!(table.rank(Some(99)) < table.rank(None));
        assert_eq!(table.rank(None), RouteRank::UNROUTED);
    }

    #[test]
    fn test_unknown_racks_keep_numeric_order() {
        let table = warehouse();
        assert!(table.rank(Some(60)) < table.rank(Some(99)));
    }

    #[test]
    fn test_shelf_then_cell_within_rack() {
        let table = warehouse();
        let a = parse_cell_address(Some("Стеллаж 5 полка 1 ячейка B"));
        let b = parse_cell_address(Some("Стеллаж 5 полка 2 ячейка A"));
        let c = parse_cell_address(Some("Стеллаж 5 полка 1 ячейка a"));
        assert_eq!(table.compare(&a, &b), Ordering::Less);
        assert_eq!(table.compare(&c, &a), Ordering::Less);
    }

    #[test]
    fn test_missing_shelf_sorts_last_missing_cell_first() {
        let table = warehouse();
        let no_shelf = parse_cell_address(Some("Стеллаж 5 ячейка A"));
        let shelf = parse_cell_address(Some("Стеллаж 5 полка 9 ячейка A"));
        assert_eq!(table.compare(&shelf, &no_shelf), Ordering::Less);

        let no_cell = parse_cell_address(Some("Стеллаж 5 полка 9"));
        assert_eq!(table.compare(&no_cell, &shelf), Ordering::Less);
    }

    #[test]
    fn test_invalid_tables() {
        assert_eq!(RouteOrderTable::new(&[]), Err(RouteTableError::Empty));
        assert_eq!(
            RouteOrderTable::new(&[3, 1, 3]),
            Err(RouteTableError::DuplicateRack(3))
        );
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn known_rack() -> impl Strategy<Value = u32> {
        prop::sample::select(WAREHOUSE_RACK_ORDER.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Every known rack precedes every unknown rack
        #[test]
        fn prop_known_before_unknown(known in known_rack(), unknown in 53u32..10_000) {
            let table = warehouse();
            prop_assert!(table.rank(Some(known)) < table.rank(Some(unknown)));
            prop_assert!(table.rank(Some(unknown)) < table.rank(None));
        }

        /// Sorting by rank reproduces the table's walking sequence
        #[test]
        fn prop_sort_matches_table(racks in prop::sample::subsequence(WAREHOUSE_RACK_ORDER.to_vec(), 0..52)) {
            let table = warehouse();
            let mut shuffled = racks.clone();
            shuffled.reverse();
            shuffled.sort_by_key(|r| table.rank(Some(*r)));
            prop_assert_eq!(shuffled, racks);
        }
    }
}
