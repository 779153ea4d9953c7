//! Stock merge tests
//!
//! - Every key keeps the largest quantity, never a sum
//! - Resolution order: id, barcodes, article, sku

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{merge_stock, StockRecord};

fn record(id: Option<&str>, barcodes: &[&str], article: Option<&str>, qty: i64) -> StockRecord {
    StockRecord {
        product_id: id.map(str::to_string),
        barcodes: barcodes.iter().map(|b| b.to_string()).collect(),
        article: article.map(str::to_string),
        sku: None,
        code: None,
        quantity: Decimal::from(qty),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_max_not_sum() {
        let rows = vec![
            record(Some("p1"), &["460"], Some("A-1"), 5),
            record(Some("p1"), &["460"], Some("A-1"), 12),
        ];
        let index = merge_stock(&rows);
        assert_eq!(index.by_id["p1"], Decimal::from(12));
        assert_eq!(index.by_barcode["460"], Decimal::from(12));
        assert_eq!(index.by_article["A-1"], Decimal::from(12));
    }

    #[test]
    fn test_one_row_updates_every_key() {
        let rows = vec![record(Some("p1"), &["1", "2", "3"], None, 7)];
        let index = merge_stock(&rows);
        assert_eq!(index.by_id.len(), 1);
        assert_eq!(index.by_barcode.len(), 3);
        assert!(index.by_barcode.values().all(|q| *q == Decimal::from(7)));
    }

    #[test]
    fn test_resolve_prefers_id() {
        let rows = vec![
            record(Some("p1"), &[], None, 3),
            record(None, &["460"], None, 40),
        ];
        let index = merge_stock(&rows);
        assert_eq!(
            index.resolve(Some("p1"), &["460"], None, None),
            Decimal::from(3)
        );
    }

    #[test]
    fn test_resolve_falls_through_zero() {
        let rows = vec![
            record(Some("p1"), &[], None, 0),
            record(None, &["999"], None, 0),
            record(None, &["460"], None, 8),
            record(None, &[], Some("A-1"), 20),
        ];
        let index = merge_stock(&rows);

        // zero id stock falls through to the first barcode with stock
        assert_eq!(
            index.resolve(Some("p1"), &["999", "460"], Some("A-1"), None),
            Decimal::from(8)
        );
        // no barcode hit reaches the article
        assert_eq!(
            index.resolve(Some("p1"), &["999"], Some("A-1"), None),
            Decimal::from(20)
        );
        // sku shares the article namespace
        assert_eq!(
            index.resolve::<&str>(None, &[], None, Some("A-1")),
            Decimal::from(20)
        );
        assert_eq!(index.resolve::<&str>(Some("nope"), &[], None, None), Decimal::ZERO);
    }

    #[test]
    fn test_empty_report() {
        let index = merge_stock(&Vec::<StockRecord>::new());
        assert!(index.is_empty());
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Merged quantity equals the maximum of the rows, regardless of order
        #[test]
        fn prop_max_wins(quantities in prop::collection::vec(0i64..1000, 1..20)) {
            let rows: Vec<StockRecord> = quantities
                .iter()
                .map(|q| record(Some("p1"), &["460"], Some("A-1"), *q))
                .collect();
            let expected = Decimal::from(*quantities.iter().max().unwrap());

            let index = merge_stock(&rows);
            prop_assert_eq!(index.by_id["p1"], expected);
            prop_assert_eq!(index.by_barcode["460"], expected);
            prop_assert_eq!(index.by_article["A-1"], expected);

            let mut reversed = rows.clone();
            reversed.reverse();
            prop_assert_eq!(merge_stock(&reversed), index);
        }

        /// Keys are independent: each takes the max over rows carrying it
        #[test]
        fn prop_keys_independent(a in 0i64..100, b in 0i64..100) {
            let rows = vec![
                record(Some("p1"), &["shared"], None, a),
                record(Some("p2"), &["shared"], None, b),
            ];
            let index = merge_stock(&rows);
            prop_assert_eq!(index.by_id["p1"], Decimal::from(a));
            prop_assert_eq!(index.by_id["p2"], Decimal::from(b));
            prop_assert_eq!(index.by_barcode["shared"], Decimal::from(a.max(b)));
        }
    }
}
