//! Route sheet tests
//!
//! - Every line lands in exactly one bucket
//! - Remaining quantity never goes negative
//! - Zones follow the walking order

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{build_route_sheet, PickLine, RouteOrderTable, WAREHOUSE_RACK_ORDER};

fn warehouse() -> RouteOrderTable {
    RouteOrderTable::new(&WAREHOUSE_RACK_ORDER).unwrap()
}

fn line(id: &str, planned: i32, scanned: i32, stock: i64, cell: Option<&str>) -> PickLine {
    PickLine {
        product_id: id.to_string(),
        name: Some(format!("Product {}", id)),
        article: None,
        barcode: None,
        image_url: None,
        planned_qty: planned,
        scanned_qty: scanned,
        stock: Decimal::from(stock),
        cell_address: cell.map(str::to_string),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_overscan_floors_at_zero() {
        let over = line("a", 3, 5, 10, Some("Стеллаж 1 полка 1 ячейка A"));
        assert_eq!(over.qty_to_collect(), 0);
        assert!(!over.is_collectible());

        let sheet = build_route_sheet(vec![over], &warehouse());
        assert_eq!(sheet.total_to_collect, 0);
        assert!(sheet.zones.is_empty());
        assert_eq!(sheet.completed_count, 1);
    }

    #[test]
    fn test_zones_in_walking_order() {
        let lines = vec![
            line("a", 1, 0, 5, Some("Стеллаж 1 полка 1 ячейка A")),
            line("b", 2, 0, 5, Some("Стеллаж 52 полка 1 ячейка A")),
            line("c", 3, 1, 5, Some("Стеллаж 41 полка 2 ячейка A")),
            line("d", 1, 0, 5, Some("Стеллаж 41 полка 1 ячейка B")),
        ];
        let sheet = build_route_sheet(lines, &warehouse());

        let racks: Vec<u32> = sheet.zones.iter().map(|z| z.rack).collect();
        assert_eq!(racks, vec![41, 52, 1]);

        let first_zone: Vec<&str> = sheet.zones[0]
            .lines
            .iter()
            .map(|l| l.line.product_id.as_str())
            .collect();
        assert_eq!(first_zone, vec!["d", "c"]);
        assert_eq!(sheet.total_to_collect, 1 + 2 + 2 + 1);
        assert_eq!(sheet.zoned_count, 4);
    }

    #[test]
    fn test_buckets() {
        let lines = vec![
            line("zoned", 1, 0, 5, Some("Стеллаж 7")),
            line("unrouted", 1, 0, 5, Some("Паллет у ворот")),
            line("no-address", 1, 0, 5, None),
            line("empty", 2, 0, 0, Some("Стеллаж 7 полка 1 ячейка A")),
            line("done", 2, 2, 5, Some("Стеллаж 7 полка 1 ячейка A")),
        ];
        let sheet = build_route_sheet(lines, &warehouse());

        assert_eq!(sheet.zoned_count, 1);
        assert_eq!(sheet.no_location_count, 2);
        assert_eq!(sheet.no_stock_count, 1);
        assert_eq!(sheet.completed_count, 1);
        assert_eq!(sheet.no_stock[0].line.product_id, "empty");
        // unrouted lines do not count toward the walk
        assert_eq!(sheet.total_to_collect, 1);
    }

    #[test]
    fn test_unknown_rack_zone_after_known() {
        let lines = vec![
            line("x", 1, 0, 5, Some("Стеллаж 99")),
            line("y", 1, 0, 5, Some("Стеллаж 43")),
        ];
        let sheet = build_route_sheet(lines, &warehouse());
        let racks: Vec<u32> = sheet.zones.iter().map(|z| z.rack).collect();
        assert_eq!(racks, vec![43, 99]);
    }

    #[test]
    fn test_rebuild_is_identical() {
        let lines = vec![
            line("a", 1, 0, 5, Some("Стеллаж 3 полка 1 ячейка A")),
            line("b", 4, 1, 0, None),
        ];
        let table = warehouse();
        assert_eq!(
            build_route_sheet(lines.clone(), &table),
            build_route_sheet(lines, &table)
        );
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn cell_strategy() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some("Паллет".to_string())),
            (1u32..120, prop::option::of(1u32..6), prop::option::of("[A-D]"))
                .prop_map(|(rack, shelf, cell)| {
                    let mut label = format!("Стеллаж {}", rack);
                    if let Some(s) = shelf {
                        label.push_str(&format!(" полка {}", s));
                    }
                    if let Some(c) = cell {
                        label.push_str(&format!(" ячейка {}", c));
                    }
                    Some(label)
                }),
        ]
    }

    fn line_strategy() -> impl Strategy<Value = PickLine> {
        (0i32..10, 0i32..12, -2i64..20, cell_strategy()).prop_map(
            |(planned, scanned, stock, cell)| PickLine {
                product_id: format!("p-{}-{}", planned, scanned),
                name: None,
                article: None,
                barcode: None,
                image_url: None,
                planned_qty: planned,
                scanned_qty: scanned,
                stock: Decimal::from(stock),
                cell_address: cell,
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Buckets are disjoint and cover every input line
        #[test]
        fn prop_partition_is_total(lines in prop::collection::vec(line_strategy(), 0..40)) {
            let input = lines.len();
            let sheet = build_route_sheet(lines, &warehouse());

            let zoned: usize = sheet.zones.iter().map(|z| z.lines.len()).sum();
            prop_assert_eq!(zoned, sheet.zoned_count);
            prop_assert_eq!(sheet.no_location.len(), sheet.no_location_count);
            prop_assert_eq!(sheet.no_stock.len(), sheet.no_stock_count);
            prop_assert_eq!(
                sheet.zoned_count + sheet.no_location_count + sheet.no_stock_count + sheet.completed_count,
                input
            );
        }

        /// Remaining quantity is never negative
        #[test]
        fn prop_remaining_floor(planned in 0i32..100, scanned in 0i32..200) {
            let l = line("p", planned, scanned, 1, None);
            prop_assert!(l.qty_to_collect() >= 0);
            prop_assert_eq!(l.qty_to_collect(), (planned - scanned).max(0));
        }

        /// Zones never repeat a rack and follow rank order
        #[test]
        fn prop_zones_monotonic(lines in prop::collection::vec(line_strategy(), 0..40)) {
            let table = warehouse();
            let sheet = build_route_sheet(lines, &table);
            for pair in sheet.zones.windows(2) {
                prop_assert!(table.rank(Some(pair[0].rack)) < table.rank(Some(pair[1].rack)));
            }
            let total: i64 = sheet
                .zones
                .iter()
                .flat_map(|z| z.lines.iter())
                .map(|l| i64::from(l.qty_to_collect))
                .sum();
            prop_assert_eq!(total, sheet.total_to_collect);
        }
    }
}
