//! Route sheet for a picking task
//!
//! Lines are split into what can be picked along the walking route, what can
//! be picked but has no rack, and what cannot be picked because there is no
//! stock. Pickable lines with a rack are sorted in walking order and grouped
//! into one zone per rack.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::address::{parse_cell_address, ParsedAddress};
use crate::route::RouteOrderTable;

/// One product line of a picking task with its current stock and location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickLine {
    pub product_id: String,
    pub name: Option<String>,
    pub article: Option<String>,
    pub barcode: Option<String>,
    pub image_url: Option<String>,
    pub planned_qty: i32,
    pub scanned_qty: i32,
    pub stock: Decimal,
    pub cell_address: Option<String>,
}

impl PickLine {
    /// Remaining quantity, never negative
    pub fn qty_to_collect(&self) -> i32 {
        (self.planned_qty - self.scanned_qty).max(0)
    }

    pub fn is_collectible(&self) -> bool {
        self.stock > Decimal::ZERO && self.qty_to_collect() > 0
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.stock <= Decimal::ZERO && self.planned_qty > 0
    }
}

/// A pick line with its parsed address
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteLine {
    #[serde(flatten)]
    pub line: PickLine,
    pub address: ParsedAddress,
    pub qty_to_collect: i32,
}

impl RouteLine {
    fn new(line: PickLine) -> Self {
        let address = parse_cell_address(line.cell_address.as_deref());
        let qty_to_collect = line.qty_to_collect();
        Self {
            line,
            address,
            qty_to_collect,
        }
    }
}

/// All route lines of one rack, in walking order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteZone {
    pub rack: u32,
    pub lines: Vec<RouteLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouteSheet {
    pub zones: Vec<RouteZone>,
    /// Pickable lines whose location has no rack
    pub no_location: Vec<RouteLine>,
    /// Lines that still need picking but have no stock
    pub no_stock: Vec<RouteLine>,
    /// Remaining quantity across all zoned lines
    pub total_to_collect: i64,
    pub zoned_count: usize,
    pub no_location_count: usize,
    pub no_stock_count: usize,
    /// Lines with nothing left to pick
    pub completed_count: usize,
}

/// Build the route sheet for a task's lines.
///
/// A line is zoned as soon as its rack is known; shelf and cell only order
/// lines within the rack. Every input line lands in exactly one bucket.
pub fn build_route_sheet(lines: Vec<PickLine>, table: &RouteOrderTable) -> RouteSheet {
    let mut zoned = Vec::new();
    let mut no_location = Vec::new();
    let mut no_stock = Vec::new();
    let mut completed_count = 0;

    for line in lines {
        if line.is_out_of_stock() {
            no_stock.push(RouteLine::new(line));
        } else if line.is_collectible() {
            let route_line = RouteLine::new(line);
            if route_line.address.rack.is_some() {
                zoned.push(route_line);
            } else {
                no_location.push(route_line);
            }
        } else {
            completed_count += 1;
        }
    }

    // stable: equal addresses keep task order
    zoned.sort_by(|a, b| table.compare(&a.address, &b.address));

    let total_to_collect = zoned.iter().map(|l| i64::from(l.qty_to_collect)).sum();
    let zoned_count = zoned.len();

    let mut zones: Vec<RouteZone> = Vec::new();
    for line in zoned {
        let Some(rack) = line.address.rack else {
            continue;
        };
        match zones.last_mut() {
            Some(zone) if zone.rack == rack => zone.lines.push(line),
            _ => zones.push(RouteZone {
                rack,
                lines: vec![line],
            }),
        }
    }

    RouteSheet {
        zones,
        no_location_count: no_location.len(),
        no_stock_count: no_stock.len(),
        no_location,
        no_stock,
        total_to_collect,
        zoned_count,
        completed_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &str, planned: i32, scanned: i32, stock: i64, cell: Option<&str>) -> PickLine {
        PickLine {
            product_id: id.to_string(),
            name: None,
            article: None,
            barcode: None,
            image_url: None,
            planned_qty: planned,
            scanned_qty: scanned,
            stock: Decimal::from(stock),
            cell_address: cell.map(str::to_string),
        }
    }

    #[test]
    fn test_qty_to_collect_floor() {
        assert_eq!(line("p", 3, 5, 1, None).qty_to_collect(), 0);
        assert_eq!(line("p", 5, 2, 1, None).qty_to_collect(), 3);
    }

    #[test]
    fn test_buckets() {
        let lines = vec![
            line("zoned", 2, 0, 10, Some("Стеллаж 5 полка 1 ячейка A")),
            line("nowhere", 2, 0, 10, Some("Паллет")),
            line("empty", 2, 0, 0, Some("Стеллаж 5 полка 1 ячейка A")),
            line("done", 2, 2, 10, Some("Стеллаж 5 полка 1 ячейка A")),
        ];
        let sheet = build_route_sheet(lines, &RouteOrderTable::default());
        assert_eq!(sheet.zones.len(), 1);
        assert_eq!(sheet.zones[0].lines[0].line.product_id, "zoned");
        assert_eq!(sheet.no_location[0].line.product_id, "nowhere");
        assert_eq!(sheet.no_stock[0].line.product_id, "empty");
        assert_eq!(sheet.completed_count, 1);
        assert_eq!(sheet.total_to_collect, 2);
    }

    #[test]
    fn test_rack_only_address_is_zoned() {
        let sheet = build_route_sheet(
            vec![line("p", 1, 0, 1, Some("Стеллаж 12"))],
            &RouteOrderTable::default(),
        );
        assert_eq!(sheet.zones.len(), 1);
        assert_eq!(sheet.zones[0].rack, 12);
    }

    #[test]
    fn test_zones_follow_walking_order() {
        let lines = vec![
            line("a", 1, 0, 1, Some("Стеллаж 1 полка 1 ячейка A")),
            line("b", 1, 0, 1, Some("Стеллаж 52 полка 2 ячейка A")),
            line("c", 1, 0, 1, Some("Стеллаж 41 полка 1 ячейка A")),
            line("d", 1, 0, 1, Some("Стеллаж 52 полка 1 ячейка A")),
            line("e", 1, 0, 1, Some("Стеллаж 99 полка 1 ячейка A")),
        ];
        let sheet = build_route_sheet(lines, &RouteOrderTable::default());
        let racks: Vec<u32> = sheet.zones.iter().map(|z| z.rack).collect();
        assert_eq!(racks, vec![41, 52, 1, 99]);
        let rack_52: Vec<&str> = sheet.zones[1]
            .lines
            .iter()
            .map(|l| l.line.product_id.as_str())
            .collect();
        assert_eq!(rack_52, vec!["d", "b"]);
    }
}
