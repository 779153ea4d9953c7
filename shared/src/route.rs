//! Walking order through the warehouse
//!
//! Racks are visited in a fixed "snake" sequence that follows the aisles, not
//! numeric order. Racks missing from the table are walked after every known
//! rack, by their own number; lines without a rack come last.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

use crate::address::ParsedAddress;

/// Standard walking sequence of the storage warehouse (52 racks)
pub const WAREHOUSE_RACK_ORDER: [u32; 52] = [
    41, 42, 37, 38, 39, 40, 52, 51, 50, 49, //
    32, 36, 31, 35, 30, 34, 29, 33, 28, //
    23, 18, 19, 24, 20, 25, 21, 26, 22, 27, //
    48, 47, 46, //
    12, 17, 11, 16, 10, 15, 9, 14, 8, 13, //
    1, 2, 3, 4, 5, 6, 7, 45, 44, 43,
];

/// Offset placing unknown racks after every position of the table
pub const UNKNOWN_RACK_OFFSET: u64 = 1000;

/// Shelf sentinel for lines whose shelf could not be read
const MISSING_SHELF: u32 = u32::MAX;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteTableError {
    #[error("Rack order is empty")]
    Empty,

    #[error("Rack {0} appears more than once in the rack order")]
    DuplicateRack(u32),

    #[error("Rack order has {0} entries, at most {max} are supported", max = UNKNOWN_RACK_OFFSET)]
    TooLong(usize),
}

/// Position of a rack in the walking order. Lower sorts earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RouteRank(u64);

impl RouteRank {
    /// Rank of lines without a rack
    pub const UNROUTED: RouteRank = RouteRank(u64::MAX);

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Rank lookup built once from an ordered list of rack numbers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOrderTable {
    order: Vec<u32>,
    positions: HashMap<u32, usize>,
}

impl RouteOrderTable {
    /// Build a table from a walking sequence. Every rack may appear once.
    pub fn new(order: &[u32]) -> Result<Self, RouteTableError> {
        if order.is_empty() {
            return Err(RouteTableError::Empty);
        }
        if order.len() as u64 > UNKNOWN_RACK_OFFSET {
            return Err(RouteTableError::TooLong(order.len()));
        }

        let mut positions = HashMap::with_capacity(order.len());
        for (index, rack) in order.iter().enumerate() {
            if positions.insert(*rack, index).is_some() {
                return Err(RouteTableError::DuplicateRack(*rack));
            }
        }

        Ok(Self {
            order: order.to_vec(),
            positions,
        })
    }

    /// The walking sequence this table was built from
    pub fn order(&self) -> &[u32] {
        &self.order
    }

    pub fn contains(&self, rack: u32) -> bool {
        self.positions.contains_key(&rack)
    }

    /// Rank of a rack: table position for known racks, `1000 + rack` for
    /// unknown racks and [`RouteRank::UNROUTED`] when there is no rack.
    pub fn rank(&self, rack: Option<u32>) -> RouteRank {
        match rack {
            None => RouteRank::UNROUTED,
            Some(r) => match self.positions.get(&r) {
                Some(position) => RouteRank(*position as u64),
                None => RouteRank(UNKNOWN_RACK_OFFSET + u64::from(r)),
            },
        }
    }

    /// Compare two parsed addresses in walking order: rack rank, then shelf
    /// (missing shelves last), then cell case-insensitively (missing first).
    pub fn compare(&self, a: &ParsedAddress, b: &ParsedAddress) -> Ordering {
        self.rank(a.rack)
            .cmp(&self.rank(b.rack))
            .then_with(|| {
                a.shelf
                    .unwrap_or(MISSING_SHELF)
                    .cmp(&b.shelf.unwrap_or(MISSING_SHELF))
            })
            .then_with(|| cell_key(a).cmp(&cell_key(b)))
    }
}

impl Default for RouteOrderTable {
    fn default() -> Self {
        let positions = WAREHOUSE_RACK_ORDER
            .iter()
            .enumerate()
            .map(|(index, rack)| (*rack, index))
            .collect();

        Self {
            order: WAREHOUSE_RACK_ORDER.to_vec(),
            positions,
        }
    }
}

fn cell_key(address: &ParsedAddress) -> String {
    address.cell.as_deref().unwrap_or("").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(rack: Option<u32>, shelf: Option<u32>, cell: Option<&str>) -> ParsedAddress {
        ParsedAddress {
            rack,
            shelf,
            cell: cell.map(str::to_string),
        }
    }

    #[test]
    fn test_default_table_has_every_rack_once() {
        let table = RouteOrderTable::default();
        assert_eq!(table.order().len(), 52);
        for rack in 1..=52 {
            assert!(table.contains(rack), "rack {} missing", rack);
        }
        assert_eq!(RouteOrderTable::new(&WAREHOUSE_RACK_ORDER).unwrap(), table);
    }

    #[test]
    fn test_rank_positions() {
        let table = RouteOrderTable::default();
        assert_eq!(table.rank(Some(41)).value(), 0);
        assert_eq!(table.rank(Some(52)).value(), 6);
        assert_eq!(table.rank(Some(1)).value(), 42);
        assert_eq!(table.rank(Some(43)).value(), 51);
    }

    #[test]
    fn test_rank_unknown_and_missing() {
        let table = RouteOrderTable::default();
        assert_eq!(table.rank(Some(99)).value(), 1099);
        assert!(table.rank(Some(99)) > table.rank(Some(43)));
        assert!(table.rank(Some(99)) < table.rank(None));
        assert_eq!(table.rank(None), RouteRank::UNROUTED);
    }

    #[test]
    fn test_new_rejects_duplicates() {
        assert_eq!(
            RouteOrderTable::new(&[3, 1, 3]),
            Err(RouteTableError::DuplicateRack(3))
        );
        assert_eq!(RouteOrderTable::new(&[]), Err(RouteTableError::Empty));
    }

    #[test]
    fn test_compare_shelf_then_cell() {
        let table = RouteOrderTable::default();
        let low = at(Some(5), Some(1), Some("b"));
        let high = at(Some(5), Some(2), Some("A"));
        assert_eq!(table.compare(&low, &high), Ordering::Less);

        let cell_a = at(Some(5), Some(1), Some("a"));
        let cell_b = at(Some(5), Some(1), Some("B"));
        assert_eq!(table.compare(&cell_a, &cell_b), Ordering::Less);
    }

    #[test]
    fn test_compare_missing_shelf_last_missing_cell_first() {
        let table = RouteOrderTable::default();
        let no_shelf = at(Some(5), None, Some("A"));
        let shelf = at(Some(5), Some(9), Some("A"));
        assert_eq!(table.compare(&shelf, &no_shelf), Ordering::Less);

        let no_cell = at(Some(5), Some(1), None);
        let cell = at(Some(5), Some(1), Some("A"));
        assert_eq!(table.compare(&no_cell, &cell), Ordering::Less);
    }
}
