//! Shared domain logic for the warehouse operations backend
//!
//! Everything here is free of I/O: cell address parsing, the warehouse walking
//! order, route sheets, slot reconciliation, stock merging and the adapters
//! normalizing inventory-system report rows.

pub mod address;
pub mod barcode;
pub mod models;
pub mod reconcile;
pub mod report;
pub mod route;
pub mod route_sheet;
pub mod stock;
pub mod types;
pub mod validation;

pub use address::{normalize_slot_name, parse_cell_address, ParsedAddress};
pub use barcode::{extract_barcodes, BarcodeKind, ProductBarcode};
pub use models::*;
pub use reconcile::{reconcile, ProductLocation, ReconcileOutcome, SlotCandidate, SlotDirectory};
pub use report::{RawSlotRow, RawStockRow, RawStoreByStoreRow};
pub use route::{RouteOrderTable, RouteRank, RouteTableError, WAREHOUSE_RACK_ORDER};
pub use route_sheet::{build_route_sheet, PickLine, RouteLine, RouteSheet, RouteZone};
pub use stock::{ensure_stock_coverage, merge_stock, StockError, StockIndex, StockRecord};
pub use types::*;
pub use validation::*;
