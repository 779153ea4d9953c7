//! Business logic services for warehouse operations

pub mod action_log;
pub mod location;
pub mod location_import;
pub mod order_import;
pub mod packing;
pub mod product;
pub mod receiving;
pub mod settings;
pub mod slot_cache;
pub mod spreadsheet;
pub mod sync;

pub use location::LocationService;
pub use slot_cache::SlotNameCache;
pub use sync::SyncService;
