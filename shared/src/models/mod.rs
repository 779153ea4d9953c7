//! Domain models for the warehouse operations backend

mod packing;
mod product;
mod receiving;

pub use packing::*;
pub use product::*;
pub use receiving::*;
