//! External API integrations

pub mod moysklad;

pub use moysklad::MoySkladClient;
