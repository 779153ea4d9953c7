//! Configuration management for the warehouse operations backend
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with WMS prefix (`WMS__MOYSKLAD__TOKEN`)

use std::time::Duration;

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::{RouteOrderTable, RouteTableError};

pub const DEFAULT_MOYSKLAD_URL: &str = "https://api.moysklad.ru/api/remap/1.2";
pub const DEFAULT_STORE_NAME: &str = "Склад хранения.";

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    pub server: ServerConfig,

    pub database: DatabaseConfig,

    /// Inventory system API
    pub moysklad: MoySkladConfig,

    pub warehouse: WarehouseConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MoySkladConfig {
    pub base_url: String,

    /// Bearer token, preferred over login/password
    pub token: Option<String>,
    pub login: Option<String>,
    pub password: Option<String>,

    /// Store used for stock and slot reports
    pub store_id: Option<String>,

    /// Store looked up by name when no id is configured
    pub store_name: String,

    /// `stockMode` report filter (all, positiveOnly, ...)
    pub stock_mode: String,

    /// Page size for paginated entity and report requests
    pub page_limit: u32,

    /// Products per `byslot/current` request
    pub slot_chunk_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WarehouseConfig {
    /// Rack walking order override; the standard 52-rack route when absent
    pub rack_order: Option<Vec<u32>>,

    /// Slot name cache lifetime in seconds
    pub slot_cache_ttl_secs: u64,
}

impl WarehouseConfig {
    pub fn route_table(&self) -> Result<RouteOrderTable, RouteTableError> {
        match &self.rack_order {
            Some(order) => RouteOrderTable::new(order),
            None => Ok(RouteOrderTable::default()),
        }
    }

    pub fn slot_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.slot_cache_ttl_secs)
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("WMS_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("moysklad.base_url", DEFAULT_MOYSKLAD_URL)?
            .set_default("moysklad.store_name", DEFAULT_STORE_NAME)?
            .set_default("moysklad.stock_mode", "all")?
            .set_default("moysklad.page_limit", 1000)?
            .set_default("moysklad.slot_chunk_size", 100)?
            .set_default("warehouse.slot_cache_ttl_secs", 600)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (WMS prefix)
            .add_source(
                Environment::with_prefix("WMS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl ServerConfig {
    /// `host:port` for the listener; IPv6 hosts are bracketed
    pub fn bind_address(&self) -> String {
        let host = self.host.trim();
        if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, self.port)
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(host: &str, port: u16) -> ServerConfig {
        ServerConfig {
            port,
            host: host.to_string(),
        }
    }

    #[test]
    fn test_bind_address_uses_host() {
        assert_eq!(server("127.0.0.1", 8080).bind_address(), "127.0.0.1:8080");
        assert_eq!(server("localhost", 3000).bind_address(), "localhost:3000");
        assert_eq!(ServerConfig::default().bind_address(), "0.0.0.0:3000");
    }

    #[test]
    fn test_bind_address_ipv6() {
        assert_eq!(server("::1", 3000).bind_address(), "[::1]:3000");
        assert_eq!(server("[::]", 3000).bind_address(), "[::]:3000");
    }
}
