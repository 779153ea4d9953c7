//! Warehouse Operations - Backend Server
//!
//! Picking, packing and goods receipt on top of the MoySklad inventory
//! system: catalogue synchronization, storage-cell reconciliation and
//! route sheets ordered by the warehouse walking path.

use axum::{routing::get, Router};
use shared::RouteOrderTable;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod external;
mod handlers;
mod routes;
mod services;

pub use config::Config;

use error::{AppError, AppResult};
use external::MoySkladClient;
use services::{LocationService, SlotNameCache, SyncService};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    /// Absent when no MoySklad credentials are configured
    pub moysklad: Option<MoySkladClient>,
    pub slot_cache: SlotNameCache,
    pub route_table: Arc<RouteOrderTable>,
}

impl AppState {
    pub fn moysklad(&self) -> AppResult<&MoySkladClient> {
        self.moysklad.as_ref().ok_or_else(|| {
            AppError::Configuration("MoySklad credentials are not configured".to_string())
        })
    }

    pub fn location_service(&self) -> AppResult<LocationService> {
        Ok(LocationService::new(
            self.db.clone(),
            self.moysklad()?.clone(),
            self.slot_cache.clone(),
            self.config.moysklad.store_id.clone(),
        ))
    }

    pub fn sync_service(&self) -> AppResult<SyncService> {
        Ok(SyncService::new(
            self.db.clone(),
            self.moysklad()?.clone(),
            self.location_service()?,
            self.slot_cache.clone(),
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wms_server=debug,tower_http=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::load()?;

    tracing::info!("Starting Warehouse Operations Server");
    tracing::info!("Environment: {}", config.environment);

    let route_table = config.warehouse.route_table()?;
    tracing::info!("Route order covers {} racks", route_table.order().len());

    let moysklad = match MoySkladClient::new(&config.moysklad) {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!("MoySklad integration disabled: {}", e);
            None
        }
    };

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    let state = AppState {
        db: db_pool,
        config: Arc::new(config.clone()),
        moysklad,
        slot_cache: SlotNameCache::new(config.warehouse.slot_cache_ttl()),
        route_table: Arc::new(route_table),
    };

    let app = create_app(state);

    // Start server
    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(addr.as_str()).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes and middleware
fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn root() -> &'static str {
    "Warehouse Operations API v1.0"
}

async fn health_check() -> &'static str {
    "OK"
}
