//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::AppResult;
use crate::external::moysklad::ConnectionCheck;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
    pub moysklad: String,
}

/// Health check endpoint handler
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_status = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "connected".to_string(),
        Err(_) => "disconnected".to_string(),
    };

    let moysklad = if state.moysklad.is_some() {
        "configured"
    } else {
        "not configured"
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_status,
        moysklad: moysklad.to_string(),
    })
}

/// Check the inventory system credentials
pub async fn check_moysklad(State(state): State<AppState>) -> AppResult<Json<ConnectionCheck>> {
    let client = state.moysklad()?;
    Ok(Json(client.check_connection().await))
}
