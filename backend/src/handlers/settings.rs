//! HTTP handlers for application settings and the action journal

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::services::action_log::{ActionLogEntry, ActionLogService};
use crate::services::settings::{SettingsService, STORE_ID_KEY};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct StoreSetting {
    /// Persisted override
    pub store_id: Option<String>,
    /// Store id from configuration
    pub configured_store_id: Option<String>,
    pub store_name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStoreSetting {
    pub store_id: Option<String>,
}

pub async fn get_store_setting(State(state): State<AppState>) -> AppResult<Json<StoreSetting>> {
    let service = SettingsService::new(state.db);
    Ok(Json(StoreSetting {
        store_id: service.get(STORE_ID_KEY).await?,
        configured_store_id: state.config.moysklad.store_id.clone(),
        store_name: state.config.moysklad.store_name.clone(),
    }))
}

/// Set or clear the store used for stock and slot reports
pub async fn update_store_setting(
    State(state): State<AppState>,
    Json(input): Json<UpdateStoreSetting>,
) -> AppResult<Json<StoreSetting>> {
    let service = SettingsService::new(state.db.clone());
    match input.store_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(store_id) => service.set(STORE_ID_KEY, store_id).await?,
        None => service.remove(STORE_ID_KEY).await?,
    }
    state.slot_cache.invalidate_all().await;

    get_store_setting(State(state)).await
}

#[derive(Debug, Deserialize)]
pub struct ActionLogQuery {
    pub limit: Option<i64>,
}

pub async fn list_action_logs(
    State(state): State<AppState>,
    Query(query): Query<ActionLogQuery>,
) -> AppResult<Json<Vec<ActionLogEntry>>> {
    let service = ActionLogService::new(state.db);
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let entries = service.recent(limit).await?;
    Ok(Json(entries))
}
