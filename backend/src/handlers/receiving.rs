//! HTTP handlers for goods receipt

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::receiving::{
    AddItemInput, CreateSessionInput, DefectInput, PurchaseOrderDetail, PurchaseOrderSummary,
    ReceivingCompleted, ReceivingItem, ReceivingScanInput, ReceivingScanResult, ReceivingService,
    ReceivingSession, SessionDetail, UndoResult, UpdateItemInput,
};
use crate::AppState;

pub async fn list_purchase_orders(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<PurchaseOrderSummary>>> {
    let service = ReceivingService::new(state.db);
    let orders = service.list_orders().await?;
    Ok(Json(orders))
}

pub async fn get_purchase_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> AppResult<Json<PurchaseOrderDetail>> {
    let service = ReceivingService::new(state.db);
    let order = service.get_order(&order_id).await?;
    Ok(Json(order))
}

pub async fn list_receiving_sessions(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ReceivingSession>>> {
    let service = ReceivingService::new(state.db);
    let sessions = service.list_sessions().await?;
    Ok(Json(sessions))
}

pub async fn get_receiving_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<SessionDetail>> {
    let service = ReceivingService::new(state.db);
    let detail = service.get_session_detail(session_id).await?;
    Ok(Json(detail))
}

pub async fn create_receiving_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionInput>>,
) -> AppResult<Json<ReceivingSession>> {
    let input = body.map(|Json(b)| b).unwrap_or_default();
    let service = ReceivingService::new(state.db);
    let session = service.create_session(input).await?;
    Ok(Json(session))
}

pub async fn scan_receiving_item(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(input): Json<ReceivingScanInput>,
) -> AppResult<Json<ReceivingScanResult>> {
    let service = ReceivingService::new(state.db);
    let result = service.scan(session_id, input).await?;
    Ok(Json(result))
}

pub async fn undo_receiving_scan(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<UndoResult>> {
    let service = ReceivingService::new(state.db);
    let result = service.undo_last_scan(session_id).await?;
    Ok(Json(result))
}

pub async fn update_receiving_item(
    State(state): State<AppState>,
    Path((session_id, item_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateItemInput>,
) -> AppResult<Json<ReceivingItem>> {
    let service = ReceivingService::new(state.db);
    let item = service.update_item(session_id, item_id, input).await?;
    Ok(Json(item))
}

pub async fn set_receiving_defect(
    State(state): State<AppState>,
    Path((session_id, item_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<DefectInput>,
) -> AppResult<Json<ReceivingItem>> {
    let service = ReceivingService::new(state.db);
    let item = service.set_defect(session_id, item_id, input).await?;
    Ok(Json(item))
}

pub async fn add_receiving_item(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(input): Json<AddItemInput>,
) -> AppResult<Json<ReceivingItem>> {
    let service = ReceivingService::new(state.db);
    let item = service.add_item(session_id, input).await?;
    Ok(Json(item))
}

/// Complete the session and create the inventory documents
pub async fn complete_receiving(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<ReceivingCompleted>> {
    let client = state.moysklad()?;
    let service = ReceivingService::new(state.db.clone());
    let completed = service.complete(session_id, client).await?;
    Ok(Json(completed))
}

pub async fn cancel_receiving(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<ReceivingSession>> {
    let service = ReceivingService::new(state.db);
    let session = service.cancel(session_id).await?;
    Ok(Json(session))
}
