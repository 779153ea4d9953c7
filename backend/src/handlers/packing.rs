//! HTTP handlers for packing tasks

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::read_upload;
use crate::services::location::LocationSyncSummary;
use crate::services::packing::{
    BoxesOverview, CreateTaskInput, ItemAdded, PackingBox, PackingService, PackingTaskSummary,
    RouteSheetResponse, ScanInput, ScanResult, TaskCompleted, TaskCreated, TaskDetail,
    TaskItemInput,
};
use crate::AppState;

/// Refresh cells of freshly created task lines; failures only log
async fn refresh_locations_quietly(state: &AppState, product_ids: &[String]) {
    let service = match state.location_service() {
        Ok(service) => service,
        Err(e) => {
            tracing::debug!("Location refresh skipped: {}", e);
            return;
        }
    };
    if let Err(e) = service.reconcile_locations(product_ids).await {
        tracing::warn!("Location refresh after task creation failed: {}", e);
    }
}

pub async fn list_packing_tasks(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<PackingTaskSummary>>> {
    let service = PackingService::new(state.db);
    let tasks = service.list_tasks().await?;
    Ok(Json(tasks))
}

pub async fn get_packing_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<TaskDetail>> {
    let service = PackingService::new(state.db);
    let detail = service.get_task_detail(task_id).await?;
    Ok(Json(detail))
}

/// Create a task from product lines
pub async fn create_packing_task(
    State(state): State<AppState>,
    Json(input): Json<CreateTaskInput>,
) -> AppResult<Json<TaskCreated>> {
    let service = PackingService::new(state.db.clone());
    let created = service.create_task(input).await?;
    refresh_locations_quietly(&state, &created.product_ids).await;
    Ok(Json(created))
}

/// Create a task from an uploaded order file
pub async fn upload_packing_task(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<TaskCreated>> {
    let (_, bytes) = read_upload(multipart).await?;
    let service = PackingService::new(state.db.clone());
    let created = service.create_task_from_file(&bytes).await?;
    refresh_locations_quietly(&state, &created.product_ids).await;
    Ok(Json(created))
}

pub async fn add_packing_item(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Json(input): Json<TaskItemInput>,
) -> AppResult<Json<ItemAdded>> {
    let service = PackingService::new(state.db);
    let added = service.add_item(task_id, input).await?;
    Ok(Json(added))
}

pub async fn list_boxes(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<BoxesOverview>> {
    let service = PackingService::new(state.db);
    let boxes = service.list_boxes(task_id).await?;
    Ok(Json(boxes))
}

pub async fn open_box(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<PackingBox>> {
    let service = PackingService::new(state.db);
    let packing_box = service.open_box(task_id).await?;
    Ok(Json(packing_box))
}

pub async fn close_box(
    State(state): State<AppState>,
    Path((task_id, box_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<PackingBox>> {
    let service = PackingService::new(state.db);
    let packing_box = service.close_box(task_id, box_id).await?;
    Ok(Json(packing_box))
}

pub async fn scan_packing_item(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Json(input): Json<ScanInput>,
) -> AppResult<Json<ScanResult>> {
    let service = PackingService::new(state.db);
    let result = service.scan(task_id, input).await?;
    Ok(Json(result))
}

/// Pick route in warehouse walking order
pub async fn get_route_sheet(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<RouteSheetResponse>> {
    let service = PackingService::new(state.db);
    let sheet = service.route_sheet(task_id, &state.route_table).await?;
    Ok(Json(sheet))
}

/// Reconcile the locations of the task's products
pub async fn refresh_task_locations(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<LocationSyncSummary>> {
    let product_ids = PackingService::new(state.db.clone())
        .task_product_ids(task_id)
        .await?;
    let service = state.location_service()?;
    let summary = service.reconcile_locations(&product_ids).await?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub struct CompleteTaskRequest {
    #[serde(default = "default_create_shipment", alias = "createShipment")]
    pub create_shipment: bool,
}

fn default_create_shipment() -> bool {
    true
}

pub async fn complete_packing_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    body: Option<Json<CompleteTaskRequest>>,
) -> AppResult<Json<TaskCompleted>> {
    let create_shipment = body.map_or(true, |Json(b)| b.create_shipment);
    let client = if create_shipment {
        state.moysklad.as_ref()
    } else {
        None
    };

    let service = PackingService::new(state.db.clone());
    let completed = service.complete(task_id, client).await?;
    Ok(Json(completed))
}
