//! HTTP handlers for the product catalogue, sync and storage locations

use axum::{
    extract::{Multipart, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use shared::Page;

use crate::error::{AppError, AppResult};
use crate::handlers::read_upload;
use crate::services::location::{LocationImportSummary, LocationSyncSummary};
use crate::services::product::{LabelInfo, Product, ProductDetail, ProductQuery, ProductService};
use crate::services::sync::{SyncService, SyncStatus, SyncSummary};
use crate::AppState;

/// List products with search and paging
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> AppResult<Json<Page<Product>>> {
    let service = ProductService::new(state.db);
    let page = service.list(query).await?;
    Ok(Json(page))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> AppResult<Json<ProductDetail>> {
    let service = ProductService::new(state.db);
    let product = service.get(&product_id).await?;
    Ok(Json(product))
}

pub async fn get_product_by_barcode(
    State(state): State<AppState>,
    Path(barcode): Path<String>,
) -> AppResult<Json<Product>> {
    let service = ProductService::new(state.db);
    let product = service.get_by_barcode(&barcode).await?;
    Ok(Json(product))
}

pub async fn get_product_by_article(
    State(state): State<AppState>,
    Path(article): Path<String>,
) -> AppResult<Json<Product>> {
    let service = ProductService::new(state.db);
    let product = service.get_by_article(&article).await?;
    Ok(Json(product))
}

pub async fn get_label_info(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> AppResult<Json<LabelInfo>> {
    let service = ProductService::new(state.db);
    let label = service.label_info(&product_id).await?;
    Ok(Json(label))
}

#[derive(Debug, Default, Deserialize)]
pub struct ImageQuery {
    /// Original size instead of the thumbnail
    #[serde(default)]
    pub full: bool,
}

const IMAGE_CACHE_CONTROL: &str = "public, max-age=86400";

/// Proxy a product image. Download links need the API credentials, so the
/// browser cannot load them directly. A stale stored link is refreshed.
pub async fn get_product_image(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Query(query): Query<ImageQuery>,
) -> AppResult<Response> {
    let client = state.moysklad()?;
    let service = ProductService::new(state.db.clone());

    let cached = if query.full {
        None
    } else {
        service.cached_image_url(&product_id).await?
    };

    let mut image = None;
    if let Some(url) = &cached {
        image = client.download_image(url).await?;
    }

    if image.is_none() {
        let fresh = client
            .product_image_url(&product_id, query.full)
            .await?
            .ok_or_else(|| AppError::NotFound("Product image".to_string()))?;

        if !query.full && cached.as_deref() != Some(fresh.as_str()) {
            tracing::info!("Refreshing image link of product {}", product_id);
            service.set_image_url(&product_id, &fresh).await?;
        }
        image = client.download_image(&fresh).await?;
    }

    let image = image.ok_or_else(|| AppError::NotFound("Product image".to_string()))?;
    Ok((
        [
            (header::CONTENT_TYPE, image.content_type),
            (header::CACHE_CONTROL, IMAGE_CACHE_CONTROL.to_string()),
        ],
        image.bytes,
    )
        .into_response())
}

/// Run a full catalogue sync
pub async fn sync_products(State(state): State<AppState>) -> AppResult<Json<SyncSummary>> {
    let service = state.sync_service()?;
    let summary = service.sync_all().await?;
    Ok(Json(summary))
}

pub async fn get_sync_status(State(state): State<AppState>) -> AppResult<Json<SyncStatus>> {
    let status = SyncService::status(&state.db).await?;
    Ok(Json(status))
}

/// Import cells from a "stock by cell" report export
pub async fn upload_locations(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<LocationImportSummary>> {
    let (file_name, bytes) = read_upload(multipart).await?;
    let service = state.location_service()?;
    let summary = service.import_cell_report(file_name.as_deref(), &bytes).await?;
    Ok(Json(summary))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReconcileRequest {
    /// All catalogue products when empty
    #[serde(default, alias = "productIds")]
    pub product_ids: Vec<String>,
}

/// Reconcile product locations against the slot report
pub async fn reconcile_product_locations(
    State(state): State<AppState>,
    body: Option<Json<ReconcileRequest>>,
) -> AppResult<Json<LocationSyncSummary>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let product_ids = if request.product_ids.is_empty() {
        sqlx::query_scalar::<_, String>("SELECT id FROM products ORDER BY id")
            .fetch_all(&state.db)
            .await?
    } else {
        request.product_ids
    };

    let service = state.location_service()?;
    let summary = service.reconcile_locations(&product_ids).await?;
    Ok(Json(summary))
}
