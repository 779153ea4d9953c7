//! Route definitions for the warehouse operations API

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/moysklad/check", get(handlers::check_moysklad))
        .nest("/products", product_routes())
        .nest("/packing", packing_routes())
        .nest("/receiving", receiving_routes())
        .nest("/settings", settings_routes())
        .route("/actions", get(handlers::list_action_logs))
}

/// Catalogue, synchronization and storage locations
fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_products))
        .route("/sync", post(handlers::sync_products))
        .route("/sync/status", get(handlers::get_sync_status))
        .route("/locations/upload", post(handlers::upload_locations))
        .route(
            "/locations/reconcile",
            post(handlers::reconcile_product_locations),
        )
        .route("/barcode/:barcode", get(handlers::get_product_by_barcode))
        .route("/article/:article", get(handlers::get_product_by_article))
        .route("/:id", get(handlers::get_product))
        .route("/:id/image", get(handlers::get_product_image))
        .route("/:id/label-info", get(handlers::get_label_info))
}

/// Packing tasks, boxes and pick routes
fn packing_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/tasks",
            get(handlers::list_packing_tasks).post(handlers::create_packing_task),
        )
        .route("/tasks/upload", post(handlers::upload_packing_task))
        .route("/tasks/:task_id", get(handlers::get_packing_task))
        .route("/tasks/:task_id/items", post(handlers::add_packing_item))
        .route(
            "/tasks/:task_id/boxes",
            get(handlers::list_boxes).post(handlers::open_box),
        )
        .route(
            "/tasks/:task_id/boxes/:box_id/close",
            post(handlers::close_box),
        )
        .route("/tasks/:task_id/scan", post(handlers::scan_packing_item))
        .route("/tasks/:task_id/route-sheet", get(handlers::get_route_sheet))
        .route(
            "/tasks/:task_id/locations/refresh",
            post(handlers::refresh_task_locations),
        )
        .route(
            "/tasks/:task_id/complete",
            post(handlers::complete_packing_task),
        )
}

/// Purchase orders and receiving sessions
fn receiving_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(handlers::list_purchase_orders))
        .route("/orders/:order_id", get(handlers::get_purchase_order))
        .route(
            "/sessions",
            get(handlers::list_receiving_sessions).post(handlers::create_receiving_session),
        )
        .route("/sessions/:session_id", get(handlers::get_receiving_session))
        .route(
            "/sessions/:session_id/scan",
            post(handlers::scan_receiving_item),
        )
        .route(
            "/sessions/:session_id/undo",
            post(handlers::undo_receiving_scan),
        )
        .route(
            "/sessions/:session_id/items",
            post(handlers::add_receiving_item),
        )
        .route(
            "/sessions/:session_id/items/:item_id",
            put(handlers::update_receiving_item),
        )
        .route(
            "/sessions/:session_id/items/:item_id/defect",
            put(handlers::set_receiving_defect),
        )
        .route(
            "/sessions/:session_id/complete",
            post(handlers::complete_receiving),
        )
        .route(
            "/sessions/:session_id/cancel",
            post(handlers::cancel_receiving),
        )
}

/// Runtime settings
fn settings_routes() -> Router<AppState> {
    Router::new().route(
        "/store",
        get(handlers::get_store_setting).put(handlers::update_store_setting),
    )
}
