//! Packing (order picking) workflow
//!
//! Tasks list products to collect. Operators walk the route sheet, scan
//! products into numbered boxes and close the task once every line is picked.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::{
    build_route_sheet, clamp_to_stock, default_task_name, validate_barcode,
    validate_marking_code, validate_positive, BoxStatus, OrderFileRow, PackingTaskStatus,
    PickLine, RouteOrderTable, RouteSheet, RowSkipReason, SkippedRow,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{is_unique_violation, AppError, AppResult};
use crate::external::moysklad::{DocumentPosition, MoySkladClient};
use crate::services::action_log::ActionLogService;
use crate::services::order_import::parse_order_file;
use crate::services::product::{Product, ProductService};

#[derive(Clone)]
pub struct PackingService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PackingTask {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub total_items: i32,
    pub packed_items: i32,
    pub shipment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PackingTask {
    fn ensure_active(&self) -> AppResult<()> {
        match PackingTaskStatus::parse(&self.status) {
            Some(PackingTaskStatus::Active) => Ok(()),
            _ => Err(AppError::conflict(
                "packing_task",
                "Task is not active",
                "Задача не активна",
            )),
        }
    }
}

/// Task with line counters for the task list
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PackingTaskSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub task: PackingTask,
    pub items_count: i64,
    pub planned_total: i64,
    pub scanned_total: i64,
}

/// Task line joined with its product
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TaskItem {
    pub id: Uuid,
    pub product_id: String,
    pub planned_qty: i32,
    pub scanned_qty: i32,
    pub name: String,
    pub article: Option<String>,
    pub barcode: Option<String>,
    pub image_url: Option<String>,
    pub stock: Decimal,
    pub cell_address: Option<String>,
    pub requires_marking: bool,
    pub meta_href: String,
    pub price: Decimal,
}

impl From<TaskItem> for PickLine {
    fn from(item: TaskItem) -> Self {
        PickLine {
            product_id: item.product_id,
            name: Some(item.name),
            article: item.article,
            barcode: item.barcode,
            image_url: item.image_url,
            planned_qty: item.planned_qty,
            scanned_qty: item.scanned_qty,
            stock: item.stock,
            cell_address: item.cell_address,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    pub task: PackingTask,
    /// Lines with stock on hand
    pub items: Vec<TaskItem>,
    pub no_stock_items: Vec<TaskItem>,
    pub total_planned: i64,
    pub total_scanned: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskInput {
    pub name: Option<String>,
    #[validate(length(min = 1))]
    pub items: Vec<TaskItemInput>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskItemInput {
    #[serde(alias = "productId")]
    pub product_id: String,
    pub quantity: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskCreated {
    pub task_id: Uuid,
    pub name: String,
    pub items_count: usize,
    pub total_quantity: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub not_found: Vec<OrderFileRow>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_no_stock: Vec<SkippedRow>,
    #[serde(skip)]
    pub product_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemAdded {
    pub product_id: String,
    pub product: String,
    pub quantity: i32,
    pub planned_qty: i32,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PackingBox {
    pub id: Uuid,
    pub task_id: Uuid,
    pub number: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BoxWithCounts {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub item: PackingBox,
    pub items_qty: i64,
    pub scans_count: i64,
}

/// Quantity of one product in one box
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BoxContent {
    pub box_id: Uuid,
    pub box_number: i32,
    pub product_id: String,
    pub name: String,
    pub barcode: Option<String>,
    pub qty: i64,
    pub requires_marking: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoxesOverview {
    pub boxes: Vec<BoxWithCounts>,
    pub items: Vec<BoxContent>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MissingMarking {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ScanInput {
    #[validate(length(min = 1))]
    pub barcode: String,
    #[serde(default, alias = "boxId")]
    pub box_id: Option<Uuid>,
    #[serde(default, alias = "markingCode", alias = "chestnyZnak")]
    pub marking_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub product_id: String,
    pub product: String,
    pub scanned: i32,
    pub quantity: i32,
    pub complete: bool,
    pub box_id: Option<Uuid>,
    pub requires_marking: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteSheetResponse {
    pub task: PackingTask,
    #[serde(flatten)]
    pub sheet: RouteSheet,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskCompleted {
    pub task_id: Uuid,
    pub packed_items: i64,
    pub shipment_id: Option<String>,
    pub message: String,
}

const ITEM_SELECT: &str = r#"
    SELECT pti.id, pti.product_id, pti.planned_qty, pti.scanned_qty,
           p.name, p.article, p.barcode, p.image_url, p.stock, p.cell_address,
           p.requires_marking, p.meta_href, p.price
    FROM packing_task_items pti
    JOIN products p ON p.id = pti.product_id
    WHERE pti.task_id = $1
"#;

impl PackingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_tasks(&self) -> AppResult<Vec<PackingTaskSummary>> {
        let tasks = sqlx::query_as::<_, PackingTaskSummary>(
            r#"
            SELECT t.id, t.name, t.status, t.total_items, t.packed_items, t.shipment_id,
                   t.created_at, t.completed_at,
                   COUNT(i.id) AS items_count,
                   COALESCE(SUM(i.planned_qty), 0)::BIGINT AS planned_total,
                   COALESCE(SUM(i.scanned_qty), 0)::BIGINT AS scanned_total
            FROM packing_tasks t
            LEFT JOIN packing_task_items i ON i.task_id = t.id
            GROUP BY t.id
            ORDER BY t.created_at DESC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(tasks)
    }

    pub async fn get_task(&self, task_id: Uuid) -> AppResult<PackingTask> {
        sqlx::query_as::<_, PackingTask>(
            r#"
            SELECT id, name, status, total_items, packed_items, shipment_id, created_at, completed_at
            FROM packing_tasks
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Packing task".to_string()))
    }

    async fn get_items(&self, task_id: Uuid) -> AppResult<Vec<TaskItem>> {
        let sql = format!("{} ORDER BY p.cell_address NULLS LAST, p.name", ITEM_SELECT);
        let items = sqlx::query_as::<_, TaskItem>(&sql)
            .bind(task_id)
            .fetch_all(&self.db)
            .await?;
        Ok(items)
    }

    pub async fn get_task_detail(&self, task_id: Uuid) -> AppResult<TaskDetail> {
        let task = self.get_task(task_id).await?;
        let (items, no_stock_items): (Vec<TaskItem>, Vec<TaskItem>) = self
            .get_items(task_id)
            .await?
            .into_iter()
            .partition(|item| item.stock > Decimal::ZERO);

        Ok(TaskDetail {
            total_planned: items.iter().map(|i| i64::from(i.planned_qty)).sum(),
            total_scanned: items.iter().map(|i| i64::from(i.scanned_qty)).sum(),
            task,
            items,
            no_stock_items,
        })
    }

    pub async fn task_product_ids(&self, task_id: Uuid) -> AppResult<Vec<String>> {
        self.get_task(task_id).await?;
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT product_id FROM packing_task_items WHERE task_id = $1",
        )
        .bind(task_id)
        .fetch_all(&self.db)
        .await?;
        Ok(ids)
    }

    /// Create a task from explicit product lines. Unknown products are
    /// ignored; at least one must exist.
    pub async fn create_task(&self, input: CreateTaskInput) -> AppResult<TaskCreated> {
        input.validate()?;

        let mut lines: Vec<(String, i32)> = Vec::new();
        for item in &input.items {
            let quantity = validate_positive("quantity", item.quantity.unwrap_or(1))?;
            let exists = sqlx::query_scalar::<_, String>("SELECT id FROM products WHERE id = $1")
                .bind(item.product_id.trim())
                .fetch_optional(&self.db)
                .await?;
            if let Some(id) = exists {
                lines.push((id, quantity));
            }
        }

        if lines.is_empty() {
            return Err(AppError::validation(
                "items",
                "None of the products were found",
                "Не найдено товаров",
            ));
        }

        self.insert_task(input.name, lines, Vec::new(), Vec::new()).await
    }

    /// Create a task from an uploaded order file. Rows are matched by
    /// barcode, then SKU/article, then name; quantities are clamped to stock.
    pub async fn create_task_from_file(&self, bytes: &[u8]) -> AppResult<TaskCreated> {
        let rows = parse_order_file(bytes)?;
        let products = ProductService::new(self.db.clone());

        let mut lines: Vec<(String, i32)> = Vec::new();
        let mut not_found = Vec::new();
        let mut skipped = Vec::new();

        for row in rows.into_iter().filter(OrderFileRow::is_usable) {
            let Some(product) = self.match_row(&products, &row).await? else {
                not_found.push(row);
                continue;
            };

            match clamp_to_stock(row.quantity, product.stock) {
                Some(quantity) => lines.push((product.id, quantity)),
                None => skipped.push(SkippedRow {
                    row,
                    reason: RowSkipReason::NoStock,
                }),
            }
        }

        if lines.is_empty() {
            return Err(AppError::validation(
                "file",
                &format!("No products matched ({} rows not found)", not_found.len()),
                "Не найдено товаров",
            ));
        }

        self.insert_task(None, lines, not_found, skipped).await
    }

    async fn match_row(
        &self,
        products: &ProductService,
        row: &OrderFileRow,
    ) -> AppResult<Option<Product>> {
        if let Some(barcode) = &row.barcode {
            if let Some(product) = products.find_by_barcode(barcode).await? {
                return Ok(Some(product));
            }
        }
        if let Some(sku) = &row.sku {
            if let Some(product) = products.find_by_article(sku).await? {
                return Ok(Some(product));
            }
        }
        if let Some(name) = &row.name {
            return products.find_by_name(name).await;
        }
        Ok(None)
    }

    async fn insert_task(
        &self,
        name: Option<String>,
        lines: Vec<(String, i32)>,
        not_found: Vec<OrderFileRow>,
        skipped_no_stock: Vec<SkippedRow>,
    ) -> AppResult<TaskCreated> {
        // The same product may appear on several rows
        let mut merged: Vec<(String, i32)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for (product_id, quantity) in lines {
            match positions.get(&product_id) {
                Some(&idx) => merged[idx].1 = merged[idx].1.saturating_add(quantity),
                None => {
                    positions.insert(product_id.clone(), merged.len());
                    merged.push((product_id, quantity));
                }
            }
        }

        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| default_task_name(chrono::Local::now().naive_local()));
        let total: i64 = merged.iter().map(|(_, q)| i64::from(*q)).sum();
        let task_id = Uuid::new_v4();

        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO packing_tasks (id, name, status, total_items)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(task_id)
        .bind(&name)
        .bind(PackingTaskStatus::Active.as_str())
        .bind(total as i32)
        .execute(&mut *tx)
        .await?;

        for (product_id, quantity) in &merged {
            sqlx::query(
                r#"
                INSERT INTO packing_task_items (id, task_id, product_id, planned_qty)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(task_id)
            .bind(product_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        ActionLogService::new(self.db.clone())
            .record(
                "packing_task_created",
                Some("packing_task"),
                Some(&task_id.to_string()),
                json!({ "totalQuantity": total, "items": merged.len() }),
            )
            .await;

        tracing::info!("Packing task {} created with {} lines", task_id, merged.len());

        Ok(TaskCreated {
            task_id,
            name,
            items_count: merged.len(),
            total_quantity: total,
            not_found,
            skipped_no_stock,
            product_ids: merged.into_iter().map(|(id, _)| id).collect(),
        })
    }

    /// Add a product to an active task, increasing an existing line
    pub async fn add_item(&self, task_id: Uuid, input: TaskItemInput) -> AppResult<ItemAdded> {
        let quantity = validate_positive("quantity", input.quantity.unwrap_or(1))?;
        self.get_task(task_id).await?.ensure_active()?;

        let product = ProductService::new(self.db.clone())
            .get(input.product_id.trim())
            .await?
            .product;

        let mut tx = self.db.begin().await?;
        let planned_qty = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO packing_task_items (id, task_id, product_id, planned_qty)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (task_id, product_id)
            DO UPDATE SET planned_qty = packing_task_items.planned_qty + EXCLUDED.planned_qty
            RETURNING planned_qty
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(task_id)
        .bind(&product.id)
        .bind(quantity)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE packing_tasks
            SET total_items = (SELECT COALESCE(SUM(planned_qty), 0) FROM packing_task_items WHERE task_id = $1)
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(ItemAdded {
            product_id: product.id,
            product: product.name,
            quantity,
            planned_qty,
        })
    }

    pub async fn list_boxes(&self, task_id: Uuid) -> AppResult<BoxesOverview> {
        self.get_task(task_id).await?;

        let boxes = sqlx::query_as::<_, BoxWithCounts>(
            r#"
            SELECT b.id, b.task_id, b.number, b.status, b.created_at, b.closed_at,
                   COALESCE(SUM(bi.quantity), 0)::BIGINT AS items_qty,
                   COUNT(bi.id) AS scans_count
            FROM boxes b
            LEFT JOIN box_items bi ON bi.box_id = b.id
            WHERE b.task_id = $1
            GROUP BY b.id
            ORDER BY b.number
            "#,
        )
        .bind(task_id)
        .fetch_all(&self.db)
        .await?;

        let items = sqlx::query_as::<_, BoxContent>(
            r#"
            SELECT b.id AS box_id, b.number AS box_number, bi.product_id, p.name, p.barcode,
                   COALESCE(SUM(bi.quantity), 0)::BIGINT AS qty,
                   BOOL_OR(p.requires_marking) AS requires_marking
            FROM boxes b
            JOIN box_items bi ON bi.box_id = b.id
            JOIN products p ON p.id = bi.product_id
            WHERE b.task_id = $1
            GROUP BY b.id, b.number, bi.product_id, p.name, p.barcode
            ORDER BY b.number, p.name
            "#,
        )
        .bind(task_id)
        .fetch_all(&self.db)
        .await?;

        Ok(BoxesOverview { boxes, items })
    }

    /// Open the next numbered box of an active task
    pub async fn open_box(&self, task_id: Uuid) -> AppResult<PackingBox> {
        self.get_task(task_id).await?.ensure_active()?;

        let result = sqlx::query_as::<_, PackingBox>(
            r#"
            INSERT INTO boxes (id, task_id, number, status)
            SELECT $1, $2, COALESCE(MAX(number), 0) + 1, $3
            FROM boxes WHERE task_id = $2
            RETURNING id, task_id, number, status, created_at, closed_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(task_id)
        .bind(BoxStatus::Open.as_str())
        .fetch_one(&self.db)
        .await;

        match result {
            Ok(packing_box) => Ok(packing_box),
            Err(e) if is_unique_violation(&e) => Err(AppError::conflict(
                "box",
                "Another box was opened at the same time, retry",
                "Короб уже создан, повторите",
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_box(&self, task_id: Uuid, box_id: Uuid) -> AppResult<PackingBox> {
        sqlx::query_as::<_, PackingBox>(
            r#"
            SELECT id, task_id, number, status, created_at, closed_at
            FROM boxes
            WHERE id = $1 AND task_id = $2
            "#,
        )
        .bind(box_id)
        .bind(task_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Box".to_string()))
    }

    /// Close a box. Refused while it holds marked products without a code.
    pub async fn close_box(&self, task_id: Uuid, box_id: Uuid) -> AppResult<PackingBox> {
        self.get_task(task_id).await?.ensure_active()?;
        self.get_box(task_id, box_id).await?;

        let missing = sqlx::query_as::<_, MissingMarking>(
            r#"
            SELECT p.name, COUNT(*) AS count
            FROM box_items bi
            JOIN products p ON p.id = bi.product_id
            WHERE bi.box_id = $1
              AND p.requires_marking
              AND COALESCE(TRIM(bi.marking_code), '') = ''
            GROUP BY p.id, p.name
            "#,
        )
        .bind(box_id)
        .fetch_all(&self.db)
        .await?;

        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|m| m.name.as_str()).collect();
            return Err(AppError::invalid_state(
                &format!("Box has marked products without a code: {}", names.join(", ")),
                &format!(
                    "В коробе есть маркируемые товары без кода (Честный знак): {}",
                    names.join(", ")
                ),
            ));
        }

        let closed = sqlx::query_as::<_, PackingBox>(
            r#"
            UPDATE boxes SET status = $2, closed_at = NOW()
            WHERE id = $1
            RETURNING id, task_id, number, status, created_at, closed_at
            "#,
        )
        .bind(box_id)
        .bind(BoxStatus::Closed.as_str())
        .fetch_one(&self.db)
        .await?;

        Ok(closed)
    }

    /// Register one picked unit
    pub async fn scan(&self, task_id: Uuid, input: ScanInput) -> AppResult<ScanResult> {
        input.validate()?;
        let barcode = validate_barcode(&input.barcode)?;
        self.get_task(task_id).await?.ensure_active()?;

        let product = ProductService::new(self.db.clone())
            .find_by_barcode(&barcode)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product with barcode {}", barcode)))?;

        let item = sqlx::query_as::<_, TaskItem>(&format!("{} AND pti.product_id = $2", ITEM_SELECT))
            .bind(task_id)
            .bind(&product.id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| {
                AppError::conflict(
                    "product",
                    &format!("{} is not part of this task", product.name),
                    &format!("Товар не в задаче: {}", product.name),
                )
            })?;

        let already_picked = || {
            AppError::conflict(
                "product",
                &format!("{} is already picked", product.name),
                &format!("Товар уже собран: {}", product.name),
            )
        };
        if item.scanned_qty >= item.planned_qty {
            return Err(already_picked());
        }

        let marking_code = match input.marking_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => Some(validate_marking_code(code)?),
            _ => None,
        };

        let mut tx = self.db.begin().await?;

        if let Some(box_id) = input.box_id {
            let packing_box = self.get_box(task_id, box_id).await?;
            if packing_box.status != BoxStatus::Open.as_str() {
                return Err(AppError::conflict("box", "Box is closed", "Короб закрыт"));
            }
            if product.requires_marking && marking_code.is_none() {
                return Err(AppError::validation(
                    "marking_code",
                    "Marking code is required for this product",
                    "Нужен код маркировки (Честный знак)",
                ));
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO box_items (id, box_id, product_id, quantity, marking_code)
                VALUES ($1, $2, $3, 1, $4)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(box_id)
            .bind(&product.id)
            .bind(&marking_code)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    return Err(AppError::conflict(
                        "marking_code",
                        "This marking code has already been used",
                        "Этот код маркировки уже использован",
                    ))
                }
                Err(e) => return Err(e.into()),
            }
        }

        let scanned = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE packing_task_items SET scanned_qty = scanned_qty + 1
            WHERE id = $1 AND scanned_qty < planned_qty
            RETURNING scanned_qty
            "#,
        )
        .bind(item.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(already_picked)?;

        tx.commit().await?;

        Ok(ScanResult {
            product_id: product.id,
            product: product.name,
            scanned,
            quantity: item.planned_qty,
            complete: scanned >= item.planned_qty,
            box_id: input.box_id,
            requires_marking: product.requires_marking,
        })
    }

    /// Pick route of a task ordered by the warehouse walking order
    pub async fn route_sheet(
        &self,
        task_id: Uuid,
        table: &RouteOrderTable,
    ) -> AppResult<RouteSheetResponse> {
        let task = self.get_task(task_id).await?;
        let lines: Vec<PickLine> = self
            .get_items(task_id)
            .await?
            .into_iter()
            .map(PickLine::from)
            .collect();

        let sheet = build_route_sheet(lines, table);
        tracing::debug!(
            "Route sheet for {}: {} zones, {} without location, {} without stock",
            task_id,
            sheet.zones.len(),
            sheet.no_location_count,
            sheet.no_stock_count
        );

        Ok(RouteSheetResponse { task, sheet })
    }

    /// Complete a task once every line is picked and every box closed. A
    /// shipment document is created upstream when a client is given; failing
    /// to create it does not block completion.
    pub async fn complete(
        &self,
        task_id: Uuid,
        client: Option<&MoySkladClient>,
    ) -> AppResult<TaskCompleted> {
        let task = self.get_task(task_id).await?;
        task.ensure_active()?;
        let items = self.get_items(task_id).await?;

        let remaining = items
            .iter()
            .filter(|i| i.scanned_qty < i.planned_qty)
            .count();
        if remaining > 0 {
            return Err(AppError::invalid_state(
                &format!("{} lines are not picked yet", remaining),
                &format!("Не все позиции собраны, осталось: {}", remaining),
            ));
        }

        let open_boxes: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM boxes WHERE task_id = $1 AND status <> $2",
        )
        .bind(task_id)
        .bind(BoxStatus::Closed.as_str())
        .fetch_one(&self.db)
        .await?;
        if open_boxes > 0 {
            return Err(AppError::invalid_state(
                &format!("Close all boxes first ({} open)", open_boxes),
                "Закройте все короба перед завершением",
            ));
        }

        let shipment_id = match client {
            Some(client) => {
                let positions: Vec<DocumentPosition> = items
                    .iter()
                    .filter(|i| !i.meta_href.is_empty())
                    .map(|i| DocumentPosition {
                        product_href: i.meta_href.clone(),
                        quantity: i.planned_qty,
                        price: i.price,
                    })
                    .collect();
                match client
                    .create_demand(&format!("Сборка: {}", task.name), &positions)
                    .await
                {
                    Ok(id) => Some(id),
                    Err(e) => {
                        tracing::warn!("Shipment for task {} skipped: {}", task_id, e);
                        None
                    }
                }
            }
            None => None,
        };

        let packed_items: i64 = items.iter().map(|i| i64::from(i.scanned_qty)).sum();
        sqlx::query(
            r#"
            UPDATE packing_tasks
            SET status = $2, completed_at = NOW(), packed_items = $3, shipment_id = $4
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(PackingTaskStatus::Completed.as_str())
        .bind(packed_items as i32)
        .bind(&shipment_id)
        .execute(&self.db)
        .await?;

        ActionLogService::new(self.db.clone())
            .record(
                "packing_task_completed",
                Some("packing_task"),
                Some(&task_id.to_string()),
                json!({ "shipment_id": shipment_id, "packed_items": packed_items }),
            )
            .await;

        Ok(TaskCompleted {
            task_id,
            packed_items,
            shipment_id,
            message: "Сборка завершена".to_string(),
        })
    }
}
