//! Goods receipt workflow
//!
//! A session is opened, optionally from a purchase order, products are
//! scanned in and on completion the inventory system gets a supply for the
//! ordered products and an enter document for surplus ones.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::{
    defect_summary, session_name, validate_barcode, validate_non_negative, validate_positive,
    DefectLine, LastScan, ReceivingStatus, UndoAction,
};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::external::moysklad::{DocumentPosition, MoySkladClient, SupplyDraft};
use crate::services::action_log::ActionLogService;
use crate::services::product::ProductService;

const ENTER_DESCRIPTION: &str = "Пересорт при приемке";

#[derive(Clone)]
pub struct ReceivingService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PurchaseOrderSummary {
    pub id: String,
    pub name: String,
    pub moment: Option<DateTime<Utc>>,
    pub agent_name: Option<String>,
    pub total_items: i32,
    pub items_count: i64,
    pub total_qty: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PurchaseOrderItem {
    pub product_id: String,
    pub quantity: i32,
    pub price: Decimal,
    pub name: String,
    pub barcode: Option<String>,
    pub article: Option<String>,
    pub sku: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrderDetail {
    #[serde(flatten)]
    pub order: PurchaseOrderSummary,
    pub items: Vec<PurchaseOrderItem>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReceivingSession {
    pub id: Uuid,
    pub name: String,
    pub purchase_order_id: Option<String>,
    pub status: String,
    pub total_ordered: i32,
    pub total_received: i32,
    #[serde(skip)]
    pub last_scan: Option<Json<LastScan>>,
    pub supply_id: Option<String>,
    pub enter_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub order_name: Option<String>,
    pub agent_name: Option<String>,
}

impl ReceivingSession {
    fn ensure_active(&self) -> AppResult<()> {
        match ReceivingStatus::parse(&self.status) {
            Some(ReceivingStatus::Active) => Ok(()),
            _ => Err(AppError::conflict(
                "receiving_session",
                "Session is not active",
                "Приемка не активна",
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReceivingItem {
    pub id: Uuid,
    pub product_id: String,
    pub ordered_qty: i32,
    pub received_qty: i32,
    pub defect_qty: i32,
    pub is_extra: bool,
    /// Ordered price, falls back to the catalogue price
    pub price: Decimal,
    pub name: String,
    pub barcode: Option<String>,
    pub article: Option<String>,
    pub sku: Option<String>,
    pub image_url: Option<String>,
    pub meta_href: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: ReceivingSession,
    pub can_undo: bool,
    pub items: Vec<ReceivingItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionInput {
    #[serde(default, alias = "purchaseOrderId")]
    pub purchase_order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReceivingScanInput {
    pub barcode: String,
    pub quantity: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceivingScanResult {
    pub item_id: Uuid,
    pub product: String,
    pub ordered: i32,
    pub received: i32,
    pub is_extra: bool,
    pub can_undo: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UndoResult {
    pub item_id: Uuid,
    pub product: String,
    pub undone_qty: i32,
    pub line_removed: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemInput {
    pub received_qty: Option<i32>,
    pub defect_qty: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct DefectInput {
    #[serde(default)]
    pub defect_qty: i32,
}

#[derive(Debug, Deserialize)]
pub struct AddItemInput {
    #[serde(alias = "productId")]
    pub product_id: String,
    pub quantity: Option<i32>,
    /// Not part of the order (re-sort or surplus)
    #[serde(default = "default_extra", alias = "isExtra")]
    pub is_extra: bool,
}

fn default_extra() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceivingCompleted {
    pub session_id: Uuid,
    pub supply_id: Option<String>,
    pub enter_id: Option<String>,
    pub message: String,
}

/// Session joined with the purchase order fields needed for documents
#[derive(Debug, FromRow)]
struct CompletionContext {
    status: String,
    order_href: Option<String>,
    agent_meta: Option<Value>,
    organization_meta: Option<Value>,
    store_meta: Option<Value>,
}

const SESSION_SELECT: &str = r#"
    SELECT rs.id, rs.name, rs.purchase_order_id, rs.status, rs.total_ordered, rs.total_received,
           rs.last_scan, rs.supply_id, rs.enter_id, rs.created_at, rs.completed_at,
           po.name AS order_name, po.agent_name
    FROM receiving_sessions rs
    LEFT JOIN purchase_orders po ON po.id = rs.purchase_order_id
"#;

const ITEM_SELECT: &str = r#"
    SELECT ri.id, ri.product_id, ri.ordered_qty, ri.received_qty, ri.defect_qty, ri.is_extra,
           CASE WHEN ri.price > 0 THEN ri.price ELSE p.price END AS price,
           p.name, p.barcode, p.article, p.sku, p.image_url, p.meta_href
    FROM receiving_items ri
    JOIN products p ON p.id = ri.product_id
"#;

impl ReceivingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_orders(&self) -> AppResult<Vec<PurchaseOrderSummary>> {
        let orders = sqlx::query_as::<_, PurchaseOrderSummary>(
            r#"
            SELECT po.id, po.name, po.moment, po.agent_name, po.total_items,
                   COUNT(poi.id) AS items_count,
                   COALESCE(SUM(poi.quantity), 0)::BIGINT AS total_qty
            FROM purchase_orders po
            LEFT JOIN purchase_order_items poi ON poi.order_id = po.id
            GROUP BY po.id
            ORDER BY po.moment DESC NULLS LAST
            LIMIT 100
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(orders)
    }

    pub async fn get_order(&self, order_id: &str) -> AppResult<PurchaseOrderDetail> {
        let order = sqlx::query_as::<_, PurchaseOrderSummary>(
            r#"
            SELECT po.id, po.name, po.moment, po.agent_name, po.total_items,
                   COUNT(poi.id) AS items_count,
                   COALESCE(SUM(poi.quantity), 0)::BIGINT AS total_qty
            FROM purchase_orders po
            LEFT JOIN purchase_order_items poi ON poi.order_id = po.id
            WHERE po.id = $1
            GROUP BY po.id
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase order".to_string()))?;

        let items = sqlx::query_as::<_, PurchaseOrderItem>(
            r#"
            SELECT poi.product_id, poi.quantity, poi.price,
                   p.name, p.barcode, p.article, p.sku, p.image_url
            FROM purchase_order_items poi
            JOIN products p ON p.id = poi.product_id
            WHERE poi.order_id = $1
            ORDER BY p.name
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;

        Ok(PurchaseOrderDetail { order, items })
    }

    pub async fn list_sessions(&self) -> AppResult<Vec<ReceivingSession>> {
        let sql = format!("{} ORDER BY rs.created_at DESC", SESSION_SELECT);
        let sessions = sqlx::query_as::<_, ReceivingSession>(&sql)
            .fetch_all(&self.db)
            .await?;
        Ok(sessions)
    }

    pub async fn get_session(&self, session_id: Uuid) -> AppResult<ReceivingSession> {
        let sql = format!("{} WHERE rs.id = $1", SESSION_SELECT);
        sqlx::query_as::<_, ReceivingSession>(&sql)
            .bind(session_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Receiving session".to_string()))
    }

    async fn get_items(&self, session_id: Uuid) -> AppResult<Vec<ReceivingItem>> {
        let sql = format!(
            "{} WHERE ri.session_id = $1 ORDER BY ri.is_extra, p.name",
            ITEM_SELECT
        );
        let items = sqlx::query_as::<_, ReceivingItem>(&sql)
            .bind(session_id)
            .fetch_all(&self.db)
            .await?;
        Ok(items)
    }

    async fn get_item(&self, session_id: Uuid, item_id: Uuid) -> AppResult<ReceivingItem> {
        let sql = format!("{} WHERE ri.session_id = $1 AND ri.id = $2", ITEM_SELECT);
        sqlx::query_as::<_, ReceivingItem>(&sql)
            .bind(session_id)
            .bind(item_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Receiving item".to_string()))
    }

    pub async fn get_session_detail(&self, session_id: Uuid) -> AppResult<SessionDetail> {
        let session = self.get_session(session_id).await?;
        let items = self.get_items(session_id).await?;
        Ok(SessionDetail {
            can_undo: session.last_scan.is_some(),
            session,
            items,
        })
    }

    /// Open a session. With a purchase order its positions become the
    /// expected lines.
    pub async fn create_session(&self, input: CreateSessionInput) -> AppResult<ReceivingSession> {
        let order_id = input
            .purchase_order_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        let order_name = match &order_id {
            Some(id) => Some(
                sqlx::query_scalar::<_, String>("SELECT name FROM purchase_orders WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.db)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Purchase order".to_string()))?,
            ),
            None => None,
        };

        let session_id = Uuid::new_v4();
        let name = session_name(order_name.as_deref(), chrono::Local::now().date_naive());

        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO receiving_sessions (id, name, purchase_order_id, status)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(session_id)
        .bind(&name)
        .bind(&order_id)
        .bind(ReceivingStatus::Active.as_str())
        .execute(&mut *tx)
        .await?;

        if let Some(id) = &order_id {
            sqlx::query(
                r#"
                INSERT INTO receiving_items (id, session_id, product_id, ordered_qty, price, is_extra)
                SELECT gen_random_uuid(), $1, poi.product_id, SUM(poi.quantity), MAX(poi.price), FALSE
                FROM purchase_order_items poi
                JOIN products p ON p.id = poi.product_id
                WHERE poi.order_id = $2
                GROUP BY poi.product_id
                "#,
            )
            .bind(session_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                UPDATE receiving_sessions
                SET total_ordered = (SELECT COALESCE(SUM(ordered_qty), 0) FROM receiving_items WHERE session_id = $1)
                WHERE id = $1
                "#,
            )
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        ActionLogService::new(self.db.clone())
            .record(
                "receiving_session_created",
                Some("receiving_session"),
                Some(&session_id.to_string()),
                json!({ "purchaseOrderId": order_id }),
            )
            .await;

        self.get_session(session_id).await
    }

    /// Scan a product in. Unknown lines are added as surplus; the scan is
    /// remembered for undo.
    pub async fn scan(
        &self,
        session_id: Uuid,
        input: ReceivingScanInput,
    ) -> AppResult<ReceivingScanResult> {
        let barcode = validate_barcode(&input.barcode)?;
        let quantity = validate_positive("quantity", input.quantity.unwrap_or(1))?;
        self.get_session(session_id).await?.ensure_active()?;

        let product = ProductService::new(self.db.clone())
            .find_by_barcode(&barcode)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product with barcode {}", barcode)))?;

        let mut tx = self.db.begin().await?;

        let existing = sqlx::query_as::<_, (Uuid, i32)>(
            r#"
            SELECT id, received_qty FROM receiving_items
            WHERE session_id = $1 AND product_id = $2
            FOR UPDATE
            "#,
        )
        .bind(session_id)
        .bind(&product.id)
        .fetch_optional(&mut *tx)
        .await?;

        let last_scan = match existing {
            Some((item_id, previous_qty)) => {
                sqlx::query(
                    "UPDATE receiving_items SET received_qty = received_qty + $2 WHERE id = $1",
                )
                .bind(item_id)
                .bind(quantity)
                .execute(&mut *tx)
                .await?;
                LastScan {
                    item_id,
                    quantity,
                    previous_qty,
                    created_line: false,
                }
            }
            None => {
                let item_id = Uuid::new_v4();
                sqlx::query(
                    r#"
                    INSERT INTO receiving_items (id, session_id, product_id, ordered_qty, received_qty, is_extra)
                    VALUES ($1, $2, $3, 0, $4, TRUE)
                    "#,
                )
                .bind(item_id)
                .bind(session_id)
                .bind(&product.id)
                .bind(quantity)
                .execute(&mut *tx)
                .await?;
                LastScan {
                    item_id,
                    quantity,
                    previous_qty: 0,
                    created_line: true,
                }
            }
        };

        refresh_totals(&mut tx, session_id, Some(last_scan)).await?;
        tx.commit().await?;

        let item = self.get_item(session_id, last_scan.item_id).await?;
        Ok(ReceivingScanResult {
            item_id: item.id,
            product: item.name,
            ordered: item.ordered_qty,
            received: item.received_qty,
            is_extra: item.is_extra,
            can_undo: true,
        })
    }

    /// Revert the most recent scan of a session
    pub async fn undo_last_scan(&self, session_id: Uuid) -> AppResult<UndoResult> {
        let session = self.get_session(session_id).await?;
        session.ensure_active()?;
        let Some(Json(last_scan)) = session.last_scan else {
            return Err(AppError::invalid_state("Nothing to undo", "Нечего отменять"));
        };

        let item = self.get_item(session_id, last_scan.item_id).await?;
        let action = last_scan.undo_action(item.received_qty);

        let mut tx = self.db.begin().await?;
        match action {
            UndoAction::DeleteLine => {
                sqlx::query("DELETE FROM receiving_items WHERE id = $1")
                    .bind(item.id)
                    .execute(&mut *tx)
                    .await?;
            }
            UndoAction::RestoreQuantity(qty) => {
                sqlx::query("UPDATE receiving_items SET received_qty = $2 WHERE id = $1")
                    .bind(item.id)
                    .bind(qty)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        refresh_totals(&mut tx, session_id, None).await?;
        tx.commit().await?;

        Ok(UndoResult {
            item_id: item.id,
            message: format!("Отменено: {}", item.name),
            product: item.name,
            undone_qty: last_scan.quantity,
            line_removed: action == UndoAction::DeleteLine,
        })
    }

    /// Manual correction of received and defective quantities
    pub async fn update_item(
        &self,
        session_id: Uuid,
        item_id: Uuid,
        input: UpdateItemInput,
    ) -> AppResult<ReceivingItem> {
        self.get_session(session_id).await?.ensure_active()?;
        self.get_item(session_id, item_id).await?;
        let received = input
            .received_qty
            .map(|q| validate_non_negative("received_qty", q))
            .transpose()?;

        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"
            UPDATE receiving_items
            SET received_qty = COALESCE($3, received_qty),
                defect_qty = COALESCE($4, defect_qty)
            WHERE id = $1 AND session_id = $2
            "#,
        )
        .bind(item_id)
        .bind(session_id)
        .bind(received)
        .bind(input.defect_qty.map(|q| q.max(0)))
        .execute(&mut *tx)
        .await?;
        refresh_totals(&mut tx, session_id, None).await?;
        tx.commit().await?;

        self.get_item(session_id, item_id).await
    }

    pub async fn set_defect(
        &self,
        session_id: Uuid,
        item_id: Uuid,
        input: DefectInput,
    ) -> AppResult<ReceivingItem> {
        self.get_item(session_id, item_id).await?;

        sqlx::query("UPDATE receiving_items SET defect_qty = $2 WHERE id = $1")
            .bind(item_id)
            .bind(input.defect_qty.max(0))
            .execute(&self.db)
            .await?;

        self.get_item(session_id, item_id).await
    }

    /// Add a product by hand, increasing an existing line
    pub async fn add_item(&self, session_id: Uuid, input: AddItemInput) -> AppResult<ReceivingItem> {
        let quantity = validate_positive("quantity", input.quantity.unwrap_or(1))?;
        self.get_session(session_id).await?.ensure_active()?;
        let product = ProductService::new(self.db.clone())
            .get(input.product_id.trim())
            .await?
            .product;

        let mut tx = self.db.begin().await?;
        let item_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO receiving_items (id, session_id, product_id, ordered_qty, received_qty, is_extra)
            VALUES ($1, $2, $3, 0, $4, $5)
            ON CONFLICT (session_id, product_id)
            DO UPDATE SET received_qty = receiving_items.received_qty + EXCLUDED.received_qty
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(&product.id)
        .bind(quantity)
        .bind(input.is_extra)
        .fetch_one(&mut *tx)
        .await?;
        refresh_totals(&mut tx, session_id, None).await?;
        tx.commit().await?;

        self.get_item(session_id, item_id).await
    }

    /// Close the session: ordered lines go into a supply linked to the
    /// purchase order, surplus lines into an enter document.
    pub async fn complete(
        &self,
        session_id: Uuid,
        client: &MoySkladClient,
    ) -> AppResult<ReceivingCompleted> {
        let context = sqlx::query_as::<_, CompletionContext>(
            r#"
            SELECT rs.status, po.meta_href AS order_href,
                   po.agent_meta, po.organization_meta, po.store_meta
            FROM receiving_sessions rs
            LEFT JOIN purchase_orders po ON po.id = rs.purchase_order_id
            WHERE rs.id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Receiving session".to_string()))?;

        if ReceivingStatus::parse(&context.status) != Some(ReceivingStatus::Active) {
            return Err(AppError::conflict(
                "receiving_session",
                "Session is not active",
                "Приемка не активна",
            ));
        }

        let items = self.get_items(session_id).await?;
        let received: Vec<&ReceivingItem> = items.iter().filter(|i| i.received_qty > 0).collect();
        if received.is_empty() {
            return Err(AppError::invalid_state(
                "No items received",
                "Нет принятых товаров",
            ));
        }

        let (extra, main): (Vec<&ReceivingItem>, Vec<&ReceivingItem>) =
            received.into_iter().partition(|i| i.is_extra);

        let defects: Vec<DefectLine> = items
            .iter()
            .map(|i| DefectLine {
                article: i.article.clone(),
                name: i.name.clone(),
                defect_qty: i.defect_qty,
            })
            .collect();

        let organization = match context.organization_meta {
            Some(meta) => meta,
            None => client.default_organization_meta().await?.ok_or_else(|| {
                AppError::ExternalService("No organization in the inventory system".to_string())
            })?,
        };
        let store = match context.store_meta {
            Some(meta) => meta,
            None => client.default_store_meta().await?.ok_or_else(|| {
                AppError::ExternalService("No store in the inventory system".to_string())
            })?,
        };

        let mut supply_id = None;
        if !main.is_empty() {
            let agent = match context.agent_meta {
                Some(meta) => Some(meta),
                None => client.default_agent_meta().await.unwrap_or_else(|e| {
                    tracing::warn!("Default counterparty lookup failed: {}", e);
                    None
                }),
            };
            let Some(agent) = agent else {
                return Err(AppError::invalid_state(
                    "No counterparty for the supply",
                    "Не найден контрагент для приёмки",
                ));
            };

            let draft = SupplyDraft {
                organization_meta: organization.clone(),
                store_meta: store.clone(),
                agent_meta: agent,
                purchase_order_href: context.order_href.filter(|h| !h.is_empty()),
                description: defect_summary(&defects),
                positions: positions(&main),
            };
            supply_id = Some(client.create_supply(&draft).await?);
        }

        let mut enter_id = None;
        if !extra.is_empty() {
            enter_id = Some(
                client
                    .create_enter(&organization, &store, ENTER_DESCRIPTION, &positions(&extra))
                    .await?,
            );
        }

        sqlx::query(
            r#"
            UPDATE receiving_sessions
            SET status = $2, completed_at = NOW(), supply_id = $3, enter_id = $4
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .bind(ReceivingStatus::Completed.as_str())
        .bind(&supply_id)
        .bind(&enter_id)
        .execute(&self.db)
        .await?;

        ActionLogService::new(self.db.clone())
            .record(
                "receiving_completed",
                Some("receiving_session"),
                Some(&session_id.to_string()),
                json!({ "supplyId": supply_id, "enterId": enter_id }),
            )
            .await;

        let mut message = "Приемка завершена".to_string();
        if supply_id.is_some() {
            message.push_str(". Приемка создана");
        }
        if enter_id.is_some() {
            message.push_str(". Оприходование создано");
        }

        Ok(ReceivingCompleted {
            session_id,
            supply_id,
            enter_id,
            message,
        })
    }

    pub async fn cancel(&self, session_id: Uuid) -> AppResult<ReceivingSession> {
        self.get_session(session_id).await?.ensure_active()?;

        sqlx::query("UPDATE receiving_sessions SET status = $2 WHERE id = $1 AND status = $3")
            .bind(session_id)
            .bind(ReceivingStatus::Cancelled.as_str())
            .bind(ReceivingStatus::Active.as_str())
            .execute(&self.db)
            .await?;

        self.get_session(session_id).await
    }
}

fn positions(items: &[&ReceivingItem]) -> Vec<DocumentPosition> {
    items
        .iter()
        .filter(|i| !i.meta_href.is_empty())
        .map(|i| DocumentPosition {
            product_href: i.meta_href.clone(),
            quantity: i.received_qty,
            price: i.price,
        })
        .collect()
}

/// Recompute the received total; `last_scan` replaces the remembered scan
async fn refresh_totals(
    tx: &mut Transaction<'_, Postgres>,
    session_id: Uuid,
    last_scan: Option<LastScan>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE receiving_sessions
        SET total_received = (SELECT COALESCE(SUM(received_qty), 0) FROM receiving_items WHERE session_id = $1),
            last_scan = $2
        WHERE id = $1
        "#,
    )
    .bind(session_id)
    .bind(last_scan.map(Json))
    .execute(&mut **tx)
    .await?;

    Ok(())
}
