//! Catalogue sync from the inventory system
//!
//! Pulls products, variants, stock and purchase orders, merges stock into the
//! catalogue and then reconciles product locations.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use shared::report::last_path_segment;
use shared::{
    ensure_stock_coverage, merge_stock, price_from_minor_units, CatalogProduct, SyncState,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::error::{AppError, AppResult};
use crate::external::MoySkladClient;
use crate::services::action_log::ActionLogService;
use crate::services::location::{LocationService, LocationSyncSummary};
use crate::services::slot_cache::SlotNameCache;

#[derive(Clone)]
pub struct SyncService {
    db: PgPool,
    client: MoySkladClient,
    locations: LocationService,
    cache: SlotNameCache,
}

/// Persisted state of the last sync
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SyncStatus {
    pub status: String,
    pub last_sync: Option<DateTime<Utc>>,
    pub products_count: i32,
    pub orders_count: i32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub products_count: usize,
    pub orders_count: usize,
    pub with_images: usize,
    pub locations: Option<LocationSyncSummary>,
    pub message: String,
}

/// Purchase order header as stored for receiving
#[derive(Debug, Clone, PartialEq)]
struct OrderRecord {
    id: String,
    name: String,
    moment: Option<DateTime<Utc>>,
    agent_name: Option<String>,
    total_items: i32,
    meta_href: String,
    agent_meta: Option<Value>,
    organization_meta: Option<Value>,
    store_meta: Option<Value>,
}

impl OrderRecord {
    fn from_entity(order: &Value) -> Option<Self> {
        let id = order.get("id").and_then(Value::as_str)?.to_string();
        let text = |pointer: &str| {
            order
                .pointer(pointer)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Some(Self {
            name: text("/name").unwrap_or_default(),
            moment: text("/moment").and_then(|m| parse_moment(&m)),
            agent_name: text("/agent/name"),
            total_items: order
                .pointer("/positions/meta/size")
                .and_then(Value::as_i64)
                .and_then(|n| i32::try_from(n).ok())
                .unwrap_or(0),
            meta_href: text("/meta/href").unwrap_or_default(),
            agent_meta: order.pointer("/agent/meta").cloned(),
            organization_meta: order.pointer("/organization/meta").cloned(),
            store_meta: order.pointer("/store/meta").cloned(),
            id,
        })
    }
}

/// Ordered quantity of one product
#[derive(Debug, Clone, PartialEq)]
struct OrderPosition {
    product_id: String,
    quantity: i32,
    price: Decimal,
}

impl OrderPosition {
    fn from_entity(position: &Value) -> Option<Self> {
        let href = position
            .pointer("/assortment/meta/href")
            .and_then(Value::as_str)?;
        let quantity = position
            .get("quantity")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
            .round();

        Some(Self {
            product_id: last_path_segment(href)?.to_string(),
            quantity: Decimal::try_from(quantity).ok()?.to_i32()?,
            price: position
                .get("price")
                .and_then(price_from_minor_units)
                .unwrap_or(Decimal::ZERO),
        })
    }
}

/// The inventory system reports moments as "2026-03-07 09:05:00.000" in
/// Moscow time
fn parse_moment(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").ok()?;
    let moscow = chrono::FixedOffset::east_opt(3 * 3600)?;
    naive
        .and_local_timezone(moscow)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

impl SyncService {
    pub fn new(
        db: PgPool,
        client: MoySkladClient,
        locations: LocationService,
        cache: SlotNameCache,
    ) -> Self {
        Self {
            db,
            client,
            locations,
            cache,
        }
    }

    /// Readable without inventory credentials
    pub async fn status(db: &PgPool) -> AppResult<SyncStatus> {
        let status = sqlx::query_as::<_, SyncStatus>(
            r#"
            SELECT status, last_sync, products_count, orders_count, error
            FROM sync_status
            WHERE id = 1
            "#,
        )
        .fetch_optional(db)
        .await?
        .unwrap_or(SyncStatus {
            status: SyncState::Idle.as_str().to_string(),
            last_sync: None,
            products_count: 0,
            orders_count: 0,
            error: None,
        });

        Ok(status)
    }

    async fn set_state(&self, state: SyncState, error: Option<&str>) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_status (id, status, error) VALUES (1, $1, $2)
            ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, error = EXCLUDED.error
            "#,
        )
        .bind(state.as_str())
        .bind(error)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Full catalogue sync. The sync status and action log record the
    /// outcome either way.
    pub async fn sync_all(&self) -> AppResult<SyncSummary> {
        let log = ActionLogService::new(self.db.clone());
        self.set_state(SyncState::Syncing, None).await?;
        log.record("sync_started", Some("products"), None, json!({})).await;

        match self.run().await {
            Ok(summary) => {
                log.record(
                    "sync_completed",
                    Some("products"),
                    None,
                    json!({
                        "products": summary.products_count,
                        "orders": summary.orders_count,
                        "withImages": summary.with_images,
                    }),
                )
                .await;
                Ok(summary)
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!("Sync failed: {}", message);
                if let Err(status_err) = self.set_state(SyncState::Error, Some(&message)).await {
                    tracing::warn!("Failed to record sync failure: {}", status_err);
                }
                log.record("sync_failed", None, None, json!({ "error": message }))
                    .await;
                Err(e)
            }
        }
    }

    async fn run(&self) -> AppResult<SyncSummary> {
        let store_id = self.locations.resolve_store_id().await?;
        let store_href = store_id.as_deref().map(|id| self.client.store_href(id));

        let assortment = self.client.get_all_assortment().await?;
        tracing::info!("Fetched {} products and variants", assortment.len());

        let stock_rows = self.client.get_stock(store_href.as_deref()).await?;
        let stock = merge_stock(&stock_rows);
        tracing::info!(
            "Stock report: {} rows, {} ids, {} barcodes, {} articles",
            stock_rows.len(),
            stock.by_id.len(),
            stock.by_barcode.len(),
            stock.by_article.len()
        );

        ensure_stock_coverage(&stock, stock_rows.len(), assortment.len())
            .map_err(|e| AppError::UpstreamUnavailable(e.to_string()))?;

        let products: Vec<CatalogProduct> = assortment
            .iter()
            .filter_map(|entity| CatalogProduct::from_assortment(entity, &stock))
            .collect();

        let mut tx = self.db.begin().await?;
        for product in &products {
            upsert_product(&mut tx, product).await?;
        }
        tx.commit().await?;

        let with_images = products.iter().filter(|p| p.image_url.is_some()).count();
        tracing::info!(
            "Saved {} products ({} with images)",
            products.len(),
            with_images
        );

        let orders_count = self.sync_purchase_orders().await?;

        sqlx::query(
            r#"
            UPDATE sync_status
            SET status = $1, last_sync = NOW(), products_count = $2, orders_count = $3, error = NULL
            WHERE id = 1
            "#,
        )
        .bind(SyncState::Success.as_str())
        .bind(products.len() as i32)
        .bind(orders_count as i32)
        .execute(&self.db)
        .await?;

        if let Some(id) = &store_id {
            self.cache.invalidate(id).await;
        }

        let ids: Vec<String> = products.iter().map(|p| p.id.clone()).collect();
        let locations = match self.locations.reconcile_locations(&ids).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!("Location reconciliation after sync failed: {}", e);
                None
            }
        };

        Ok(SyncSummary {
            message: format!(
                "Синхронизировано: {} товаров, {} заказов, {} с фото",
                products.len(),
                orders_count,
                with_images
            ),
            products_count: products.len(),
            orders_count,
            with_images,
            locations,
        })
    }

    async fn sync_purchase_orders(&self) -> AppResult<usize> {
        let orders: Vec<OrderRecord> = self
            .client
            .get_purchase_orders()
            .await?
            .iter()
            .filter_map(OrderRecord::from_entity)
            .collect();

        for order in &orders {
            let positions = if order.total_items > 0 {
                self.client
                    .get_purchase_order_positions(&order.id)
                    .await?
                    .iter()
                    .filter_map(OrderPosition::from_entity)
                    .collect()
            } else {
                Vec::new()
            };

            let mut tx = self.db.begin().await?;
            upsert_order(&mut tx, order).await?;
            if order.total_items > 0 {
                sqlx::query("DELETE FROM purchase_order_items WHERE order_id = $1")
                    .bind(&order.id)
                    .execute(&mut *tx)
                    .await?;
                for position in &positions {
                    sqlx::query(
                        r#"
                        INSERT INTO purchase_order_items (order_id, product_id, quantity, price)
                        VALUES ($1, $2, $3, $4)
                        "#,
                    )
                    .bind(&order.id)
                    .bind(&position.product_id)
                    .bind(position.quantity)
                    .bind(position.price)
                    .execute(&mut *tx)
                    .await?;
                }
            }
            tx.commit().await?;
        }

        tracing::info!("Synced {} purchase orders", orders.len());
        Ok(orders.len())
    }
}

/// Catalogue fields only; `cell_address` and `slot_id` belong to location
/// reconciliation.
async fn upsert_product(
    tx: &mut Transaction<'_, Postgres>,
    product: &CatalogProduct,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO products (
            id, name, article, sku, barcode, price, stock, image_url, meta_href, requires_marking
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            article = EXCLUDED.article,
            sku = EXCLUDED.sku,
            barcode = EXCLUDED.barcode,
            price = EXCLUDED.price,
            stock = EXCLUDED.stock,
            image_url = EXCLUDED.image_url,
            meta_href = EXCLUDED.meta_href,
            requires_marking = EXCLUDED.requires_marking,
            updated_at = NOW()
        "#,
    )
    .bind(&product.id)
    .bind(&product.name)
    .bind(&product.article)
    .bind(&product.sku)
    .bind(&product.barcode)
    .bind(product.price)
    .bind(product.stock)
    .bind(&product.image_url)
    .bind(&product.meta_href)
    .bind(product.requires_marking)
    .execute(&mut **tx)
    .await?;

    sqlx::query("DELETE FROM product_barcodes WHERE product_id = $1")
        .bind(&product.id)
        .execute(&mut **tx)
        .await?;

    for barcode in &product.barcodes {
        sqlx::query(
            r#"
            INSERT INTO product_barcodes (product_id, barcode, barcode_type, pack_name)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (product_id, barcode) DO NOTHING
            "#,
        )
        .bind(&product.id)
        .bind(&barcode.barcode)
        .bind(barcode.kind.as_str())
        .bind(&barcode.pack_name)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

async fn upsert_order(tx: &mut Transaction<'_, Postgres>, order: &OrderRecord) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO purchase_orders (
            id, name, moment, agent_name, total_items, meta_href,
            agent_meta, organization_meta, store_meta
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            moment = EXCLUDED.moment,
            agent_name = EXCLUDED.agent_name,
            total_items = EXCLUDED.total_items,
            meta_href = EXCLUDED.meta_href,
            agent_meta = EXCLUDED.agent_meta,
            organization_meta = EXCLUDED.organization_meta,
            store_meta = EXCLUDED.store_meta,
            updated_at = NOW()
        "#,
    )
    .bind(&order.id)
    .bind(&order.name)
    .bind(order.moment)
    .bind(&order.agent_name)
    .bind(order.total_items)
    .bind(&order.meta_href)
    .bind(&order.agent_meta)
    .bind(&order.organization_meta)
    .bind(&order.store_meta)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_order_record() {
        let order = json!({
            "id": "po-1",
            "name": "00042",
            "moment": "2026-03-07 09:05:00.000",
            "agent": { "name": " ООО Поставщик ", "meta": { "href": "https://x/entity/counterparty/a" } },
            "positions": { "meta": { "size": 3 } },
            "meta": { "href": "https://x/entity/purchaseorder/po-1" }
        });

        let record = OrderRecord::from_entity(&order).unwrap();
        assert_eq!(record.agent_name.as_deref(), Some("ООО Поставщик"));
        assert_eq!(record.total_items, 3);
        assert!(record.organization_meta.is_none());
        assert_eq!(record.moment.unwrap().hour(), 6);
    }

    #[test]
    fn test_order_position() {
        let position = json!({
            "quantity": 4.0,
            "price": 12950,
            "assortment": { "meta": { "href": "https://x/entity/product/abc-123" } }
        });

        let parsed = OrderPosition::from_entity(&position).unwrap();
        assert_eq!(parsed.product_id, "abc-123");
        assert_eq!(parsed.quantity, 4);
        assert_eq!(parsed.price, Decimal::new(12950, 2));

        assert!(OrderPosition::from_entity(&json!({ "quantity": 1 })).is_none());
    }
}
