//! Product storage locations
//!
//! Binds products to warehouse cells from the inventory system's
//! "stock by slot" report, and imports cells from an uploaded report file.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::json;
use shared::{reconcile, ProductLocation};
use sqlx::{FromRow, PgPool};

use crate::error::AppResult;
use crate::external::MoySkladClient;
use crate::services::action_log::ActionLogService;
use crate::services::location_import::parse_cell_report;
use crate::services::settings::{SettingsService, STORE_ID_KEY};
use crate::services::slot_cache::SlotNameCache;

#[derive(Clone)]
pub struct LocationService {
    db: PgPool,
    client: MoySkladClient,
    cache: SlotNameCache,
    configured_store_id: Option<String>,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct LocationSyncSummary {
    pub store_id: Option<String>,
    pub requested: usize,
    pub rows_fetched: usize,
    pub failed_chunks: usize,
    pub resolved: usize,
    pub preserved: usize,
    pub updated_count: usize,
}

/// Outcome of a cell report import
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationImportSummary {
    pub updated: usize,
    pub sku_mapped: usize,
    pub article_mapped: usize,
}

#[derive(Debug, FromRow)]
struct LocationRow {
    id: String,
    cell_address: Option<String>,
    slot_id: Option<String>,
}

impl LocationService {
    pub fn new(
        db: PgPool,
        client: MoySkladClient,
        cache: SlotNameCache,
        configured_store_id: Option<String>,
    ) -> Self {
        Self {
            db,
            client,
            cache,
            configured_store_id: configured_store_id.filter(|id| !id.trim().is_empty()),
        }
    }

    /// Store for slot reports: persisted setting, then configuration, then a
    /// lookup of the configured store name.
    pub async fn resolve_store_id(&self) -> AppResult<Option<String>> {
        if let Some(id) = SettingsService::new(self.db.clone()).get(STORE_ID_KEY).await? {
            return Ok(Some(id));
        }
        if let Some(id) = &self.configured_store_id {
            return Ok(Some(id.clone()));
        }

        let store = self.client.find_store(self.client.store_name()).await?;
        if store.is_none() {
            tracing::warn!("Store '{}' not found", self.client.store_name());
        }
        Ok(store.map(|s| s.id))
    }

    /// Reconcile the locations of the given products against the current
    /// slot report and persist the ones that changed.
    pub async fn reconcile_locations(&self, product_ids: &[String]) -> AppResult<LocationSyncSummary> {
        let mut seen = HashSet::new();
        let ids: Vec<String> = product_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty() && seen.insert(*id))
            .map(str::to_string)
            .collect();

        let mut summary = LocationSyncSummary {
            requested: ids.len(),
            ..Default::default()
        };
        if ids.is_empty() {
            return Ok(summary);
        }

        let Some(store_id) = self.resolve_store_id().await? else {
            tracing::warn!("No store configured, skipping location reconciliation");
            return Ok(summary);
        };
        summary.store_id = Some(store_id.clone());

        let directory = self.cache.get_or_fetch(&self.client, &store_id).await?;
        let report = self.client.get_slot_stock(&ids, &store_id).await;
        summary.rows_fetched = report.rows_fetched;
        summary.failed_chunks = report.failed_chunks;

        if report.candidates.is_empty() {
            tracing::info!(
                "No slot rows for {} products ({} failed chunks), locations kept",
                ids.len(),
                report.failed_chunks
            );
            summary.preserved = ids.len();
            return Ok(summary);
        }

        let prior = self.load_locations(&ids).await?;
        let outcome = reconcile(&report.candidates, &directory, &prior);
        summary.resolved = outcome.resolved;
        summary.preserved = outcome.preserved;
        summary.updated_count = self.save_locations(&outcome.changed).await?;

        tracing::info!(
            "Locations: {} rows fetched, {} products bound to cells, {} preserved, {} updated",
            summary.rows_fetched,
            summary.resolved,
            summary.preserved,
            summary.updated_count
        );

        Ok(summary)
    }

    async fn load_locations(&self, ids: &[String]) -> AppResult<HashMap<String, ProductLocation>> {
        let rows = sqlx::query_as::<_, LocationRow>(
            r#"
            SELECT id, cell_address, slot_id
            FROM products
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.id.clone(),
                    ProductLocation {
                        product_id: row.id,
                        cell_address: row.cell_address,
                        slot_id: row.slot_id,
                    },
                )
            })
            .collect())
    }

    /// Upsert locations keyed by product id, returns the number of products
    /// updated
    async fn save_locations(&self, locations: &[ProductLocation]) -> AppResult<usize> {
        let mut tx = self.db.begin().await?;
        let mut updated = 0;

        for location in locations {
            let result = sqlx::query(
                r#"
                UPDATE products
                SET cell_address = $2, slot_id = $3, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(&location.product_id)
            .bind(&location.cell_address)
            .bind(&location.slot_id)
            .execute(&mut *tx)
            .await?;
            updated += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(updated)
    }

    /// Import cells from an uploaded "stock by cell" report. Products are
    /// matched by SKU first, then by article for those not matched yet.
    pub async fn import_cell_report(
        &self,
        file_name: Option<&str>,
        bytes: &[u8],
    ) -> AppResult<LocationImportSummary> {
        let report = parse_cell_report(bytes)?;

        let mut tx = self.db.begin().await?;
        let mut touched: HashSet<String> = HashSet::new();
        let mut updated = 0;

        for (code, best) in &report.by_code {
            let ids = sqlx::query_scalar::<_, String>(
                r#"
                UPDATE products SET cell_address = $2, updated_at = NOW()
                WHERE sku = $1
                RETURNING id
                "#,
            )
            .bind(code)
            .bind(&best.cell)
            .fetch_all(&mut *tx)
            .await?;
            updated += ids.len();
            touched.extend(ids);
        }

        let touched: Vec<String> = touched.into_iter().collect();
        for (article, best) in &report.by_article {
            let result = sqlx::query(
                r#"
                UPDATE products SET cell_address = $2, updated_at = NOW()
                WHERE article = $1 AND NOT (id = ANY($3))
                "#,
            )
            .bind(article)
            .bind(&best.cell)
            .bind(&touched)
            .execute(&mut *tx)
            .await?;
            updated += result.rows_affected() as usize;
        }

        tx.commit().await?;

        let summary = LocationImportSummary {
            updated,
            sku_mapped: report.by_code.len(),
            article_mapped: report.by_article.len(),
        };

        ActionLogService::new(self.db.clone())
            .record(
                "locations_uploaded",
                None,
                None,
                json!({
                    "file": file_name,
                    "rows": report.rows,
                    "skuMapped": summary.sku_mapped,
                    "articleMapped": summary.article_mapped,
                    "updated": summary.updated,
                }),
            )
            .await;

        tracing::info!("Cell report imported: {} products updated", updated);
        Ok(summary)
    }
}
