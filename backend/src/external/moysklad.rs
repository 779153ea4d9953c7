//! MoySklad inventory API client
//!
//! Read side: catalogue, stock reports, warehouse slots and purchase orders.
//! Write side: supply, enter and demand documents created on completion of
//! receiving and packing.

use base64::Engine;
use reqwest::{Client, RequestBuilder};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use shared::report::last_path_segment;
use shared::{full_image_url, image_url, RawSlotRow, RawStockRow, RawStoreByStoreRow, SlotCandidate, SlotDirectory, StockRecord};

use crate::config::MoySkladConfig;
use crate::error::{AppError, AppResult};

/// Upstream caps purchase order pages at 100 rows
const ORDER_PAGE_LIMIT: u32 = 100;
const MAX_PURCHASE_ORDERS: usize = 500;

/// MoySklad API client
#[derive(Clone)]
pub struct MoySkladClient {
    client: Client,
    base_url: String,
    auth_header: String,
    page_limit: u32,
    stock_mode: String,
    store_name: String,
    slot_chunk_size: usize,
}

/// Store reference resolved from the store directory
#[derive(Debug, Clone, Serialize)]
pub struct StoreRef {
    pub id: String,
    pub name: String,
    pub href: String,
}

/// Result of a connection check
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionCheck {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Slot report rows gathered over all chunks of one request
#[derive(Debug, Clone, Default)]
pub struct SlotReport {
    pub candidates: Vec<SlotCandidate>,
    pub rows_fetched: usize,
    pub failed_chunks: usize,
}

/// Position of a document to create
#[derive(Debug, Clone)]
pub struct DocumentPosition {
    pub product_href: String,
    pub quantity: i32,
    /// Price in roubles
    pub price: Decimal,
}

/// Goods receipt linked to a purchase order
#[derive(Debug, Clone)]
pub struct SupplyDraft {
    pub organization_meta: Value,
    pub store_meta: Value,
    pub agent_meta: Value,
    pub purchase_order_href: Option<String>,
    pub description: Option<String>,
    pub positions: Vec<DocumentPosition>,
}

/// Image bytes fetched through the API credentials
#[derive(Debug, Clone)]
pub struct DownloadedImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl MoySkladClient {
    /// Create a client from configuration. A bearer token wins over
    /// login/password; one of them is required.
    pub fn new(config: &MoySkladConfig) -> AppResult<Self> {
        let token = config.token.as_deref().map(str::trim).filter(|t| !t.is_empty());
        let auth_header = match (token, config.login.as_deref(), config.password.as_deref()) {
            (Some(token), _, _) => format!("Bearer {}", token),
            (None, Some(login), Some(password)) if !login.is_empty() => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", login, password));
                format!("Basic {}", encoded)
            }
            _ => {
                return Err(AppError::Configuration(
                    "MoySklad token or login/password is not configured".to_string(),
                ))
            }
        };

        let client = Client::builder()
            .gzip(true)
            .build()
            .map_err(|e| AppError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_header,
            page_limit: config.page_limit.max(1),
            stock_mode: config.stock_mode.clone(),
            store_name: config.store_name.trim().to_string(),
            slot_chunk_size: config.slot_chunk_size.max(1),
        })
    }

    /// Point the client at another API root (for testing)
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json;charset=utf-8")
            .header("Content-Type", "application/json")
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> AppResult<Value> {
        let response = self
            .request(builder)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("MoySklad {} failed: {}", what, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(500).collect();
            return Err(AppError::ExternalService(format!(
                "MoySklad {} error: {} - {}",
                what, status, body
            )));
        }

        response.json().await.map_err(|e| {
            AppError::ExternalService(format!("Failed to parse MoySklad {} response: {}", what, e))
        })
    }

    async fn get_json(&self, path: &str, params: &[(&str, String)]) -> AppResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        self.send(self.client.get(&url).query(params), path).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> AppResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        self.send(self.client.post(&url).json(body), path).await
    }

    /// Fetch every row of a paginated collection
    async fn fetch_all(
        &self,
        path: &str,
        params: &[(&str, String)],
        page_limit: u32,
        max_rows: Option<usize>,
    ) -> AppResult<Vec<Value>> {
        let mut rows = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let mut query: Vec<(&str, String)> = params.to_vec();
            query.push(("offset", offset.to_string()));
            query.push(("limit", page_limit.to_string()));

            let page = self.get_json(path, &query).await?;
            let part = rows_of(page);
            let fetched = part.len();
            rows.extend(part);

            if fetched < page_limit as usize {
                break;
            }
            if max_rows.is_some_and(|max| rows.len() >= max) {
                break;
            }
            offset += u64::from(page_limit);
        }

        if let Some(max) = max_rows {
            rows.truncate(max);
        }
        Ok(rows)
    }

    pub async fn check_connection(&self) -> ConnectionCheck {
        match self
            .get_json("/entity/employee", &[("limit", "1".to_string())])
            .await
        {
            Ok(data) => ConnectionCheck {
                connected: true,
                user: data
                    .pointer("/rows/0/name")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                error: None,
            },
            Err(e) => ConnectionCheck {
                connected: false,
                user: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Find a store by exact (trimmed) name
    pub async fn find_store(&self, name: &str) -> AppResult<Option<StoreRef>> {
        let wanted = name.trim();
        if wanted.is_empty() {
            return Ok(None);
        }
        let stores = self.fetch_all("/entity/store", &[], self.page_limit, None).await?;
        Ok(stores
            .iter()
            .filter(|s| s.get("name").and_then(Value::as_str).map(str::trim) == Some(wanted))
            .find_map(store_ref))
    }

    /// Store reference for a known store id
    pub fn store_href(&self, store_id: &str) -> String {
        format!("{}/entity/store/{}", self.base_url, store_id)
    }

    /// Products and variants with images expanded
    pub async fn get_all_assortment(&self) -> AppResult<Vec<Value>> {
        let mut rows = self
            .fetch_all(
                "/entity/product",
                &[("expand", "images,images.miniature".to_string())],
                self.page_limit,
                None,
            )
            .await?;

        let variants = self
            .fetch_all(
                "/entity/variant",
                &[(
                    "expand",
                    "images,images.miniature,product,product.images,product.images.miniature"
                        .to_string(),
                )],
                self.page_limit,
                None,
            )
            .await?;
        rows.extend(variants);

        Ok(rows)
    }

    /// Stock report for a store. Uses `/report/stock/all` and falls back to
    /// `/report/stock/bystore` when that fails.
    pub async fn get_stock(&self, store_href: Option<&str>) -> AppResult<Vec<StockRecord>> {
        let mut params = vec![
            ("stockMode", self.stock_mode.clone()),
            ("expand", "assortment".to_string()),
        ];
        if let Some(href) = store_href {
            params.push(("filter", format!("store={}", href)));
        }

        match self
            .fetch_all("/report/stock/all", &params, self.page_limit, None)
            .await
        {
            Ok(rows) => Ok(rows
                .into_iter()
                .filter_map(|row| serde_json::from_value::<RawStockRow>(row).ok())
                .map(|row| row.normalize())
                .collect()),
            Err(e) => {
                tracing::warn!("stock/all failed, falling back to stock/bystore: {}", e);
                self.get_stock_by_store(store_href).await
            }
        }
    }

    async fn get_stock_by_store(&self, store_href: Option<&str>) -> AppResult<Vec<StockRecord>> {
        let filter = match store_href {
            Some(href) => format!("store={};stockMode={}", href, self.stock_mode),
            None => format!("stockMode={}", self.stock_mode),
        };
        let rows = self
            .fetch_all(
                "/report/stock/bystore",
                &[("stockMode", self.stock_mode.clone()), ("filter", filter)],
                self.page_limit,
                None,
            )
            .await?;

        let store_name = Some(self.store_name.as_str()).filter(|n| !n.is_empty());
        Ok(rows
            .into_iter()
            .filter_map(|row| serde_json::from_value::<RawStoreByStoreRow>(row).ok())
            .map(|row| row.normalize(store_name))
            .collect())
    }

    /// Slot directory of a store (slots are only reachable through their store)
    pub async fn get_store_slots(&self, store_id: &str) -> AppResult<SlotDirectory> {
        let path = format!("/entity/store/{}/slots", store_id);
        let rows = self.fetch_all(&path, &[], self.page_limit, None).await?;

        let mut directory = SlotDirectory::new();
        for row in &rows {
            let id = row.get("id").and_then(Value::as_str).unwrap_or_default();
            let name = row.get("name").and_then(Value::as_str).unwrap_or_default();
            directory.insert(id, name);
        }
        Ok(directory)
    }

    /// Current stock by slot for the given products. The report requires an
    /// explicit product filter, so ids are sent in chunks; a failed chunk is
    /// logged and skipped.
    pub async fn get_slot_stock(&self, product_ids: &[String], store_id: &str) -> SlotReport {
        let mut report = SlotReport::default();

        for (index, chunk) in product_ids.chunks(self.slot_chunk_size).enumerate() {
            let start = index * self.slot_chunk_size;
            let filter = format!("assortmentId={};storeId={}", chunk.join(","), store_id);

            match self
                .get_json("/report/stock/byslot/current", &[("filter", filter)])
                .await
            {
                Ok(page) => {
                    let rows = rows_of(page);
                    tracing::debug!(
                        "byslot/current chunk {}-{}: {} rows",
                        start,
                        start + chunk.len(),
                        rows.len()
                    );
                    report.rows_fetched += rows.len();
                    report.candidates.extend(
                        rows.into_iter()
                            .filter_map(|row| serde_json::from_value::<RawSlotRow>(row).ok())
                            .filter_map(|row| row.normalize()),
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "byslot/current chunk {}-{} failed: {}",
                        start,
                        start + chunk.len(),
                        e
                    );
                    report.failed_chunks += 1;
                }
            }
        }

        report
    }

    /// Newest applicable purchase orders with agent and positions expanded
    /// Current image link of a product or variant; `full` asks for the
    /// original instead of the thumbnail
    pub async fn product_image_url(&self, id: &str, full: bool) -> AppResult<Option<String>> {
        let params = [("expand", "images".to_string())];
        let entity = match self.get_json(&format!("/entity/product/{}", id), &params).await {
            Ok(entity) => entity,
            Err(e) => {
                tracing::debug!("Product {} not found as product, trying variant: {}", id, e);
                self.get_json(&format!("/entity/variant/{}", id), &params).await?
            }
        };

        let pick: fn(&Value) -> Option<String> = if full { full_image_url } else { image_url };
        Ok(pick(&entity).or_else(|| entity.get("product").and_then(pick)))
    }

    /// Download an image link. Download links need the API credentials; a
    /// non-success status means the link is stale.
    pub async fn download_image(&self, url: &str) -> AppResult<Option<DownloadedImage>> {
        let response = self
            .client
            .get(url)
            .header("Authorization", &self.auth_header)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("MoySklad image download failed: {}", e)))?;

        if !response.status().is_success() {
            tracing::warn!("Image download {} returned {}", url, response.status());
            return Ok(None);
        }

        let content_type = image_content_type(
            response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::ExternalService(format!("MoySklad image download failed: {}", e)))?;

        Ok(Some(DownloadedImage {
            content_type,
            bytes: bytes.to_vec(),
        }))
    }

    pub async fn get_purchase_orders(&self) -> AppResult<Vec<Value>> {
        self.fetch_all(
            "/entity/purchaseorder",
            &[
                ("expand", "agent,positions".to_string()),
                ("filter", "applicable=true".to_string()),
                ("order", "moment,desc".to_string()),
            ],
            ORDER_PAGE_LIMIT.min(self.page_limit),
            Some(MAX_PURCHASE_ORDERS),
        )
        .await
    }

    pub async fn get_purchase_order_positions(&self, order_id: &str) -> AppResult<Vec<Value>> {
        let path = format!("/entity/purchaseorder/{}/positions", order_id);
        self.fetch_all(
            &path,
            &[("expand", "assortment".to_string())],
            self.page_limit,
            None,
        )
        .await
    }

    async fn first_meta(&self, path: &str, params: &[(&str, String)]) -> AppResult<Option<Value>> {
        let mut query = params.to_vec();
        query.push(("limit", "1".to_string()));
        let data = self.get_json(path, &query).await?;
        Ok(data.pointer("/rows/0/meta").cloned())
    }

    pub async fn default_store_meta(&self) -> AppResult<Option<Value>> {
        self.first_meta("/entity/store", &[]).await
    }

    pub async fn default_organization_meta(&self) -> AppResult<Option<Value>> {
        self.first_meta("/entity/organization", &[]).await
    }

    pub async fn default_agent_meta(&self) -> AppResult<Option<Value>> {
        self.first_meta("/entity/counterparty", &[]).await
    }

    /// Create a supply document, returns its id
    pub async fn create_supply(&self, draft: &SupplyDraft) -> AppResult<String> {
        let mut body = json!({
            "organization": { "meta": draft.organization_meta },
            "store": { "meta": draft.store_meta },
            "agent": { "meta": draft.agent_meta },
            "positions": positions_json(&draft.positions),
        });
        if let Some(description) = &draft.description {
            body["description"] = json!(description);
        }
        if let Some(href) = &draft.purchase_order_href {
            body["purchaseOrder"] = json!({ "meta": meta_json(href, "purchaseorder") });
        }

        let created = self.post_json("/entity/supply", &body).await?;
        document_id(&created, "supply")
    }

    /// Create an enter document (surplus stock), returns its id
    pub async fn create_enter(
        &self,
        organization_meta: &Value,
        store_meta: &Value,
        description: &str,
        positions: &[DocumentPosition],
    ) -> AppResult<String> {
        let body = json!({
            "organization": { "meta": organization_meta },
            "store": { "meta": store_meta },
            "description": description,
            "positions": positions_json(positions),
        });
        let created = self.post_json("/entity/enter", &body).await?;
        document_id(&created, "enter")
    }

    /// Create a demand (shipment) from the default store, returns its id
    pub async fn create_demand(
        &self,
        description: &str,
        positions: &[DocumentPosition],
    ) -> AppResult<String> {
        let organization = self.default_organization_meta().await?;
        let store = self.default_store_meta().await?;
        let agent = self.default_agent_meta().await?;

        let (Some(organization), Some(store), Some(agent)) = (organization, store, agent) else {
            return Err(AppError::ExternalService(
                "No organization, store or counterparty for the shipment".to_string(),
            ));
        };

        let body = json!({
            "organization": { "meta": organization },
            "store": { "meta": store },
            "agent": { "meta": agent },
            "description": description,
            "positions": positions_json(positions),
        });
        let created = self.post_json("/entity/demand", &body).await?;
        document_id(&created, "demand")
    }
}

/// Storage links often answer with a generic binary type
fn image_content_type(header: Option<&str>) -> String {
    match header.map(str::trim) {
        Some(ct) if ct.starts_with("image/") => ct.to_string(),
        _ => "image/jpeg".to_string(),
    }
}

fn rows_of(page: Value) -> Vec<Value> {
    match page {
        Value::Object(mut map) => match map.remove("rows") {
            Some(Value::Array(rows)) => rows,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn store_ref(row: &Value) -> Option<StoreRef> {
    let href = row.pointer("/meta/href").and_then(Value::as_str)?;
    let id = row
        .get("id")
        .and_then(Value::as_str)
        .or_else(|| last_path_segment(href))?;
    Some(StoreRef {
        id: id.to_string(),
        name: row
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        href: href.to_string(),
    })
}

/// Entity type of an href such as `.../entity/variant/<id>`
fn entity_type(href: &str) -> &str {
    let path = href.split('?').next().unwrap_or(href);
    let mut segments = path.rsplit('/');
    segments.next();
    segments.next().filter(|s| !s.is_empty()).unwrap_or("product")
}

fn meta_json(href: &str, kind: &str) -> Value {
    json!({
        "href": href,
        "type": kind,
        "mediaType": "application/json",
    })
}

fn positions_json(positions: &[DocumentPosition]) -> Vec<Value> {
    positions
        .iter()
        .map(|p| {
            let kopecks = (p.price * Decimal::from(100)).round().to_i64().unwrap_or(0);
            json!({
                "quantity": p.quantity,
                "price": kopecks,
                "assortment": { "meta": meta_json(&p.product_href, entity_type(&p.product_href)) },
            })
        })
        .collect()
}

fn document_id(created: &Value, kind: &str) -> AppResult<String> {
    created
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::ExternalService(format!("MoySklad returned no {} id", kind)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MoySkladConfig {
        MoySkladConfig {
            base_url: "https://example.test/api/".to_string(),
            token: None,
            login: Some("admin@shop".to_string()),
            password: Some("secret".to_string()),
            store_id: None,
            store_name: "Склад хранения.".to_string(),
            stock_mode: "all".to_string(),
            page_limit: 1000,
            slot_chunk_size: 100,
        }
    }

    #[test]
    fn test_basic_auth_and_base_url() {
        let client = MoySkladClient::new(&config()).unwrap();
        assert_eq!(client.auth_header, "Basic YWRtaW5Ac2hvcDpzZWNyZXQ=");
        assert_eq!(client.base_url, "https://example.test/api");
    }

    #[test]
    fn test_token_preferred() {
        let mut cfg = config();
        cfg.token = Some("abc".to_string());
        let client = MoySkladClient::new(&cfg).unwrap();
        assert_eq!(client.auth_header, "Bearer abc");
    }

    #[test]
    fn test_missing_credentials() {
        let mut cfg = config();
        cfg.login = None;
        assert!(matches!(
            MoySkladClient::new(&cfg),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_positions_json() {
        let positions = vec![DocumentPosition {
            product_href: "https://x/entity/variant/abc?expand=product".to_string(),
            quantity: 3,
            price: Decimal::new(12950, 2),
        }];
        let json = positions_json(&positions);
        assert_eq!(json[0]["price"], 12950);
        assert_eq!(json[0]["assortment"]["meta"]["type"], "variant");
    }

    #[test]
    fn test_image_content_type() {
        assert_eq!(image_content_type(Some("image/png")), "image/png");
        assert_eq!(image_content_type(Some("application/octet-stream")), "image/jpeg");
        assert_eq!(image_content_type(None), "image/jpeg");
    }

    #[test]
    fn test_rows_of() {
        assert_eq!(rows_of(json!({"rows": [1, 2]})).len(), 2);
        assert!(rows_of(json!({"meta": {}})).is_empty());
    }
}
