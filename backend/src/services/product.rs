//! Product catalogue queries

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{parse_cell_address, Page, Pagination, ParsedAddress};
use sqlx::{FromRow, PgPool};

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct ProductService {
    db: PgPool,
}

/// Catalogue product with its storage location
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub article: Option<String>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub price: Decimal,
    pub stock: Decimal,
    pub image_url: Option<String>,
    pub requires_marking: bool,
    pub cell_address: Option<String>,
    pub slot_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProductBarcodeRecord {
    pub barcode: String,
    pub barcode_type: String,
    pub pack_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub barcodes: Vec<ProductBarcodeRecord>,
}

/// Everything a shelf or parcel label prints for one product
#[derive(Debug, Clone, Serialize)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
    pub article: Option<String>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    /// Primary barcode first, then pack barcodes, without repeats
    pub barcodes: Vec<String>,
    pub price: Decimal,
    pub cell_address: Option<String>,
    pub address: ParsedAddress,
}

impl From<ProductDetail> for LabelInfo {
    fn from(detail: ProductDetail) -> Self {
        let ProductDetail { product, barcodes } = detail;

        let mut all: Vec<String> = product.barcode.iter().cloned().collect();
        for record in barcodes {
            if !all.contains(&record.barcode) {
                all.push(record.barcode);
            }
        }

        Self {
            address: parse_cell_address(product.cell_address.as_deref()),
            id: product.id,
            name: product.name,
            article: product.article,
            sku: product.sku,
            barcode: product.barcode,
            barcodes: all,
            price: product.price,
            cell_address: product.cell_address,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub search: Option<String>,
    /// Only products without any barcode
    #[serde(default, rename = "noBarcode")]
    pub no_barcode: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const PRODUCT_COLUMNS: &str = "p.id, p.name, p.article, p.sku, p.barcode, p.price, p.stock, \
     p.image_url, p.requires_marking, p.cell_address, p.slot_id, p.updated_at";

const LIST_FILTER: &str = r#"
    WHERE ($1::TEXT IS NULL
           OR LOWER(p.name) LIKE $1
           OR LOWER(COALESCE(p.barcode, '')) LIKE $1
           OR LOWER(COALESCE(p.sku, '')) LIKE $1
           OR LOWER(COALESCE(p.article, '')) LIKE $1)
      AND (NOT $2 OR COALESCE(p.barcode, '') = '')
"#;

impl ProductService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list(&self, query: ProductQuery) -> AppResult<Page<Product>> {
        let pagination = Pagination {
            limit: query.limit,
            offset: query.offset,
        };
        let pattern = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.to_lowercase()));

        let sql = format!(
            "SELECT {} FROM products p {} ORDER BY p.name LIMIT $3 OFFSET $4",
            PRODUCT_COLUMNS, LIST_FILTER
        );
        let items = sqlx::query_as::<_, Product>(&sql)
            .bind(&pattern)
            .bind(query.no_barcode)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.db)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM products p {}", LIST_FILTER);
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(&pattern)
            .bind(query.no_barcode)
            .fetch_one(&self.db)
            .await?;

        Ok(Page::new(items, total, &pagination))
    }

    pub async fn get(&self, id: &str) -> AppResult<ProductDetail> {
        let sql = format!("SELECT {} FROM products p WHERE p.id = $1", PRODUCT_COLUMNS);
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        let barcodes = sqlx::query_as::<_, ProductBarcodeRecord>(
            r#"
            SELECT barcode, barcode_type, pack_name
            FROM product_barcodes
            WHERE product_id = $1
            ORDER BY id
            "#,
        )
        .bind(id)
        .fetch_all(&self.db)
        .await?;

        Ok(ProductDetail { product, barcodes })
    }

    /// Product by primary or any pack barcode
    pub async fn find_by_barcode(&self, barcode: &str) -> AppResult<Option<Product>> {
        let sql = format!(
            r#"
            SELECT {} FROM products p
            WHERE p.barcode = $1
               OR EXISTS (SELECT 1 FROM product_barcodes b WHERE b.product_id = p.id AND b.barcode = $1)
            ORDER BY (p.barcode = $1) DESC NULLS LAST
            LIMIT 1
            "#,
            PRODUCT_COLUMNS
        );
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(barcode.trim())
            .fetch_optional(&self.db)
            .await?;

        Ok(product)
    }

    pub async fn get_by_barcode(&self, barcode: &str) -> AppResult<Product> {
        self.find_by_barcode(barcode)
            .await?
            .ok_or_else(|| AppError::NotFound("Product".to_string()))
    }

    /// Product by article or SKU
    pub async fn find_by_article(&self, article: &str) -> AppResult<Option<Product>> {
        let sql = format!(
            r#"
            SELECT {} FROM products p
            WHERE p.article = $1 OR p.sku = $1
            ORDER BY (p.article = $1) DESC NULLS LAST
            LIMIT 1
            "#,
            PRODUCT_COLUMNS
        );
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(article.trim())
            .fetch_optional(&self.db)
            .await?;

        Ok(product)
    }

    pub async fn get_by_article(&self, article: &str) -> AppResult<Product> {
        self.find_by_article(article)
            .await?
            .ok_or_else(|| AppError::NotFound("Product".to_string()))
    }

    /// Case-insensitive name substring match
    pub async fn find_by_name(&self, name: &str) -> AppResult<Option<Product>> {
        let sql = format!(
            "SELECT {} FROM products p WHERE LOWER(p.name) LIKE $1 ORDER BY p.name LIMIT 1",
            PRODUCT_COLUMNS
        );
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(format!("%{}%", name.trim().to_lowercase()))
            .fetch_optional(&self.db)
            .await?;

        Ok(product)
    }

    pub async fn label_info(&self, id: &str) -> AppResult<LabelInfo> {
        Ok(self.get(id).await?.into())
    }

    /// Stored thumbnail link; None for unknown products too
    pub async fn cached_image_url(&self, id: &str) -> AppResult<Option<String>> {
        let url: Option<Option<String>> =
            sqlx::query_scalar("SELECT image_url FROM products WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.db)
                .await?;
        Ok(url.flatten())
    }

    pub async fn set_image_url(&self, id: &str, url: &str) -> AppResult<()> {
        sqlx::query("UPDATE products SET image_url = $2 WHERE id = $1")
            .bind(id)
            .bind(url)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
