//! Catalogue product models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::barcode::{extract_barcodes, ProductBarcode};
use crate::stock::StockIndex;

/// Product as persisted from the inventory system catalogue.
///
/// Location fields are deliberately absent: they are owned by slot
/// reconciliation and the locations import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: String,
    pub name: String,
    pub article: Option<String>,
    /// Inventory system `code`
    pub sku: Option<String>,
    /// First barcode of the product, packs included
    pub barcode: Option<String>,
    pub barcodes: Vec<ProductBarcode>,
    pub price: Decimal,
    pub stock: Decimal,
    pub image_url: Option<String>,
    pub meta_href: String,
    pub requires_marking: bool,
}

impl CatalogProduct {
    /// Build a catalogue product from a raw product or variant entity.
    /// Variants fall back to their parent product (`product` field) for name,
    /// article, code, price and image. Returns `None` without an id.
    pub fn from_assortment(entity: &Value, stock: &StockIndex) -> Option<Self> {
        let id = str_field(entity, "id")?;
        let parent = entity.get("product").filter(|p| p.is_object());

        let inherited = |key: &str| {
            str_field(entity, key).or_else(|| parent.and_then(|p| str_field(p, key)))
        };

        let barcodes = extract_barcodes(entity);
        let barcode_keys: Vec<&str> = barcodes.iter().map(|b| b.barcode.as_str()).collect();
        let article = inherited("article");
        let sku = inherited("code");

        let quantity = stock.resolve(
            Some(id.as_str()),
            &barcode_keys,
            article.as_deref(),
            sku.as_deref(),
        );

        let meta_href = entity_href(entity)
            .or_else(|| parent.and_then(entity_href))
            .unwrap_or_default();

        Some(Self {
            name: inherited("name").unwrap_or_default(),
            barcode: barcodes.first().map(|b| b.barcode.clone()),
            price: sale_price(entity)
                .or_else(|| parent.and_then(sale_price))
                .unwrap_or(Decimal::ZERO),
            stock: quantity,
            image_url: image_url(entity).or_else(|| parent.and_then(image_url)),
            requires_marking: requires_marking(entity.get("trackingType").and_then(Value::as_str)),
            id,
            article,
            sku,
            barcodes,
            meta_href,
        })
    }
}

/// Products with a tracking type other than `NOT_TRACKED` need a marking code
pub fn requires_marking(tracking_type: Option<&str>) -> bool {
    matches!(tracking_type.map(str::trim), Some(t) if !t.is_empty() && t != "NOT_TRACKED")
}

/// Prices are reported in kopecks
pub fn price_from_minor_units(value: &Value) -> Option<Decimal> {
    let minor = match value {
        Value::Number(n) => n
            .as_i64()
            .map(Decimal::from)
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        _ => None,
    }?;
    Some(minor / Decimal::from(100))
}

fn sale_price(entity: &Value) -> Option<Decimal> {
    entity
        .get("salePrices")?
        .as_array()?
        .first()?
        .get("value")
        .and_then(price_from_minor_units)
        .filter(|p| !p.is_zero())
}

/// Thumbnail URL: the main image, then its miniature, then the first entry of
/// the expanded image list.
pub fn image_url(entity: &Value) -> Option<String> {
    let image = entity.get("image");
    let candidates = [
        image.and_then(|i| pointer_str(i, "/meta/downloadHref")),
        image.and_then(|i| pointer_str(i, "/meta/href")),
        image.and_then(|i| pointer_str(i, "/miniature/downloadHref")),
        image.and_then(|i| pointer_str(i, "/miniature/href")),
    ];
    if let Some(url) = candidates.into_iter().flatten().next() {
        return Some(url);
    }

    let first = entity.pointer("/images/rows/0")?;
    [
        "/miniature/downloadHref",
        "/miniature/href",
        "/tiny/downloadHref",
        "/tiny/href",
        "/meta/downloadHref",
    ]
    .into_iter()
    .find_map(|path| pointer_str(first, path))
}

/// Original-size image: the main image download link, then the first expanded
/// image row, then whatever thumbnail is available.
pub fn full_image_url(entity: &Value) -> Option<String> {
    entity
        .get("image")
        .and_then(|i| pointer_str(i, "/meta/downloadHref"))
        .or_else(|| {
            entity
                .pointer("/images/rows/0")
                .and_then(|row| pointer_str(row, "/meta/downloadHref"))
        })
        .or_else(|| image_url(entity))
}

fn entity_href(entity: &Value) -> Option<String> {
    pointer_str(entity, "/meta/href")
}

fn pointer_str(value: &Value, path: &str) -> Option<String> {
    value
        .pointer(path)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// State of the last catalogue sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Syncing,
    Success,
    Error,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Syncing => "syncing",
            SyncState::Success => "success",
            SyncState::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock::{merge_stock, StockRecord};
    use serde_json::json;

    #[test]
    fn test_variant_inherits_parent_fields() {
        let entity = json!({
            "id": "v-1",
            "name": "",
            "code": "V-CODE",
            "trackingType": "SHOES",
            "barcodes": [{"ean13": "4600000000017"}],
            "product": {
                "name": "Кроссовки",
                "article": "SNK-1",
                "meta": {"href": "https://x/entity/product/p-1"},
                "salePrices": [{"value": 129900}],
                "image": {"meta": {"downloadHref": "https://x/download/img"}}
            }
        });
        let stock = merge_stock(&[StockRecord {
            barcodes: vec!["4600000000017".to_string()],
            quantity: Decimal::from(6),
            ..Default::default()
        }]);

        let product = CatalogProduct::from_assortment(&entity, &stock).unwrap();
        assert_eq!(product.name, "Кроссовки");
        assert_eq!(product.article.as_deref(), Some("SNK-1"));
        assert_eq!(product.sku.as_deref(), Some("V-CODE"));
        assert_eq!(product.barcode.as_deref(), Some("4600000000017"));
        assert_eq!(product.price, Decimal::new(1299, 0));
        assert_eq!(product.stock, Decimal::from(6));
        assert_eq!(product.image_url.as_deref(), Some("https://x/download/img"));
        assert_eq!(product.meta_href, "https://x/entity/product/p-1");
        assert!(product.requires_marking);
    }

    #[test]
    fn test_requires_marking() {
        assert!(!requires_marking(None));
        assert!(!requires_marking(Some("NOT_TRACKED")));
        assert!(requires_marking(Some("PERFUMERY")));
    }

    #[test]
    fn test_image_from_expanded_rows() {
        let entity = json!({"images": {"rows": [{"tiny": {"href": "https://x/tiny"}}]}});
        assert_eq!(image_url(&entity).as_deref(), Some("https://x/tiny"));
        assert_eq!(image_url(&json!({})), None);
    }

    #[test]
    fn test_full_image_prefers_original() {
        let entity = json!({"images": {"rows": [{
            "meta": {"downloadHref": "https://x/download/full"},
            "miniature": {"downloadHref": "https://x/download/mini"}
        }]}});
        assert_eq!(image_url(&entity).as_deref(), Some("https://x/download/mini"));
        assert_eq!(full_image_url(&entity).as_deref(), Some("https://x/download/full"));

        let thumb_only = json!({"images": {"rows": [{"tiny": {"href": "https://x/tiny"}}]}});
        assert_eq!(full_image_url(&thumb_only).as_deref(), Some("https://x/tiny"));
    }

    #[test]
    fn test_missing_id_skipped() {
        assert!(CatalogProduct::from_assortment(&json!({"name": "x"}), &StockIndex::default()).is_none());
    }
}
