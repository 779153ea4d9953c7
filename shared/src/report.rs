//! Report row adapters
//!
//! The inventory API reports the same concepts under different field names
//! depending on the endpoint (`stock`, `quantity`, `available`; id in
//! `assortmentId`, `assortment.id` or an href). Every raw shape is normalized
//! here into one canonical record before any merge logic sees it.

use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::barcode::entry_codes;
use crate::reconcile::SlotCandidate;
use crate::stock::StockRecord;

lazy_static! {
    static ref ENTITY_HREF_REGEX: Regex = Regex::new(
        r"(?i)/entity/(?:product|variant|bundle|service|consignment|productfolder)/([0-9a-f-]{20,})"
    )
    .unwrap();
}

/// Entity reference as returned in `meta` blocks
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMeta {
    pub href: Option<String>,
    pub uuid_href: Option<String>,
}

/// Nested assortment or slot reference
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawRef {
    pub id: Option<String>,
    pub href: Option<String>,
    pub meta: Option<RawMeta>,
    pub barcodes: Vec<Value>,
}

impl RawRef {
    fn meta_href(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|m| m.href.as_deref())
    }
}

/// Row of `/report/stock/all`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawStockRow {
    pub meta: Option<RawMeta>,
    pub assortment: Option<RawRef>,
    pub stock: Option<Value>,
    pub quantity: Option<Value>,
    pub available: Option<Value>,
    pub article: Option<String>,
    pub code: Option<String>,
    pub sku: Option<String>,
    pub barcode: Option<Value>,
    pub barcodes: Vec<Value>,
}

impl RawStockRow {
    pub fn normalize(&self) -> StockRecord {
        let href = [
            self.meta.as_ref().and_then(|m| m.href.as_deref()),
            self.assortment.as_ref().and_then(RawRef::meta_href),
            self.assortment.as_ref().and_then(|a| a.href.as_deref()),
            self.meta.as_ref().and_then(|m| m.uuid_href.as_deref()),
        ]
        .into_iter()
        .flatten()
        .find(|h| !h.trim().is_empty());

        let mut barcodes: Vec<String> = Vec::new();
        let lists = self
            .barcode
            .iter()
            .chain(self.barcodes.iter())
            .chain(self.assortment.iter().flat_map(|a| a.barcodes.iter()));
        for entry in lists {
            for (code, _) in entry_codes(entry) {
                let code = code.trim();
                if !code.is_empty() && !barcodes.iter().any(|b| b == code) {
                    barcodes.push(code.to_string());
                }
            }
        }

        StockRecord {
            product_id: href.and_then(entity_id_from_href),
            barcodes,
            article: non_empty(self.article.as_deref()),
            sku: non_empty(self.sku.as_deref()).or_else(|| non_empty(self.code.as_deref())),
            code: non_empty(self.code.as_deref()),
            quantity: first_quantity(&[
                self.stock.as_ref(),
                self.quantity.as_ref(),
                self.available.as_ref(),
            ]),
        }
    }
}

/// Row of `/report/stock/byslot/current`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawSlotRow {
    pub assortment_id: Option<String>,
    pub assortment: Option<RawRef>,
    pub slot_id: Option<String>,
    pub slot: Option<RawRef>,
    pub stock: Option<Value>,
    pub quantity: Option<Value>,
    pub available: Option<Value>,
}

impl RawSlotRow {
    /// Canonical candidate, or `None` when the product or slot id is missing
    pub fn normalize(&self) -> Option<SlotCandidate> {
        let product_id = ref_id(self.assortment_id.as_deref(), self.assortment.as_ref())?;
        let slot_id = ref_id(self.slot_id.as_deref(), self.slot.as_ref())?;
        Some(SlotCandidate {
            product_id,
            slot_id,
            quantity: first_quantity(&[
                self.stock.as_ref(),
                self.quantity.as_ref(),
                self.available.as_ref(),
            ]),
        })
    }
}

/// Per-store stock entry of `/report/stock/bystore`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawStoreStock {
    pub name: Option<String>,
    pub stock: Option<Value>,
    pub quantity: Option<Value>,
}

impl RawStoreStock {
    fn quantity(&self) -> Decimal {
        first_quantity(&[self.stock.as_ref(), self.quantity.as_ref()])
    }
}

/// Row of `/report/stock/bystore`, used when `/report/stock/all` fails
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawStoreByStoreRow {
    pub meta: Option<RawMeta>,
    pub stock_by_store: Vec<RawStoreStock>,
    pub barcodes: Vec<Value>,
}

impl RawStoreByStoreRow {
    /// Stock of the named store, or the sum over all stores when no store is
    /// named or the named store is not listed.
    pub fn normalize(&self, store_name: Option<&str>) -> StockRecord {
        let picked = store_name.map(str::trim).and_then(|wanted| {
            self.stock_by_store
                .iter()
                .find(|s| s.name.as_deref().map(str::trim) == Some(wanted))
        });
        let quantity = match picked {
            Some(store) => store.quantity(),
            None => self.stock_by_store.iter().map(RawStoreStock::quantity).sum(),
        };

        let as_stock_row = RawStockRow {
            meta: self.meta.clone(),
            barcodes: self.barcodes.clone(),
            ..Default::default()
        };
        StockRecord {
            quantity,
            ..as_stock_row.normalize()
        }
    }
}

/// Product id embedded in an entity href, query string ignored
pub fn entity_id_from_href(href: &str) -> Option<String> {
    ENTITY_HREF_REGEX
        .captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Last path segment of an href without its query string
pub fn last_path_segment(href: &str) -> Option<&str> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Parse a quantity that may arrive as a JSON number or a numeric string with
/// either decimal separator.
pub fn parse_quantity(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Decimal::from(i)),
            None => n.as_f64().and_then(|f| Decimal::try_from(f).ok()),
        },
        Value::String(s) => parse_decimal(s),
        _ => None,
    }
}

/// Parse a decimal string, accepting a comma separator and inner spaces
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
}

fn first_quantity(fields: &[Option<&Value>]) -> Decimal {
    fields
        .iter()
        .flatten()
        .find(|v| !v.is_null())
        .and_then(|v| parse_quantity(v))
        .unwrap_or(Decimal::ZERO)
}

fn ref_id(direct: Option<&str>, nested: Option<&RawRef>) -> Option<String> {
    non_empty(direct)
        .or_else(|| nested.and_then(|r| non_empty(r.id.as_deref())))
        .or_else(|| {
            nested
                .and_then(RawRef::meta_href)
                .and_then(last_path_segment)
                .map(str::to_string)
        })
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
