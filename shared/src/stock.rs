//! Stock merge across identity keys
//!
//! One logical product may appear in the stock report several times, keyed by
//! internal id, by barcode or by article, with disagreeing quantities. Every
//! key independently keeps the largest quantity observed for it.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StockError {
    /// Persisting such a report would zero every product
    #[error("Stock report gave no usable rows for {products} products ({rows} rows fetched)")]
    NoUsableRows { products: usize, rows: usize },
}

/// One normalized row of the stock report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub product_id: Option<String>,
    pub barcodes: Vec<String>,
    pub article: Option<String>,
    pub sku: Option<String>,
    pub code: Option<String>,
    pub quantity: Decimal,
}

/// Quantity lookups built from the stock report
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StockIndex {
    pub by_id: HashMap<String, Decimal>,
    pub by_barcode: HashMap<String, Decimal>,
    pub by_article: HashMap<String, Decimal>,
}

impl StockIndex {
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty() && self.by_barcode.is_empty() && self.by_article.is_empty()
    }

    /// Fold one record into the index, keeping the maximum per key.
    pub fn insert(&mut self, record: &StockRecord) {
        if let Some(id) = record.product_id.as_deref() {
            put_max(&mut self.by_id, &id_key(id), record.quantity);
        }

        let mut seen = HashSet::new();
        for barcode in &record.barcodes {
            if seen.insert(barcode.trim()) {
                put_max(&mut self.by_barcode, barcode, record.quantity);
            }
        }

        // article, sku and code share one namespace
        for key in [&record.article, &record.sku, &record.code].into_iter().flatten() {
            put_max(&mut self.by_article, key, record.quantity);
        }
    }

    /// Stock for a product, trying keys from most to least trusted: id, then
    /// each barcode in order, then article, then sku. A zero result falls
    /// through to the next key.
    pub fn resolve<S: AsRef<str>>(
        &self,
        product_id: Option<&str>,
        barcodes: &[S],
        article: Option<&str>,
        sku: Option<&str>,
    ) -> Decimal {
        if let Some(qty) = product_id.and_then(|id| lookup(&self.by_id, &id_key(id))) {
            return qty;
        }

        for barcode in barcodes {
            if let Some(qty) = lookup(&self.by_barcode, barcode.as_ref()) {
                return qty;
            }
        }

        [article, sku]
            .into_iter()
            .flatten()
            .find_map(|key| lookup(&self.by_article, key))
            .unwrap_or(Decimal::ZERO)
    }
}

/// Refuse an index without any key while there are products to price:
/// the report failed rather than every product running out.
pub fn ensure_stock_coverage(
    index: &StockIndex,
    rows: usize,
    products: usize,
) -> Result<(), StockError> {
    if index.is_empty() && products > 0 {
        return Err(StockError::NoUsableRows { products, rows });
    }
    Ok(())
}

/// Merge all records of a stock report into one index.
pub fn merge_stock<'a, I>(records: I) -> StockIndex
where
    I: IntoIterator<Item = &'a StockRecord>,
{
    let mut index = StockIndex::default();
    for record in records {
        index.insert(record);
    }
    index
}

/// Entity ids are UUIDs; hrefs and entities may differ in case
fn id_key(id: &str) -> String {
    id.trim().to_lowercase()
}

fn put_max(map: &mut HashMap<String, Decimal>, key: &str, qty: Decimal) {
    let key = key.trim();
    if key.is_empty() {
        return;
    }
    let entry = map.entry(key.to_string()).or_insert(Decimal::ZERO);
    if qty > *entry {
        *entry = qty;
    }
}

fn lookup(map: &HashMap<String, Decimal>, key: &str) -> Option<Decimal> {
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    map.get(key).copied().filter(|qty| *qty > Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn record(id: Option<&str>, barcodes: &[&str], article: Option<&str>, qty: i64) -> StockRecord {
        StockRecord {
            product_id: id.map(str::to_string),
            barcodes: barcodes.iter().map(|b| b.to_string()).collect(),
            article: article.map(str::to_string),
            quantity: dec(qty),
            ..Default::default()
        }
    }

    #[test]
    fn test_max_wins_not_sum() {
        let rows = vec![
            record(Some("p1"), &["4600000000001"], Some("ART-1"), 5),
            record(Some("p1"), &["4600000000001"], Some("ART-1"), 12),
        ];
        let index = merge_stock(&rows);
        assert_eq!(index.by_id["p1"], dec(12));
        assert_eq!(index.by_barcode["4600000000001"], dec(12));
        assert_eq!(index.by_article["ART-1"], dec(12));
    }

    #[test]
    fn test_row_updates_every_key_independently() {
        let rows = vec![
            record(None, &["111"], None, 20),
            record(Some("p1"), &["111", "222", "333"], None, 7),
        ];
        let index = merge_stock(&rows);
        assert_eq!(index.by_id["p1"], dec(7));
        assert_eq!(index.by_barcode["111"], dec(20));
        assert_eq!(index.by_barcode["222"], dec(7));
        assert_eq!(index.by_barcode["333"], dec(7));
    }

    #[test]
    fn test_blank_keys_ignored() {
        let index = merge_stock(&[record(Some("  "), &["", " "], Some(""), 3)]);
        assert!(index.is_empty());
    }

    #[test]
    fn test_resolve_priority() {
        let rows = vec![
            record(Some("p1"), &[], None, 4),
            record(None, &["b1"], None, 9),
            record(None, &[], Some("A1"), 15),
        ];
        let index = merge_stock(&rows);

        assert_eq!(index.resolve(Some("p1"), &["b1"], Some("A1"), None), dec(4));
        assert_eq!(index.resolve(Some("p2"), &["b1"], Some("A1"), None), dec(9));
        assert_eq!(index.resolve(Some("p2"), &["zz"], Some("A1"), None), dec(15));
        assert_eq!(index.resolve(None, &["zz"], Some("zz"), Some("A1")), dec(15));
        assert_eq!(index.resolve::<&str>(None, &[], None, None), Decimal::ZERO);
    }

    #[test]
    fn test_id_lookup_ignores_case() {
        let rows = vec![record(Some("7A1B2C3D-0000-11EE-0A80-000000000001"), &[], None, 6)];
        let index = merge_stock(&rows);
        assert_eq!(
            index.resolve::<&str>(Some("7a1b2c3d-0000-11ee-0a80-000000000001"), &[], None, None),
            dec(6)
        );
        assert_eq!(
            index.resolve::<&str>(Some("7A1B2C3D-0000-11EE-0A80-000000000001"), &[], None, None),
            dec(6)
        );
    }

    #[test]
    fn test_coverage_rejects_empty_index() {
        let index = merge_stock(&Vec::<StockRecord>::new());
        assert_eq!(
            ensure_stock_coverage(&index, 0, 3),
            Err(StockError::NoUsableRows { products: 3, rows: 0 })
        );
        // nothing to price, nothing to protect
        assert!(ensure_stock_coverage(&index, 0, 0).is_ok());
    }

    #[test]
    fn test_coverage_rejects_rows_without_keys() {
        let rows = vec![
            StockRecord {
                quantity: dec(5),
                ..Default::default()
            },
            record(Some(" "), &[""], None, 2),
        ];
        let index = merge_stock(&rows);
        assert!(index.is_empty());
        assert_eq!(
            ensure_stock_coverage(&index, rows.len(), 10),
            Err(StockError::NoUsableRows { products: 10, rows: 2 })
        );
    }

    #[test]
    fn test_coverage_accepts_partial_report() {
        let rows = vec![record(None, &["4600000000001"], None, 0)];
        let index = merge_stock(&rows);
        assert!(ensure_stock_coverage(&index, 1, 50).is_ok());
    }

    #[test]
    fn test_resolve_skips_zero_id() {
        let rows = vec![record(Some("p1"), &[], None, 0), record(None, &["b1"], None, 2)];
        let index = merge_stock(&rows);
        assert_eq!(index.resolve(Some("p1"), &["b1"], None, None), dec(2));
    }
}
