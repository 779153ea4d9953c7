//! Barcode extraction and classification
//!
//! Products carry their own barcodes plus barcodes of their packaging units
//! (marketplace labels live on packs). Both are collected in order, first
//! occurrence wins.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Symbology of a product barcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BarcodeKind {
    Ean13,
    Ean8,
    Code128,
    Gtin,
}

impl BarcodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarcodeKind::Ean13 => "EAN13",
            BarcodeKind::Ean8 => "EAN8",
            BarcodeKind::Code128 => "CODE128",
            BarcodeKind::Gtin => "GTIN",
        }
    }

    /// Guess the symbology from the barcode text. Marketplace codes (`OZN...`)
    /// and anything that is not 8 or 13 digits print as Code 128.
    pub fn detect(barcode: &str) -> Self {
        let s = barcode.trim();
        if s.to_uppercase().starts_with("OZN") {
            return BarcodeKind::Code128;
        }
        let all_digits = !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
        match (all_digits, s.len()) {
            (true, 13) => BarcodeKind::Ean13,
            (true, 8) => BarcodeKind::Ean8,
            _ => BarcodeKind::Code128,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "EAN13" => Some(BarcodeKind::Ean13),
            "EAN8" => Some(BarcodeKind::Ean8),
            "CODE128" => Some(BarcodeKind::Code128),
            "GTIN" => Some(BarcodeKind::Gtin),
            _ => None,
        }
    }
}

impl fmt::Display for BarcodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A barcode attached to a product or one of its packs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductBarcode {
    pub barcode: String,
    pub kind: BarcodeKind,
    pub pack_name: Option<String>,
}

#[derive(Default)]
struct Collector {
    seen: HashSet<String>,
    out: Vec<ProductBarcode>,
}

impl Collector {
    fn push(&mut self, raw: &str, kind: Option<BarcodeKind>, pack_name: Option<&str>) {
        let barcode = raw.trim();
        if barcode.is_empty() || !self.seen.insert(barcode.to_string()) {
            return;
        }
        self.out.push(ProductBarcode {
            barcode: barcode.to_string(),
            kind: kind.unwrap_or_else(|| BarcodeKind::detect(barcode)),
            pack_name: pack_name.map(str::to_string),
        });
    }

    /// Barcode arrays hold plain strings or typed objects like `{"ean13": "..."}`
    fn push_list(&mut self, list: Option<&Value>, pack_name: Option<&str>) {
        let Some(entries) = list.and_then(Value::as_array) else {
            return;
        };
        for entry in entries {
            for (code, kind) in entry_codes(entry) {
                self.push(code, kind, pack_name);
            }
        }
    }
}

/// Codes held by one barcode list entry, with the declared kind for typed
/// entries
pub(crate) fn entry_codes(entry: &Value) -> Vec<(&str, Option<BarcodeKind>)> {
    match entry {
        Value::String(s) => vec![(s.as_str(), None)],
        Value::Object(map) => TYPED_KEYS
            .iter()
            .filter_map(|(key, kind)| {
                map.get(*key)
                    .and_then(Value::as_str)
                    .map(|code| (code, Some(*kind)))
            })
            .collect(),
        _ => Vec::new(),
    }
}

const TYPED_KEYS: [(&str, BarcodeKind); 4] = [
    ("ean13", BarcodeKind::Ean13),
    ("ean8", BarcodeKind::Ean8),
    ("code128", BarcodeKind::Code128),
    ("gtin", BarcodeKind::Gtin),
];

/// Collect product barcodes followed by pack barcodes from a raw assortment
/// entity. Packs may be an array, an expanded `{rows: [...]}` object or a
/// single `pack`.
pub fn extract_barcodes(entity: &Value) -> Vec<ProductBarcode> {
    let mut collector = Collector::default();
    collector.push_list(entity.get("barcodes"), None);

    let packs: Vec<&Value> = match (entity.get("packs"), entity.get("pack")) {
        (Some(Value::Object(obj)), _) => obj
            .get("rows")
            .and_then(Value::as_array)
            .map(|rows| rows.iter().collect())
            .unwrap_or_default(),
        (Some(Value::Array(rows)), _) => rows.iter().collect(),
        (_, Some(pack)) if pack.is_object() => vec![pack],
        _ => Vec::new(),
    };

    for pack in packs {
        let name = pack.get("name").and_then(Value::as_str).filter(|n| !n.is_empty());
        if let Some(code) = pack.get("barcode").and_then(Value::as_str) {
            collector.push(code, None, name);
        }
        collector.push_list(pack.get("barcodes"), name);
    }

    collector.out
}
