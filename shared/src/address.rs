//! Warehouse cell address parsing
//!
//! Cell labels come from the inventory system as free text typed by people,
//! e.g. "Стеллаж 12, полка 3, ячейка A" or "Стелаж.5 полка 2 ячейка b".
//! Each dimension is matched independently, so a label carrying only a rack
//! still yields a rack.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    // "стеллаж" and the common "стелаж" misspelling
    static ref RACK_REGEX: Regex = Regex::new(r"(?i)стел{1,2}аж[\s.,:№#-]*([0-9]+)").unwrap();
    static ref SHELF_REGEX: Regex = Regex::new(r"(?i)полк(?:а|и|ы|е|у)?\.?[\s,:№#-]*([0-9]+)").unwrap();
    static ref CELL_REGEX: Regex =
        Regex::new(r"(?i)яч(?:ейк[а-яё]*\b|\.|\b)[\s.,:№#-]*([A-Za-zА-Яа-яЁё0-9]+)").unwrap();
}

/// Structured form of a cell label. `None` means the dimension could not be
/// read from the label; it is never replaced by a default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedAddress {
    pub rack: Option<u32>,
    pub shelf: Option<u32>,
    pub cell: Option<String>,
}

impl ParsedAddress {
    /// All three dimensions were recognised
    pub fn is_complete(&self) -> bool {
        self.rack.is_some() && self.shelf.is_some() && self.cell.is_some()
    }

    /// Canonical label, only available for complete addresses
    pub fn canonical_label(&self) -> Option<String> {
        match (self.rack, self.shelf, self.cell.as_deref()) {
            (Some(rack), Some(shelf), Some(cell)) => {
                Some(format!("Стеллаж {} полка {} ячейка {}", rack, shelf, cell))
            }
            _ => None,
        }
    }
}

/// Parse a free-text cell label into rack, shelf and cell.
pub fn parse_cell_address(raw: Option<&str>) -> ParsedAddress {
    let label = match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return ParsedAddress::default(),
    };

    let rack = capture(&RACK_REGEX, label).and_then(|d| d.parse::<u32>().ok());
    let shelf = capture(&SHELF_REGEX, label).and_then(|d| d.parse::<u32>().ok());
    let cell = capture(&CELL_REGEX, label)
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty());

    ParsedAddress { rack, shelf, cell }
}

/// Normalise a slot name reported by the inventory system.
///
/// Fully parseable names are re-rendered canonically so that later parsing is
/// stable; anything else is passed through with whitespace collapsed.
pub fn normalize_slot_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = parse_cell_address(Some(trimmed));
    if let Some(label) = parsed.canonical_label() {
        return Some(label);
    }

    Some(collapse_whitespace(trimmed))
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn capture<'a>(regex: &Regex, text: &'a str) -> Option<&'a str> {
    regex
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
