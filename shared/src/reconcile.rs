//! Slot reconciliation
//!
//! The inventory system reports, per product, every storage slot holding some
//! of it. One slot is chosen per product: the one with the largest positive
//! quantity whose slot is present in the warehouse directory. Products without
//! a usable candidate keep whatever location was known before.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::address::normalize_slot_name;

/// One row of the "stock by slot" report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotCandidate {
    pub product_id: String,
    pub slot_id: String,
    pub quantity: Decimal,
}

/// Slot id to human label lookup for one warehouse
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDirectory {
    names: HashMap<String, String>,
}

impl SlotDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a slot. Blank ids or names are ignored.
    pub fn insert(&mut self, slot_id: &str, name: &str) {
        let id = slot_id.trim();
        if id.is_empty() {
            return;
        }
        if let Some(label) = normalize_slot_name(name) {
            self.names.insert(id.to_string(), label);
        }
    }

    /// Normalized label of a slot
    pub fn label(&self, slot_id: &str) -> Option<&str> {
        self.names.get(slot_id.trim()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for SlotDirectory {
    fn from_iter<T: IntoIterator<Item = (&'a str, &'a str)>>(iter: T) -> Self {
        let mut directory = SlotDirectory::new();
        for (id, name) in iter {
            directory.insert(id, name);
        }
        directory
    }
}

/// Authoritative storage address of a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductLocation {
    pub product_id: String,
    pub cell_address: Option<String>,
    pub slot_id: Option<String>,
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileOutcome {
    /// Prior locations overlaid with every freshly resolved one
    pub locations: HashMap<String, ProductLocation>,
    /// Resolved locations that differ from what was known, in report order
    pub changed: Vec<ProductLocation>,
    /// Products bound to a slot in this pass
    pub resolved: usize,
    /// Products that appeared in the report but had no usable candidate
    pub preserved: usize,
}

impl ReconcileOutcome {
    /// Number of locations that need to be written back
    pub fn updated_count(&self) -> usize {
        self.changed.len()
    }
}

struct Best<'a> {
    slot_id: &'a str,
    label: &'a str,
    quantity: Decimal,
}

/// Choose one location per product from report candidates.
///
/// Candidates with non-positive quantity, or whose slot is missing from
/// `directory`, are discarded before choosing. Ties keep the first candidate
/// seen. An empty report leaves every prior location untouched.
pub fn reconcile(
    candidates: &[SlotCandidate],
    directory: &SlotDirectory,
    prior: &HashMap<String, ProductLocation>,
) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome {
        locations: prior.clone(),
        ..Default::default()
    };
    if candidates.is_empty() {
        return outcome;
    }

    let mut order: Vec<&str> = Vec::new();
    let mut best: HashMap<&str, Option<Best<'_>>> = HashMap::new();

    for candidate in candidates {
        let product_id = candidate.product_id.trim();
        if product_id.is_empty() {
            continue;
        }
        let slot = best.entry(product_id).or_insert_with(|| {
            order.push(product_id);
            None
        });

        if candidate.quantity <= Decimal::ZERO {
            continue;
        }
        let Some(label) = directory.label(&candidate.slot_id) else {
            continue;
        };

        let beats = match slot {
            Some(current) => candidate.quantity > current.quantity,
            None => true,
        };
        if beats {
            *slot = Some(Best {
                slot_id: candidate.slot_id.trim(),
                label,
                quantity: candidate.quantity,
            });
        }
    }

    for product_id in order {
        let Some(Some(choice)) = best.get(product_id) else {
            outcome.preserved += 1;
            continue;
        };

        let location = ProductLocation {
            product_id: product_id.to_string(),
            cell_address: Some(choice.label.to_string()),
            slot_id: Some(choice.slot_id.to_string()),
        };
        outcome.resolved += 1;

        if prior.get(product_id) != Some(&location) {
            outcome.changed.push(location.clone());
        }
        outcome.locations.insert(product_id.to_string(), location);
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(product: &str, slot: &str, qty: i64) -> SlotCandidate {
        SlotCandidate {
            product_id: product.to_string(),
            slot_id: slot.to_string(),
            quantity: Decimal::from(qty),
        }
    }

    fn directory() -> SlotDirectory {
        [
            ("s1", "Стеллаж 1 полка 1 ячейка A"),
            ("s2", "Стелаж.41, полка 2, ячейка b"),
            ("s3", "  Паллет   у ворот "),
        ]
        .into_iter()
        .collect()
    }

    fn prior_location(product: &str, label: &str) -> HashMap<String, ProductLocation> {
        let mut prior = HashMap::new();
        prior.insert(
            product.to_string(),
            ProductLocation {
                product_id: product.to_string(),
                cell_address: Some(label.to_string()),
                slot_id: Some("old".to_string()),
            },
        );
        prior
    }

    #[test]
    fn test_max_quantity_wins_and_label_normalized() {
        let rows = vec![candidate("p1", "s1", 3), candidate("p1", "s2", 8)];
        let outcome = reconcile(&rows, &directory(), &HashMap::new());
        let location = &outcome.locations["p1"];
        assert_eq!(location.slot_id.as_deref(), Some("s2"));
        assert_eq!(location.cell_address.as_deref(), Some("Стеллаж 41 полка 2 ячейка B"));
        assert_eq!(outcome.updated_count(), 1);
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        let rows = vec![candidate("p1", "s3", 5), candidate("p1", "s1", 5)];
        let outcome = reconcile(&rows, &directory(), &HashMap::new());
        assert_eq!(outcome.locations["p1"].cell_address.as_deref(), Some("Паллет у ворот"));
    }

    #[test]
    fn test_zero_quantity_never_replaces_prior() {
        let prior = prior_location("p1", "Стеллаж 9 полка 9 ячейка Z");
        let rows = vec![candidate("p1", "s1", 0)];
        let outcome = reconcile(&rows, &directory(), &prior);
        assert_eq!(outcome.locations, prior);
        assert_eq!(outcome.preserved, 1);
        assert!(outcome.changed.is_empty());
    }

    #[test]
    fn test_unknown_slot_discarded_before_max() {
        let rows = vec![candidate("p1", "missing", 100), candidate("p1", "s1", 1)];
        let outcome = reconcile(&rows, &directory(), &HashMap::new());
        assert_eq!(outcome.locations["p1"].slot_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_empty_report_is_noop() {
        let prior = prior_location("p1", "Стеллаж 1 полка 1 ячейка A");
        let outcome = reconcile(&[], &directory(), &prior);
        assert_eq!(outcome.locations, prior);
        assert_eq!(outcome.resolved, 0);
        assert_eq!(outcome.preserved, 0);
    }

    #[test]
    fn test_unchanged_location_not_rewritten() {
        let rows = vec![candidate("p1", "s1", 2)];
        let first = reconcile(&rows, &directory(), &HashMap::new());
        let second = reconcile(&rows, &directory(), &first.locations);
        assert_eq!(first.locations, second.locations);
        assert_eq!(second.resolved, 1);
        assert!(second.changed.is_empty());
    }
}
