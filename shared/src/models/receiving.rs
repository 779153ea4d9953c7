//! Goods receipt models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a receiving session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceivingStatus {
    Active,
    Completed,
    Cancelled,
}

impl ReceivingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceivingStatus::Active => "active",
            ReceivingStatus::Completed => "completed",
            ReceivingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ReceivingStatus::Active),
            "completed" => Some(ReceivingStatus::Completed),
            "cancelled" => Some(ReceivingStatus::Cancelled),
            _ => None,
        }
    }
}

/// Record of the most recent scan of a session, kept for undo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastScan {
    pub item_id: Uuid,
    pub quantity: i32,
    pub previous_qty: i32,
    /// The scan inserted the line (surplus product not in the order)
    pub created_line: bool,
}

/// What undoing the last scan does to its line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoAction {
    DeleteLine,
    RestoreQuantity(i32),
}

impl LastScan {
    /// A line created by the scan and untouched since is removed; otherwise
    /// the quantity before the scan is restored.
    pub fn undo_action(&self, current_received: i32) -> UndoAction {
        if self.created_line && current_received == self.quantity {
            UndoAction::DeleteLine
        } else {
            UndoAction::RestoreQuantity(self.previous_qty)
        }
    }
}

/// Defective quantity of one receiving line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefectLine {
    pub article: Option<String>,
    pub name: String,
    pub defect_qty: i32,
}

/// Defect summary for the supply document description, `None` without
/// defects.
pub fn defect_summary(lines: &[DefectLine]) -> Option<String> {
    let entries: Vec<String> = lines
        .iter()
        .filter(|l| l.defect_qty > 0)
        .map(|l| {
            let label = l.article.as_deref().filter(|a| !a.is_empty()).unwrap_or(&l.name);
            format!("• {}: {} шт", label, l.defect_qty)
        })
        .collect();

    if entries.is_empty() {
        None
    } else {
        Some(format!("БРАК:\n{}", entries.join("\n")))
    }
}

/// Session name shown to operators
pub fn session_name(order_name: Option<&str>, today: chrono::NaiveDate) -> String {
    match order_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("Приемка: {}", name),
        None => format!("Приемка {}", today.format("%d.%m.%Y")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(created_line: bool) -> LastScan {
        LastScan {
            item_id: Uuid::nil(),
            quantity: 1,
            previous_qty: 4,
            created_line,
        }
    }

    #[test]
    fn test_undo_created_line() {
        assert_eq!(scan(true).undo_action(1), UndoAction::DeleteLine);
        // edited after the scan
        assert_eq!(scan(true).undo_action(3), UndoAction::RestoreQuantity(4));
        assert_eq!(scan(false).undo_action(5), UndoAction::RestoreQuantity(4));
    }

    #[test]
    fn test_defect_summary() {
        let lines = vec![
            DefectLine {
                article: Some("ART-7".to_string()),
                name: "Кружка".to_string(),
                defect_qty: 2,
            },
            DefectLine {
                article: None,
                name: "Тарелка".to_string(),
                defect_qty: 1,
            },
            DefectLine {
                article: None,
                name: "Ложка".to_string(),
                defect_qty: 0,
            },
        ];
        assert_eq!(
            defect_summary(&lines).as_deref(),
            Some("БРАК:\n• ART-7: 2 шт\n• Тарелка: 1 шт")
        );
        assert_eq!(defect_summary(&[]), None);
    }

    #[test]
    fn test_session_name() {
        let day = chrono::NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        assert_eq!(session_name(Some("00042"), day), "Приемка: 00042");
        assert_eq!(session_name(None, day), "Приемка 01.10.2026");
    }
}
