//! Packing (order picking) models

use chrono::NaiveDateTime;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle of a packing task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackingTaskStatus {
    Active,
    Completed,
}

impl PackingTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackingTaskStatus::Active => "active",
            PackingTaskStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(PackingTaskStatus::Active),
            "completed" => Some(PackingTaskStatus::Completed),
            _ => None,
        }
    }
}

/// Lifecycle of a shipping box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxStatus {
    Open,
    Closed,
}

impl BoxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoxStatus::Open => "open",
            BoxStatus::Closed => "closed",
        }
    }
}

/// Default task name, e.g. "Сборка 17.10.2026 14:05"
pub fn default_task_name(now: NaiveDateTime) -> String {
    format!("Сборка {}", now.format("%d.%m.%Y %H:%M"))
}

/// One row of an uploaded order file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderFileRow {
    /// Spreadsheet row number, header is row 1
    pub row: usize,
    pub barcode: Option<String>,
    pub sku: Option<String>,
    pub name: Option<String>,
    pub quantity: Decimal,
}

impl OrderFileRow {
    /// Rows without any product key or with a non-positive quantity are ignored
    pub fn is_usable(&self) -> bool {
        let has_key = self.barcode.is_some() || self.sku.is_some() || self.name.is_some();
        has_key && self.quantity > Decimal::ZERO
    }
}

/// Why an order file row did not become a task line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSkipReason {
    NotFound,
    NoStock,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRow {
    #[serde(flatten)]
    pub row: OrderFileRow,
    pub reason: RowSkipReason,
}

/// Planned quantity for a requested amount given available stock.
/// Fractional requests round up to whole pieces, stock rounds down. Returns
/// `None` when no whole piece is available.
pub fn clamp_to_stock(requested: Decimal, stock: Decimal) -> Option<i32> {
    if requested <= Decimal::ZERO {
        return None;
    }
    let available = stock.floor();
    if available <= Decimal::ZERO {
        return None;
    }
    let planned = requested.ceil().min(available).to_i32()?;
    (planned > 0).then_some(planned)
}
