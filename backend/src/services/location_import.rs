//! Parser for the "stock by cell" report exported from the inventory system

use std::collections::HashMap;

use rust_decimal::Decimal;
use shared::report::parse_decimal;

use crate::error::{AppError, AppResult};
use crate::services::spreadsheet::{read_table, TableRow, HEADER_SEARCH_ROWS};

/// Cell holding the most available stock for a product key
#[derive(Debug, Clone, PartialEq)]
pub struct BestCell {
    pub cell: String,
    pub available: Decimal,
}

#[derive(Debug, Default)]
pub struct CellReport {
    pub rows: usize,
    /// Keyed by product code (SKU)
    pub by_code: HashMap<String, BestCell>,
    pub by_article: HashMap<String, BestCell>,
}

#[derive(Debug, Default)]
struct Columns {
    code: Option<usize>,
    article: Option<usize>,
    cell: Option<usize>,
    available: Option<usize>,
}

impl Columns {
    fn from_header(header: &[String]) -> Self {
        let find = |needle: &str| header.iter().position(|h| h.contains(needle));
        Self {
            code: find("код"),
            article: find("артикул"),
            cell: find("ячейка"),
            available: find("доступ"),
        }
    }
}

fn keep_best(map: &mut HashMap<String, BestCell>, key: &str, candidate: &BestCell) {
    match map.get(key) {
        Some(current) if candidate.available <= current.available => {}
        _ => {
            map.insert(key.to_string(), candidate.clone());
        }
    }
}

/// Parse the report and keep, per code and per article, the cell with the
/// most available stock. The first cell seen wins ties. Accepts XLSX/XLS
/// workbooks as well as delimited text.
pub fn parse_cell_report(bytes: &[u8]) -> AppResult<CellReport> {
    let rows: Vec<TableRow> = read_table(bytes)?;

    let header_idx = rows
        .iter()
        .take(HEADER_SEARCH_ROWS)
        .position(|row| {
            let joined = row.cells.join(" | ").to_lowercase();
            joined.contains("код") && joined.contains("ячейка") && joined.contains("доступ")
        })
        .ok_or_else(|| {
            AppError::validation(
                "file",
                "Header row not found, expected a stock by cell report",
                "Не удалось найти строку заголовков. Ожидаем отчёт \"Остатки по ячейкам\".",
            )
        })?;

    let header: Vec<String> = rows[header_idx]
        .cells
        .iter()
        .map(|h| h.to_lowercase())
        .collect();
    let columns = Columns::from_header(&header);

    if columns.code.is_none() && columns.article.is_none() {
        return Err(AppError::validation(
            "file",
            "Report has neither a code nor an article column",
            "В отчёте нет колонок \"Код\"/\"Артикул\", нечем сопоставлять товары",
        ));
    }
    let Some(cell_col) = columns.cell else {
        return Err(AppError::validation(
            "file",
            "Report has no cell column",
            "В отчёте нет колонки \"Ячейка\"",
        ));
    };

    let field = |row: &TableRow, col: Option<usize>| -> String {
        row.get(col).unwrap_or_default().to_string()
    };

    let mut report = CellReport {
        rows: rows.len(),
        ..Default::default()
    };

    for row in &rows[header_idx + 1..] {
        let cell = field(row, Some(cell_col));
        // separator rows and repeated headers
        if cell.is_empty() || cell.to_lowercase() == "ячейка" {
            continue;
        }
        let code = field(row, columns.code);
        let article = field(row, columns.article);
        if code.is_empty() && article.is_empty() {
            continue;
        }

        let available = parse_decimal(&field(row, columns.available)).unwrap_or(Decimal::ZERO);
        let candidate = BestCell { cell, available };

        if !code.is_empty() {
            keep_best(&mut report.by_code, &code, &candidate);
        }
        if !article.is_empty() {
            keep_best(&mut report.by_article, &article, &candidate);
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
Остатки по ячейкам;;;;
;;;;
Код;Артикул;Наименование;Ячейка;Доступно
00012;A-1;Кружка;Стеллаж 5 полка 2 ячейка B;3
00012;A-1;Кружка;Стеллаж 7 полка 1 ячейка A;10
00012;A-1;Кружка;Стеллаж 9 полка 1 ячейка C;10
;A-2;Блюдце;Стеллаж 41 полка 1 ячейка A;1,5
00013;;Ложка;;4
;;;Ячейка;
";

    #[test]
    fn test_best_cell_per_key() {
        let report = parse_cell_report(REPORT.as_bytes()).unwrap();

        assert_eq!(report.by_code.len(), 1);
        assert_eq!(report.by_code["00012"].cell, "Стеллаж 7 полка 1 ячейка A");
        assert_eq!(report.by_article["A-1"].available, Decimal::from(10));
        assert_eq!(report.by_article["A-2"].available, Decimal::new(15, 1));
        assert!(!report.by_code.contains_key("00013"));
    }

    #[test]
    fn test_comma_separated() {
        let csv = "Код,Ячейка,Доступно\nX1,Стеллаж 1 полка 1 ячейка A,2\n";
        let report = parse_cell_report(csv.as_bytes()).unwrap();
        assert_eq!(report.by_code["X1"].cell, "Стеллаж 1 полка 1 ячейка A");
        assert!(report.by_article.is_empty());
    }

    #[test]
    fn test_title_line_above_header() {
        let csv = "Остатки по ячейкам\n\
Код;Артикул;Наименование;Ячейка;Доступно\n\
C-1;A-1;Кружка;Стеллаж 5 полка 1 ячейка A;4\n";
        let report = parse_cell_report(csv.as_bytes()).unwrap();
        assert_eq!(report.by_code["C-1"].cell, "Стеллаж 5 полка 1 ячейка A");
        assert_eq!(report.by_article["A-1"].available, Decimal::from(4));
    }

    #[test]
    fn test_tab_separated() {
        let tsv = "Код\tАртикул\tЯчейка\tДоступно\n\
T-1\tA-9\tСтеллаж 12 полка 3 ячейка B\t2,5\n";
        let report = parse_cell_report(tsv.as_bytes()).unwrap();
        assert_eq!(report.by_code["T-1"].cell, "Стеллаж 12 полка 3 ячейка B");
        assert_eq!(report.by_code["T-1"].available, Decimal::new(25, 1));
    }

    #[test]
    fn test_missing_header() {
        let err = parse_cell_report("a;b;c\n1;2;3\n".as_bytes()).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_header_requires_cell_column() {
        let csv = "Код;Доступно;Наименование\n1;2;ячейка\n";
        assert!(parse_cell_report(csv.as_bytes()).is_err());
    }
}
