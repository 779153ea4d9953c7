//! Parser for uploaded order files (XLSX/XLS or delimited text)

use rust_decimal::Decimal;
use shared::report::parse_decimal;
use shared::OrderFileRow;

use crate::error::{AppError, AppResult};
use crate::services::spreadsheet::{read_table, TableRow, HEADER_SEARCH_ROWS};

const BARCODE_COLUMNS: &[&str] = &["barcode", "баркод", "штрихкод", "штрих-код"];
const SKU_COLUMNS: &[&str] = &["sku", "артикул", "article"];
const NAME_COLUMNS: &[&str] = &["name", "наименование", "товар"];
const QUANTITY_COLUMNS: &[&str] = &["quantity", "количество", "qty"];

fn column(header: &[String], aliases: &[&str]) -> Option<usize> {
    header
        .iter()
        .position(|h| aliases.iter().any(|alias| h == alias))
}

fn header_columns(row: &TableRow) -> Vec<String> {
    row.cells
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_lowercase())
        .collect()
}

fn is_header(header: &[String]) -> bool {
    [BARCODE_COLUMNS, SKU_COLUMNS, NAME_COLUMNS, QUANTITY_COLUMNS]
        .iter()
        .any(|aliases| column(header, aliases).is_some())
}

/// Read order rows from a workbook or delimited text. The header is the
/// first row naming a known column; empty quantity cells default to one.
/// Rows keep their spreadsheet numbers.
pub fn parse_order_file(bytes: &[u8]) -> AppResult<Vec<OrderFileRow>> {
    let table = read_table(bytes)?;

    let header_idx = table
        .iter()
        .take(HEADER_SEARCH_ROWS)
        .position(|row| is_header(&header_columns(row)))
        .ok_or_else(|| {
            AppError::validation(
                "file",
                "Header row not found, expected barcode, SKU, name or quantity columns",
                "Не удалось найти строку заголовков (штрихкод, артикул, наименование, количество)",
            )
        })?;

    let header = header_columns(&table[header_idx]);
    let barcode_col = column(&header, BARCODE_COLUMNS);
    let sku_col = column(&header, SKU_COLUMNS);
    let name_col = column(&header, NAME_COLUMNS);
    let quantity_col = column(&header, QUANTITY_COLUMNS);

    let rows: Vec<OrderFileRow> = table[header_idx + 1..]
        .iter()
        .map(|record| {
            let text = |col: Option<usize>| record.get(col).map(str::to_string);
            let quantity = match text(quantity_col) {
                Some(raw) => parse_decimal(&raw).unwrap_or(Decimal::ZERO),
                None => Decimal::ONE,
            };
            OrderFileRow {
                row: record.number,
                barcode: text(barcode_col),
                sku: text(sku_col),
                name: text(name_col),
                quantity,
            }
        })
        .collect();

    if rows.is_empty() {
        return Err(AppError::validation("file", "File is empty", "Файл пустой"));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_russian_headers() {
        let csv = "Штрихкод;Артикул;Наименование;Количество\n\
                   4600000000017;;Кружка;3\n\
                   ;A-2;;\n\
                   ;;;2\n";
        let rows = parse_order_file(csv.as_bytes()).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].row, 2);
        assert_eq!(rows[0].barcode.as_deref(), Some("4600000000017"));
        assert_eq!(rows[0].quantity, Decimal::from(3));
        // empty quantity cell means one
        assert_eq!(rows[1].sku.as_deref(), Some("A-2"));
        assert_eq!(rows[1].quantity, Decimal::ONE);
        assert!(!rows[2].is_usable());
    }

    #[test]
    fn test_english_headers_without_quantity() {
        let csv = "Barcode,Name\n123,Mug\n";
        let rows = parse_order_file(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].name.as_deref(), Some("Mug"));
        assert_eq!(rows[0].quantity, Decimal::ONE);
    }

    #[test]
    fn test_title_line_and_tabs() {
        let tsv = "Заказ 1542\n\
                   Штрихкод\tКоличество\n\
                   4600000000017\t2\n";
        let rows = parse_order_file(tsv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].row, 3);
        assert_eq!(rows[0].barcode.as_deref(), Some("4600000000017"));
        assert_eq!(rows[0].quantity, Decimal::from(2));
    }

    #[test]
    fn test_unknown_columns() {
        assert!(parse_order_file("foo;bar\n1;2\n".as_bytes()).is_err());
    }

    #[test]
    fn test_empty_file() {
        assert!(parse_order_file("Barcode;Qty\n".as_bytes()).is_err());
    }
}
