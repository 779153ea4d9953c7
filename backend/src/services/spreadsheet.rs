//! Tabular uploads: the first sheet of an XLSX/XLS workbook, or delimited text

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Reader};

use crate::error::{AppError, AppResult};

/// Rows inspected when looking for the header or the delimiter
pub const HEADER_SEARCH_ROWS: usize = 50;

/// Candidate delimiters; earlier ones win ties
const DELIMITERS: [u8; 3] = [b';', b'\t', b','];

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

fn unreadable(detail: impl std::fmt::Display) -> AppError {
    AppError::validation(
        "file",
        &format!("Unreadable file: {}", detail),
        "Не удалось прочитать файл",
    )
}

/// Read every row as trimmed text. Rows with no content are dropped; row
/// numbers are kept so callers can report spreadsheet positions.
pub fn read_table(bytes: &[u8]) -> AppResult<Vec<TableRow>> {
    let rows = if is_workbook(bytes) {
        read_workbook(bytes)?
    } else {
        read_delimited(bytes)?
    };

    Ok(rows
        .into_iter()
        .enumerate()
        .filter(|(_, cells)| cells.iter().any(|c| !c.is_empty()))
        .map(|(index, cells)| TableRow {
            number: index + 1,
            cells,
        })
        .collect())
}

/// One non-empty row with its 1-based position in the file
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub number: usize,
    pub cells: Vec<String>,
}

impl TableRow {
    pub fn get(&self, col: Option<usize>) -> Option<&str> {
        col.and_then(|c| self.cells.get(c))
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

fn is_workbook(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC)
}

fn read_workbook(bytes: &[u8]) -> AppResult<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(unreadable)?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| unreadable("workbook has no sheets"))?;
    let range = workbook.worksheet_range(&sheet_name).map_err(unreadable)?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string().trim().to_string()).collect())
        .collect())
}

fn parse_delimited(text: &[u8], delimiter: u8) -> Result<Vec<Vec<String>>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text);

    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(|f| f.trim().to_string()).collect());
    }
    Ok(rows)
}

/// Widest row among the first rows. A title line above the header has one
/// column under every delimiter, so only the header and data decide.
fn width(rows: &[Vec<String>]) -> usize {
    rows.iter()
        .take(HEADER_SEARCH_ROWS)
        .map(Vec::len)
        .max()
        .unwrap_or(0)
}

fn read_delimited(bytes: &[u8]) -> AppResult<Vec<Vec<String>>> {
    let text = bytes.strip_prefix("\u{feff}".as_bytes()).unwrap_or(bytes);

    let mut best: Option<Vec<Vec<String>>> = None;
    let mut last_error = None;
    for delimiter in DELIMITERS {
        match parse_delimited(text, delimiter) {
            Ok(rows) => {
                if best.as_ref().map_or(true, |b| width(&rows) > width(b)) {
                    best = Some(rows);
                }
            }
            Err(e) => last_error = Some(e),
        }
    }

    match (best, last_error) {
        (Some(rows), _) => Ok(rows),
        (None, Some(e)) => Err(unreadable(e)),
        (None, None) => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(rows: &[TableRow]) -> Vec<Vec<&str>> {
        rows.iter()
            .map(|r| r.cells.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn test_semicolon_with_title_line() {
        let text = "Остатки по ячейкам\nКод;Ячейка;Доступно\nC-1;Стеллаж 5;1,5\n";
        let rows = read_table(text.as_bytes()).unwrap();
        assert_eq!(
            cells(&rows),
            vec![
                vec!["Остатки по ячейкам"],
                vec!["Код", "Ячейка", "Доступно"],
                vec!["C-1", "Стеллаж 5", "1,5"],
            ]
        );
    }

    #[test]
    fn test_tab_separated() {
        let text = "Barcode\tQty\n4600000000017\t2\n";
        let rows = read_table(text.as_bytes()).unwrap();
        assert_eq!(rows[1].cells, vec!["4600000000017", "2"]);
    }

    #[test]
    fn test_comma_separated_with_bom() {
        let text = "\u{feff}Barcode,Name\n123,Mug\n";
        let rows = read_table(text.as_bytes()).unwrap();
        assert_eq!(rows[0].cells, vec!["Barcode", "Name"]);
    }

    #[test]
    fn test_blank_rows_keep_numbering() {
        let text = "a;b\n;\nc;d\n";
        let rows = read_table(text.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].number, 3);
        assert_eq!(rows[1].get(Some(1)), Some("d"));
        assert_eq!(rows[1].get(Some(5)), None);
    }

    #[test]
    fn test_broken_workbook_is_rejected() {
        let mut bytes = ZIP_MAGIC.to_vec();
        bytes.extend_from_slice(b"not really a workbook");
        let err = read_table(&bytes).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }
}
