//! Input validation for scanner and operator input

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    // Printable ASCII as emitted by handheld scanners, plus the GS1 group separator
    static ref SCAN_CODE_REGEX: Regex = Regex::new(r"^[\x21-\x7E\x1D]+$").unwrap();
}

pub const MAX_BARCODE_LEN: usize = 128;
pub const MIN_MARKING_CODE_LEN: usize = 13;
pub const MAX_MARKING_CODE_LEN: usize = 255;

/// Rejected input. Carries the offending field for the error response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("{field} must not be negative")]
    Negative { field: &'static str },

    #[error("Invalid barcode")]
    InvalidBarcode,

    #[error("Invalid marking code")]
    InvalidMarkingCode,
}

impl ValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::Required { field }
            | ValidationError::NotPositive { field }
            | ValidationError::Negative { field } => field,
            ValidationError::InvalidBarcode => "barcode",
            ValidationError::InvalidMarkingCode => "marking_code",
        }
    }

    /// Message for Russian-speaking operators
    pub fn message_ru(&self) -> String {
        match self {
            ValidationError::Required { field } => format!("Поле {} обязательно", field),
            ValidationError::NotPositive { field } => {
                format!("Поле {} должно быть больше нуля", field)
            }
            ValidationError::Negative { field } => {
                format!("Поле {} не может быть отрицательным", field)
            }
            ValidationError::InvalidBarcode => "Некорректный штрихкод".to_string(),
            ValidationError::InvalidMarkingCode => "Некорректный код маркировки".to_string(),
        }
    }
}

/// Trim a scanned barcode and check it looks like one
pub fn validate_barcode(raw: &str) -> Result<String, ValidationError> {
    let code = raw.trim();
    if code.is_empty() {
        return Err(ValidationError::Required { field: "barcode" });
    }
    if code.len() > MAX_BARCODE_LEN || !SCAN_CODE_REGEX.is_match(code) {
        return Err(ValidationError::InvalidBarcode);
    }
    Ok(code.to_string())
}

/// Trim a scanned marking code (DataMatrix payload) and check its shape
pub fn validate_marking_code(raw: &str) -> Result<String, ValidationError> {
    let code = raw.trim_matches(|c: char| c.is_whitespace());
    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "marking_code",
        });
    }
    let len = code.chars().count();
    if !(MIN_MARKING_CODE_LEN..=MAX_MARKING_CODE_LEN).contains(&len)
        || !SCAN_CODE_REGEX.is_match(code)
    {
        return Err(ValidationError::InvalidMarkingCode);
    }
    Ok(code.to_string())
}

pub fn validate_positive(field: &'static str, value: i32) -> Result<i32, ValidationError> {
    if value <= 0 {
        return Err(ValidationError::NotPositive { field });
    }
    Ok(value)
}

pub fn validate_non_negative(field: &'static str, value: i32) -> Result<i32, ValidationError> {
    if value < 0 {
        return Err(ValidationError::Negative { field });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barcode() {
        assert_eq!(validate_barcode(" 4600000000017\n"), Ok("4600000000017".to_string()));
        assert_eq!(
            validate_barcode("  "),
            Err(ValidationError::Required { field: "barcode" })
        );
        assert_eq!(validate_barcode("46 00"), Err(ValidationError::InvalidBarcode));
        assert_eq!(
            validate_barcode(&"9".repeat(MAX_BARCODE_LEN + 1)),
            Err(ValidationError::InvalidBarcode)
        );
    }

    #[test]
    fn test_marking_code_keeps_group_separator() {
        let code = "010460043993125621JgXJ5.T\u{1d}8005112000";
        assert_eq!(validate_marking_code(code), Ok(code.to_string()));
        assert_eq!(validate_marking_code("0104600"), Err(ValidationError::InvalidMarkingCode));
    }

    #[test]
    fn test_quantities() {
        assert!(validate_positive("quantity", 1).is_ok());
        assert_eq!(
            validate_positive("quantity", 0),
            Err(ValidationError::NotPositive { field: "quantity" })
        );
        assert!(validate_non_negative("defect_qty", 0).is_ok());
        assert_eq!(ValidationError::Negative { field: "defect_qty" }.field(), "defect_qty");
    }
}
