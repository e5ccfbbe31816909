//! Coercion of raw workbook cells into canonical values.
//!
//! Nothing in here fails: malformed input degrades to `None` or to the
//! trimmed textual form of the cell.

use std::fmt;

use calamine::DataType;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// Largest integer an `f64` represents exactly.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Text date patterns accepted by [`parse_date_text`], tried in order.
const DATE_PATTERNS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];

/// A trimmed, type-preserving cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl CellValue {
    /// Numeric view of the value; text is parsed after trimming.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(value) => Some(*value as f64),
            CellValue::Float(value) => Some(*value),
            CellValue::Text(value) => value.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            CellValue::Bool(_) => None,
        }
    }

    /// Integer view of the value; floats must be integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(value) => Some(*value),
            CellValue::Float(value) => float_to_int(*value),
            CellValue::Text(value) => {
                let trimmed = value.trim();
                trimmed
                    .parse::<i64>()
                    .ok()
                    .or_else(|| trimmed.parse::<f64>().ok().and_then(float_to_int))
            }
            CellValue::Bool(_) => None,
        }
    }

    /// True for a whole number, or for text made only of ASCII digits.
    pub fn is_digit_string(&self) -> bool {
        match self {
            CellValue::Int(value) => *value >= 0,
            CellValue::Float(value) => float_to_int(*value).is_some_and(|v| v >= 0),
            CellValue::Text(value) => {
                !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
            }
            CellValue::Bool(_) => false,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Int(value) => write!(f, "{value}"),
            CellValue::Float(value) => write!(f, "{value}"),
            CellValue::Bool(value) => write!(f, "{value}"),
            CellValue::Text(value) => f.write_str(value),
        }
    }
}

/// Normalizes a raw cell: empty or whitespace-only cells become `None`,
/// integral floats become integers, text is trimmed.
pub fn clean_value(cell: Option<&DataType>) -> Option<CellValue> {
    match cell? {
        DataType::Empty | DataType::Error(_) => None,
        DataType::Int(value) => Some(CellValue::Int(*value)),
        DataType::Float(value) => Some(
            float_to_int(*value)
                .map(CellValue::Int)
                .unwrap_or(CellValue::Float(*value)),
        ),
        DataType::Bool(value) => Some(CellValue::Bool(*value)),
        DataType::String(value) => text_value(value),
        DataType::DateTime(serial) => excel_serial_to_date(*serial)
            .map(|date| CellValue::Text(date.format("%Y-%m-%d").to_string())),
        other => text_value(&other.to_string()),
    }
}

/// Parses a date from a native date cell or from a recognized text pattern.
pub fn parse_date(cell: Option<&DataType>) -> Option<NaiveDate> {
    match cell? {
        DataType::DateTime(serial) => excel_serial_to_date(*serial),
        DataType::String(value) => parse_date_text(value),
        DataType::Empty | DataType::Error(_) => None,
        DataType::Int(_) | DataType::Float(_) | DataType::Bool(_) => None,
        other => parse_date_text(&other.to_string()),
    }
}

/// Parses `YYYY-MM-DD`, `DD/MM/YYYY`, or `DD-MM-YYYY`. A time part after
/// `T` or a space is ignored.
pub fn parse_date_text(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    let date_part = trimmed
        .split(['T', ' '])
        .next()
        .unwrap_or(trimmed);
    DATE_PATTERNS
        .iter()
        .find_map(|pattern| NaiveDate::parse_from_str(date_part, pattern).ok())
}

/// Parses a date previously stored in canonical ISO form.
pub fn parse_iso_date(value: Option<&str>) -> Option<NaiveDate> {
    value.and_then(|text| NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok())
}

/// Converts an Excel 1900-system serial day number to a calendar date.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(Days::new(serial.floor() as u64))
}

fn text_value(value: &str) -> Option<CellValue> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(CellValue::Text(trimmed.to_string()))
    }
}

fn float_to_int(value: f64) -> Option<i64> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < MAX_EXACT_INTEGER {
        Some(value as i64)
    } else {
        None
    }
}
