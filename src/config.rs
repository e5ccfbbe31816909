//! Application paths and the fixed workbook layout.
//!
//! Every field is defaulted, so a configuration file only needs the values
//! that differ from the standard test-record template.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ToolError};

/// Zero-based cell coordinate, written in A1 notation in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    /// Parses an A1-style reference such as `U1` or `AB12`.
    pub fn parse(reference: &str) -> Option<CellRef> {
        let reference = reference.trim();
        let split = reference.find(|c: char| c.is_ascii_digit())?;
        let (letters, digits) = reference.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }

        let mut col: u32 = 0;
        for letter in letters.chars() {
            let value = letter.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
            col = col.checked_mul(26)?.checked_add(value)?;
        }
        let row: u32 = digits.parse().ok()?;
        if row == 0 {
            return None;
        }

        Some(CellRef {
            row: row - 1,
            col: col - 1,
        })
    }

    /// Absolute position as used by calamine ranges.
    pub fn position(self) -> (u32, u32) {
        (self.row, self.col)
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut letters = Vec::new();
        let mut col = self.col + 1;
        while col > 0 {
            let rem = (col - 1) % 26;
            letters.push((b'A' + rem as u8) as char);
            col = (col - 1) / 26;
        }
        let letters: String = letters.into_iter().rev().collect();
        write!(f, "{letters}{}", self.row + 1)
    }
}

impl TryFrom<String> for CellRef {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        CellRef::parse(&value).ok_or_else(|| format!("invalid cell reference '{value}'"))
    }
}

impl From<CellRef> for String {
    fn from(value: CellRef) -> Self {
        value.to_string()
    }
}

/// Fixed coordinates of the test-record template.
///
/// Row and column numbers are 1-based, as shown in a spreadsheet program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub inflator_type_cell: CellRef,
    pub test_order_cell: CellRef,
    pub production_order_cell: CellRef,
    pub propellant_lot_cell: CellRef,
    pub test_date_cell: CellRef,
    pub temperature_cell: CellRef,
    /// First row of the test list on metadata sheets.
    pub test_rows_start: u32,
    /// First column scanned for limits on series sheets.
    pub limit_columns_start: u32,
    /// Column after the last one scanned for limits.
    pub limit_columns_end: u32,
    pub max_limit_row: u32,
    pub min_limit_row: u32,
    /// Row holding the pressures of the first listed inflator.
    pub pressure_rows_start: u32,
}

impl Layout {
    /// Time offset (ms) of a 1-based column number.
    pub fn time_offset(column: u32) -> i64 {
        i64::from(column) - 2
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            inflator_type_cell: CellRef { row: 0, col: 20 },
            test_order_cell: CellRef { row: 3, col: 9 },
            production_order_cell: CellRef { row: 2, col: 9 },
            propellant_lot_cell: CellRef { row: 2, col: 18 },
            test_date_cell: CellRef { row: 3, col: 2 },
            temperature_cell: CellRef { row: 9, col: 2 },
            test_rows_start: 10,
            limit_columns_start: 2,
            limit_columns_end: 203,
            max_limit_row: 6,
            min_limit_row: 7,
            pressure_rows_start: 10,
        }
    }
}

/// Paths and layout the application runs with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store_path: PathBuf,
    pub excel_folder: PathBuf,
    pub report_dir: PathBuf,
    pub layout: Layout,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("Data.json"),
            excel_folder: PathBuf::from("."),
            report_dir: PathBuf::from("."),
            layout: Layout::default(),
        }
    }
}

impl AppConfig {
    /// Loads the configuration file when given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<AppConfig> {
        let Some(path) = path else {
            return Ok(AppConfig::default());
        };
        if !path.exists() {
            return Err(ToolError::MissingConfig(path.to_path_buf()));
        }
        let source = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&source)?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }
}
