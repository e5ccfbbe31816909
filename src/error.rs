//! Crate-wide error type.

use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the failure cases of importing, querying, and
/// reporting ballistic test data.
///
/// The message-carrying variants display their message verbatim so the
/// command line can show them to the operator unchanged.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Raised when a workbook cannot be interpreted at all.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Raised when the persisted store document has an unexpected shape.
    #[error("invalid store document: {0}")]
    InvalidStore(String),

    /// Empty or malformed operator input (order lists, date ranges, limits).
    #[error("{0}")]
    Input(String),

    /// Missing store file, order, or version.
    #[error("{0}")]
    NotFound(String),

    /// Selections that would break the single-version workplace.
    #[error("{0}")]
    Consistency(String),

    /// Raised when an explicitly requested configuration file does not exist.
    #[error("configuration file not found: {0}")]
    MissingConfig(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
