//! Workbook input: loads the classified sheets of an order workbook and
//! hands them to the extractor.

use std::path::Path;

use calamine::{DataType, Range, Reader, Xlsx, open_workbook};
use tracing::debug;

use crate::config::Layout;
use crate::error::{Result, ToolError};
use crate::extract::{ExtractionReport, extract_workbook};
use crate::model::{Condition, SheetRole};
use crate::store::Store;

/// A named worksheet as read from a workbook.
pub type NamedSheet = (String, Range<DataType>);

/// Reads the sheets that take part in extraction, in declaration order.
///
/// Sheets whose names carry no condition or no role are not loaded at all.
pub fn read_sheets(path: &Path) -> Result<Vec<NamedSheet>> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let names = workbook.sheet_names().to_owned();

    let mut sheets = Vec::new();
    for name in names {
        if Condition::from_sheet_name(&name).is_none() || SheetRole::from_sheet_name(&name).is_none() {
            debug!(sheet = %name, "ignoring sheet");
            continue;
        }
        let range = load_sheet(&mut workbook, &name)?;
        sheets.push((name, range));
    }

    Ok(sheets)
}

/// Extracts one workbook file into the store.
pub fn extract_file(path: &Path, layout: &Layout, store: &mut Store) -> Result<ExtractionReport> {
    let sheets = read_sheets(path)?;
    debug!(path = %path.display(), sheet_count = sheets.len(), "workbook loaded");
    Ok(extract_workbook(
        sheets.iter().map(|(name, range)| (name.as_str(), range)),
        layout,
        store,
    ))
}

/// Loads a sheet listed in the workbook. A listed sheet without a data part
/// is a workbook error, not an empty sheet.
fn load_sheet<R: std::io::Read + std::io::Seek>(workbook: &mut Xlsx<R>, name: &str) -> Result<Range<DataType>> {
    match workbook.worksheet_range(name) {
        Some(range) => Ok(range?),
        None => Err(ToolError::InvalidWorkbook(format!(
            "sheet '{name}' is listed but has no data part"
        ))),
    }
}
