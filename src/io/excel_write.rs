//! Workbook output: plain autofiltered tables and the styled statistics report.

use std::path::Path;

use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Table, Workbook, Worksheet};

use crate::aggregate::{ConditionReport, Report, StatRow};
use crate::error::Result;

/// A table that will be materialised as an Excel sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetTable {
    pub sheet_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Represents all tables required to materialise the Excel workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkbookData {
    pub tables: Vec<SheetTable>,
}

/// Writes each table to its own sheet as an autofiltered Excel table.
pub fn write_workbook(path: &Path, workbook: &WorkbookData) -> Result<()> {
    let mut writer = Workbook::new();
    for table in &workbook.tables {
        let worksheet = writer.add_worksheet();
        worksheet.set_name(&table.sheet_name)?;
        write_table(worksheet, table)?;
        worksheet.autofit();
    }
    writer.save(path)?;
    Ok(())
}

fn write_table(worksheet: &mut Worksheet, table: &SheetTable) -> Result<()> {
    for (col, header) in table.columns.iter().enumerate() {
        worksheet.write_string(0, col as u16, header.as_str())?;
    }
    for (row, cells) in table.rows.iter().enumerate() {
        for (col, cell) in cells.iter().enumerate() {
            worksheet.write_string(row as u32 + 1, col as u16, cell.as_str())?;
        }
    }

    if table.columns.is_empty() {
        return Ok(());
    }
    // An Excel table needs at least one data row below its header.
    let last_row = table.rows.len().max(1) as u32;
    let last_col = table.columns.len() as u16 - 1;
    let mut excel_table = Table::new();
    excel_table.set_autofilter(true);
    worksheet.add_table(0, 0, last_row, last_col, &excel_table)?;
    Ok(())
}

struct ReportFormats {
    label: Format,
    cell: Format,
    time: Format,
    maximum: Format,
    mean: Format,
    minimum: Format,
}

impl ReportFormats {
    fn new() -> Self {
        let cell = Format::new()
            .set_align(FormatAlign::Center)
            .set_border(FormatBorder::Thin);
        Self {
            label: cell.clone().set_bold(),
            time: cell.clone().set_background_color(Color::RGB(0xF0F0F0)),
            maximum: cell.clone().set_background_color(Color::RGB(0xFFCCCC)),
            mean: cell.clone().set_background_color(Color::RGB(0xCCFFCC)),
            minimum: cell.clone().set_background_color(Color::RGB(0xCCE6FF)),
            cell,
        }
    }

    fn for_row(&self, row: StatRow) -> &Format {
        match row {
            StatRow::Time => &self.time,
            StatRow::Maximum => &self.maximum,
            StatRow::Mean => &self.mean,
            StatRow::Minimum => &self.minimum,
        }
    }
}

/// Writes one sheet per condition: a header block, the statistics table,
/// and the per-inflator pressures.
pub fn write_report(path: &Path, report: &Report) -> Result<()> {
    let mut workbook = Workbook::new();
    let formats = ReportFormats::new();

    for condition_report in &report.conditions {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(condition_report.condition.as_str())?;
        write_condition_sheet(worksheet, condition_report, &formats)?;
        worksheet.autofit();
    }

    workbook.save(path)?;
    Ok(())
}

fn write_condition_sheet(
    worksheet: &mut Worksheet,
    report: &ConditionReport,
    formats: &ReportFormats,
) -> Result<()> {
    let header = [
        ("Temperature", report.condition.as_str().to_string()),
        ("Version", report.version.clone()),
        ("Total Inflators", report.total_records.to_string()),
    ];
    for (row, (label, value)) in header.iter().enumerate() {
        worksheet.write_string_with_format(row as u32, 0, *label, &formats.label)?;
        worksheet.write_string_with_format(row as u32, 1, value.as_str(), &formats.label)?;
    }

    let mut row: u32 = 4;
    let labels = report.column_labels();
    worksheet.write_string_with_format(row, 0, "", &formats.label)?;
    for (col, label) in labels.iter().enumerate() {
        worksheet.write_string_with_format(row, (col + 1) as u16, label.as_str(), &formats.label)?;
    }
    row += 1;

    for stat_row in StatRow::ALL {
        let format = formats.for_row(stat_row);
        worksheet.write_string_with_format(row, 0, stat_row.label(), format)?;
        for (col, value) in report.row_values(stat_row).into_iter().enumerate() {
            write_value(worksheet, row, (col + 1) as u16, value, format)?;
        }
        row += 1;
    }

    row += 1;
    worksheet.write_string_with_format(row, 0, "Inflator Data", &formats.label)?;
    row += 1;
    worksheet.write_string_with_format(row, 0, "Inflator No", &formats.label)?;
    for (col, label) in labels.iter().enumerate() {
        worksheet.write_string_with_format(row, (col + 1) as u16, label.as_str(), &formats.label)?;
    }
    row += 1;

    for series in report.series.iter().filter(|series| series.has_data()) {
        worksheet.write_number_with_format(row, 0, series.inflator_no as f64, &formats.cell)?;
        for (col, value) in series.values.iter().enumerate() {
            write_value(worksheet, row, (col + 1) as u16, *value, &formats.cell)?;
        }
        row += 1;
    }

    Ok(())
}

fn write_value(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: Option<f64>,
    format: &Format,
) -> Result<()> {
    match value {
        Some(value) if value.is_finite() => {
            let rounded = (value * 100.0).round() / 100.0;
            worksheet.write_number_with_format(row, col, rounded, format)?;
        }
        _ => {
            worksheet.write_string_with_format(row, col, "-", format)?;
        }
    }
    Ok(())
}
