//! Extraction of test records from the sheets of one workbook.
//!
//! Sheets are handled in declaration order. A metadata ("Datenblatt") sheet
//! sets the current version/order; a series ("Grafik") sheet is always
//! attributed to the most recently seen metadata sheet, whatever order that
//! sheet belongs to. Workbooks that interleave sheets of different orders
//! are therefore mis-attributed; this adjacency rule is kept as is.

use std::collections::{BTreeSet, HashSet};

use calamine::{DataType, Range};
use tracing::{debug, warn};

use crate::config::{CellRef, Layout};
use crate::model::{
    Condition, Limits, OrderMetadata, OrderRecord, OrderRef, PressureEntry, PressureMap,
    SheetRole, TemperatureBlock, TestEntry,
};
use crate::normalize::{CellValue, clean_value, parse_date};
use crate::store::Store;

/// Column of the test number in a metadata sheet's test list.
const TEST_NO_COLUMN: u32 = 0;
/// Column of the inflator number in a metadata sheet's test list.
const INFLATOR_NO_COLUMN: u32 = 1;
/// Consecutive blank pressure rows that end a series.
const BLANK_ROWS_LIMIT: usize = 2;

/// Orders touched and anomalies noticed while extracting one workbook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionReport {
    pub orders: BTreeSet<OrderRef>,
    pub warnings: Vec<String>,
}

impl ExtractionReport {
    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }
}

/// Derives the version tag from an inflator type code: `"V"` followed by
/// whatever follows the last `V` in the code.
pub fn version_tag(inflator_type: &str) -> String {
    let suffix = inflator_type.rsplit('V').next().unwrap_or("");
    format!("V{suffix}")
}

/// Folds every recognised sheet of a workbook into the store.
pub fn extract_workbook<'a, I>(sheets: I, layout: &Layout, store: &mut Store) -> ExtractionReport
where
    I: IntoIterator<Item = (&'a str, &'a Range<DataType>)>,
{
    let mut report = ExtractionReport::default();
    let mut current: Option<OrderRef> = None;

    for (name, range) in sheets {
        let Some(condition) = Condition::from_sheet_name(name) else {
            debug!(sheet = name, "skipping sheet without condition");
            continue;
        };
        match SheetRole::from_sheet_name(name) {
            Some(SheetRole::Metadata) => {
                current = extract_metadata_sheet(range, condition, layout, store, &mut report);
                if let Some(order_ref) = &current {
                    report.orders.insert(order_ref.clone());
                }
            }
            Some(SheetRole::Series) => match &current {
                Some(order_ref) => {
                    extract_series_sheet(range, condition, order_ref, layout, store, &mut report)
                }
                None => debug!(sheet = name, "series sheet before any metadata sheet"),
            },
            None => debug!(sheet = name, "skipping sheet without role"),
        }
    }

    report
}

/// Reads order metadata and the test list, creating store nodes as needed.
///
/// Metadata and the block temperature are only written when the nodes are
/// created; the test list is replaced on every import.
pub fn extract_metadata_sheet(
    range: &Range<DataType>,
    condition: Condition,
    layout: &Layout,
    store: &mut Store,
    report: &mut ExtractionReport,
) -> Option<OrderRef> {
    let inflator_type = cell_value(range, layout.inflator_type_cell)
        .map(|value| value.to_string())
        .unwrap_or_default();
    let version = version_tag(&inflator_type);

    let Some(order) = cell_value(range, layout.test_order_cell).map(|value| value.to_string())
    else {
        report.warn(format!(
            "{condition} metadata sheet has no test order in {}",
            layout.test_order_cell
        ));
        return None;
    };

    let metadata = OrderMetadata {
        production_order: cell_value(range, layout.production_order_cell),
        propellant_lot_number: cell_value(range, layout.propellant_lot_cell),
        test_date: parse_date(range.get_value(layout.test_date_cell.position()))
            .map(|date| date.format("%Y-%m-%d").to_string()),
    };
    let temperature_c = cell_value(range, layout.temperature_cell).and_then(|value| value.as_f64());

    let record = store
        .data
        .entry(version.clone())
        .or_default()
        .entry(order.clone())
        .or_insert_with(|| OrderRecord {
            metadata,
            temperatures: Default::default(),
        });
    let block = record
        .temperatures
        .entry(condition)
        .or_insert_with(|| TemperatureBlock {
            temperature_c,
            ..TemperatureBlock::default()
        });
    block.tests = read_test_list(range, layout);

    debug!(%version, %order, %condition, tests = block.tests.len(), "read metadata sheet");
    Some(OrderRef::new(version, order))
}

/// Collects `(test_no, inflator_no)` rows until the end of the sheet. A row
/// qualifies when its first cell is a digit string; the first occurrence of
/// a test number wins.
fn read_test_list(range: &Range<DataType>, layout: &Layout) -> Vec<TestEntry> {
    let Some((last_row, _)) = range.end() else {
        return Vec::new();
    };

    let mut tests = Vec::new();
    let mut seen = HashSet::new();

    for row in layout.test_rows_start.saturating_sub(1)..=last_row {
        let Some(first) = clean_value(range.get_value((row, TEST_NO_COLUMN))) else {
            continue;
        };
        if !first.is_digit_string() {
            continue;
        }
        let Some(test_no) = first.as_i64() else {
            continue;
        };
        let Some(inflator_no) =
            clean_value(range.get_value((row, INFLATOR_NO_COLUMN))).and_then(|v| v.as_i64())
        else {
            debug!(row = row + 1, test_no, "test row without numeric inflator");
            continue;
        };
        if seen.insert(test_no) {
            tests.push(TestEntry {
                test_no,
                inflator_no,
            });
        }
    }

    tests
}

/// Reads limits and pressure rows for the current order's condition block.
///
/// Pressure rows are paired with the block's test list by position: row `i`
/// belongs to the `i`-th listed inflator.
pub fn extract_series_sheet(
    range: &Range<DataType>,
    condition: Condition,
    order_ref: &OrderRef,
    layout: &Layout,
    store: &mut Store,
    report: &mut ExtractionReport,
) {
    let Some(block) = store
        .data
        .get_mut(&order_ref.version)
        .and_then(|orders| orders.get_mut(&order_ref.order))
        .and_then(|record| record.temperatures.get_mut(&condition))
    else {
        report.warn(format!(
            "{condition} series sheet for {order_ref} has no matching metadata sheet"
        ));
        return;
    };

    let (limits, valid_columns) = read_limits(range, layout);
    let inflators: Vec<i64> = block.tests.iter().map(|test| test.inflator_no).collect();

    let mut pressure_data = Vec::new();
    let mut blank_rows = 0;
    let mut row = layout.pressure_rows_start.saturating_sub(1);

    for inflator_no in inflators {
        let mut pressures = PressureMap::new();
        let mut blank = true;
        for &column in &valid_columns {
            let Some(value) = clean_value(range.get_value((row, column - 1))) else {
                continue;
            };
            blank = false;
            match value.as_f64() {
                Some(pressure) => {
                    pressures.insert(Layout::time_offset(column), pressure);
                }
                None => debug!(row = row + 1, column, %value, "skipping non-numeric pressure"),
            }
        }

        if blank {
            blank_rows += 1;
            if blank_rows >= BLANK_ROWS_LIMIT {
                break;
            }
        } else {
            blank_rows = 0;
            if !pressures.is_empty() {
                pressure_data.push(PressureEntry {
                    inflator_no,
                    pressures,
                });
            }
        }
        row += 1;
    }

    if pressure_data.len() != block.tests.len() {
        report.warn(format!(
            "{order_ref} {condition}: {} pressure rows for {} tests",
            pressure_data.len(),
            block.tests.len()
        ));
    }

    debug!(order = %order_ref, %condition, columns = valid_columns.len(), rows = pressure_data.len(), "read series sheet");
    block.limits = limits;
    block.pressure_data = pressure_data;
}

/// Scans the limit rows. A column is valid when either of its limit cells is
/// non-empty; non-numeric limits leave the column valid but unrecorded.
fn read_limits(range: &Range<DataType>, layout: &Layout) -> (Limits, Vec<u32>) {
    let mut limits = Limits::default();
    let mut valid_columns = Vec::new();

    for column in layout.limit_columns_start.max(1)..layout.limit_columns_end {
        let minimum = clean_value(range.get_value((layout.min_limit_row.saturating_sub(1), column - 1)));
        let maximum = clean_value(range.get_value((layout.max_limit_row.saturating_sub(1), column - 1)));
        if minimum.is_none() && maximum.is_none() {
            continue;
        }

        valid_columns.push(column);
        let offset = Layout::time_offset(column);
        if let Some(value) = minimum.as_ref().and_then(CellValue::as_f64) {
            limits.minimums.insert(offset, value);
        }
        if let Some(value) = maximum.as_ref().and_then(CellValue::as_f64) {
            limits.maximums.insert(offset, value);
        }
    }

    (limits, valid_columns)
}

fn cell_value(range: &Range<DataType>, cell: CellRef) -> Option<CellValue> {
    clean_value(range.get_value(cell.position()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds an in-memory sheet from A1-addressed cells.
    pub(crate) fn sheet(cells: &[(&str, DataType)]) -> Range<DataType> {
        let positions: Vec<(CellRef, DataType)> = cells
            .iter()
            .map(|(reference, value)| (CellRef::parse(reference).expect("valid ref"), value.clone()))
            .collect();
        let max_row = positions.iter().map(|(cell, _)| cell.row).max().unwrap_or(0);
        let max_col = positions.iter().map(|(cell, _)| cell.col).max().unwrap_or(0);
        let mut range = Range::new((0, 0), (max_row, max_col));
        for (cell, value) in positions {
            range.set_value(cell.position(), value);
        }
        range
    }

    fn text(value: &str) -> DataType {
        DataType::String(value.to_string())
    }

    fn num(value: f64) -> DataType {
        DataType::Float(value)
    }

    pub(crate) fn datenblatt(order: &str, date: &str, rows: &[(f64, f64)]) -> Range<DataType> {
        let refs: Vec<(String, String)> = (0..rows.len())
            .map(|i| (format!("A{}", 11 + i), format!("B{}", 11 + i)))
            .collect();
        let mut cells = vec![
            ("U1", text("GG-120 V3")),
            ("J4", text(order)),
            ("J3", num(880123.0)),
            ("S3", text("LOT-9")),
            ("C4", text(date)),
            ("C10", num(23.0)),
        ];
        for (i, (test_no, inflator_no)) in rows.iter().enumerate() {
            cells.push((refs[i].0.as_str(), num(*test_no)));
            cells.push((refs[i].1.as_str(), num(*inflator_no)));
        }
        sheet(&cells)
    }

    pub(crate) fn grafik() -> Range<DataType> {
        sheet(&[
            ("B6", num(50.0)),
            ("B7", num(10.0)),
            ("G6", num(60.0)),
            ("G7", num(5.0)),
            ("B10", num(20.0)),
            ("G10", num(45.0)),
            ("B11", num(22.0)),
            ("G11", num(48.0)),
        ])
    }

    #[test]
    fn version_tag_uses_text_after_last_v() {
        assert_eq!(version_tag("GG-120 V3"), "V3");
        assert_eq!(version_tag("AV-V12.1"), "V12.1");
        assert_eq!(version_tag("no version"), "Vno version");
        assert_eq!(version_tag(""), "V");
    }

    #[test]
    fn extracts_metadata_tests_limits_and_pressures() {
        let data = datenblatt("T1", "2024-03-15", &[(1.0, 100.0), (2.0, 101.0)]);
        let series = grafik();
        let mut store = Store::default();
        let report = extract_workbook(
            [("Datenblatt RT", &data), ("Grafik RT", &series)],
            &Layout::default(),
            &mut store,
        );

        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(report.orders.len(), 1);

        let record = store.order("V3", "T1").expect("order stored");
        assert_eq!(record.metadata.test_date.as_deref(), Some("2024-03-15"));
        assert_eq!(record.metadata.production_order, Some(CellValue::Int(880123)));

        let block = &record.temperatures[&Condition::Rt];
        assert_eq!(block.temperature_c, Some(23.0));
        assert_eq!(
            block.tests,
            vec![
                TestEntry { test_no: 1, inflator_no: 100 },
                TestEntry { test_no: 2, inflator_no: 101 },
            ]
        );
        assert_eq!(block.pressure_data.len(), 2);
        assert_eq!(block.pressure_data[0].inflator_no, 100);
        assert_eq!(block.pressure_data[0].pressures, PressureMap::from([(0, 20.0), (5, 45.0)]));
        assert_eq!(block.pressure_data[1].pressures, PressureMap::from([(0, 22.0), (5, 48.0)]));
        assert_eq!(block.limits.maximums, PressureMap::from([(0, 50.0), (5, 60.0)]));
        assert_eq!(block.limits.minimums, PressureMap::from([(0, 10.0), (5, 5.0)]));
    }

    #[test]
    fn duplicate_test_numbers_keep_first_and_non_digit_rows_are_skipped() {
        let data = sheet(&[
            ("U1", text("X V1")),
            ("J4", text("T9")),
            ("A10", text("Nr.")),
            ("A11", text("7")),
            ("B11", num(700.0)),
            ("A12", num(7.0)),
            ("B12", num(701.0)),
            ("A13", text("8a")),
            ("B13", num(800.0)),
            ("A20", num(9.0)),
            ("B20", num(900.0)),
        ]);
        let mut store = Store::default();
        extract_workbook([("Datenblatt plus", &data)], &Layout::default(), &mut store);

        let block = &store.order("V1", "T9").expect("stored").temperatures[&Condition::Ht];
        assert_eq!(
            block.tests,
            vec![
                TestEntry { test_no: 7, inflator_no: 700 },
                TestEntry { test_no: 9, inflator_no: 900 },
            ]
        );
    }

    #[test]
    fn pressure_scan_stops_after_two_blank_rows() {
        let data = datenblatt("T2", "2024-01-02", &[(1.0, 1.0), (2.0, 2.0), (3.0, 3.0), (4.0, 4.0)]);
        let series = sheet(&[
            ("B6", num(50.0)),
            ("B10", num(20.0)),
            // row 11 blank, row 12 blank
            ("B13", num(30.0)),
        ]);
        let mut store = Store::default();
        let report = extract_workbook(
            [("Datenblatt RT", &data), ("Grafik RT", &series)],
            &Layout::default(),
            &mut store,
        );

        let block = &store.order("V3", "T2").expect("stored").temperatures[&Condition::Rt];
        assert_eq!(block.pressure_data.len(), 1);
        assert_eq!(block.pressure_data[0].inflator_no, 1);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn non_numeric_pressure_cells_skip_only_that_value() {
        let data = datenblatt("T3", "2024-01-02", &[(1.0, 10.0)]);
        let series = sheet(&[
            ("B6", num(50.0)),
            ("C6", num(55.0)),
            ("B10", text("n/a")),
            ("C10", num(31.5)),
        ]);
        let mut store = Store::default();
        extract_workbook(
            [("Datenblatt minus", &data), ("Grafik minus", &series)],
            &Layout::default(),
            &mut store,
        );

        let block = &store.order("V3", "T3").expect("stored").temperatures[&Condition::Lt];
        assert_eq!(block.pressure_data[0].pressures, PressureMap::from([(1, 31.5)]));
    }

    #[test]
    fn series_sheet_without_prior_metadata_is_ignored() {
        let series = grafik();
        let mut store = Store::default();
        let report = extract_workbook([("Grafik RT", &series)], &Layout::default(), &mut store);
        assert!(store.data.is_empty());
        assert!(report.orders.is_empty());
    }

    #[test]
    fn series_sheet_for_unseen_condition_is_reported() {
        let data = datenblatt("T4", "2024-01-02", &[(1.0, 10.0)]);
        let series = grafik();
        let mut store = Store::default();
        let report = extract_workbook(
            [("Datenblatt RT", &data), ("Grafik plus", &series)],
            &Layout::default(),
            &mut store,
        );
        assert_eq!(report.warnings.len(), 1);
        assert!(!store.order("V3", "T4").expect("stored").temperatures.contains_key(&Condition::Ht));
    }

    #[test]
    fn series_sheet_follows_most_recent_metadata_sheet() {
        let first = datenblatt("T1", "2024-01-02", &[(1.0, 100.0), (2.0, 101.0)]);
        let second = datenblatt("T2", "2024-01-03", &[(1.0, 200.0)]);
        let series = grafik();
        let mut store = Store::default();
        let report = extract_workbook(
            [
                ("Datenblatt RT a", &first),
                ("Datenblatt RT b", &second),
                ("Grafik RT", &series),
            ],
            &Layout::default(),
            &mut store,
        );
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);

        let t1 = &store.order("V3", "T1").expect("stored").temperatures[&Condition::Rt];
        assert!(t1.pressure_data.is_empty());
        assert!(t1.limits.maximums.is_empty());

        let t2 = &store.order("V3", "T2").expect("stored").temperatures[&Condition::Rt];
        assert_eq!(t2.pressure_data.len(), 1);
        assert_eq!(t2.pressure_data[0].inflator_no, 200);
        assert_eq!(t2.pressure_data[0].pressures, PressureMap::from([(0, 20.0), (5, 45.0)]));
        assert_eq!(t2.limits.maximums, PressureMap::from([(0, 50.0), (5, 60.0)]));
    }

    #[test]
    fn reimport_keeps_metadata_and_replaces_tests() {
        let mut store = Store::default();
        let first = datenblatt("T5", "2024-01-02", &[(1.0, 10.0), (2.0, 11.0)]);
        extract_workbook([("Datenblatt RT", &first)], &Layout::default(), &mut store);

        let second = datenblatt("T5", "2025-06-30", &[(3.0, 12.0)]);
        extract_workbook([("Datenblatt RT", &second)], &Layout::default(), &mut store);

        let record = store.order("V3", "T5").expect("stored");
        assert_eq!(record.metadata.test_date.as_deref(), Some("2024-01-02"));
        assert_eq!(
            record.temperatures[&Condition::Rt].tests,
            vec![TestEntry { test_no: 3, inflator_no: 12 }]
        );
    }

    #[test]
    fn unknown_sheets_are_ignored() {
        let data = datenblatt("T6", "2024-01-02", &[(1.0, 10.0)]);
        let mut store = Store::default();
        let report = extract_workbook([("Summary", &data), ("Notes RT", &data)], &Layout::default(), &mut store);
        assert!(store.data.is_empty());
        assert!(report.warnings.is_empty());
    }
}
