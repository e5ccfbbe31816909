//! File-level store operations.
//!
//! Each mutating operation is a read-modify-write of the whole store
//! document. There is no locking: two processes writing the same store file
//! race, and the last writer wins.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{debug, info, instrument};

use crate::aggregate::{Report, build_report};
use crate::config::{AppConfig, Layout};
use crate::error::{Result, ToolError};
use crate::io::excel_read;
use crate::io::excel_write::{self, SheetTable, WorkbookData};
use crate::io::store_file;
use crate::model::{OrderRecord, OrderRef, WorkplaceRecord};
use crate::store::{OrderFilter, OrderListing, RemovalSummary, Store, WorkplaceBatch};
use crate::versions::{LimitAssignment, VersionLimits};

const WORKBOOK_EXTENSION: &str = ".xlsx";

/// Context every store operation runs against.
#[derive(Debug, Clone)]
pub struct Database {
    store_path: PathBuf,
    layout: Layout,
}

/// Outcome of [`Database::import_files`].
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSummary {
    pub files: Vec<PathBuf>,
    pub orders: BTreeSet<OrderRef>,
    pub warnings: Vec<String>,
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Excel files processed and JSON updated!")
    }
}

impl Database {
    pub fn new(store_path: impl Into<PathBuf>, layout: Layout) -> Self {
        Self {
            store_path: store_path.into(),
            layout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.store_path.clone(), config.layout.clone())
    }

    /// Opens the store at application start, taking the daily backup first.
    pub fn open(config: &AppConfig, now: NaiveDateTime) -> Self {
        let database = Self::from_config(config);
        store_file::create_daily_backup(&database.store_path, now);
        database
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Loads the persisted store.
    pub fn load(&self) -> Result<Store> {
        store_file::read_store(&self.store_path)
    }

    /// Imports every workbook in `excel_folder` whose file name starts with
    /// one of the order ids. Nothing is written unless all files extract.
    #[instrument(
        level = "info",
        skip_all,
        fields(store = %self.store_path.display(), folder = %excel_folder.display())
    )]
    pub fn import_files(&self, order_ids: &[String], excel_folder: &Path) -> Result<ImportSummary> {
        if order_ids.is_empty() {
            return Err(ToolError::Input("Please enter the order numbers.".into()));
        }

        let files = find_workbooks(order_ids, excel_folder)?;
        if files.is_empty() {
            return Err(ToolError::NotFound(
                "No Excel files found for the provided orders.".into(),
            ));
        }
        info!(file_count = files.len(), "importing workbooks");

        let mut store = store_file::read_store_or_default(&self.store_path)?;
        let mut orders = BTreeSet::new();
        let mut warnings = Vec::new();
        for file in &files {
            let report = excel_read::extract_file(file, &self.layout, &mut store)?;
            debug!(file = %file.display(), orders = report.orders.len(), "workbook extracted");
            orders.extend(report.orders);
            warnings.extend(report.warnings);
        }

        store_file::write_store(&self.store_path, &store)?;
        Ok(ImportSummary {
            files,
            orders,
            warnings,
        })
    }

    #[instrument(level = "info", skip_all, fields(store = %self.store_path.display()))]
    pub fn remove_orders(&self, order_ids: &[String]) -> Result<RemovalSummary> {
        if order_ids.is_empty() {
            return Err(ToolError::Input("Please enter the order numbers.".into()));
        }
        if !self.store_path.exists() {
            return Err(ToolError::NotFound("No database found.".into()));
        }
        let mut store = self.load()?;
        let summary = store.remove_orders(order_ids)?;
        store_file::write_store(&self.store_path, &store)?;
        info!(removed = summary.removed.len(), "orders removed");
        Ok(summary)
    }

    pub fn list_orders(&self, filter: &OrderFilter) -> Result<OrderListing> {
        Ok(self.load()?.list_orders(filter))
    }

    pub fn get_metadata(&self, version: &str, order: &str) -> Result<OrderRecord> {
        self.load()?.metadata(version, order).cloned()
    }

    pub fn get_workplace_data(&self, selected: &[OrderRef]) -> Result<WorkplaceBatch> {
        self.load()?.workplace_data(selected)
    }

    /// Statistics for a set of workplace records, limits read from the store.
    pub fn report(&self, records: &[WorkplaceRecord]) -> Result<Report> {
        Ok(build_report(records, &self.load()?))
    }

    pub fn list_versions(&self) -> Result<Vec<String>> {
        Ok(store_file::read_store_or_default(&self.store_path)?.list_versions())
    }

    pub fn get_version(&self, name: &str) -> Result<VersionLimits> {
        self.load()?.get_version(name).cloned()
    }

    /// Creates a version limit table, or edits it when it already exists.
    #[instrument(level = "info", skip(self, assignments), fields(store = %self.store_path.display()))]
    pub fn save_version(&self, name: &str, assignments: &[LimitAssignment]) -> Result<String> {
        let mut store = store_file::read_store_or_default(&self.store_path)?;
        let message = if store.versions.contains_key(name) {
            store.edit_version(name, assignments)?
        } else {
            store.add_version(name, assignments)?
        };
        store_file::write_store(&self.store_path, &store)?;
        Ok(message)
    }

    #[instrument(level = "info", skip(self), fields(store = %self.store_path.display()))]
    pub fn delete_version(&self, name: &str) -> Result<String> {
        let mut store = self.load()?;
        let message = store.delete_version(name)?;
        store_file::write_store(&self.store_path, &store)?;
        Ok(message)
    }

    /// Writes the statistics report workbook into `dir`.
    #[instrument(level = "info", skip(self, report), fields(dir = %dir.display()))]
    pub fn export_report(&self, report: &Report, dir: &Path, now: NaiveDateTime) -> Result<PathBuf> {
        if report.conditions.is_empty() {
            return Err(ToolError::Input("No valid temperature data to report.".into()));
        }
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("report_{}.xlsx", now.format("%Y%m%d_%H%M%S")));
        excel_write::write_report(&path, report)?;
        info!(path = %path.display(), "report exported");
        Ok(path)
    }

    /// Writes every stored test as one row of an autofiltered table.
    #[instrument(level = "info", skip(self), fields(dir = %dir.display()))]
    pub fn export_database(&self, dir: &Path, now: NaiveDateTime) -> Result<PathBuf> {
        let store = self.load()?;
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("database_{}.xlsx", now.format("%Y%m%d_%H%M%S")));
        let workbook = WorkbookData {
            tables: vec![database_table(&store)],
        };
        excel_write::write_workbook(&path, &workbook)?;
        info!(path = %path.display(), "database exported");
        Ok(path)
    }
}

/// Workbooks named `<order id>*.xlsx`, in order-id then file-name order.
fn find_workbooks(order_ids: &[String], folder: &Path) -> Result<Vec<PathBuf>> {
    let mut names: Vec<String> = fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    let mut files: Vec<PathBuf> = Vec::new();
    for order in order_ids {
        for name in &names {
            if name.starts_with(order.as_str()) && name.ends_with(WORKBOOK_EXTENSION) {
                let path = folder.join(name);
                if !files.contains(&path) {
                    files.push(path);
                }
            }
        }
    }
    Ok(files)
}

pub const DATABASE_COLUMNS: [&str; 10] = [
    "Version",
    "Order",
    "Production Order",
    "Propellant Lot",
    "Test Date",
    "Type",
    "Temperature (°C)",
    "Test No",
    "Inflator No",
    "Pressure Points",
];

fn database_table(store: &Store) -> SheetTable {
    let mut rows = Vec::new();
    for (version, orders) in &store.data {
        for (order, record) in orders {
            let metadata = &record.metadata;
            for (condition, block) in &record.temperatures {
                for test in &block.tests {
                    let points = block
                        .pressures_for(test.inflator_no)
                        .map(|pressures| pressures.len())
                        .unwrap_or(0);
                    rows.push(vec![
                        version.clone(),
                        order.clone(),
                        optional(metadata.production_order.as_ref()),
                        optional(metadata.propellant_lot_number.as_ref()),
                        metadata.test_date.clone().unwrap_or_default(),
                        condition.to_string(),
                        optional(block.temperature_c.as_ref()),
                        test.test_no.to_string(),
                        test.inflator_no.to_string(),
                        points.to_string(),
                    ]);
                }
            }
        }
    }

    SheetTable {
        sheet_name: "Database".into(),
        columns: DATABASE_COLUMNS.iter().map(|column| column.to_string()).collect(),
        rows,
    }
}

fn optional<T: ToString>(value: Option<&T>) -> String {
    value.map(ToString::to_string).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn workbook_lookup_matches_prefix_and_extension() {
        let temp_dir = tempdir().expect("temporary directory");
        for name in ["ORD1.xlsx", "ORD1_rerun.xlsx", "ORD1.csv", "ORD2.xlsx", "XORD1.xlsx"] {
            fs::write(temp_dir.path().join(name), b"").expect("fixture written");
        }

        let files = find_workbooks(&["ORD1".to_string()], temp_dir.path()).expect("listed");
        let names: Vec<String> = files
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["ORD1.xlsx", "ORD1_rerun.xlsx"]);
    }

    #[test]
    fn import_rejects_empty_input_and_missing_files() {
        let temp_dir = tempdir().expect("temporary directory");
        let database = Database::new(temp_dir.path().join("Data.json"), Layout::default());

        let err = database.import_files(&[], temp_dir.path()).unwrap_err();
        assert_eq!(err.to_string(), "Please enter the order numbers.");

        let err = database
            .import_files(&["ORD9".to_string()], temp_dir.path())
            .unwrap_err();
        assert_eq!(err.to_string(), "No Excel files found for the provided orders.");
        assert!(!database.store_path().exists());
    }

    #[test]
    fn open_survives_a_failing_backup() {
        let temp_dir = tempdir().expect("temporary directory");
        let config = AppConfig {
            store_path: temp_dir.path().join("Data.json"),
            ..AppConfig::default()
        };
        store_file::write_store(&config.store_path, &Store::default()).expect("store written");
        fs::write(temp_dir.path().join(store_file::BACKUP_DIR), b"").expect("blocker written");

        let now = chrono::NaiveDate::from_ymd_opt(2024, 4, 1)
            .and_then(|date| date.and_hms_opt(7, 0, 0))
            .expect("valid timestamp");
        let database = Database::open(&config, now);

        database
            .save_version("V1", &[])
            .expect("store still writable");
        assert_eq!(database.list_versions().expect("listed"), vec!["V1".to_string()]);
    }

    #[test]
    fn remove_without_store_reports_missing_database() {
        let temp_dir = tempdir().expect("temporary directory");
        let database = Database::new(temp_dir.path().join("Data.json"), Layout::default());
        let err = database.remove_orders(&["T1".to_string()]).unwrap_err();
        assert_eq!(err.to_string(), "No database found.");
    }

    #[test]
    fn versions_are_saved_into_the_store_document() {
        let temp_dir = tempdir().expect("temporary directory");
        let database = Database::new(temp_dir.path().join("Data.json"), Layout::default());

        let created = database
            .save_version("V5", &["RT.maximums.PK10=12.5".parse().unwrap()])
            .expect("created");
        assert_eq!(created, "Version 'V5' created successfully!");
        let updated = database.save_version("V5", &[]).expect("updated");
        assert_eq!(updated, "Version 'V5' updated successfully!");

        assert_eq!(database.list_versions().expect("listed"), vec!["V5".to_string()]);
        let listing = database.list_orders(&OrderFilter::default()).expect("orders");
        assert!(listing.versions.is_empty());

        database.delete_version("V5").expect("deleted");
        assert!(database.get_version("V5").is_err());
    }
}
