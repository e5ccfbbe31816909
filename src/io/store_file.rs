//! The persisted JSON store document and its daily backups.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, ToolError};
use crate::store::Store;

/// Directory, next to the store file, that receives daily backups.
pub const BACKUP_DIR: &str = "Backup";

/// Loads the store document; a missing file is reported as not found.
pub fn read_store(path: &Path) -> Result<Store> {
    if !path.exists() {
        return Err(ToolError::NotFound("Database not found.".into()));
    }
    let source = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&source)?;
    Store::from_value(value)
}

/// Loads the store document, starting from an empty store when absent.
pub fn read_store_or_default(path: &Path) -> Result<Store> {
    if path.exists() {
        read_store(path)
    } else {
        debug!(path = %path.display(), "store file absent, starting empty");
        Ok(Store::default())
    }
}

/// Writes the whole document, pretty-printed UTF-8.
pub fn write_store(path: &Path, store: &Store) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json_string = serde_json::to_string_pretty(&store.to_value()?)?;
    fs::write(path, json_string)?;
    Ok(())
}

/// Directory holding the backups of `store_path`.
pub fn backup_dir(store_path: &Path) -> PathBuf {
    store_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join(BACKUP_DIR)
}

/// Copies the store into `Backup/Data_<YYYYMMDD_HHMMSS>.json` unless a
/// backup stamped with the same day already exists.
///
/// Failures are logged and swallowed; the returned path is the backup
/// written by this call, if any.
pub fn create_daily_backup(store_path: &Path, now: NaiveDateTime) -> Option<PathBuf> {
    match try_daily_backup(store_path, now) {
        Ok(created) => created,
        Err(error) => {
            warn!(%error, path = %store_path.display(), "error creating backup");
            None
        }
    }
}

fn try_daily_backup(store_path: &Path, now: NaiveDateTime) -> Result<Option<PathBuf>> {
    if !store_path.exists() {
        debug!(path = %store_path.display(), "backup skipped, store not found");
        return Ok(None);
    }

    let dir = backup_dir(store_path);
    if !dir.exists() {
        fs::create_dir_all(&dir)?;
        info!(dir = %dir.display(), "created backup directory");
    }

    let day_prefix = format!("Data_{}_", now.format("%Y%m%d"));
    for entry in fs::read_dir(&dir)? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&day_prefix) && name.ends_with(".json") {
            debug!(backup = %name, "backup already exists for today");
            return Ok(None);
        }
    }

    let target = dir.join(format!("Data_{}.json", now.format("%Y%m%d_%H%M%S")));
    fs::copy(store_path, &target)?;
    info!(backup = %target.display(), "backup created");
    Ok(Some(target))
}
