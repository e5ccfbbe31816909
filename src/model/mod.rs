//! Typed records of the store document and the workplace.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::normalize::CellValue;

/// Time offset in milliseconds, derived from the column position of a
/// pressure sample. Serialized as a stringified integer map key.
pub type TimeOffset = i64;

/// Pressure samples (bar) keyed by time offset, ordered ascending.
pub type PressureMap = BTreeMap<TimeOffset, f64>;

/// Orders of one version, keyed by test order id.
pub type VersionOrders = BTreeMap<String, OrderRecord>;

/// Temperature condition a test block was run under.
///
/// The derived ordering (RT, LT, HT) is the display order used by reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Condition {
    /// Room temperature.
    #[serde(rename = "RT")]
    Rt,
    /// Low temperature ("minus" sheets).
    #[serde(rename = "LT")]
    Lt,
    /// High temperature ("plus" sheets).
    #[serde(rename = "HT")]
    Ht,
}

impl Condition {
    pub const ALL: [Condition; 3] = [Condition::Rt, Condition::Lt, Condition::Ht];

    pub fn as_str(self) -> &'static str {
        match self {
            Condition::Rt => "RT",
            Condition::Lt => "LT",
            Condition::Ht => "HT",
        }
    }

    /// Classifies a sheet by substring match on its lowercased name.
    ///
    /// The checks run in a fixed order: "minus" wins over "rt", which wins
    /// over "plus". Names matching none of them yield `None`.
    pub fn from_sheet_name(name: &str) -> Option<Condition> {
        let lowered = name.to_lowercase();
        if lowered.contains("minus") {
            Some(Condition::Lt)
        } else if lowered.contains("rt") {
            Some(Condition::Rt)
        } else if lowered.contains("plus") {
            Some(Condition::Ht)
        } else {
            None
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = ToolError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "RT" => Ok(Condition::Rt),
            "LT" => Ok(Condition::Lt),
            "HT" => Ok(Condition::Ht),
            other => Err(ToolError::Input(format!("unknown condition '{other}'"))),
        }
    }
}

/// Role a workbook sheet plays during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetRole {
    /// "Datenblatt" sheet: order metadata and the test list.
    Metadata,
    /// "Grafik" sheet: limit rows and pressure series.
    Series,
}

impl SheetRole {
    /// Classifies a sheet by substring match on its lowercased name.
    pub fn from_sheet_name(name: &str) -> Option<SheetRole> {
        let lowered = name.to_lowercase();
        if lowered.contains("datenblatt") {
            Some(SheetRole::Metadata)
        } else if lowered.contains("grafik") {
            Some(SheetRole::Series)
        } else {
            None
        }
    }
}

/// Order-level metadata, fixed by the first import of the order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderMetadata {
    #[serde(default)]
    pub production_order: Option<CellValue>,
    #[serde(default)]
    pub propellant_lot_number: Option<CellValue>,
    /// ISO `YYYY-MM-DD` date.
    #[serde(default)]
    pub test_date: Option<String>,
}

/// One row of a metadata sheet's test list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestEntry {
    pub test_no: i64,
    pub inflator_no: i64,
}

/// Pressure samples recorded for one inflator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureEntry {
    pub inflator_no: i64,
    #[serde(default)]
    pub pressures: PressureMap,
}

/// Per-offset limit values read from a series sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default)]
    pub maximums: PressureMap,
    #[serde(default)]
    pub minimums: PressureMap,
}

/// All data recorded for one order under one temperature condition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemperatureBlock {
    #[serde(default)]
    pub temperature_c: Option<f64>,
    #[serde(default)]
    pub tests: Vec<TestEntry>,
    #[serde(default)]
    pub pressure_data: Vec<PressureEntry>,
    #[serde(default)]
    pub limits: Limits,
}

impl TemperatureBlock {
    /// Pressures of the first `pressure_data` entry recorded for `inflator_no`.
    pub fn pressures_for(&self, inflator_no: i64) -> Option<&PressureMap> {
        self.pressure_data
            .iter()
            .find(|entry| entry.inflator_no == inflator_no)
            .map(|entry| &entry.pressures)
    }
}

/// A stored order: metadata plus one block per condition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    #[serde(default)]
    pub metadata: OrderMetadata,
    #[serde(default)]
    pub temperatures: BTreeMap<Condition, TemperatureBlock>,
}

/// Reference to a stored order, written `version/order` on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderRef {
    pub version: String,
    pub order: String,
}

impl OrderRef {
    pub fn new(version: impl Into<String>, order: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            order: order.into(),
        }
    }
}

impl fmt::Display for OrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.version, self.order)
    }
}

impl FromStr for OrderRef {
    type Err = ToolError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.split_once('/') {
            Some((version, order)) if !version.trim().is_empty() && !order.trim().is_empty() => {
                Ok(OrderRef::new(version.trim(), order.trim()))
            }
            _ => Err(ToolError::Input(format!(
                "expected VERSION/ORDER, got '{value}'"
            ))),
        }
    }
}

/// A single test flattened out of the store for the workplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkplaceRecord {
    pub test_no: i64,
    pub inflator_no: i64,
    pub temperature_c: Option<f64>,
    #[serde(rename = "type")]
    pub condition: Condition,
    pub version: String,
    pub order: String,
    pub test_date: Option<String>,
    pub pressures: PressureMap,
}

/// Uniqueness key of a workplace record.
pub type WorkplaceKey = (i64, i64, Condition, String, String);

impl WorkplaceRecord {
    pub fn key(&self) -> WorkplaceKey {
        (
            self.test_no,
            self.inflator_no,
            self.condition,
            self.version.clone(),
            self.order.clone(),
        )
    }

    pub fn order_ref(&self) -> OrderRef {
        OrderRef::new(self.version.clone(), self.order.clone())
    }
}

impl fmt::Display for WorkplaceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let temperature = self
            .temperature_c
            .map(|value| value.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        write!(
            f,
            "{} | {} | {}°C | {} | {} | {} | {}",
            self.test_no,
            self.inflator_no,
            temperature,
            self.condition,
            self.version,
            self.order,
            self.test_date.as_deref().unwrap_or("N/A"),
        )?;
        if self.pressures.is_empty() {
            write!(f, " | No pressure data")
        } else {
            write!(f, " | Pressure data available")
        }
    }
}
