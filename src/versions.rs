//! Per-version baseline/minimum/maximum limit tables, kept under the
//! reserved `versions` key of the store document.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, ToolError};
use crate::model::Condition;
use crate::store::Store;

/// Named pressure checkpoints of a limit table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Checkpoint {
    #[serde(rename = "PK10")]
    Pk10,
    #[serde(rename = "PK25")]
    Pk25,
    #[serde(rename = "PK50")]
    Pk50,
    #[serde(rename = "PK75")]
    Pk75,
    #[serde(rename = "PK90")]
    Pk90,
    #[serde(rename = "PKMax")]
    PkMax,
}

impl Checkpoint {
    pub const ALL: [Checkpoint; 6] = [
        Checkpoint::Pk10,
        Checkpoint::Pk25,
        Checkpoint::Pk50,
        Checkpoint::Pk75,
        Checkpoint::Pk90,
        Checkpoint::PkMax,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Checkpoint::Pk10 => "PK10",
            Checkpoint::Pk25 => "PK25",
            Checkpoint::Pk50 => "PK50",
            Checkpoint::Pk75 => "PK75",
            Checkpoint::Pk90 => "PK90",
            Checkpoint::PkMax => "PKMax",
        }
    }
}

impl FromStr for Checkpoint {
    type Err = ToolError;

    fn from_str(value: &str) -> Result<Self> {
        Checkpoint::ALL
            .into_iter()
            .find(|checkpoint| checkpoint.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| ToolError::Input(format!("unknown checkpoint '{value}'")))
    }
}

/// Row category of a limit table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LimitCategory {
    Minimums,
    Baseline,
    Maximums,
}

impl LimitCategory {
    pub const ALL: [LimitCategory; 3] = [
        LimitCategory::Minimums,
        LimitCategory::Baseline,
        LimitCategory::Maximums,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LimitCategory::Minimums => "minimums",
            LimitCategory::Baseline => "baseline",
            LimitCategory::Maximums => "maximums",
        }
    }
}

impl FromStr for LimitCategory {
    type Err = ToolError;

    fn from_str(value: &str) -> Result<Self> {
        LimitCategory::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| ToolError::Input(format!("unknown limit category '{value}'")))
    }
}

pub type CheckpointValues = BTreeMap<Checkpoint, f64>;

/// Minimum, baseline, and maximum values of one condition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitTable {
    #[serde(default)]
    pub minimums: CheckpointValues,
    #[serde(default)]
    pub baseline: CheckpointValues,
    #[serde(default)]
    pub maximums: CheckpointValues,
}

impl LimitTable {
    pub fn category(&self, category: LimitCategory) -> &CheckpointValues {
        match category {
            LimitCategory::Minimums => &self.minimums,
            LimitCategory::Baseline => &self.baseline,
            LimitCategory::Maximums => &self.maximums,
        }
    }

    pub fn category_mut(&mut self, category: LimitCategory) -> &mut CheckpointValues {
        match category {
            LimitCategory::Minimums => &mut self.minimums,
            LimitCategory::Baseline => &mut self.baseline,
            LimitCategory::Maximums => &mut self.maximums,
        }
    }
}

/// Limit tables of one version, keyed by condition.
pub type VersionLimits = BTreeMap<Condition, LimitTable>;

/// One edited cell of a limit table: `RT.minimums.PK10=1.5`.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitAssignment {
    pub condition: Condition,
    pub category: LimitCategory,
    pub checkpoint: Checkpoint,
    pub value: f64,
}

impl FromStr for LimitAssignment {
    type Err = ToolError;

    /// Unparsable numbers are stored as `0.0`; unknown keys are rejected.
    fn from_str(value: &str) -> Result<Self> {
        let (path, raw) = value
            .split_once('=')
            .ok_or_else(|| ToolError::Input(format!("expected KEY=VALUE, got '{value}'")))?;
        let mut parts = path.split('.');
        let (Some(condition), Some(category), Some(checkpoint), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ToolError::Input(format!(
                "expected CONDITION.CATEGORY.CHECKPOINT, got '{path}'"
            )));
        };

        let number = raw.trim().parse::<f64>().unwrap_or_else(|_| {
            warn!(value = raw, "invalid limit value, storing 0.0");
            0.0
        });

        Ok(LimitAssignment {
            condition: condition.parse()?,
            category: category.parse()?,
            checkpoint: checkpoint.parse()?,
            value: number,
        })
    }
}

impl fmt::Display for LimitAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}={}",
            self.condition,
            self.category.as_str(),
            self.checkpoint.as_str(),
            self.value
        )
    }
}

/// Fills every condition/category/checkpoint cell, keeping existing values.
pub fn complete_limits(mut limits: VersionLimits) -> VersionLimits {
    for condition in Condition::ALL {
        let table = limits.entry(condition).or_default();
        for category in LimitCategory::ALL {
            let values = table.category_mut(category);
            for checkpoint in Checkpoint::ALL {
                values.entry(checkpoint).or_insert(0.0);
            }
        }
    }
    limits
}

fn apply(limits: &mut VersionLimits, assignments: &[LimitAssignment]) {
    for assignment in assignments {
        limits
            .entry(assignment.condition)
            .or_default()
            .category_mut(assignment.category)
            .insert(assignment.checkpoint, assignment.value);
    }
}

impl Store {
    /// Names of versions that have a limit table.
    pub fn list_versions(&self) -> Vec<String> {
        self.versions.keys().cloned().collect()
    }

    pub fn get_version(&self, name: &str) -> Result<&VersionLimits> {
        self.versions
            .get(name)
            .ok_or_else(|| ToolError::NotFound(format!("Version '{name}' not found.")))
    }

    /// Creates a limit table; cells not assigned are stored as `0.0`.
    pub fn add_version(&mut self, name: &str, assignments: &[LimitAssignment]) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ToolError::Input("Please enter a version name.".into()));
        }
        if self.versions.contains_key(name) {
            return Err(ToolError::Input(format!("Version '{name}' already exists.")));
        }
        let mut limits = VersionLimits::new();
        apply(&mut limits, assignments);
        self.versions.insert(name.to_string(), complete_limits(limits));
        Ok(format!("Version '{name}' created successfully!"))
    }

    /// Overwrites the assigned cells of an existing limit table.
    pub fn edit_version(&mut self, name: &str, assignments: &[LimitAssignment]) -> Result<String> {
        let limits = self
            .versions
            .get_mut(name)
            .ok_or_else(|| ToolError::NotFound(format!("Version '{name}' not found.")))?;
        apply(limits, assignments);
        let completed = complete_limits(std::mem::take(limits));
        *limits = completed;
        Ok(format!("Version '{name}' updated successfully!"))
    }

    pub fn delete_version(&mut self, name: &str) -> Result<String> {
        self.versions
            .remove(name)
            .ok_or_else(|| ToolError::NotFound(format!("Version '{name}' not found.")))?;
        Ok(format!("Version '{name}' deleted successfully!"))
    }
}
