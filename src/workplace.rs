//! In-memory working set of records drawn from the store.
//!
//! All records in a [`Workplace`] share one version. The filtered view is
//! recomputed by [`Workplace::apply_filters`] and dropped whenever the set
//! itself changes.

use std::collections::BTreeSet;
use std::fmt;

use tracing::{debug, warn};

use crate::error::{Result, ToolError};
use crate::model::{Condition, OrderRef, WorkplaceRecord};
use crate::store::{Store, WorkplaceBatch};

/// Warning returned when a filter selects no condition at all.
pub const EMPTY_SELECTION_WARNING: &str = "No temperatures selected. Please select at least one.";

/// Conditions kept by [`Workplace::apply_filters`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConditionFilter {
    #[default]
    All,
    Only(BTreeSet<Condition>),
}

impl ConditionFilter {
    /// `All` when `conditions` is empty.
    pub fn from_conditions(conditions: &[Condition]) -> Self {
        if conditions.is_empty() {
            ConditionFilter::All
        } else {
            ConditionFilter::Only(conditions.iter().copied().collect())
        }
    }

    fn keeps(&self, condition: Condition) -> bool {
        match self {
            ConditionFilter::All => true,
            ConditionFilter::Only(selected) => selected.contains(&condition),
        }
    }
}

/// Records per condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConditionCounts {
    pub rt: usize,
    pub lt: usize,
    pub ht: usize,
    pub total: usize,
}

impl ConditionCounts {
    fn tally<'a>(records: impl IntoIterator<Item = &'a WorkplaceRecord>) -> Self {
        let mut counts = ConditionCounts::default();
        for record in records {
            match record.condition {
                Condition::Rt => counts.rt += 1,
                Condition::Lt => counts.lt += 1,
                Condition::Ht => counts.ht += 1,
            }
            counts.total += 1;
        }
        counts
    }
}

impl fmt::Display for ConditionCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RT: {} | LT: {} | HT: {} | Total: {}",
            self.rt, self.lt, self.ht, self.total
        )
    }
}

/// Outcome of [`Workplace::send_to_workplace`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSummary {
    /// Selected orders that were already present and therefore skipped.
    pub already_present: Vec<OrderRef>,
    pub added: usize,
    pub duplicates: usize,
}

impl fmt::Display for TransferSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.already_present.is_empty() {
            writeln!(
                f,
                "The following orders are already in the workplace: {}.",
                join_refs(&self.already_present)
            )?;
        }
        write!(f, "Added {} records.", self.added)?;
        if self.duplicates > 0 {
            write!(f, "\n{} duplicate test(s) were ignored.", self.duplicates)?;
        }
        Ok(())
    }
}

/// Result of [`Workplace::apply_filters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterOutcome {
    pub counts: ConditionCounts,
    /// Set when the filter selected no condition.
    pub warning: Option<&'static str>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workplace {
    records: Vec<WorkplaceRecord>,
    filtered: Option<Vec<WorkplaceRecord>>,
}

impl Workplace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[WorkplaceRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The version every record shares, if the set is non-empty.
    pub fn version(&self) -> Option<&str> {
        self.records.first().map(|record| record.version.as_str())
    }

    /// Pulls the selected orders out of `store` into the set.
    ///
    /// Orders already present are skipped and reported; the rest are added.
    pub fn send_to_workplace(&mut self, store: &Store, selected: &[OrderRef]) -> Result<TransferSummary> {
        if selected.is_empty() {
            return Err(ToolError::Input("No orders selected to send to workplace.".into()));
        }
        if let Some(current) = self.version() {
            if selected.iter().any(|order_ref| order_ref.version != current) {
                return Err(ToolError::Consistency(
                    "Workplace already contains tests from another version. Clear workplace first."
                        .into(),
                ));
            }
        }

        let existing = self.order_refs();
        let (already_present, fresh): (Vec<OrderRef>, Vec<OrderRef>) = selected
            .iter()
            .cloned()
            .partition(|order_ref| existing.contains(order_ref));
        if fresh.is_empty() {
            return Err(ToolError::Input(format!(
                "The following orders are already in the workplace: {}.",
                join_refs(&already_present)
            )));
        }

        let WorkplaceBatch {
            records,
            duplicates,
        } = store.workplace_data(&fresh)?;
        if records.is_empty() {
            return Err(ToolError::NotFound(
                "No tests found for the selected orders.".into(),
            ));
        }

        let added = records.len();
        self.records.extend(records);
        self.filtered = None;
        debug!(added, duplicates, total = self.records.len(), "orders sent to workplace");
        Ok(TransferSummary {
            already_present,
            added,
            duplicates,
        })
    }

    /// Drops every record belonging to one of `selected`; returns the count.
    pub fn remove_selected(&mut self, selected: &BTreeSet<OrderRef>) -> Result<usize> {
        if selected.is_empty() {
            return Err(ToolError::Input(
                "No orders selected to remove from Workplace.".into(),
            ));
        }
        let before = self.records.len();
        self.records
            .retain(|record| !selected.contains(&record.order_ref()));
        self.filtered = None;
        Ok(before - self.records.len())
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.filtered = None;
    }

    /// Recomputes the filtered view: condition filter first, then the first
    /// `limit` records in current order.
    pub fn apply_filters(&mut self, conditions: &ConditionFilter, limit: Option<usize>) -> Result<FilterOutcome> {
        let versions: BTreeSet<&str> = self.records.iter().map(|r| r.version.as_str()).collect();
        if versions.len() > 1 {
            return Err(ToolError::Consistency(
                "Workplace contains mixed versions! Clear before applying filters.".into(),
            ));
        }

        if matches!(conditions, ConditionFilter::Only(selected) if selected.is_empty()) {
            warn!("{EMPTY_SELECTION_WARNING}");
            self.filtered = Some(Vec::new());
            return Ok(FilterOutcome {
                counts: ConditionCounts::default(),
                warning: Some(EMPTY_SELECTION_WARNING),
            });
        }

        let mut view: Vec<WorkplaceRecord> = self
            .records
            .iter()
            .filter(|record| conditions.keeps(record.condition))
            .cloned()
            .collect();
        if let Some(limit) = limit {
            view.truncate(limit);
        }

        let counts = ConditionCounts::tally(&view);
        self.filtered = Some(view);
        Ok(FilterOutcome {
            counts,
            warning: None,
        })
    }

    /// The filtered view when one exists, else the whole set.
    pub fn view(&self) -> &[WorkplaceRecord] {
        self.filtered.as_deref().unwrap_or(&self.records)
    }

    pub fn counts(&self) -> ConditionCounts {
        ConditionCounts::tally(self.view())
    }

    /// Records a report is built from; an empty view is an error.
    pub fn report_records(&self) -> Result<&[WorkplaceRecord]> {
        let records = self.view();
        if records.is_empty() {
            return Err(ToolError::Input(
                "Workplace empty or no data after filtering. Add tests before generating the report."
                    .into(),
            ));
        }
        Ok(records)
    }

    fn order_refs(&self) -> BTreeSet<OrderRef> {
        self.records.iter().map(WorkplaceRecord::order_ref).collect()
    }
}

fn join_refs(refs: &[OrderRef]) -> String {
    refs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
