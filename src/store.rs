//! In-memory store engine: the `version → order → record` document and the
//! queries run against it.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use chrono::{Days, NaiveDate};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, ToolError};
use crate::model::{Condition, Limits, OrderRecord, OrderRef, VersionOrders, WorkplaceRecord};
use crate::normalize::parse_iso_date;
use crate::versions::VersionLimits;

/// Top-level key reserved for the per-version limit tables.
pub const VERSIONS_KEY: &str = "versions";

/// The persisted document: test data per version plus the limit tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Store {
    pub data: BTreeMap<String, VersionOrders>,
    pub versions: BTreeMap<String, VersionLimits>,
}

impl Store {
    /// Builds a store from its JSON document, defaulting missing fields.
    pub fn from_value(value: Value) -> Result<Store> {
        let Value::Object(mut object) = value else {
            return Err(ToolError::InvalidStore("expected a JSON object".into()));
        };

        let versions = match object.remove(VERSIONS_KEY) {
            Some(raw) => serde_json::from_value(raw)?,
            None => BTreeMap::new(),
        };

        let mut data = BTreeMap::new();
        for (version, orders) in object {
            let orders: VersionOrders = serde_json::from_value(orders)?;
            data.insert(version, orders);
        }

        Ok(Store { data, versions })
    }

    /// Serializes the store back into its JSON document.
    pub fn to_value(&self) -> Result<Value> {
        let mut object = Map::new();
        for (version, orders) in &self.data {
            object.insert(version.clone(), serde_json::to_value(orders)?);
        }
        if !self.versions.is_empty() {
            object.insert(VERSIONS_KEY.to_string(), serde_json::to_value(&self.versions)?);
        }
        Ok(Value::Object(object))
    }

    /// Version tags that hold order data, sorted.
    pub fn version_names(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }

    pub fn order(&self, version: &str, order: &str) -> Option<&OrderRecord> {
        self.data.get(version).and_then(|orders| orders.get(order))
    }

    /// Limits recorded for one condition of one order.
    pub fn limits_for(&self, version: &str, order: &str, condition: Condition) -> Option<&Limits> {
        self.order(version, order)
            .and_then(|record| record.temperatures.get(&condition))
            .map(|block| &block.limits)
    }

    /// Deletes every order whose id is listed, across all versions. A version
    /// left without orders is dropped.
    pub fn remove_orders(&mut self, order_ids: &[String]) -> Result<RemovalSummary> {
        if order_ids.is_empty() {
            return Err(ToolError::Input("Please enter the order numbers.".into()));
        }

        let wanted: HashSet<&str> = order_ids.iter().map(String::as_str).collect();
        let mut removed = Vec::new();

        self.data.retain(|version, orders| {
            orders.retain(|order, _| {
                if wanted.contains(order.as_str()) {
                    debug!(%version, %order, "removing order");
                    removed.push(order.clone());
                    false
                } else {
                    true
                }
            });
            !orders.is_empty()
        });

        if removed.is_empty() {
            return Err(ToolError::NotFound("No matching orders found.".into()));
        }
        Ok(RemovalSummary { removed })
    }

    /// Lists orders matching the filter, newest test date first.
    pub fn list_orders(&self, filter: &OrderFilter) -> OrderListing {
        let mut orders = Vec::new();

        for (version, version_orders) in &self.data {
            if !filter.matches_version(version) {
                continue;
            }
            for (order, record) in version_orders {
                let test_date = record.metadata.test_date.clone();
                if let Some(range) = &filter.dates {
                    match parse_iso_date(test_date.as_deref()) {
                        Some(date) if range.contains(date) => {}
                        _ => continue,
                    }
                }
                orders.push(OrderSummary {
                    order_ref: OrderRef::new(version.clone(), order.clone()),
                    test_date,
                });
            }
        }

        orders.sort_by_key(|summary| {
            std::cmp::Reverse(parse_iso_date(summary.test_date.as_deref()).unwrap_or(NaiveDate::MIN))
        });

        OrderListing {
            orders,
            versions: self.version_names(),
        }
    }

    /// Metadata and condition blocks of one order.
    pub fn metadata(&self, version: &str, order: &str) -> Result<&OrderRecord> {
        self.order(version, order)
            .ok_or_else(|| ToolError::NotFound("Order not found in the database.".into()))
    }

    /// Flattens the selected orders into workplace records.
    ///
    /// Tests are joined to their pressures by inflator number (first match).
    /// Records whose key was already produced by this call are skipped and
    /// counted as duplicates.
    pub fn workplace_data(&self, selected: &[OrderRef]) -> Result<WorkplaceBatch> {
        if selected.is_empty() {
            return Err(ToolError::Input("No orders selected.".into()));
        }
        let versions: BTreeSet<&str> = selected.iter().map(|r| r.version.as_str()).collect();
        if versions.len() > 1 {
            return Err(ToolError::Consistency(
                "Select tests from only one version.".into(),
            ));
        }

        let mut records = Vec::new();
        let mut seen = HashSet::new();
        let mut duplicates = 0;

        for order_ref in selected {
            let Some(record) = self.order(&order_ref.version, &order_ref.order) else {
                debug!(order = %order_ref, "selected order not present in store");
                continue;
            };
            for condition in Condition::ALL {
                let Some(block) = record.temperatures.get(&condition) else {
                    continue;
                };
                for test in &block.tests {
                    let candidate = WorkplaceRecord {
                        test_no: test.test_no,
                        inflator_no: test.inflator_no,
                        temperature_c: block.temperature_c,
                        condition,
                        version: order_ref.version.clone(),
                        order: order_ref.order.clone(),
                        test_date: record.metadata.test_date.clone(),
                        pressures: block.pressures_for(test.inflator_no).cloned().unwrap_or_default(),
                    };
                    if !seen.insert(candidate.key()) {
                        duplicates += 1;
                        continue;
                    }
                    records.push(candidate);
                }
            }
        }

        sort_by_test_date_desc(&mut records);
        Ok(WorkplaceBatch {
            records,
            duplicates,
        })
    }
}

/// Sorts records newest first; missing or unparsable dates count as 1900-01-01.
pub fn sort_by_test_date_desc(records: &mut [WorkplaceRecord]) {
    let fallback = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN);
    records.sort_by_key(|record| {
        std::cmp::Reverse(parse_iso_date(record.test_date.as_deref()).unwrap_or(fallback))
    });
}

/// Splits a comma separated order list, trimming entries and dropping empties.
pub fn parse_order_ids(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|order| !order.is_empty())
        .map(str::to_string)
        .collect()
}

/// Inclusive test-date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<DateRange> {
        if start > end {
            return Err(ToolError::Input("Start date cannot be after end date.".into()));
        }
        Ok(DateRange { start, end })
    }

    /// The `days` days up to and including `today`.
    pub fn last_days(today: NaiveDate, days: u64) -> DateRange {
        let start = today.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN);
        DateRange { start, end: today }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Criteria for [`Store::list_orders`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    /// Exact version tag; `None` or `"All"` lists every version.
    pub version: Option<String>,
    pub dates: Option<DateRange>,
}

impl OrderFilter {
    fn matches_version(&self, version: &str) -> bool {
        match self.version.as_deref() {
            None => true,
            Some(wanted) if wanted.eq_ignore_ascii_case("all") => true,
            Some(wanted) => wanted == version,
        }
    }
}

/// One row of an order listing.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSummary {
    pub order_ref: OrderRef,
    pub test_date: Option<String>,
}

/// Result of [`Store::list_orders`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrderListing {
    pub orders: Vec<OrderSummary>,
    /// Every version tag in the store, regardless of the filter.
    pub versions: Vec<String>,
}

/// Orders actually removed by [`Store::remove_orders`].
#[derive(Debug, Clone, PartialEq)]
pub struct RemovalSummary {
    pub removed: Vec<String>,
}

impl fmt::Display for RemovalSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Orders removed successfully: {}", self.removed.join(", "))
    }
}

/// Records produced by [`Store::workplace_data`].
#[derive(Debug, Clone, PartialEq)]
pub struct WorkplaceBatch {
    pub records: Vec<WorkplaceRecord>,
    pub duplicates: usize,
}

impl fmt::Display for WorkplaceBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Added {} records.", self.records.len())?;
        if self.duplicates > 0 {
            write!(f, "\n{} duplicate test(s) were ignored.", self.duplicates)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{OrderMetadata, PressureEntry, TemperatureBlock, TestEntry};

    pub(crate) fn block(tests: &[(i64, i64)], pressures: &[(i64, &[(i64, f64)])]) -> TemperatureBlock {
        TemperatureBlock {
            temperature_c: Some(23.0),
            tests: tests
                .iter()
                .map(|&(test_no, inflator_no)| TestEntry { test_no, inflator_no })
                .collect(),
            pressure_data: pressures
                .iter()
                .map(|(inflator_no, points)| PressureEntry {
                    inflator_no: *inflator_no,
                    pressures: points.iter().copied().collect(),
                })
                .collect(),
            limits: Limits::default(),
        }
    }

    pub(crate) fn record(test_date: Option<&str>, blocks: Vec<(Condition, TemperatureBlock)>) -> OrderRecord {
        OrderRecord {
            metadata: OrderMetadata {
                production_order: None,
                propellant_lot_number: None,
                test_date: test_date.map(str::to_string),
            },
            temperatures: blocks.into_iter().collect(),
        }
    }

    fn sample_store() -> Store {
        let mut store = Store::default();
        let v1 = store.data.entry("V1".into()).or_default();
        v1.insert(
            "T1".into(),
            record(
                Some("2024-03-01"),
                vec![(Condition::Rt, block(&[(1, 100), (2, 101)], &[(100, &[(0, 20.0)])]))],
            ),
        );
        v1.insert("T2".into(), record(Some("2024-05-10"), vec![]));
        v1.insert("T3".into(), record(None, vec![]));
        let v2 = store.data.entry("V2".into()).or_default();
        v2.insert("T4".into(), record(Some("2023-12-24"), vec![]));
        store
    }

    #[test]
    fn remove_orders_reports_only_matches() {
        let mut store = sample_store();
        let summary = store
            .remove_orders(&parse_order_ids("T1, T9"))
            .expect("one order removed");
        assert_eq!(summary.to_string(), "Orders removed successfully: T1");
        assert!(store.order("V1", "T1").is_none());
    }

    #[test]
    fn removing_last_order_drops_the_version() {
        let mut store = sample_store();
        store.remove_orders(&["T4".to_string()]).expect("removed");
        assert!(!store.data.contains_key("V2"));
        assert_eq!(store.version_names(), vec!["V1".to_string()]);
    }

    #[test]
    fn remove_orders_rejects_empty_and_unknown_input() {
        let mut store = sample_store();
        assert!(matches!(store.remove_orders(&parse_order_ids(" , ")), Err(ToolError::Input(_))));
        let err = store.remove_orders(&["NOPE".to_string()]).unwrap_err();
        assert_eq!(err.to_string(), "No matching orders found.");
    }

    #[test]
    fn list_orders_sorts_newest_first_with_undated_last() {
        let listing = sample_store().list_orders(&OrderFilter::default());
        let orders: Vec<&str> = listing.orders.iter().map(|s| s.order_ref.order.as_str()).collect();
        assert_eq!(orders, vec!["T2", "T1", "T4", "T3"]);
        assert_eq!(listing.versions, vec!["V1".to_string(), "V2".to_string()]);
    }

    #[test]
    fn list_orders_filters_by_version_and_dates() {
        let store = sample_store();
        let filter = OrderFilter {
            version: Some("V1".into()),
            dates: Some(
                DateRange::new(
                    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                )
                .unwrap(),
            ),
        };
        let listing = store.list_orders(&filter);
        assert_eq!(listing.orders.len(), 1);
        assert_eq!(listing.orders[0].order_ref, OrderRef::new("V1", "T1"));

        let all = OrderFilter {
            version: Some("All".into()),
            dates: None,
        };
        assert_eq!(store.list_orders(&all).orders.len(), 4);
    }

    #[test]
    fn date_ranges_reject_inverted_bounds() {
        let late = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let early = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(DateRange::new(late, early).is_err());
        let window = DateRange::last_days(late, 30);
        assert!(window.contains(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()));
        assert!(!window.contains(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()));
    }

    #[test]
    fn metadata_lookup_reports_missing_orders() {
        let store = sample_store();
        assert!(store.metadata("V1", "T1").is_ok());
        let err = store.metadata("V1", "T404").unwrap_err();
        assert_eq!(err.to_string(), "Order not found in the database.");
    }

    #[test]
    fn workplace_data_rejects_mixed_versions() {
        let store = sample_store();
        let err = store
            .workplace_data(&[OrderRef::new("V1", "T1"), OrderRef::new("V2", "T4")])
            .unwrap_err();
        assert_eq!(err.to_string(), "Select tests from only one version.");
    }

    #[test]
    fn workplace_data_joins_pressures_and_counts_duplicates() {
        let store = sample_store();
        let selected = [OrderRef::new("V1", "T1"), OrderRef::new("V1", "T1")];
        let batch = store.workplace_data(&selected).expect("records built");

        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.duplicates, 2);
        assert_eq!(
            batch.to_string(),
            "Added 2 records.\n2 duplicate test(s) were ignored."
        );
        let first = &batch.records[0];
        assert_eq!(first.inflator_no, 100);
        assert_eq!(first.pressures.get(&0), Some(&20.0));
        assert!(batch.records[1].pressures.is_empty());
    }

    #[test]
    fn store_document_keeps_limit_tables_apart_from_versions() {
        let document = serde_json::json!({
            "V1": {"T1": {"metadata": {"test_date": "2024-03-01"}, "temperatures": {}}},
            "versions": {"V1": {}}
        });
        let store = Store::from_value(document).expect("document parsed");
        assert_eq!(store.version_names(), vec!["V1".to_string()]);
        assert!(store.versions.contains_key("V1"));

        let restored = Store::from_value(store.to_value().expect("serialized")).expect("reparsed");
        assert_eq!(restored, store);
    }
}
