//! Per-time-point statistics over a set of workplace records.
//!
//! [`build_report`] is the single place statistics are computed; the text
//! table and the workbook export both render its output.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Condition, Limits, TimeOffset, WorkplaceRecord};
use crate::store::Store;

/// Column captions of the first six time points in report tables.
pub const CHECKPOINT_LABELS: [&str; 6] = ["PK 10%", "PK 25%", "PK 50%", "PK 75%", "PK 90%", "PK MAX"];

pub const TIME_ROW: &str = "Time (ms)";
pub const MAXIMUM_ROW: &str = "Maximum (bar)";
pub const MEAN_ROW: &str = "Mean (bar)";
pub const MINIMUM_ROW: &str = "Minimum (bar)";

/// Statistics at one time offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatPoint {
    pub time: TimeOffset,
    /// Mean of the values present at this offset; `None` when none are.
    pub mean: Option<f64>,
    pub limit_max: Option<f64>,
    pub limit_min: Option<f64>,
}

/// One record's pressures aligned to the report's time offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSeries {
    pub test_no: i64,
    pub inflator_no: i64,
    pub order: String,
    pub values: Vec<Option<f64>>,
}

impl RecordSeries {
    pub fn has_data(&self) -> bool {
        self.values.iter().any(Option::is_some)
    }
}

/// Statistics and raw series of one condition.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionReport {
    pub condition: Condition,
    /// Version tags of the records, joined with ", ".
    pub version: String,
    pub total_records: usize,
    pub points: Vec<StatPoint>,
    pub series: Vec<RecordSeries>,
}

/// Kind of a row in the statistics table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatRow {
    Time,
    Maximum,
    Mean,
    Minimum,
}

impl StatRow {
    pub const ALL: [StatRow; 4] = [StatRow::Time, StatRow::Maximum, StatRow::Mean, StatRow::Minimum];

    pub fn label(self) -> &'static str {
        match self {
            StatRow::Time => TIME_ROW,
            StatRow::Maximum => MAXIMUM_ROW,
            StatRow::Mean => MEAN_ROW,
            StatRow::Minimum => MINIMUM_ROW,
        }
    }
}

impl ConditionReport {
    pub fn times(&self) -> Vec<TimeOffset> {
        self.points.iter().map(|point| point.time).collect()
    }

    /// Header captions: checkpoint names for the first six offsets, the
    /// offset in ms after that.
    pub fn column_labels(&self) -> Vec<String> {
        self.points
            .iter()
            .enumerate()
            .map(|(index, point)| match CHECKPOINT_LABELS.get(index) {
                Some(label) => label.to_string(),
                None => format!("{} ms", point.time),
            })
            .collect()
    }

    /// Numeric values of one statistics row; the time row is never missing.
    pub fn row_values(&self, row: StatRow) -> Vec<Option<f64>> {
        self.points
            .iter()
            .map(|point| match row {
                StatRow::Time => Some(point.time as f64),
                StatRow::Maximum => point.limit_max,
                StatRow::Mean => point.mean,
                StatRow::Minimum => point.limit_min,
            })
            .collect()
    }

    /// Copy limited to the first `columns` time offsets, for rendering.
    /// Values are taken over unchanged, never recomputed.
    pub fn first_columns(&self, columns: usize) -> ConditionReport {
        let keep = columns.min(self.points.len());
        ConditionReport {
            condition: self.condition,
            version: self.version.clone(),
            total_records: self.total_records,
            points: self.points[..keep].to_vec(),
            series: self
                .series
                .iter()
                .map(|series| RecordSeries {
                    values: series.values[..keep].to_vec(),
                    ..series.clone()
                })
                .collect(),
        }
    }

    /// Display cells of one statistics row, label first.
    pub fn row_cells(&self, row: StatRow) -> Vec<String> {
        let mut cells = vec![row.label().to_string()];
        match row {
            StatRow::Time => cells.extend(self.points.iter().map(|point| point.time.to_string())),
            _ => cells.extend(self.row_values(row).into_iter().map(format_value)),
        }
        cells
    }
}

/// Statistics of every condition present in a record set, in RT, LT, HT order.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub conditions: Vec<ConditionReport>,
}

impl Report {
    /// Every condition cut to its first `columns` time offsets.
    pub fn first_columns(&self, columns: usize) -> Report {
        Report {
            conditions: self
                .conditions
                .iter()
                .map(|condition| condition.first_columns(columns))
                .collect(),
        }
    }
}

/// Two decimals, or "-" for a missing value.
pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(value) if value.is_finite() => format!("{value:.2}"),
        _ => "-".to_string(),
    }
}

/// Computes the statistics of one condition.
///
/// The time axis is the ascending union of all offsets present in any
/// record. Records without a value at an offset contribute nothing there.
pub fn aggregate(
    condition: Condition,
    records: &[&WorkplaceRecord],
    limits: Option<&Limits>,
) -> ConditionReport {
    let times: Vec<TimeOffset> = records
        .iter()
        .flat_map(|record| record.pressures.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let series: Vec<RecordSeries> = records
        .iter()
        .map(|record| RecordSeries {
            test_no: record.test_no,
            inflator_no: record.inflator_no,
            order: record.order.clone(),
            values: times.iter().map(|time| record.pressures.get(time).copied()).collect(),
        })
        .collect();

    let points = times
        .iter()
        .enumerate()
        .map(|(index, &time)| {
            let present: Vec<f64> = series.iter().filter_map(|s| s.values[index]).collect();
            let mean = if present.is_empty() {
                None
            } else {
                Some(present.iter().sum::<f64>() / present.len() as f64)
            };
            StatPoint {
                time,
                mean,
                limit_max: limits.and_then(|l| l.maximums.get(&time).copied()),
                limit_min: limits.and_then(|l| l.minimums.get(&time).copied()),
            }
        })
        .collect();

    let versions: BTreeSet<&str> = records.iter().map(|record| record.version.as_str()).collect();

    ConditionReport {
        condition,
        version: versions.into_iter().collect::<Vec<_>>().join(", "),
        total_records: records.len(),
        points,
        series,
    }
}

/// Groups records by condition and aggregates each group. Limits come from
/// the store entry of the first record of the group.
pub fn build_report(records: &[WorkplaceRecord], store: &Store) -> Report {
    let mut groups: BTreeMap<Condition, Vec<&WorkplaceRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.condition).or_default().push(record);
    }

    let conditions = groups
        .into_iter()
        .map(|(condition, group)| {
            let limits = group
                .first()
                .and_then(|first| store.limits_for(&first.version, &first.order, condition));
            aggregate(condition, &group, limits)
        })
        .collect();

    Report { conditions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PressureMap;
    use crate::store::tests::{block, record};

    fn workplace_record(inflator_no: i64, condition: Condition, points: &[(i64, f64)]) -> WorkplaceRecord {
        WorkplaceRecord {
            test_no: inflator_no,
            inflator_no,
            temperature_c: Some(23.0),
            condition,
            version: "V1".into(),
            order: "T1".into(),
            test_date: Some("2024-03-01".into()),
            pressures: points.iter().copied().collect::<PressureMap>(),
        }
    }

    #[test]
    fn mean_ignores_missing_values() {
        let a = workplace_record(1, Condition::Rt, &[(0, 20.0), (5, 40.0)]);
        let b = workplace_record(2, Condition::Rt, &[(0, 30.0), (10, 12.0)]);
        let c = workplace_record(3, Condition::Rt, &[]);
        let report = aggregate(Condition::Rt, &[&a, &b, &c], None);

        assert_eq!(report.times(), vec![0, 5, 10]);
        assert_eq!(report.points[0].mean, Some(25.0));
        assert_eq!(report.points[1].mean, Some(40.0));
        assert_eq!(report.points[2].mean, Some(12.0));
        assert_eq!(report.total_records, 3);
        assert!(!report.series[2].has_data());
        assert_eq!(report.series[1].values, vec![Some(30.0), None, Some(12.0)]);
    }

    #[test]
    fn limits_align_to_offsets_and_missing_limits_render_as_dash() {
        let a = workplace_record(1, Condition::Rt, &[(0, 20.0), (5, 45.0)]);
        let limits = Limits {
            maximums: PressureMap::from([(0, 50.0)]),
            minimums: PressureMap::from([(0, 10.0), (5, 5.0)]),
        };
        let report = aggregate(Condition::Rt, &[&a], Some(&limits));

        assert_eq!(report.row_cells(StatRow::Time), vec![TIME_ROW, "0", "5"]);
        assert_eq!(report.row_cells(StatRow::Maximum), vec![MAXIMUM_ROW, "50.00", "-"]);
        assert_eq!(report.row_cells(StatRow::Mean), vec![MEAN_ROW, "20.00", "45.00"]);
        assert_eq!(report.row_cells(StatRow::Minimum), vec![MINIMUM_ROW, "10.00", "5.00"]);
        assert_eq!(report.column_labels(), vec!["PK 10%", "PK 25%"]);
    }

    #[test]
    fn report_groups_by_condition_and_reads_limits_from_first_record() {
        let mut store = Store::default();
        let mut rt = block(&[(1, 1)], &[]);
        rt.limits.maximums.insert(0, 99.0);
        store
            .data
            .entry("V1".into())
            .or_default()
            .insert("T1".into(), record(None, vec![(Condition::Rt, rt)]));

        let records = vec![
            workplace_record(1, Condition::Ht, &[(0, 70.0)]),
            workplace_record(2, Condition::Rt, &[(0, 20.0)]),
            workplace_record(3, Condition::Rt, &[(0, 22.0)]),
        ];
        let report = build_report(&records, &store);

        let conditions: Vec<Condition> = report.conditions.iter().map(|c| c.condition).collect();
        assert_eq!(conditions, vec![Condition::Rt, Condition::Ht]);
        assert_eq!(report.conditions[0].points[0].mean, Some(21.0));
        assert_eq!(report.conditions[0].points[0].limit_max, Some(99.0));
        assert_eq!(report.conditions[1].points[0].limit_max, None);
        assert_eq!(report.conditions[0].version, "V1");
    }

    #[test]
    fn labels_beyond_six_points_show_offsets() {
        let points: Vec<(i64, f64)> = (0..8).map(|i| (i * 5, 1.0)).collect();
        let a = workplace_record(1, Condition::Lt, &points);
        let report = aggregate(Condition::Lt, &[&a], None);
        let labels = report.column_labels();
        assert_eq!(labels[5], "PK MAX");
        assert_eq!(labels[6], "30 ms");
        assert_eq!(format_value(None), "-");
        assert_eq!(format_value(Some(f64::NAN)), "-");
    }

    #[test]
    fn rendering_cap_keeps_checkpoint_columns_only() {
        let a_points: Vec<(i64, f64)> = (0..200).map(|i| (i, i as f64)).collect();
        let b_points: Vec<(i64, f64)> = (0..3).map(|i| (i, 10.0)).collect();
        let a = workplace_record(1, Condition::Rt, &a_points);
        let b = workplace_record(2, Condition::Rt, &b_points);
        let full = Report {
            conditions: vec![aggregate(Condition::Rt, &[&a, &b], None)],
        };

        let shown = full.first_columns(CHECKPOINT_LABELS.len());
        let rt = &shown.conditions[0];
        assert_eq!(rt.points.len(), 6);
        assert_eq!(rt.points[..], full.conditions[0].points[..6]);
        assert_eq!(rt.column_labels(), CHECKPOINT_LABELS.to_vec());
        assert_eq!(rt.series[0].values.len(), 6);
        assert_eq!(rt.series[1].values[5], None);
        assert_eq!(rt.total_records, 2);
        assert_eq!(rt.row_cells(StatRow::Mean)[2], "5.50");

        assert_eq!(full.first_columns(500), full);
    }
}
