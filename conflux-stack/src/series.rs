//! Per-polygon time series built from many per-scene tables.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use conflux_core::{PolygonId, Record, Table, Value};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StackError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackOptions {
    /// Column ranking same-day observations; lower is better
    pub invalid_field: String,
    /// Keep one observation per UTC day
    pub remove_duplicates: bool,
}

impl Default for StackOptions {
    fn default() -> Self {
        Self {
            invalid_field: "pc_invalid".to_string(),
            remove_duplicates: true,
        }
    }
}

/// One dated row of a series, aligned with [`Series::columns`].
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub date: DateTime<Utc>,
    pub values: Vec<Value>,
}

/// A polygon's observations sorted by date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub columns: Vec<String>,
    pub observations: Vec<Observation>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.observations.get(row)?.values.get(idx)
    }

    pub fn dates(&self) -> impl Iterator<Item = &DateTime<Utc>> {
        self.observations.iter().map(|o| &o.date)
    }
}

/// Collects dated records for one polygon in arrival order.
#[derive(Debug, Default)]
pub struct SeriesBuilder {
    columns: Vec<String>,
    rows: Vec<(DateTime<Utc>, Record)>,
}

impl SeriesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, date: DateTime<Utc>, record: Record) {
        for name in record.keys() {
            if !self.columns.contains(name) {
                self.columns.push(name.clone());
            }
        }
        self.rows.push((date, record));
    }

    /// Sort by date, dropping same-day duplicates first when asked.
    ///
    /// Within a day the row with the lowest invalid value is kept; rows
    /// lacking the value rank last and ties keep the earliest arrival.
    pub fn finish(self, options: &StackOptions) -> Series {
        let mut rows = self.rows;
        if options.remove_duplicates {
            let rank = |r: &Record| r.get(&options.invalid_field).and_then(invalid_rank);
            // stable: equal keys keep arrival order
            rows.sort_by(|(da, ra), (db, rb)| {
                day(da)
                    .cmp(&day(db))
                    .then_with(|| compare_rank(rank(ra), rank(rb)))
            });
            rows.dedup_by(|(later, _), (kept, _)| day(later) == day(kept));
        }
        rows.sort_by_key(|(date, _)| *date);

        let columns = self.columns;
        let observations = rows
            .into_iter()
            .map(|(date, mut record)| Observation {
                date,
                values: columns
                    .iter()
                    .map(|c| record.remove(c).unwrap_or(Value::Null))
                    .collect(),
            })
            .collect();
        Series {
            columns,
            observations,
        }
    }
}

fn day(date: &DateTime<Utc>) -> NaiveDate {
    date.date_naive()
}

fn invalid_rank(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| !v.is_nan())
}

fn compare_rank(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Regroup per-scene tables into per-polygon series.
///
/// Every table must carry `{drill, date}` metadata; the date stamps each of
/// its rows. Tables are consumed in the given order.
pub fn stack_tables<'a>(
    tables: impl IntoIterator<Item = &'a Table>,
    options: &StackOptions,
) -> Result<BTreeMap<PolygonId, Series>> {
    let mut builders: BTreeMap<PolygonId, SeriesBuilder> = BTreeMap::new();
    for table in tables {
        let meta = table.metadata().ok_or_else(|| {
            StackError::missing_metadata(format!("table with {} rows", table.len()))
        })?;
        for (id, values) in table.rows() {
            let record: Record = table
                .columns()
                .iter()
                .zip(values)
                .map(|(c, v)| (c.name.clone(), v.clone()))
                .collect();
            builders
                .entry(id.clone())
                .or_default()
                .push(meta.date, record);
        }
    }
    Ok(builders
        .into_iter()
        .map(|(id, b)| (id, b.finish(options)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use conflux_core::TableMetadata;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 3, d, h, 0, 0).unwrap()
    }

    fn table(date: DateTime<Utc>, rows: &[(&str, Option<f64>, f64)]) -> Table {
        let records = rows
            .iter()
            .map(|(id, invalid, wet)| {
                let mut r = Record::new();
                r.insert("pc_wet".into(), Value::Float(*wet));
                if let Some(inv) = invalid {
                    r.insert("pc_invalid".into(), Value::Float(*inv));
                }
                (PolygonId::new(*id), r)
            })
            .collect();
        Table::from_records(records)
            .unwrap()
            .with_metadata(TableMetadata::new("waterbodies", date))
    }

    #[test]
    fn test_same_day_keeps_lowest_invalid() {
        let tables = vec![
            table(at(5, 8), &[("wb1", Some(20.0), 1.0)]),
            table(at(5, 9), &[("wb1", Some(5.0), 2.0)]),
        ];
        let series = stack_tables(&tables, &StackOptions::default()).unwrap();
        let s = &series[&PolygonId::new("wb1")];
        assert_eq!(s.len(), 1);
        assert_eq!(s.get(0, "pc_invalid"), Some(&Value::Float(5.0)));
        assert_eq!(s.get(0, "pc_wet"), Some(&Value::Float(2.0)));
        assert_eq!(s.observations[0].date, at(5, 9));
    }

    #[test]
    fn test_ties_keep_first_seen_and_missing_rank_last() {
        let tables = vec![
            table(at(5, 10), &[("wb1", None, 0.0)]),
            table(at(5, 8), &[("wb1", Some(5.0), 1.0)]),
            table(at(5, 9), &[("wb1", Some(5.0), 2.0)]),
        ];
        let series = stack_tables(&tables, &StackOptions::default()).unwrap();
        let s = &series[&PolygonId::new("wb1")];
        assert_eq!(s.len(), 1);
        assert_eq!(s.get(0, "pc_wet"), Some(&Value::Float(1.0)));
    }

    #[test]
    fn test_sorted_by_date_and_columns_unioned() {
        let tables = vec![
            table(at(9, 8), &[("wb1", Some(1.0), 3.0), ("wb2", None, 4.0)]),
            table(at(2, 8), &[("wb1", None, 5.0)]),
            table(at(2, 8), &[("wb2", Some(2.0), 6.0)]),
        ];
        let options = StackOptions {
            remove_duplicates: false,
            ..StackOptions::default()
        };
        let series = stack_tables(&tables, &options).unwrap();

        let s1 = &series[&PolygonId::new("wb1")];
        assert_eq!(s1.dates().cloned().collect::<Vec<_>>(), vec![at(2, 8), at(9, 8)]);
        assert_eq!(s1.columns, vec!["pc_invalid", "pc_wet"]);
        assert_eq!(s1.get(0, "pc_invalid"), Some(&Value::Null));

        let s2 = &series[&PolygonId::new("wb2")];
        assert_eq!(s2.len(), 2);
        assert_eq!(s2.get(0, "pc_wet"), Some(&Value::Float(6.0)));
    }

    #[test]
    fn test_table_without_metadata_is_rejected() {
        let bare = Table::default();
        assert!(matches!(
            stack_tables([&bare], &StackOptions::default()),
            Err(StackError::MissingMetadata(_))
        ));
    }
}
