//! Drill output table: one row per polygon, typed columns, embedded metadata.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DrillError, Result};
use crate::types::PolygonId;

/// Compact timestamp layout used in embedded metadata and artifact names.
pub const DATE_FORMAT: &str = "%Y%m%d-%H%M%S-%6f";

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value; `None` for non-numeric or null.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Bool),
            Value::Int(_) => Some(ColumnType::Int),
            Value::Float(_) => Some(ColumnType::Float),
            Value::Text(_) => Some(ColumnType::Text),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) if v.is_nan() => Ok(()),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Bool,
    Int,
    Float,
    Text,
}

impl ColumnType {
    /// Type that can hold both; `None` when the pair cannot share a column.
    fn widen(self, other: ColumnType) -> Option<ColumnType> {
        use ColumnType::*;
        match (self, other) {
            (a, b) if a == b => Some(a),
            (Int, Float) | (Float, Int) => Some(Float),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// One plugin output record, keyed by column name.
pub type Record = BTreeMap<String, Value>;

/// `{drill, date}` document embedded in every written table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    pub drill: String,
    pub date: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct MetadataDoc {
    drill: String,
    date: String,
}

impl TableMetadata {
    pub fn new(drill: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            drill: drill.into(),
            date,
        }
    }

    pub fn date_string(&self) -> String {
        format_date(&self.date)
    }

    pub fn to_json(&self) -> String {
        let doc = MetadataDoc {
            drill: self.drill.clone(),
            date: self.date_string(),
        };
        // A struct of two strings always serialises.
        serde_json::to_string(&doc).unwrap_or_default()
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let doc: MetadataDoc = serde_json::from_str(s)
            .map_err(|e| DrillError::type_mismatch(format!("invalid table metadata: {e}")))?;
        Ok(Self {
            drill: doc.drill,
            date: parse_date(&doc.date)?,
        })
    }
}

/// Format a timestamp as `YYYYMMDD-HHMMSS-ffffff`.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a `YYYYMMDD-HHMMSS-ffffff` timestamp.
pub fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| DrillError::type_mismatch(format!("invalid date '{s}': {e}")))
}

/// Drill records keyed by polygon id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<ColumnSpec>,
    rows: BTreeMap<PolygonId, Vec<Value>>,
    metadata: Option<TableMetadata>,
}

impl Table {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self {
            columns,
            rows: BTreeMap::new(),
            metadata: None,
        }
    }

    /// Build a table from plugin records.
    ///
    /// Columns appear in first-seen order; missing keys become `Null`.
    pub fn from_records(records: Vec<(PolygonId, Record)>) -> Result<Self> {
        let mut order: Vec<String> = Vec::new();
        let mut types: HashMap<String, Option<ColumnType>> = HashMap::new();

        for (id, record) in &records {
            for (name, value) in record {
                let seen = types.entry(name.clone()).or_insert_with(|| {
                    order.push(name.clone());
                    None
                });
                if let Some(vt) = value.column_type() {
                    *seen = match *seen {
                        None => Some(vt),
                        Some(ct) => Some(ct.widen(vt).ok_or_else(|| {
                            DrillError::type_mismatch(format!(
                                "column '{name}' mixes {ct:?} and {vt:?} (row {id})"
                            ))
                        })?),
                    };
                }
            }
        }

        let columns: Vec<ColumnSpec> = order
            .iter()
            .map(|name| {
                let ty = types.get(name).copied().flatten().unwrap_or(ColumnType::Float);
                ColumnSpec::new(name.clone(), ty)
            })
            .collect();

        let mut table = Table::new(columns);
        for (id, mut record) in records {
            let row = table
                .columns
                .iter()
                .map(|c| coerce(record.remove(&c.name).unwrap_or(Value::Null), c.data_type))
                .collect();
            table.rows.insert(id, row);
        }
        Ok(table)
    }

    /// Insert or replace a row. Values must match the column count.
    pub fn insert_row(&mut self, id: PolygonId, values: Vec<Value>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(DrillError::type_mismatch(format!(
                "row {id} has {} values, table has {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        let row = values
            .into_iter()
            .zip(&self.columns)
            .map(|(v, c)| coerce(v, c.data_type))
            .collect();
        self.rows.insert(id, row);
        Ok(())
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn rows(&self) -> &BTreeMap<PolygonId, Vec<Value>> {
        &self.rows
    }

    pub fn row(&self, id: &PolygonId) -> Option<&[Value]> {
        self.rows.get(id).map(Vec::as_slice)
    }

    /// Value of one cell.
    pub fn get(&self, id: &PolygonId, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(id).and_then(|r| r.get(idx))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn metadata(&self) -> Option<&TableMetadata> {
        self.metadata.as_ref()
    }

    pub fn set_metadata(&mut self, metadata: TableMetadata) {
        self.metadata = Some(metadata);
    }

    pub fn with_metadata(mut self, metadata: TableMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Add boolean flag columns for rows already in the table.
    ///
    /// Ids in `flags` without a row are ignored; rows without flags get `Null`.
    pub fn left_join_flags(&mut self, names: &[&str], flags: &BTreeMap<PolygonId, Vec<bool>>) {
        for name in names {
            self.columns.push(ColumnSpec::new(*name, ColumnType::Bool));
        }
        for (id, row) in self.rows.iter_mut() {
            match flags.get(id) {
                Some(values) => {
                    for i in 0..names.len() {
                        row.push(values.get(i).map_or(Value::Null, |b| Value::Bool(*b)));
                    }
                }
                None => row.extend(std::iter::repeat(Value::Null).take(names.len())),
            }
        }
    }
}

fn coerce(value: Value, ty: ColumnType) -> Value {
    match (value, ty) {
        (Value::Int(i), ColumnType::Float) => Value::Float(i as f64),
        (v, _) => v,
    }
}
