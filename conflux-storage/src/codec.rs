//! Parquet encoding of drill tables.
//!
//! The polygon id is stored in an `id` column; `{drill, date}` metadata is
//! stored as JSON under the [`METADATA_KEY`] footer key.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use conflux_core::table::{ColumnSpec, ColumnType, Table, TableMetadata, Value};
use conflux_core::PolygonId;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel};
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;

use crate::error::{Result, StorageError};

/// Footer key holding the `{drill, date}` JSON document.
pub const METADATA_KEY: &str = "conflux.metadata";

/// Name of the polygon id column.
pub const ID_COLUMN: &str = "id";

fn arrow_type(ty: ColumnType) -> DataType {
    match ty {
        ColumnType::Bool => DataType::Boolean,
        ColumnType::Int => DataType::Int64,
        ColumnType::Float => DataType::Float64,
        ColumnType::Text => DataType::Utf8,
    }
}

fn column_type(dt: &DataType) -> Option<ColumnType> {
    match dt {
        DataType::Boolean => Some(ColumnType::Bool),
        DataType::Int64 => Some(ColumnType::Int),
        DataType::Float64 => Some(ColumnType::Float),
        DataType::Utf8 => Some(ColumnType::Text),
        _ => None,
    }
}

fn column_array(table: &Table, idx: usize, ty: ColumnType) -> ArrayRef {
    let cells = table.rows().values().map(|row| &row[idx]);
    match ty {
        ColumnType::Bool => Arc::new(BooleanArray::from(
            cells.map(Value::as_bool).collect::<Vec<_>>(),
        )),
        ColumnType::Int => Arc::new(Int64Array::from(
            cells
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnType::Float => Arc::new(Float64Array::from(
            cells.map(Value::as_f64).collect::<Vec<_>>(),
        )),
        ColumnType::Text => Arc::new(StringArray::from(
            cells
                .map(|v| match v {
                    Value::Text(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect::<Vec<_>>(),
        )),
    }
}

/// Encode a table as a GZIP-compressed parquet file.
pub fn encode_table(table: &Table) -> Result<Bytes> {
    let mut fields = vec![Field::new(ID_COLUMN, DataType::Utf8, false)];
    fields.extend(
        table
            .columns()
            .iter()
            .map(|c| Field::new(c.name.clone(), arrow_type(c.data_type), true)),
    );
    let schema = Arc::new(Schema::new(fields));

    let ids: ArrayRef = Arc::new(StringArray::from(
        table
            .rows()
            .keys()
            .map(|id| id.as_str().to_string())
            .collect::<Vec<_>>(),
    ));
    let mut columns = vec![ids];
    for (idx, spec) in table.columns().iter().enumerate() {
        columns.push(column_array(table, idx, spec.data_type));
    }
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let mut props = WriterProperties::builder()
        .set_compression(Compression::GZIP(GzipLevel::default()));
    if let Some(meta) = table.metadata() {
        props = props.set_key_value_metadata(Some(vec![KeyValue::new(
            METADATA_KEY.to_string(),
            meta.to_json(),
        )]));
    }

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(props.build()))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(Bytes::from(buffer))
}

/// Read only the embedded `{drill, date}` metadata.
pub fn decode_metadata(bytes: Bytes) -> Result<Option<TableMetadata>> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
    metadata_of(&builder)
}

fn metadata_of(
    builder: &ParquetRecordBatchReaderBuilder<Bytes>,
) -> Result<Option<TableMetadata>> {
    let value = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .and_then(|kvs| kvs.iter().find(|kv| kv.key == METADATA_KEY))
        .and_then(|kv| kv.value.clone());
    value
        .map(|json| TableMetadata::from_json(&json).map_err(StorageError::from))
        .transpose()
}

/// Decode a table written by [`encode_table`].
pub fn decode_table(bytes: Bytes) -> Result<Table> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
    let metadata = metadata_of(&builder)?;

    let schema = builder.schema().clone();
    let id_idx = schema
        .index_of(ID_COLUMN)
        .map_err(|_| StorageError::codec(format!("missing '{ID_COLUMN}' column")))?;

    let mut specs = Vec::new();
    let mut source_idx = Vec::new();
    for (idx, field) in schema.fields().iter().enumerate() {
        if idx == id_idx {
            continue;
        }
        let ty = column_type(field.data_type()).ok_or_else(|| {
            StorageError::codec(format!(
                "column '{}' has unsupported type {}",
                field.name(),
                field.data_type()
            ))
        })?;
        specs.push(ColumnSpec::new(field.name().clone(), ty));
        source_idx.push(idx);
    }

    let mut table = Table::new(specs.clone());
    for batch in builder.build()? {
        let batch = batch?;
        let ids = downcast::<StringArray>(batch.column(id_idx), ID_COLUMN)?;
        for row in 0..batch.num_rows() {
            let mut values = Vec::with_capacity(specs.len());
            for (spec, &col) in specs.iter().zip(&source_idx) {
                values.push(cell(batch.column(col), spec, row)?);
            }
            table.insert_row(PolygonId::new(ids.value(row)), values)?;
        }
    }
    if let Some(meta) = metadata {
        table.set_metadata(meta);
    }
    Ok(table)
}

fn downcast<'a, A: 'static>(array: &'a ArrayRef, name: &str) -> Result<&'a A> {
    array
        .as_any()
        .downcast_ref::<A>()
        .ok_or_else(|| StorageError::codec(format!("column '{name}' has unexpected layout")))
}

fn cell(array: &ArrayRef, spec: &ColumnSpec, row: usize) -> Result<Value> {
    if array.is_null(row) {
        return Ok(Value::Null);
    }
    Ok(match spec.data_type {
        ColumnType::Bool => Value::Bool(downcast::<BooleanArray>(array, &spec.name)?.value(row)),
        ColumnType::Int => Value::Int(downcast::<Int64Array>(array, &spec.name)?.value(row)),
        ColumnType::Float => Value::Float(downcast::<Float64Array>(array, &spec.name)?.value(row)),
        ColumnType::Text => {
            Value::Text(downcast::<StringArray>(array, &spec.name)?.value(row).to_string())
        }
    })
}
