//! Stacking of drill tables into per-polygon time series.
//!
//! Two routes lead to the same CSV layout (`<root>/<id[..4]>/<id>.csv`):
//! reading parquet artifacts straight from an [`OutputStore`], or querying
//! an [`ObservationDb`] that ingested tables as the workers wrote them.
//!
//! [`OutputStore`]: conflux_storage::OutputStore

pub mod db;
pub mod error;
pub mod export;
pub mod series;

pub use db::ObservationDb;
pub use error::{Result, StackError};
pub use export::{encode_csv, export_series, series_path, stack_from_store, CSV_DATE_FORMAT};
pub use series::{stack_tables, Observation, Series, SeriesBuilder, StackOptions};
