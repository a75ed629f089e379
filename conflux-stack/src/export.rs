//! CSV export of per-polygon series.

use std::collections::BTreeMap;

use bytes::Bytes;
use conflux_core::PolygonId;
use conflux_storage::naming::join;
use conflux_storage::{ArtifactStore, OutputStore};
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, info};

use crate::error::{Result, StackError};
use crate::series::{stack_tables, Series, StackOptions};

/// Date layout of the leading CSV column, e.g. `1987-05-24T01:30:18Z`.
pub const CSV_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const READ_CONCURRENCY: usize = 8;

/// `<root>/<first four characters of id>/<id>.csv`
pub fn series_path(root: &str, id: &PolygonId) -> String {
    let shard: String = id.as_str().chars().take(4).collect();
    join(root, &format!("{shard}/{id}.csv"))
}

/// Encode a series with a leading `date` column.
pub fn encode_csv(series: &Series) -> Result<Bytes> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header = Vec::with_capacity(series.columns.len() + 1);
    header.push("date");
    header.extend(series.columns.iter().map(String::as_str));
    writer.write_record(&header)?;

    for obs in &series.observations {
        let mut record = Vec::with_capacity(obs.values.len() + 1);
        record.push(obs.date.format(CSV_DATE_FORMAT).to_string());
        record.extend(obs.values.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }
    let buffer = writer
        .into_inner()
        .map_err(|e| StackError::Csv(e.to_string()))?;
    Ok(Bytes::from(buffer))
}

/// Write one CSV per polygon. Returns the written paths.
pub async fn export_series(
    store: &dyn ArtifactStore,
    root: &str,
    series: &BTreeMap<PolygonId, Series>,
) -> Result<Vec<String>> {
    let mut written = Vec::with_capacity(series.len());
    for (id, s) in series {
        let path = series_path(root, id);
        store.write(&path, encode_csv(s)?).await?;
        debug!(path = %path, observations = s.len(), "wrote series");
        written.push(path);
    }
    Ok(written)
}

/// Find artifacts matching `pattern`, stack them and export the series.
pub async fn stack_from_store(
    output: &OutputStore,
    pattern: &str,
    target: &dyn ArtifactStore,
    target_root: &str,
    options: &StackOptions,
) -> Result<Vec<String>> {
    let paths = output.find_tables(pattern).await?;
    info!(root = output.root(), tables = paths.len(), "stacking tables");

    let tables: Vec<_> = futures::stream::iter(paths.iter())
        .map(|path| output.read_table(path))
        .buffered(READ_CONCURRENCY)
        .try_collect()
        .await?;

    let series = stack_tables(&tables, options)?;
    let written = export_series(target, target_root, &series).await?;
    info!(series = written.len(), target = target_root, "exported series");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Observation;
    use chrono::{TimeZone, Utc};
    use conflux_core::Value;

    #[test]
    fn test_series_path_shards_by_prefix() {
        assert_eq!(
            series_path("s3://b/csv/", &PolygonId::new("edc8gk1d9")),
            "s3://b/csv/edc8/edc8gk1d9.csv"
        );
        assert_eq!(series_path("/out", &PolygonId::new("ab")), "/out/ab/ab.csv");
    }

    #[test]
    fn test_encode_csv() {
        let series = Series {
            columns: vec!["pc_wet".into(), "px_wet".into()],
            observations: vec![
                Observation {
                    date: Utc.with_ymd_and_hms(1987, 5, 24, 1, 30, 18).unwrap(),
                    values: vec![Value::Float(12.5), Value::Int(3)],
                },
                Observation {
                    date: Utc.with_ymd_and_hms(1987, 6, 1, 0, 0, 0).unwrap(),
                    values: vec![Value::Float(f64::NAN), Value::Null],
                },
            ],
        };
        let text = String::from_utf8(encode_csv(&series).unwrap().to_vec()).unwrap();
        assert_eq!(
            text,
            "date,pc_wet,px_wet\n1987-05-24T01:30:18Z,12.5,3\n1987-06-01T00:00:00Z,,\n"
        );
    }
}
