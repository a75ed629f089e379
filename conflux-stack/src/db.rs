//! SQLite observation database.
//!
//! Drill tables are ingested row by row; series are read back per polygon
//! and exported to CSV with one pooled connection per export task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use conflux_core::table::{format_date, parse_date};
use conflux_core::{PolygonId, Record, Table};
use conflux_storage::{ArtifactStore, Replicator, StorageError};
use futures::{StreamExt, TryStreamExt};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::{Result, StackError};
use crate::export::{encode_csv, series_path};
use crate::series::{SeriesBuilder, StackOptions};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS polygons (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS observations (
    polygon INTEGER NOT NULL REFERENCES polygons(id),
    drill   TEXT NOT NULL,
    date    TEXT NOT NULL,
    payload TEXT NOT NULL,
    PRIMARY KEY (polygon, drill, date)
);
";

/// Fixed set of connections handed out one per task.
struct Pool {
    idle: Mutex<Vec<Connection>>,
    permits: Semaphore,
    size: usize,
}

/// Drill observations stored in SQLite.
#[derive(Clone)]
pub struct ObservationDb {
    pool: Arc<Pool>,
    path: PathBuf,
}

impl std::fmt::Debug for ObservationDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationDb")
            .field("path", &self.path)
            .field("pool_size", &self.pool.size)
            .finish()
    }
}

fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(std::time::Duration::from_secs(30))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

impl ObservationDb {
    /// Open (creating if needed) the database at `path` with `pool_size`
    /// connections.
    pub async fn open(path: impl Into<PathBuf>, pool_size: usize) -> Result<Self> {
        if pool_size == 0 {
            return Err(StackError::invalid_config("pool size must be at least 1"));
        }
        let path = path.into();
        let db_path = path.clone();
        let conns = tokio::task::spawn_blocking(move || -> Result<Vec<Connection>> {
            let first = connect(&db_path)?;
            first.execute_batch(SCHEMA)?;
            let mut conns = vec![first];
            for _ in 1..pool_size {
                conns.push(connect(&db_path)?);
            }
            Ok(conns)
        })
        .await??;

        info!(path = %path.display(), pool_size, "opened observation database");
        Ok(Self {
            pool: Arc::new(Pool {
                idle: Mutex::new(conns),
                permits: Semaphore::new(pool_size),
                size: pool_size,
            }),
            path,
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool.size
    }

    /// Run `f` on a pooled connection in the blocking pool. The connection
    /// goes back to the pool afterwards and is never shared meanwhile.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .pool
            .permits
            .acquire()
            .await
            .map_err(|e| StackError::Task(e.to_string()))?;
        let mut conn = self
            .pool
            .idle
            .lock()
            .pop()
            .ok_or_else(|| StackError::Task("connection pool is empty".to_string()))?;

        match tokio::task::spawn_blocking(move || {
            let out = f(&mut conn);
            (conn, out)
        })
        .await
        {
            Ok((conn, out)) => {
                self.pool.idle.lock().push(conn);
                out
            }
            Err(e) => {
                // the connection died with the task
                permit.forget();
                Err(e.into())
            }
        }
    }

    /// Store every row of `table` under its drill and date. Re-ingesting the
    /// same table replaces its rows. Returns the number of rows stored.
    pub async fn ingest(&self, table: &Table) -> Result<usize> {
        let meta = table
            .metadata()
            .ok_or_else(|| StackError::missing_metadata("ingest"))?;
        let drill = meta.drill.clone();
        let date = format_date(&meta.date);

        let mut rows = Vec::with_capacity(table.len());
        for (id, values) in table.rows() {
            let record: Record = table
                .columns()
                .iter()
                .zip(values)
                .map(|(c, v)| (c.name.clone(), v.clone()))
                .collect();
            rows.push((id.as_str().to_string(), serde_json::to_string(&record)?));
        }

        let count = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut add_polygon =
                        tx.prepare_cached("INSERT OR IGNORE INTO polygons (name) VALUES (?1)")?;
                    let mut find_polygon =
                        tx.prepare_cached("SELECT id FROM polygons WHERE name = ?1")?;
                    let mut add_obs = tx.prepare_cached(
                        "INSERT OR REPLACE INTO observations (polygon, drill, date, payload)
                         VALUES (?1, ?2, ?3, ?4)",
                    )?;
                    for (name, payload) in &rows {
                        add_polygon.execute(params![name])?;
                        let key: i64 = find_polygon.query_row(params![name], |r| r.get(0))?;
                        add_obs.execute(params![key, drill, date, payload])?;
                    }
                }
                tx.commit()?;
                Ok(rows.len())
            })
            .await?;
        debug!(rows = count, "ingested table");
        Ok(count)
    }

    /// Every polygon id seen so far, sorted.
    pub async fn polygon_ids(&self) -> Result<Vec<PolygonId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM polygons ORDER BY name")?;
            let names = stmt
                .query_map([], |r| r.get::<_, String>(0))?
                .map(|r| r.map(PolygonId::new))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    /// Observations of one polygon in date order.
    pub async fn observations(&self, id: &PolygonId) -> Result<SeriesBuilder> {
        let name = id.as_str().to_string();
        let rows = self
            .with_conn(move |conn| {
                let key: Option<i64> = conn
                    .query_row(
                        "SELECT id FROM polygons WHERE name = ?1",
                        params![name],
                        |r| r.get(0),
                    )
                    .optional()?;
                let Some(key) = key else {
                    return Ok(Vec::new());
                };
                let mut stmt = conn.prepare(
                    "SELECT date, payload FROM observations WHERE polygon = ?1 ORDER BY date",
                )?;
                let rows = stmt
                    .query_map(params![key], |r| {
                        Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut builder = SeriesBuilder::new();
        for (date, payload) in rows {
            let record: Record = serde_json::from_str(&payload)?;
            builder.push(parse_date(&date)?, record);
        }
        Ok(builder)
    }

    /// Export every polygon's series to `<root>/<id[..4]>/<id>.csv` with
    /// `workers` concurrent tasks. Returns the number of files written.
    pub async fn export_csv(
        &self,
        store: Arc<dyn ArtifactStore>,
        root: &str,
        workers: usize,
        options: &StackOptions,
    ) -> Result<usize> {
        let workers = workers.max(1);
        if workers > self.pool.size {
            warn!(
                workers,
                pool_size = self.pool.size,
                "more export workers than connections; tasks will wait"
            );
        }
        let ids = self.polygon_ids().await?;
        info!(polygons = ids.len(), workers, "exporting series");

        let written: Vec<()> = futures::stream::iter(ids)
            .map(|id| {
                let store = store.clone();
                async move {
                    let series = self.observations(&id).await?.finish(options);
                    let path = series_path(root, &id);
                    store.write(&path, encode_csv(&series)?).await?;
                    debug!(path = %path, observations = series.len(), "wrote series");
                    Ok::<_, StackError>(())
                }
            })
            .buffer_unordered(workers)
            .try_collect()
            .await?;
        Ok(written.len())
    }
}

#[async_trait]
impl Replicator for ObservationDb {
    async fn replicate(&self, table: &Table, path: &str) -> conflux_storage::Result<()> {
        self.ingest(table)
            .await
            .map(|_| ())
            .map_err(|e| StorageError::replication(format!("{path}: {e}")))
    }
}
