//! Drill output store: idempotent, key-addressed table artifacts.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conflux_core::Table;
use regex::Regex;
use tracing::{debug, info};

use crate::codec::{decode_table, encode_table};
use crate::error::{Result, StorageError};
use crate::naming::{artifact_path, file_name, is_table_file};
use crate::store::ArtifactStore;

/// Downstream sink notified after a table has been written.
#[async_trait]
pub trait Replicator: Send + Sync {
    async fn replicate(&self, table: &Table, path: &str) -> Result<()>;
}

/// Tables stored under one root, one artifact per `(drill, scene, date)`.
///
/// The existence check and the write are not atomic. Concurrent workers may
/// both write the same key; the bytes are identical so the last write wins
/// harmlessly.
#[derive(Debug, Clone)]
pub struct OutputStore {
    store: Arc<dyn ArtifactStore>,
    root: String,
}

impl OutputStore {
    pub fn new(store: Arc<dyn ArtifactStore>, root: impl Into<String>) -> Self {
        Self {
            store,
            root: root.into(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub fn path_for(&self, drill: &str, scene_id: &str, date: &DateTime<Utc>) -> String {
        artifact_path(&self.root, drill, scene_id, date)
    }

    /// Whether the artifact for this idempotency key already exists.
    pub async fn table_exists(
        &self,
        drill: &str,
        scene_id: &str,
        date: &DateTime<Utc>,
    ) -> Result<bool> {
        let path = self.path_for(drill, scene_id, date);
        let exists = self.store.exists(&path).await?;
        debug!(path = %path, exists, "checked artifact");
        Ok(exists)
    }

    /// Write `table` under the key taken from its metadata and return the path.
    pub async fn write_table(&self, table: &Table, scene_id: &str) -> Result<String> {
        let meta = table.metadata().ok_or_else(|| {
            StorageError::codec(format!("table for scene {scene_id} has no drill metadata"))
        })?;
        let path = self.path_for(&meta.drill, scene_id, &meta.date);
        let bytes = encode_table(table)?;
        self.store.write(&path, bytes).await?;
        info!(path = %path, rows = table.len(), "wrote drill table");
        Ok(path)
    }

    pub async fn read_table(&self, path: &str) -> Result<Table> {
        let bytes = self.store.read(path).await?;
        decode_table(bytes)
    }

    /// Table artifacts under the root whose file name matches `pattern`.
    pub async fn find_tables(&self, pattern: &str) -> Result<Vec<String>> {
        let re = Regex::new(pattern)
            .map_err(|e| StorageError::invalid_config(format!("bad pattern '{pattern}': {e}")))?;
        let paths = self.store.list(&self.root).await?;
        Ok(paths
            .into_iter()
            .filter(|p| is_table_file(p) && re.is_match(file_name(p)))
            .collect())
    }
}
