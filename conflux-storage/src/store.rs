//! Byte-level artifact storage.
//!
//! Paths are full locations (`/data/out/...` or `s3://bucket/...`); each
//! backend only accepts its own kind.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Result, StorageError};

/// Storage for artifact bytes.
///
/// There is no conditional write: two writers racing on one path both
/// succeed and the last write wins.
#[async_trait]
pub trait ArtifactStore: Debug + Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool>;

    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Write (or overwrite) `path`, creating parents as needed.
    async fn write(&self, path: &str, bytes: Bytes) -> Result<()>;

    /// Every object path under `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Local filesystem store.
#[derive(Debug, Clone, Default)]
pub struct LocalArtifactStore;

impl LocalArtifactStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let data = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::not_found(path.to_string()),
            _ => StorageError::io(format!("Failed to read {path}: {e}")),
        })?;
        Ok(Bytes::from(data))
    }

    async fn write(&self, path: &str, bytes: Bytes) -> Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, &bytes)
            .await
            .map_err(|e| StorageError::io(format!("Failed to write {path}: {e}")))?;
        debug!(path, size = bytes.len(), "wrote artifact");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = PathBuf::from(prefix);
        if !tokio::fs::try_exists(&root).await? {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        let mut pending = vec![root];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else {
                    found.push(path.to_string_lossy().into_owned());
                }
            }
        }
        found.sort();
        Ok(found)
    }
}

/// In-memory store for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    files: RwLock<BTreeMap<String, Bytes>>,
    writes: AtomicUsize,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `write` calls so far, including overwrites.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.files.read().contains_key(path))
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::not_found(path.to_string()))
    }

    async fn write(&self, path: &str, bytes: Bytes) -> Result<()> {
        self.files.write().insert(path.to_string(), bytes);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .files
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

/// Open the store matching `root`: S3 for `s3://` roots, local otherwise.
pub async fn open_store(root: &str) -> Result<Arc<dyn ArtifactStore>> {
    if root.starts_with("s3://") {
        return open_s3_store(root).await;
    }
    Ok(Arc::new(LocalArtifactStore::new()))
}

#[cfg(feature = "aws")]
async fn open_s3_store(_root: &str) -> Result<Arc<dyn ArtifactStore>> {
    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let store = crate::s3::S3ArtifactStore::new(&sdk_config, crate::s3::S3Config::default()).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "aws"))]
async fn open_s3_store(root: &str) -> Result<Arc<dyn ArtifactStore>> {
    Err(StorageError::invalid_config(format!(
        "{root} needs the 'aws' feature"
    )))
}
