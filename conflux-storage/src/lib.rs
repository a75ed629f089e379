//! Drill table artifacts.
//!
//! Tables are encoded as GZIP parquet with their `{drill, date}` metadata in
//! the file footer and stored under
//! `<root>/<YYYYMMDD>/<drill>_<scene>_<date>.pq` on a local disk, in memory,
//! or (with the `aws` feature) in S3.

pub mod codec;
pub mod error;
pub mod naming;
pub mod output;
#[cfg(feature = "aws")]
pub mod s3;
pub mod store;

pub use codec::{decode_metadata, decode_table, encode_table, ID_COLUMN, METADATA_KEY};
pub use error::{Result, StorageError};
pub use naming::{artifact_path, parse_artifact_name, ArtifactName};
pub use output::{OutputStore, Replicator};
#[cfg(feature = "aws")]
pub use s3::{S3ArtifactStore, S3Config};
pub use store::{open_store, ArtifactStore, LocalArtifactStore, MemoryArtifactStore};
