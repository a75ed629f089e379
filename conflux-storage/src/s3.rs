//! S3 artifact store.
//!
//! Paths are `s3://<bucket>/<key>`; a single store serves any bucket the
//! credentials can reach.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_smithy_types::retry::RetryConfig;
use aws_smithy_types::timeout::TimeoutConfig;
use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, StorageError};
use crate::store::ArtifactStore;

/// Client tuning for the S3 store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// Endpoint override (LocalStack, MinIO); implies path-style addressing
    pub endpoint: Option<String>,
    /// Total attempts per request, first one included
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Whole-operation timeout, retries included
    pub operation_timeout: Option<Duration>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(20),
            operation_timeout: None,
        }
    }
}

/// Split `s3://bucket/key` into `(bucket, key)`.
pub fn parse_s3_path(path: &str) -> Result<(&str, &str)> {
    let rest = path
        .strip_prefix("s3://")
        .ok_or_else(|| StorageError::invalid_path(format!("not an s3 path: {path}")))?;
    let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        return Err(StorageError::invalid_path(format!("missing bucket: {path}")));
    }
    Ok((bucket, key))
}

#[derive(Clone)]
pub struct S3ArtifactStore {
    client: Client,
}

impl Debug for S3ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ArtifactStore").finish_non_exhaustive()
    }
}

impl S3ArtifactStore {
    /// Build a client from the shared SDK config plus overrides.
    pub async fn new(sdk_config: &aws_config::SdkConfig, config: S3Config) -> Result<Self> {
        if sdk_config.region().is_none() {
            return Err(StorageError::invalid_config("AWS region is not configured"));
        }

        let retry = RetryConfig::standard()
            .with_max_attempts(config.max_attempts.max(1))
            .with_initial_backoff(config.initial_backoff)
            .with_max_backoff(config.max_backoff);
        let mut builder = aws_sdk_s3::config::Builder::from(sdk_config).retry_config(retry);
        if let Some(endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        if let Some(limit) = config.operation_timeout {
            let timeouts = TimeoutConfig::builder().operation_timeout(limit).build();
            builder = builder.timeout_config(timeouts);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn exists(&self, path: &str) -> Result<bool> {
        let (bucket, key) = parse_s3_path(path)?;
        match self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                use aws_sdk_s3::error::SdkError;
                match &e {
                    SdkError::ServiceError(service_err)
                        if service_err.raw().status().as_u16() == 404 =>
                    {
                        Ok(false)
                    }
                    _ => Err(map_s3_error(e, path)),
                }
            }
        }
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let (bucket, key) = parse_s3_path(path)?;
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_s3_error(e, path))?;
        let body = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::io(format!("Failed to read S3 body for {path}: {e}")))?;
        Ok(body.into_bytes())
    }

    async fn write(&self, path: &str, bytes: Bytes) -> Result<()> {
        let (bucket, key) = parse_s3_path(path)?;
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| map_s3_error(e, path))?;
        debug!(path, size, "wrote artifact");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let (bucket, key_prefix) = parse_s3_path(prefix)?;
        let mut paths = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(key_prefix);
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| map_s3_error(e, prefix))?;
            for object in response.contents() {
                if let Some(key) = object.key() {
                    paths.push(format!("s3://{bucket}/{key}"));
                }
            }

            match response.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        paths.sort();
        Ok(paths)
    }
}

fn map_s3_error<E: std::fmt::Debug>(err: aws_sdk_s3::error::SdkError<E>, path: &str) -> StorageError {
    use aws_sdk_s3::error::SdkError;

    match &err {
        SdkError::ServiceError(service_err) => {
            let status = service_err.raw().status().as_u16();
            match status {
                404 => StorageError::not_found(path.to_string()),
                403 => StorageError::s3(format!("Access denied for '{path}': {err:?}")),
                _ => StorageError::s3(format!("S3 error for '{path}' (HTTP {status}): {err:?}")),
            }
        }
        SdkError::TimeoutError(_) => StorageError::io(format!("S3 timeout for '{path}': {err:?}")),
        SdkError::DispatchFailure(_) => {
            StorageError::io(format!("S3 connection error for '{path}': {err:?}"))
        }
        _ => StorageError::s3(format!("S3 error for '{path}': {err:?}")),
    }
}
