//! Message queue contract.
//!
//! At-least-once and unordered. A received message stays invisible to other
//! receivers for the visibility timeout, then becomes deliverable again
//! unless it was deleted with its current receipt.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, WorkerError};

/// Largest batch a single send, receive or delete call accepts.
pub const MAX_BATCH: usize = 10;

/// One delivery of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    /// Handle for this delivery; a redelivery gets a new one.
    pub receipt: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendEntry {
    /// Batch-local entry id
    pub id: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteEntry {
    pub id: String,
    pub receipt: String,
}

impl From<&QueueMessage> for DeleteEntry {
    fn from(msg: &QueueMessage) -> Self {
        Self {
            id: msg.id.clone(),
            receipt: msg.receipt.clone(),
        }
    }
}

/// Per-entry outcome of a batch call, by entry id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub successful: Vec<String>,
    pub failed: Vec<String>,
}

#[async_trait]
pub trait MessageQueue: Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Receive up to `max` (at most [`MAX_BATCH`]) visible messages.
    async fn receive(&self, max: usize, visibility_timeout: Duration) -> Result<Vec<QueueMessage>>;

    async fn send_batch(&self, entries: &[SendEntry]) -> Result<BatchResult>;

    async fn delete_batch(&self, entries: &[DeleteEntry]) -> Result<BatchResult>;
}

/// Name of the dead-letter queue paired with `name`.
pub fn dead_letter_queue_name(name: &str) -> String {
    format!("{name}_deadletter")
}

/// Check a queue name against SQS naming rules, leaving room for the
/// dead-letter suffix.
pub fn verify_queue_name(name: &str) -> Result<()> {
    let limit = 80 - "_deadletter".len();
    if name.is_empty() || name.len() > limit {
        return Err(WorkerError::invalid_config(format!(
            "queue name '{name}' must be 1-{limit} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(WorkerError::invalid_config(format!(
            "queue name '{name}' may only contain letters, digits, '-' and '_'"
        )));
    }
    Ok(())
}

pub(crate) fn check_batch_len(len: usize) -> Result<()> {
    if len > MAX_BATCH {
        return Err(WorkerError::invalid_config(format!(
            "batch of {len} entries exceeds the limit of {MAX_BATCH}"
        )));
    }
    Ok(())
}
