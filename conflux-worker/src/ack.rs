//! Batched message acknowledgement.
//!
//! Dead-letter sends are flushed before source deletions so a message is
//! never removed from the source queue before its copy is safe.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{Result, WorkerError};
use crate::queue::{BatchResult, DeleteEntry, MessageQueue, QueueMessage, SendEntry, MAX_BATCH};

/// An entry that can be submitted to a queue in batches.
#[async_trait]
pub(crate) trait BatchEntry: Clone + Send + Sync + Sized {
    fn entry_id(&self) -> &str;

    async fn submit(queue: &dyn MessageQueue, batch: &[Self]) -> Result<BatchResult>;
}

#[async_trait]
impl BatchEntry for SendEntry {
    fn entry_id(&self) -> &str {
        &self.id
    }

    async fn submit(queue: &dyn MessageQueue, batch: &[Self]) -> Result<BatchResult> {
        queue.send_batch(batch).await
    }
}

#[async_trait]
impl BatchEntry for DeleteEntry {
    fn entry_id(&self) -> &str {
        &self.id
    }

    async fn submit(queue: &dyn MessageQueue, batch: &[Self]) -> Result<BatchResult> {
        queue.delete_batch(batch).await
    }
}

/// Submit `entries` in chunks of [`MAX_BATCH`], resubmitting the entries a
/// call did not confirm up to `retries` more times.
pub(crate) async fn submit_with_retry<E: BatchEntry>(
    queue: &dyn MessageQueue,
    entries: &[E],
    retries: u32,
) -> Result<usize> {
    let mut done = 0;
    for chunk in entries.chunks(MAX_BATCH) {
        let mut pending = chunk.to_vec();
        let mut attempt = 0;
        while !pending.is_empty() {
            let result = E::submit(queue, &pending).await?;
            done += result.successful.len();
            pending.retain(|e| !result.successful.iter().any(|id| id == e.entry_id()));
            if pending.is_empty() {
                break;
            }
            if attempt >= retries {
                return Err(WorkerError::Unacknowledged {
                    queue: queue.name().to_string(),
                    ids: pending.iter().map(|e| e.entry_id().to_string()).collect(),
                });
            }
            attempt += 1;
            warn!(
                queue = queue.name(),
                unconfirmed = pending.len(),
                attempt,
                "retrying batch entries"
            );
        }
    }
    Ok(done)
}

/// Counts from one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckSummary {
    pub dead_lettered: usize,
    pub deleted: usize,
}

/// Collects the fate of each processed message and applies it in batches.
#[derive(Debug)]
pub struct Acknowledger<'a> {
    source: &'a dyn MessageQueue,
    dead_letter: &'a dyn MessageQueue,
    retries: u32,
    sends: Vec<SendEntry>,
    deletes: Vec<DeleteEntry>,
}

impl<'a> Acknowledger<'a> {
    pub fn new(source: &'a dyn MessageQueue, dead_letter: &'a dyn MessageQueue, retries: u32) -> Self {
        Self {
            source,
            dead_letter,
            retries,
            sends: Vec::new(),
            deletes: Vec::new(),
        }
    }

    /// Processing finished; remove the message from the source queue.
    pub fn complete(&mut self, message: &QueueMessage) {
        self.deletes.push(DeleteEntry::from(message));
    }

    /// Processing failed recoverably; copy the body to the dead-letter queue
    /// and remove it from the source queue.
    pub fn dead_letter(&mut self, message: &QueueMessage) {
        self.sends.push(SendEntry {
            id: message.id.clone(),
            body: message.body.clone(),
        });
        self.deletes.push(DeleteEntry::from(message));
    }

    pub fn pending(&self) -> usize {
        self.deletes.len()
    }

    /// Apply every pending acknowledgement.
    ///
    /// Anything left unconfirmed after the retries fails with
    /// [`WorkerError::Unacknowledged`]; dead-letter copies that did go out
    /// keep their source message, which then redelivers.
    pub async fn flush(&mut self) -> Result<AckSummary> {
        let sends = std::mem::take(&mut self.sends);
        let deletes = std::mem::take(&mut self.deletes);

        let dead_lettered = submit_with_retry(self.dead_letter, &sends, self.retries).await?;
        let deleted = submit_with_retry(self.source, &deletes, self.retries).await?;
        debug!(dead_lettered, deleted, "acknowledged messages");
        Ok(AckSummary {
            dead_lettered,
            deleted,
        })
    }
}
