//! Enqueue scene ids for the workers.

use tracing::info;

use crate::ack::submit_with_retry;
use crate::error::Result;
use crate::queue::{MessageQueue, SendEntry};

/// Send every non-blank id as one message, in batches of ten. Returns the
/// number of messages sent.
pub async fn push_ids<I, S>(queue: &dyn MessageQueue, ids: I, retries: u32) -> Result<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let entries: Vec<SendEntry> = ids
        .into_iter()
        .filter_map(|id| {
            let id = id.as_ref().trim();
            (!id.is_empty()).then(|| id.to_string())
        })
        .enumerate()
        .map(|(i, body)| SendEntry {
            id: i.to_string(),
            body,
        })
        .collect();

    let sent = submit_with_retry(queue, &entries, retries).await?;
    info!(queue = queue.name(), sent, "pushed ids to queue");
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryQueue;

    #[tokio::test]
    async fn test_push_skips_blank_lines() {
        let queue = MemoryQueue::new("waterbodies_ids");
        let text = "a\n\n b \nc\n";
        let sent = push_ids(&queue, text.lines(), 1).await.unwrap();
        assert_eq!(sent, 3);
        assert_eq!(queue.bodies(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_push_many_in_batches_with_retry() {
        let queue = MemoryQueue::new("waterbodies_ids");
        queue.fail_next_sends(4);
        let ids: Vec<String> = (0..25).map(|i| format!("scene-{i}")).collect();
        assert_eq!(push_ids(&queue, &ids, 2).await.unwrap(), 25);
        assert_eq!(queue.len(), 25);
    }
}
