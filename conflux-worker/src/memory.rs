//! In-memory queue with visibility timeouts on the tokio clock.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::Result;
use crate::queue::{
    check_batch_len, BatchResult, DeleteEntry, MessageQueue, QueueMessage, SendEntry, MAX_BATCH,
};

#[derive(Debug)]
struct Stored {
    id: String,
    body: String,
    receipt: Option<String>,
    visible_at: Instant,
    receives: u32,
}

#[derive(Debug, Default)]
struct Inner {
    messages: Vec<Stored>,
    next_id: u64,
    failing_sends: usize,
    failing_deletes: usize,
}

/// Queue held in memory; time-based behaviour follows `tokio::time`, so
/// tests can drive it with a paused clock.
#[derive(Debug)]
pub struct MemoryQueue {
    name: String,
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Enqueue one message body, returning its id.
    pub fn push(&self, body: impl Into<String>) -> String {
        let mut inner = self.inner.lock();
        push_locked(&mut inner, body.into())
    }

    /// Messages in the queue, in flight or not.
    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bodies of every stored message, in enqueue order.
    pub fn bodies(&self) -> Vec<String> {
        self.inner
            .lock()
            .messages
            .iter()
            .map(|m| m.body.clone())
            .collect()
    }

    /// How many times the message with `body` has been received.
    pub fn receive_count(&self, body: &str) -> Option<u32> {
        self.inner
            .lock()
            .messages
            .iter()
            .find(|m| m.body == body)
            .map(|m| m.receives)
    }

    /// Fail the next `n` send entries.
    pub fn fail_next_sends(&self, n: usize) {
        self.inner.lock().failing_sends = n;
    }

    /// Fail the next `n` delete entries.
    pub fn fail_next_deletes(&self, n: usize) {
        self.inner.lock().failing_deletes = n;
    }
}

fn push_locked(inner: &mut Inner, body: String) -> String {
    inner.next_id += 1;
    let id = format!("msg-{}", inner.next_id);
    inner.messages.push(Stored {
        id: id.clone(),
        body,
        receipt: None,
        visible_at: Instant::now(),
        receives: 0,
    });
    id
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn receive(&self, max: usize, visibility_timeout: Duration) -> Result<Vec<QueueMessage>> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let mut out = Vec::new();
        for msg in inner.messages.iter_mut() {
            if out.len() >= max.min(MAX_BATCH) {
                break;
            }
            if msg.visible_at > now {
                continue;
            }
            msg.receives += 1;
            let receipt = format!("{}#{}", msg.id, msg.receives);
            msg.receipt = Some(receipt.clone());
            msg.visible_at = now + visibility_timeout;
            out.push(QueueMessage {
                id: msg.id.clone(),
                receipt,
                body: msg.body.clone(),
            });
        }
        Ok(out)
    }

    async fn send_batch(&self, entries: &[SendEntry]) -> Result<BatchResult> {
        check_batch_len(entries.len())?;
        let mut inner = self.inner.lock();
        let mut result = BatchResult::default();
        for entry in entries {
            if inner.failing_sends > 0 {
                inner.failing_sends -= 1;
                result.failed.push(entry.id.clone());
                continue;
            }
            push_locked(&mut inner, entry.body.clone());
            result.successful.push(entry.id.clone());
        }
        Ok(result)
    }

    async fn delete_batch(&self, entries: &[DeleteEntry]) -> Result<BatchResult> {
        check_batch_len(entries.len())?;
        let mut inner = self.inner.lock();
        let mut result = BatchResult::default();
        for entry in entries {
            if inner.failing_deletes > 0 {
                inner.failing_deletes -= 1;
                result.failed.push(entry.id.clone());
                continue;
            }
            let pos = inner
                .messages
                .iter()
                .position(|m| m.receipt.as_deref() == Some(entry.receipt.as_str()));
            match pos {
                Some(pos) => {
                    inner.messages.remove(pos);
                    result.successful.push(entry.id.clone());
                }
                // stale receipt from an earlier delivery
                None => result.failed.push(entry.id.clone()),
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_visibility_timeout_redelivers() {
        let queue = MemoryQueue::new("q");
        queue.push("scene-1");

        let first = queue.receive(10, Duration::from_secs(60)).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(queue.receive(10, Duration::from_secs(60)).await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(61)).await;
        let second = queue.receive(10, Duration::from_secs(60)).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_ne!(first[0].receipt, second[0].receipt);
        assert_eq!(queue.receive_count("scene-1"), Some(2));

        // The first delivery's receipt no longer deletes the message.
        let stale = queue.delete_batch(&[DeleteEntry::from(&first[0])]).await.unwrap();
        assert_eq!(stale.failed, vec![first[0].id.clone()]);
        let ok = queue.delete_batch(&[DeleteEntry::from(&second[0])]).await.unwrap();
        assert_eq!(ok.successful.len(), 1);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_receive_caps_at_batch_limit() {
        let queue = MemoryQueue::new("q");
        for i in 0..15 {
            queue.push(format!("scene-{i}"));
        }
        let got = queue.receive(50, Duration::from_secs(60)).await.unwrap();
        assert_eq!(got.len(), MAX_BATCH);
    }

    #[tokio::test]
    async fn test_injected_send_failures() {
        let queue = MemoryQueue::new("q");
        queue.fail_next_sends(1);
        let entries: Vec<SendEntry> = (0..3)
            .map(|i| SendEntry {
                id: i.to_string(),
                body: format!("b{i}"),
            })
            .collect();
        let result = queue.send_batch(&entries).await.unwrap();
        assert_eq!(result.failed, vec!["0".to_string()]);
        assert_eq!(result.successful.len(), 2);
        assert_eq!(queue.bodies(), vec!["b1".to_string(), "b2".to_string()]);
    }
}
