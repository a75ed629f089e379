//! Queue-driven drill workers.
//!
//! Workers pull scene ids from a message queue, drill each scene and write
//! one artifact per `(drill, scene, date)`. Delivery is at least once;
//! the artifact existence check makes reprocessing harmless. Scenes failing
//! with a recoverable error are copied to the `<queue>_deadletter` queue.

pub mod ack;
pub mod backoff;
pub mod budget;
pub mod config;
pub mod error;
pub mod memory;
pub mod push;
pub mod queue;
#[cfg(feature = "aws")]
pub mod sqs;
pub mod worker;

pub use ack::{AckSummary, Acknowledger};
pub use backoff::Backoff;
pub use budget::{BudgetState, RetryBudget};
pub use config::WorkerConfig;
pub use error::{Result, WorkerError};
pub use memory::MemoryQueue;
pub use push::push_ids;
pub use queue::{
    dead_letter_queue_name, verify_queue_name, BatchResult, DeleteEntry, MessageQueue,
    QueueMessage, SendEntry, MAX_BATCH,
};
#[cfg(feature = "aws")]
pub use sqs::{QueueSettings, SqsConfig, SqsQueue};
pub use worker::{Outcome, QueueWorker, WorkerStats};
