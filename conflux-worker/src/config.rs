use std::time::Duration;

use conflux_core::DrillOptions;
use serde::{Deserialize, Serialize};

/// Queue worker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Messages requested per receive (at most 10)
    pub max_messages: usize,
    /// How long a received message stays hidden from other workers
    pub visibility_timeout: Duration,
    /// Consecutive empty receives before the worker stops
    pub retry_ceiling: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Recompute scenes whose artifact already exists
    pub overwrite: bool,
    /// Write artifacts for drills that kept no polygons
    pub write_empty: bool,
    /// Resubmissions of unconfirmed acknowledgement entries
    pub ack_retries: u32,
    pub drill: DrillOptions,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_messages: 1,
            visibility_timeout: Duration::from_secs(18 * 60),
            retry_ceiling: 10,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(20),
            overwrite: false,
            write_empty: true,
            ack_retries: 3,
            drill: DrillOptions::default(),
        }
    }
}
