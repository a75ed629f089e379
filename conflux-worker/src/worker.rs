//! The queue-driven drill loop.

use std::sync::Arc;

use conflux_core::{DrillEngine, DrillError, Plugin, PolygonSet};
use conflux_storage::{OutputStore, Replicator};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::ack::Acknowledger;
use crate::backoff::Backoff;
use crate::budget::{BudgetState, RetryBudget};
use crate::config::WorkerConfig;
use crate::error::Result;
use crate::queue::{MessageQueue, QueueMessage};

/// What happened to one scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Drilled and written to this path
    Written(String),
    /// Artifact already present for the idempotency key
    AlreadyExists,
    /// Drill kept no polygons and empty tables are not written
    SkippedEmpty,
}

/// Counters for one `run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub received: usize,
    pub written: usize,
    pub already_existed: usize,
    pub skipped_empty: usize,
    pub dead_lettered: usize,
    pub deleted: usize,
    pub empty_polls: usize,
}

impl WorkerStats {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Written(_) => self.written += 1,
            Outcome::AlreadyExists => self.already_existed += 1,
            Outcome::SkippedEmpty => self.skipped_empty += 1,
        }
    }
}

/// Pulls scene ids from a queue and drills each one.
///
/// Correctness across workers rests on the output idempotency check alone:
/// a redelivered or concurrently processed scene either finds its artifact
/// or rewrites identical bytes.
pub struct QueueWorker {
    engine: DrillEngine,
    plugin: Plugin,
    polygons: Arc<PolygonSet>,
    source: Arc<dyn MessageQueue>,
    dead_letter: Arc<dyn MessageQueue>,
    output: OutputStore,
    replicator: Option<Arc<dyn Replicator>>,
    config: WorkerConfig,
}

impl QueueWorker {
    pub fn new(
        engine: DrillEngine,
        plugin: Plugin,
        polygons: Arc<PolygonSet>,
        source: Arc<dyn MessageQueue>,
        dead_letter: Arc<dyn MessageQueue>,
        output: OutputStore,
        config: WorkerConfig,
    ) -> Self {
        Self {
            engine,
            plugin,
            polygons,
            source,
            dead_letter,
            output,
            replicator: None,
            config,
        }
    }

    /// Notify `replicator` after every written table.
    pub fn with_replicator(mut self, replicator: Arc<dyn Replicator>) -> Self {
        self.replicator = Some(replicator);
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Poll until the retry budget is exhausted.
    ///
    /// Recoverable drill failures dead-letter their message; any other error
    /// stops the worker after acknowledging what already finished.
    pub async fn run(&self) -> Result<WorkerStats> {
        let mut budget = RetryBudget::new(self.config.retry_ceiling);
        let mut backoff = Backoff::new(self.config.backoff_base, self.config.backoff_max);
        let mut stats = WorkerStats::default();

        info!(
            queue = self.source.name(),
            drill = self.plugin.product_name(),
            "worker started"
        );
        while !budget.is_exhausted() {
            let messages = self
                .source
                .receive(self.config.max_messages, self.config.visibility_timeout)
                .await?;

            match budget.record(messages.len()) {
                BudgetState::Exhausted => {
                    stats.empty_polls += 1;
                    break;
                }
                BudgetState::Idle => {
                    stats.empty_polls += 1;
                    let delay = backoff.next_delay();
                    debug!(
                        remaining = budget.remaining(),
                        delay_ms = delay.as_millis() as u64,
                        "no messages received"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                BudgetState::Draining => backoff.reset(),
            }

            stats.received += messages.len();
            self.process_batch(&messages, &mut stats).await?;
        }

        info!(queue = self.source.name(), ?stats, "retry budget exhausted, worker stopping");
        Ok(stats)
    }

    async fn process_batch(&self, messages: &[QueueMessage], stats: &mut WorkerStats) -> Result<()> {
        let mut ack = Acknowledger::new(
            self.source.as_ref(),
            self.dead_letter.as_ref(),
            self.config.ack_retries,
        );

        for (i, message) in messages.iter().enumerate() {
            let span = info_span!("message", message_id = %message.id, scene_id = %message.body);
            info!(parent: &span, "processing {}/{}", i + 1, messages.len());

            match self.process(message).instrument(span.clone()).await {
                Ok(outcome) => {
                    stats.record(&outcome);
                    ack.complete(message);
                }
                Err(err) if err.is_dead_letter() => {
                    error!(parent: &span, error = %err, "moving message to dead-letter queue");
                    ack.dead_letter(message);
                }
                Err(err) => {
                    error!(parent: &span, error = %err, "fatal error, stopping worker");
                    if let Err(ack_err) = ack.flush().await {
                        warn!(error = %ack_err, "could not acknowledge finished messages");
                    }
                    return Err(err);
                }
            }
        }

        let summary = ack.flush().await?;
        stats.deleted += summary.deleted;
        stats.dead_lettered += summary.dead_lettered;
        Ok(())
    }

    /// Drill one scene unless its artifact already exists.
    pub async fn process(&self, message: &QueueMessage) -> Result<Outcome> {
        let scene_id = message.body.trim();
        let drill = self.plugin.product_name();

        let scene = self
            .engine
            .catalog()
            .get_scene(scene_id)
            .await?
            .ok_or_else(|| DrillError::unavailable(format!("scene {scene_id} not found")))?;

        if !self.config.overwrite
            && self
                .output
                .table_exists(drill, scene_id, &scene.center_time)
                .await?
        {
            info!("artifact already exists, skipping");
            return Ok(Outcome::AlreadyExists);
        }

        let table = self
            .engine
            .drill(&self.plugin, &self.polygons, scene_id, &self.config.drill)
            .await?;

        if table.is_empty() && !self.config.write_empty {
            info!("no polygons drilled, not writing");
            return Ok(Outcome::SkippedEmpty);
        }

        let path = self.output.write_table(&table, scene_id).await?;
        if let Some(replicator) = &self.replicator {
            replicator.replicate(&table, &path).await?;
            debug!(path = %path, "replicated table");
        }
        Ok(Outcome::Written(path))
    }
}

impl std::fmt::Debug for QueueWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueWorker")
            .field("drill", &self.plugin.product_name())
            .field("source", &self.source.name())
            .field("dead_letter", &self.dead_letter.name())
            .field("output", &self.output.root())
            .finish_non_exhaustive()
    }
}

