//! Delay scheduler: resumes executions whose timed pause has elapsed.
//!
//! Each due execution is resumed on its own task, bounded by a semaphore,
//! so a slow action in one workflow never holds up the others. Running
//! several schedulers against the same store is safe: the engine's
//! compare-and-swap lets exactly one of them resume a given execution.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::execution::ExecutionStatus;
use crate::executor::ExecutionEngine;

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Time between polls for due executions.
    pub poll_interval: Duration,
    /// Maximum executions being resumed at once.
    pub max_concurrency: usize,
    /// Maximum due executions fetched per poll.
    pub batch_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_concurrency: 8,
            batch_size: 100,
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }
}

/// What happened to one due execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// Resumed; carries the status it ended the advance in.
    Resumed(ExecutionStatus),
    /// Someone else got there first, or it is no longer due.
    Skipped,
    /// The resume itself errored (store trouble, invalid definition).
    Failed(String),
}

/// Tally of a single [`DelayScheduler::run_once`] pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchedulerPass {
    pub due: usize,
    pub resumed: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct DelayScheduler {
    engine: ExecutionEngine,
    config: SchedulerConfig,
    permits: Arc<Semaphore>,
}

impl DelayScheduler {
    pub fn new(engine: ExecutionEngine, config: SchedulerConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            engine,
            config,
            permits,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Resume one batch of due executions and wait for all of them.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<SchedulerPass, EngineError> {
        let due = self.due().await?;
        let mut pass = SchedulerPass {
            due: due.len(),
            ..SchedulerPass::default()
        };

        let mut tasks = JoinSet::new();
        for id in due {
            self.spawn_resume(&mut tasks, id);
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, ResumeOutcome::Resumed(_))) => pass.resumed += 1,
                Ok((_, ResumeOutcome::Skipped)) => pass.skipped += 1,
                Ok((_, ResumeOutcome::Failed(_))) => pass.failed += 1,
                Err(e) => {
                    error!(error = %e, "resume task panicked");
                    pass.failed += 1;
                }
            }
        }

        if pass.due > 0 {
            info!(due = pass.due, resumed = pass.resumed, skipped = pass.skipped, failed = pass.failed, "scheduler pass");
        }
        Ok(pass)
    }

    /// Poll until `shutdown` flips to `true` (or its sender is dropped),
    /// then wait for in-flight resumes to finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_ms = self.config.poll_interval.as_millis() as u64,
            max_concurrency = self.config.max_concurrency,
            "delay scheduler started"
        );
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tasks: JoinSet<(Uuid, ResumeOutcome)> = JoinSet::new();
        let mut in_flight: HashSet<Uuid> = HashSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.due().await {
                        Ok(due) => {
                            for id in due {
                                if in_flight.insert(id) {
                                    self.spawn_resume(&mut tasks, id);
                                }
                            }
                        }
                        Err(e) => error!(error = %e, "failed to poll for due executions"),
                    }
                }
                Some(joined) = tasks.join_next() => {
                    match joined {
                        Ok((id, outcome)) => {
                            in_flight.remove(&id);
                            debug!(execution_id = %id, ?outcome, "resume finished");
                        }
                        Err(e) => error!(error = %e, "resume task panicked"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(in_flight = tasks.len(), "delay scheduler stopping");
        while tasks.join_next().await.is_some() {}
    }

    async fn due(&self) -> Result<Vec<Uuid>, EngineError> {
        let now = self.engine.now();
        let due = self
            .engine
            .executions()
            .due_for_resume(now, self.config.batch_size)
            .await?;
        Ok(due.into_iter().map(|e| e.id).collect())
    }

    fn spawn_resume(&self, tasks: &mut JoinSet<(Uuid, ResumeOutcome)>, id: Uuid) {
        let engine = self.engine.clone();
        let permits = Arc::clone(&self.permits);
        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return (id, ResumeOutcome::Skipped);
            };
            (id, resume(&engine, id).await)
        });
    }
}

async fn resume(engine: &ExecutionEngine, id: Uuid) -> ResumeOutcome {
    match engine.resume_delay(id).await {
        Ok(execution) => ResumeOutcome::Resumed(execution.status),
        Err(
            EngineError::InvalidStateTransition { .. }
            | EngineError::NotDue { .. }
            | EngineError::Conflict(_),
        ) => {
            debug!(execution_id = %id, "execution already resumed elsewhere");
            ResumeOutcome::Skipped
        }
        Err(e) => {
            warn!(execution_id = %id, error = %e, "failed to resume execution");
            ResumeOutcome::Failed(e.to_string())
        }
    }
}
