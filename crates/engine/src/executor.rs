//! Workflow execution engine.
//!
//! `ExecutionEngine` is the central interpreter:
//! 1. Resolves the execution's current node and dispatches by node type.
//! 2. Commits every step with a compare-and-swap on `version`; a lost swap
//!    means someone else moved the execution, so the step is discarded.
//! 3. Stops at a pause point (delay, approval) or a terminal status.
//! 4. Contains action failures: they fail the execution, never the caller.
//!
//! The engine holds no lock while an adapter call is in flight, so a slow
//! integration only ever delays its own execution.

use std::sync::Arc;
use std::time::Duration;

use actions::{ActionAdapter, ActionOutput, AdapterError, JsonMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::EngineError;
use crate::execution::{ApprovalDecision, Decision, Execution, ExecutionStatus, FailureKind, Outcome, PendingApproval};
use crate::graph::WorkflowGraph;
use crate::models::{BranchLabel, NodeConfig};
use crate::store::{DefinitionStore, ExecutionStore, StoreError};
use crate::template;

/// How many times `cancel` re-reads and retries after losing a race.
const CANCEL_ATTEMPTS: usize = 3;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// A single `advance` may visit at most `max_visits_per_node × node
    /// count` nodes before the execution fails with `CycleDetected`.
    pub max_visits_per_node: usize,
    /// Upper bound on one adapter call. `None` trusts the adapter.
    pub action_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_visits_per_node: 2,
            action_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl EngineConfig {
    pub fn with_max_visits_per_node(mut self, visits: usize) -> Self {
        self.max_visits_per_node = visits.max(1);
        self
    }

    pub fn with_action_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.action_timeout = timeout;
        self
    }
}

enum Commit {
    Saved(Execution),
    /// The CAS lost; carries the execution as it is now stored.
    Superseded(Execution),
}

// ---------------------------------------------------------------------------
// ExecutionEngine
// ---------------------------------------------------------------------------

/// Interprets workflow graphs against persisted executions.
///
/// Cheap to clone; every clone shares the same stores and adapter.
#[derive(Clone)]
pub struct ExecutionEngine {
    executions: Arc<dyn ExecutionStore>,
    definitions: Arc<dyn DefinitionStore>,
    adapter: Arc<dyn ActionAdapter>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl ExecutionEngine {
    pub fn new(
        executions: Arc<dyn ExecutionStore>,
        definitions: Arc<dyn DefinitionStore>,
        adapter: Arc<dyn ActionAdapter>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            executions,
            definitions,
            adapter,
            clock,
            config,
        }
    }

    pub fn executions(&self) -> &Arc<dyn ExecutionStore> {
        &self.executions
    }

    pub fn definitions(&self) -> &Arc<dyn DefinitionStore> {
        &self.definitions
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn get(&self, execution_id: Uuid) -> Result<Execution, EngineError> {
        Ok(self.executions.get(execution_id).await?)
    }

    /// Create a running execution positioned on the workflow's trigger
    /// node. Nothing is interpreted until [`advance`](Self::advance).
    #[instrument(skip(self, payload))]
    pub async fn create_execution(
        &self,
        workflow_id: Uuid,
        payload: Value,
        event_id: Option<String>,
    ) -> Result<Execution, EngineError> {
        let definition = self.definitions.get(workflow_id).await?;
        let graph = WorkflowGraph::build(&definition)?;
        let execution = Execution::new(workflow_id, graph.trigger_id(), payload, event_id, self.clock.now());
        self.executions.insert(&execution).await?;
        info!(execution_id = %execution.id, "execution created");
        Ok(execution)
    }

    /// [`create_execution`](Self::create_execution) followed by
    /// [`advance`](Self::advance).
    pub async fn start(
        &self,
        workflow_id: Uuid,
        payload: Value,
        event_id: Option<String>,
    ) -> Result<Execution, EngineError> {
        let created = self.create_execution(workflow_id, payload, event_id).await?;
        self.advance(created.id).await
    }

    /// Run the execution until it pauses or finishes.
    ///
    /// A paused execution is returned untouched. A terminal one is an
    /// `InvalidStateTransition`.
    #[instrument(skip(self))]
    pub async fn advance(&self, execution_id: Uuid) -> Result<Execution, EngineError> {
        let mut current = self.executions.get(execution_id).await?;
        if current.is_terminal() {
            return Err(EngineError::invalid_state(execution_id, current.status, "advance"));
        }
        if current.status.is_paused() {
            debug!(status = %current.status, "execution is paused; nothing to advance");
            return Ok(current);
        }

        let definition = self.definitions.get(current.workflow_id).await?;
        let graph = WorkflowGraph::build(&definition)?;
        let max_visits = graph.node_count() * self.config.max_visits_per_node.max(1);
        let mut visits = 0usize;

        while current.status == ExecutionStatus::Running {
            let mut next = current.clone();
            if visits >= max_visits {
                let now = self.clock.now();
                let node_id = next.current_node_id.clone();
                warn!(node_id = %node_id, visits, "visit bound exceeded; failing execution");
                next.record(&node_id, Outcome::CycleDetected { visits }, now);
                next.fail(
                    FailureKind::CycleDetected,
                    &node_id,
                    format!("more than {max_visits} node visits in a single advance"),
                    now,
                );
            } else {
                visits += 1;
                self.step(&graph, &mut next).await?;
            }
            next.updated_at = self.clock.now();

            match self.commit(next, current.version).await? {
                Commit::Saved(saved) => current = saved,
                Commit::Superseded(latest) => return Ok(latest),
            }
        }

        info!(status = %current.status, node_id = %current.current_node_id, "advance finished");
        Ok(current)
    }

    /// Scheduler entry point: leave an elapsed delay and continue.
    #[instrument(skip(self))]
    pub async fn resume_delay(&self, execution_id: Uuid) -> Result<Execution, EngineError> {
        let current = self.executions.get(execution_id).await?;
        if current.status != ExecutionStatus::PausedDelay {
            return Err(EngineError::invalid_state(execution_id, current.status, "resume"));
        }
        let now = self.clock.now();
        if let Some(resume_at) = current.pending_resume_at.filter(|at| *at > now) {
            return Err(EngineError::NotDue { execution_id, resume_at });
        }

        let definition = self.definitions.get(current.workflow_id).await?;
        let graph = WorkflowGraph::build(&definition)?;
        let delay_node = graph.node(&current.current_node_id).ok_or_else(|| missing_node(&current))?;

        let mut next = current.clone();
        next.status = ExecutionStatus::Running;
        next.pending_resume_at = None;
        next.updated_at = now;
        follow(&mut next, graph.next(&delay_node.id), now);
        debug!(node_id = %delay_node.id, "delay elapsed");

        match self.commit(next, current.version).await? {
            Commit::Saved(saved) if saved.status == ExecutionStatus::Running => self.advance(saved.id).await,
            Commit::Saved(saved) => Ok(saved),
            Commit::Superseded(_) => Err(EngineError::Conflict(execution_id)),
        }
    }

    /// Gateway entry point: record a human decision and continue down the
    /// matching branch of the approval node.
    #[instrument(skip(self))]
    pub async fn resolve_approval(
        &self,
        execution_id: Uuid,
        decision: Decision,
        approver_id: &str,
    ) -> Result<Execution, EngineError> {
        let current = self.executions.get(execution_id).await?;
        if current.status != ExecutionStatus::PausedApproval {
            return Err(EngineError::invalid_state(execution_id, current.status, "decide"));
        }

        let definition = self.definitions.get(current.workflow_id).await?;
        let graph = WorkflowGraph::build(&definition)?;
        let approval_node = graph.node(&current.current_node_id).ok_or_else(|| missing_node(&current))?;
        let now = self.clock.now();

        let mut next = current.clone();
        next.decisions.push(ApprovalDecision {
            execution_id,
            node_id: approval_node.id.clone(),
            decision,
            approver_id: approver_id.to_owned(),
            decided_at: now,
        });
        next.status = ExecutionStatus::Running;
        next.pending_approval = None;
        next.updated_at = now;
        follow(&mut next, graph.branch_target(&approval_node.id, decision.branch()), now);
        info!(%decision, approver_id, node_id = %approval_node.id, "approval decided");

        match self.commit(next, current.version).await? {
            Commit::Saved(saved) if saved.status == ExecutionStatus::Running => self.advance(saved.id).await,
            Commit::Saved(saved) => Ok(saved),
            Commit::Superseded(latest) if latest.status != ExecutionStatus::PausedApproval => Err(
                EngineError::invalid_state(execution_id, latest.status, "decide"),
            ),
            Commit::Superseded(_) => Err(EngineError::Conflict(execution_id)),
        }
    }

    /// Move a non-terminal execution to `cancelled`.
    ///
    /// Any advance still in flight loses its next compare-and-swap and
    /// discards its work.
    #[instrument(skip(self))]
    pub async fn cancel(&self, execution_id: Uuid) -> Result<Execution, EngineError> {
        for attempt in 1..=CANCEL_ATTEMPTS {
            let current = self.executions.get(execution_id).await?;
            if current.is_terminal() {
                return Err(EngineError::invalid_state(execution_id, current.status, "cancel"));
            }

            let now = self.clock.now();
            let mut next = current.clone();
            let node_id = next.current_node_id.clone();
            next.record(&node_id, Outcome::Cancelled, now);
            next.finish(ExecutionStatus::Cancelled, now);
            next.updated_at = now;

            match self.commit(next, current.version).await? {
                Commit::Saved(saved) => {
                    info!(node_id = %node_id, "execution cancelled");
                    return Ok(saved);
                }
                Commit::Superseded(_) => debug!(attempt, "cancel raced another writer; retrying"),
            }
        }
        Err(EngineError::Conflict(execution_id))
    }

    // -----------------------------------------------------------------------
    // Internal: interpret one node.
    // -----------------------------------------------------------------------

    async fn step(&self, graph: &WorkflowGraph<'_>, execution: &mut Execution) -> Result<(), EngineError> {
        let now = self.clock.now();
        let node = graph
            .node(&execution.current_node_id)
            .ok_or_else(|| missing_node(execution))?;
        let node_id = node.id.as_str();

        match &node.config {
            NodeConfig::Trigger(_) => {
                execution.record(node_id, Outcome::Triggered, now);
                follow(execution, graph.next(node_id), now);
            }

            NodeConfig::Condition(_) => {
                let result = graph
                    .condition(node_id)
                    .is_some_and(|c| c.evaluate(&execution.context));
                debug!(node_id, result, "condition evaluated");
                execution.record(node_id, Outcome::Branched { result }, now);
                follow(execution, graph.branch_target(node_id, BranchLabel::from(result)), now);
            }

            NodeConfig::Action(cfg) => {
                let params = template::render_map(&cfg.params, &execution.context);
                match self.call_adapter(&cfg.action_type, &params, &execution.context).await {
                    Ok(out) => {
                        debug!(node_id, action_type = %cfg.action_type, "action succeeded");
                        execution.context.insert(node_id.to_owned(), Value::Object(out.output));
                        execution.record(
                            node_id,
                            Outcome::ActionSucceeded {
                                action_type: cfg.action_type.clone(),
                            },
                            now,
                        );
                        follow(execution, graph.next(node_id), now);
                    }
                    Err(err) => {
                        warn!(node_id, action_type = %cfg.action_type, error = %err, "action failed");
                        let message = err.to_string();
                        execution.record(
                            node_id,
                            Outcome::ActionFailed {
                                action_type: cfg.action_type.clone(),
                                error: message.clone(),
                            },
                            now,
                        );
                        execution.fail(FailureKind::AdapterError, node_id, message, self.clock.now());
                    }
                }
            }

            NodeConfig::Delay(cfg) => {
                let Some(resume_at) = now.checked_add_signed(cfg.duration()) else {
                    let message = format!("resume time {now} + {} is out of range", cfg.duration());
                    warn!(node_id, %message, "cannot schedule delay");
                    execution.record(node_id, Outcome::DelayUnschedulable { error: message.clone() }, now);
                    execution.fail(FailureKind::InvalidDelay, node_id, message, now);
                    return Ok(());
                };
                execution.status = ExecutionStatus::PausedDelay;
                execution.pending_resume_at = Some(resume_at);
                execution.record(node_id, Outcome::DelayScheduled { resume_at }, now);
                info!(node_id, %resume_at, "paused for delay");
            }

            NodeConfig::Approval(cfg) => {
                execution.status = ExecutionStatus::PausedApproval;
                execution.pending_approval = Some(PendingApproval {
                    message: template::interpolate(&cfg.message, &execution.context),
                    details: cfg
                        .details
                        .as_deref()
                        .map(|d| template::interpolate(d, &execution.context)),
                    paused_at: now,
                    timeout_hours: cfg.timeout_hours,
                });
                execution.record(node_id, Outcome::ApprovalRequested, now);
                info!(node_id, "paused for approval");
            }
        }

        Ok(())
    }

    async fn call_adapter(
        &self,
        action_type: &str,
        params: &JsonMap,
        context: &JsonMap,
    ) -> Result<ActionOutput, AdapterError> {
        let call = self.adapter.execute(action_type, params, context);
        let Some(limit) = self.config.action_timeout else {
            return call.await;
        };
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::TimedOut {
                action_type: action_type.to_owned(),
                after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    async fn commit(&self, next: Execution, expected_version: u64) -> Result<Commit, EngineError> {
        match self.executions.compare_and_swap(&next, expected_version).await {
            Ok(saved) => Ok(Commit::Saved(saved)),
            Err(StoreError::VersionConflict { expected, actual }) => {
                debug!(execution_id = %next.id, expected, actual, "lost compare-and-swap; discarding step");
                Ok(Commit::Superseded(self.executions.get(next.id).await?))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Move to `target`, or complete when there is nowhere to go.
fn follow(execution: &mut Execution, target: Option<&str>, now: DateTime<Utc>) {
    match target {
        Some(next) => execution.current_node_id = next.to_owned(),
        None => execution.finish(ExecutionStatus::Completed, now),
    }
}

fn missing_node(execution: &Execution) -> EngineError {
    EngineError::NotFound {
        entity: "node",
        id: execution.current_node_id.clone(),
    }
}
