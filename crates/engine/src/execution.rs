//! Execution state: one running, paused or finished instance of a workflow.
//!
//! An `Execution` is plain data. It is created by the trigger dispatcher,
//! changed only through version-guarded commits made by the engine, and
//! never deleted.

use std::fmt;
use std::str::FromStr;

use actions::JsonMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::BranchLabel;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    PausedDelay,
    PausedApproval,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::PausedDelay => "paused_delay",
            Self::PausedApproval => "paused_approval",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Completed, failed and cancelled executions never change again
    /// (apart from audit-only history appends).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::PausedDelay | Self::PausedApproval)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "paused_delay" => Ok(Self::PausedDelay),
            "paused_approval" => Ok(Self::PausedApproval),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// What happened when a node was entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Triggered,
    Branched { result: bool },
    ActionSucceeded { action_type: String },
    ActionFailed { action_type: String, error: String },
    DelayScheduled { resume_at: DateTime<Utc> },
    DelayUnschedulable { error: String },
    ApprovalRequested,
    CycleDetected { visits: usize },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub node_id: String,
    pub entered_at: DateTime<Utc>,
    pub outcome: Outcome,
}

// ---------------------------------------------------------------------------
// Approvals & failures
// ---------------------------------------------------------------------------

/// Data shown to the approver while an execution waits on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub paused_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_hours: Option<u32>,
}

impl PendingApproval {
    /// Whether the configured timeout has passed. Purely informational.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.timeout_hours
            .is_some_and(|h| now >= self.paused_at + chrono::Duration::hours(i64::from(h)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    /// The approval-node edge this decision follows.
    pub fn branch(&self) -> BranchLabel {
        match self {
            Self::Approved => BranchLabel::Approved,
            Self::Rejected => BranchLabel::Rejected,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        })
    }
}

impl FromStr for Decision {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown decision: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub execution_id: Uuid,
    /// The approval node the decision was made on.
    pub node_id: String,
    pub decision: Decision,
    pub approver_id: String,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CycleDetected,
    AdapterError,
    /// The resume time of a delay is not representable.
    InvalidDelay,
}

/// Where and why an execution failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    pub node_id: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// ID of the domain event that started this execution, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub status: ExecutionStatus,
    pub current_node_id: String,
    /// `{"payload": <event payload>, "<action node id>": <output>, …}`
    pub context: JsonMap,
    pub history: Vec<HistoryEntry>,
    /// Set iff `status == PausedDelay`.
    pub pending_resume_at: Option<DateTime<Utc>>,
    /// Set iff `status == PausedApproval`.
    pub pending_approval: Option<PendingApproval>,
    #[serde(default)]
    pub decisions: Vec<ApprovalDecision>,
    #[serde(default)]
    pub failure: Option<ExecutionFailure>,
    /// Bumped by every committed change; used for compare-and-swap.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Execution {
    /// A fresh execution positioned on the trigger node.
    pub fn new(
        workflow_id: Uuid,
        trigger_node_id: impl Into<String>,
        payload: Value,
        event_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut context = JsonMap::new();
        context.insert("payload".into(), payload);
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            event_id,
            status: ExecutionStatus::Running,
            current_node_id: trigger_node_id.into(),
            context,
            history: Vec::new(),
            pending_resume_at: None,
            pending_approval: None,
            decisions: Vec::new(),
            failure: None,
            version: 0,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn record(&mut self, node_id: &str, outcome: Outcome, at: DateTime<Utc>) {
        self.history.push(HistoryEntry {
            node_id: node_id.to_owned(),
            entered_at: at,
            outcome,
        });
    }

    pub(crate) fn finish(&mut self, status: ExecutionStatus, at: DateTime<Utc>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.pending_resume_at = None;
        self.pending_approval = None;
        self.finished_at = Some(at);
    }

    pub(crate) fn fail(&mut self, kind: FailureKind, node_id: &str, message: String, at: DateTime<Utc>) {
        self.failure = Some(ExecutionFailure {
            kind,
            node_id: node_id.to_owned(),
            message,
            at,
        });
        self.finish(ExecutionStatus::Failed, at);
    }

    /// Pause fields are present exactly when the status calls for them.
    pub fn pause_fields_consistent(&self) -> bool {
        (self.pending_resume_at.is_some() == (self.status == ExecutionStatus::PausedDelay))
            && (self.pending_approval.is_some() == (self.status == ExecutionStatus::PausedApproval))
    }

    /// Node ids in history order.
    pub fn visited(&self) -> Vec<&str> {
        self.history.iter().map(|h| h.node_id.as_str()).collect()
    }
}
