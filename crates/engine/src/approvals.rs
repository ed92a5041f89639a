//! Approval gateway: exposes executions waiting on a human and applies
//! their decisions.

use tracing::instrument;
use uuid::Uuid;

use crate::error::EngineError;
use crate::execution::{Decision, Execution, ExecutionStatus};
use crate::executor::ExecutionEngine;

#[derive(Clone)]
pub struct ApprovalGateway {
    engine: ExecutionEngine,
}

impl ApprovalGateway {
    pub fn new(engine: ExecutionEngine) -> Self {
        Self { engine }
    }

    /// Every execution currently paused for approval, oldest first.
    pub async fn list_pending_approvals(&self) -> Result<Vec<Execution>, EngineError> {
        Ok(self
            .engine
            .executions()
            .list_by_status(ExecutionStatus::PausedApproval)
            .await?)
    }

    /// Pending approvals whose configured timeout has passed.
    ///
    /// Nothing is decided automatically; this is for surfacing stale
    /// requests to people.
    pub async fn overdue_approvals(&self) -> Result<Vec<Execution>, EngineError> {
        let now = self.engine.now();
        let mut pending = self.list_pending_approvals().await?;
        pending.retain(|e| e.pending_approval.as_ref().is_some_and(|p| p.is_overdue(now)));
        Ok(pending)
    }

    /// Apply `decision` and continue the execution down the matching
    /// branch.
    ///
    /// Fails with `InvalidStateTransition`, without touching the
    /// execution, unless it is paused for approval.
    #[instrument(skip(self))]
    pub async fn decide(
        &self,
        execution_id: Uuid,
        decision: Decision,
        approver_id: &str,
    ) -> Result<Execution, EngineError> {
        self.engine
            .resolve_approval(execution_id, decision, approver_id)
            .await
    }
}
