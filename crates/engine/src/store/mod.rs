//! Execution State Store and Workflow Definition Store.
//!
//! These two stores are the only sources of truth. Every change to an
//! execution goes through [`ExecutionStore::compare_and_swap`], so
//! concurrent writers (scheduler replicas, approvers, cancel requests)
//! serialise per execution without any global lock.

mod memory;
mod postgres;

pub use memory::{InMemoryDefinitionStore, InMemoryExecutionStore};
pub use postgres::{PgDefinitionStore, PgExecutionStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::execution::{Execution, ExecutionStatus};
use crate::models::{TriggerType, WorkflowDefinition};

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    /// Optimistic locking failed: someone committed first.
    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("workflow already exists: {0}")]
    WorkflowExists(Uuid),

    #[error("duplicate event '{event_id}' for workflow {workflow_id}")]
    DuplicateEvent { workflow_id: Uuid, event_id: String },

    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Persisted executions.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Store a new execution.
    ///
    /// Fails with [`StoreError::DuplicateEvent`] if an execution with the
    /// same `(workflow_id, event_id)` already exists.
    async fn insert(&self, execution: &Execution) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Execution, StoreError>;

    /// Write `execution` iff the stored version is `expected_version`.
    ///
    /// Returns the stored record, whose version is `expected_version + 1`.
    async fn compare_and_swap(
        &self,
        execution: &Execution,
        expected_version: u64,
    ) -> Result<Execution, StoreError>;

    async fn list_by_status(&self, status: ExecutionStatus) -> Result<Vec<Execution>, StoreError>;

    /// Delay-paused executions whose resume time is `<= now`, earliest
    /// first, at most `limit` of them.
    async fn due_for_resume(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Execution>, StoreError>;
}

/// Persisted workflow definitions.
///
/// Authoring and validation happen outside the engine; `put` stores
/// whatever it is given.
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<WorkflowDefinition, StoreError>;

    /// Store a new definition; `WorkflowExists` if the id is taken.
    async fn insert(&self, definition: &WorkflowDefinition) -> Result<(), StoreError>;

    /// Insert or replace.
    async fn put(&self, definition: &WorkflowDefinition) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<WorkflowDefinition>, StoreError>;

    /// Active definitions bound to `trigger_type`.
    async fn active_for_trigger(&self, trigger_type: &TriggerType) -> Result<Vec<WorkflowDefinition>, StoreError>;
}
