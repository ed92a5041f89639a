//! Postgres-backed stores on top of the `db` repository functions.
//!
//! Domain records are stored whole in a JSONB column; the handful of
//! fields the queries filter on are copied into indexed columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db::models::{ExecutionRow, WorkflowRow};
use db::repository::{executions as exec_repo, workflows as wf_repo};
use db::{DbError, DbPool};
use uuid::Uuid;

use super::{DefinitionStore, ExecutionStore, StoreError};
use crate::execution::{Execution, ExecutionStatus};
use crate::models::{TriggerType, WorkflowDefinition};

// ---------------------------------------------------------------------------
// Executions
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgExecutionStore {
    pool: DbPool,
}

impl PgExecutionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn to_version(v: u64) -> Result<i64, StoreError> {
    i64::try_from(v).map_err(|_| StoreError::Corrupt(format!("version {v} out of range")))
}

fn execution_row(execution: &Execution) -> Result<ExecutionRow, StoreError> {
    Ok(ExecutionRow {
        id: execution.id,
        workflow_id: execution.workflow_id,
        event_id: execution.event_id.clone(),
        status: execution.status.as_str().to_owned(),
        current_node_id: execution.current_node_id.clone(),
        pending_resume_at: execution.pending_resume_at,
        version: to_version(execution.version)?,
        state: serde_json::to_value(execution)?,
        created_at: execution.created_at,
        updated_at: execution.updated_at,
    })
}

fn from_execution_row(row: ExecutionRow) -> Result<Execution, StoreError> {
    let mut execution: Execution = serde_json::from_value(row.state)?;
    // The column is authoritative: the CAS bumps it in place.
    execution.version = u64::try_from(row.version)
        .map_err(|_| StoreError::Corrupt(format!("negative version on execution {}", row.id)))?;
    Ok(execution)
}

#[async_trait]
impl ExecutionStore for PgExecutionStore {
    async fn insert(&self, execution: &Execution) -> Result<(), StoreError> {
        let row = execution_row(execution)?;
        if exec_repo::insert_execution(&self.pool, &row).await? {
            return Ok(());
        }
        Err(StoreError::DuplicateEvent {
            workflow_id: execution.workflow_id,
            event_id: execution.event_id.clone().unwrap_or_default(),
        })
    }

    async fn get(&self, id: Uuid) -> Result<Execution, StoreError> {
        match exec_repo::get_execution(&self.pool, id).await {
            Ok(row) => from_execution_row(row),
            Err(DbError::NotFound) => Err(StoreError::ExecutionNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn compare_and_swap(
        &self,
        execution: &Execution,
        expected_version: u64,
    ) -> Result<Execution, StoreError> {
        let mut next = execution.clone();
        next.version = expected_version + 1;
        let row = execution_row(&next)?;

        if exec_repo::compare_and_swap(&self.pool, &row, to_version(expected_version)?).await? {
            return Ok(next);
        }

        match exec_repo::get_version(&self.pool, execution.id).await? {
            None => Err(StoreError::ExecutionNotFound(execution.id)),
            Some(actual) => Err(StoreError::VersionConflict {
                expected: expected_version,
                actual: u64::try_from(actual).unwrap_or_default(),
            }),
        }
    }

    async fn list_by_status(&self, status: ExecutionStatus) -> Result<Vec<Execution>, StoreError> {
        exec_repo::list_by_status(&self.pool, status.as_str())
            .await?
            .into_iter()
            .map(from_execution_row)
            .collect()
    }

    async fn due_for_resume(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Execution>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        exec_repo::list_due_delays(&self.pool, now, limit)
            .await?
            .into_iter()
            .map(from_execution_row)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgDefinitionStore {
    pool: DbPool,
}

impl PgDefinitionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn definition_row(definition: &WorkflowDefinition) -> Result<WorkflowRow, StoreError> {
    Ok(WorkflowRow {
        id: definition.id,
        name: definition.name.clone(),
        trigger_type: definition.trigger_type.as_str().to_owned(),
        status: definition.status.as_str().to_owned(),
        definition: serde_json::to_value(definition)?,
        created_at: definition.created_at,
        updated_at: definition.updated_at,
    })
}

fn from_definition_row(row: WorkflowRow) -> Result<WorkflowDefinition, StoreError> {
    Ok(serde_json::from_value(row.definition)?)
}

#[async_trait]
impl DefinitionStore for PgDefinitionStore {
    async fn get(&self, id: Uuid) -> Result<WorkflowDefinition, StoreError> {
        match wf_repo::get_workflow(&self.pool, id).await {
            Ok(row) => from_definition_row(row),
            Err(DbError::NotFound) => Err(StoreError::WorkflowNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert(&self, definition: &WorkflowDefinition) -> Result<(), StoreError> {
        if wf_repo::insert_workflow(&self.pool, &definition_row(definition)?).await? {
            return Ok(());
        }
        Err(StoreError::WorkflowExists(definition.id))
    }

    async fn put(&self, definition: &WorkflowDefinition) -> Result<(), StoreError> {
        wf_repo::upsert_workflow(&self.pool, &definition_row(definition)?).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WorkflowDefinition>, StoreError> {
        wf_repo::list_workflows(&self.pool)
            .await?
            .into_iter()
            .map(from_definition_row)
            .collect()
    }

    async fn active_for_trigger(&self, trigger_type: &TriggerType) -> Result<Vec<WorkflowDefinition>, StoreError> {
        wf_repo::list_active_by_trigger(&self.pool, trigger_type.as_str())
            .await?
            .into_iter()
            .map(from_definition_row)
            .collect()
    }
}
