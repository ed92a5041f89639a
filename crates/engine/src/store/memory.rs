//! In-memory stores.
//!
//! Same semantics as the Postgres stores; used by tests and by single
//! process deployments that can live without durability.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{DefinitionStore, ExecutionStore, StoreError};
use crate::execution::{Execution, ExecutionStatus};
use crate::models::{TriggerType, WorkflowDefinition};

#[derive(Default)]
struct Executions {
    by_id: HashMap<Uuid, Execution>,
    event_keys: HashSet<(Uuid, String)>,
}

/// In-memory implementation of [`ExecutionStore`].
#[derive(Default)]
pub struct InMemoryExecutionStore {
    inner: RwLock<Executions>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored executions.
    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored execution.
    pub fn all(&self) -> Vec<Execution> {
        self.inner.read().by_id.values().cloned().collect()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn insert(&self, execution: &Execution) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if let Some(event_id) = &execution.event_id {
            let key = (execution.workflow_id, event_id.clone());
            if !inner.event_keys.insert(key) {
                return Err(StoreError::DuplicateEvent {
                    workflow_id: execution.workflow_id,
                    event_id: event_id.clone(),
                });
            }
        }
        inner.by_id.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Execution, StoreError> {
        self.inner
            .read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or(StoreError::ExecutionNotFound(id))
    }

    async fn compare_and_swap(
        &self,
        execution: &Execution,
        expected_version: u64,
    ) -> Result<Execution, StoreError> {
        let mut inner = self.inner.write();
        let stored = inner
            .by_id
            .get_mut(&execution.id)
            .ok_or(StoreError::ExecutionNotFound(execution.id))?;

        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual: stored.version,
            });
        }

        let mut next = execution.clone();
        next.version = expected_version + 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn list_by_status(&self, status: ExecutionStatus) -> Result<Vec<Execution>, StoreError> {
        let mut found: Vec<Execution> = self
            .inner
            .read()
            .by_id
            .values()
            .filter(|e| e.status == status)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.created_at);
        Ok(found)
    }

    async fn due_for_resume(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Execution>, StoreError> {
        let mut due: Vec<Execution> = self
            .inner
            .read()
            .by_id
            .values()
            .filter(|e| {
                e.status == ExecutionStatus::PausedDelay
                    && e.pending_resume_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|e| e.pending_resume_at);
        due.truncate(limit);
        Ok(due)
    }
}

/// In-memory implementation of [`DefinitionStore`].
#[derive(Default)]
pub struct InMemoryDefinitionStore {
    definitions: RwLock<HashMap<Uuid, WorkflowDefinition>>,
}

impl InMemoryDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-loaded with `definitions`.
    pub fn with_definitions(definitions: impl IntoIterator<Item = WorkflowDefinition>) -> Self {
        let store = Self::new();
        {
            let mut map = store.definitions.write();
            for def in definitions {
                map.insert(def.id, def);
            }
        }
        store
    }
}

#[async_trait]
impl DefinitionStore for InMemoryDefinitionStore {
    async fn get(&self, id: Uuid) -> Result<WorkflowDefinition, StoreError> {
        self.definitions
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::WorkflowNotFound(id))
    }

    async fn insert(&self, definition: &WorkflowDefinition) -> Result<(), StoreError> {
        let mut definitions = self.definitions.write();
        if definitions.contains_key(&definition.id) {
            return Err(StoreError::WorkflowExists(definition.id));
        }
        definitions.insert(definition.id, definition.clone());
        Ok(())
    }

    async fn put(&self, definition: &WorkflowDefinition) -> Result<(), StoreError> {
        self.definitions.write().insert(definition.id, definition.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WorkflowDefinition>, StoreError> {
        let mut all: Vec<WorkflowDefinition> = self.definitions.read().values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn active_for_trigger(&self, trigger_type: &TriggerType) -> Result<Vec<WorkflowDefinition>, StoreError> {
        let mut matching: Vec<WorkflowDefinition> = self
            .definitions
            .read()
            .values()
            .filter(|d| d.is_active() && &d.trigger_type == trigger_type)
            .cloned()
            .collect();
        matching.sort_by_key(|d| d.created_at);
        Ok(matching)
    }
}
