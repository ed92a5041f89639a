//! Trigger dispatcher: turns domain events into executions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, instrument};

use crate::error::EngineError;
use crate::execution::Execution;
use crate::executor::ExecutionEngine;
use crate::models::TriggerType;

/// A domain event such as `client_created` or `invoice_overdue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    #[serde(rename = "type")]
    pub event_type: TriggerType,
    #[serde(default)]
    pub payload: Value,
    pub event_id: String,
}

impl DomainEvent {
    pub fn new(event_type: impl Into<TriggerType>, payload: Value, event_id: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            event_id: event_id.into(),
        }
    }
}

#[derive(Clone)]
pub struct TriggerDispatcher {
    engine: ExecutionEngine,
}

impl TriggerDispatcher {
    pub fn new(engine: ExecutionEngine) -> Self {
        Self { engine }
    }

    /// Start one execution per active definition bound to the event's type
    /// and advance each until it pauses or finishes.
    ///
    /// A redelivered event (same `event_id`) does not start a second
    /// execution of the same workflow. A failure on one definition is
    /// logged and does not stop the others.
    ///
    /// If the first `advance` fails after the execution was stored, the
    /// execution stays `running` on its trigger and is still returned. A
    /// redelivered event will not retry it (the event id is already taken),
    /// so recovery is an explicit [`ExecutionEngine::advance`] on its id,
    /// exposed as `POST /api/v1/executions/{id}/advance`.
    #[instrument(skip(self, event), fields(event_type = %event.event_type, event_id = %event.event_id))]
    pub async fn dispatch(&self, event: &DomainEvent) -> Result<Vec<Execution>, EngineError> {
        let definitions = self
            .engine
            .definitions()
            .active_for_trigger(&event.event_type)
            .await?;

        let mut started = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let created = match self
                .engine
                .create_execution(definition.id, event.payload.clone(), Some(event.event_id.clone()))
                .await
            {
                Ok(created) => created,
                Err(EngineError::DuplicateEvent { workflow_id, .. }) => {
                    info!(%workflow_id, "event already dispatched to workflow; skipping");
                    continue;
                }
                Err(e) => {
                    error!(workflow_id = %definition.id, error = %e, "failed to start execution");
                    continue;
                }
            };

            match self.engine.advance(created.id).await {
                Ok(execution) => started.push(execution),
                Err(e) => {
                    error!(
                        execution_id = %created.id,
                        workflow_id = %definition.id,
                        error = %e,
                        "execution created but advance failed; it stays running until advanced explicitly"
                    );
                    started.push(self.engine.get(created.id).await.unwrap_or(created));
                }
            }
        }

        info!(started = started.len(), "event dispatched");
        Ok(started)
    }
}
