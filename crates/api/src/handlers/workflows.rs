use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use engine::models::{DefinitionStatus, NodeConfig};
use engine::{RawDefinition, WorkflowDefinition};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::ApiResult;
use crate::AppState;

#[derive(Deserialize)]
pub struct StatusDto {
    pub status: DefinitionStatus,
}

#[derive(Deserialize)]
pub struct NodeConfigDto {
    #[serde(default)]
    pub data: Value,
}

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<WorkflowDefinition>>> {
    Ok(Json(state.engine.definitions().list().await?))
}

pub async fn get(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<Json<WorkflowDefinition>> {
    Ok(Json(state.engine.definitions().get(id).await?))
}

/// Save a new editor payload. Rejected with 422 unless every node config
/// and the graph itself are valid, and with 409 if a client-supplied id is
/// already taken; existing graphs change only through `set_node_config`.
pub async fn create(
    State(state): State<AppState>,
    Json(raw): Json<RawDefinition>,
) -> ApiResult<(StatusCode, Json<WorkflowDefinition>)> {
    let definition = WorkflowDefinition::from_raw(raw)?;
    state.engine.definitions().insert(&definition).await?;
    info!(workflow_id = %definition.id, name = %definition.name, "workflow saved");
    Ok((StatusCode::CREATED, Json(definition)))
}

pub async fn set_status(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(dto): Json<StatusDto>,
) -> ApiResult<Json<WorkflowDefinition>> {
    let mut definition = state.engine.definitions().get(id).await?;
    if dto.status == DefinitionStatus::Active {
        definition.validate()?;
    }
    definition.status = dto.status;
    definition.updated_at = state.engine.now();
    state.engine.definitions().put(&definition).await?;
    info!(workflow_id = %id, status = %dto.status, "workflow status changed");
    Ok(Json(definition))
}

/// Replace one node's `data`. The node keeps its type.
pub async fn set_node_config(
    Path((id, node_id)): Path<(Uuid, String)>,
    State(state): State<AppState>,
    Json(dto): Json<NodeConfigDto>,
) -> ApiResult<Json<WorkflowDefinition>> {
    let mut definition = state.engine.definitions().get(id).await?;
    let node_type = definition
        .node(&node_id)
        .map(|n| n.node_type().to_string())
        .ok_or_else(|| engine::ValidationError::UnknownNode(node_id.clone()))?;

    let config = NodeConfig::from_raw(&node_id, &node_type, dto.data)?;
    definition.set_node_config(&node_id, config)?;
    state.engine.definitions().put(&definition).await?;
    Ok(Json(definition))
}
