use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use engine::Execution;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::ApiResult;
use crate::AppState;

#[derive(Deserialize)]
pub struct StartExecutionDto {
    pub workflow_id: Uuid,
    #[serde(default)]
    pub payload: Value,
}

/// Manually start a workflow, bypassing event dispatch.
pub async fn start(
    State(state): State<AppState>,
    Json(dto): Json<StartExecutionDto>,
) -> ApiResult<(StatusCode, Json<Execution>)> {
    let execution = state.engine.start(dto.workflow_id, dto.payload, None).await?;
    Ok((StatusCode::CREATED, Json(execution)))
}

pub async fn get(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<Json<Execution>> {
    Ok(Json(state.engine.get(id).await?))
}

pub async fn advance(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<Json<Execution>> {
    Ok(Json(state.engine.advance(id).await?))
}

pub async fn cancel(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<Json<Execution>> {
    Ok(Json(state.engine.cancel(id).await?))
}
