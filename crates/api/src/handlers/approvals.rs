use axum::{
    extract::{Path, Query, State},
    Json,
};
use engine::{Decision, Execution};
use serde::Deserialize;
use uuid::Uuid;

use super::ApiResult;
use crate::AppState;

#[derive(Deserialize, Default)]
pub struct ListQuery {
    /// Only approvals past their timeout.
    #[serde(default)]
    pub overdue: bool,
}

#[derive(Deserialize)]
pub struct DecisionDto {
    pub decision: Decision,
    pub approver_id: String,
}

pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult<Json<Vec<Execution>>> {
    let pending = if query.overdue {
        state.approvals.overdue_approvals().await?
    } else {
        state.approvals.list_pending_approvals().await?
    };
    Ok(Json(pending))
}

pub async fn decide(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(dto): Json<DecisionDto>,
) -> ApiResult<Json<Execution>> {
    Ok(Json(state.approvals.decide(id, dto.decision, &dto.approver_id).await?))
}
