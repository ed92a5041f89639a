use axum::{extract::State, http::StatusCode, Json};
use engine::{DomainEvent, Execution};
use serde::Serialize;

use super::ApiResult;
use crate::AppState;

#[derive(Serialize)]
pub struct DispatchResponse {
    pub event_id: String,
    pub executions: Vec<Execution>,
}

/// Inbound domain event from the CRM side.
pub async fn receive(
    State(state): State<AppState>,
    Json(event): Json<DomainEvent>,
) -> ApiResult<(StatusCode, Json<DispatchResponse>)> {
    let executions = state.dispatcher.dispatch(&event).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(DispatchResponse {
            event_id: event.event_id,
            executions,
        }),
    ))
}
