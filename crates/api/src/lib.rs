//! `api` crate: HTTP surface over the workflow engine.
//!
//! Exposes:
//!   POST   /api/v1/events
//!   GET    /api/v1/workflows
//!   POST   /api/v1/workflows
//!   GET    /api/v1/workflows/{id}
//!   PUT    /api/v1/workflows/{id}/status
//!   PUT    /api/v1/workflows/{id}/nodes/{node_id}/config
//!   POST   /api/v1/executions
//!   GET    /api/v1/executions/{id}
//!   POST   /api/v1/executions/{id}/advance
//!   POST   /api/v1/executions/{id}/cancel
//!   GET    /api/v1/approvals
//!   POST   /api/v1/approvals/{id}/decision

use std::net::SocketAddr;

use axum::{
    routing::{get, post, put},
    Router,
};
use engine::{ApprovalGateway, ExecutionEngine, TriggerDispatcher};
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod error;
pub mod handlers;

pub use error::ApiError;

use handlers::{approvals, events, executions, workflows};

#[derive(Clone)]
pub struct AppState {
    pub engine: ExecutionEngine,
    pub approvals: ApprovalGateway,
    pub dispatcher: TriggerDispatcher,
}

impl AppState {
    pub fn new(engine: ExecutionEngine) -> Self {
        Self {
            approvals: ApprovalGateway::new(engine.clone()),
            dispatcher: TriggerDispatcher::new(engine.clone()),
            engine,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/events", post(events::receive))
        .route("/api/v1/workflows", get(workflows::list).post(workflows::create))
        .route("/api/v1/workflows/:id", get(workflows::get))
        .route("/api/v1/workflows/:id/status", put(workflows::set_status))
        .route("/api/v1/workflows/:id/nodes/:node_id/config", put(workflows::set_node_config))
        .route("/api/v1/executions", post(executions::start))
        .route("/api/v1/executions/:id", get(executions::get))
        .route("/api/v1/executions/:id/advance", post(executions::advance))
        .route("/api/v1/executions/:id/cancel", post(executions::cancel))
        .route("/api/v1/approvals", get(approvals::list))
        .route("/api/v1/approvals/:id/decision", post(approvals::decide))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "api listening");
    axum::serve(listener, router(state)).await
}
