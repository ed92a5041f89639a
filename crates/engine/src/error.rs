//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

use crate::execution::ExecutionStatus;
use crate::models::{BranchLabel, NodeType};
use crate::store::StoreError;

/// A malformed workflow graph. Raised when a definition is saved or
/// activated; a definition that fails here never reaches the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// An edge references a node ID that doesn't exist in the workflow.
    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference { node_id: String, side: &'static str },

    #[error("workflow has no trigger node")]
    MissingTrigger,

    #[error("workflow has {0} trigger nodes, expected exactly one")]
    MultipleTriggers(usize),

    #[error("trigger node '{0}' must not have incoming edges")]
    TriggerHasIncomingEdge(String),

    #[error("{node_type} node '{node_id}' has {found} outgoing edges, at most one allowed")]
    TooManyOutgoingEdges {
        node_id: String,
        node_type: NodeType,
        found: usize,
    },

    #[error("{node_type} node '{node_id}' needs exactly two outgoing edges labeled {expected}")]
    InvalidBranches {
        node_id: String,
        node_type: NodeType,
        expected: &'static str,
    },

    #[error("edge from '{node_id}' carries branch label '{label}' but only condition and approval nodes branch")]
    UnexpectedBranchLabel { node_id: String, label: BranchLabel },

    #[error("invalid config for node '{node_id}': {message}")]
    InvalidNodeConfig { node_id: String, message: String },

    #[error("invalid expression in condition node '{node_id}': {message}")]
    InvalidExpression { node_id: String, message: String },

    #[error("no node with ID '{0}'")]
    UnknownNode(String),
}

/// Errors returned by engine operations.
///
/// Action failures and runaway loops are not errors here: they move the
/// execution to `failed` and are recorded in its history.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid workflow definition: {0}")]
    Validation(#[from] ValidationError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("cannot {operation} execution {execution_id} while it is {status}")]
    InvalidStateTransition {
        execution_id: Uuid,
        status: ExecutionStatus,
        operation: &'static str,
    },

    #[error("execution {execution_id} is not due until {resume_at}")]
    NotDue {
        execution_id: Uuid,
        resume_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    #[error("execution {0} was modified concurrently")]
    Conflict(Uuid),

    #[error("workflow {workflow_id} already has an execution for event '{event_id}'")]
    DuplicateEvent { workflow_id: Uuid, event_id: String },

    #[error("store error: {0}")]
    Store(StoreError),
}

impl EngineError {
    pub(crate) fn invalid_state(execution_id: Uuid, status: ExecutionStatus, operation: &'static str) -> Self {
        Self::InvalidStateTransition {
            execution_id,
            status,
            operation,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ExecutionNotFound(id) => Self::NotFound {
                entity: "execution",
                id: id.to_string(),
            },
            StoreError::WorkflowNotFound(id) => Self::NotFound {
                entity: "workflow",
                id: id.to_string(),
            },
            StoreError::WorkflowExists(id) => Self::AlreadyExists {
                entity: "workflow",
                id: id.to_string(),
            },
            StoreError::DuplicateEvent { workflow_id, event_id } => {
                Self::DuplicateEvent { workflow_id, event_id }
            }
            other => Self::Store(other),
        }
    }
}
