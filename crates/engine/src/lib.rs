//! `engine` crate: workflow definitions, validation, and the execution
//! engine with its three entry points: the trigger dispatcher, the delay
//! scheduler and the approval gateway.

pub mod approvals;
pub mod clock;
pub mod condition;
pub mod dispatcher;
pub mod error;
pub mod execution;
pub mod executor;
pub mod graph;
pub mod models;
pub mod scheduler;
pub mod store;
pub mod template;

pub use approvals::ApprovalGateway;
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::{DomainEvent, TriggerDispatcher};
pub use error::{EngineError, ValidationError};
pub use execution::{Decision, Execution, ExecutionStatus, HistoryEntry, Outcome};
pub use executor::{EngineConfig, ExecutionEngine};
pub use graph::WorkflowGraph;
pub use models::{Edge, Node, NodeConfig, RawDefinition, TriggerType, WorkflowDefinition};
pub use scheduler::{DelayScheduler, SchedulerConfig};
pub use store::{DefinitionStore, ExecutionStore, StoreError};

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod executor_tests;
