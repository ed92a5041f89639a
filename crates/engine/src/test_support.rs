//! Shared fixtures for engine tests: an in-memory harness with a manual
//! clock and a recording mock adapter, plus the canonical piano-service
//! workflows.

use std::sync::Arc;

use actions::mock::MockAdapter;
use actions::JsonMap;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::approvals::ApprovalGateway;
use crate::clock::ManualClock;
use crate::dispatcher::TriggerDispatcher;
use crate::executor::{EngineConfig, ExecutionEngine};
use crate::models::{BranchLabel, DefinitionStatus, DelayUnit, Edge, Node, WorkflowDefinition};
use crate::scheduler::{DelayScheduler, SchedulerConfig};
use crate::store::{InMemoryDefinitionStore, InMemoryExecutionStore};

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).single().expect("valid timestamp")
}

pub(crate) fn params(value: Value) -> JsonMap {
    value.as_object().cloned().expect("params must be a JSON object")
}

pub(crate) struct Harness {
    pub engine: ExecutionEngine,
    pub executions: Arc<InMemoryExecutionStore>,
    pub definitions: Arc<InMemoryDefinitionStore>,
    pub adapter: MockAdapter,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(definitions: impl IntoIterator<Item = WorkflowDefinition>) -> Self {
        Self::with(definitions, MockAdapter::new(), EngineConfig::default())
    }

    pub fn with(
        definitions: impl IntoIterator<Item = WorkflowDefinition>,
        adapter: MockAdapter,
        config: EngineConfig,
    ) -> Self {
        let executions = Arc::new(InMemoryExecutionStore::new());
        let definitions = Arc::new(InMemoryDefinitionStore::with_definitions(definitions));
        let clock = Arc::new(ManualClock::new(t0()));
        let engine = ExecutionEngine::new(
            executions.clone(),
            definitions.clone(),
            Arc::new(adapter.clone()),
            clock.clone(),
            config,
        );
        Self {
            engine,
            executions,
            definitions,
            adapter,
            clock,
        }
    }

    pub fn gateway(&self) -> ApprovalGateway {
        ApprovalGateway::new(self.engine.clone())
    }

    pub fn dispatcher(&self) -> TriggerDispatcher {
        TriggerDispatcher::new(self.engine.clone())
    }

    pub fn scheduler(&self) -> DelayScheduler {
        DelayScheduler::new(self.engine.clone(), SchedulerConfig::default())
    }
}

fn active(def: WorkflowDefinition) -> WorkflowDefinition {
    def.with_status(DefinitionStatus::Active)
}

/// start → welcome (send_email)
pub(crate) fn welcome_flow() -> WorkflowDefinition {
    active(WorkflowDefinition::new(
        "welcome new client",
        "client_created",
        vec![
            Node::trigger("start"),
            Node::action(
                "welcome",
                "send_email",
                params(serde_json::json!({ "client": "{{payload.clientId}}", "template": "welcome" })),
            ),
        ],
        vec![Edge::new("start", "welcome")],
    ))
}

/// start → check(amount > 100); true → remind, false → mail
pub(crate) fn overdue_flow() -> WorkflowDefinition {
    active(WorkflowDefinition::new(
        "overdue invoice follow-up",
        "invoice_overdue",
        vec![
            Node::trigger("start"),
            Node::condition("check", "payload.amount > 100"),
            Node::action("remind", "create_reminder", JsonMap::new()),
            Node::action("mail", "send_email", JsonMap::new()),
        ],
        vec![
            Edge::new("start", "check"),
            Edge::labeled("check", "remind", BranchLabel::True),
            Edge::labeled("check", "mail", BranchLabel::False),
        ],
    ))
}

/// start → ask(approval); approved → mark, rejected → mail
pub(crate) fn approval_flow() -> WorkflowDefinition {
    active(WorkflowDefinition::new(
        "quote approval",
        "quote_requested",
        vec![
            Node::trigger("start"),
            Node::approval("ask", "Approve quote for {{payload.clientName}}?"),
            Node::action("mark", "update_status", params(serde_json::json!({ "status": "approved" }))),
            Node::action("mail", "send_email", JsonMap::new()),
        ],
        vec![
            Edge::new("start", "ask"),
            Edge::labeled("ask", "mark", BranchLabel::Approved),
            Edge::labeled("ask", "mail", BranchLabel::Rejected),
        ],
    ))
}

/// start → wait(5 minutes) → ping (send_whatsapp)
pub(crate) fn delay_flow() -> WorkflowDefinition {
    active(WorkflowDefinition::new(
        "tuning reminder",
        "tuning_booked",
        vec![
            Node::trigger("start"),
            Node::delay("wait", 5, DelayUnit::Minutes),
            Node::action("ping", "send_whatsapp", JsonMap::new()),
        ],
        vec![Edge::new("start", "wait"), Edge::new("wait", "ping")],
    ))
}

/// start → check(payload.loop); true → mail → check, false → done
pub(crate) fn looping_flow() -> WorkflowDefinition {
    active(WorkflowDefinition::new(
        "runaway loop",
        "client_created",
        vec![
            Node::trigger("start"),
            Node::condition("check", "payload.loop"),
            Node::action("mail", "send_email", JsonMap::new()),
            Node::action("done", "update_status", JsonMap::new()),
        ],
        vec![
            Edge::new("start", "check"),
            Edge::labeled("check", "mail", BranchLabel::True),
            Edge::labeled("check", "done", BranchLabel::False),
            Edge::new("mail", "check"),
        ],
    ))
}
