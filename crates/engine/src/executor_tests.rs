//! End-to-end engine tests.
//!
//! Everything runs against the in-memory stores, a `ManualClock` and the
//! recording `MockAdapter`, so no Postgres connection is required and
//! timing is fully deterministic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use actions::mock::MockAdapter;
use actions::AdapterError;
use serde_json::json;
use tokio::sync::watch;

use crate::clock::ManualClock;
use crate::error::EngineError;
use crate::execution::{Decision, Execution, ExecutionStatus, FailureKind, Outcome};
use crate::executor::{EngineConfig, ExecutionEngine};
use crate::scheduler::{DelayScheduler, SchedulerConfig};
use crate::store::{ExecutionStore, InMemoryDefinitionStore, InMemoryExecutionStore, StoreError};
use crate::test_support::*;

// ============================================================
// Linear flows and branching
// ============================================================

#[tokio::test]
async fn welcome_flow_calls_action_with_rendered_params_and_completes() {
    let def = welcome_flow();
    let h = Harness::new([def.clone()]);

    let exec = h.engine.start(def.id, json!({ "clientId": 42 }), None).await.unwrap();

    assert_eq!(exec.status, ExecutionStatus::Completed);
    assert_eq!(exec.visited(), vec!["start", "welcome"]);
    assert_eq!(exec.finished_at, Some(t0()));

    let calls = h.adapter.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].action_type, "send_email");
    // A sole placeholder keeps its JSON type.
    assert_eq!(calls[0].params["client"], json!(42));
    assert_eq!(calls[0].params["template"], json!("welcome"));

    // The action's output is available to later nodes under its id.
    assert_eq!(exec.context["welcome"]["ok"], json!(true));
    assert_eq!(exec.context["payload"]["clientId"], json!(42));
}

#[tokio::test]
async fn condition_takes_true_branch_only() {
    let def = overdue_flow();
    let h = Harness::new([def.clone()]);

    let exec = h.engine.start(def.id, json!({ "amount": 250 }), None).await.unwrap();

    assert_eq!(exec.status, ExecutionStatus::Completed);
    assert_eq!(exec.visited(), vec!["start", "check", "remind"]);
    assert_eq!(exec.history[1].outcome, Outcome::Branched { result: true });
    assert_eq!(h.adapter.call_count("create_reminder"), 1);
    assert_eq!(h.adapter.call_count("send_email"), 0);
}

#[tokio::test]
async fn condition_takes_false_branch_only() {
    let def = overdue_flow();
    let h = Harness::new([def.clone()]);

    let exec = h.engine.start(def.id, json!({ "amount": 50 }), None).await.unwrap();

    assert_eq!(exec.visited(), vec!["start", "check", "mail"]);
    assert_eq!(h.adapter.call_count("create_reminder"), 0);
    assert_eq!(h.adapter.call_count("send_email"), 1);
}

#[tokio::test]
async fn missing_condition_path_is_false() {
    let def = overdue_flow();
    let h = Harness::new([def.clone()]);

    let exec = h.engine.start(def.id, json!({}), None).await.unwrap();

    assert_eq!(exec.history[1].outcome, Outcome::Branched { result: false });
    assert_eq!(h.adapter.call_count("send_email"), 1);
}

#[tokio::test]
async fn identical_inputs_produce_identical_histories() {
    let def = overdue_flow();
    let a = Harness::new([def.clone()]);
    let b = Harness::new([def.clone()]);

    let first = a.engine.start(def.id, json!({ "amount": 101 }), None).await.unwrap();
    let second = b.engine.start(def.id, json!({ "amount": 101 }), None).await.unwrap();

    assert_eq!(first.history, second.history);
    assert_eq!(first.context, second.context);
    assert_eq!(first.status, second.status);
    assert_eq!(a.adapter.calls(), b.adapter.calls());
}

// ============================================================
// Approvals
// ============================================================

#[tokio::test]
async fn approval_pauses_then_approved_branch_runs() {
    let def = approval_flow();
    let h = Harness::new([def.clone()]);

    let paused = h.engine.start(def.id, json!({ "clientName": "Ada" }), None).await.unwrap();
    assert_eq!(paused.status, ExecutionStatus::PausedApproval);
    assert_eq!(paused.current_node_id, "ask");
    assert!(paused.pause_fields_consistent());
    let pending = paused.pending_approval.as_ref().unwrap();
    assert_eq!(pending.message, "Approve quote for Ada?");
    assert_eq!(h.adapter.total_calls(), 0);

    let done = h.gateway().decide(paused.id, Decision::Approved, "manager-1").await.unwrap();

    assert_eq!(done.status, ExecutionStatus::Completed);
    assert_eq!(done.visited(), vec!["start", "ask", "mark"]);
    assert_eq!(done.decisions.len(), 1);
    assert_eq!(done.decisions[0].approver_id, "manager-1");
    assert_eq!(done.decisions[0].decision, Decision::Approved);
    assert_eq!(h.adapter.call_count("update_status"), 1);
    assert_eq!(h.adapter.call_count("send_email"), 0);
}

#[tokio::test]
async fn rejected_approval_takes_rejected_branch() {
    let def = approval_flow();
    let h = Harness::new([def.clone()]);

    let paused = h.engine.start(def.id, json!({}), None).await.unwrap();
    let done = h.gateway().decide(paused.id, Decision::Rejected, "manager-1").await.unwrap();

    assert_eq!(done.visited(), vec!["start", "ask", "mail"]);
    assert_eq!(h.adapter.call_count("update_status"), 0);
    assert_eq!(h.adapter.call_count("send_email"), 1);
}

#[tokio::test]
async fn second_decision_is_rejected_without_side_effects() {
    let def = approval_flow();
    let h = Harness::new([def.clone()]);

    let paused = h.engine.start(def.id, json!({}), None).await.unwrap();
    let gateway = h.gateway();
    let decided = gateway.decide(paused.id, Decision::Approved, "a").await.unwrap();

    let err = gateway.decide(paused.id, Decision::Rejected, "b").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidStateTransition {
            status: ExecutionStatus::Completed,
            ..
        }
    ));
    assert_eq!(h.adapter.total_calls(), 1);
    let stored = h.engine.get(paused.id).await.unwrap();
    assert_eq!(stored.version, decided.version);
    assert_eq!(stored, decided);
}

#[tokio::test]
async fn decision_on_execution_that_never_paused_is_rejected() {
    let def = welcome_flow();
    let h = Harness::new([def.clone()]);
    let done = h.engine.start(def.id, json!({}), None).await.unwrap();
    assert_eq!(done.status, ExecutionStatus::Completed);

    let err = h.gateway().decide(done.id, Decision::Approved, "a").await.unwrap_err();

    assert!(matches!(err, EngineError::InvalidStateTransition { operation: "decide", .. }));
    let stored = h.engine.get(done.id).await.unwrap();
    assert_eq!(stored.version, done.version);
    assert!(stored.decisions.is_empty());
    assert_eq!(h.adapter.total_calls(), 1);
}

#[tokio::test]
async fn gateway_lists_pending_and_overdue_approvals() {
    let def = approval_flow();
    let mut timed = approval_flow();
    timed.nodes[1] = crate::models::Node::new(
        "ask",
        crate::models::NodeConfig::Approval(crate::models::ApprovalConfig {
            message: "Approve?".into(),
            details: Some("client {{payload.clientName}}".into()),
            timeout_hours: Some(24),
        }),
    );
    let h = Harness::new([def.clone(), timed.clone()]);

    let plain = h.engine.start(def.id, json!({}), None).await.unwrap();
    let expiring = h.engine.start(timed.id, json!({ "clientName": "Bo" }), None).await.unwrap();
    assert_eq!(
        expiring.pending_approval.as_ref().unwrap().details.as_deref(),
        Some("client Bo")
    );

    let gateway = h.gateway();
    let mut pending: Vec<_> = gateway.list_pending_approvals().await.unwrap().into_iter().map(|e| e.id).collect();
    pending.sort();
    let mut expected = vec![plain.id, expiring.id];
    expected.sort();
    assert_eq!(pending, expected);
    assert!(gateway.overdue_approvals().await.unwrap().is_empty());

    h.clock.advance(chrono::Duration::hours(25));
    let overdue = gateway.overdue_approvals().await.unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].id, expiring.id);
    // Overdue is informational; nothing was decided.
    assert_eq!(overdue[0].status, ExecutionStatus::PausedApproval);
}

// ============================================================
// Delays and the scheduler
// ============================================================

#[tokio::test]
async fn delay_pauses_until_due_then_scheduler_resumes() {
    let def = delay_flow();
    let h = Harness::new([def.clone()]);
    let scheduler = h.scheduler();

    let paused = h.engine.start(def.id, json!({}), None).await.unwrap();
    assert_eq!(paused.status, ExecutionStatus::PausedDelay);
    assert_eq!(paused.pending_resume_at, Some(t0() + chrono::Duration::minutes(5)));
    assert!(paused.pause_fields_consistent());

    let pass = scheduler.run_once().await.unwrap();
    assert_eq!(pass.due, 0);
    assert_eq!(h.adapter.total_calls(), 0);

    h.clock.advance(chrono::Duration::minutes(4));
    scheduler.run_once().await.unwrap();
    assert_eq!(h.engine.get(paused.id).await.unwrap().status, ExecutionStatus::PausedDelay);

    h.clock.advance(chrono::Duration::minutes(1));
    let pass = scheduler.run_once().await.unwrap();
    assert_eq!(pass.resumed, 1);

    let done = h.engine.get(paused.id).await.unwrap();
    assert_eq!(done.status, ExecutionStatus::Completed);
    assert_eq!(done.visited(), vec!["start", "wait", "ping"]);
    assert!(done.pending_resume_at.is_none());
    assert_eq!(h.adapter.call_count("send_whatsapp"), 1);
}

#[tokio::test]
async fn two_schedulers_resume_a_due_execution_once() {
    let def = delay_flow();
    let h = Harness::new([def.clone()]);
    let paused = h.engine.start(def.id, json!({}), None).await.unwrap();
    h.clock.advance(chrono::Duration::minutes(10));

    let a = h.scheduler();
    let b = h.scheduler();
    let (pa, pb) = tokio::join!(a.run_once(), b.run_once());
    let (pa, pb) = (pa.unwrap(), pb.unwrap());

    assert_eq!(pa.resumed + pb.resumed, 1);
    assert_eq!(pa.failed + pb.failed, 0);
    assert_eq!(h.adapter.call_count("send_whatsapp"), 1);
    assert_eq!(h.engine.get(paused.id).await.unwrap().status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn resume_delay_checks_status_and_due_time() {
    let def = delay_flow();
    let h = Harness::new([def.clone()]);
    let paused = h.engine.start(def.id, json!({}), None).await.unwrap();

    let err = h.engine.resume_delay(paused.id).await.unwrap_err();
    assert!(matches!(err, EngineError::NotDue { .. }));

    h.clock.advance(chrono::Duration::minutes(5));
    h.engine.resume_delay(paused.id).await.unwrap();

    let err = h.engine.resume_delay(paused.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidStateTransition { .. }));
    assert_eq!(h.adapter.call_count("send_whatsapp"), 1);
}

#[tokio::test(start_paused = true)]
async fn scheduler_loop_resumes_and_stops_on_shutdown() {
    let def = delay_flow();
    let h = Harness::new([def.clone()]);
    let paused = h.engine.start(def.id, json!({}), None).await.unwrap();
    h.clock.advance(chrono::Duration::minutes(5));

    let scheduler = DelayScheduler::new(
        h.engine.clone(),
        SchedulerConfig::new().with_poll_interval(Duration::from_millis(50)),
    );
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { scheduler.run(rx).await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(true).unwrap();
    handle.await.unwrap();

    assert_eq!(h.engine.get(paused.id).await.unwrap().status, ExecutionStatus::Completed);
    assert_eq!(h.adapter.call_count("send_whatsapp"), 1);
}

// ============================================================
// Idempotence and state transitions
// ============================================================

#[tokio::test]
async fn advance_on_paused_execution_is_a_no_op() {
    let def = approval_flow();
    let h = Harness::new([def.clone()]);
    let paused = h.engine.start(def.id, json!({}), None).await.unwrap();

    let again = h.engine.advance(paused.id).await.unwrap();

    assert_eq!(again, paused);
    assert_eq!(again.version, paused.version);
    assert_eq!(h.adapter.total_calls(), 0);
}

#[tokio::test]
async fn advance_on_terminal_execution_fails() {
    let def = welcome_flow();
    let h = Harness::new([def.clone()]);
    let done = h.engine.start(def.id, json!({}), None).await.unwrap();

    let err = h.engine.advance(done.id).await.unwrap_err();

    assert!(matches!(err, EngineError::InvalidStateTransition { operation: "advance", .. }));
    assert_eq!(h.adapter.total_calls(), 1);
}

#[tokio::test]
async fn unknown_execution_is_not_found() {
    let h = Harness::new(Vec::new());
    let err = h.engine.advance(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { entity: "execution", .. }));
}

#[tokio::test]
async fn each_committed_step_bumps_version() {
    let def = overdue_flow();
    let h = Harness::new([def.clone()]);

    let created = h.engine.create_execution(def.id, json!({ "amount": 1 }), None).await.unwrap();
    assert_eq!(created.version, 0);
    assert!(created.history.is_empty());

    let done = h.engine.advance(created.id).await.unwrap();
    assert_eq!(done.version, 3);
    assert_eq!(h.executions.get(created.id).await.unwrap(), done);
}

// ============================================================
// Failures
// ============================================================

#[tokio::test]
async fn adapter_failure_fails_execution_and_stops() {
    let def = overdue_flow();
    let adapter = MockAdapter::new().failing("send_email", "smtp unreachable");
    let h = Harness::with([def.clone()], adapter, EngineConfig::default());

    let exec = h.engine.start(def.id, json!({ "amount": 0 }), None).await.unwrap();

    assert_eq!(exec.status, ExecutionStatus::Failed);
    let failure = exec.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::AdapterError);
    assert_eq!(failure.node_id, "mail");
    assert!(failure.message.contains("smtp unreachable"));
    assert!(matches!(exec.history.last().unwrap().outcome, Outcome::ActionFailed { .. }));
    assert!(!exec.context.contains_key("mail"));
}

#[tokio::test]
async fn runaway_loop_is_bounded_and_fails() {
    let def = looping_flow();
    let h = Harness::new([def.clone()]);

    let exec = h.engine.start(def.id, json!({ "loop": true }), None).await.unwrap();

    assert_eq!(exec.status, ExecutionStatus::Failed);
    assert_eq!(exec.failure.as_ref().unwrap().kind, FailureKind::CycleDetected);
    assert!(matches!(exec.history.last().unwrap().outcome, Outcome::CycleDetected { visits: 8 }));
    assert_eq!(h.adapter.call_count("send_email"), 3);
    assert_eq!(h.adapter.call_count("update_status"), 0);
}

#[tokio::test]
async fn loop_that_exits_in_time_completes() {
    let def = looping_flow();
    let h = Harness::new([def.clone()]);

    let exec = h.engine.start(def.id, json!({ "loop": false }), None).await.unwrap();

    assert_eq!(exec.status, ExecutionStatus::Completed);
    assert_eq!(exec.visited(), vec!["start", "check", "done"]);
}

#[tokio::test]
async fn unrepresentable_resume_time_fails_the_execution() {
    let def = delay_flow();
    let h = Harness::new([def.clone()]);
    h.clock.set(chrono::DateTime::<chrono::Utc>::MAX_UTC - chrono::Duration::minutes(1));

    let exec = h.engine.start(def.id, json!({}), None).await.unwrap();

    assert_eq!(exec.status, ExecutionStatus::Failed);
    assert!(exec.pending_resume_at.is_none());
    assert!(exec.pause_fields_consistent());
    let failure = exec.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::InvalidDelay);
    assert_eq!(failure.node_id, "wait");
    assert_eq!(exec.visited(), vec!["start", "wait"]);
    assert!(matches!(exec.history.last().unwrap().outcome, Outcome::DelayUnschedulable { .. }));
    assert_eq!(h.engine.get(exec.id).await.unwrap(), exec);
    assert_eq!(h.adapter.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_action_times_out() {
    let def = welcome_flow();
    let adapter = MockAdapter::new().slow("send_email", Duration::from_secs(60), json!({}));
    let config = EngineConfig::default().with_action_timeout(Some(Duration::from_secs(1)));
    let h = Harness::with([def.clone()], adapter, config);

    let exec = h.engine.start(def.id, json!({}), None).await.unwrap();

    assert_eq!(exec.status, ExecutionStatus::Failed);
    let expected = AdapterError::TimedOut {
        action_type: "send_email".into(),
        after_ms: 1000,
    };
    assert_eq!(exec.failure.as_ref().unwrap().message, expected.to_string());
}

// ============================================================
// Cancellation
// ============================================================

#[tokio::test]
async fn cancel_paused_execution() {
    let def = delay_flow();
    let h = Harness::new([def.clone()]);
    let paused = h.engine.start(def.id, json!({}), None).await.unwrap();

    let cancelled = h.engine.cancel(paused.id).await.unwrap();

    assert_eq!(cancelled.status, ExecutionStatus::Cancelled);
    assert!(cancelled.pending_resume_at.is_none());
    assert!(cancelled.pause_fields_consistent());
    assert_eq!(cancelled.history.last().unwrap().outcome, Outcome::Cancelled);

    // The scheduler no longer sees it.
    h.clock.advance(chrono::Duration::hours(1));
    let pass = h.scheduler().run_once().await.unwrap();
    assert_eq!(pass.due, 0);
    assert_eq!(h.adapter.total_calls(), 0);

    let err = h.engine.cancel(paused.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidStateTransition { .. }));
}

#[tokio::test(start_paused = true)]
async fn cancel_during_in_flight_action_discards_the_step() {
    let def = overdue_flow();
    let adapter = MockAdapter::new().slow("create_reminder", Duration::from_secs(10), json!({ "id": 1 }));
    let h = Harness::with([def.clone()], adapter, EngineConfig::default());
    let created = h.engine.create_execution(def.id, json!({ "amount": 500 }), None).await.unwrap();

    let engine = h.engine.clone();
    let advancing = tokio::spawn(async move { engine.advance(created.id).await });

    // Let the advance reach the slow adapter call.
    tokio::time::sleep(Duration::from_millis(1)).await;
    let cancelled = h.engine.cancel(created.id).await.unwrap();
    assert_eq!(cancelled.status, ExecutionStatus::Cancelled);

    let result = advancing.await.unwrap().unwrap();
    assert_eq!(result.status, ExecutionStatus::Cancelled);

    let stored = h.engine.get(created.id).await.unwrap();
    assert_eq!(stored.status, ExecutionStatus::Cancelled);
    assert!(!stored.context.contains_key("remind"));
    assert_eq!(h.adapter.call_count("create_reminder"), 1);
}

// ============================================================
// Dispatcher
// ============================================================

#[tokio::test]
async fn dispatch_starts_every_active_matching_workflow() {
    let first = welcome_flow();
    let second = welcome_flow();
    let inactive = welcome_flow().with_status(crate::models::DefinitionStatus::Inactive);
    let other = overdue_flow();
    let h = Harness::new([first.clone(), second.clone(), inactive, other]);

    let event = crate::dispatcher::DomainEvent::new("client_created", json!({ "clientId": 1 }), "evt-1");
    let started = h.dispatcher().dispatch(&event).await.unwrap();

    assert_eq!(started.len(), 2);
    assert!(started.iter().all(|e| e.status == ExecutionStatus::Completed));
    assert!(started.iter().all(|e| e.event_id.as_deref() == Some("evt-1")));
    assert_eq!(h.adapter.call_count("send_email"), 2);
    assert_eq!(h.executions.len(), 2);
}

#[tokio::test]
async fn redelivered_event_does_not_start_duplicates() {
    let def = welcome_flow();
    let h = Harness::new([def]);
    let dispatcher = h.dispatcher();
    let event = crate::dispatcher::DomainEvent::new("client_created", json!({}), "evt-7");

    assert_eq!(dispatcher.dispatch(&event).await.unwrap().len(), 1);
    assert!(dispatcher.dispatch(&event).await.unwrap().is_empty());

    assert_eq!(h.executions.len(), 1);
    assert_eq!(h.adapter.call_count("send_email"), 1);
}

#[tokio::test]
async fn event_with_no_matching_workflow_starts_nothing() {
    let h = Harness::new([welcome_flow()]);
    let event = crate::dispatcher::DomainEvent::new("piano_sold", json!({}), "evt-9");

    assert!(h.dispatcher().dispatch(&event).await.unwrap().is_empty());
    assert!(h.executions.is_empty());
}

#[tokio::test]
async fn broken_definition_does_not_block_the_others() {
    let good = welcome_flow();
    let mut broken = welcome_flow();
    broken.edges.push(crate::models::Edge::new("welcome", "nowhere"));
    let h = Harness::new([broken, good.clone()]);

    let event = crate::dispatcher::DomainEvent::new("client_created", json!({}), "evt-2");
    let started = h.dispatcher().dispatch(&event).await.unwrap();

    assert_eq!(started.len(), 1);
    assert_eq!(started[0].workflow_id, good.id);
}

#[tokio::test]
async fn failing_action_in_one_workflow_does_not_affect_another() {
    let mailer = welcome_flow();
    let mut tagger = welcome_flow();
    tagger.nodes[1] = crate::models::Node::action("welcome", "add_tag", params(json!({ "tag": "new" })));
    let adapter = MockAdapter::new().failing("send_email", "bounced");
    let h = Harness::with([mailer.clone(), tagger.clone()], adapter, EngineConfig::default());

    let event = crate::dispatcher::DomainEvent::new("client_created", json!({}), "evt-3");
    let started = h.dispatcher().dispatch(&event).await.unwrap();

    assert_eq!(started.len(), 2);
    let status_of = |id| started.iter().find(|e| e.workflow_id == id).map(|e| e.status);
    assert_eq!(status_of(mailer.id), Some(ExecutionStatus::Failed));
    assert_eq!(status_of(tagger.id), Some(ExecutionStatus::Completed));
}

/// Execution store whose commits fail while `failing` is set.
#[derive(Default)]
struct FlakyCommits {
    inner: InMemoryExecutionStore,
    failing: AtomicBool,
}

#[async_trait::async_trait]
impl ExecutionStore for FlakyCommits {
    async fn insert(&self, execution: &Execution) -> Result<(), StoreError> {
        self.inner.insert(execution).await
    }

    async fn get(&self, id: uuid::Uuid) -> Result<Execution, StoreError> {
        self.inner.get(id).await
    }

    async fn compare_and_swap(&self, execution: &Execution, expected_version: u64) -> Result<Execution, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupt("connection reset".into()));
        }
        self.inner.compare_and_swap(execution, expected_version).await
    }

    async fn list_by_status(&self, status: ExecutionStatus) -> Result<Vec<Execution>, StoreError> {
        self.inner.list_by_status(status).await
    }

    async fn due_for_resume(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        limit: usize,
    ) -> Result<Vec<Execution>, StoreError> {
        self.inner.due_for_resume(now, limit).await
    }
}

#[tokio::test]
async fn execution_stranded_by_failed_first_advance_is_recovered_by_explicit_advance() {
    let def = welcome_flow();
    let store = Arc::new(FlakyCommits::default());
    let adapter = MockAdapter::new();
    let engine = ExecutionEngine::new(
        store.clone(),
        Arc::new(InMemoryDefinitionStore::with_definitions([def.clone()])),
        Arc::new(adapter.clone()),
        Arc::new(ManualClock::new(t0())),
        EngineConfig::default(),
    );
    let dispatcher = crate::dispatcher::TriggerDispatcher::new(engine.clone());
    let event = crate::dispatcher::DomainEvent::new("client_created", json!({}), "evt-5");

    store.failing.store(true, Ordering::SeqCst);
    let started = dispatcher.dispatch(&event).await.unwrap();
    assert_eq!(started.len(), 1);
    let stranded = &started[0];
    assert_eq!(stranded.status, ExecutionStatus::Running);
    assert_eq!(stranded.current_node_id, "start");

    // Redelivery does not retry it.
    store.failing.store(false, Ordering::SeqCst);
    assert!(dispatcher.dispatch(&event).await.unwrap().is_empty());
    assert_eq!(store.inner.len(), 1);
    assert_eq!(adapter.total_calls(), 0);

    let recovered = engine.advance(stranded.id).await.unwrap();
    assert_eq!(recovered.status, ExecutionStatus::Completed);
    assert_eq!(adapter.call_count("send_email"), 1);
}
