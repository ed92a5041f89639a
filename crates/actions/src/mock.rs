//! `MockAdapter`: a test double for `ActionAdapter`.
//!
//! Records every call it receives and returns a programmer-specified result
//! per action type.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::{ActionAdapter, ActionOutput, AdapterError, JsonMap};

/// Behaviour injected per action type.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Return this JSON value as the output.
    ReturnValue(Value),
    /// Fail with [`AdapterError::Failed`].
    Fail(String),
    /// Sleep, then return the value. Used to simulate a slow integration.
    Slow(Duration, Value),
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub action_type: String,
    pub params: JsonMap,
}

/// A mock adapter. Action types with no configured behaviour succeed with
/// `{"action": <type>, "ok": true}`.
#[derive(Debug, Clone, Default)]
pub struct MockAdapter {
    behaviours: HashMap<String, MockBehaviour>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always succeed with `value` for `action_type`.
    pub fn returning(mut self, action_type: impl Into<String>, value: Value) -> Self {
        self.behaviours.insert(action_type.into(), MockBehaviour::ReturnValue(value));
        self
    }

    /// Always fail for `action_type`.
    pub fn failing(mut self, action_type: impl Into<String>, msg: impl Into<String>) -> Self {
        self.behaviours.insert(action_type.into(), MockBehaviour::Fail(msg.into()));
        self
    }

    /// Sleep for `delay` before succeeding for `action_type`.
    pub fn slow(mut self, action_type: impl Into<String>, delay: Duration, value: Value) -> Self {
        self.behaviours.insert(action_type.into(), MockBehaviour::Slow(delay, value));
        self
    }

    /// All calls seen so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Number of calls for one action type.
    pub fn call_count(&self, action_type: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.action_type == action_type)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ActionAdapter for MockAdapter {
    async fn execute(
        &self,
        action_type: &str,
        params: &JsonMap,
        _context: &JsonMap,
    ) -> Result<ActionOutput, AdapterError> {
        self.calls.lock().push(MockCall {
            action_type: action_type.to_owned(),
            params: params.clone(),
        });

        match self.behaviours.get(action_type) {
            Some(MockBehaviour::ReturnValue(v)) => Ok(ActionOutput::from_value(v.clone())),
            Some(MockBehaviour::Fail(msg)) => Err(AdapterError::failed(action_type, msg.clone())),
            Some(MockBehaviour::Slow(delay, v)) => {
                tokio::time::sleep(*delay).await;
                Ok(ActionOutput::from_value(v.clone()))
            }
            None => Ok(ActionOutput::from_value(json!({ "action": action_type, "ok": true }))),
        }
    }
}
