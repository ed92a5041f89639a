//! The `ActionAdapter` trait: the single capability the engine depends on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::AdapterError;

/// JSON object used for params, context and outputs.
pub type JsonMap = Map<String, Value>;

/// What a successful action hands back to the engine.
///
/// The engine stores `output` in the execution context under the action
/// node's id. A WhatsApp-style adapter may return "prepared, awaiting manual
/// confirmation" here; any non-error return counts as success.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOutput {
    pub output: JsonMap,
}

impl ActionOutput {
    pub fn new(output: JsonMap) -> Self {
        Self { output }
    }

    /// Wrap an arbitrary JSON value. Objects are used as-is, anything else
    /// lands under a `"value"` key.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self { output: map },
            Value::Null => Self::default(),
            other => {
                let mut output = Map::new();
                output.insert("value".into(), other);
                Self { output }
            }
        }
    }
}

/// Executes one concrete action type against resolved params and the
/// execution context.
///
/// Implementations must enforce their own network timeouts; the engine
/// additionally bounds every call with its configured action timeout.
#[async_trait]
pub trait ActionAdapter: Send + Sync {
    async fn execute(
        &self,
        action_type: &str,
        params: &JsonMap,
        context: &JsonMap,
    ) -> Result<ActionOutput, AdapterError>;
}

/// Handler for a single action type, registered in an
/// [`AdapterRegistry`](crate::AdapterRegistry).
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, params: &JsonMap, context: &JsonMap) -> Result<ActionOutput, AdapterError>;
}
