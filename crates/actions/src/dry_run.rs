//! `DryRunAdapter`: accepts every action, performs nothing, logs what
//! would have happened.
//!
//! Used by the binary when no real integrations are wired in, so a
//! deployment can exercise workflows end to end without sending anything.

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::{ActionAdapter, ActionOutput, AdapterError, JsonMap};

#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunAdapter;

#[async_trait]
impl ActionAdapter for DryRunAdapter {
    async fn execute(
        &self,
        action_type: &str,
        params: &JsonMap,
        _context: &JsonMap,
    ) -> Result<ActionOutput, AdapterError> {
        info!(action_type, params = %serde_json::Value::Object(params.clone()), "dry run: action skipped");
        Ok(ActionOutput::from_value(json!({
            "dry_run": true,
            "action_type": action_type,
            "params": params,
        })))
    }
}
