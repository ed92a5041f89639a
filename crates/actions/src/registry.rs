//! Maps action type strings to [`ActionHandler`] implementations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{ActionAdapter, ActionHandler, ActionOutput, AdapterError, JsonMap};

/// An [`ActionAdapter`] that dispatches each call to the handler registered
/// for its action type.
///
/// Unregistered types go to the fallback adapter when one is set and fail
/// with [`AdapterError::Unsupported`] otherwise.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
    fallback: Option<Arc<dyn ActionAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `action_type`.
    pub fn register(&mut self, action_type: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(action_type.into(), handler);
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with_handler(mut self, action_type: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        self.register(action_type, handler);
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn ActionAdapter>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn supports(&self, action_type: &str) -> bool {
        self.handlers.contains_key(action_type)
    }

    /// Registered action types, sorted.
    pub fn action_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

#[async_trait]
impl ActionAdapter for AdapterRegistry {
    async fn execute(
        &self,
        action_type: &str,
        params: &JsonMap,
        context: &JsonMap,
    ) -> Result<ActionOutput, AdapterError> {
        if let Some(handler) = self.handlers.get(action_type) {
            debug!(action_type, "dispatching action");
            return handler.handle(params, context).await;
        }
        match &self.fallback {
            Some(fallback) => fallback.execute(action_type, params, context).await,
            None => {
                warn!(action_type, "no handler registered");
                Err(AdapterError::Unsupported(action_type.to_owned()))
            }
        }
    }
}
