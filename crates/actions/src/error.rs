//! Adapter-level error type.

use thiserror::Error;

/// Errors returned by an [`ActionAdapter`](crate::ActionAdapter).
///
/// The engine never retries any of these: every variant fails the
/// execution and is written to its history.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// No handler is registered for the requested action type.
    #[error("unsupported action type '{0}'")]
    Unsupported(String),

    /// The resolved parameters are not usable by the handler.
    #[error("invalid parameters for '{action_type}': {message}")]
    InvalidParams {
        action_type: String,
        message: String,
    },

    /// The external call itself failed.
    #[error("action '{action_type}' failed: {message}")]
    Failed {
        action_type: String,
        message: String,
    },

    /// The call did not finish within the allotted time.
    #[error("action '{action_type}' timed out after {after_ms} ms")]
    TimedOut { action_type: String, after_ms: u64 },
}

impl AdapterError {
    /// Shorthand for [`AdapterError::Failed`].
    pub fn failed(action_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            action_type: action_type.into(),
            message: message.into(),
        }
    }
}
