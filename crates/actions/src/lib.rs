//! `actions` crate: the Action Adapter boundary.
//!
//! The engine only ever talks to side-effecting integrations (email,
//! WhatsApp, calendar, reminders) through [`ActionAdapter::execute`].
//! Concrete senders live outside this workspace; what lives here is the
//! contract, a registry that dispatches by action type, a dry-run adapter
//! for local runs, and a recording test double.

pub mod dry_run;
pub mod error;
pub mod mock;
pub mod registry;
pub mod traits;

pub use dry_run::DryRunAdapter;
pub use error::AdapterError;
pub use registry::AdapterRegistry;
pub use traits::{ActionAdapter, ActionHandler, ActionOutput, JsonMap};
