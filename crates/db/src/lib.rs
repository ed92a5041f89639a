//! `db` crate: pure persistence layer.
//!
//! Provides a connection pool, typed row structs, and repository functions
//! for the workflow definition and execution tables. No business logic
//! lives here: the engine crate owns the domain types and stores them as
//! JSONB next to a handful of indexed columns.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;

pub use error::DbError;
pub use pool::DbPool;
