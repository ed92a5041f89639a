pub mod approvals;
pub mod events;
pub mod executions;
pub mod workflows;

use crate::ApiError;

pub type ApiResult<T> = Result<T, ApiError>;
