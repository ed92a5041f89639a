//! Workflow execution persistence.
//!
//! Updates are optimistic: [`compare_and_swap`] only writes when the stored
//! `version` still matches what the caller read.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::ExecutionRow, DbError};

const COLUMNS: &str = "id, workflow_id, event_id, status, current_node_id, \
                       pending_resume_at, version, state, created_at, updated_at";

/// Insert a new execution.
///
/// Returns `false` (and writes nothing) when an execution for the same
/// `(workflow_id, event_id)` already exists.
pub async fn insert_execution(pool: &PgPool, row: &ExecutionRow) -> Result<bool, DbError> {
    let result = sqlx::query(
        r#"
        INSERT INTO workflow_executions
            (id, workflow_id, event_id, status, current_node_id,
             pending_resume_at, version, state, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(row.id)
    .bind(row.workflow_id)
    .bind(&row.event_id)
    .bind(&row.status)
    .bind(&row.current_node_id)
    .bind(row.pending_resume_at)
    .bind(row.version)
    .bind(&row.state)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Fetch a single execution by its primary key.
pub async fn get_execution(pool: &PgPool, id: Uuid) -> Result<ExecutionRow, DbError> {
    let sql = format!("SELECT {COLUMNS} FROM workflow_executions WHERE id = $1");
    sqlx::query_as::<_, ExecutionRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Current `version` of an execution, or `None` if it does not exist.
pub async fn get_version(pool: &PgPool, id: Uuid) -> Result<Option<i64>, DbError> {
    let version: Option<(i64,)> =
        sqlx::query_as("SELECT version FROM workflow_executions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(version.map(|(v,)| v))
}

/// Overwrite an execution iff its stored version equals `expected_version`.
///
/// `row.version` must already hold the new version. Returns `true` when the
/// row was written.
pub async fn compare_and_swap(
    pool: &PgPool,
    row: &ExecutionRow,
    expected_version: i64,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_executions
        SET status = $3,
            current_node_id = $4,
            pending_resume_at = $5,
            version = $6,
            state = $7,
            updated_at = $8
        WHERE id = $1 AND version = $2
        "#,
    )
    .bind(row.id)
    .bind(expected_version)
    .bind(&row.status)
    .bind(&row.current_node_id)
    .bind(row.pending_resume_at)
    .bind(row.version)
    .bind(&row.state)
    .bind(row.updated_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// All executions in the given status, oldest first.
pub async fn list_by_status(pool: &PgPool, status: &str) -> Result<Vec<ExecutionRow>, DbError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM workflow_executions WHERE status = $1 ORDER BY created_at ASC"
    );
    let rows = sqlx::query_as::<_, ExecutionRow>(&sql)
        .bind(status)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Delay-paused executions whose resume time is at or before `now`,
/// earliest first.
pub async fn list_due_delays(
    pool: &PgPool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<ExecutionRow>, DbError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM workflow_executions \
         WHERE status = 'paused_delay' AND pending_resume_at <= $1 \
         ORDER BY pending_resume_at ASC \
         LIMIT $2"
    );
    let rows = sqlx::query_as::<_, ExecutionRow>(&sql)
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
