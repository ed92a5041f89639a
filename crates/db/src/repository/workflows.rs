//! Workflow definition persistence.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::WorkflowRow, DbError};

const COLUMNS: &str = "id, name, trigger_type, status, definition, created_at, updated_at";

/// Insert a new definition.
///
/// Returns `false` (and writes nothing) when a row with the same id exists.
pub async fn insert_workflow(pool: &PgPool, row: &WorkflowRow) -> Result<bool, DbError> {
    let result = sqlx::query(
        r#"
        INSERT INTO workflow_definitions
            (id, name, trigger_type, status, definition, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(row.id)
    .bind(&row.name)
    .bind(&row.trigger_type)
    .bind(&row.status)
    .bind(&row.definition)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Insert a definition, or overwrite the existing row with the same id.
///
/// `definition` must be a valid JSON object produced by serialising the
/// domain `WorkflowDefinition` type from the `engine` crate.
pub async fn upsert_workflow(pool: &PgPool, row: &WorkflowRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO workflow_definitions
            (id, name, trigger_type, status, definition, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO UPDATE
        SET name = EXCLUDED.name,
            trigger_type = EXCLUDED.trigger_type,
            status = EXCLUDED.status,
            definition = EXCLUDED.definition,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(row.id)
    .bind(&row.name)
    .bind(&row.trigger_type)
    .bind(&row.status)
    .bind(&row.definition)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a single workflow by its primary key.
pub async fn get_workflow(pool: &PgPool, id: Uuid) -> Result<WorkflowRow, DbError> {
    let sql = format!("SELECT {COLUMNS} FROM workflow_definitions WHERE id = $1");
    sqlx::query_as::<_, WorkflowRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Return all workflows ordered by creation time (newest first).
pub async fn list_workflows(pool: &PgPool) -> Result<Vec<WorkflowRow>, DbError> {
    let sql = format!("SELECT {COLUMNS} FROM workflow_definitions ORDER BY created_at DESC");
    let rows = sqlx::query_as::<_, WorkflowRow>(&sql).fetch_all(pool).await?;
    Ok(rows)
}

/// Active workflows bound to the given trigger type, oldest first.
pub async fn list_active_by_trigger(
    pool: &PgPool,
    trigger_type: &str,
) -> Result<Vec<WorkflowRow>, DbError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM workflow_definitions \
         WHERE trigger_type = $1 AND status = 'active' \
         ORDER BY created_at ASC"
    );
    let rows = sqlx::query_as::<_, WorkflowRow>(&sql)
        .bind(trigger_type)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
