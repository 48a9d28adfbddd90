//! Execution record storage.
//!
//! Status updates are guarded by the current status: a row that reached
//! `SUCCESS` or `FAILED` is never rewritten. Each update reports whether it
//! applied.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::ExecutionRow, DbError};

const COLUMNS: &str = "id, workflow_id, status, started_at, completed_at, error, cancel_requested";

/// Create a new execution record in `PENDING` status.
pub async fn create_execution(
    pool: &PgPool,
    id: Uuid,
    workflow_id: Uuid,
) -> Result<ExecutionRow, DbError> {
    let row = sqlx::query_as::<_, ExecutionRow>(&format!(
        "INSERT INTO executions (id, workflow_id, status)
         VALUES ($1, $2, 'PENDING')
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(workflow_id)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_execution(pool: &PgPool, id: Uuid) -> Result<ExecutionRow, DbError> {
    sqlx::query_as::<_, ExecutionRow>(&format!("SELECT {COLUMNS} FROM executions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound("executions"))
}

/// Move a `PENDING` or `RUNNING` execution to `RUNNING`. An existing
/// `started_at` is kept.
pub async fn mark_running(
    pool: &PgPool,
    id: Uuid,
    started_at: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE executions
         SET status = 'RUNNING', started_at = COALESCE(started_at, $1)
         WHERE id = $2 AND status IN ('PENDING', 'RUNNING')",
    )
    .bind(started_at)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Write a terminal status (`SUCCESS` or `FAILED`) unless one is already set.
pub async fn mark_finished(
    pool: &PgPool,
    id: Uuid,
    status: &str,
    completed_at: DateTime<Utc>,
    error: Option<&str>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE executions
         SET status = $1, completed_at = $2, error = $3
         WHERE id = $4 AND status IN ('PENDING', 'RUNNING')",
    )
    .bind(status)
    .bind(completed_at)
    .bind(error)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Fail an execution that no runner has picked up yet.
pub async fn cancel_pending(
    pool: &PgPool,
    id: Uuid,
    completed_at: DateTime<Utc>,
    reason: &str,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE executions
         SET status = 'FAILED', completed_at = $1, error = $2
         WHERE id = $3 AND status = 'PENDING'",
    )
    .bind(completed_at)
    .bind(reason)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Ask whichever runner owns a non-terminal execution to stop.
pub async fn request_cancel(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE executions
         SET cancel_requested = TRUE
         WHERE id = $1 AND status IN ('PENDING', 'RUNNING')",
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
