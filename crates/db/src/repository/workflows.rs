//! Workflow definition storage.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::WorkflowRow, DbError};

const COLUMNS: &str = "id, user_id, name, definition, created_at";

/// Insert a new workflow.
///
/// `definition` is the serialised node/connection graph produced by the
/// `engine` crate.
pub async fn create_workflow(
    pool: &PgPool,
    id: Uuid,
    user_id: &str,
    name: &str,
    definition: serde_json::Value,
) -> Result<WorkflowRow, DbError> {
    let row = sqlx::query_as::<_, WorkflowRow>(&format!(
        "INSERT INTO workflows (id, user_id, name, definition, created_at)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(user_id)
    .bind(name)
    .bind(definition)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch a single workflow by its primary key.
pub async fn get_workflow(pool: &PgPool, id: Uuid) -> Result<WorkflowRow, DbError> {
    sqlx::query_as::<_, WorkflowRow>(&format!("SELECT {COLUMNS} FROM workflows WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound("workflows"))
}
