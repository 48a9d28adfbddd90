//! Memoised step outputs, keyed by `(execution_id, step_name)`.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Output recorded for `step_name`, if the step already completed.
pub async fn get_step(
    pool: &PgPool,
    execution_id: Uuid,
    step_name: &str,
) -> Result<Option<serde_json::Value>, DbError> {
    let output: Option<(serde_json::Value,)> = sqlx::query_as(
        "SELECT output FROM step_results WHERE execution_id = $1 AND step_name = $2",
    )
    .bind(execution_id)
    .bind(step_name)
    .fetch_optional(pool)
    .await?;

    Ok(output.map(|(value,)| value))
}

/// Record a step output. The first write wins; replays never overwrite it.
pub async fn put_step(
    pool: &PgPool,
    execution_id: Uuid,
    step_name: &str,
    output: serde_json::Value,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO step_results (execution_id, step_name, output, created_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (execution_id, step_name) DO NOTHING",
    )
    .bind(execution_id)
    .bind(step_name)
    .bind(output)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}
