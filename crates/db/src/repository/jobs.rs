//! Job queue repository functions.
//!
//! The queue is backed by the `job_queue` Postgres table. Workers poll the
//! table and use `SELECT … FOR UPDATE SKIP LOCKED` for safe concurrent
//! processing.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::{models::JobRow, DbError};

const COLUMNS: &str =
    "id, execution_id, workflow_id, status, attempts, max_attempts, payload, created_at, updated_at";

/// Enqueue a new job for the given execution.
///
/// `payload` is arbitrary JSON that the worker will pass back to the engine.
pub async fn enqueue_job(
    pool: &PgPool,
    execution_id: Uuid,
    workflow_id: Uuid,
    max_attempts: i32,
    payload: serde_json::Value,
) -> Result<JobRow, DbError> {
    let now = Utc::now();

    let row = sqlx::query_as::<_, JobRow>(&format!(
        "INSERT INTO job_queue
             (id, execution_id, workflow_id, status, attempts, max_attempts, payload, created_at, updated_at)
         VALUES ($1, $2, $3, 'pending', 0, $4, $5, $6, $6)
         RETURNING {COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(execution_id)
    .bind(workflow_id)
    .bind(max_attempts)
    .bind(payload)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Atomically claim the oldest claimable job and mark it as `processing`.
///
/// A job is claimable when it is `pending`, or `processing` with an
/// `updated_at` older than `lease` (its worker stopped sending heartbeats).
/// Expired jobs that have used up their attempts are dead-lettered first.
///
/// Returns `None` if nothing is claimable.
pub async fn fetch_next_job(pool: &PgPool, lease: Duration) -> Result<Option<JobRow>, DbError> {
    let now = Utc::now();
    let stale_before = chrono::Duration::from_std(lease)
        .ok()
        .and_then(|lease| now.checked_sub_signed(lease))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE job_queue
         SET status = 'dead_lettered', updated_at = $1
         WHERE status = 'processing' AND updated_at < $2 AND attempts >= max_attempts",
    )
    .bind(now)
    .bind(stale_before)
    .execute(&mut *tx)
    .await?;

    let row = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {COLUMNS}
         FROM job_queue
         WHERE status = 'pending'
            OR (status = 'processing' AND updated_at < $1)
         ORDER BY created_at ASC
         LIMIT 1
         FOR UPDATE SKIP LOCKED"
    ))
    .bind(stale_before)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(job) = row else {
        tx.commit().await?;
        return Ok(None);
    };
    if job.status == "processing" {
        warn!(job_id = %job.id, attempts = job.attempts, "reclaiming job with an expired lease");
    }

    let claimed = sqlx::query_as::<_, JobRow>(&format!(
        "UPDATE job_queue
         SET status = 'processing', attempts = attempts + 1, updated_at = $1
         WHERE id = $2
         RETURNING {COLUMNS}"
    ))
    .bind(now)
    .bind(job.id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(Some(claimed))
}

/// Renew the lease on a job that is still `processing`.
pub async fn heartbeat_job(pool: &PgPool, job_id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE job_queue SET updated_at = $1 WHERE id = $2 AND status = 'processing'",
    )
    .bind(Utc::now())
    .bind(job_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound("job_queue"));
    }
    Ok(())
}

/// Mark a job as completed.
pub async fn complete_job(pool: &PgPool, job_id: Uuid) -> Result<(), DbError> {
    sqlx::query("UPDATE job_queue SET status = 'completed', updated_at = $1 WHERE id = $2")
        .bind(Utc::now())
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Return a claimed job to `pending`, or dead-letter it once its attempts
/// are spent.
pub async fn fail_job(pool: &PgPool, job_id: Uuid) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE job_queue
         SET status = CASE WHEN attempts >= max_attempts THEN 'dead_lettered' ELSE 'pending' END,
             updated_at = $1
         WHERE id = $2 AND status = 'processing'",
    )
    .bind(Utc::now())
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(())
}
