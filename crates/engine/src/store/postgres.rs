//! Postgres-backed stores and job queue, built on the `db` repository functions.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use db::models::{CredentialRow, ExecutionRow, JobRow, WorkflowRow};
use db::repository::{credentials, executions, jobs, steps, workflows};
use db::{DbError, DbPool};
use queue::job::{DEFAULT_LEASE, DEFAULT_MAX_ATTEMPTS};
use queue::{Job, JobQueue, NewJob, QueueError};

use super::{CredentialStore, ExecutionStore, StepStore, StoreError, WorkflowStore};
use crate::models::{Credential, Execution, ExecutionStatus, Workflow, WorkflowDefinition};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
    job_lease: Duration,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            job_lease: DEFAULT_LEASE,
        }
    }

    /// How long a claimed job may go without a heartbeat before it is reclaimed.
    pub fn with_job_lease(mut self, lease: Duration) -> Self {
        self.job_lease = lease;
        self
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn not_found(what: String) -> impl FnOnce(DbError) -> StoreError {
    move |err| match err {
        DbError::NotFound(_) => StoreError::NotFound(what),
        other => StoreError::Database(other),
    }
}

fn workflow_from_row(row: WorkflowRow) -> Result<Workflow, StoreError> {
    let definition: WorkflowDefinition = serde_json::from_value(row.definition)
        .map_err(|e| StoreError::Corrupt(format!("workflow '{}': {e}", row.id)))?;
    Ok(Workflow {
        id: row.id,
        user_id: row.user_id,
        name: row.name,
        nodes: definition.nodes,
        connections: definition.connections,
        created_at: row.created_at,
    })
}

fn execution_from_row(row: ExecutionRow) -> Result<Execution, StoreError> {
    let status = row
        .status
        .parse()
        .map_err(|e: String| StoreError::Corrupt(format!("execution '{}': {e}", row.id)))?;
    Ok(Execution {
        id: row.id,
        workflow_id: row.workflow_id,
        status,
        started_at: row.started_at,
        completed_at: row.completed_at,
        error: row.error,
        cancel_requested: row.cancel_requested,
    })
}

fn credential_from_row(row: CredentialRow) -> Result<Credential, StoreError> {
    let kind = row
        .kind
        .parse()
        .map_err(|e: String| StoreError::Corrupt(format!("credential '{}': {e}", row.id)))?;
    Ok(Credential {
        id: row.id,
        user_id: row.user_id,
        name: row.name,
        kind,
        encrypted_value: row.encrypted_value,
    })
}

fn job_from_row(row: JobRow) -> Result<Job, QueueError> {
    let status = row
        .status
        .parse()
        .map_err(|e: String| QueueError::Backend(format!("job '{}': {e}", row.id)))?;
    Ok(Job {
        id: row.id,
        execution_id: row.execution_id,
        workflow_id: row.workflow_id,
        status,
        attempts: row.attempts,
        max_attempts: row.max_attempts,
        payload: row.payload,
        created_at: row.created_at,
    })
}

fn queue_error(err: DbError) -> QueueError {
    QueueError::Backend(err.to_string())
}

#[async_trait]
impl WorkflowStore for PgStore {
    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StoreError> {
        let row = workflows::get_workflow(&self.pool, id)
            .await
            .map_err(not_found(format!("workflow '{id}'")))?;
        workflow_from_row(row)
    }

    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let definition = serde_json::to_value(workflow.definition())
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        workflows::create_workflow(
            &self.pool,
            workflow.id,
            &workflow.user_id,
            &workflow.name,
            definition,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for PgStore {
    async fn create_execution(&self, workflow_id: Uuid) -> Result<Execution, StoreError> {
        let row = executions::create_execution(&self.pool, Uuid::new_v4(), workflow_id).await?;
        execution_from_row(row)
    }

    async fn get_execution(&self, id: Uuid) -> Result<Execution, StoreError> {
        let row = executions::get_execution(&self.pool, id)
            .await
            .map_err(not_found(format!("execution '{id}'")))?;
        execution_from_row(row)
    }

    async fn mark_running(&self, id: Uuid, started_at: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(executions::mark_running(&self.pool, id, started_at).await?)
    }

    async fn mark_finished(
        &self,
        id: Uuid,
        status: ExecutionStatus,
        completed_at: DateTime<Utc>,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        Ok(executions::mark_finished(&self.pool, id, status.as_str(), completed_at, error).await?)
    }

    async fn cancel_pending(
        &self,
        id: Uuid,
        completed_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<bool, StoreError> {
        Ok(executions::cancel_pending(&self.pool, id, completed_at, reason).await?)
    }

    async fn request_cancel(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(executions::request_cancel(&self.pool, id).await?)
    }
}

#[async_trait]
impl StepStore for PgStore {
    async fn get_step(&self, execution_id: Uuid, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(steps::get_step(&self.pool, execution_id, key).await?)
    }

    async fn put_step(&self, execution_id: Uuid, key: &str, output: Value) -> Result<(), StoreError> {
        Ok(steps::put_step(&self.pool, execution_id, key, output).await?)
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn get_credential(&self, id: &str, user_id: &str) -> Result<Credential, StoreError> {
        let row = credentials::get_credential(&self.pool, id, user_id)
            .await
            .map_err(not_found(format!("credential '{id}'")))?;
        credential_from_row(row)
    }

    async fn save_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        credentials::create_credential(
            &self.pool,
            &credential.id,
            &credential.user_id,
            &credential.name,
            credential.kind.as_str(),
            &credential.encrypted_value,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for PgStore {
    async fn enqueue(&self, job: NewJob) -> Result<Job, QueueError> {
        let row = jobs::enqueue_job(
            &self.pool,
            job.execution_id,
            job.workflow_id,
            DEFAULT_MAX_ATTEMPTS,
            job.payload,
        )
        .await
        .map_err(queue_error)?;
        job_from_row(row)
    }

    async fn dequeue(&self) -> Result<Option<Job>, QueueError> {
        jobs::fetch_next_job(&self.pool, self.job_lease)
            .await
            .map_err(queue_error)?
            .map(job_from_row)
            .transpose()
    }

    async fn heartbeat(&self, job_id: Uuid) -> Result<(), QueueError> {
        jobs::heartbeat_job(&self.pool, job_id).await.map_err(|err| match err {
            DbError::NotFound(_) => QueueError::NotFound(job_id),
            other => queue_error(other),
        })
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        jobs::complete_job(&self.pool, job_id).await.map_err(queue_error)
    }

    async fn fail(&self, job_id: Uuid) -> Result<(), QueueError> {
        jobs::fail_job(&self.pool, job_id).await.map_err(queue_error)
    }
}
