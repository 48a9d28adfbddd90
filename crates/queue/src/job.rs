//! Job model and the queue contract.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::QueueError;

/// Attempts a job gets before it is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// How long a claimed job may go without a heartbeat before another worker
/// may reclaim it.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    DeadLettered,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending      => write!(f, "pending"),
            Self::Processing   => write!(f, "processing"),
            Self::Completed    => write!(f, "completed"),
            Self::DeadLettered => write!(f, "dead_lettered"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"       => Ok(Self::Pending),
            "processing"    => Ok(Self::Processing),
            "completed"     => Ok(Self::Completed),
            "dead_lettered" => Ok(Self::DeadLettered),
            other           => Err(format!("unknown job status: {other}")),
        }
    }
}

/// What the caller asks to be run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    /// Initial context for the run.
    pub payload: serde_json::Value,
}

/// A queued run request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub status: JobStatus,
    /// Times the job has been handed to a worker.
    pub attempts: i32,
    pub max_attempts: i32,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Durable hand-off between run enqueue and workers.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: NewJob) -> Result<Job, QueueError>;

    /// Claim the oldest pending job, or `None` if there is nothing to do.
    ///
    /// A `processing` job whose lease has expired counts as pending: its
    /// worker is presumed dead. One that has used up its attempts is
    /// dead-lettered instead.
    async fn dequeue(&self) -> Result<Option<Job>, QueueError>;

    /// Renew the lease on a claimed job.
    async fn heartbeat(&self, job_id: Uuid) -> Result<(), QueueError>;

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError>;

    /// Put the job back, or dead-letter it once `max_attempts` is reached.
    async fn fail(&self, job_id: Uuid) -> Result<(), QueueError>;
}
