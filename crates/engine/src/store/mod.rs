//! Persistence contracts the engine needs, with in-memory and Postgres
//! implementations.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Credential, Execution, ExecutionStatus, Workflow};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    /// A stored row could not be mapped onto a domain type.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StoreError>;

    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), StoreError>;
}

/// Execution records.
///
/// Every transition is conditional on the current status, so a terminal
/// execution never changes again no matter how many processes write to it.
/// The `bool` results report whether the transition applied.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create_execution(&self, workflow_id: Uuid) -> Result<Execution, StoreError>;

    async fn get_execution(&self, id: Uuid) -> Result<Execution, StoreError>;

    /// `PENDING`/`RUNNING` to `RUNNING`. `started_at` is kept from the first attempt.
    async fn mark_running(&self, id: Uuid, started_at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Any non-terminal status to `status` (`SUCCESS` or `FAILED`).
    async fn mark_finished(
        &self,
        id: Uuid,
        status: ExecutionStatus,
        completed_at: DateTime<Utc>,
        error: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// `PENDING` to `FAILED`; a run that has already started is left alone.
    async fn cancel_pending(
        &self,
        id: Uuid,
        completed_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<bool, StoreError>;

    /// Flag a non-terminal execution for cancellation at its next node boundary.
    async fn request_cancel(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// Memoised step outputs keyed by `(execution id, step key)`.
#[async_trait]
pub trait StepStore: Send + Sync {
    async fn get_step(&self, execution_id: Uuid, key: &str) -> Result<Option<Value>, StoreError>;

    async fn put_step(&self, execution_id: Uuid, key: &str, output: Value) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Credential `id`, if it belongs to `user_id`.
    async fn get_credential(&self, id: &str, user_id: &str) -> Result<Credential, StoreError>;

    async fn save_credential(&self, credential: &Credential) -> Result<(), StoreError>;
}

/// One handle per store contract.
#[derive(Clone)]
pub struct Stores {
    pub workflows: Arc<dyn WorkflowStore>,
    pub executions: Arc<dyn ExecutionStore>,
    pub steps: Arc<dyn StepStore>,
    pub credentials: Arc<dyn CredentialStore>,
}

impl Stores {
    /// Use one backend for every contract.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: WorkflowStore + ExecutionStore + StepStore + CredentialStore + 'static,
    {
        Self {
            workflows: store.clone(),
            executions: store.clone(),
            steps: store.clone(),
            credentials: store,
        }
    }
}
