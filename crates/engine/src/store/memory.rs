//! In-process store for tests and one-shot CLI runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CredentialStore, ExecutionStore, StepStore, StoreError, WorkflowStore};
use crate::models::{Credential, Execution, ExecutionStatus, Workflow};

#[derive(Default)]
pub struct MemoryStore {
    workflows: RwLock<HashMap<Uuid, Workflow>>,
    executions: RwLock<HashMap<Uuid, Execution>>,
    steps: RwLock<HashMap<(Uuid, String), Value>>,
    credentials: RwLock<HashMap<String, Credential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `update` to execution `id` under the write lock.
    async fn transition(
        &self,
        id: Uuid,
        update: impl FnOnce(&mut Execution) -> bool,
    ) -> Result<bool, StoreError> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("execution '{id}'")))?;
        Ok(update(execution))
    }

    /// Keys of every step recorded for `execution_id`, sorted.
    pub async fn step_keys(&self, execution_id: Uuid) -> Vec<String> {
        let mut keys: Vec<String> = self
            .steps
            .read()
            .await
            .keys()
            .filter(|(id, _)| *id == execution_id)
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StoreError> {
        self.workflows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("workflow '{id}'")))
    }

    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        self.workflows
            .write()
            .await
            .insert(workflow.id, workflow.clone());
        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn create_execution(&self, workflow_id: Uuid) -> Result<Execution, StoreError> {
        let execution = Execution::pending(workflow_id);
        self.executions
            .write()
            .await
            .insert(execution.id, execution.clone());
        Ok(execution)
    }

    async fn get_execution(&self, id: Uuid) -> Result<Execution, StoreError> {
        self.executions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("execution '{id}'")))
    }

    async fn mark_running(&self, id: Uuid, started_at: DateTime<Utc>) -> Result<bool, StoreError> {
        self.transition(id, |execution| {
            if execution.status.is_terminal() {
                return false;
            }
            execution.status = ExecutionStatus::Running;
            execution.started_at.get_or_insert(started_at);
            true
        })
        .await
    }

    async fn mark_finished(
        &self,
        id: Uuid,
        status: ExecutionStatus,
        completed_at: DateTime<Utc>,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        self.transition(id, |execution| {
            if execution.status.is_terminal() {
                return false;
            }
            execution.status = status;
            execution.completed_at = Some(completed_at);
            execution.error = error.map(str::to_owned);
            true
        })
        .await
    }

    async fn cancel_pending(
        &self,
        id: Uuid,
        completed_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<bool, StoreError> {
        self.transition(id, |execution| {
            if execution.status != ExecutionStatus::Pending {
                return false;
            }
            execution.status = ExecutionStatus::Failed;
            execution.completed_at = Some(completed_at);
            execution.error = Some(reason.to_owned());
            true
        })
        .await
    }

    async fn request_cancel(&self, id: Uuid) -> Result<bool, StoreError> {
        self.transition(id, |execution| {
            if execution.status.is_terminal() {
                return false;
            }
            execution.cancel_requested = true;
            true
        })
        .await
    }
}

#[async_trait]
impl StepStore for MemoryStore {
    async fn get_step(&self, execution_id: Uuid, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .steps
            .read()
            .await
            .get(&(execution_id, key.to_owned()))
            .cloned())
    }

    async fn put_step(&self, execution_id: Uuid, key: &str, output: Value) -> Result<(), StoreError> {
        self.steps
            .write()
            .await
            .entry((execution_id, key.to_owned()))
            .or_insert(output);
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_credential(&self, id: &str, user_id: &str) -> Result<Credential, StoreError> {
        self.credentials
            .read()
            .await
            .get(id)
            .filter(|c| c.user_id == user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("credential '{id}'")))
    }

    async fn save_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        self.credentials
            .write()
            .await
            .insert(credential.id.clone(), credential.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodes::CredentialType;
    use serde_json::json;

    #[tokio::test]
    async fn started_at_survives_a_second_mark_running() {
        let store = MemoryStore::new();
        let execution = store.create_execution(Uuid::new_v4()).await.unwrap();
        let first = Utc::now();
        store.mark_running(execution.id, first).await.unwrap();
        store
            .mark_running(execution.id, first + chrono::Duration::seconds(30))
            .await
            .unwrap();

        let stored = store.get_execution(execution.id).await.unwrap();
        assert_eq!(stored.status, ExecutionStatus::Running);
        assert_eq!(stored.started_at, Some(first));
    }

    #[tokio::test]
    async fn terminal_executions_never_change_again() {
        let store = MemoryStore::new();
        let execution = store.create_execution(Uuid::new_v4()).await.unwrap();
        assert!(store.cancel_pending(execution.id, Utc::now(), "cancelled").await.unwrap());

        assert!(!store.mark_running(execution.id, Utc::now()).await.unwrap());
        assert!(!store
            .mark_finished(execution.id, ExecutionStatus::Success, Utc::now(), None)
            .await
            .unwrap());
        assert!(!store.request_cancel(execution.id).await.unwrap());

        let stored = store.get_execution(execution.id).await.unwrap();
        assert_eq!(stored.status, ExecutionStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("cancelled"));
        assert!(stored.started_at.is_none());
    }

    #[tokio::test]
    async fn started_runs_are_flagged_rather_than_failed() {
        let store = MemoryStore::new();
        let execution = store.create_execution(Uuid::new_v4()).await.unwrap();
        store.mark_running(execution.id, Utc::now()).await.unwrap();

        assert!(!store.cancel_pending(execution.id, Utc::now(), "cancelled").await.unwrap());
        assert!(store.request_cancel(execution.id).await.unwrap());

        let stored = store.get_execution(execution.id).await.unwrap();
        assert_eq!(stored.status, ExecutionStatus::Running);
        assert!(stored.cancel_requested);
    }

    #[tokio::test]
    async fn first_step_write_wins() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store.put_step(id, "n/s", json!(1)).await.unwrap();
        store.put_step(id, "n/s", json!(2)).await.unwrap();
        assert_eq!(store.get_step(id, "n/s").await.unwrap(), Some(json!(1)));
        assert_eq!(store.get_step(Uuid::new_v4(), "n/s").await.unwrap(), None);
    }

    #[tokio::test]
    async fn credentials_are_scoped_to_their_owner() {
        let store = MemoryStore::new();
        store
            .save_credential(&Credential {
                id: "c1".into(),
                user_id: "alice".into(),
                name: "groq".into(),
                kind: CredentialType::Groq,
                encrypted_value: "sealed".into(),
            })
            .await
            .unwrap();

        assert!(store.get_credential("c1", "alice").await.is_ok());
        assert!(matches!(
            store.get_credential("c1", "mallory").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
