//! Durable step runner: memoises step results per execution and retries
//! transient failures with exponential back-off.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use nodes::{NodeError, StepFn, StepRunner};

use crate::config::RetryPolicy;
use crate::store::StepStore;

/// A [`StepRunner`] bound to one node of one execution.
///
/// Step names are stored as `<node id>/<step name>`, so two nodes that use
/// the same step name never share a recorded result.
pub struct DurableStepRunner {
    execution_id: Uuid,
    scope: String,
    store: Arc<dyn StepStore>,
    policy: RetryPolicy,
}

impl DurableStepRunner {
    pub fn new(
        execution_id: Uuid,
        node_id: &str,
        store: Arc<dyn StepStore>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            execution_id,
            scope: node_id.to_owned(),
            store,
            policy,
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}/{name}", self.scope)
    }

    async fn recorded(&self, key: &str) -> Result<Option<Value>, NodeError> {
        self.store
            .get_step(self.execution_id, key)
            .await
            .map_err(|e| NodeError::unexpected(format!("reading step '{key}': {e}")))
    }

    async fn record(&self, key: &str, output: Value) -> Result<(), NodeError> {
        self.store
            .put_step(self.execution_id, key, output)
            .await
            .map_err(|e| NodeError::unexpected(format!("recording step '{key}': {e}")))
    }
}

#[async_trait]
impl StepRunner for DurableStepRunner {
    async fn run_json(&self, name: &str, mut f: StepFn<'_>) -> Result<Value, NodeError> {
        let key = self.key(name);
        if let Some(output) = self.recorded(&key).await? {
            debug!(execution_id = %self.execution_id, step = %key, "step replayed from record");
            return Ok(output);
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match f().await {
                Ok(output) => {
                    self.record(&key, output.clone()).await?;
                    return Ok(output);
                }
                Err(err) if !err.is_retriable() => return Err(err),
                Err(err) if attempt >= max_attempts => {
                    return Err(NodeError::RetryExhausted {
                        step: name.to_owned(),
                        attempts: attempt,
                        message: err.to_string(),
                    });
                }
                Err(err) => {
                    let backoff = self.policy.backoff(attempt);
                    warn!(
                        execution_id = %self.execution_id,
                        step = %key,
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "step failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn sleep(&self, name: &str, duration: Duration) -> Result<(), NodeError> {
        let key = self.key(name);
        let wake_at = match self.recorded(&key).await? {
            Some(record) => record
                .get("wakeAt")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc))
                .ok_or_else(|| NodeError::unexpected(format!("step '{key}' is not a sleep record")))?,
            None => {
                let wake_at = Utc::now()
                    + chrono::Duration::from_std(duration).map_err(NodeError::unexpected)?;
                self.record(&key, json!({ "wakeAt": wake_at.to_rfc3339() }))
                    .await?;
                wake_at
            }
        };

        if let Ok(remaining) = (wake_at - Utc::now()).to_std() {
            tokio::time::sleep(remaining).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::store::MemoryStore;

    fn runner(store: Arc<MemoryStore>, execution_id: Uuid, node_id: &str) -> DurableStepRunner {
        DurableStepRunner::new(execution_id, node_id, store, RetryPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_success() {
        let store = Arc::new(MemoryStore::new());
        let step = runner(store, Uuid::new_v4(), "b");
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let out: String = (&step as &dyn StepRunner)
            .run("call", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(NodeError::transient("http", "503"))
                } else {
                    Ok("done".to_string())
                }
            })
            .await
            .unwrap();

        assert_eq!(out, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms + 200ms of back-off.
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn completed_steps_are_not_run_again() {
        let store = Arc::new(MemoryStore::new());
        let execution_id = Uuid::new_v4();
        let step = runner(store.clone(), execution_id, "b");
        let calls = AtomicU32::new(0);
        let body = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(42u32)
        };

        let first: u32 = (&step as &dyn StepRunner).run("x", body).await.unwrap();
        let second: u32 = (&step as &dyn StepRunner).run("x", body).await.unwrap();

        assert_eq!((first, second), (42, 42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.step_keys(execution_id).await, vec!["b/x"]);
    }

    #[tokio::test]
    async fn a_fresh_runner_replays_the_recorded_result() {
        let store = Arc::new(MemoryStore::new());
        let execution_id = Uuid::new_v4();
        let calls = AtomicU32::new(0);
        let body = || async {
            Ok(calls.fetch_add(1, Ordering::SeqCst))
        };

        let before_restart = runner(store.clone(), execution_id, "b");
        let first: u32 = (&before_restart as &dyn StepRunner).run("x", body).await.unwrap();
        let after_restart = runner(store.clone(), execution_id, "b");
        let second: u32 = (&after_restart as &dyn StepRunner).run("x", body).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn step_records_are_scoped_per_node_and_execution() {
        let store = Arc::new(MemoryStore::new());
        let execution_id = Uuid::new_v4();
        let calls = AtomicU32::new(0);
        let body = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };

        for (exec, node) in [(execution_id, "a"), (execution_id, "b"), (Uuid::new_v4(), "a")] {
            let step = runner(store.clone(), exec, node);
            (&step as &dyn StepRunner).run::<(), _, _>("send", body).await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retriable_failures_stop_after_one_attempt() {
        let store = Arc::new(MemoryStore::new());
        let execution_id = Uuid::new_v4();
        let step = runner(store.clone(), execution_id, "b");
        let calls = AtomicU32::new(0);

        let err = (&step as &dyn StepRunner)
            .run::<(), _, _>("call", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(NodeError::rejected("http", "404 Not Found"))
            })
            .await
            .unwrap_err();

        assert!(!err.is_retriable());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.step_keys(execution_id).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let store = Arc::new(MemoryStore::new());
        let step = runner(store, Uuid::new_v4(), "b");
        let calls = AtomicU32::new(0);

        let err = (&step as &dyn StepRunner)
            .run::<(), _, _>("call", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(NodeError::transient("http", "timeout"))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(err, NodeError::RetryExhausted { attempts: 4, .. }));
        assert!(!err.is_retriable());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_records_its_wake_up_time() {
        let store = Arc::new(MemoryStore::new());
        let execution_id = Uuid::new_v4();
        let step = runner(store.clone(), execution_id, "b");

        step.sleep("pause", Duration::from_secs(60)).await.unwrap();

        let record = store.get_step(execution_id, "b/pause").await.unwrap().unwrap();
        assert!(record["wakeAt"].is_string());
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_sleep_is_not_repeated() {
        let store = Arc::new(MemoryStore::new());
        let execution_id = Uuid::new_v4();
        let past = Utc::now() - chrono::Duration::minutes(5);
        store
            .put_step(execution_id, "b/pause", json!({ "wakeAt": past.to_rfc3339() }))
            .await
            .unwrap();

        let step = runner(store, execution_id, "b");
        let started = tokio::time::Instant::now();
        step.sleep("pause", Duration::from_secs(60)).await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
