//! Run service: enqueue, workers, status polling and cancellation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use nodes::ExecutionContext;
use queue::{Job, JobQueue, NewJob};

use crate::config::EngineConfig;
use crate::models::Execution;
use crate::runner::{ExecutionResult, WorkflowRunner};
use crate::store::StoreError;
use crate::EngineError;

/// Result of [`Engine::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// A runner was told to stop before its next node.
    Signalled,
    /// The execution had not started; it is now `FAILED`.
    CancelledBeforeStart,
    /// The run belongs to another process; it was flagged and stops at its
    /// next node boundary.
    Requested,
    /// The execution had already reached a terminal state.
    AlreadyFinished,
}

type ActiveRuns = Arc<Mutex<HashMap<Uuid, CancellationToken>>>;

/// Removes an execution from the active set when its run ends.
struct ActiveGuard {
    active: ActiveRuns,
    execution_id: Uuid,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.execution_id);
    }
}

/// Entry point for triggering and supervising runs.
pub struct Engine {
    runner: Arc<WorkflowRunner>,
    queue: Arc<dyn JobQueue>,
    config: EngineConfig,
    active: ActiveRuns,
}

impl Engine {
    pub fn new(runner: Arc<WorkflowRunner>, queue: Arc<dyn JobQueue>, config: EngineConfig) -> Self {
        Self {
            runner,
            queue,
            config,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn runner(&self) -> &WorkflowRunner {
        &self.runner
    }

    /// Create a `PENDING` execution and queue it. Returns without waiting
    /// for the run.
    pub async fn start_workflow_execution(
        &self,
        workflow_id: Uuid,
        initial_context: ExecutionContext,
    ) -> Result<Uuid, EngineError> {
        let stores = self.runner.stores();
        stores
            .workflows
            .get_workflow(workflow_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => EngineError::WorkflowNotFound(workflow_id),
                other => other.into(),
            })?;

        let execution = stores.executions.create_execution(workflow_id).await?;
        self.queue
            .enqueue(NewJob {
                execution_id: execution.id,
                workflow_id,
                payload: initial_context.into_value(),
            })
            .await?;

        info!(%workflow_id, execution_id = %execution.id, "execution queued");
        Ok(execution.id)
    }

    pub async fn execution(&self, execution_id: Uuid) -> Result<Execution, EngineError> {
        self.runner
            .stores()
            .executions
            .get_execution(execution_id)
            .await
            .map_err(|e| not_found(e, execution_id))
    }

    /// Stop `execution_id` at its next node boundary.
    ///
    /// Side effects already dispatched by the current node are not undone.
    /// Only a `PENDING` execution is failed here; a started run is stopped by
    /// its own runner, directly when it lives in this process and through a
    /// stored flag otherwise.
    pub async fn cancel(&self, execution_id: Uuid) -> Result<CancelOutcome, EngineError> {
        let token = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&execution_id)
            .cloned();
        if let Some(token) = token {
            token.cancel();
            info!(%execution_id, "cancellation requested");
            return Ok(CancelOutcome::Signalled);
        }

        let executions = &self.runner.stores().executions;
        let reason = EngineError::Cancelled.to_string();
        if executions
            .cancel_pending(execution_id, chrono::Utc::now(), &reason)
            .await
            .map_err(|e| not_found(e, execution_id))?
        {
            info!(%execution_id, "execution cancelled before start");
            return Ok(CancelOutcome::CancelledBeforeStart);
        }
        if executions
            .request_cancel(execution_id)
            .await
            .map_err(|e| not_found(e, execution_id))?
        {
            info!(%execution_id, "cancellation flagged for the owning runner");
            return Ok(CancelOutcome::Requested);
        }

        self.execution(execution_id).await?;
        Ok(CancelOutcome::AlreadyFinished)
    }

    /// Run `execution_id` now, refusing if another runner owns it.
    pub async fn run_execution(
        &self,
        execution_id: Uuid,
        initial_context: ExecutionContext,
    ) -> Result<ExecutionResult, EngineError> {
        let token = CancellationToken::new();
        let _guard = {
            let mut active = self
                .active
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if active.contains_key(&execution_id) {
                return Err(EngineError::AlreadyRunning(execution_id));
            }
            active.insert(execution_id, token.clone());
            ActiveGuard {
                active: self.active.clone(),
                execution_id,
            }
        };

        self.runner.run(execution_id, initial_context, &token).await
    }

    /// Process one dequeued job and settle it with the queue.
    ///
    /// The job's lease is renewed every `job_heartbeat` while the run is in
    /// progress.
    pub async fn run_job(&self, job: Job) -> Result<ExecutionResult, EngineError> {
        let context = match context_from_payload(job.payload.clone()) {
            Ok(context) => context,
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "job payload is not a context object");
                let result = self
                    .runner
                    .fail(job.execution_id, ExecutionContext::new(), err.to_string())
                    .await;
                self.queue.complete(job.id).await?;
                return result;
            }
        };

        let mut run = std::pin::pin!(self.run_execution(job.execution_id, context));
        let mut heartbeat = tokio::time::interval(self.config.job_heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;
        let outcome = loop {
            tokio::select! {
                outcome = &mut run => break outcome,
                _ = heartbeat.tick() => {
                    if let Err(err) = self.queue.heartbeat(job.id).await {
                        warn!(job_id = %job.id, error = %err, "failed to renew job lease");
                    }
                }
            }
        };

        match outcome {
            Ok(result) => {
                self.queue.complete(job.id).await?;
                Ok(result)
            }
            Err(err @ EngineError::AlreadyRunning(_)) => {
                // The owning runner settles the execution; this job is a duplicate.
                self.queue.complete(job.id).await?;
                Err(err)
            }
            Err(err) => {
                error!(job_id = %job.id, attempt = job.attempts, error = %err, "job failed");
                self.queue.fail(job.id).await?;
                Err(err)
            }
        }
    }

    /// Drain the queue in this task, one job at a time.
    ///
    /// A job that errors is logged and left to the queue's retry rules; the
    /// drain carries on with the next one.
    pub async fn run_pending(&self) -> Result<Vec<ExecutionResult>, EngineError> {
        let mut results = Vec::new();
        while let Some(job) = self.queue.dequeue().await? {
            let execution_id = job.execution_id;
            match self.run_job(job).await {
                Ok(result) => results.push(result),
                Err(err) => warn!(%execution_id, error = %err, "job did not complete"),
            }
        }
        Ok(results)
    }

    /// Poll the queue until `shutdown` fires, running up to
    /// `max_concurrent_runs` jobs at once.
    pub async fn run_worker(self: Arc<Self>, shutdown: CancellationToken) {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_runs.max(1)));
        info!(
            max_concurrent_runs = self.config.max_concurrent_runs,
            "worker started"
        );

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let job = match self.queue.dequeue().await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => continue,
                    }
                }
                Err(err) => {
                    drop(permit);
                    error!(error = %err, "failed to poll job queue");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => continue,
                    }
                }
            };

            let engine = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let execution_id = job.execution_id;
                match engine.run_job(job).await {
                    Ok(result) => debug!(%execution_id, status = %result.status, "job settled"),
                    Err(err) => warn!(%execution_id, error = %err, "job did not complete"),
                }
            });
        }

        // Let in-flight runs finish before returning.
        let _ = permits
            .acquire_many(self.config.max_concurrent_runs.max(1) as u32)
            .await;
        info!("worker stopped");
    }
}

fn not_found(err: StoreError, execution_id: Uuid) -> EngineError {
    match err {
        StoreError::NotFound(_) => EngineError::ExecutionNotFound(execution_id),
        other => other.into(),
    }
}

fn context_from_payload(payload: Value) -> Result<ExecutionContext, EngineError> {
    ExecutionContext::from_value(payload).map_err(EngineError::InvalidContext)
}
