//! Workflow runner: the per-execution state machine.
//!
//! `WorkflowRunner` drives one execution from `PENDING` to a terminal state:
//! 1. Loads the workflow and sorts its graph. A graph that cannot be sorted
//!    fails the execution before any node runs.
//! 2. Marks the execution `RUNNING`.
//! 3. Runs nodes one at a time in sorted order, threading the context from
//!    each node into the next.
//! 4. Persists `SUCCESS`, or `FAILED` with the reason, on the first node error
//!    or cancellation.
//!
//! Cancellation arrives either through the caller's token or as a flag on the
//! stored execution, set by a process that does not own the run. Both are
//! checked before every node. Every status write is conditional; when one is
//! refused because the execution already finished elsewhere, the stored
//! outcome is reported instead.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use nodes::{
    CredentialResolver, ExecutionContext, HttpClient, NodeInput, NodeRegistry, NodeStatusPublisher,
    StatusPublisher,
};

use crate::config::RetryPolicy;
use crate::dag::sort_nodes;
use crate::models::{Execution, ExecutionStatus, Workflow};
use crate::step::DurableStepRunner;
use crate::store::{StoreError, Stores};
use crate::EngineError;

/// How an execution ended.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    /// Context after the last node that succeeded.
    pub context: ExecutionContext,
    pub error: Option<String>,
}

/// Runs executions. Holds no per-run state, so one instance serves every
/// concurrent run.
pub struct WorkflowRunner {
    stores: Stores,
    registry: NodeRegistry,
    publisher: Arc<dyn StatusPublisher>,
    credentials: Arc<dyn CredentialResolver>,
    http: Arc<dyn HttpClient>,
    retry: RetryPolicy,
}

impl WorkflowRunner {
    /// # Errors
    /// [`EngineError::Registry`] if any node type lacks an executor.
    pub fn new(
        stores: Stores,
        registry: NodeRegistry,
        publisher: Arc<dyn StatusPublisher>,
        credentials: Arc<dyn CredentialResolver>,
        http: Arc<dyn HttpClient>,
        retry: RetryPolicy,
    ) -> Result<Self, EngineError> {
        registry.validate()?;
        Ok(Self {
            stores,
            registry,
            publisher,
            credentials,
            http,
            retry,
        })
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Run execution `execution_id` to a terminal state.
    ///
    /// Node failures and cancellation end in `Ok` with a `FAILED` result;
    /// `Err` means the run could not be driven at all (store unavailable,
    /// unknown execution).
    #[instrument(skip(self, initial_context, cancel), fields(execution_id = %execution_id))]
    pub async fn run(
        &self,
        execution_id: Uuid,
        initial_context: ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, EngineError> {
        let execution = self
            .stores
            .executions
            .get_execution(execution_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => EngineError::ExecutionNotFound(execution_id),
                other => other.into(),
            })?;

        if execution.status.is_terminal() {
            info!(status = %execution.status, "execution already finished, skipping");
            return Ok(settled(execution, initial_context));
        }

        let workflow = match self.stores.workflows.get_workflow(execution.workflow_id).await {
            Ok(workflow) => workflow,
            Err(StoreError::NotFound(_)) => {
                let reason = EngineError::WorkflowNotFound(execution.workflow_id).to_string();
                return self.fail(execution_id, initial_context, reason).await;
            }
            Err(other) => return Err(other.into()),
        };

        self.run_workflow(execution_id, &workflow, initial_context, cancel)
            .await
    }

    async fn run_workflow(
        &self,
        execution_id: Uuid,
        workflow: &Workflow,
        initial_context: ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, EngineError> {
        let order = match sort_nodes(&workflow.nodes, &workflow.connections) {
            Ok(order) => order,
            Err(err) => {
                warn!(workflow_id = %workflow.id, error = %err, "workflow graph rejected");
                let reason = EngineError::from(err).to_string();
                return self.fail(execution_id, initial_context, reason).await;
            }
        };

        if !self
            .stores
            .executions
            .mark_running(execution_id, Utc::now())
            .await?
        {
            return self.finished_elsewhere(execution_id, initial_context).await;
        }
        info!(
            workflow_id = %workflow.id,
            nodes = order.len(),
            "execution running"
        );

        let mut context = initial_context;
        for node in order {
            if cancel.is_cancelled() || self.cancel_requested(execution_id).await? {
                info!(next_node = %node.id, "execution cancelled");
                return self
                    .fail(execution_id, context, EngineError::Cancelled.to_string())
                    .await;
            }

            let Some(executor) = self.registry.get(node.node_type) else {
                // Unreachable once `new` has validated the registry.
                let reason = format!("no executor registered for {:?}", node.node_type);
                return self.fail(execution_id, context, reason).await;
            };

            let step = DurableStepRunner::new(
                execution_id,
                &node.id,
                self.stores.steps.clone(),
                self.retry.clone(),
            );
            let publish = NodeStatusPublisher::new(node.node_type.channel(), self.publisher.clone());
            let input = NodeInput {
                data: &node.data,
                node_id: &node.id,
                context: context.clone(),
                user_id: &workflow.user_id,
                step: &step,
                publish: &publish,
                credentials: self.credentials.as_ref(),
                http: self.http.as_ref(),
            };

            match executor.execute(input).await {
                Ok(next) => {
                    info!(node_id = %node.id, node_type = ?node.node_type, "node succeeded");
                    context = next;
                }
                Err(source) => {
                    let err = EngineError::NodeFailed {
                        node_id: node.id.clone(),
                        source,
                    };
                    error!(error = %err, "node failed");
                    return self.fail(execution_id, context, err.to_string()).await;
                }
            }
        }

        if !self
            .stores
            .executions
            .mark_finished(execution_id, ExecutionStatus::Success, Utc::now(), None)
            .await?
        {
            return self.finished_elsewhere(execution_id, context).await;
        }
        info!(workflow_id = %workflow.id, "execution succeeded");

        Ok(ExecutionResult {
            execution_id,
            status: ExecutionStatus::Success,
            context,
            error: None,
        })
    }

    /// Persist `FAILED` with `reason`.
    pub(crate) async fn fail(
        &self,
        execution_id: Uuid,
        context: ExecutionContext,
        reason: String,
    ) -> Result<ExecutionResult, EngineError> {
        if !self
            .stores
            .executions
            .mark_finished(execution_id, ExecutionStatus::Failed, Utc::now(), Some(&reason))
            .await?
        {
            return self.finished_elsewhere(execution_id, context).await;
        }
        error!(%execution_id, reason = %reason, "execution failed");

        Ok(ExecutionResult {
            execution_id,
            status: ExecutionStatus::Failed,
            context,
            error: Some(reason),
        })
    }

    async fn cancel_requested(&self, execution_id: Uuid) -> Result<bool, EngineError> {
        Ok(self
            .stores
            .executions
            .get_execution(execution_id)
            .await?
            .cancel_requested)
    }

    /// A status write was refused: report what is stored instead.
    async fn finished_elsewhere(
        &self,
        execution_id: Uuid,
        context: ExecutionContext,
    ) -> Result<ExecutionResult, EngineError> {
        let execution = self.stores.executions.get_execution(execution_id).await?;
        warn!(status = %execution.status, "execution was settled by another writer");
        Ok(settled(execution, context))
    }
}

fn settled(execution: Execution, context: ExecutionContext) -> ExecutionResult {
    ExecutionResult {
        execution_id: execution.id,
        status: execution.status,
        context,
        error: execution.error,
    }
}
