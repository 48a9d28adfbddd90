//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

use nodes::registry::MissingExecutors;
use nodes::NodeError;

use crate::store::StoreError;

/// Reasons a workflow graph cannot be executed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowValidationError {
    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// A connection references a node ID that doesn't exist in the workflow.
    #[error("connection references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// Topological sort detected a cycle.
    #[error("workflow graph contains a cycle")]
    CycleDetected,
}

/// Errors produced by the workflow engine (validation, execution and plumbing).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(#[from] WorkflowValidationError),

    #[error("workflow '{0}' not found")]
    WorkflowNotFound(Uuid),

    #[error("execution '{0}' not found")]
    ExecutionNotFound(Uuid),

    /// A node failed; the run is aborted.
    #[error("node '{node_id}' failed: {source}")]
    NodeFailed {
        node_id: String,
        #[source]
        source: NodeError,
    },

    /// The run was cancelled before its next node started.
    #[error("cancelled")]
    Cancelled,

    /// Another runner already owns this execution.
    #[error("execution '{0}' is already being run")]
    AlreadyRunning(Uuid),

    #[error("initial context must be a JSON object, got: {0}")]
    InvalidContext(serde_json::Value),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] queue::QueueError),

    #[error(transparent)]
    Registry(#[from] MissingExecutors),
}
