//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow looks like
//! in memory. The graph part serialises to/from the JSONB `definition`
//! column of the `workflows` table.

use chrono::{DateTime, Utc};
use nodes::{CredentialType, NodeType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A single step in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within this workflow (referenced by connections).
    pub id: String,
    /// Selects the executor.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Executor-specific configuration, opaque to the engine.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: NodeType, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            node_type,
            data,
        }
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Directed data-flow edge from one node to another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub from_node_id: String,
    pub to_node_id: String,
}

impl Connection {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from_node_id: from.into(),
            to_node_id: to.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// The graph half of a workflow, as stored in `workflows.definition`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

/// A complete workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Owner; scopes credential lookups for every node.
    pub user_id: String,
    pub name: String,
    /// In creation order.
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// Convenience constructor for testing.
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        nodes: Vec<Node>,
        connections: Vec<Connection>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            name: name.into(),
            nodes,
            connections,
            created_at: Utc::now(),
        }
    }

    pub fn definition(&self) -> WorkflowDefinition {
        WorkflowDefinition {
            nodes: self.nodes.clone(),
            connections: self.connections.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// `PENDING → RUNNING → {SUCCESS, FAILED}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "SUCCESS" => Ok(Self::Success),
            "FAILED"  => Ok(Self::Failed),
            other     => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// One run of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Human-readable failure reason once the run has failed.
    pub error: Option<String>,
    /// Set by a cancel that could not reach the runner directly; the runner
    /// stops at its next node boundary.
    #[serde(default)]
    pub cancel_requested: bool,
}

impl Execution {
    pub fn pending(workflow_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            error: None,
            cancel_requested: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// A stored, still-encrypted credential.
#[derive(Debug, Clone)]
pub struct Credential {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub kind: CredentialType,
    /// Base64 of `nonce || ciphertext || tag`.
    pub encrypted_value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn workflow_parses_editor_json() {
        let workflow: Workflow = serde_json::from_value(json!({
            "userId": "u1",
            "name": "relay",
            "nodes": [
                { "id": "a", "type": "MANUAL_TRIGGER" },
                { "id": "b", "type": "HTTP_REQUEST", "data": { "variableName": "res" } }
            ],
            "connections": [{ "fromNodeId": "a", "toNodeId": "b" }]
        }))
        .unwrap();

        assert_eq!(workflow.nodes[1].node_type, NodeType::HttpRequest);
        assert_eq!(workflow.nodes[0].data, serde_json::Value::Null);
        assert_eq!(workflow.connections, vec![Connection::new("a", "b")]);
    }

    #[test]
    fn unknown_node_type_is_rejected_at_parse_time() {
        let parsed = serde_json::from_value::<Node>(json!({ "id": "a", "type": "FTP_UPLOAD" }));
        assert!(parsed.is_err());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Success,
            ExecutionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ExecutionStatus>().unwrap(), status);
        }
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }
}
