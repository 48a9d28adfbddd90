//! The `NodeExecutor` trait: the contract every node type must fulfil.

use async_trait::async_trait;
use serde_json::Value;

use crate::credential::CredentialResolver;
use crate::http::HttpClient;
use crate::status::NodeStatusPublisher;
use crate::step::StepRunner;
use crate::{ExecutionContext, NodeError};

/// Everything one node invocation gets to work with.
///
/// Every collaborator is passed in explicitly; executors hold no clients
/// or handles of their own.
pub struct NodeInput<'a> {
    /// The node's configuration, opaque to the engine.
    pub data: &'a Value,
    pub node_id: &'a str,
    /// Context produced by the previous node.
    pub context: ExecutionContext,
    /// Owner of the workflow; scopes credential lookups.
    pub user_id: &'a str,
    pub step: &'a dyn StepRunner,
    /// Already bound to this node type's channel.
    pub publish: &'a NodeStatusPublisher,
    pub credentials: &'a dyn CredentialResolver,
    pub http: &'a dyn HttpClient,
}

/// The core node trait.
///
/// Implementations publish `loading` first, `success` or `error` last, and
/// return the input context extended with at most one new key.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(&self, input: NodeInput<'_>) -> Result<ExecutionContext, NodeError>;
}
