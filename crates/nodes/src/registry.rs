//! Node type → executor lookup.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::executors::{
    AiCompletionExecutor, AiProvider, DiscordExecutor, HttpRequestExecutor, SlackExecutor,
    TelegramExecutor, TriggerExecutor,
};
use crate::{NodeExecutor, NodeType};

#[derive(Debug, Error)]
#[error("no executor registered for node types: {0:?}")]
pub struct MissingExecutors(pub Vec<NodeType>);

/// Executor for each built-in node type.
///
/// The match is exhaustive, so adding a variant to [`NodeType`] does not
/// compile until it has an executor here.
fn builtin_executor(node_type: NodeType) -> Arc<dyn NodeExecutor> {
    match node_type {
        NodeType::Initial | NodeType::ManualTrigger => Arc::new(TriggerExecutor::manual()),
        NodeType::TelegramTrigger => Arc::new(TriggerExecutor::telegram()),
        NodeType::HttpRequest => Arc::new(HttpRequestExecutor),
        NodeType::Openai => Arc::new(AiCompletionExecutor::new(AiProvider::Openai)),
        NodeType::Groq => Arc::new(AiCompletionExecutor::new(AiProvider::Groq)),
        NodeType::Anthropic => Arc::new(AiCompletionExecutor::new(AiProvider::Anthropic)),
        NodeType::Gemini => Arc::new(AiCompletionExecutor::new(AiProvider::Gemini)),
        NodeType::Slack => Arc::new(SlackExecutor),
        NodeType::Discord => Arc::new(DiscordExecutor),
        NodeType::Telegram => Arc::new(TelegramExecutor),
    }
}

/// Maps every [`NodeType`] to its executor.
#[derive(Clone)]
pub struct NodeRegistry {
    executors: HashMap<NodeType, Arc<dyn NodeExecutor>>,
}

impl NodeRegistry {
    /// Registry with every built-in executor.
    pub fn builtin() -> Self {
        let executors = NodeType::ALL
            .into_iter()
            .map(|node_type| (node_type, builtin_executor(node_type)))
            .collect();
        Self { executors }
    }

    /// Registry with nothing in it; only useful as a base for [`Self::register`].
    pub fn empty() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Install (or replace) the executor for `node_type`.
    pub fn register(mut self, node_type: NodeType, executor: Arc<dyn NodeExecutor>) -> Self {
        self.executors.insert(node_type, executor);
        self
    }

    pub fn get(&self, node_type: NodeType) -> Option<&Arc<dyn NodeExecutor>> {
        self.executors.get(&node_type)
    }

    /// Fails if any node type has no executor. Call once at start-up.
    pub fn validate(&self) -> Result<(), MissingExecutors> {
        let missing: Vec<NodeType> = NodeType::ALL
            .into_iter()
            .filter(|node_type| !self.executors.contains_key(node_type))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(MissingExecutors(missing))
        }
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockNode;
    use serde_json::json;

    #[test]
    fn builtin_registry_covers_every_type() {
        assert!(NodeRegistry::builtin().validate().is_ok());
    }

    #[test]
    fn partial_registry_reports_what_is_missing() {
        let registry = NodeRegistry::empty()
            .register(NodeType::HttpRequest, Arc::new(MockNode::returning("b", "b", json!({}))));
        let missing = registry.validate().unwrap_err().0;
        assert_eq!(missing.len(), NodeType::ALL.len() - 1);
        assert!(!missing.contains(&NodeType::HttpRequest));
    }
}
