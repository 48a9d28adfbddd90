//! Live node status events.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{ExecutionContext, NodeError};

/// Topic every status event is published under.
pub const STATUS_TOPIC: &str = "status";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Loading,
    Success,
    Error,
}

/// Payload broadcast on a node-type channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatusEvent {
    pub node_id: String,
    pub status: NodeStatus,
}

/// Fire-and-forget broadcast to whoever is listening right now.
///
/// Publishing never fails from the caller's point of view; an
/// implementation that cannot deliver drops the event.
pub trait StatusPublisher: Send + Sync {
    fn publish(&self, channel: &str, topic: &str, event: NodeStatusEvent);
}

/// A [`StatusPublisher`] bound to one node-type channel.
#[derive(Clone)]
pub struct NodeStatusPublisher {
    channel: &'static str,
    inner: Arc<dyn StatusPublisher>,
}

impl NodeStatusPublisher {
    pub fn new(channel: &'static str, inner: Arc<dyn StatusPublisher>) -> Self {
        Self { channel, inner }
    }

    pub fn channel(&self) -> &'static str {
        self.channel
    }

    pub fn publish(&self, node_id: &str, status: NodeStatus) {
        self.inner.publish(
            self.channel,
            STATUS_TOPIC,
            NodeStatusEvent {
                node_id: node_id.to_owned(),
                status,
            },
        );
    }

    pub fn loading(&self, node_id: &str) {
        self.publish(node_id, NodeStatus::Loading);
    }

    pub fn success(&self, node_id: &str) {
        self.publish(node_id, NodeStatus::Success);
    }

    pub fn error(&self, node_id: &str) {
        self.publish(node_id, NodeStatus::Error);
    }
}

/// Wrap an executor body with the loading → success | error status protocol.
pub async fn track<F>(
    publish: &NodeStatusPublisher,
    node_id: &str,
    work: F,
) -> Result<ExecutionContext, NodeError>
where
    F: Future<Output = Result<ExecutionContext, NodeError>>,
{
    publish.loading(node_id);
    let result = work.await;
    match &result {
        Ok(_) => publish.success(node_id),
        Err(e) => {
            tracing::debug!(node_id, channel = publish.channel(), error = %e, "node failed");
            publish.error(node_id);
        }
    }
    result
}
