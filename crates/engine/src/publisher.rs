//! In-process fan-out of node status events.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::trace;

use nodes::{NodeStatusEvent, StatusPublisher, STATUS_TOPIC};

/// One broadcast channel per node-type channel name.
///
/// Subscribers only see events published after they subscribed; an event
/// published with nobody listening is dropped.
pub struct BroadcastPublisher {
    capacity: usize,
    channels: RwLock<HashMap<String, broadcast::Sender<NodeStatusEvent>>>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Receive every later `status` event on `channel`.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<NodeStatusEvent> {
        if let Some(sender) = self
            .channels
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(channel)
        {
            return sender.subscribe();
        }

        self.channels
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}

impl StatusPublisher for BroadcastPublisher {
    fn publish(&self, channel: &str, topic: &str, event: NodeStatusEvent) {
        if topic != STATUS_TOPIC {
            return;
        }
        let channels = self
            .channels
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match channels.get(channel) {
            Some(sender) => {
                // No receivers is not an error for a status feed.
                let _ = sender.send(event);
            }
            None => trace!(channel, node_id = %event.node_id, "no subscribers for status event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodes::NodeStatus;

    fn event(node_id: &str, status: NodeStatus) -> NodeStatusEvent {
        NodeStatusEvent {
            node_id: node_id.into(),
            status,
        }
    }

    #[tokio::test]
    async fn subscribers_receive_events_for_their_channel_only() {
        let publisher = BroadcastPublisher::new(16);
        let mut http = publisher.subscribe("http-request-execution");
        let mut slack = publisher.subscribe("slack-execution");

        publisher.publish("http-request-execution", STATUS_TOPIC, event("b", NodeStatus::Loading));
        publisher.publish("http-request-execution", STATUS_TOPIC, event("b", NodeStatus::Success));

        assert_eq!(http.recv().await.unwrap(), event("b", NodeStatus::Loading));
        assert_eq!(http.recv().await.unwrap(), event("b", NodeStatus::Success));
        assert!(slack.try_recv().is_err());
    }

    #[tokio::test]
    async fn late_subscribers_miss_earlier_events() {
        let publisher = BroadcastPublisher::new(16);
        publisher.publish("openai-execution", STATUS_TOPIC, event("c", NodeStatus::Loading));

        let mut late = publisher.subscribe("openai-execution");
        publisher.publish("openai-execution", STATUS_TOPIC, event("c", NodeStatus::Error));

        assert_eq!(late.recv().await.unwrap(), event("c", NodeStatus::Error));
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn publishing_without_subscribers_does_not_fail() {
        let publisher = BroadcastPublisher::new(1);
        let _gone = publisher.subscribe("discord-execution");
        drop(_gone);
        publisher.publish("discord-execution", STATUS_TOPIC, event("d", NodeStatus::Success));
        publisher.publish("telegram-execution", STATUS_TOPIC, event("t", NodeStatus::Success));
    }
}
