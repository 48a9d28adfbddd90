//! Trigger nodes.
//!
//! The trigger payload is normalised into the initial context before the run
//! starts, so a trigger node only has to hand that context on.

use async_trait::async_trait;

use crate::status::track;
use crate::traits::{NodeExecutor, NodeInput};
use crate::{ExecutionContext, NodeError};

pub struct TriggerExecutor {
    step_name: &'static str,
}

impl TriggerExecutor {
    /// Started by a click; the context starts out as whatever the caller sent.
    pub fn manual() -> Self {
        Self { step_name: "manual-trigger" }
    }

    /// Started by a Telegram update already stored under `telegram`.
    pub fn telegram() -> Self {
        Self { step_name: "telegram-trigger" }
    }
}

#[async_trait]
impl NodeExecutor for TriggerExecutor {
    async fn execute(&self, input: NodeInput<'_>) -> Result<ExecutionContext, NodeError> {
        let NodeInput { node_id, context, step, publish, .. } = input;
        let step_name = self.step_name;

        track(publish, node_id, async move {
            step.run(step_name, || {
                let context = context.clone();
                async move { Ok(context) }
            })
            .await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Harness, MockHttpClient};
    use crate::NodeStatus;
    use serde_json::json;

    #[tokio::test]
    async fn passes_context_through_unchanged() {
        let harness = Harness::new(MockHttpClient::new());
        let context = ExecutionContext::from_value(json!({
            "telegram": { "chatId": 42, "text": "hi" }
        }))
        .unwrap();

        let out = TriggerExecutor::telegram()
            .execute(harness.input("trigger", &json!({}), context.clone()))
            .await
            .expect("trigger succeeds");

        assert_eq!(out, context);
        assert_eq!(harness.steps.names(), vec!["telegram-trigger"]);
        assert_eq!(
            harness.publisher.statuses(),
            vec![("trigger".into(), NodeStatus::Loading), ("trigger".into(), NodeStatus::Success)]
        );
    }

    #[tokio::test]
    async fn manual_trigger_with_empty_context_stays_empty() {
        let harness = Harness::new(MockHttpClient::new());
        let out = TriggerExecutor::manual()
            .execute(harness.input("m", &json!({}), ExecutionContext::new()))
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
