//! Slack incoming-webhook node.

use async_trait::async_trait;
use serde_json::json;

use crate::config::NodeConfig;
use crate::http::HttpRequest;
use crate::status::track;
use crate::template;
use crate::traits::{NodeExecutor, NodeInput};
use crate::{ExecutionContext, NodeError};

const LABEL: &str = "Slack";

/// Configuration: `variableName`, `webhookUrl`, `content` (templated).
pub struct SlackExecutor;

#[async_trait]
impl NodeExecutor for SlackExecutor {
    async fn execute(&self, input: NodeInput<'_>) -> Result<ExecutionContext, NodeError> {
        track(input.publish, input.node_id, run(input)).await
    }
}

async fn run(input: NodeInput<'_>) -> Result<ExecutionContext, NodeError> {
    let cfg = NodeConfig::new(LABEL, input.data);
    let variable_name = cfg.variable_name()?;
    let webhook_url = cfg.require_str("webhookUrl")?;
    let content = cfg.require_str("content")?;

    let content = template::render(content, &input.context);
    let request = HttpRequest::post_json(webhook_url, &json!({ "text": content }));

    let http = input.http;
    input
        .step
        .run("slack-webhook", || {
            let request = request.clone();
            async move {
                http.send(request).await?.error_for_status("slack")?;
                Ok(())
            }
        })
        .await?;

    Ok(input
        .context
        .with(variable_name, json!({ "messageContent": content })))
}
