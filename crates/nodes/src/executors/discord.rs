//! Discord webhook node.

use async_trait::async_trait;
use serde_json::json;

use crate::config::NodeConfig;
use crate::executors::truncate_chars;
use crate::http::HttpRequest;
use crate::status::track;
use crate::template;
use crate::traits::{NodeExecutor, NodeInput};
use crate::{ExecutionContext, NodeError};

const LABEL: &str = "Discord";
const MAX_CONTENT_CHARS: usize = 2000;

/// Configuration, validated in this order: `variableName`, `webhookUrl`,
/// `content`, `username`. Both `content` and `username` are templated.
pub struct DiscordExecutor;

#[async_trait]
impl NodeExecutor for DiscordExecutor {
    async fn execute(&self, input: NodeInput<'_>) -> Result<ExecutionContext, NodeError> {
        track(input.publish, input.node_id, run(input)).await
    }
}

async fn run(input: NodeInput<'_>) -> Result<ExecutionContext, NodeError> {
    let cfg = NodeConfig::new(LABEL, input.data);
    let variable_name = cfg.variable_name()?;
    let webhook_url = cfg.require_str("webhookUrl")?;
    let content = cfg.require_str("content")?;
    let username = cfg.require_str("username")?;

    let content = truncate_chars(&template::render(content, &input.context), MAX_CONTENT_CHARS);
    let username = template::render(username, &input.context);
    let request = HttpRequest::post_json(
        webhook_url,
        &json!({ "content": content, "username": username }),
    );

    let http = input.http;
    input
        .step
        .run("discord-webhook", || {
            let request = request.clone();
            async move {
                http.send(request).await?.error_for_status("discord")?;
                Ok(())
            }
        })
        .await?;

    Ok(input
        .context
        .with(variable_name, json!({ "messageContent": content })))
}
