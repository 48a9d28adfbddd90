//! Telegram Bot API node, plus webhook registration for the Telegram trigger.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::NodeConfig;
use crate::credential::CredentialType;
use crate::executors::truncate_chars;
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::status::track;
use crate::template;
use crate::traits::{NodeExecutor, NodeInput};
use crate::{ExecutionContext, NodeError};

const LABEL: &str = "Telegram";
const SERVICE: &str = "telegram";
const API_BASE: &str = "https://api.telegram.org";
const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Value,
}

fn parse_reply(response: HttpResponse) -> Result<Value, NodeError> {
    // Telegram reports failures in the body, often alongside a 4xx.
    let reply: ApiReply = response
        .json()
        .ok()
        .and_then(|v| serde_json::from_value(v).ok())
        .ok_or_else(|| {
            NodeError::transient(SERVICE, format!("unreadable reply ({} {})", response.status, response.status_text))
        })?;

    if reply.ok {
        return Ok(reply.result);
    }
    let description = reply.description.unwrap_or_else(|| "request failed".to_owned());
    if response.status >= 500 || response.status == 429 {
        Err(NodeError::transient(SERVICE, description))
    } else {
        Err(NodeError::rejected(SERVICE, description))
    }
}

/// Sends a bot message.
///
/// Configuration, validated in this order: `variableName`, `credentialId`
/// (a TELEGRAM bot token), `chatId` and `content` (both templated).
pub struct TelegramExecutor;

#[async_trait]
impl NodeExecutor for TelegramExecutor {
    async fn execute(&self, input: NodeInput<'_>) -> Result<ExecutionContext, NodeError> {
        track(input.publish, input.node_id, run(input)).await
    }
}

async fn run(input: NodeInput<'_>) -> Result<ExecutionContext, NodeError> {
    let cfg = NodeConfig::new(LABEL, input.data);
    let variable_name = cfg.variable_name()?;
    let credential_id = cfg.require_str("credentialId")?;
    let chat_id = cfg.require_text("chatId")?;
    let content = cfg.require_str("content")?;

    let token = cfg
        .credential(input.credentials, credential_id, input.user_id, CredentialType::Telegram)
        .await?;

    let chat_id = template::render(&chat_id, &input.context);
    if chat_id.trim().is_empty() {
        return Err(NodeError::invalid(LABEL, "chatId rendered to an empty value"));
    }
    let text = truncate_chars(&template::render(content, &input.context), MAX_MESSAGE_CHARS);

    let request = HttpRequest::post_json(
        format!("{API_BASE}/bot{}/sendMessage", token.expose()),
        &json!({ "chat_id": chat_id, "text": text }),
    );
    drop(token);

    let http = input.http;
    let message_id: Value = input
        .step
        .run("telegram-send-message", || {
            let request = request.clone();
            async move {
                let result = parse_reply(http.send(request).await?)?;
                Ok(result.get("message_id").cloned().unwrap_or(Value::Null))
            }
        })
        .await?;

    Ok(input.context.with(
        variable_name,
        json!({ "messageContent": text, "chatId": chat_id, "messageId": message_id }),
    ))
}

/// Point a bot's webhook at `webhook_url`.
pub async fn register_webhook(
    http: &dyn HttpClient,
    token: &str,
    webhook_url: &str,
) -> Result<(), NodeError> {
    let url = reqwest::Url::parse_with_params(
        &format!("{API_BASE}/bot{token}/setWebhook"),
        &[("url", webhook_url)],
    )
    .map_err(|e| NodeError::invalid(LABEL, format!("invalid webhook URL: {e}")))?;

    parse_reply(http.send(HttpRequest::get(url.as_str())).await?)?;
    Ok(())
}
