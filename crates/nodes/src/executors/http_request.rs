//! HTTP request node.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::NodeConfig;
use crate::http::{HttpMethod, HttpRequest};
use crate::status::track;
use crate::template;
use crate::traits::{NodeExecutor, NodeInput};
use crate::{ExecutionContext, NodeError};

const LABEL: &str = "HTTP Request";

/// Calls an arbitrary endpoint and stores `{status, statusText, data}`.
///
/// Configuration: `variableName`, `endpoint` (templated), optional `method`
/// (default `GET`) and `body` (templated JSON, sent for POST/PUT/PATCH).
pub struct HttpRequestExecutor;

#[async_trait]
impl NodeExecutor for HttpRequestExecutor {
    async fn execute(&self, input: NodeInput<'_>) -> Result<ExecutionContext, NodeError> {
        track(input.publish, input.node_id, run(input)).await
    }
}

async fn run(input: NodeInput<'_>) -> Result<ExecutionContext, NodeError> {
    let cfg = NodeConfig::new(LABEL, input.data);
    let variable_name = cfg.variable_name()?;
    let endpoint = cfg.require_str("endpoint")?;
    let method = match cfg.optional_str("method") {
        Some(method) => method
            .parse::<HttpMethod>()
            .map_err(|e| NodeError::invalid(LABEL, e))?,
        None => HttpMethod::Get,
    };

    let url = template::render(endpoint, &input.context);
    if url.trim().is_empty() {
        return Err(NodeError::invalid(LABEL, "endpoint rendered to an empty URL"));
    }

    let mut request = HttpRequest::new(method, url);
    if method.has_body() {
        if let Some(body) = cfg.optional_str("body") {
            let rendered = template::render(body, &input.context);
            if let Err(e) = serde_json::from_str::<Value>(&rendered) {
                return Err(NodeError::invalid(LABEL, format!("body is not valid JSON: {e}")));
            }
            request = request.with_json_body(rendered);
        }
    }

    let http = input.http;
    let payload: Value = input
        .step
        .run("http-request", || {
            let request = request.clone();
            async move {
                let response = http.send(request).await?.error_for_status("http")?;
                Ok(json!({
                    "status": response.status,
                    "statusText": response.status_text,
                    "data": response.data(),
                }))
            }
        })
        .await?;

    Ok(input.context.with(variable_name, payload))
}
