//! Telegram trigger ingress and webhook registration.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use engine::trigger::telegram_context;
use nodes::executors::telegram::register_webhook;
use nodes::{CredentialError, CredentialType, NodeError};

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramQuery {
    pub workflow_id: Option<Uuid>,
}

/// `POST /api/v1/webhooks/telegram?workflowId={id}`: one Bot API update.
///
/// Updates without a `message` are acknowledged and dropped.
pub async fn telegram(
    Query(query): Query<TelegramQuery>,
    State(state): State<AppState>,
    Json(update): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let workflow_id = query.workflow_id.ok_or_else(|| {
        ApiError::BadRequest("Missing required query parameter: workflowId".to_owned())
    })?;

    let Some(context) = telegram_context(&update) else {
        debug!(%workflow_id, "telegram update without message ignored");
        return Ok((StatusCode::OK, Json(json!({ "success": true }))));
    };

    let execution_id = state
        .engine
        .start_workflow_execution(workflow_id, context)
        .await?;
    Ok((
        StatusCode::OK,
        Json(json!({ "success": true, "executionId": execution_id })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetWebhookDto {
    pub credential_id: String,
    pub user_id: String,
    pub webhook_url: String,
}

/// `POST /api/v1/webhooks/telegram/set-webhook`: point a bot at this service.
pub async fn set_telegram_webhook(
    State(state): State<AppState>,
    Json(dto): Json<SetWebhookDto>,
) -> Result<Json<Value>, ApiError> {
    let token = state
        .credentials
        .resolve(&dto.credential_id, &dto.user_id)
        .await
        .map_err(|e| match e {
            CredentialError::NotFound(_) => ApiError::NotFound(e.to_string()),
            other => ApiError::BadRequest(other.to_string()),
        })?;
    if token.kind() != CredentialType::Telegram {
        return Err(ApiError::BadRequest(format!(
            "credential '{}' is a {} credential, not TELEGRAM",
            dto.credential_id,
            token.kind()
        )));
    }

    register_webhook(state.http.as_ref(), token.expose(), &dto.webhook_url)
        .await
        .map_err(|e| match e {
            NodeError::Validation { .. } => ApiError::BadRequest(e.to_string()),
            other => ApiError::Upstream(other.to_string()),
        })?;

    info!(credential_id = %dto.credential_id, "telegram webhook registered");
    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::test_support::{body_json, request, TestApp, USER_ID};

    fn update() -> serde_json::Value {
        json!({
            "update_id": 10,
            "message": {
                "chat": { "id": 99 },
                "from": { "id": 5, "username": "ada", "first_name": "Ada" },
                "text": "/start"
            }
        })
    }

    #[tokio::test]
    async fn message_update_queues_a_run_with_telegram_context() {
        let app = TestApp::new().await;
        let response = app
            .router()
            .oneshot(request(
                Method::POST,
                &format!("/api/v1/webhooks/telegram?workflowId={}", app.workflow_id),
                Some(update()),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["success"], true);
        let job = app.queue_job().await;
        assert_eq!(job.payload["telegram"]["chatId"], 99);
        assert_eq!(job.payload["telegram"]["from"]["firstName"], "Ada");
    }

    #[tokio::test]
    async fn missing_workflow_id_is_400() {
        let app = TestApp::new().await;
        let response = app
            .router()
            .oneshot(request(Method::POST, "/api/v1/webhooks/telegram", Some(update())))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["message"],
            "Missing required query parameter: workflowId"
        );
    }

    #[tokio::test]
    async fn update_without_message_is_acknowledged_and_dropped() {
        let app = TestApp::new().await;
        let response = app
            .router()
            .oneshot(request(
                Method::POST,
                &format!("/api/v1/webhooks/telegram?workflowId={}", app.workflow_id),
                Some(json!({ "update_id": 11, "my_chat_member": {} })),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.queue.pending_len().await, 0);
    }

    #[tokio::test]
    async fn set_webhook_registers_with_the_bot_api() {
        let app = TestApp::new().await;
        app.http
            .push_json(200, json!({ "ok": true, "result": true, "description": "Webhook was set" }));

        let response = app
            .router()
            .oneshot(request(
                Method::POST,
                "/api/v1/webhooks/telegram/set-webhook",
                Some(json!({
                    "credentialId": "bot",
                    "userId": USER_ID,
                    "webhookUrl": "https://flows.test/api/v1/webhooks/telegram?workflowId=w"
                })),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let sent = &app.http.requests()[0];
        assert!(sent.url.starts_with("https://api.telegram.org/bot123:ABC/setWebhook?url="));
    }

    #[tokio::test]
    async fn set_webhook_with_someone_elses_credential_is_404() {
        let app = TestApp::new().await;
        let response = app
            .router()
            .oneshot(request(
                Method::POST,
                "/api/v1/webhooks/telegram/set-webhook",
                Some(json!({ "credentialId": "bot", "userId": "intruder", "webhookUrl": "https://x.test" })),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(app.http.call_count(), 0);
    }

    #[tokio::test]
    async fn set_webhook_rejects_non_telegram_credentials() {
        let app = TestApp::new().await;
        let response = app
            .router()
            .oneshot(request(
                Method::POST,
                "/api/v1/webhooks/telegram/set-webhook",
                Some(json!({ "credentialId": "openai", "userId": USER_ID, "webhookUrl": "https://x.test" })),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(app.http.call_count(), 0);
    }
}
