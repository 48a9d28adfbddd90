//! Manual runs, execution polling and cancellation.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use engine::trigger::manual_context;
use engine::{CancelOutcome, Execution};

use crate::{ApiError, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteWorkflowDto {
    /// Initial context; must be an object when present.
    #[serde(default)]
    pub input: Option<Value>,
}

/// `POST /api/v1/workflows/{id}/execute`: queue a manual run.
///
/// The body is optional.
pub async fn execute(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let dto: ExecuteWorkflowDto = if body.iter().all(u8::is_ascii_whitespace) {
        ExecuteWorkflowDto::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?
    };

    let context = manual_context(dto.input)?;
    let execution_id = state.engine.start_workflow_execution(id, context).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "executionId": execution_id }))))
}

/// `GET /api/v1/executions/{id}`
pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Execution>, ApiError> {
    Ok(Json(state.engine.execution(id).await?))
}

/// `POST /api/v1/executions/{id}/cancel`
pub async fn cancel(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    match state.engine.cancel(id).await? {
        CancelOutcome::Signalled
        | CancelOutcome::CancelledBeforeStart
        | CancelOutcome::Requested => {
            Ok((StatusCode::ACCEPTED, Json(json!({ "success": true }))))
        }
        CancelOutcome::AlreadyFinished => Err(ApiError::Conflict(format!(
            "execution '{id}' has already finished"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::test_support::{body_json, request, TestApp};

    #[tokio::test]
    async fn execute_queues_a_pending_run() {
        let app = TestApp::new().await;

        let response = app
            .router()
            .oneshot(request(
                Method::POST,
                &format!("/api/v1/workflows/{}/execute", app.workflow_id),
                Some(json!({ "input": { "orderId": 17 } })),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        let execution_id = body["executionId"].as_str().unwrap().parse().unwrap();

        let execution = app.engine.execution(execution_id).await.unwrap();
        assert_eq!(execution.status, engine::ExecutionStatus::Pending);
        let job = app.queue_job().await;
        assert_eq!(job.payload, json!({ "orderId": 17 }));
    }

    #[tokio::test]
    async fn execute_without_body_starts_empty() {
        let app = TestApp::new().await;
        let response = app
            .router()
            .oneshot(request(
                Method::POST,
                &format!("/api/v1/workflows/{}/execute", app.workflow_id),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(app.queue_job().await.payload, json!({}));
    }

    #[tokio::test]
    async fn execute_rejects_non_object_input() {
        let app = TestApp::new().await;
        let response = app
            .router()
            .oneshot(request(
                Method::POST,
                &format!("/api/v1/workflows/{}/execute", app.workflow_id),
                Some(json!({ "input": [1, 2, 3] })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_workflow_is_404() {
        let app = TestApp::new().await;
        let response = app
            .router()
            .oneshot(request(
                Method::POST,
                &format!("/api/v1/workflows/{}/execute", uuid::Uuid::new_v4()),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn execution_can_be_polled_and_cancelled_once() {
        let app = TestApp::new().await;
        let execution_id = app.start().await;

        let response = app
            .router()
            .oneshot(request(Method::GET, &format!("/api/v1/executions/{execution_id}"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "PENDING");
        assert_eq!(body["workflowId"], app.workflow_id.to_string());

        let cancel = |app: &TestApp| {
            app.router().oneshot(request(
                Method::POST,
                &format!("/api/v1/executions/{execution_id}/cancel"),
                None,
            ))
        };
        assert_eq!(cancel(&app).await.unwrap().status(), StatusCode::ACCEPTED);
        assert_eq!(cancel(&app).await.unwrap().status(), StatusCode::CONFLICT);

        let execution = app.engine.execution(execution_id).await.unwrap();
        assert_eq!(execution.error.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn unknown_execution_is_404() {
        let app = TestApp::new().await;
        let response = app
            .router()
            .oneshot(request(
                Method::GET,
                &format!("/api/v1/executions/{}", uuid::Uuid::new_v4()),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
