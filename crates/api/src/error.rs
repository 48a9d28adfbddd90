//! HTTP mapping of handler failures.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use engine::EngineError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// A third party refused or failed a call made on the caller's behalf.
    #[error("{0}")]
    Upstream(String),

    #[error(transparent)]
    Internal(EngineError),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::WorkflowNotFound(_) | EngineError::ExecutionNotFound(_) => {
                Self::NotFound(err.to_string())
            }
            EngineError::InvalidContext(_) | EngineError::InvalidWorkflow(_) => {
                Self::BadRequest(err.to_string())
            }
            EngineError::AlreadyRunning(_) => Self::Conflict(err.to_string()),
            other => Self::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self {
            Self::Internal(err) => {
                error!(error = %err, "request failed");
                "internal server error".to_owned()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}
