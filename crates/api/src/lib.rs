//! `api` crate: HTTP front door.
//!
//! Exposes:
//!   POST /api/v1/workflows/{id}/execute
//!   GET  /api/v1/executions/{id}
//!   POST /api/v1/executions/{id}/cancel
//!   POST /api/v1/webhooks/telegram?workflowId={id}
//!   POST /api/v1/webhooks/telegram/set-webhook
//!   GET  /api/v1/channels/{channel}/status   (server-sent events)

pub mod error;
pub mod handlers;

#[cfg(test)]
mod test_support;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use engine::{BroadcastPublisher, Engine};
use nodes::{CredentialResolver, HttpClient};

pub use error::ApiError;

/// Shared handles every handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Source of the live status streams.
    pub publisher: Arc<BroadcastPublisher>,
    pub credentials: Arc<dyn CredentialResolver>,
    pub http: Arc<dyn HttpClient>,
}

pub fn router(state: AppState) -> Router {
    use handlers::{executions, status, webhooks};

    Router::new()
        .route("/api/v1/workflows/:id/execute", post(executions::execute))
        .route("/api/v1/executions/:id", get(executions::get))
        .route("/api/v1/executions/:id/cancel", post(executions::cancel))
        .route("/api/v1/webhooks/telegram", post(webhooks::telegram))
        .route(
            "/api/v1/webhooks/telegram/set-webhook",
            post(webhooks::set_telegram_webhook),
        )
        .route("/api/v1/channels/:channel/status", get(status::stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `bind` until `shutdown` resolves.
pub async fn serve<F>(bind: SocketAddr, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "api listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
