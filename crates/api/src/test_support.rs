//! Shared fixture for handler tests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use serde_json::Value;
use uuid::Uuid;

use engine::store::WorkflowStore;
use engine::{
    BroadcastPublisher, Engine, EngineConfig, MemoryStore, Node, RetryPolicy, Stores, Workflow,
    WorkflowRunner,
};
use nodes::mock::{MockHttpClient, StaticCredentials};
use nodes::{CredentialType, NodeRegistry, NodeType, Secret};
use queue::{Job, JobQueue, MemoryQueue};

use crate::{router, AppState};

pub(crate) const USER_ID: &str = "user-1";

pub(crate) struct TestApp {
    pub state: AppState,
    pub engine: Arc<Engine>,
    pub queue: Arc<MemoryQueue>,
    pub http: Arc<MockHttpClient>,
    /// A saved single-node manual workflow.
    pub workflow_id: Uuid,
}

impl TestApp {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let publisher = Arc::new(BroadcastPublisher::new(16));
        let http = Arc::new(MockHttpClient::new());
        let credentials = Arc::new(
            StaticCredentials::default()
                .with("bot", USER_ID, Secret::new(CredentialType::Telegram, "123:ABC"))
                .with("openai", USER_ID, Secret::new(CredentialType::Openai, "sk-test")),
        );

        let runner = WorkflowRunner::new(
            Stores::shared(store.clone()),
            NodeRegistry::builtin(),
            publisher.clone(),
            credentials.clone(),
            http.clone(),
            RetryPolicy::no_retry(),
        )
        .unwrap();
        let engine = Arc::new(Engine::new(Arc::new(runner), queue.clone(), EngineConfig::default()));

        let workflow = Workflow::new(
            USER_ID,
            "manual",
            vec![Node::new("a", NodeType::ManualTrigger, Value::Null)],
            vec![],
        );
        store.save_workflow(&workflow).await.unwrap();

        Self {
            state: AppState {
                engine: engine.clone(),
                publisher,
                credentials,
                http: http.clone(),
            },
            engine,
            queue,
            http,
            workflow_id: workflow.id,
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Queue a run of the fixture workflow directly.
    pub async fn start(&self) -> Uuid {
        self.engine
            .start_workflow_execution(self.workflow_id, nodes::ExecutionContext::new())
            .await
            .unwrap()
    }

    /// Claim the next queued job; panics if there is none.
    pub async fn queue_job(&self) -> Job {
        self.queue.dequeue().await.unwrap().expect("a queued job")
    }
}

pub(crate) fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub(crate) async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
