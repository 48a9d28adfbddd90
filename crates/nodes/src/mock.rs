//! Test doubles for the executor contract and its collaborators.
//!
//! Used by unit tests here and by the engine's runner tests, so nothing
//! in this module talks to a network, a database or a clock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::credential::{CredentialResolver, Secret};
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::status::{track, NodeStatus, NodeStatusEvent, NodeStatusPublisher, StatusPublisher};
use crate::step::{StepFn, StepRunner};
use crate::traits::{NodeExecutor, NodeInput};
use crate::{CredentialError, ExecutionContext, NodeError};

/// Owner id used by [`Harness`].
pub const USER_ID: &str = "user-1";

// ---------------------------------------------------------------------------
// MockNode
// ---------------------------------------------------------------------------

/// Behaviour injected into `MockNode` at construction time.
pub enum MockBehaviour {
    /// Store this value under the node's variable name.
    ReturnValue(Value),
    /// Fail with a retriable error.
    FailRetriable(String),
    /// Fail with a non-retriable error.
    FailNonRetriable(String),
}

/// A node that records every context it receives and returns a
/// programmer-specified result.
pub struct MockNode {
    /// Label used in test assertions.
    pub name: String,
    /// Output variable the node writes on success.
    pub variable_name: String,
    pub behaviour: MockBehaviour,
    /// All input contexts seen by this node (in call order).
    pub calls: Arc<Mutex<Vec<ExecutionContext>>>,
}

impl MockNode {
    fn with_behaviour(name: &str, variable_name: &str, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.to_owned(),
            variable_name: variable_name.to_owned(),
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always succeeds, writing `value` under `variable_name`.
    pub fn returning(name: &str, variable_name: &str, value: Value) -> Self {
        Self::with_behaviour(name, variable_name, MockBehaviour::ReturnValue(value))
    }

    pub fn failing_retriable(name: &str, msg: &str) -> Self {
        Self::with_behaviour(name, name, MockBehaviour::FailRetriable(msg.to_owned()))
    }

    pub fn failing_non_retriable(name: &str, msg: &str) -> Self {
        Self::with_behaviour(name, name, MockBehaviour::FailNonRetriable(msg.to_owned()))
    }

    /// Number of times this node has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl NodeExecutor for MockNode {
    async fn execute(&self, input: NodeInput<'_>) -> Result<ExecutionContext, NodeError> {
        self.calls.lock().unwrap().push(input.context.clone());

        let outcome = match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(input.context.with(self.variable_name.clone(), v.clone())),
            MockBehaviour::FailRetriable(msg) => Err(NodeError::transient(&self.name, msg.clone())),
            MockBehaviour::FailNonRetriable(msg) => Err(NodeError::invalid(&self.name, msg.clone())),
        };
        track(input.publish, input.node_id, async { outcome }).await
    }
}

// ---------------------------------------------------------------------------
// MockHttpClient
// ---------------------------------------------------------------------------

/// Replays scripted responses in order and records every request.
#[derive(Default)]
pub struct MockHttpClient {
    responses: Mutex<VecDeque<Result<HttpResponse, NodeError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, status: u16, body: Value) {
        self.push_response(status, Some("application/json"), body.to_string());
    }

    pub fn push_text(&self, status: u16, body: &str) {
        self.push_response(status, Some("text/plain"), body.to_owned());
    }

    pub fn push_error(&self, error: NodeError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    fn push_response(&self, status: u16, content_type: Option<&str>, body: String) {
        let status_text = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or_default()
            .to_owned();
        self.responses.lock().unwrap().push_back(Ok(HttpResponse {
            status,
            status_text,
            content_type: content_type.map(str::to_owned),
            body,
        }));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NodeError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(NodeError::unexpected(format!("no scripted response for {}", request.url))))
    }
}

// ---------------------------------------------------------------------------
// RecordingPublisher
// ---------------------------------------------------------------------------

/// Keeps every published `(channel, topic, event)` triple.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(String, String, NodeStatusEvent)>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<(String, String, NodeStatusEvent)> {
        self.events.lock().unwrap().clone()
    }

    /// Just `(node_id, status)`, in publish order.
    pub fn statuses(&self) -> Vec<(String, NodeStatus)> {
        self.events()
            .into_iter()
            .map(|(_, _, event)| (event.node_id, event.status))
            .collect()
    }
}

impl StatusPublisher for RecordingPublisher {
    fn publish(&self, channel: &str, topic: &str, event: NodeStatusEvent) {
        self.events
            .lock()
            .unwrap()
            .push((channel.to_owned(), topic.to_owned(), event));
    }
}

// ---------------------------------------------------------------------------
// PassthroughStepRunner
// ---------------------------------------------------------------------------

/// Runs every step body exactly once: no memoisation, no retries.
#[derive(Default)]
pub struct PassthroughStepRunner {
    names: Mutex<Vec<String>>,
}

impl PassthroughStepRunner {
    /// Names of the steps run so far (sleeps included).
    pub fn names(&self) -> Vec<String> {
        self.names.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepRunner for PassthroughStepRunner {
    async fn run_json(&self, name: &str, mut f: StepFn<'_>) -> Result<Value, NodeError> {
        self.names.lock().unwrap().push(name.to_owned());
        f().await
    }

    async fn sleep(&self, name: &str, _duration: Duration) -> Result<(), NodeError> {
        self.names.lock().unwrap().push(name.to_owned());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StaticCredentials
// ---------------------------------------------------------------------------

/// In-memory credential table keyed by `(credential id, user id)`.
#[derive(Default)]
pub struct StaticCredentials {
    entries: HashMap<(String, String), Result<Secret, CredentialError>>,
}

impl StaticCredentials {
    pub fn with(mut self, credential_id: &str, user_id: &str, secret: Secret) -> Self {
        self.entries
            .insert((credential_id.to_owned(), user_id.to_owned()), Ok(secret));
        self
    }

    /// A credential that exists but cannot be decrypted.
    pub fn with_undecryptable(mut self, credential_id: &str, user_id: &str) -> Self {
        self.entries.insert(
            (credential_id.to_owned(), user_id.to_owned()),
            Err(CredentialError::Decryption(credential_id.to_owned())),
        );
        self
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentials {
    async fn resolve(&self, credential_id: &str, user_id: &str) -> Result<Secret, CredentialError> {
        self.entries
            .get(&(credential_id.to_owned(), user_id.to_owned()))
            .cloned()
            .unwrap_or_else(|| Err(CredentialError::NotFound(credential_id.to_owned())))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// One of each collaborator, wired the way the runner wires them.
pub struct Harness {
    pub publisher: Arc<RecordingPublisher>,
    pub publish: NodeStatusPublisher,
    pub steps: PassthroughStepRunner,
    pub credentials: StaticCredentials,
    pub http: MockHttpClient,
}

impl Harness {
    pub fn new(http: MockHttpClient) -> Self {
        let publisher = Arc::new(RecordingPublisher::default());
        Self {
            publish: NodeStatusPublisher::new("test-execution", publisher.clone()),
            publisher,
            steps: PassthroughStepRunner::default(),
            credentials: StaticCredentials::default(),
            http,
        }
    }

    pub fn with_credential(mut self, credential_id: &str, user_id: &str, secret: Secret) -> Self {
        self.credentials = self.credentials.with(credential_id, user_id, secret);
        self
    }

    pub fn input<'a>(
        &'a self,
        node_id: &'a str,
        data: &'a Value,
        context: ExecutionContext,
    ) -> NodeInput<'a> {
        NodeInput {
            data,
            node_id,
            context,
            user_id: USER_ID,
            step: &self.steps,
            publish: &self.publish,
            credentials: &self.credentials,
            http: &self.http,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn undecryptable_credential_surfaces_as_error() {
        let creds = StaticCredentials::default().with_undecryptable("c", USER_ID);
        assert_eq!(
            creds.resolve("c", USER_ID).await.unwrap_err(),
            CredentialError::Decryption("c".into())
        );
    }

    #[tokio::test]
    async fn mock_node_records_input_and_extends_context() {
        let harness = Harness::new(MockHttpClient::new());
        let node = MockNode::returning("a", "x", json!(1));
        let out = node
            .execute(harness.input("a", &Value::Null, ExecutionContext::new()))
            .await
            .unwrap();
        assert_eq!(out.get("x"), Some(&json!(1)));
        assert_eq!(node.call_count(), 1);
    }
}
