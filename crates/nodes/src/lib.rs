//! `nodes` crate: the `NodeExecutor` contract and the built-in node executors.
//!
//! Every node type implements [`NodeExecutor`]. The engine crate dispatches
//! execution through this trait object and supplies the collaborators
//! (step runner, status publisher, credential resolver, HTTP client)
//! declared here.

pub mod config;
pub mod context;
pub mod credential;
pub mod error;
pub mod executors;
pub mod http;
pub mod mock;
pub mod node_type;
pub mod registry;
pub mod status;
pub mod step;
pub mod template;
pub mod traits;

pub use context::ExecutionContext;
pub use credential::{CredentialResolver, CredentialType, Secret};
pub use error::{CredentialError, NodeError};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, ReqwestClient};
pub use node_type::NodeType;
pub use registry::NodeRegistry;
pub use status::{NodeStatus, NodeStatusEvent, NodeStatusPublisher, StatusPublisher, STATUS_TOPIC};
pub use step::{StepFn, StepRunner};
pub use traits::{NodeExecutor, NodeInput};
