//! `engine` crate: domain models, graph sorting and the execution engine.
//!
//! [`WorkflowRunner`] drives a single execution; [`Engine`] queues runs,
//! feeds them to workers and supervises cancellation.

pub mod config;
pub mod credentials;
pub mod dag;
pub mod error;
pub mod models;
pub mod publisher;
pub mod runner;
pub mod service;
pub mod step;
pub mod store;
pub mod trigger;

pub use config::{EngineConfig, RetryPolicy};
pub use credentials::{decrypt_secret, encrypt_secret, CryptoError, EncryptionKey, StoreCredentialResolver};
pub use dag::{sort_nodes, validate_dag};
pub use error::{EngineError, WorkflowValidationError};
pub use models::{Connection, Credential, Execution, ExecutionStatus, Node, Workflow};
pub use publisher::BroadcastPublisher;
pub use runner::{ExecutionResult, WorkflowRunner};
pub use service::{CancelOutcome, Engine};
pub use step::DurableStepRunner;
pub use store::{MemoryStore, PgStore, StoreError, Stores};
