//! Node-level error types.

use thiserror::Error;

/// Errors returned by a credential resolver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// No credential with that id belongs to the requesting user.
    #[error("credential '{0}' not found")]
    NotFound(String),

    /// The stored value could not be decrypted with the process key.
    #[error("credential '{0}' could not be decrypted")]
    Decryption(String),

    /// The credential store itself failed.
    #[error("credential store error: {0}")]
    Store(String),
}

/// Errors returned by a node's `execute` method.
///
/// The step runner uses [`NodeError::is_retriable`] to decide retry behaviour:
/// - retriable: the step is re-tried with exponential back-off.
/// - non-retriable: the node, and with it the run, fails immediately.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    /// Missing or invalid node configuration.
    #[error("{node} node: {message}")]
    Validation { node: String, message: String },

    /// Credential could not be resolved.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// A third-party call failed.
    #[error("{service} error: {message}")]
    ExternalService {
        service: String,
        message: String,
        retriable: bool,
    },

    /// A retriable step kept failing until its attempt budget ran out.
    #[error("step '{step}' failed after {attempts} attempts: {message}")]
    RetryExhausted {
        step: String,
        attempts: u32,
        message: String,
    },

    /// Programming errors and anything else without a better home.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl NodeError {
    /// `<node> node: <field> is missing.`
    pub fn missing_field(node: &str, field: &str) -> Self {
        Self::Validation {
            node: node.to_owned(),
            message: format!("{field} is missing"),
        }
    }

    pub fn invalid(node: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            node: node.to_owned(),
            message: message.into(),
        }
    }

    /// Network, timeout or 5xx style failure worth retrying.
    pub fn transient(service: &str, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.to_owned(),
            message: message.into(),
            retriable: true,
        }
    }

    /// The third party answered, and the answer was "no".
    pub fn rejected(service: &str, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.to_owned(),
            message: message.into(),
            retriable: false,
        }
    }

    pub fn unexpected(message: impl std::fmt::Display) -> Self {
        Self::Unexpected(message.to_string())
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::ExternalService { retriable: true, .. })
    }
}
