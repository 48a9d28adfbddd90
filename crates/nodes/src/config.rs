//! Typed reads over a node's JSON configuration.

use serde_json::Value;

use crate::credential::{CredentialResolver, CredentialType, Secret};
use crate::NodeError;

/// Borrowed view of a node's `data` that reports errors in the node's name.
#[derive(Clone, Copy)]
pub struct NodeConfig<'a> {
    label: &'static str,
    data: &'a Value,
}

impl<'a> NodeConfig<'a> {
    pub fn new(label: &'static str, data: &'a Value) -> Self {
        Self { label, data }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// A non-blank string field, or `None`.
    pub fn optional_str(&self, field: &str) -> Option<&'a str> {
        self.data
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn require_str(&self, field: &str) -> Result<&'a str, NodeError> {
        self.optional_str(field)
            .ok_or_else(|| NodeError::missing_field(self.label, field))
    }

    /// A string or number field rendered as text (chat ids arrive as either).
    pub fn require_text(&self, field: &str) -> Result<String, NodeError> {
        match self.data.get(field) {
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => self.require_str(field).map(str::to_owned),
        }
    }

    pub fn optional_u32(&self, field: &str) -> Result<Option<u32>, NodeError> {
        match self.data.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| NodeError::invalid(self.label, format!("{field} must be a positive integer"))),
        }
    }

    /// The output variable name, checked to be a plain identifier.
    pub fn variable_name(&self) -> Result<&'a str, NodeError> {
        let name = self.require_str("variableName")?;
        if is_identifier(name) {
            Ok(name)
        } else {
            Err(NodeError::invalid(
                self.label,
                format!("variableName '{name}' must start with a letter or underscore and contain only letters, numbers, and underscores"),
            ))
        }
    }

    /// Resolve `credential_id` for `user_id` and check it is of `expected` type.
    pub async fn credential(
        &self,
        resolver: &dyn CredentialResolver,
        credential_id: &str,
        user_id: &str,
        expected: CredentialType,
    ) -> Result<Secret, NodeError> {
        let secret = resolver.resolve(credential_id, user_id).await?;
        if secret.kind() != expected {
            return Err(NodeError::invalid(
                self.label,
                format!("credential '{credential_id}' is a {} credential, expected {expected}", secret.kind()),
            ));
        }
        Ok(secret)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
