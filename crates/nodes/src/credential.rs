//! Credential resolution contract.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CredentialError;

/// Which third party a credential authenticates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialType {
    Openai,
    Groq,
    Gemini,
    Anthropic,
    Telegram,
}

impl CredentialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openai => "OPENAI",
            Self::Groq => "GROQ",
            Self::Gemini => "GEMINI",
            Self::Anthropic => "ANTHROPIC",
            Self::Telegram => "TELEGRAM",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPENAI"    => Ok(Self::Openai),
            "GROQ"      => Ok(Self::Groq),
            "GEMINI"    => Ok(Self::Gemini),
            "ANTHROPIC" => Ok(Self::Anthropic),
            "TELEGRAM"  => Ok(Self::Telegram),
            other       => Err(format!("unknown credential type: {other}")),
        }
    }
}

/// A decrypted credential value.
///
/// Lives only for the duration of the node that asked for it; `Debug`
/// never prints the value.
#[derive(Clone)]
pub struct Secret {
    kind: CredentialType,
    value: String,
}

impl Secret {
    pub fn new(kind: CredentialType, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn kind(&self) -> CredentialType {
        self.kind
    }

    pub fn expose(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("kind", &self.kind)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Fetches and decrypts a user-scoped credential.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// # Errors
    /// - [`CredentialError::NotFound`] if no credential with that id belongs to `user_id`.
    /// - [`CredentialError::Decryption`] if the stored value cannot be decrypted.
    async fn resolve(&self, credential_id: &str, user_id: &str) -> Result<Secret, CredentialError>;
}
