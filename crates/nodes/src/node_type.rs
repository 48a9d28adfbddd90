//! The closed set of node type tags.

use serde::{Deserialize, Serialize};

/// Selects the executor for a node.
///
/// Parsing a workflow with a tag outside this set fails, so an unknown
/// type never reaches the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    /// Placeholder the editor drops into an empty workflow.
    Initial,
    ManualTrigger,
    TelegramTrigger,
    HttpRequest,
    Openai,
    Groq,
    Anthropic,
    Gemini,
    Slack,
    Discord,
    Telegram,
}

impl NodeType {
    pub const ALL: [NodeType; 11] = [
        Self::Initial,
        Self::ManualTrigger,
        Self::TelegramTrigger,
        Self::HttpRequest,
        Self::Openai,
        Self::Groq,
        Self::Anthropic,
        Self::Gemini,
        Self::Slack,
        Self::Discord,
        Self::Telegram,
    ];

    /// Status channel shared by every node of this type.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::Initial | Self::ManualTrigger => "manual-trigger-execution",
            Self::TelegramTrigger => "telegram-trigger-execution",
            Self::HttpRequest => "http-request-execution",
            Self::Openai => "openai-execution",
            Self::Groq => "groq-execution",
            Self::Anthropic => "anthropic-execution",
            Self::Gemini => "gemini-execution",
            Self::Slack => "slack-execution",
            Self::Discord => "discord-execution",
            Self::Telegram => "telegram-execution",
        }
    }

    pub fn is_trigger(&self) -> bool {
        matches!(self, Self::Initial | Self::ManualTrigger | Self::TelegramTrigger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tags_use_screaming_snake_case() {
        let tag: NodeType = serde_json::from_str("\"HTTP_REQUEST\"").unwrap();
        assert_eq!(tag, NodeType::HttpRequest);
        assert_eq!(serde_json::to_string(&NodeType::TelegramTrigger).unwrap(), "\"TELEGRAM_TRIGGER\"");
        assert!(serde_json::from_str::<NodeType>("\"FTP_UPLOAD\"").is_err());
    }

    #[test]
    fn channels_are_unique_except_manual_aliases() {
        let channels: HashSet<_> = NodeType::ALL.iter().map(NodeType::channel).collect();
        assert_eq!(channels.len(), NodeType::ALL.len() - 1);
    }
}
