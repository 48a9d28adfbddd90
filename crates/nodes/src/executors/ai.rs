//! AI completion nodes (OpenAI, Groq, Anthropic, Gemini).

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::NodeConfig;
use crate::credential::CredentialType;
use crate::http::{HttpRequest, HttpResponse};
use crate::status::track;
use crate::template;
use crate::traits::{NodeExecutor, NodeInput};
use crate::{ExecutionContext, NodeError};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const DEFAULT_MAX_TOKENS: u32 = 1024;

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const GROQ_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiProvider {
    Openai,
    Groq,
    Anthropic,
    Gemini,
}

impl AiProvider {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Openai => "OpenAI",
            Self::Groq => "Groq",
            Self::Anthropic => "Anthropic",
            Self::Gemini => "Gemini",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Openai => "gpt-4o-mini",
            Self::Groq => "openai/gpt-oss-120b",
            Self::Anthropic => "claude-3-5-haiku-latest",
            Self::Gemini => "gemini-2.0-flash",
        }
    }

    pub fn credential_type(&self) -> CredentialType {
        match self {
            Self::Openai => CredentialType::Openai,
            Self::Groq => CredentialType::Groq,
            Self::Anthropic => CredentialType::Anthropic,
            Self::Gemini => CredentialType::Gemini,
        }
    }

    fn step_name(&self) -> &'static str {
        match self {
            Self::Openai => "openai-generate-text",
            Self::Groq => "groq-generate-text",
            Self::Anthropic => "anthropic-generate-text",
            Self::Gemini => "gemini-generate-text",
        }
    }

    fn request(&self, api_key: &str, prompt: &Prompt) -> HttpRequest {
        match self {
            Self::Openai | Self::Groq => {
                let url = if *self == Self::Openai { OPENAI_URL } else { GROQ_URL };
                HttpRequest::post_json(
                    url,
                    &json!({
                        "model": prompt.model,
                        "max_tokens": prompt.max_tokens,
                        "messages": [
                            { "role": "system", "content": prompt.system },
                            { "role": "user", "content": prompt.user },
                        ],
                    }),
                )
                .with_header("authorization", format!("Bearer {api_key}"))
            }
            Self::Anthropic => HttpRequest::post_json(
                ANTHROPIC_URL,
                &json!({
                    "model": prompt.model,
                    "max_tokens": prompt.max_tokens,
                    "system": prompt.system,
                    "messages": [{ "role": "user", "content": prompt.user }],
                }),
            )
            .with_header("x-api-key", api_key)
            .with_header("anthropic-version", ANTHROPIC_VERSION),
            Self::Gemini => HttpRequest::post_json(
                format!("{GEMINI_URL}/{}:generateContent", prompt.model),
                &json!({
                    "systemInstruction": { "parts": [{ "text": prompt.system }] },
                    "contents": [{ "role": "user", "parts": [{ "text": prompt.user }] }],
                    "generationConfig": { "maxOutputTokens": prompt.max_tokens },
                }),
            )
            .with_header("x-goog-api-key", api_key),
        }
    }

    /// First text block of the completion, if the provider returned one.
    fn extract_text(&self, body: &Value) -> Option<String> {
        let text = match self {
            Self::Openai | Self::Groq => body.pointer("/choices/0/message/content"),
            Self::Anthropic => body.pointer("/content/0/text"),
            Self::Gemini => body.pointer("/candidates/0/content/parts/0/text"),
        };
        text.and_then(Value::as_str).map(str::to_owned)
    }

    fn parse(&self, response: HttpResponse) -> Result<String, NodeError> {
        let service = self.label();
        let body = response
            .error_for_status(service)?
            .json()
            .map_err(|e| NodeError::rejected(service, format!("malformed completion response: {e}")))?;
        Ok(self.extract_text(&body).unwrap_or_default())
    }
}

struct Prompt {
    model: String,
    system: String,
    user: String,
    max_tokens: u32,
}

/// Renders the prompts, calls the provider and stores `{text}`.
///
/// Configuration, validated in this order: `variableName`, `credentialId`,
/// `userPrompt`. Optional: `model`, `systemPrompt`, `maxTokens`.
pub struct AiCompletionExecutor {
    provider: AiProvider,
}

impl AiCompletionExecutor {
    pub fn new(provider: AiProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl NodeExecutor for AiCompletionExecutor {
    async fn execute(&self, input: NodeInput<'_>) -> Result<ExecutionContext, NodeError> {
        track(input.publish, input.node_id, self.run(input)).await
    }
}

impl AiCompletionExecutor {
    async fn run(&self, input: NodeInput<'_>) -> Result<ExecutionContext, NodeError> {
        let provider = self.provider;
        let cfg = NodeConfig::new(provider.label(), input.data);
        let variable_name = cfg.variable_name()?;
        let credential_id = cfg.require_str("credentialId")?;
        let user_prompt = cfg.require_str("userPrompt")?;
        let max_tokens = cfg.optional_u32("maxTokens")?.unwrap_or(DEFAULT_MAX_TOKENS);

        let secret = cfg
            .credential(input.credentials, credential_id, input.user_id, provider.credential_type())
            .await?;

        let prompt = Prompt {
            model: cfg
                .optional_str("model")
                .unwrap_or(provider.default_model())
                .to_owned(),
            system: cfg
                .optional_str("systemPrompt")
                .map(|s| template::render(s, &input.context))
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_owned()),
            user: template::render(user_prompt, &input.context),
            max_tokens,
        };
        let request = provider.request(secret.expose(), &prompt);
        drop(secret);

        let http = input.http;
        let text: String = input
            .step
            .run(provider.step_name(), || {
                let request = request.clone();
                async move { provider.parse(http.send(request).await?) }
            })
            .await?;

        Ok(input.context.with(variable_name, json!({ "text": text })))
    }
}
