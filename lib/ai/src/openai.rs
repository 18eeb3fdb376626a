//! OpenAI-compatible chat completion backend.
//!
//! Works with any provider exposing `POST {base_url}/chat/completions`
//! (OpenAI, vLLM, Ollama, DashScope, DeepSeek and friends).

use crate::backend::{ChatModel, ChatRequest, ChatResponse, ContentPart, MessageRole, OutputFormat, TokenUsage};
use crate::error::LlmError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::time::Duration;
use tracing::{debug, instrument};

/// Configuration for one OpenAI-compatible model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Model name sent to the provider.
    pub model: String,
    /// Bearer token, if the provider requires one.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Whether the model accepts image parts.
    #[serde(default)]
    pub supports_images: bool,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    120
}

/// Chat model backed by an OpenAI-compatible HTTP API.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleModel {
    http: Client,
    config: OpenAiConfig,
}

impl OpenAiCompatibleModel {
    /// Creates a backend for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::InvalidConfig`] if the HTTP client cannot be built.
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::InvalidConfig {
                reason: e.to_string(),
            })?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<OaiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<JsonValue>,
}

#[derive(Serialize)]
struct OaiMessage {
    role: &'static str,
    content: JsonValue,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

fn convert_message(message: &crate::backend::ChatMessage) -> OaiMessage {
    let role = match message.role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    };

    // Text-only messages use the plain string form for broader compatibility.
    let content = match message.parts.as_slice() {
        [ContentPart::Text { text }] => JsonValue::String(text.clone()),
        parts => JsonValue::Array(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => json!({"type": "text", "text": text}),
                    ContentPart::ImageUrl { url } => {
                        json!({"type": "image_url", "image_url": {"url": url}})
                    }
                })
                .collect(),
        ),
    };

    OaiMessage { role, content }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleModel {
    #[instrument(skip(self, request), fields(model = %self.config.model))]
    async fn generate(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        if request.has_image() && !self.config.supports_images {
            return Err(LlmError::UnsupportedInput {
                model: self.config.model.clone(),
                reason: "image input is not enabled for this model".to_string(),
            });
        }

        let body = CompletionRequest {
            model: &self.config.model,
            messages: request.messages.iter().map(convert_message).collect(),
            temperature: request.temperature,
            top_p: request.top_p,
            response_format: (request.output_format == OutputFormat::Json)
                .then(|| json!({"type": "json_object"})),
        };

        let mut builder = self.http.post(self.endpoint()).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::RequestFailed {
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(LlmError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::ResponseParseFailed {
                    reason: e.to_string(),
                })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::ResponseParseFailed {
                reason: "response has no choices".to_string(),
            })?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();
        debug!(tokens = usage.total(), "chat completion finished");

        Ok(ChatResponse {
            content,
            usage,
            model: if parsed.model.is_empty() {
                self.config.model.clone()
            } else {
                parsed.model
            },
        })
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn supports_images(&self) -> bool {
        self.config.supports_images
    }
}
