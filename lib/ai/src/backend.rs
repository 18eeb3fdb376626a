//! Chat model abstraction.
//!
//! Provides a unified interface for chat-completion providers. Requests carry
//! multimodal messages (text and image parts), sampling knobs and the output
//! mode the caller expects.

use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How the model should shape its answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputFormat {
    /// Free-form text.
    #[default]
    #[serde(alias = "text")]
    Text,
    /// A JSON document.
    #[serde(alias = "json")]
    Json,
}

/// One part of a multimodal message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text { text: String },
    /// An image referenced by URL, usually a `data:` URL.
    ImageUrl { url: String },
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instructions.
    System,
    /// User/human message.
    User,
    /// Assistant/AI message.
    Assistant,
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message sender.
    pub role: MessageRole,
    /// The ordered content parts.
    pub parts: Vec<ContentPart>,
}

impl ChatMessage {
    /// Creates a text-only user message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            parts: vec![ContentPart::Text { text: text.into() }],
        }
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            parts: vec![ContentPart::Text { text: text.into() }],
        }
    }

    /// Appends an image part.
    #[must_use]
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.parts.push(ContentPart::ImageUrl { url: url.into() });
        self
    }

    /// Returns true if any part is an image.
    #[must_use]
    pub fn has_image(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, ContentPart::ImageUrl { .. }))
    }
}

/// A request to a chat model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The conversation to complete.
    pub messages: Vec<ChatMessage>,
    /// Temperature for sampling.
    pub temperature: Option<f32>,
    /// Nucleus sampling cutoff.
    pub top_p: Option<f32>,
    /// Expected output shape.
    pub output_format: OutputFormat,
}

impl ChatRequest {
    /// Creates a request with a single text user message.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self::from_message(ChatMessage::user(prompt))
    }

    /// Creates a request from a single prepared message.
    #[must_use]
    pub fn from_message(message: ChatMessage) -> Self {
        Self {
            messages: vec![message],
            temperature: None,
            top_p: None,
            output_format: OutputFormat::Text,
        }
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets top-p.
    #[must_use]
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Returns true if any message carries an image.
    #[must_use]
    pub fn has_image(&self) -> bool {
        self.messages.iter().any(ChatMessage::has_image)
    }
}

/// A response from a chat model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The generated content.
    pub content: String,
    /// Token usage statistics.
    pub usage: TokenUsage,
    /// Model that generated the response.
    pub model: String,
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of input tokens.
    pub input_tokens: u32,
    /// Number of output tokens.
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Returns the total number of tokens.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Trait for chat model backends.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generates a completion for the given request.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails or its answer cannot be read.
    async fn generate(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Returns the model name sent to the provider.
    fn model(&self) -> &str;

    /// Returns true if the model accepts image parts.
    fn supports_images(&self) -> bool {
        false
    }
}
