//! Error types for the AI crate.

use std::fmt;

/// Errors from chat model operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// No model is registered under the requested id.
    ModelNotFound { model_id: String },
    /// The model cannot serve this kind of request.
    UnsupportedInput { model: String, reason: String },
    /// Provider is unavailable.
    ProviderUnavailable { provider: String, reason: String },
    /// Request failed.
    RequestFailed { reason: String },
    /// Provider answered with a non-success status.
    BadStatus { status: u16, body: String },
    /// Response parsing failed.
    ResponseParseFailed { reason: String },
    /// Timeout waiting for response.
    Timeout,
    /// Rate limit exceeded.
    RateLimited { retry_after_secs: Option<u64> },
    /// Invalid configuration.
    InvalidConfig { reason: String },
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelNotFound { model_id } => write!(f, "model {model_id} not found"),
            Self::UnsupportedInput { model, reason } => {
                write!(f, "model '{model}' cannot serve this request: {reason}")
            }
            Self::ProviderUnavailable { provider, reason } => {
                write!(f, "LLM provider '{provider}' unavailable: {reason}")
            }
            Self::RequestFailed { reason } => {
                write!(f, "LLM request failed: {reason}")
            }
            Self::BadStatus { status, body } => {
                write!(f, "LLM provider returned status {status}: {body}")
            }
            Self::ResponseParseFailed { reason } => {
                write!(f, "failed to parse LLM response: {reason}")
            }
            Self::Timeout => write!(f, "LLM request timed out"),
            Self::RateLimited { retry_after_secs } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "rate limited, retry after {secs}s")
                } else {
                    write!(f, "rate limited")
                }
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid LLM configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for LlmError {}

/// Errors from rendering a prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    /// The placeholder rewrite pattern is invalid.
    Syntax { reason: String },
    /// The template failed to parse or render.
    Render { reason: String },
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax { reason } => write!(f, "invalid prompt pattern: {reason}"),
            Self::Render { reason } => write!(f, "failed to render prompt: {reason}"),
        }
    }
}

impl std::error::Error for PromptError {}
