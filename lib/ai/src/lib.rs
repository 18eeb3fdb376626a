//! AI primitives for loomwork.
//!
//! - **Chat models**: a provider-neutral request/response shape with
//!   multimodal parts, and an OpenAI-compatible HTTP backend.
//! - **Model lookup**: resolve the model id a node references.
//! - **Prompts**: minijinja rendering, the built-in prompts and
//!   code-fence stripping for JSON answers.

pub mod backend;
pub mod error;
pub mod openai;
pub mod prompt;
pub mod provider;

pub use backend::{
    ChatMessage, ChatModel, ChatRequest, ChatResponse, ContentPart, MessageRole, OutputFormat,
    TokenUsage,
};
pub use error::{LlmError, PromptError};
pub use openai::{OpenAiCompatibleModel, OpenAiConfig};
pub use prompt::{
    KEYWORD_EXTRACTION_PROMPT, OCR_PROMPT, PromptTemplate, QUESTION_OPTIMIZATION_PROMPT,
    strip_code_fence,
};
pub use provider::{ModelProvider, ModelRegistry};
