//! Prompt templates.
//!
//! Templates are rendered with minijinja against the node inputs, so
//! `{{ name }}`, attribute access and filters all work. Authored prompts
//! also use the dotted form `{{.name}}`, which is rewritten to `{{ name }}`
//! before rendering. Unknown variables render as empty text.

use crate::error::PromptError;
use minijinja::{Environment, Value};
use regex::Regex;
use serde_json::{Map, Value as JsonValue};

/// Built-in prompt for extracting search keywords from a question.
pub const KEYWORD_EXTRACTION_PROMPT: &str = r#"You are an SEO specialist and text analyst.
Pick the keywords from the question below that best capture what the user is searching for.
Write the keywords in the same language as the question.
Answer with a JSON array of strings and nothing else, for example ["keyword one", "keyword two"].

Question: {{question}}"#;

/// Built-in prompt for rewriting a question before retrieval.
pub const QUESTION_OPTIMIZATION_PROMPT: &str = r#"Rewrite the question below so that it retrieves the most relevant passages from a knowledge base.
Keep the original language and meaning, correct grammar and spelling, and make vague references explicit.
Answer with the rewritten question as plain text only.

Question: {{question}}"#;

/// Built-in prompt for reading text out of an image.
pub const OCR_PROMPT: &str = "Transcribe all text visible in the image as plain text, preserving line breaks. \
If the image contains no text, answer with an empty string.";

/// A prompt with named placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    content: String,
}

impl PromptTemplate {
    /// Creates a template from its source text.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Returns the template source.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Renders the template with the given variables.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError`] if the template does not parse or fails to render.
    pub fn render(&self, variables: &Map<String, JsonValue>) -> Result<String, PromptError> {
        let dotted = Regex::new(r"\{\{(-?)\s*\.").map_err(|e| PromptError::Syntax {
            reason: e.to_string(),
        })?;
        let source = dotted.replace_all(&self.content, "{{$1 ");

        let env = Environment::new();
        env.render_str(&source, Value::from_serialize(variables))
            .map_err(|e| PromptError::Render {
                reason: e.to_string(),
            })
    }
}

/// Strips a Markdown code fence (```` ```json ... ``` ````) around model output.
#[must_use]
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}
