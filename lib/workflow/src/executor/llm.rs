//! `llm` nodes: render the prompt with the node inputs and call the model.

use super::{Services, output};
use crate::error::NodeError;
use crate::node::LlmConfig;
use loomwork_ai::{ChatRequest, OutputFormat, PromptTemplate, strip_code_fence};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

pub(super) async fn run(
    services: &Services,
    config: &LlmConfig,
    inputs: &Map<String, JsonValue>,
) -> Result<Map<String, JsonValue>, NodeError> {
    let model = services.chat_model(config.model_id).await?;
    let prompt = PromptTemplate::new(config.prompt.as_str())
        .render(inputs)
        .map_err(|e| NodeError::InvalidConfig {
            reason: e.to_string(),
        })?;

    let request = ChatRequest::new(prompt)
        .with_temperature(config.temperature)
        .with_top_p(config.top_p)
        .with_output_format(config.output_format);
    let response = model
        .generate(&request)
        .await
        .map_err(|e| NodeError::external("llm", e))?;
    debug!(
        model = model.model(),
        tokens = response.usage.total(),
        "llm call finished"
    );

    let text = match config.output_format {
        OutputFormat::Json => strip_code_fence(&response.content).to_string(),
        OutputFormat::Text => response.content,
    };
    Ok(output([("text", JsonValue::String(text))]))
}
