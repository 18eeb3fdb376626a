//! Nodes that run a built-in prompt over the `question` input:
//! `keywordExtraction` and `questionOptimization`.

use super::{Services, output};
use crate::error::NodeError;
use crate::node::ModelConfig;
use crate::resolve::required_text;
use loomwork_ai::{
    ChatRequest, KEYWORD_EXTRACTION_PROMPT, OutputFormat, PromptTemplate,
    QUESTION_OPTIMIZATION_PROMPT, strip_code_fence,
};
use serde_json::{Map, Value as JsonValue};

const TEMPERATURE: f32 = 0.2;

async fn ask(
    services: &Services,
    config: &ModelConfig,
    template: &str,
    question: String,
    format: OutputFormat,
) -> Result<String, NodeError> {
    let model = services.chat_model(config.model_id).await?;
    let variables = Map::from_iter([("question".to_string(), JsonValue::String(question))]);
    let prompt = PromptTemplate::new(template)
        .render(&variables)
        .map_err(|e| NodeError::InvalidConfig {
            reason: e.to_string(),
        })?;
    let request = ChatRequest::new(prompt)
        .with_temperature(TEMPERATURE)
        .with_output_format(format);
    model
        .generate(&request)
        .await
        .map(|response| response.content)
        .map_err(|e| NodeError::external("llm", e))
}

pub(super) async fn keywords(
    services: &Services,
    config: &ModelConfig,
    inputs: &Map<String, JsonValue>,
) -> Result<Map<String, JsonValue>, NodeError> {
    let question = required_text(inputs, "question")?;
    let answer = ask(services, config, KEYWORD_EXTRACTION_PROMPT, question, OutputFormat::Json).await?;

    let keywords: Vec<String> =
        serde_json::from_str(strip_code_fence(&answer)).map_err(|e| NodeError::InvalidModelOutput {
            reason: format!("expected a JSON array of strings: {e}"),
        })?;
    Ok(output([
        ("total", JsonValue::from(keywords.len())),
        ("keywords", JsonValue::from(keywords)),
    ]))
}

pub(super) async fn optimize_question(
    services: &Services,
    config: &ModelConfig,
    inputs: &Map<String, JsonValue>,
) -> Result<Map<String, JsonValue>, NodeError> {
    let question = required_text(inputs, "question")?;
    let answer = ask(
        services,
        config,
        QUESTION_OPTIMIZATION_PROMPT,
        question,
        OutputFormat::Text,
    )
    .await?;
    Ok(output([("result", JsonValue::String(answer))]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedModel, services_with_model};
    use loomwork_core::ModelId;
    use serde_json::json;

    const MODEL: ModelId = ModelId::from_raw(4);

    fn question() -> Map<String, JsonValue> {
        Map::from_iter([("question".to_string(), json!("how do I pin a future?"))])
    }

    #[tokio::test]
    async fn keywords_parse_fenced_json() {
        let model = ScriptedModel::replying(["```json\n[\"pin\", \"future\"]\n```"]);
        let services = services_with_model(MODEL, model.clone());

        let out = keywords(&services, &ModelConfig { model_id: MODEL }, &question())
            .await
            .expect("run");
        assert_eq!(out.get("total"), Some(&json!(2)));
        assert_eq!(out.get("keywords"), Some(&json!(["pin", "future"])));

        let request = model.last_request().expect("request");
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.output_format, OutputFormat::Json);
    }

    #[tokio::test]
    async fn non_array_keywords_are_a_model_output_error() {
        let services = services_with_model(MODEL, ScriptedModel::replying(["pin, future"]));
        let err = keywords(&services, &ModelConfig { model_id: MODEL }, &question())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("model output format error"));
    }

    #[tokio::test]
    async fn optimized_question_is_returned_verbatim() {
        let model = ScriptedModel::replying(["How do I pin a future in Rust?"]);
        let services = services_with_model(MODEL, model.clone());

        let out = optimize_question(&services, &ModelConfig { model_id: MODEL }, &question())
            .await
            .expect("run");
        assert_eq!(out.get("result"), Some(&json!("How do I pin a future in Rust?")));
        let request = model.last_request().expect("request");
        assert_eq!(request.output_format, OutputFormat::Text);
    }

    #[tokio::test]
    async fn question_is_required() {
        let services = services_with_model(MODEL, ScriptedModel::replying(["x"]));
        let err = optimize_question(&services, &ModelConfig { model_id: MODEL }, &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::MissingInput { .. }));
    }
}
