//! Image nodes: `imageUnderstanding` and `ocr`.
//!
//! Both read the `image` input as a file id, load the file and send it to a
//! multimodal model as a base64 `data:` URL.

use super::{Services, output};
use crate::error::NodeError;
use crate::node::{ImageUnderstandingConfig, ModelConfig};
use crate::resolve::required_text;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use loomwork_ai::{ChatMessage, ChatRequest, OCR_PROMPT, OutputFormat, strip_code_fence};
use loomwork_core::{FileId, ModelId};
use serde_json::{Map, Value as JsonValue};

const TEMPERATURE: f32 = 0.2;

pub(super) async fn understand(
    services: &Services,
    config: &ImageUnderstandingConfig,
    inputs: &Map<String, JsonValue>,
) -> Result<Map<String, JsonValue>, NodeError> {
    let text = describe(
        services,
        config.model_id,
        &config.prompt,
        config.output_format,
        inputs,
    )
    .await?;
    Ok(output([("text", JsonValue::String(text))]))
}

pub(super) async fn ocr(
    services: &Services,
    config: &ModelConfig,
    inputs: &Map<String, JsonValue>,
) -> Result<Map<String, JsonValue>, NodeError> {
    let text = describe(services, config.model_id, OCR_PROMPT, OutputFormat::Text, inputs).await?;
    Ok(output([("text", JsonValue::String(text))]))
}

async fn describe(
    services: &Services,
    model_id: ModelId,
    prompt: &str,
    format: OutputFormat,
    inputs: &Map<String, JsonValue>,
) -> Result<String, NodeError> {
    let raw = required_text(inputs, "image")?;
    let file_id: FileId = raw.parse().map_err(|e: loomwork_core::ParseIdError| {
        NodeError::InvalidInput {
            name: "image".to_string(),
            reason: e.to_string(),
        }
    })?;

    let model = services.chat_model(model_id).await?;
    if !model.supports_images() {
        return Err(NodeError::InvalidConfig {
            reason: format!("model {model_id} does not accept images"),
        });
    }

    let file_failed = |e| NodeError::external("file store", e);
    let metadata = services.files.metadata(file_id).await.map_err(file_failed)?;
    let bytes = services
        .files
        .download(&metadata.path)
        .await
        .map_err(file_failed)?;
    let image_url = format!(
        "data:image/{};base64,{}",
        metadata.extension,
        STANDARD.encode(bytes)
    );

    let request = ChatRequest::from_message(ChatMessage::user(prompt).with_image(image_url))
        .with_temperature(TEMPERATURE)
        .with_output_format(format);
    let response = model
        .generate(&request)
        .await
        .map_err(|e| NodeError::external("llm", e))?;

    Ok(match format {
        OutputFormat::Json => strip_code_fence(&response.content).to_string(),
        OutputFormat::Text => response.content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryFiles, ScriptedModel, services_with_model};
    use loomwork_ai::ContentPart;
    use serde_json::json;
    use std::sync::Arc;

    const MODEL: ModelId = ModelId::from_raw(8);
    const FILE: FileId = FileId::from_raw(1001);

    fn image_input(value: &str) -> Map<String, JsonValue> {
        Map::from_iter([("image".to_string(), json!(value))])
    }

    fn with_png(model: Arc<ScriptedModel>) -> Services {
        let mut services = services_with_model(MODEL, model);
        services.files = Arc::new(MemoryFiles::default().with_file(FILE, "png", b"\x89PNG"));
        services
    }

    #[tokio::test]
    async fn sends_image_as_data_url() {
        let model = ScriptedModel::vision("```json\n{\"cats\": 2}\n```");
        let services = with_png(model.clone());
        let config = ImageUnderstandingConfig {
            model_id: MODEL,
            prompt: "Count the cats".to_string(),
            output_format: OutputFormat::Json,
        };

        let out = understand(&services, &config, &image_input("1001")).await.expect("run");
        assert_eq!(out.get("text"), Some(&json!("{\"cats\": 2}")));

        let request = model.last_request().expect("request");
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(
            request.messages[0].parts,
            vec![
                ContentPart::Text {
                    text: "Count the cats".to_string()
                },
                ContentPart::ImageUrl {
                    url: "data:image/png;base64,iVBORw==".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn ocr_uses_builtin_prompt() {
        let model = ScriptedModel::vision("line one\nline two");
        let services = with_png(model.clone());

        let out = ocr(&services, &ModelConfig { model_id: MODEL }, &image_input("1001"))
            .await
            .expect("run");
        assert_eq!(out.get("text"), Some(&json!("line one\nline two")));
        let request = model.last_request().expect("request");
        assert_eq!(request.output_format, OutputFormat::Text);
        assert!(matches!(&request.messages[0].parts[0], ContentPart::Text { text } if text == OCR_PROMPT));
    }

    #[tokio::test]
    async fn text_only_models_are_rejected() {
        let model = ScriptedModel::replying(["x"]);
        let services = with_png(model.clone());

        let err = ocr(&services, &ModelConfig { model_id: MODEL }, &image_input("1001"))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidConfig { .. }));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn bad_file_ids_fail() {
        let services = with_png(ScriptedModel::vision("x"));
        let config = ModelConfig { model_id: MODEL };

        let err = ocr(&services, &config, &image_input("cat.png")).await.unwrap_err();
        assert!(matches!(err, NodeError::InvalidInput { .. }));

        let err = ocr(&services, &config, &image_input("404")).await.unwrap_err();
        assert!(matches!(err, NodeError::ExternalService { ref service, .. } if service == "file store"));
    }
}
