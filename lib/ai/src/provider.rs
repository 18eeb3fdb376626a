//! Model lookup by id.

use crate::backend::ChatModel;
use crate::error::LlmError;
use crate::openai::{OpenAiCompatibleModel, OpenAiConfig};
use async_trait::async_trait;
use loomwork_core::ModelId;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves configured model ids to chat models.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Returns the chat model registered under `model_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ModelNotFound`] when no model has that id.
    async fn chat_model(&self, model_id: ModelId) -> Result<Arc<dyn ChatModel>, LlmError>;
}

/// An in-process registry of chat models.
#[derive(Default, Clone)]
pub struct ModelRegistry {
    models: HashMap<ModelId, Arc<dyn ChatModel>>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model under an id, replacing any previous entry.
    #[must_use]
    pub fn with_model(mut self, id: ModelId, model: Arc<dyn ChatModel>) -> Self {
        self.models.insert(id, model);
        self
    }

    /// Builds a registry of OpenAI-compatible models.
    ///
    /// # Errors
    ///
    /// Returns an error if any backend cannot be constructed.
    pub fn from_openai_configs(
        configs: impl IntoIterator<Item = (ModelId, OpenAiConfig)>,
    ) -> Result<Self, LlmError> {
        configs
            .into_iter()
            .try_fold(Self::new(), |registry, (id, config)| {
                Ok(registry.with_model(id, Arc::new(OpenAiCompatibleModel::new(config)?)))
            })
    }

    /// Returns the number of registered models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Returns true if no models are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl ModelProvider for ModelRegistry {
    async fn chat_model(&self, model_id: ModelId) -> Result<Arc<dyn ChatModel>, LlmError> {
        self.models
            .get(&model_id)
            .cloned()
            .ok_or_else(|| LlmError::ModelNotFound {
                model_id: model_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn openai(model: &str) -> OpenAiConfig {
        OpenAiConfig {
            base_url: "http://localhost:11434/v1".to_string(),
            model: model.to_string(),
            api_key: None,
            supports_images: model.contains("vl"),
            timeout_secs: 30,
        }
    }

    #[tokio::test]
    async fn resolves_registered_models() {
        let registry = ModelRegistry::from_openai_configs([
            (ModelId::from_raw(1), openai("qwen2.5")),
            (ModelId::from_raw(2), openai("qwen2.5-vl")),
        ])
        .expect("registry");

        assert_eq!(registry.len(), 2);
        let vision = registry.chat_model(ModelId::from_raw(2)).await.expect("found");
        assert_eq!(vision.model(), "qwen2.5-vl");
        assert!(vision.supports_images());
    }

    #[tokio::test]
    async fn unknown_model_is_not_found() {
        let registry = ModelRegistry::new();
        assert!(registry.is_empty());
        let err = registry.chat_model(ModelId::from_raw(9)).await.err();
        assert_eq!(
            err,
            Some(LlmError::ModelNotFound {
                model_id: "9".to_string()
            })
        );
    }
}
