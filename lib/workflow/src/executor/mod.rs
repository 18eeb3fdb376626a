//! Node executors.
//!
//! Each node type has an executor that turns resolved inputs into an output
//! object. Executors never touch the graph or schedule successors; the
//! engine records their outcome and advances. Dispatch is a single match
//! over [`NodeKind`].

mod condition;
mod crawler;
mod knowledge;
mod llm;
mod text;
mod vision;
mod web_search;

use crate::error::NodeError;
use crate::graph::WorkflowGraph;
use crate::node::{Node, NodeKind};
use crate::resolve::lookup_input_variables;
use crate::store::InstanceStore;
use loomwork_ai::{ChatModel, ModelProvider};
use loomwork_core::{ModelId, WorkflowInstanceId};
use loomwork_integration::{
    Crawler, FileStore, KnowledgeRetriever, Reranker, UnavailableRetriever, UnconfiguredSearch,
    WebSearchProvider,
};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

/// Collaborators executors call out to.
#[derive(Clone)]
pub struct Services {
    pub models: Arc<dyn ModelProvider>,
    pub crawler: Crawler,
    pub web_search: Arc<dyn WebSearchProvider>,
    pub retriever: Arc<dyn KnowledgeRetriever>,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub files: Arc<dyn FileStore>,
}

impl Services {
    /// Creates services with no web search and no knowledge backend.
    #[must_use]
    pub fn new(models: Arc<dyn ModelProvider>, crawler: Crawler, files: Arc<dyn FileStore>) -> Self {
        Self {
            models,
            crawler,
            web_search: Arc::new(UnconfiguredSearch),
            retriever: Arc::new(UnavailableRetriever),
            reranker: None,
            files,
        }
    }

    #[must_use]
    pub fn with_web_search(mut self, provider: Arc<dyn WebSearchProvider>) -> Self {
        self.web_search = provider;
        self
    }

    #[must_use]
    pub fn with_retriever(mut self, retriever: Arc<dyn KnowledgeRetriever>) -> Self {
        self.retriever = retriever;
        self
    }

    #[must_use]
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    async fn chat_model(&self, model_id: ModelId) -> Result<Arc<dyn ChatModel>, NodeError> {
        self.models
            .chat_model(model_id)
            .await
            .map_err(|e| NodeError::external("llm", e))
    }
}

/// Everything an executor may read while running one node.
pub struct NodeContext<'a> {
    pub workflow_id: WorkflowInstanceId,
    pub node: &'a Node,
    pub graph: &'a WorkflowGraph,
    pub store: &'a dyn InstanceStore,
    pub services: &'a Services,
    /// Fail on required inputs that do not resolve.
    pub strict_inputs: bool,
}

/// What a finished node produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeOutcome {
    /// Output values keyed by output variable name.
    pub output: Map<String, JsonValue>,
    /// Handle selected by a condition node.
    pub branch: Option<String>,
}

impl NodeOutcome {
    #[must_use]
    pub fn output(output: Map<String, JsonValue>) -> Self {
        Self {
            output,
            branch: None,
        }
    }
}

/// Runs one node.
///
/// # Errors
///
/// Returns the [`NodeError`] to record on the node instance.
pub async fn execute(ctx: &NodeContext<'_>) -> Result<NodeOutcome, NodeError> {
    let inputs =
        lookup_input_variables(ctx.store, ctx.workflow_id, &ctx.node.input, ctx.strict_inputs).await?;
    let services = ctx.services;

    let output = match &ctx.node.kind {
        NodeKind::Condition(config) => return condition::run(ctx, config).await,
        NodeKind::Start | NodeKind::End => inputs,
        NodeKind::Llm(config) => llm::run(services, config, &inputs).await?,
        NodeKind::Crawler => crawler::run(services, &inputs).await?,
        NodeKind::KnowledgeRetrieval(config) => knowledge::run(services, config, &inputs).await?,
        NodeKind::WebSearch(config) => web_search::run(services, config, &inputs).await?,
        NodeKind::KeywordExtraction(config) => text::keywords(services, config, &inputs).await?,
        NodeKind::QuestionOptimization(config) => {
            text::optimize_question(services, config, &inputs).await?
        }
        NodeKind::ImageUnderstanding(config) => {
            vision::understand(services, config, &inputs).await?
        }
        NodeKind::Ocr(config) => vision::ocr(services, config, &inputs).await?,
    };
    Ok(NodeOutcome::output(output))
}

/// Builds an output object from key/value pairs.
fn output<const N: usize>(entries: [(&str, JsonValue); N]) -> Map<String, JsonValue> {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
