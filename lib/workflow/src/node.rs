//! Workflow node types.
//!
//! A node is stored as `{id, type, data}` where `data` holds the shared
//! `input`/`output` slots next to the fields specific to that node type.
//! Parsing turns the pair into [`NodeKind`], one variant per node type
//! owning its typed configuration.

use crate::condition::Branch;
use crate::variable::Variable;
use loomwork_ai::OutputFormat;
use loomwork_core::{KnowledgeBaseId, ModelId};
use loomwork_integration::SearchType;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// The type tag of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    /// Entry point; seeded with the workflow inputs.
    Start,
    /// Terminal node; completes the workflow.
    End,
    /// Chat model call.
    Llm,
    /// HTTP page fetch.
    Crawler,
    /// Branch selection.
    Condition,
    /// Knowledge-base search.
    KnowledgeRetrieval,
    /// Web search plus crawl of the hits.
    WebSearch,
    /// Keyword extraction with a built-in prompt.
    KeywordExtraction,
    /// Question rewriting with a built-in prompt.
    QuestionOptimization,
    /// Multimodal question about an image.
    ImageUnderstanding,
    /// Text extraction from an image.
    Ocr,
}

impl NodeType {
    /// Returns the wire name stored in definitions and the database.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Llm => "llm",
            Self::Crawler => "crawler",
            Self::Condition => "condition",
            Self::KnowledgeRetrieval => "knowledgeRetrieval",
            Self::WebSearch => "webSearch",
            Self::KeywordExtraction => "keywordExtraction",
            Self::QuestionOptimization => "questionOptimization",
            Self::ImageUnderstanding => "imageUnderstanding",
            Self::Ocr => "ocr",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn from_str_value(s: &str) -> Option<Self> {
        Some(match s {
            "start" => Self::Start,
            "end" => Self::End,
            "llm" => Self::Llm,
            "crawler" => Self::Crawler,
            "condition" => Self::Condition,
            "knowledgeRetrieval" => Self::KnowledgeRetrieval,
            "webSearch" => Self::WebSearch,
            "keywordExtraction" => Self::KeywordExtraction,
            "questionOptimization" => Self::QuestionOptimization,
            "imageUnderstanding" => Self::ImageUnderstanding,
            "ocr" => Self::Ocr,
            _ => return None,
        })
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    1.0
}

fn default_count() -> u32 {
    5
}

/// Configuration of an `llm` node.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    /// Model to call.
    pub model_id: ModelId,
    /// Prompt template rendered with the node's inputs.
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub output_format: OutputFormat,
}

/// Configuration of a `condition` node.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConditionConfig {
    /// Branches in evaluation order; the last one is the fallback.
    #[serde(default)]
    pub branches: Vec<Branch>,
}

/// Configuration of a `knowledgeRetrieval` node.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeRetrievalConfig {
    pub kb_id: KnowledgeBaseId,
    #[serde(default)]
    pub search_type: SearchType,
    /// Minimum similarity score kept by vector searches.
    #[serde(default)]
    pub similarity_threshold: f64,
    /// Maximum documents returned.
    #[serde(default = "default_count")]
    pub count: u32,
    /// Rerank hybrid results when a reranker is available.
    #[serde(default)]
    pub rerank: bool,
}

/// Configuration of a `webSearch` node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSearchConfig {
    /// Number of hits to fetch. Must be positive at execution time.
    #[serde(default)]
    pub top_n: i64,
}

/// Configuration of nodes that only pick a model.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub model_id: ModelId,
}

/// Configuration of an `imageUnderstanding` node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUnderstandingConfig {
    pub model_id: ModelId,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub output_format: OutputFormat,
}

/// Node type together with its typed configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Start,
    End,
    Llm(LlmConfig),
    Crawler,
    Condition(ConditionConfig),
    KnowledgeRetrieval(KnowledgeRetrievalConfig),
    WebSearch(WebSearchConfig),
    KeywordExtraction(ModelConfig),
    QuestionOptimization(ModelConfig),
    ImageUnderstanding(ImageUnderstandingConfig),
    Ocr(ModelConfig),
}

impl NodeKind {
    /// Returns the type tag.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Start => NodeType::Start,
            Self::End => NodeType::End,
            Self::Llm(_) => NodeType::Llm,
            Self::Crawler => NodeType::Crawler,
            Self::Condition(_) => NodeType::Condition,
            Self::KnowledgeRetrieval(_) => NodeType::KnowledgeRetrieval,
            Self::WebSearch(_) => NodeType::WebSearch,
            Self::KeywordExtraction(_) => NodeType::KeywordExtraction,
            Self::QuestionOptimization(_) => NodeType::QuestionOptimization,
            Self::ImageUnderstanding(_) => NodeType::ImageUnderstanding,
            Self::Ocr(_) => NodeType::Ocr,
        }
    }

    fn parse(node_type: NodeType, data: &JsonValue) -> Result<Self, serde_json::Error> {
        fn config<T: DeserializeOwned>(data: &JsonValue) -> Result<T, serde_json::Error> {
            T::deserialize(data)
        }

        Ok(match node_type {
            NodeType::Start => Self::Start,
            NodeType::End => Self::End,
            NodeType::Crawler => Self::Crawler,
            NodeType::Llm => Self::Llm(config(data)?),
            NodeType::Condition => Self::Condition(config(data)?),
            NodeType::KnowledgeRetrieval => Self::KnowledgeRetrieval(config(data)?),
            NodeType::WebSearch => Self::WebSearch(config(data)?),
            NodeType::KeywordExtraction => Self::KeywordExtraction(config(data)?),
            NodeType::QuestionOptimization => Self::QuestionOptimization(config(data)?),
            NodeType::ImageUnderstanding => Self::ImageUnderstanding(config(data)?),
            NodeType::Ocr => Self::Ocr(config(data)?),
        })
    }
}

/// A node of a workflow definition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawNode")]
pub struct Node {
    /// Graph-unique id.
    pub id: String,
    /// Type and typed configuration.
    pub kind: NodeKind,
    /// Declared input slots.
    pub input: Vec<Variable>,
    /// Declared output slots.
    pub output: Vec<Variable>,
}

impl Node {
    /// Returns the type tag.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    /// Returns the slots other nodes can reference.
    ///
    /// `start` and `end` pass their inputs through, so their outputs are
    /// their declared inputs.
    #[must_use]
    pub fn output_variables(&self) -> &[Variable] {
        match self.kind {
            NodeKind::Start | NodeKind::End => &self.input,
            _ => &self.output,
        }
    }

    /// Finds an output slot by name.
    #[must_use]
    pub fn output_variable(&self, name: &str) -> Option<&Variable> {
        self.output_variables().iter().find(|v| v.name == name)
    }
}

#[derive(Deserialize)]
struct RawNode {
    id: String,
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    data: JsonValue,
}

#[derive(Deserialize, Default)]
struct Slots {
    #[serde(default)]
    input: Vec<Variable>,
    #[serde(default)]
    output: Vec<Variable>,
}

impl TryFrom<RawNode> for Node {
    type Error = String;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        let node_type = NodeType::from_str_value(&raw.node_type)
            .ok_or_else(|| format!("node '{}' has unknown type '{}'", raw.id, raw.node_type))?;

        let data = if raw.data.is_null() {
            JsonValue::Object(serde_json::Map::new())
        } else {
            raw.data
        };
        let invalid = |e: serde_json::Error| format!("node '{}' has invalid data: {e}", raw.id);

        let slots = Slots::deserialize(&data).map_err(invalid)?;
        let kind = NodeKind::parse(node_type, &data).map_err(invalid)?;

        Ok(Self {
            id: raw.id,
            kind,
            input: slots.input,
            output: slots.output,
        })
    }
}
