//! `knowledgeRetrieval` nodes.

use super::{Services, output};
use crate::error::NodeError;
use crate::node::KnowledgeRetrievalConfig;
use crate::resolve::required_text;
use loomwork_integration::SearchType;
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

pub(super) async fn run(
    services: &Services,
    config: &KnowledgeRetrievalConfig,
    inputs: &Map<String, JsonValue>,
) -> Result<Map<String, JsonValue>, NodeError> {
    let query = required_text(inputs, "query")?;
    let retriever = &services.retriever;
    let failed = |e| NodeError::external("knowledge retrieval", e);

    let documents = match config.search_type {
        SearchType::Similarity => retriever
            .similarity_search(config.kb_id, &query, config.similarity_threshold, config.count)
            .await
            .map_err(failed)?,
        SearchType::Fulltext => retriever
            .fulltext_search(config.kb_id, &query, config.count)
            .await
            .map_err(failed)?,
        SearchType::Hybrid => {
            let merged = retriever
                .hybrid_search(config.kb_id, &query, config.similarity_threshold, config.count)
                .await
                .map_err(failed)?;
            match (&services.reranker, config.rerank) {
                (Some(reranker), true) => reranker
                    .rerank(&query, merged, config.count)
                    .await
                    .map_err(failed)?,
                (None, true) => {
                    debug!("rerank requested but no reranker is configured");
                    merged
                }
                (_, false) => merged,
            }
        }
    };

    let contents: Vec<JsonValue> = documents
        .into_iter()
        .map(|doc| JsonValue::String(doc.content))
        .collect();
    Ok(output([
        ("total", JsonValue::from(contents.len())),
        ("documents", JsonValue::Array(contents)),
    ]))
}
