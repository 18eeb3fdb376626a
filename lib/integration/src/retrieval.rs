//! Knowledge-base retrieval.
//!
//! The ingestion side (chunking, embedding, vector-store writes) lives
//! elsewhere; this module only describes how searches are requested.

use crate::error::RetrievalError;
use async_trait::async_trait;
use loomwork_core::KnowledgeBaseId;
use serde::{Deserialize, Serialize};

/// How a knowledge base is searched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    /// Vector similarity over embeddings.
    #[default]
    Similarity,
    /// Full-text keyword search.
    Fulltext,
    /// Both, merged.
    Hybrid,
}

impl SearchType {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Similarity => "similarity",
            Self::Fulltext => "fulltext",
            Self::Hybrid => "hybrid",
        }
    }
}

/// A retrieved chunk and its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    /// Chunk text.
    pub content: String,
    /// Relevance; higher is better.
    pub score: f64,
}

/// Search access to knowledge bases.
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    /// Vector similarity search keeping hits scoring at least `threshold`.
    async fn similarity_search(
        &self,
        kb_id: KnowledgeBaseId,
        query: &str,
        threshold: f64,
        count: u32,
    ) -> Result<Vec<ScoredDocument>, RetrievalError>;

    /// Full-text search.
    async fn fulltext_search(
        &self,
        kb_id: KnowledgeBaseId,
        query: &str,
        count: u32,
    ) -> Result<Vec<ScoredDocument>, RetrievalError>;

    /// Combined similarity and full-text search.
    ///
    /// The default merges both result lists, keeping the best score per
    /// chunk and the top `count` overall.
    async fn hybrid_search(
        &self,
        kb_id: KnowledgeBaseId,
        query: &str,
        threshold: f64,
        count: u32,
    ) -> Result<Vec<ScoredDocument>, RetrievalError> {
        let similar = self.similarity_search(kb_id, query, threshold, count).await?;
        let fulltext = self.fulltext_search(kb_id, query, count).await?;
        Ok(merge_ranked(similar, fulltext, count))
    }
}

/// Reorders candidate documents by relevance to a query.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Returns the best `top_n` documents, most relevant first.
    async fn rerank(
        &self,
        query: &str,
        documents: Vec<ScoredDocument>,
        top_n: u32,
    ) -> Result<Vec<ScoredDocument>, RetrievalError>;
}

/// Merges two ranked lists, deduplicating by content.
#[must_use]
pub fn merge_ranked(
    first: Vec<ScoredDocument>,
    second: Vec<ScoredDocument>,
    count: u32,
) -> Vec<ScoredDocument> {
    let mut merged: Vec<ScoredDocument> = Vec::with_capacity(first.len() + second.len());
    for doc in first.into_iter().chain(second) {
        match merged.iter_mut().find(|d| d.content == doc.content) {
            Some(existing) if existing.score < doc.score => existing.score = doc.score,
            Some(_) => {}
            None => merged.push(doc),
        }
    }
    merged.sort_by(|a, b| b.score.total_cmp(&a.score));
    merged.truncate(count as usize);
    merged
}

/// Retriever used when no knowledge backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableRetriever;

#[async_trait]
impl KnowledgeRetriever for UnavailableRetriever {
    async fn similarity_search(
        &self,
        _kb_id: KnowledgeBaseId,
        _query: &str,
        _threshold: f64,
        _count: u32,
    ) -> Result<Vec<ScoredDocument>, RetrievalError> {
        Err(RetrievalError::Unavailable)
    }

    async fn fulltext_search(
        &self,
        _kb_id: KnowledgeBaseId,
        _query: &str,
        _count: u32,
    ) -> Result<Vec<ScoredDocument>, RetrievalError> {
        Err(RetrievalError::Unavailable)
    }
}
