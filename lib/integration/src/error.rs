//! Error types for the integration crate.
//!
//! One enum per collaborator so node executors can report which external
//! service failed:
//! - `CrawlError`: page fetching and content extraction
//! - `WebSearchError`: search provider calls
//! - `RetrievalError`: knowledge-base search
//! - `FileStoreError`: file lookup and download

use std::fmt;

/// Errors from fetching a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlError {
    /// The URL could not be parsed.
    InvalidUrl { url: String, reason: String },
    /// The request could not be sent or the body could not be read.
    RequestFailed { url: String, reason: String },
    /// The response content type is not one the crawler can read.
    UnsupportedContent { content_type: String },
    /// The crawler could not be constructed.
    InvalidConfig { reason: String },
}

impl fmt::Display for CrawlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl { url, reason } => write!(f, "invalid url '{url}': {reason}"),
            Self::RequestFailed { url, reason } => {
                write!(f, "request to '{url}' failed: {reason}")
            }
            Self::UnsupportedContent { content_type } => {
                write!(f, "unsupported content type: {content_type}")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid crawler configuration: {reason}"),
        }
    }
}

impl std::error::Error for CrawlError {}

/// Errors from web search providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebSearchError {
    /// The provider is not configured (for example, no API key).
    NotConfigured { provider: String },
    /// The request failed before a response arrived.
    RequestFailed { reason: String },
    /// The provider answered with an error.
    ProviderError { code: i64, message: String },
    /// The response body could not be read.
    ResponseParseFailed { reason: String },
}

impl fmt::Display for WebSearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured { provider } => {
                write!(f, "web search provider '{provider}' is not configured")
            }
            Self::RequestFailed { reason } => write!(f, "web search request failed: {reason}"),
            Self::ProviderError { code, message } => {
                write!(f, "web search provider error {code}: {message}")
            }
            Self::ResponseParseFailed { reason } => {
                write!(f, "failed to parse web search response: {reason}")
            }
        }
    }
}

impl std::error::Error for WebSearchError {}

/// Errors from knowledge retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalError {
    /// No retrieval backend is configured.
    Unavailable,
    /// The knowledge base does not exist.
    KnowledgeBaseNotFound { kb_id: String },
    /// The backend failed.
    SearchFailed { reason: String },
    /// Reranking failed.
    RerankFailed { reason: String },
}

impl fmt::Display for RetrievalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "knowledge retrieval is not configured"),
            Self::KnowledgeBaseNotFound { kb_id } => {
                write!(f, "knowledge base {kb_id} not found")
            }
            Self::SearchFailed { reason } => write!(f, "knowledge search failed: {reason}"),
            Self::RerankFailed { reason } => write!(f, "rerank failed: {reason}"),
        }
    }
}

impl std::error::Error for RetrievalError {}

/// Errors from the file store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStoreError {
    /// No file has the requested id.
    NotFound { file_id: String },
    /// Reading the file failed.
    ReadFailed { path: String, reason: String },
}

impl fmt::Display for FileStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { file_id } => write!(f, "file {file_id} not found"),
            Self::ReadFailed { path, reason } => {
                write!(f, "failed to read file '{path}': {reason}")
            }
        }
    }
}

impl std::error::Error for FileStoreError {}
