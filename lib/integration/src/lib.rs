//! External service adapters for loomwork.
//!
//! This crate provides:
//!
//! - **Crawler**: fetch a URL and reduce it to text
//! - **Web search**: provider trait and the Bocha API client
//! - **Knowledge retrieval**: search traits for knowledge bases
//! - **File store**: uploaded-file lookup and download

pub mod crawler;
pub mod error;
pub mod file_store;
pub mod retrieval;
pub mod websearch;

pub use crawler::{CrawlResult, Crawler};
pub use error::{CrawlError, FileStoreError, RetrievalError, WebSearchError};
pub use file_store::{FileMetadata, FileStore, LocalFileStore};
pub use retrieval::{KnowledgeRetriever, Reranker, ScoredDocument, SearchType, UnavailableRetriever};
pub use websearch::{
    BOCHA_ENDPOINT, BochaSearch, SearchResult, UnconfiguredSearch, WebSearchProvider,
};
