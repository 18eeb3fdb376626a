//! Scripted collaborators for executor and engine tests.

use crate::executor::Services;
use async_trait::async_trait;
use loomwork_ai::{ChatModel, ChatRequest, ChatResponse, LlmError, ModelRegistry};
use loomwork_core::{FileId, KnowledgeBaseId, ModelId};
use loomwork_integration::{
    Crawler, FileMetadata, FileStore, FileStoreError, KnowledgeRetriever, Reranker, RetrievalError,
    ScoredDocument, SearchResult, WebSearchError, WebSearchProvider,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A chat model answering from a script. The last reply repeats.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
    images: bool,
    delay: Option<Duration>,
    panic_with: Option<String>,
}

impl ScriptedModel {
    fn build(replies: Vec<Result<String, LlmError>>, images: bool, delay: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            images,
            delay,
            panic_with: None,
        })
    }

    pub fn replying<const N: usize>(replies: [&str; N]) -> Arc<Self> {
        Self::build(replies.iter().map(|r| Ok(r.to_string())).collect(), false, None)
    }

    pub fn failing(error: LlmError) -> Arc<Self> {
        Self::build(vec![Err(error)], false, None)
    }

    pub fn vision(reply: &str) -> Arc<Self> {
        Self::build(vec![Ok(reply.to_string())], true, None)
    }

    pub fn slow(reply: &str, delay: Duration) -> Arc<Self> {
        Self::build(vec![Ok(reply.to_string())], false, Some(delay))
    }

    /// A model whose every call panics with `message`.
    pub fn panicking(message: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            images: false,
            delay: None,
            panic_with: Some(message.to_string()),
        })
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().expect("lock").last().cloned()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().expect("lock").len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn generate(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.requests.lock().expect("lock").push(request.clone());
        if let Some(message) = &self.panic_with {
            panic!("{message}");
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = {
            let mut replies = self.replies.lock().expect("lock");
            if replies.len() > 1 {
                replies.pop_front()
            } else {
                replies.front().cloned()
            }
        };
        let content = reply.unwrap_or_else(|| Ok(String::new()))?;
        Ok(ChatResponse {
            content,
            model: "scripted".to_string(),
            ..ChatResponse::default()
        })
    }

    fn model(&self) -> &str {
        "scripted"
    }

    fn supports_images(&self) -> bool {
        self.images
    }
}

/// Files held in memory, addressed by their id.
#[derive(Default)]
pub struct MemoryFiles {
    files: HashMap<FileId, (String, Vec<u8>)>,
}

impl MemoryFiles {
    pub fn with_file(mut self, id: FileId, extension: &str, bytes: &[u8]) -> Self {
        self.files.insert(id, (extension.to_string(), bytes.to_vec()));
        self
    }
}

#[async_trait]
impl FileStore for MemoryFiles {
    async fn metadata(&self, file_id: FileId) -> Result<FileMetadata, FileStoreError> {
        let (extension, _) = self.files.get(&file_id).ok_or_else(|| FileStoreError::NotFound {
            file_id: file_id.to_string(),
        })?;
        Ok(FileMetadata {
            path: file_id.to_string(),
            extension: extension.clone(),
        })
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, FileStoreError> {
        let id: FileId = path.parse().map_err(|e: loomwork_core::ParseIdError| {
            FileStoreError::ReadFailed {
                path: path.to_string(),
                reason: e.to_string(),
            }
        })?;
        self.files
            .get(&id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| FileStoreError::NotFound {
                file_id: path.to_string(),
            })
    }
}

/// Search provider returning fixed results.
pub struct StaticSearch {
    results: Vec<SearchResult>,
    counts: Mutex<Vec<u32>>,
}

impl StaticSearch {
    pub fn new(urls: &[String]) -> Arc<Self> {
        Arc::new(Self {
            results: urls
                .iter()
                .map(|url| SearchResult {
                    title: url.clone(),
                    url: url.clone(),
                    snippet: String::new(),
                })
                .collect(),
            counts: Mutex::new(Vec::new()),
        })
    }

    pub fn requested_counts(&self) -> Vec<u32> {
        self.counts.lock().expect("lock").clone()
    }
}

#[async_trait]
impl WebSearchProvider for StaticSearch {
    async fn search(&self, _query: &str, count: u32) -> Result<Vec<SearchResult>, WebSearchError> {
        self.counts.lock().expect("lock").push(count);
        Ok(self.results.iter().take(count as usize).cloned().collect())
    }
}

/// Retriever returning fixed documents and recording which search ran.
pub struct StaticRetriever {
    documents: Vec<ScoredDocument>,
    calls: Mutex<Vec<&'static str>>,
}

impl StaticRetriever {
    pub fn new(documents: &[(&str, f64)]) -> Arc<Self> {
        Arc::new(Self {
            documents: documents
                .iter()
                .map(|(content, score)| ScoredDocument {
                    content: (*content).to_string(),
                    score: *score,
                })
                .collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl KnowledgeRetriever for StaticRetriever {
    async fn similarity_search(
        &self,
        _kb_id: KnowledgeBaseId,
        _query: &str,
        threshold: f64,
        count: u32,
    ) -> Result<Vec<ScoredDocument>, RetrievalError> {
        self.calls.lock().expect("lock").push("similarity");
        Ok(self
            .documents
            .iter()
            .filter(|d| d.score >= threshold)
            .take(count as usize)
            .cloned()
            .collect())
    }

    async fn fulltext_search(
        &self,
        _kb_id: KnowledgeBaseId,
        _query: &str,
        count: u32,
    ) -> Result<Vec<ScoredDocument>, RetrievalError> {
        self.calls.lock().expect("lock").push("fulltext");
        Ok(self.documents.iter().take(count as usize).cloned().collect())
    }
}

/// Reranker that reverses the candidate order.
pub struct ReversingReranker;

#[async_trait]
impl Reranker for ReversingReranker {
    async fn rerank(
        &self,
        _query: &str,
        mut documents: Vec<ScoredDocument>,
        top_n: u32,
    ) -> Result<Vec<ScoredDocument>, RetrievalError> {
        documents.reverse();
        documents.truncate(top_n as usize);
        Ok(documents)
    }
}

/// Services with one scripted model and nothing else configured.
pub fn services_with_model(id: ModelId, model: Arc<ScriptedModel>) -> Services {
    let registry = ModelRegistry::new().with_model(id, model);
    Services::new(
        Arc::new(registry),
        Crawler::new(Duration::from_secs(5)).expect("crawler"),
        Arc::new(MemoryFiles::default()),
    )
}

/// Services with no models.
pub fn bare_services() -> Services {
    Services::new(
        Arc::new(ModelRegistry::new()),
        Crawler::new(Duration::from_secs(5)).expect("crawler"),
        Arc::new(MemoryFiles::default()),
    )
}
