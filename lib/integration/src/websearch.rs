//! Web search providers.

use crate::error::WebSearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

/// Default Bocha API base URL.
pub const BOCHA_ENDPOINT: &str = "https://api.bochaai.com";

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Page title.
    pub title: String,
    /// Page URL.
    pub url: String,
    /// Short excerpt.
    pub snippet: String,
}

/// A provider that turns a query into ranked results.
#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    /// Returns up to `count` results for `query`, best first.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails.
    async fn search(&self, query: &str, count: u32) -> Result<Vec<SearchResult>, WebSearchError>;
}

/// The Bocha web search API.
#[derive(Debug, Clone)]
pub struct BochaSearch {
    http: Client,
    endpoint: String,
    api_key: String,
}

impl BochaSearch {
    /// Creates a provider against `endpoint` (usually [`BOCHA_ENDPOINT`]).
    ///
    /// # Errors
    ///
    /// Returns [`WebSearchError::NotConfigured`] if the API key is empty, or
    /// [`WebSearchError::RequestFailed`] if the HTTP client cannot be built.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, WebSearchError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(WebSearchError::NotConfigured {
                provider: "bocha".to_string(),
            });
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WebSearchError::RequestFailed {
                reason: e.to_string(),
            })?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[derive(Serialize)]
struct BochaRequest<'a> {
    query: &'a str,
    count: u32,
    freshness: &'static str,
}

#[derive(Deserialize)]
struct BochaResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<BochaAnswer>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BochaAnswer {
    #[serde(default)]
    web_pages: Option<BochaPages>,
}

#[derive(Deserialize)]
struct BochaPages {
    #[serde(default)]
    value: Vec<BochaPage>,
}

#[derive(Deserialize)]
struct BochaPage {
    #[serde(default)]
    name: String,
    url: String,
    #[serde(default)]
    snippet: String,
}

#[async_trait]
impl WebSearchProvider for BochaSearch {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, count: u32) -> Result<Vec<SearchResult>, WebSearchError> {
        let url = format!("{}/v1/web-search", self.endpoint.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&BochaRequest {
                query,
                count,
                freshness: "nolimit",
            })
            .send()
            .await
            .map_err(|e| WebSearchError::RequestFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebSearchError::ProviderError {
                code: i64::from(status.as_u16()),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: BochaResponse =
            response
                .json()
                .await
                .map_err(|e| WebSearchError::ResponseParseFailed {
                    reason: e.to_string(),
                })?;
        if body.code != 0 && body.code != 200 {
            return Err(WebSearchError::ProviderError {
                code: body.code,
                message: body.message.or(body.msg).unwrap_or_default(),
            });
        }

        Ok(body
            .data
            .and_then(|answer| answer.web_pages)
            .map(|pages| pages.value)
            .unwrap_or_default()
            .into_iter()
            .map(|page| SearchResult {
                title: page.name,
                url: page.url,
                snippet: page.snippet,
            })
            .collect())
    }
}

/// Provider used when no search backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredSearch;

#[async_trait]
impl WebSearchProvider for UnconfiguredSearch {
    async fn search(&self, _query: &str, _count: u32) -> Result<Vec<SearchResult>, WebSearchError> {
        Err(WebSearchError::NotConfigured {
            provider: "web search".to_string(),
        })
    }
}
