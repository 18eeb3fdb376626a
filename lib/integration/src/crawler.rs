//! HTTP page fetching.
//!
//! A fetch either yields a [`CrawlResult`] or fails. HTTP-level failures
//! (non-2xx) are results, not errors: they carry the status code and message
//! and no data.

use crate::error::CrawlError;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Outcome of fetching one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResult {
    /// HTTP status code.
    pub code: u16,
    /// Status line, e.g. `404 Not Found`.
    pub message: String,
    /// Media type without parameters. Present for successful responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Extracted text. Present for successful responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl CrawlResult {
    /// Returns true if the server answered with a 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// Fetches pages and reduces them to text.
#[derive(Debug, Clone)]
pub struct Crawler {
    http: Client,
    paragraph: Selector,
}

impl Crawler {
    /// Creates a crawler with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::InvalidConfig`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, CrawlError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("loomwork/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CrawlError::InvalidConfig {
                reason: e.to_string(),
            })?;
        Self::with_client(http)
    }

    /// Creates a crawler around an existing client.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::InvalidConfig`] if the paragraph selector fails to parse.
    pub fn with_client(http: Client) -> Result<Self, CrawlError> {
        let paragraph = Selector::parse("p").map_err(|e| CrawlError::InvalidConfig {
            reason: e.to_string(),
        })?;
        Ok(Self { http, paragraph })
    }

    /// Fetches `url` and extracts its text.
    ///
    /// `application/json` and `text/plain` bodies are returned raw. `text/html`
    /// is reduced to the text of its `<p>` elements, one per line.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed, the request cannot be
    /// completed, or a successful response has an unsupported content type.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<CrawlResult, CrawlError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| CrawlError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let request_failed = |e: reqwest::Error| CrawlError::RequestFailed {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let response = self.http.get(parsed).send().await.map_err(request_failed)?;

        let status = response.status();
        let message = match status.canonical_reason() {
            Some(reason) => format!("{} {reason}", status.as_u16()),
            None => status.as_u16().to_string(),
        };
        if !status.is_success() {
            debug!(code = status.as_u16(), "page fetch returned non-success status");
            return Ok(CrawlResult {
                code: status.as_u16(),
                message,
                content_type: None,
                data: None,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();

        let data = match content_type.as_str() {
            "application/json" | "text/plain" => response.text().await.map_err(request_failed)?,
            "text/html" => {
                let body = response.text().await.map_err(request_failed)?;
                self.paragraph_text(&body)
            }
            _ => return Err(CrawlError::UnsupportedContent { content_type }),
        };

        Ok(CrawlResult {
            code: status.as_u16(),
            message,
            content_type: Some(content_type),
            data: Some(data),
        })
    }

    /// Fetches `url` and returns its text, or an empty string on any failure.
    pub async fn fetch_text_lenient(&self, url: &str) -> String {
        match self.fetch(url).await {
            Ok(result) => result.data.unwrap_or_default(),
            Err(e) => {
                debug!(url, error = %e, "ignoring crawl failure");
                String::new()
            }
        }
    }

    /// Joins the text of every `<p>` element with newlines. Text nodes inside
    /// a paragraph are trimmed and concatenated.
    fn paragraph_text(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        document
            .select(&self.paragraph)
            .map(|p| p.text().map(str::trim).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
