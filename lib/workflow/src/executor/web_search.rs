//! `webSearch` nodes: search, then crawl every hit concurrently.

use super::{Services, output};
use crate::error::NodeError;
use crate::node::WebSearchConfig;
use crate::resolve::required_text;
use futures::future::join_all;
use serde_json::{Map, Value as JsonValue};

pub(super) async fn run(
    services: &Services,
    config: &WebSearchConfig,
    inputs: &Map<String, JsonValue>,
) -> Result<Map<String, JsonValue>, NodeError> {
    let query = required_text(inputs, "query")?;
    let count = u32::try_from(config.top_n)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| NodeError::InvalidConfig {
            reason: format!("topN must be positive, got {}", config.top_n),
        })?;

    let results = services
        .web_search
        .search(&query, count)
        .await
        .map_err(|e| NodeError::external("web search", e))?;

    // A page that cannot be fetched contributes an empty string.
    let contents = join_all(
        results
            .iter()
            .map(|hit| services.crawler.fetch_text_lenient(&hit.url)),
    )
    .await;

    let urls: Vec<JsonValue> = results
        .into_iter()
        .map(|hit| JsonValue::String(hit.url))
        .collect();
    Ok(output([
        ("total", JsonValue::from(urls.len())),
        ("urls", JsonValue::Array(urls)),
        (
            "contents",
            JsonValue::Array(contents.into_iter().map(JsonValue::String).collect()),
        ),
    ]))
}
