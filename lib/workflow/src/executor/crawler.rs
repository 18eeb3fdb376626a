//! `crawler` nodes: fetch the `url` input.

use super::Services;
use crate::error::NodeError;
use crate::resolve::required_text;
use serde_json::{Map, Value as JsonValue};

pub(super) async fn run(
    services: &Services,
    inputs: &Map<String, JsonValue>,
) -> Result<Map<String, JsonValue>, NodeError> {
    let url = required_text(inputs, "url")?;
    let result = services
        .crawler
        .fetch(url.trim())
        .await
        .map_err(|e| NodeError::external("crawler", e))?;

    match serde_json::to_value(result) {
        Ok(JsonValue::Object(output)) => Ok(output),
        Ok(other) => Err(NodeError::InvalidConfig {
            reason: format!("crawl result is not an object: {other}"),
        }),
        Err(e) => Err(NodeError::external("crawler", e)),
    }
}
