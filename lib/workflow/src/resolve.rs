//! Input variable resolution.
//!
//! Literal slots yield their content. Reference slots read the referenced
//! node's stored output. A missing node instance or output key resolves to
//! nothing; callers decide whether that is fatal.

use crate::error::{NodeError, StoreError};
use crate::store::InstanceStore;
use crate::variable::{Variable, VariableValue};
use loomwork_core::WorkflowInstanceId;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Reads node outputs of one instance, fetching each node at most once.
pub struct OutputLookup<'a> {
    store: &'a dyn InstanceStore,
    workflow_id: WorkflowInstanceId,
    cache: Mutex<HashMap<String, Option<Map<String, JsonValue>>>>,
}

impl<'a> OutputLookup<'a> {
    #[must_use]
    pub fn new(store: &'a dyn InstanceStore, workflow_id: WorkflowInstanceId) -> Self {
        Self {
            store,
            workflow_id,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `output[name]` of the instance of `node_id`, if both exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn output(&self, node_id: &str, name: &str) -> Result<Option<JsonValue>, StoreError> {
        let mut cache = self.cache.lock().await;
        if !cache.contains_key(node_id) {
            let output = self
                .store
                .node_instance_by_node_id(self.workflow_id, node_id)
                .await?
                .map(|node| node.output);
            cache.insert(node_id.to_string(), output);
        }
        Ok(cache
            .get(node_id)
            .and_then(Option::as_ref)
            .and_then(|output| output.get(name))
            .cloned())
    }

    /// Resolves one slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn resolve(&self, slot: &Variable) -> Result<Option<JsonValue>, StoreError> {
        match &slot.value {
            VariableValue::Literal { content } => Ok(Some(JsonValue::String(content.clone()))),
            VariableValue::Ref {
                source_node,
                source_name,
            } => self.output(source_node, source_name).await,
        }
    }
}

/// Resolves a node's declared inputs into a name-to-value map.
///
/// With `strict` set, a required slot that does not resolve fails with
/// [`NodeError::MissingInput`]; otherwise it is left out.
///
/// # Errors
///
/// Returns an error if the store cannot be read, or on a missing required
/// input in strict mode.
pub async fn lookup_input_variables(
    store: &dyn InstanceStore,
    workflow_id: WorkflowInstanceId,
    inputs: &[Variable],
    strict: bool,
) -> Result<Map<String, JsonValue>, NodeError> {
    let lookup = OutputLookup::new(store, workflow_id);
    let mut values = Map::new();
    for slot in inputs {
        match lookup.resolve(slot).await? {
            Some(value) => {
                values.insert(slot.name.clone(), value);
            }
            None if strict && slot.required => {
                return Err(NodeError::MissingInput {
                    name: slot.name.clone(),
                });
            }
            None => {}
        }
    }
    Ok(values)
}

/// Reads an input as text. Strings are used as-is, other JSON is rendered.
#[must_use]
pub fn input_text(inputs: &Map<String, JsonValue>, name: &str) -> Option<String> {
    match inputs.get(name)? {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Reads an input that the executor cannot run without.
///
/// # Errors
///
/// Returns [`NodeError::MissingInput`] if the input is absent or empty.
pub fn required_text(inputs: &Map<String, JsonValue>, name: &str) -> Result<String, NodeError> {
    input_text(inputs, name)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| NodeError::MissingInput {
            name: name.to_string(),
        })
}
