//! Workflow definitions.
//!
//! A definition is the `{nodes, edges}` document an instance snapshots when
//! it starts. Validation happens at start time: the document must parse,
//! node ids must be unique, edges must reference declared nodes, and
//! exactly one node must be the `start` node.

use crate::edge::Edge;
use crate::error::DefinitionError;
use crate::node::{Node, NodeType};
use serde::Deserialize;
use std::collections::HashSet;

/// A parsed workflow definition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowDefinition {
    /// Parses and validates a definition document.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] describing the first problem found.
    pub fn parse(json: &str) -> Result<Self, DefinitionError> {
        let definition: Self = serde_json::from_str(json).map_err(|e| DefinitionError::Malformed {
            reason: e.to_string(),
        })?;
        definition.validate()?;
        Ok(definition)
    }

    /// Checks the structural rules a runnable definition must satisfy.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] describing the first violation.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        let mut ids = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(DefinitionError::DuplicateNode {
                    node_id: node.id.clone(),
                });
            }
        }

        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(DefinitionError::DanglingEdge {
                        edge_id: edge.id.clone(),
                        node_id: endpoint.clone(),
                    });
                }
            }
        }

        let starts: Vec<&Node> = self
            .nodes
            .iter()
            .filter(|n| n.node_type() == NodeType::Start)
            .collect();
        match starts.as_slice() {
            [] => Err(DefinitionError::MissingStartNode),
            [_] => Ok(()),
            many => Err(DefinitionError::MultipleStartNodes {
                node_ids: many.iter().map(|n| n.id.clone()).collect(),
            }),
        }
    }

    /// Returns the start node.
    #[must_use]
    pub fn start_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.node_type() == NodeType::Start)
    }

    /// Finds a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
