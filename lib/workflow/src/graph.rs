//! Workflow graph implementation using petgraph.
//!
//! The graph is built once from a definition and answers the traversal
//! questions the engine and the audit views ask. Neighbour lists follow
//! edge declaration order so scheduling is deterministic.

use crate::definition::WorkflowDefinition;
use crate::edge::Edge;
use crate::error::DefinitionError;
use crate::node::Node;
use petgraph::Direction;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};

/// A workflow definition as a directed graph.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    graph: DiGraph<Node, Edge>,
    node_index_map: HashMap<String, NodeIndex>,
}

impl WorkflowGraph {
    /// Parses, validates and indexes a definition document.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] if the document is not a runnable definition.
    pub fn parse(json: &str) -> Result<Self, DefinitionError> {
        WorkflowDefinition::parse(json).map(Self::from_definition)
    }

    /// Indexes a definition. Edges whose endpoints are not declared are dropped.
    #[must_use]
    pub fn from_definition(definition: WorkflowDefinition) -> Self {
        let mut graph = DiGraph::with_capacity(definition.nodes.len(), definition.edges.len());
        let mut node_index_map = HashMap::with_capacity(definition.nodes.len());

        for node in definition.nodes {
            let id = node.id.clone();
            let index = graph.add_node(node);
            node_index_map.entry(id).or_insert(index);
        }
        for edge in definition.edges {
            if let (Some(&source), Some(&target)) =
                (node_index_map.get(&edge.source), node_index_map.get(&edge.target))
            {
                graph.add_edge(source, target, edge);
            }
        }

        Self {
            graph,
            node_index_map,
        }
    }

    /// Returns a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        let index = self.node_index_map.get(id)?;
        self.graph.node_weight(*index)
    }

    /// Returns the start node.
    #[must_use]
    pub fn start_node(&self) -> Option<&Node> {
        self.nodes()
            .find(|n| n.node_type() == crate::node::NodeType::Start)
    }

    /// Returns all nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// Returns all edges in declaration order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.graph.edge_weights()
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Nodes reached by any edge leaving `node_id`.
    #[must_use]
    pub fn successors(&self, node_id: &str) -> Vec<&Node> {
        self.neighbours(node_id, Direction::Outgoing, |_| true)
    }

    /// Nodes with an edge into `node_id`.
    #[must_use]
    pub fn predecessors(&self, node_id: &str) -> Vec<&Node> {
        self.neighbours(node_id, Direction::Incoming, |_| true)
    }

    /// Nodes reached from `node_id` over edges carrying `handle`.
    #[must_use]
    pub fn branch_successors(&self, node_id: &str, handle: &str) -> Vec<&Node> {
        self.neighbours(node_id, Direction::Outgoing, |edge| edge.is_branch(handle))
    }

    /// Edges a run actually travelled.
    ///
    /// An edge passed when both endpoints were reached and, if its source
    /// recorded a branch selection, the edge carries the selected handle.
    #[must_use]
    pub fn passed_edges(
        &self,
        reached: &HashSet<String>,
        branch_selections: &HashMap<String, String>,
    ) -> Vec<&Edge> {
        self.graph
            .edge_weights()
            .filter(|edge| reached.contains(&edge.source) && reached.contains(&edge.target))
            .filter(|edge| match branch_selections.get(&edge.source) {
                Some(selected) => edge.is_branch(selected),
                None => true,
            })
            .collect()
    }

    fn neighbours(
        &self,
        node_id: &str,
        direction: Direction,
        keep: impl Fn(&Edge) -> bool,
    ) -> Vec<&Node> {
        let Some(&index) = self.node_index_map.get(node_id) else {
            return Vec::new();
        };

        let mut edges: Vec<(EdgeIndex, NodeIndex)> = self
            .graph
            .edges_directed(index, direction)
            .filter(|edge| keep(edge.weight()))
            .map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                (edge.id(), other)
            })
            .collect();
        // petgraph walks adjacency lists newest-first.
        edges.sort_by_key(|(edge, _)| *edge);

        let mut seen = HashSet::new();
        edges
            .into_iter()
            .filter(|(_, other)| seen.insert(*other))
            .filter_map(|(_, other)| self.graph.node_weight(other))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// start -> cond -(if)-> llm -> end
    ///               -(else)-> crawler -> end
    fn branching() -> WorkflowGraph {
        WorkflowGraph::parse(
            r#"{
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "cond", "type": "condition", "data": {"branches": []}},
                {"id": "llm", "type": "llm", "data": {"modelId": 1}},
                {"id": "crawler", "type": "crawler"},
                {"id": "end", "type": "end"}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "cond"},
                {"id": "e2", "source": "cond", "target": "llm", "sourceHandle": "if"},
                {"id": "e3", "source": "cond", "target": "crawler", "sourceHandle": "else"},
                {"id": "e4", "source": "llm", "target": "end"},
                {"id": "e5", "source": "crawler", "target": "end"}
            ]
        }"#,
        )
        .expect("valid graph")
    }

    fn ids(nodes: Vec<&Node>) -> Vec<&str> {
        nodes.into_iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn successors_follow_declaration_order() {
        let graph = branching();
        assert_eq!(ids(graph.successors("cond")), vec!["llm", "crawler"]);
        assert_eq!(ids(graph.successors("end")), Vec::<&str>::new());
    }

    #[test]
    fn predecessors_of_join() {
        let graph = branching();
        assert_eq!(ids(graph.predecessors("end")), vec!["llm", "crawler"]);
        assert_eq!(ids(graph.predecessors("start")), Vec::<&str>::new());
    }

    #[test]
    fn branch_successors_filter_by_handle() {
        let graph = branching();
        assert_eq!(ids(graph.branch_successors("cond", "else")), vec!["crawler"]);
        assert_eq!(ids(graph.branch_successors("cond", "missing")), Vec::<&str>::new());
    }

    #[test]
    fn unknown_nodes_have_no_neighbours() {
        let graph = branching();
        assert!(graph.successors("ghost").is_empty());
        assert!(graph.node("ghost").is_none());
    }

    #[test]
    fn duplicate_edges_yield_one_successor() {
        let graph = WorkflowGraph::parse(
            r#"{"nodes": [{"id": "s", "type": "start"}, {"id": "c", "type": "crawler"}],
                "edges": [{"id": "a", "source": "s", "target": "c"}, {"id": "b", "source": "s", "target": "c"}]}"#,
        )
        .expect("valid graph");
        assert_eq!(ids(graph.successors("s")), vec!["c"]);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn passed_edges_respect_branch_selection() {
        let graph = branching();
        let reached: HashSet<String> = ["start", "cond", "crawler", "end"]
            .into_iter()
            .map(String::from)
            .collect();
        let branches = HashMap::from([("cond".to_string(), "else".to_string())]);

        let passed: Vec<&str> = graph
            .passed_edges(&reached, &branches)
            .into_iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(passed, vec!["e1", "e3", "e5"]);
    }

    #[test]
    fn passed_edges_need_both_endpoints() {
        let graph = branching();
        let reached: HashSet<String> = ["start"].into_iter().map(String::from).collect();
        assert!(graph.passed_edges(&reached, &HashMap::new()).is_empty());
    }
}
