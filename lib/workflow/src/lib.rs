//! Workflow engine for loomwork.
//!
//! This crate provides the workflow execution engine, including:
//!
//! - **Graph Model**: definitions parsed into petgraph directed graphs with
//!   typed nodes, variable slots and branch-carrying edges
//! - **Condition Evaluation**: typed comparisons that select one branch
//! - **Node Executors**: one executor per node type over pluggable services
//! - **Execution**: the engine that schedules nodes against an instance store,
//!   guards joins and propagates failure
//! - **Audit**: instance detail, travelled edges and timelines

pub mod condition;
pub mod definition;
pub mod edge;
pub mod engine;
pub mod error;
pub mod execution;
pub mod executor;
pub mod graph;
pub mod inspect;
pub mod memory;
pub mod node;
pub mod progress;
pub mod resolve;
pub mod store;
pub mod variable;

#[cfg(test)]
mod testing;

pub use condition::{Branch, Comparator, Comparison, Connector};
pub use definition::WorkflowDefinition;
pub use edge::Edge;
pub use engine::{Engine, EngineConfig};
pub use error::{ConditionError, DefinitionError, EngineError, NodeError, StoreError};
pub use execution::{NodeInstance, NodeStatus, WorkflowInstance, WorkflowStatus};
pub use executor::Services;
pub use graph::WorkflowGraph;
pub use inspect::{InstanceDetail, InstanceSummary, TimelineEntry};
pub use memory::{InMemoryInstanceStore, InMemoryTemplateSource};
pub use node::{Node, NodeKind, NodeType};
pub use progress::{ProgressEvent, ProgressHub};
pub use store::{InsertOutcome, InstanceStore, TemplateSource};
pub use variable::{Variable, VariableType, VariableValue};
