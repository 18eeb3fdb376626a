//! Error types for the workflow crate.
//!
//! - `DefinitionError`: the definition JSON cannot be run at all
//! - `ConditionError`: a condition node could not pick a branch
//! - `StoreError`: the instance store failed
//! - `NodeError`: a single node execution failed (recorded on the node instance)
//! - `EngineError`: what engine entry points report to callers

use loomwork_core::{TemplateId, WorkflowInstanceId};
use std::fmt;
use std::time::Duration;

/// Errors from parsing or validating a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// The JSON is unparsable or a node payload is malformed.
    Malformed { reason: String },
    /// No node has type `start`.
    MissingStartNode,
    /// More than one node has type `start`.
    MultipleStartNodes { node_ids: Vec<String> },
    /// Two nodes share an id.
    DuplicateNode { node_id: String },
    /// An edge references a node that is not declared.
    DanglingEdge { edge_id: String, node_id: String },
}

impl fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { reason } => write!(f, "malformed workflow definition: {reason}"),
            Self::MissingStartNode => write!(f, "workflow definition has no start node"),
            Self::MultipleStartNodes { node_ids } => {
                write!(f, "workflow definition has several start nodes: {}", node_ids.join(", "))
            }
            Self::DuplicateNode { node_id } => write!(f, "duplicate node id '{node_id}'"),
            Self::DanglingEdge { edge_id, node_id } => {
                write!(f, "edge '{edge_id}' references unknown node '{node_id}'")
            }
        }
    }
}

impl std::error::Error for DefinitionError {}

/// Errors from evaluating a condition node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    /// The node declares no branches.
    NoBranches,
    /// The two operands of a comparison have different declared types.
    TypeMismatch { left: String, right: String },
    /// A number operand does not parse.
    InvalidNumber { value: String },
    /// An array operand is not a JSON array.
    InvalidArray { value: String },
    /// The comparator is not defined for the operand type.
    UnsupportedOperator { op: String, ty: String },
    /// The operand type cannot be compared.
    UnsupportedType { ty: String },
    /// A reference names an output the source node does not declare.
    UnknownOutputVariable { node_id: String, name: String },
    /// Reading the referenced output failed.
    Lookup { details: String },
}

impl fmt::Display for ConditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoBranches => write!(f, "condition has no branches"),
            Self::TypeMismatch { left, right } => {
                write!(f, "cannot compare {left} with {right}")
            }
            Self::InvalidNumber { value } => write!(f, "invalid number: {value}"),
            Self::InvalidArray { value } => write!(f, "invalid array: {value}"),
            Self::UnsupportedOperator { op, ty } => {
                write!(f, "operator '{op}' is not supported for {ty}")
            }
            Self::UnsupportedType { ty } => write!(f, "values of type {ty} cannot be compared"),
            Self::UnknownOutputVariable { node_id, name } => {
                write!(f, "node '{node_id}' declares no output '{name}'")
            }
            Self::Lookup { details } => write!(f, "failed to read operand: {details}"),
        }
    }
}

impl std::error::Error for ConditionError {}

/// Errors from the instance store or template source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing database failed.
    Database { details: String },
    /// A stored value could not be encoded or decoded.
    Serialization { details: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database { details } => write!(f, "instance store error: {details}"),
            Self::Serialization { details } => {
                write!(f, "instance store serialization error: {details}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from executing one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// A required input did not resolve.
    MissingInput { name: String },
    /// An input resolved to an unusable value.
    InvalidInput { name: String, reason: String },
    /// The node configuration cannot be executed.
    InvalidConfig { reason: String },
    /// Branch selection failed.
    Condition(ConditionError),
    /// A collaborator failed.
    ExternalService { service: String, message: String },
    /// The model answered in an unexpected shape.
    InvalidModelOutput { reason: String },
    /// The node exceeded its deadline.
    Timeout { after: Duration },
    /// The engine shut down while the node was running.
    Cancelled,
    /// The executor panicked.
    Panicked { message: String },
    /// Reading inputs from the instance store failed.
    Store(StoreError),
}

impl NodeError {
    /// Wraps a collaborator failure.
    pub fn external(service: impl Into<String>, error: impl fmt::Display) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingInput { name } => write!(f, "missing required input '{name}'"),
            Self::InvalidInput { name, reason } => write!(f, "invalid input '{name}': {reason}"),
            Self::InvalidConfig { reason } => write!(f, "invalid node configuration: {reason}"),
            Self::Condition(e) => write!(f, "{e}"),
            Self::ExternalService { service, message } => write!(f, "{service} failed: {message}"),
            Self::InvalidModelOutput { reason } => write!(f, "model output format error: {reason}"),
            Self::Timeout { after } => write!(f, "node timed out after {}ms", after.as_millis()),
            Self::Cancelled => write!(f, "node execution was cancelled"),
            Self::Panicked { message } => write!(f, "node execution panicked: {message}"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for NodeError {}

impl From<ConditionError> for NodeError {
    fn from(e: ConditionError) -> Self {
        Self::Condition(e)
    }
}

impl From<StoreError> for NodeError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Errors reported by engine entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The definition cannot be run.
    Definition(DefinitionError),
    /// A required start input is absent.
    MissingInput { variable: String },
    /// The template does not exist.
    TemplateNotFound { template_id: TemplateId },
    /// The workflow instance does not exist.
    InstanceNotFound { workflow_id: WorkflowInstanceId },
    /// The node has no instance in this workflow.
    NodeInstanceNotFound {
        workflow_id: WorkflowInstanceId,
        node_id: String,
    },
    /// The instance store failed.
    Store(StoreError),
}

impl EngineError {
    /// Returns true for errors caused by the caller's request rather than the system.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Definition(_) | Self::MissingInput { .. })
    }

    /// Returns true for lookups of things that do not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TemplateNotFound { .. }
                | Self::InstanceNotFound { .. }
                | Self::NodeInstanceNotFound { .. }
        )
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Definition(e) => write!(f, "{e}"),
            Self::MissingInput { variable } => write!(f, "missing required variable: {variable}"),
            Self::TemplateNotFound { template_id } => write!(f, "template {template_id} not found"),
            Self::InstanceNotFound { workflow_id } => {
                write!(f, "workflow instance {workflow_id} not found")
            }
            Self::NodeInstanceNotFound {
                workflow_id,
                node_id,
            } => write!(f, "node '{node_id}' has not run in workflow instance {workflow_id}"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<DefinitionError> for EngineError {
    fn from(e: DefinitionError) -> Self {
        Self::Definition(e)
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
