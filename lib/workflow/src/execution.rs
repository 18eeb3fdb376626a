//! Workflow and node instance records.
//!
//! A workflow instance is one run of a definition snapshot. Each node that
//! gets scheduled produces exactly one node instance. Both records move
//! through monotonic state machines: `Running` to a terminal state, once.

use crate::node::NodeType;
use chrono::{DateTime, Utc};
use loomwork_core::{NodeInstanceId, TemplateId, UserId, WorkflowInstanceId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Output key under which a condition node records its selected branch.
pub const SUCCESS_BRANCH_KEY: &str = "successBranch";

/// The overall state of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// Nodes are still being scheduled.
    Running,
    /// An end node finished.
    Completed,
    /// A node failed.
    Failed,
}

impl WorkflowStatus {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the stored status code.
    #[must_use]
    pub fn as_i16(&self) -> i16 {
        match self {
            Self::Running => 0,
            Self::Completed => 1,
            Self::Failed => 2,
        }
    }

    /// Parses a stored status code.
    #[must_use]
    pub fn from_i16(code: i16) -> Option<Self> {
        match code {
            0 => Some(Self::Running),
            1 => Some(Self::Completed),
            2 => Some(Self::Failed),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// The state of a single node within an instance.
///
/// `Unreached` never appears on a stored row; it is what a node without a
/// row reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Unreached,
    Running,
    Completed,
    Failed,
}

impl NodeStatus {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the stored status code.
    #[must_use]
    pub fn as_i16(&self) -> i16 {
        match self {
            Self::Unreached => 0,
            Self::Running => 1,
            Self::Completed => 2,
            Self::Failed => 3,
        }
    }

    /// Parses a stored status code.
    #[must_use]
    pub fn from_i16(code: i16) -> Option<Self> {
        match code {
            0 => Some(Self::Unreached),
            1 => Some(Self::Running),
            2 => Some(Self::Completed),
            3 => Some(Self::Failed),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unreached => "unreached",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// One run of a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInstance {
    pub id: WorkflowInstanceId,
    /// Template the definition came from, if any.
    pub template_id: Option<TemplateId>,
    /// Definition JSON captured when the instance started.
    pub data: String,
    pub status: WorkflowStatus,
    pub add_time: DateTime<Utc>,
    pub complete_time: Option<DateTime<Utc>>,
    /// User who started the instance.
    pub add_user: UserId,
}

impl WorkflowInstance {
    /// Creates a running instance.
    #[must_use]
    pub fn new(
        id: WorkflowInstanceId,
        template_id: Option<TemplateId>,
        data: impl Into<String>,
        add_user: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            template_id,
            data: data.into(),
            status: WorkflowStatus::Running,
            add_time: now,
            complete_time: None,
            add_user,
        }
    }
}

/// Execution record of one node within an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInstance {
    pub id: NodeInstanceId,
    pub workflow_id: WorkflowInstanceId,
    pub node_id: String,
    pub node_type: NodeType,
    pub status: NodeStatus,
    /// Output values keyed by output variable name.
    pub output: Map<String, JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub add_time: DateTime<Utc>,
    pub complete_time: Option<DateTime<Utc>>,
}

impl NodeInstance {
    /// Creates a record for a node that has just been scheduled.
    #[must_use]
    pub fn running(
        id: NodeInstanceId,
        workflow_id: WorkflowInstanceId,
        node_id: impl Into<String>,
        node_type: NodeType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            workflow_id,
            node_id: node_id.into(),
            node_type,
            status: NodeStatus::Running,
            output: Map::new(),
            error: None,
            add_time: now,
            complete_time: None,
        }
    }

    /// Creates the completed record of a start node seeded with the workflow inputs.
    #[must_use]
    pub fn seeded_start(
        id: NodeInstanceId,
        workflow_id: WorkflowInstanceId,
        node_id: impl Into<String>,
        inputs: Map<String, JsonValue>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            status: NodeStatus::Completed,
            output: inputs,
            complete_time: Some(now),
            ..Self::running(id, workflow_id, node_id, NodeType::Start, now)
        }
    }

    /// Marks the node as completed. Has no effect once terminal.
    pub fn complete(&mut self, output: Map<String, JsonValue>, now: DateTime<Utc>) {
        if self.status == NodeStatus::Running {
            self.status = NodeStatus::Completed;
            self.output = output;
            self.complete_time = Some(now);
        }
    }

    /// Marks the node as failed. Has no effect once terminal.
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        if self.status == NodeStatus::Running {
            self.status = NodeStatus::Failed;
            self.error = Some(error.into());
            self.complete_time = Some(now);
        }
    }

    /// Returns the branch a condition node selected, if recorded.
    #[must_use]
    pub fn success_branch(&self) -> Option<&str> {
        self.output.get(SUCCESS_BRANCH_KEY).and_then(JsonValue::as_str)
    }

    /// Returns how long the node ran, if it finished.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.complete_time.map(|end| end - self.add_time)
    }
}
