//! Persistence seams for the engine.
//!
//! The instance store is the only synchronization point between node tasks.
//! In particular [`InstanceStore::insert_node_instance`] is the join guard:
//! it inserts at most one row per `(workflow_id, node_id)` and nothing once
//! the instance is terminal.

use crate::error::StoreError;
use crate::execution::{NodeInstance, NodeStatus, WorkflowInstance, WorkflowStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loomwork_core::{TemplateId, WorkflowInstanceId};

/// Result of a guarded node insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The row was written; the caller owns the execution.
    Inserted,
    /// Another task already scheduled this node.
    AlreadyScheduled,
    /// The instance is no longer running.
    WorkflowTerminated,
}

/// Storage for workflow and node instances.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Writes a new instance together with its seeded start node, atomically.
    async fn create_instance(
        &self,
        instance: &WorkflowInstance,
        start: &NodeInstance,
    ) -> Result<(), StoreError>;

    /// Loads an instance.
    async fn get_instance(
        &self,
        workflow_id: WorkflowInstanceId,
    ) -> Result<Option<WorkflowInstance>, StoreError>;

    /// Returns an instance's status.
    async fn workflow_status(
        &self,
        workflow_id: WorkflowInstanceId,
    ) -> Result<Option<WorkflowStatus>, StoreError>;

    /// Inserts a node instance unless one exists for the node or the
    /// instance is terminal.
    async fn insert_node_instance(&self, node: &NodeInstance) -> Result<InsertOutcome, StoreError>;

    /// Writes the status, output, error and completion time of a node instance.
    async fn update_node_instance(&self, node: &NodeInstance) -> Result<(), StoreError>;

    /// Sets an instance's status and completion time.
    async fn update_workflow_status(
        &self,
        workflow_id: WorkflowInstanceId,
        status: WorkflowStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Marks a running instance completed. Returns false, writing nothing,
    /// if the instance is missing or no longer running.
    async fn complete_if_running(
        &self,
        workflow_id: WorkflowInstanceId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Loads the node instance of a graph node.
    async fn node_instance_by_node_id(
        &self,
        workflow_id: WorkflowInstanceId,
        node_id: &str,
    ) -> Result<Option<NodeInstance>, StoreError>;

    /// Counts running node instances among the given graph nodes.
    async fn count_running(
        &self,
        workflow_id: WorkflowInstanceId,
        node_ids: &[String],
    ) -> Result<usize, StoreError>;

    /// Returns `(node_id, status)` for every node instance.
    async fn list_node_statuses(
        &self,
        workflow_id: WorkflowInstanceId,
    ) -> Result<Vec<(String, NodeStatus)>, StoreError>;

    /// Returns `(node_id, handle)` for every recorded branch selection.
    async fn list_branch_selections(
        &self,
        workflow_id: WorkflowInstanceId,
    ) -> Result<Vec<(String, String)>, StoreError>;

    /// Returns every node instance ordered by insertion time.
    async fn list_node_instances(
        &self,
        workflow_id: WorkflowInstanceId,
    ) -> Result<Vec<NodeInstance>, StoreError>;

    /// Returns instances newest first.
    async fn list_instances(&self, limit: usize) -> Result<Vec<WorkflowInstance>, StoreError>;
}

/// Source of stored workflow definitions.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    /// Returns the definition JSON of a template, if it exists.
    async fn get_definition(&self, template_id: TemplateId) -> Result<Option<String>, StoreError>;
}
