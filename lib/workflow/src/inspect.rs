//! Audit queries over finished and running instances.

use crate::edge::Edge;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::execution::{NodeInstance, NodeStatus, WorkflowInstance, WorkflowStatus};
use crate::graph::WorkflowGraph;
use crate::node::NodeType;
use chrono::{DateTime, Utc};
use loomwork_core::{TemplateId, UserId, WorkflowInstanceId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::instrument;

/// Listing view of an instance, without the definition snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSummary {
    pub id: WorkflowInstanceId,
    pub template_id: Option<TemplateId>,
    pub status: WorkflowStatus,
    pub add_time: DateTime<Utc>,
    pub complete_time: Option<DateTime<Utc>>,
    pub add_user: UserId,
}

impl From<WorkflowInstance> for InstanceSummary {
    fn from(instance: WorkflowInstance) -> Self {
        Self {
            id: instance.id,
            template_id: instance.template_id,
            status: instance.status,
            add_time: instance.add_time,
            complete_time: instance.complete_time,
            add_user: instance.add_user,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatusEntry {
    pub node_id: String,
    pub status: NodeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchSelection {
    pub node_id: String,
    pub handle: String,
}

/// An instance together with the path it took through its definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDetail {
    pub instance: WorkflowInstance,
    pub node_status_list: Vec<NodeStatusEntry>,
    pub success_branch_list: Vec<BranchSelection>,
    pub passed_edges: Vec<Edge>,
}

/// One node execution on an instance timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub node_id: String,
    pub node_type: NodeType,
    pub status: NodeStatus,
    pub add_time: DateTime<Utc>,
    pub complete_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl From<&NodeInstance> for TimelineEntry {
    fn from(node: &NodeInstance) -> Self {
        Self {
            node_id: node.node_id.clone(),
            node_type: node.node_type,
            status: node.status,
            add_time: node.add_time,
            complete_time: node.complete_time,
            duration_ms: node.duration().map(|d| d.num_milliseconds()),
        }
    }
}

impl Engine {
    /// Lists the most recent instances, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the store cannot be read.
    pub async fn list_instances(
        &self,
        limit: usize,
    ) -> loomwork_core::Result<Vec<InstanceSummary>, EngineError> {
        let instances = self
            .store()
            .list_instances(limit)
            .await
            .map_err(EngineError::from)?;
        Ok(instances.into_iter().map(InstanceSummary::from).collect())
    }

    /// Returns an instance, the status of every reached node, the recorded
    /// branch selections and the edges the run travelled.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InstanceNotFound`] for an unknown id,
    /// [`EngineError::Definition`] if the stored snapshot no longer parses, or
    /// [`EngineError::Store`] if the store cannot be read.
    #[instrument(skip(self), fields(workflow_id = %workflow_id))]
    pub async fn instance_detail(
        &self,
        workflow_id: WorkflowInstanceId,
    ) -> loomwork_core::Result<InstanceDetail, EngineError> {
        let store = self.store();
        let instance = store
            .get_instance(workflow_id)
            .await
            .map_err(EngineError::from)?
            .ok_or(EngineError::InstanceNotFound { workflow_id })?;
        let statuses = store
            .list_node_statuses(workflow_id)
            .await
            .map_err(EngineError::from)?;
        let branches = store
            .list_branch_selections(workflow_id)
            .await
            .map_err(EngineError::from)?;

        let graph = WorkflowGraph::parse(&instance.data).map_err(EngineError::from)?;
        let reached: HashSet<String> = statuses.iter().map(|(id, _)| id.clone()).collect();
        let selected: HashMap<String, String> = branches.iter().cloned().collect();
        let passed_edges = graph
            .passed_edges(&reached, &selected)
            .into_iter()
            .cloned()
            .collect();

        Ok(InstanceDetail {
            instance,
            node_status_list: statuses
                .into_iter()
                .map(|(node_id, status)| NodeStatusEntry { node_id, status })
                .collect(),
            success_branch_list: branches
                .into_iter()
                .map(|(node_id, handle)| BranchSelection { node_id, handle })
                .collect(),
            passed_edges,
        })
    }

    /// Returns the node executions of an instance in scheduling order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InstanceNotFound`] for an unknown id or
    /// [`EngineError::Store`] if the store cannot be read.
    pub async fn timeline(
        &self,
        workflow_id: WorkflowInstanceId,
    ) -> loomwork_core::Result<Vec<TimelineEntry>, EngineError> {
        let store = self.store();
        if store
            .workflow_status(workflow_id)
            .await
            .map_err(EngineError::from)?
            .is_none()
        {
            return Err(EngineError::InstanceNotFound { workflow_id }.into());
        }
        let mut nodes = store
            .list_node_instances(workflow_id)
            .await
            .map_err(EngineError::from)?;
        nodes.sort_by_key(|n| (n.add_time, n.id));
        Ok(nodes.iter().map(TimelineEntry::from).collect())
    }

    /// Returns the execution record of one node.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NodeInstanceNotFound`] if the node has not been
    /// reached, or [`EngineError::Store`] if the store cannot be read.
    pub async fn node_instance(
        &self,
        workflow_id: WorkflowInstanceId,
        node_id: &str,
    ) -> loomwork_core::Result<NodeInstance, EngineError> {
        self.store()
            .node_instance_by_node_id(workflow_id, node_id)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| {
                EngineError::NodeInstanceNotFound {
                    workflow_id,
                    node_id: node_id.to_string(),
                }
                .into()
            })
    }
}
