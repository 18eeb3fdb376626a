//! In-memory instance store and template source.
//!
//! Same contract as the database-backed store, behind a single mutex. Used
//! by tests and by embedders that do not need durability.

use crate::error::StoreError;
use crate::execution::{NodeInstance, NodeStatus, WorkflowInstance, WorkflowStatus};
use crate::store::{InsertOutcome, InstanceStore, TemplateSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loomwork_core::{TemplateId, WorkflowInstanceId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Tables {
    instances: HashMap<WorkflowInstanceId, WorkflowInstance>,
    /// Node instances per workflow in insertion order.
    nodes: HashMap<WorkflowInstanceId, Vec<NodeInstance>>,
}

/// Instance store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryInstanceStore {
    tables: Mutex<Tables>,
}

impl InMemoryInstanceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl InstanceStore for InMemoryInstanceStore {
    async fn create_instance(
        &self,
        instance: &WorkflowInstance,
        start: &NodeInstance,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables();
        if tables.instances.contains_key(&instance.id) {
            return Err(StoreError::Database {
                details: format!("workflow instance {} already exists", instance.id),
            });
        }
        tables.instances.insert(instance.id, instance.clone());
        tables.nodes.insert(instance.id, vec![start.clone()]);
        Ok(())
    }

    async fn get_instance(
        &self,
        workflow_id: WorkflowInstanceId,
    ) -> Result<Option<WorkflowInstance>, StoreError> {
        Ok(self.tables().instances.get(&workflow_id).cloned())
    }

    async fn workflow_status(
        &self,
        workflow_id: WorkflowInstanceId,
    ) -> Result<Option<WorkflowStatus>, StoreError> {
        Ok(self.tables().instances.get(&workflow_id).map(|i| i.status))
    }

    async fn insert_node_instance(&self, node: &NodeInstance) -> Result<InsertOutcome, StoreError> {
        let mut tables = self.tables();
        let running = tables
            .instances
            .get(&node.workflow_id)
            .is_some_and(|i| i.status == WorkflowStatus::Running);
        if !running {
            return Ok(InsertOutcome::WorkflowTerminated);
        }

        let nodes = tables.nodes.entry(node.workflow_id).or_default();
        if nodes.iter().any(|n| n.node_id == node.node_id) {
            return Ok(InsertOutcome::AlreadyScheduled);
        }
        nodes.push(node.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn update_node_instance(&self, node: &NodeInstance) -> Result<(), StoreError> {
        let mut tables = self.tables();
        let row = tables
            .nodes
            .get_mut(&node.workflow_id)
            .and_then(|nodes| nodes.iter_mut().find(|n| n.id == node.id))
            .ok_or_else(|| StoreError::Database {
                details: format!("node instance {} does not exist", node.id),
            })?;
        row.status = node.status;
        row.output = node.output.clone();
        row.error = node.error.clone();
        row.complete_time = node.complete_time;
        Ok(())
    }

    async fn update_workflow_status(
        &self,
        workflow_id: WorkflowInstanceId,
        status: WorkflowStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(instance) = self.tables().instances.get_mut(&workflow_id) {
            instance.status = status;
            instance.complete_time = Some(at);
        }
        Ok(())
    }

    async fn complete_if_running(
        &self,
        workflow_id: WorkflowInstanceId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        match tables.instances.get_mut(&workflow_id) {
            Some(instance) if instance.status == WorkflowStatus::Running => {
                instance.status = WorkflowStatus::Completed;
                instance.complete_time = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn node_instance_by_node_id(
        &self,
        workflow_id: WorkflowInstanceId,
        node_id: &str,
    ) -> Result<Option<NodeInstance>, StoreError> {
        Ok(self
            .tables()
            .nodes
            .get(&workflow_id)
            .and_then(|nodes| nodes.iter().find(|n| n.node_id == node_id))
            .cloned())
    }

    async fn count_running(
        &self,
        workflow_id: WorkflowInstanceId,
        node_ids: &[String],
    ) -> Result<usize, StoreError> {
        Ok(self.tables().nodes.get(&workflow_id).map_or(0, |nodes| {
            nodes
                .iter()
                .filter(|n| n.status == NodeStatus::Running && node_ids.contains(&n.node_id))
                .count()
        }))
    }

    async fn list_node_statuses(
        &self,
        workflow_id: WorkflowInstanceId,
    ) -> Result<Vec<(String, NodeStatus)>, StoreError> {
        Ok(self.tables().nodes.get(&workflow_id).map_or_else(Vec::new, |nodes| {
            nodes.iter().map(|n| (n.node_id.clone(), n.status)).collect()
        }))
    }

    async fn list_branch_selections(
        &self,
        workflow_id: WorkflowInstanceId,
    ) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self.tables().nodes.get(&workflow_id).map_or_else(Vec::new, |nodes| {
            nodes
                .iter()
                .filter_map(|n| Some((n.node_id.clone(), n.success_branch()?.to_string())))
                .collect()
        }))
    }

    async fn list_node_instances(
        &self,
        workflow_id: WorkflowInstanceId,
    ) -> Result<Vec<NodeInstance>, StoreError> {
        Ok(self.tables().nodes.get(&workflow_id).cloned().unwrap_or_default())
    }

    async fn list_instances(&self, limit: usize) -> Result<Vec<WorkflowInstance>, StoreError> {
        let mut instances: Vec<WorkflowInstance> = self.tables().instances.values().cloned().collect();
        instances.sort_by(|a, b| b.add_time.cmp(&a.add_time).then(b.id.as_raw().cmp(&a.id.as_raw())));
        instances.truncate(limit);
        Ok(instances)
    }
}

/// Template source kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryTemplateSource {
    templates: Mutex<HashMap<TemplateId, String>>,
}

impl InMemoryTemplateSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores or replaces a template definition.
    pub fn insert(&self, template_id: TemplateId, definition: impl Into<String>) {
        self.templates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(template_id, definition.into());
    }
}

#[async_trait]
impl TemplateSource for InMemoryTemplateSource {
    async fn get_definition(&self, template_id: TemplateId) -> Result<Option<String>, StoreError> {
        Ok(self
            .templates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&template_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;
    use loomwork_core::{NodeInstanceId, UserId};
    use serde_json::{Map, json};

    const WF: WorkflowInstanceId = WorkflowInstanceId::from_raw(10);

    async fn seeded() -> InMemoryInstanceStore {
        let store = InMemoryInstanceStore::new();
        let now = Utc::now();
        let instance = WorkflowInstance::new(WF, None, "{}", UserId::from_raw(1), now);
        let start = NodeInstance::seeded_start(NodeInstanceId::from_raw(1), WF, "start", Map::new(), now);
        store.create_instance(&instance, &start).await.expect("create");
        store
    }

    fn running(id: i64, node_id: &str) -> NodeInstance {
        NodeInstance::running(NodeInstanceId::from_raw(id), WF, node_id, NodeType::Crawler, Utc::now())
    }

    #[tokio::test]
    async fn second_insert_for_a_node_is_rejected() {
        let store = seeded().await;
        assert_eq!(
            store.insert_node_instance(&running(2, "join")).await.expect("insert"),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.insert_node_instance(&running(3, "join")).await.expect("insert"),
            InsertOutcome::AlreadyScheduled
        );
        assert_eq!(store.list_node_instances(WF).await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn nothing_is_inserted_after_termination() {
        let store = seeded().await;
        store
            .update_workflow_status(WF, WorkflowStatus::Failed, Utc::now())
            .await
            .expect("update");
        assert_eq!(
            store.insert_node_instance(&running(2, "late")).await.expect("insert"),
            InsertOutcome::WorkflowTerminated
        );
        assert!(store.node_instance_by_node_id(WF, "late").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn completion_does_not_override_failure() {
        let store = seeded().await;
        store
            .update_workflow_status(WF, WorkflowStatus::Failed, Utc::now())
            .await
            .expect("update");

        assert!(!store.complete_if_running(WF, Utc::now()).await.expect("complete"));
        assert_eq!(
            store.workflow_status(WF).await.expect("status"),
            Some(WorkflowStatus::Failed)
        );
    }

    #[tokio::test]
    async fn running_instance_completes_once() {
        let store = seeded().await;
        assert!(store.complete_if_running(WF, Utc::now()).await.expect("complete"));
        assert!(!store.complete_if_running(WF, Utc::now()).await.expect("complete"));
        assert!(
            !store
                .complete_if_running(WorkflowInstanceId::from_raw(99), Utc::now())
                .await
                .expect("complete")
        );

        let instance = store.get_instance(WF).await.expect("get").expect("instance");
        assert_eq!(instance.status, WorkflowStatus::Completed);
        assert!(instance.complete_time.is_some());
    }

    #[tokio::test]
    async fn count_running_only_counts_named_nodes() {
        let store = seeded().await;
        store.insert_node_instance(&running(2, "a")).await.expect("insert");
        store.insert_node_instance(&running(3, "b")).await.expect("insert");

        let names = vec!["a".to_string(), "start".to_string()];
        assert_eq!(store.count_running(WF, &names).await.expect("count"), 1);

        let mut a = running(2, "a");
        a.complete(Map::from_iter([("successBranch".to_string(), json!("if"))]), Utc::now());
        store.update_node_instance(&a).await.expect("update");
        assert_eq!(store.count_running(WF, &names).await.expect("count"), 0);
        assert_eq!(
            store.list_branch_selections(WF).await.expect("branches"),
            vec![("a".to_string(), "if".to_string())]
        );
    }

    #[tokio::test]
    async fn templates_round_trip() {
        let templates = InMemoryTemplateSource::new();
        templates.insert(TemplateId::from_raw(5), "{\"nodes\": []}");
        assert!(templates.get_definition(TemplateId::from_raw(5)).await.expect("get").is_some());
        assert!(templates.get_definition(TemplateId::from_raw(6)).await.expect("get").is_none());
    }
}
