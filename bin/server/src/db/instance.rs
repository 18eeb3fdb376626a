//! Postgres-backed instance store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loomwork_core::{NodeInstanceId, TemplateId, UserId, WorkflowInstanceId};
use loomwork_workflow::{
    InsertOutcome, InstanceStore, NodeInstance, NodeStatus, NodeType, StoreError,
    WorkflowInstance, WorkflowStatus,
};
use serde_json::{Map, Value as JsonValue};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

fn database(e: sqlx::Error) -> StoreError {
    StoreError::Database {
        details: e.to_string(),
    }
}

fn corrupt(details: String) -> StoreError {
    StoreError::Serialization { details }
}

/// Row type for instance queries.
#[derive(FromRow)]
struct InstanceRow {
    id: i64,
    template_id: Option<i64>,
    data: String,
    status: i16,
    add_time: DateTime<Utc>,
    complete_time: Option<DateTime<Utc>>,
    add_user: i64,
}

impl InstanceRow {
    fn try_into_instance(self) -> Result<WorkflowInstance, StoreError> {
        let status = WorkflowStatus::from_i16(self.status).ok_or_else(|| {
            corrupt(format!(
                "workflow instance {} has unknown status {}",
                self.id, self.status
            ))
        })?;
        Ok(WorkflowInstance {
            id: WorkflowInstanceId::from_raw(self.id),
            template_id: self.template_id.map(TemplateId::from_raw),
            data: self.data,
            status,
            add_time: self.add_time,
            complete_time: self.complete_time,
            add_user: UserId::from_raw(self.add_user),
        })
    }
}

/// Row type for node instance queries.
#[derive(FromRow)]
struct NodeRow {
    id: i64,
    workflow_id: i64,
    node_id: String,
    node_type: String,
    status: i16,
    output: JsonValue,
    error: Option<String>,
    add_time: DateTime<Utc>,
    complete_time: Option<DateTime<Utc>>,
}

impl NodeRow {
    fn try_into_node(self) -> Result<NodeInstance, StoreError> {
        let node_type = NodeType::from_str_value(&self.node_type).ok_or_else(|| {
            corrupt(format!(
                "node instance {} has unknown type '{}'",
                self.id, self.node_type
            ))
        })?;
        let status = NodeStatus::from_i16(self.status).ok_or_else(|| {
            corrupt(format!(
                "node instance {} has unknown status {}",
                self.id, self.status
            ))
        })?;
        let output = match self.output {
            JsonValue::Object(map) => map,
            JsonValue::Null => Map::new(),
            other => {
                return Err(corrupt(format!(
                    "node instance {} output is not an object: {other}",
                    self.id
                )));
            }
        };
        Ok(NodeInstance {
            id: NodeInstanceId::from_raw(self.id),
            workflow_id: WorkflowInstanceId::from_raw(self.workflow_id),
            node_id: self.node_id,
            node_type,
            status,
            output,
            error: self.error,
            add_time: self.add_time,
            complete_time: self.complete_time,
        })
    }
}

const NODE_COLUMNS: &str =
    "id, workflow_id, node_id, node_type, status, output, error, add_time, complete_time";

/// Instance store over the `workflow_instance` and `node_instance` tables.
#[derive(Debug, Clone)]
pub struct PgInstanceStore {
    pool: PgPool,
}

impl PgInstanceStore {
    /// Creates a new store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InstanceStore for PgInstanceStore {
    async fn create_instance(
        &self,
        instance: &WorkflowInstance,
        start: &NodeInstance,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(database)?;
        sqlx::query(
            r#"
            INSERT INTO workflow_instance
                (id, template_id, data, status, add_time, complete_time, add_user)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(instance.id.as_raw())
        .bind(instance.template_id.map(|t| t.as_raw()))
        .bind(&instance.data)
        .bind(instance.status.as_i16())
        .bind(instance.add_time)
        .bind(instance.complete_time)
        .bind(instance.add_user.as_raw())
        .execute(&mut *tx)
        .await
        .map_err(database)?;

        sqlx::query(
            r#"
            INSERT INTO node_instance
                (id, workflow_id, node_id, node_type, status, output, error, add_time, complete_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(start.id.as_raw())
        .bind(start.workflow_id.as_raw())
        .bind(&start.node_id)
        .bind(start.node_type.as_str())
        .bind(start.status.as_i16())
        .bind(Json(&start.output))
        .bind(&start.error)
        .bind(start.add_time)
        .bind(start.complete_time)
        .execute(&mut *tx)
        .await
        .map_err(database)?;

        tx.commit().await.map_err(database)
    }

    async fn get_instance(
        &self,
        workflow_id: WorkflowInstanceId,
    ) -> Result<Option<WorkflowInstance>, StoreError> {
        let row: Option<InstanceRow> = sqlx::query_as(
            r#"
            SELECT id, template_id, data, status, add_time, complete_time, add_user
            FROM workflow_instance
            WHERE id = $1
            "#,
        )
        .bind(workflow_id.as_raw())
        .fetch_optional(&self.pool)
        .await
        .map_err(database)?;

        row.map(InstanceRow::try_into_instance).transpose()
    }

    async fn workflow_status(
        &self,
        workflow_id: WorkflowInstanceId,
    ) -> Result<Option<WorkflowStatus>, StoreError> {
        let status: Option<i16> =
            sqlx::query_scalar("SELECT status FROM workflow_instance WHERE id = $1")
                .bind(workflow_id.as_raw())
                .fetch_optional(&self.pool)
                .await
                .map_err(database)?;

        status
            .map(|code| {
                WorkflowStatus::from_i16(code)
                    .ok_or_else(|| corrupt(format!("unknown workflow status {code}")))
            })
            .transpose()
    }

    async fn insert_node_instance(&self, node: &NodeInstance) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO node_instance
                (id, workflow_id, node_id, node_type, status, output, error, add_time, complete_time)
            SELECT $1, $2, $3, $4, $5, $6::jsonb, $7, $8, $9
            WHERE EXISTS (
                SELECT 1 FROM workflow_instance WHERE id = $2 AND status = $10
            )
            ON CONFLICT (workflow_id, node_id) DO NOTHING
            "#,
        )
        .bind(node.id.as_raw())
        .bind(node.workflow_id.as_raw())
        .bind(&node.node_id)
        .bind(node.node_type.as_str())
        .bind(node.status.as_i16())
        .bind(Json(&node.output))
        .bind(&node.error)
        .bind(node.add_time)
        .bind(node.complete_time)
        .bind(WorkflowStatus::Running.as_i16())
        .execute(&self.pool)
        .await
        .map_err(database)?;

        if result.rows_affected() == 1 {
            return Ok(InsertOutcome::Inserted);
        }
        match self.workflow_status(node.workflow_id).await? {
            Some(WorkflowStatus::Running) => Ok(InsertOutcome::AlreadyScheduled),
            _ => Ok(InsertOutcome::WorkflowTerminated),
        }
    }

    async fn update_node_instance(&self, node: &NodeInstance) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE node_instance
            SET status = $2, output = $3, error = $4, complete_time = $5
            WHERE id = $1
            "#,
        )
        .bind(node.id.as_raw())
        .bind(node.status.as_i16())
        .bind(Json(&node.output))
        .bind(&node.error)
        .bind(node.complete_time)
        .execute(&self.pool)
        .await
        .map_err(database)?;

        Ok(())
    }

    async fn update_workflow_status(
        &self,
        workflow_id: WorkflowInstanceId,
        status: WorkflowStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE workflow_instance SET status = $2, complete_time = $3 WHERE id = $1")
            .bind(workflow_id.as_raw())
            .bind(status.as_i16())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(database)?;

        Ok(())
    }

    async fn complete_if_running(
        &self,
        workflow_id: WorkflowInstanceId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE workflow_instance SET status = $2, complete_time = $3 WHERE id = $1 AND status = $4",
        )
        .bind(workflow_id.as_raw())
        .bind(WorkflowStatus::Completed.as_i16())
        .bind(at)
        .bind(WorkflowStatus::Running.as_i16())
        .execute(&self.pool)
        .await
        .map_err(database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn node_instance_by_node_id(
        &self,
        workflow_id: WorkflowInstanceId,
        node_id: &str,
    ) -> Result<Option<NodeInstance>, StoreError> {
        let row: Option<NodeRow> = sqlx::query_as(&format!(
            "SELECT {NODE_COLUMNS} FROM node_instance WHERE workflow_id = $1 AND node_id = $2"
        ))
        .bind(workflow_id.as_raw())
        .bind(node_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(database)?;

        row.map(NodeRow::try_into_node).transpose()
    }

    async fn count_running(
        &self,
        workflow_id: WorkflowInstanceId,
        node_ids: &[String],
    ) -> Result<usize, StoreError> {
        if node_ids.is_empty() {
            return Ok(0);
        }
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM node_instance
            WHERE workflow_id = $1 AND status = $2 AND node_id = ANY($3)
            "#,
        )
        .bind(workflow_id.as_raw())
        .bind(NodeStatus::Running.as_i16())
        .bind(node_ids)
        .fetch_one(&self.pool)
        .await
        .map_err(database)?;

        usize::try_from(count).map_err(|e| corrupt(e.to_string()))
    }

    async fn list_node_statuses(
        &self,
        workflow_id: WorkflowInstanceId,
    ) -> Result<Vec<(String, NodeStatus)>, StoreError> {
        let rows: Vec<(String, i16)> = sqlx::query_as(
            r#"
            SELECT node_id, status FROM node_instance
            WHERE workflow_id = $1
            ORDER BY add_time, id
            "#,
        )
        .bind(workflow_id.as_raw())
        .fetch_all(&self.pool)
        .await
        .map_err(database)?;

        rows.into_iter()
            .map(|(node_id, code)| {
                NodeStatus::from_i16(code)
                    .map(|status| (node_id, status))
                    .ok_or_else(|| corrupt(format!("unknown node status {code}")))
            })
            .collect()
    }

    async fn list_branch_selections(
        &self,
        workflow_id: WorkflowInstanceId,
    ) -> Result<Vec<(String, String)>, StoreError> {
        sqlx::query_as(
            r#"
            SELECT node_id, output->>'successBranch' FROM node_instance
            WHERE workflow_id = $1 AND node_type = $2 AND output->>'successBranch' IS NOT NULL
            ORDER BY add_time, id
            "#,
        )
        .bind(workflow_id.as_raw())
        .bind(NodeType::Condition.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(database)
    }

    async fn list_node_instances(
        &self,
        workflow_id: WorkflowInstanceId,
    ) -> Result<Vec<NodeInstance>, StoreError> {
        let rows: Vec<NodeRow> = sqlx::query_as(&format!(
            "SELECT {NODE_COLUMNS} FROM node_instance WHERE workflow_id = $1 ORDER BY add_time, id"
        ))
        .bind(workflow_id.as_raw())
        .fetch_all(&self.pool)
        .await
        .map_err(database)?;

        rows.into_iter().map(NodeRow::try_into_node).collect()
    }

    async fn list_instances(&self, limit: usize) -> Result<Vec<WorkflowInstance>, StoreError> {
        let rows: Vec<InstanceRow> = sqlx::query_as(
            r#"
            SELECT id, template_id, data, status, add_time, complete_time, add_user
            FROM workflow_instance
            ORDER BY add_time DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(database)?;

        rows.into_iter().map(InstanceRow::try_into_instance).collect()
    }
}
