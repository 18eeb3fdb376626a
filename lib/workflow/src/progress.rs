//! Progress events.
//!
//! The engine publishes an event whenever a node or an instance reaches a
//! terminal state. Publishing never waits: slow subscribers lag and lose
//! events, and having no subscribers is fine.

use crate::execution::{NodeStatus, WorkflowStatus};
use crate::node::NodeType;
use chrono::{DateTime, Utc};
use loomwork_core::WorkflowInstanceId;
use serde::Serialize;
use tokio::sync::broadcast;

/// A terminal transition observed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ProgressEvent {
    /// A node instance completed or failed.
    NodeFinished {
        workflow_id: WorkflowInstanceId,
        node_id: String,
        node_type: NodeType,
        status: NodeStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        at: DateTime<Utc>,
    },
    /// A workflow instance completed or failed.
    WorkflowFinished {
        workflow_id: WorkflowInstanceId,
        status: WorkflowStatus,
        at: DateTime<Utc>,
    },
}

impl ProgressEvent {
    /// Returns the instance the event belongs to.
    #[must_use]
    pub fn workflow_id(&self) -> WorkflowInstanceId {
        match self {
            Self::NodeFinished { workflow_id, .. } | Self::WorkflowFinished { workflow_id, .. } => {
                *workflow_id
            }
        }
    }
}

/// Broadcast channel for [`ProgressEvent`]s.
#[derive(Debug, Clone)]
pub struct ProgressHub {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressHub {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event to current subscribers.
    pub fn publish(&self, event: ProgressEvent) {
        // No receivers is not an error.
        let _ = self.tx.send(event);
    }

    /// Subscribes to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(256)
    }
}
