//! The workflow execution engine.
//!
//! Starting an instance validates the definition and the start inputs,
//! writes the instance together with its seeded start node, and advances
//! from the start node. Every scheduled node runs as its own task:
//!
//! 1. resolve inputs and run the executor under the node deadline, the
//!    engine's cancellation token and a panic boundary;
//! 2. record the outcome on the node instance;
//! 3. on success advance to successors (only the selected branch for a
//!    condition node), on failure fail the instance.
//!
//! The instance store is the only synchronization point. A successor is
//! scheduled once none of its predecessors is still running, and the
//! store's guarded insert makes sure a join node is scheduled at most once
//! and nothing is scheduled after the instance terminated.

use crate::error::{DefinitionError, EngineError, NodeError};
use crate::execution::{NodeInstance, WorkflowInstance, WorkflowStatus};
use crate::executor::{self, NodeContext, NodeOutcome, Services};
use crate::graph::WorkflowGraph;
use crate::node::{Node, NodeKind};
use crate::progress::{ProgressEvent, ProgressHub};
use crate::store::{InsertOutcome, InstanceStore, TemplateSource};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use loomwork_core::{
    IdGenerator, NodeInstanceId, TemplateId, UserId, WorkflowInstanceId,
};
use serde_json::{Map, Value as JsonValue};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

/// Engine behaviour switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Fail a node when one of its required inputs does not resolve.
    pub strict_inputs: bool,
    /// Deadline for a single node execution.
    pub node_timeout: Option<Duration>,
}

struct Inner {
    store: Arc<dyn InstanceStore>,
    templates: Arc<dyn TemplateSource>,
    services: Services,
    ids: Arc<dyn IdGenerator>,
    config: EngineConfig,
    cancel: CancellationToken,
    tracker: TaskTracker,
    progress: ProgressHub,
}

/// Runs workflow instances. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    #[must_use]
    pub fn new(
        store: Arc<dyn InstanceStore>,
        templates: Arc<dyn TemplateSource>,
        services: Services,
        ids: Arc<dyn IdGenerator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                templates,
                services,
                ids,
                config,
                cancel: CancellationToken::new(),
                tracker: TaskTracker::new(),
                progress: ProgressHub::default(),
            }),
        }
    }

    /// Returns the instance store the engine writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn InstanceStore> {
        &self.inner.store
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Subscribes to progress events of all instances.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.inner.progress.subscribe()
    }

    /// Starts an instance of a stored template.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::TemplateNotFound`] if the template does not
    /// exist, otherwise the errors of [`Engine::start`].
    #[instrument(skip(self, inputs), fields(template_id = %template_id, actor = %actor))]
    pub async fn start_from_template(
        &self,
        template_id: TemplateId,
        actor: UserId,
        inputs: Map<String, JsonValue>,
    ) -> loomwork_core::Result<WorkflowInstanceId, EngineError> {
        let definition = self
            .inner
            .templates
            .get_definition(template_id)
            .await
            .map_err(EngineError::from)?
            .ok_or(EngineError::TemplateNotFound { template_id })?;
        self.start(&definition, Some(template_id), actor, inputs).await
    }

    /// Starts an instance of a definition and returns its id.
    ///
    /// Nothing is persisted unless the definition is runnable and every
    /// required start input is present. Scheduling continues in background
    /// tasks after this returns.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Definition`] for an unrunnable definition,
    /// [`EngineError::MissingInput`] for a missing required start input, or
    /// [`EngineError::Store`] if the instance cannot be written.
    #[instrument(skip(self, definition, inputs), fields(actor = %actor))]
    pub async fn start(
        &self,
        definition: &str,
        template_id: Option<TemplateId>,
        actor: UserId,
        inputs: Map<String, JsonValue>,
    ) -> loomwork_core::Result<WorkflowInstanceId, EngineError> {
        let graph = WorkflowGraph::parse(definition).map_err(EngineError::from)?;
        let start = graph
            .start_node()
            .ok_or(EngineError::Definition(DefinitionError::MissingStartNode))?;
        if let Some(missing) = start
            .input
            .iter()
            .find(|slot| slot.required && !inputs.contains_key(&slot.name))
        {
            return Err(EngineError::MissingInput {
                variable: missing.name.clone(),
            }
            .into());
        }

        let now = Utc::now();
        let workflow_id = WorkflowInstanceId::from_raw(self.inner.ids.next_id());
        let instance = WorkflowInstance::new(workflow_id, template_id, definition, actor, now);
        let seed = NodeInstance::seeded_start(self.next_node_id(), workflow_id, &start.id, inputs, now);
        self.inner
            .store
            .create_instance(&instance, &seed)
            .await
            .map_err(EngineError::from)?;
        info!(workflow_id = %workflow_id, nodes = graph.node_count(), "workflow started");

        let start_id = start.id.clone();
        self.advance(Arc::new(graph), workflow_id, &start_id, None).await;
        Ok(workflow_id)
    }

    /// Waits until no node task is running.
    pub async fn wait_idle(&self) {
        let tracker = &self.inner.tracker;
        tracker.close();
        tracker.wait().await;
        tracker.reopen();
    }

    /// Cancels running nodes and waits for their tasks to finish.
    ///
    /// Cancelled nodes fail their instances. No new nodes are scheduled
    /// afterwards.
    pub async fn shutdown(&self) {
        info!(in_flight = self.inner.tracker.len(), "shutting down workflow engine");
        self.inner.cancel.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }

    fn next_node_id(&self) -> NodeInstanceId {
        NodeInstanceId::from_raw(self.inner.ids.next_id())
    }

    /// Schedules the successors of a finished node.
    #[instrument(skip(self, graph), fields(workflow_id = %workflow_id))]
    async fn advance(
        &self,
        graph: Arc<WorkflowGraph>,
        workflow_id: WorkflowInstanceId,
        node_id: &str,
        branch: Option<&str>,
    ) {
        let store = &self.inner.store;
        match store.workflow_status(workflow_id).await {
            Ok(Some(WorkflowStatus::Running)) => {}
            Ok(status) => {
                debug!(?status, "instance is not running, nothing to schedule");
                return;
            }
            Err(e) => {
                error!(error = %e, "failed to read workflow status");
                return;
            }
        }
        if self.inner.cancel.is_cancelled() {
            return;
        }

        let candidates = match branch {
            Some(handle) => graph.branch_successors(node_id, handle),
            None => graph.successors(node_id),
        };
        for next in candidates {
            let predecessors: Vec<String> = graph
                .predecessors(&next.id)
                .into_iter()
                .map(|n| n.id.clone())
                .collect();
            match store.count_running(workflow_id, &predecessors).await {
                Ok(0) => {}
                Ok(running) => {
                    debug!(next = %next.id, running, "predecessors still running");
                    continue;
                }
                Err(e) => {
                    error!(next = %next.id, error = %e, "failed to count running predecessors");
                    self.fail_workflow(workflow_id).await;
                    return;
                }
            }

            let instance = NodeInstance::running(
                self.next_node_id(),
                workflow_id,
                &next.id,
                next.node_type(),
                Utc::now(),
            );
            match store.insert_node_instance(&instance).await {
                Ok(InsertOutcome::Inserted) => {
                    debug!(next = %next.id, node_type = %next.node_type(), "node scheduled");
                    self.inner
                        .tracker
                        .spawn(self.clone().run_node(Arc::clone(&graph), instance));
                }
                Ok(InsertOutcome::AlreadyScheduled) => {
                    debug!(next = %next.id, "node already scheduled");
                }
                Ok(InsertOutcome::WorkflowTerminated) => {
                    debug!("instance terminated while scheduling");
                    return;
                }
                Err(e) => {
                    error!(next = %next.id, error = %e, "failed to insert node instance");
                    self.fail_workflow(workflow_id).await;
                    return;
                }
            }
        }
    }

    /// Runs a scheduled node to completion. Boxed to break the
    /// spawn/advance type cycle.
    fn run_node(self, graph: Arc<WorkflowGraph>, mut instance: NodeInstance) -> BoxFuture<'static, ()> {
        async move {
            let workflow_id = instance.workflow_id;
            let result = match graph.node(&instance.node_id) {
                Some(node) => self.execute_guarded(&graph, node, workflow_id).await,
                None => Err(NodeError::InvalidConfig {
                    reason: format!("node '{}' is not in the definition", instance.node_id),
                }),
            };

            match result {
                Ok(NodeOutcome { output, branch }) => {
                    instance.complete(output, Utc::now());
                    if !self.record(&instance).await {
                        self.fail_workflow(workflow_id).await;
                        return;
                    }
                    if let Some(NodeKind::End) = graph.node(&instance.node_id).map(|n| &n.kind) {
                        self.complete_workflow(workflow_id).await;
                    }
                    self.advance(Arc::clone(&graph), workflow_id, &instance.node_id, branch.as_deref())
                        .await;
                }
                Err(e) => {
                    warn!(
                        workflow_id = %workflow_id,
                        node_id = %instance.node_id,
                        node_type = %instance.node_type,
                        error = %e,
                        "node failed"
                    );
                    instance.fail(e.to_string(), Utc::now());
                    self.record(&instance).await;
                    self.fail_workflow(workflow_id).await;
                }
            }
        }
        .boxed()
    }

    async fn execute_guarded(
        &self,
        graph: &WorkflowGraph,
        node: &Node,
        workflow_id: WorkflowInstanceId,
    ) -> Result<NodeOutcome, NodeError> {
        let ctx = NodeContext {
            workflow_id,
            node,
            graph,
            store: self.inner.store.as_ref(),
            services: &self.inner.services,
            strict_inputs: self.inner.config.strict_inputs,
        };

        let guarded = async {
            match AssertUnwindSafe(executor::execute(&ctx)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(NodeError::Panicked {
                    message: panic_message(panic.as_ref()),
                }),
            }
        };
        let bounded = async {
            match self.inner.config.node_timeout {
                Some(after) => tokio::time::timeout(after, guarded)
                    .await
                    .unwrap_or(Err(NodeError::Timeout { after })),
                None => guarded.await,
            }
        };

        tokio::select! {
            result = bounded => result,
            () = self.inner.cancel.cancelled() => Err(NodeError::Cancelled),
        }
    }

    /// Persists a finished node and publishes it. Returns false if the write failed.
    async fn record(&self, instance: &NodeInstance) -> bool {
        if let Err(e) = self.inner.store.update_node_instance(instance).await {
            error!(
                workflow_id = %instance.workflow_id,
                node_id = %instance.node_id,
                error = %e,
                "failed to record node result"
            );
            return false;
        }
        self.inner.progress.publish(ProgressEvent::NodeFinished {
            workflow_id: instance.workflow_id,
            node_id: instance.node_id.clone(),
            node_type: instance.node_type,
            status: instance.status,
            error: instance.error.clone(),
            at: instance.complete_time.unwrap_or_else(Utc::now),
        });
        true
    }

    async fn complete_workflow(&self, workflow_id: WorkflowInstanceId) {
        // A sibling branch may have failed the instance already.
        let at = Utc::now();
        match self.inner.store.complete_if_running(workflow_id, at).await {
            Ok(true) => self.workflow_finished(workflow_id, WorkflowStatus::Completed, at),
            Ok(false) => debug!(workflow_id = %workflow_id, "instance already finished"),
            Err(e) => error!(workflow_id = %workflow_id, error = %e, "failed to complete workflow"),
        }
    }

    async fn fail_workflow(&self, workflow_id: WorkflowInstanceId) {
        let at = Utc::now();
        match self
            .inner
            .store
            .update_workflow_status(workflow_id, WorkflowStatus::Failed, at)
            .await
        {
            Ok(()) => self.workflow_finished(workflow_id, WorkflowStatus::Failed, at),
            Err(e) => {
                error!(workflow_id = %workflow_id, error = %e, "failed to update workflow status");
            }
        }
    }

    fn workflow_finished(
        &self,
        workflow_id: WorkflowInstanceId,
        status: WorkflowStatus,
        at: DateTime<Utc>,
    ) {
        info!(workflow_id = %workflow_id, status = status.as_str(), "workflow finished");
        self.inner.progress.publish(ProgressEvent::WorkflowFinished {
            workflow_id,
            status,
            at,
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
