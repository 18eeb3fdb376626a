//! `condition` nodes: pick a branch and record it as `successBranch`.

use super::{NodeContext, NodeOutcome, output};
use crate::condition::{Operand, OperandResolver, select_branch};
use crate::error::{ConditionError, NodeError};
use crate::execution::SUCCESS_BRANCH_KEY;
use crate::graph::WorkflowGraph;
use crate::node::ConditionConfig;
use crate::resolve::OutputLookup;
use crate::variable::{Variable, VariableValue};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::debug;

/// Resolves operands against the graph's declared output types and the
/// stored outputs of the instance.
struct StoredOperands<'a> {
    graph: &'a WorkflowGraph,
    lookup: OutputLookup<'a>,
}

#[async_trait]
impl OperandResolver for StoredOperands<'_> {
    async fn resolve(&self, operand: &Variable) -> Result<Operand, ConditionError> {
        match &operand.value {
            VariableValue::Literal { content } => {
                Ok(Operand::new(operand.ty, JsonValue::String(content.clone())))
            }
            VariableValue::Ref {
                source_node,
                source_name,
            } => {
                let declared = self
                    .graph
                    .node(source_node)
                    .and_then(|node| node.output_variable(source_name))
                    .ok_or_else(|| ConditionError::UnknownOutputVariable {
                        node_id: source_node.clone(),
                        name: source_name.clone(),
                    })?;
                let value = self
                    .lookup
                    .output(source_node, source_name)
                    .await
                    .map_err(|e| ConditionError::Lookup {
                        details: e.to_string(),
                    })?;
                Ok(Operand::new(declared.ty, value.unwrap_or(JsonValue::Null)))
            }
        }
    }
}

pub(super) async fn run(
    ctx: &NodeContext<'_>,
    config: &ConditionConfig,
) -> Result<NodeOutcome, NodeError> {
    let resolver = StoredOperands {
        graph: ctx.graph,
        lookup: OutputLookup::new(ctx.store, ctx.workflow_id),
    };
    let branch = select_branch(&config.branches, &resolver).await?;
    debug!(node_id = %ctx.node.id, handle = %branch.handle, "branch selected");

    Ok(NodeOutcome {
        output: output([(SUCCESS_BRANCH_KEY, JsonValue::String(branch.handle.clone()))]),
        branch: Some(branch.handle.clone()),
    })
}
