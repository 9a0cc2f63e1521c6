//! The lowering orchestrator.
//!
//! Candidates are picked in topological order so a chain's operand tensors
//! already carry inferred shapes when its builder runs. Every rewrite is
//! followed by a full re-inference pass: the synthesized Loop, its body, and
//! the unflatten Reshape all get their edges annotated before the next
//! candidate is considered.

use loft_ir::graph::{Graph, NodeId};
use loft_ir::node::OpKind;
use loft_ir::toposort;
use loft_infer::{infer_graph, Diagnostics};

use crate::builders::registry;
use crate::chain::{fused_into_consumer, scalar_fusable, Chain};
use crate::context::LoweringContext;
use crate::error::*;

/// Knobs for the lowering pass.
#[derive(Debug, Clone)]
pub struct LowerOptions {
    /// Fold the contraction axis of MatMul into the iteration space,
    /// accumulating partial products in the loop carry. Off, the dot
    /// product is unrolled inside one iteration per output element.
    pub coalesced_matmul: bool,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self { coalesced_matmul: true }
    }
}

/// Lower every whole-tensor operator the builder registry accepts.
///
/// Returns the merged diagnostics of the initial inference pass and every
/// re-inference after a rewrite. Operators with no lowering strategy at all
/// (movement, Shape, MaxPool, ...) are left in place; a candidate kind whose
/// builders all decline is a [`Error::NoBuilder`].
pub fn lower_graph(graph: &mut Graph, options: &LowerOptions) -> Result<Diagnostics> {
    let mut diags = infer_graph(graph)?;
    let builders = registry();

    while let Some(root) = next_candidate(graph) {
        let op = graph.operation(root)?.clone();
        let chain = if scalar_fusable(op.op) {
            Chain::fuse_elementwise(graph, root)?
        } else {
            Chain::single(root)
        };

        let builder = builders
            .iter()
            .find(|b| b.can_handle(graph, &chain))
            .ok_or_else(|| Error::NoBuilder { op: op.op, name: op.name.clone() })?;
        tracing::debug!(builder = builder.name(), operator = %op.name, fused = chain.ops().len(), "lowering");

        let mut ctx = LoweringContext::new();
        builder.build(graph, &chain, &mut ctx, options)?;

        diags.extend(infer_graph(graph)?);
    }
    Ok(diags)
}

/// First not-yet-lowered operator in topological order, skipping operators
/// that will be absorbed into a downstream chain. Without the skip, the
/// upstream-most elementwise operator would always root a singleton chain
/// and fusion would never see its consumers.
fn next_candidate(graph: &Graph) -> Option<NodeId> {
    toposort(graph)
        .into_iter()
        .filter(|&id| graph.try_operation(id).is_some_and(|op| lowerable(op.op)))
        .find(|&id| !fused_into_consumer(graph, id))
}

/// Kinds some builder strategy exists for. Everything else survives
/// lowering untouched.
fn lowerable(op: OpKind) -> bool {
    scalar_fusable(op)
        || op.is_reduce()
        || matches!(
            op,
            OpKind::MatMul
                | OpKind::Conv
                | OpKind::AveragePool
                | OpKind::GlobalAveragePool
                | OpKind::Range
                | OpKind::Lstm
        )
}
