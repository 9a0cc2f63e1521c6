//! Fusable operator chains.
//!
//! The Default builder lowers a whole run of elementwise operators into one
//! loop body: an upstream operator joins the chain when its result is an
//! intermediate tensor consumed only by another chain member, so its scalar
//! contribution never needs to materialize as a full tensor.

use loft_ir::graph::{Graph, NodeId};
use loft_ir::node::{OpKind, TensorKind};

use crate::error::Result;

/// A root operator plus the contiguous fused upstream operators, in
/// dependency order (root last).
#[derive(Debug, Clone)]
pub struct Chain {
    root: NodeId,
    ops: Vec<NodeId>,
}

impl Chain {
    pub fn single(op: NodeId) -> Self {
        Self { root: op, ops: vec![op] }
    }

    /// The chain's downstream-most operator; its output is the loop output.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Members in dependency order, root last.
    pub fn ops(&self) -> &[NodeId] {
        &self.ops
    }

    pub fn contains(&self, op: NodeId) -> bool {
        self.ops.contains(&op)
    }

    /// Grow an elementwise chain upstream from `root`.
    pub fn fuse_elementwise(graph: &Graph, root: NodeId) -> Result<Self> {
        let mut ops = Vec::new();
        collect(graph, root, &mut ops)?;
        Ok(Self { root, ops })
    }
}

fn collect(graph: &Graph, op_id: NodeId, ops: &mut Vec<NodeId>) -> Result<()> {
    let op = graph.operation(op_id)?.clone();
    for operand in op.present_params() {
        if !fusable_operand(graph, operand, op_id)? {
            continue;
        }
        // Producer existence checked by fusable_operand.
        if let Some(producer) = graph.producer(operand)? {
            if !ops.contains(&producer) {
                collect(graph, producer, ops)?;
            }
        }
    }
    ops.push(op_id);
    Ok(())
}

/// A tensor feeds the chain when it is an intermediate produced by a
/// top-level scalar-capable operator and `consumer` is its only reader.
fn fusable_operand(graph: &Graph, tensor: NodeId, consumer: NodeId) -> Result<bool> {
    let Some(node) = graph.try_tensor(tensor) else {
        return Ok(false);
    };
    if node.kind != TensorKind::Intermediate {
        return Ok(false);
    }
    let Some(producer) = graph.producer(tensor)? else {
        return Ok(false);
    };
    if graph.parent(producer)?.is_some() || !scalar_fusable(graph.operation(producer)?.op) {
        return Ok(false);
    }
    Ok(graph.consumers(tensor)? == vec![consumer])
}

/// Operator kinds the Default builder can express as a single scalar step.
pub(crate) fn scalar_fusable(op: OpKind) -> bool {
    op.is_elementwise_binary() || op.is_elementwise_unary() || op == OpKind::Where
}

/// True when `op_id`'s result would join its sole consumer's chain: the
/// consumer is the better lowering root, so `op_id` is not a candidate
/// itself.
pub(crate) fn fused_into_consumer(graph: &Graph, op_id: NodeId) -> bool {
    let Some(op) = graph.try_operation(op_id) else {
        return false;
    };
    if !scalar_fusable(op.op) {
        return false;
    }
    let Some(tensor) = graph.outgoing(op_id).ok().and_then(|edges| {
        edges.first().and_then(|&eid| graph.edge(eid).ok().map(|e| e.dst))
    }) else {
        return false;
    };
    let Ok(consumers) = graph.consumers(tensor) else {
        return false;
    };
    let [consumer] = consumers[..] else {
        return false;
    };
    let fusable_consumer = graph
        .try_operation(consumer)
        .is_some_and(|c| scalar_fusable(c.op) && graph.parent(consumer).ok().flatten().is_none());
    fusable_consumer && matches!(fusable_operand(graph, tensor, consumer), Ok(true))
}
