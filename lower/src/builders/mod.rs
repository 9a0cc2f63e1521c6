//! Builder strategies, one per operator class.
//!
//! Selection is first-match-wins over [`registry`]'s order; a builder whose
//! `can_handle` declines is skipped. Builders share the outer-wiring
//! protocol in this module: synthesize trip/condition/initial-carry
//! constants, create the Loop operator, splice it in place of the original
//! chain, and reshape the flat loop output back to the logical shape.

mod avgpool;
mod conv;
mod default;
mod generative;
mod lstm;
mod matmul;
mod reduces;

use loft_dtype::{DataType, TensorData};
use loft_ir::graph::{Graph, NodeId};
use loft_ir::node::{OpKind, OperationNode, TensorKind, TensorNode};
use loft_ir::shape::{self, from_dims, Shape};

use crate::body::BodyOutputs;
use crate::chain::Chain;
use crate::context::LoweringContext;
use crate::error::*;
use crate::pipeline::LowerOptions;

pub use avgpool::AveragePoolBuilder;
pub use conv::ConvBuilder;
pub use default::DefaultBuilder;
pub use generative::GenerativeBuilder;
pub use lstm::LstmBuilder;
pub use matmul::MatMulBuilder;
pub use reduces::ReducesBuilder;

/// One lowering strategy.
pub trait Builder {
    fn name(&self) -> &'static str;

    fn can_handle(&self, graph: &Graph, chain: &Chain) -> bool;

    /// Replace the chain with a Loop. Returns the Loop operator.
    fn build(
        &self,
        graph: &mut Graph,
        chain: &Chain,
        ctx: &mut LoweringContext,
        options: &LowerOptions,
    ) -> Result<NodeId>;
}

/// Builders in selection order.
pub fn registry() -> Vec<Box<dyn Builder>> {
    vec![
        Box::new(LstmBuilder),
        Box::new(ConvBuilder),
        Box::new(AveragePoolBuilder),
        Box::new(ReducesBuilder),
        Box::new(MatMulBuilder),
        Box::new(GenerativeBuilder),
        Box::new(DefaultBuilder),
    ]
}

// =========================================================================
// Shared outer-wiring protocol
// =========================================================================

/// The chain root's output tensor with its static extents and dtype.
pub(crate) fn root_output(graph: &Graph, root: NodeId) -> Result<(NodeId, Vec<usize>, DataType)> {
    let name = graph.operation(root)?.name.clone();
    let edges = graph.outgoing(root)?;
    let out = edges
        .first()
        .map(|&eid| graph.edge(eid).map(|e| e.dst))
        .transpose()?
        .ok_or_else(|| Error::MissingOperand { name: name.clone(), index: 0 })?;

    let tensor = graph.tensor(out)?;
    let dims = tensor
        .shape
        .as_ref()
        .and_then(shape::to_static)
        .ok_or_else(|| Error::DynamicShape { name: name.clone(), what: "output shape" })?;
    let dtype = tensor.dtype.ok_or(Error::DynamicShape { name, what: "output dtype" })?;
    Ok((out, dims.to_vec(), dtype))
}

/// The static extents of an operand tensor.
pub(crate) fn static_dims(graph: &Graph, tensor: NodeId) -> Result<Vec<usize>> {
    let t = graph.tensor(tensor)?;
    t.shape
        .as_ref()
        .and_then(shape::to_static)
        .map(|d| d.to_vec())
        .ok_or_else(|| Error::DynamicShape { name: t.name.clone(), what: "operand shape" })
}

pub(crate) fn operand_shape(graph: &Graph, tensor: NodeId) -> Result<Shape> {
    let t = graph.tensor(tensor)?;
    t.shape.clone().ok_or_else(|| Error::DynamicShape { name: t.name.clone(), what: "operand shape" })
}

/// Required positional operand of an operation.
pub(crate) fn required_param(graph: &Graph, op: NodeId, index: usize) -> Result<NodeId> {
    let operation = graph.operation(op)?;
    operation
        .param(index)
        .ok_or_else(|| Error::MissingOperand { name: operation.name.clone(), index })
}

/// The outer-graph constants plus the not-yet-wired Loop operator.
pub(crate) struct LoopShell {
    pub loop_op: NodeId,
    trip: NodeId,
    cond: NodeId,
    init: NodeId,
}

/// Synthesize trip count, always-true condition, and the zero-filled initial
/// carry, then the Loop operator itself. Wiring happens in [`close_loop`]
/// once the body reports what it captured.
pub(crate) fn open_loop(
    graph: &mut Graph,
    trip_count: usize,
    carry_len: usize,
    dtype: DataType,
) -> Result<LoopShell> {
    let trip = graph.add_tensor(
        TensorNode::new(graph.fresh_name("trip"), TensorKind::Constant)
            .with_shape(Shape::new())
            .with_data(TensorData::scalar_i64(trip_count as i64)),
    )?;
    let cond = graph.add_tensor(
        TensorNode::new(graph.fresh_name("keep_going"), TensorKind::Constant)
            .with_shape(Shape::new())
            .with_data(TensorData::scalar_bool(true)),
    )?;
    let init = graph.add_tensor(
        TensorNode::new(graph.fresh_name("acc_init"), TensorKind::Constant)
            .with_shape(from_dims(&[carry_len]))
            .with_data(TensorData::zeros(dtype, carry_len)),
    )?;

    let loop_op = graph.add_operation(
        OperationNode::new(graph.fresh_name("flat_loop"), OpKind::Loop)
            .with_params(vec![Some(trip), Some(cond), Some(init)]),
    )?;
    Ok(LoopShell { loop_op, trip, cond, init })
}

/// Wire the Loop's inputs and output, remove the original chain, and
/// reshape the flat result back to the logical shape when rank != 1.
pub(crate) fn close_loop(
    graph: &mut Graph,
    shell: LoopShell,
    body: &BodyOutputs,
    chain: &Chain,
    out_tensor: NodeId,
    out_dims: &[usize],
    dtype: DataType,
) -> Result<()> {
    let LoopShell { loop_op, trip, cond, init } = shell;

    {
        let op = graph.operation_mut(loop_op)?;
        op.params.extend(body.captured.iter().map(|&id| Some(id)));
    }
    for input in [trip, cond, init].into_iter().chain(body.captured.iter().copied()) {
        graph.add_edge(input, loop_op)?;
    }

    remove_chain(graph, chain, &[out_tensor])?;

    if out_dims.len() == 1 {
        graph.add_edge(loop_op, out_tensor)?;
        return Ok(());
    }

    // Flat [total] -> logical shape.
    let total: usize = out_dims.iter().product();
    let flat = graph.add_tensor(
        TensorNode::new(graph.fresh_name("flat_out"), TensorKind::Intermediate)
            .with_dtype(dtype)
            .with_shape(from_dims(&[total])),
    )?;
    graph.add_edge(loop_op, flat)?;

    let target = graph.add_tensor(
        TensorNode::new(graph.fresh_name("out_shape"), TensorKind::Constant)
            .with_shape(from_dims(&[out_dims.len()]))
            .with_data(TensorData::I64(out_dims.iter().map(|&d| d as i64).collect())),
    )?;
    let reshape = graph.add_operation(
        OperationNode::new(graph.fresh_name("unflatten"), OpKind::Reshape)
            .with_params(vec![Some(flat), Some(target)]),
    )?;
    graph.add_edge(flat, reshape)?;
    graph.add_edge(target, reshape)?;
    graph.add_edge(reshape, out_tensor)?;
    Ok(())
}

/// Remove the chain's operators, their now-orphaned intermediate outputs,
/// and any constant operands nothing references anymore. Orphan cleanup is
/// opportunistic: a constant that still has a reader stays.
pub(crate) fn remove_chain(graph: &mut Graph, chain: &Chain, keep: &[NodeId]) -> Result<()> {
    let mut candidates = Vec::new();
    for &op in chain.ops() {
        for eid in graph.incoming(op)? {
            candidates.push(graph.edge(eid)?.src);
        }
        for eid in graph.outgoing(op)? {
            let dst = graph.edge(eid)?.dst;
            if !keep.contains(&dst) {
                candidates.push(dst);
            }
        }
        graph.remove_node(op)?;
    }

    for tensor in candidates {
        let Some(node) = graph.try_tensor(tensor) else {
            continue;
        };
        let orphanable = matches!(
            node.kind,
            TensorKind::Intermediate | TensorKind::Constant | TensorKind::Initializer
        );
        let detached =
            graph.incoming(tensor)?.is_empty() && graph.outgoing(tensor)?.is_empty();
        if orphanable && detached && !keep.contains(&tensor) {
            graph.remove_node(tensor)?;
        }
    }
    Ok(())
}
