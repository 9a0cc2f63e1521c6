//! Elementwise chain lowering.
//!
//! One loop iteration per output element: decode the flat counter into
//! output indices, gather one scalar per external operand (broadcast-aware),
//! replay the chain's operators with scalar semantics, and scatter the root
//! contribution at the flat offset. Fused upstream operators contribute
//! through the context memo instead of a materialized tensor.

use loft_dtype::DataType;
use loft_ir::graph::{Graph, NodeId};
use loft_ir::node::OpKind;

use crate::body::BodyBuilder;
use crate::builders::{close_loop, open_loop, operand_shape, root_output, static_dims, Builder};
use crate::chain::{scalar_fusable, Chain};
use crate::context::LoweringContext;
use crate::error::*;
use crate::pipeline::LowerOptions;

pub struct DefaultBuilder;

impl Builder for DefaultBuilder {
    fn name(&self) -> &'static str {
        "default"
    }

    fn can_handle(&self, graph: &Graph, chain: &Chain) -> bool {
        chain
            .ops()
            .iter()
            .all(|&op| graph.try_operation(op).is_some_and(|o| scalar_fusable(o.op)))
    }

    fn build(
        &self,
        graph: &mut Graph,
        chain: &Chain,
        ctx: &mut LoweringContext,
        _options: &LowerOptions,
    ) -> Result<NodeId> {
        let (out_tensor, out_dims, dtype) = root_output(graph, chain.root())?;
        let total: usize = out_dims.iter().product();

        let shell = open_loop(graph, total, total, dtype)?;
        let mut body = BodyBuilder::new(graph, shell.loop_op, dtype, total)?;
        let out_indices = body.axis_indices(&out_dims)?;

        for &op_id in chain.ops() {
            let op = body.graph().operation(op_id)?.clone();
            let mut scalars: Vec<Option<NodeId>> = Vec::with_capacity(op.params.len());
            for slot in &op.params {
                let Some(tensor) = *slot else {
                    scalars.push(None);
                    continue;
                };
                scalars.push(Some(resolve_operand(&mut body, ctx, chain, tensor, &out_indices, dtype)?));
            }

            let result_dtype = scalar_result_dtype(op.op, dtype);
            let value = body.apply_sparse(op.op, op.attrs.clone(), &scalars, result_dtype)?;
            ctx.memoize(op_id, value);
        }

        let value = ctx
            .fused_value(chain.root())
            .ok_or_else(|| Error::Unsupported {
                name: format!("{:?}", chain.root()),
                reason: "chain root produced no scalar value".into(),
            })?;
        let offset = body.iter();
        let outputs = body.finish(value, offset)?;

        let loop_op = shell.loop_op;
        close_loop(graph, shell, &outputs, chain, out_tensor, &out_dims, dtype)?;
        Ok(loop_op)
    }
}

/// Fused upstream value when the operand's producer sits in the chain,
/// otherwise a fresh broadcast gather from the outer tensor.
fn resolve_operand(
    body: &mut BodyBuilder<'_>,
    ctx: &LoweringContext,
    chain: &Chain,
    tensor: NodeId,
    out_indices: &[NodeId],
    out_dtype: DataType,
) -> Result<NodeId> {
    if let Some(producer) = body.graph().producer(tensor)? {
        if chain.contains(producer) {
            if let Some(value) = ctx.fused_value(producer) {
                return Ok(value);
            }
        }
    }

    let shape = operand_shape(body.graph(), tensor)?;
    let dims = static_dims(body.graph(), tensor)?;
    let dtype = body.graph().tensor(tensor)?.dtype.unwrap_or(out_dtype);
    body.gather_broadcast(tensor, out_indices, &shape, &dims, dtype)
}

fn scalar_result_dtype(op: OpKind, out_dtype: DataType) -> DataType {
    if op.is_comparison() || matches!(op, OpKind::And | OpKind::Or | OpKind::Xor | OpKind::Not) {
        DataType::Bool
    } else {
        out_dtype
    }
}
