//! MatMul lowering, batch-aware, in two modes.
//!
//! Non-coalesced: one iteration per output element (B x M x N); each
//! iteration gathers the K-length row/column pair and reduces it with an
//! unrolled multiply/add chain.
//!
//! Coalesced: one iteration per (output, reduction) pair (B x M x N x K);
//! each iteration performs a single multiply-accumulate against the partial
//! sum read back from the carry at the same output offset, so the final K
//! iteration leaves the complete dot product visible downstream.

use loft_ir::graph::{Graph, NodeId};
use loft_ir::indexing::broadcast_axis_map;
use loft_ir::node::OpKind;
use loft_ir::shape::from_dims;

use crate::body::BodyBuilder;
use crate::builders::{close_loop, open_loop, required_param, root_output, static_dims, Builder};
use crate::chain::Chain;
use crate::context::LoweringContext;
use crate::error::*;
use crate::pipeline::LowerOptions;

pub struct MatMulBuilder;

impl Builder for MatMulBuilder {
    fn name(&self) -> &'static str {
        "matmul"
    }

    fn can_handle(&self, graph: &Graph, chain: &Chain) -> bool {
        graph.try_operation(chain.root()).is_some_and(|op| op.op == OpKind::MatMul)
    }

    fn build(
        &self,
        graph: &mut Graph,
        chain: &Chain,
        _ctx: &mut LoweringContext,
        options: &LowerOptions,
    ) -> Result<NodeId> {
        let root = chain.root();
        let (out_tensor, out_dims, dtype) = root_output(graph, root)?;
        let name = graph.operation(root)?.name.clone();

        let a = required_param(graph, root, 0)?;
        let b = required_param(graph, root, 1)?;
        let a_dims = static_dims(graph, a)?;
        let b_dims = static_dims(graph, b)?;
        ensure_rank(&name, &a_dims, &b_dims)?;

        let k = a_dims[a_dims.len() - 1];
        let batch_rank = out_dims.len() - 2;
        let carry_len: usize = out_dims.iter().product();

        let (shell, outputs) = if options.coalesced_matmul {
            let mut iter_dims = out_dims.clone();
            iter_dims.push(k);
            let trip: usize = iter_dims.iter().product();

            let shell = open_loop(graph, trip, carry_len, dtype)?;
            let mut body = BodyBuilder::new(graph, shell.loop_op, dtype, carry_len)?;

            let idxs = body.axis_indices(&iter_dims)?;
            let (batch_idx, mnk) = idxs.split_at(batch_rank);
            let (i, j, kk) = (mnk[0], mnk[1], mnk[2]);

            let out_idx: Vec<NodeId> = batch_idx.iter().copied().chain([i, j]).collect();
            let out_offset = body.linear_offset(&out_idx, &out_dims)?;

            let av = gather_operand(&mut body, a, &a_dims, batch_idx, i, kk)?;
            let bv = gather_operand(&mut body, b, &b_dims, batch_idx, kk, j)?;

            let acc = body.gather_flat(body.carry_in(), out_offset, dtype)?;
            let term = body.scalar_op(OpKind::Mul, &[av, bv], dtype)?;
            let value = body.scalar_op(OpKind::Add, &[acc, term], dtype)?;

            let outputs = body.finish(value, out_offset)?;
            (shell, outputs)
        } else {
            let trip = carry_len;
            let shell = open_loop(graph, trip, carry_len, dtype)?;
            let mut body = BodyBuilder::new(graph, shell.loop_op, dtype, carry_len)?;

            let idxs = body.axis_indices(&out_dims)?;
            let (batch_idx, mn) = idxs.split_at(batch_rank);
            let (i, j) = (mn[0], mn[1]);
            let batch_idx = batch_idx.to_vec();

            // Unrolled dot product over the contraction axis.
            let mut acc = None;
            for step in 0..k {
                let kk = body.int_const(step as i64)?;
                let av = gather_operand(&mut body, a, &a_dims, &batch_idx, i, kk)?;
                let bv = gather_operand(&mut body, b, &b_dims, &batch_idx, kk, j)?;
                let term = body.scalar_op(OpKind::Mul, &[av, bv], dtype)?;
                acc = Some(match acc {
                    None => term,
                    Some(sum) => body.scalar_op(OpKind::Add, &[sum, term], dtype)?,
                });
            }
            let value = match acc {
                Some(v) => v,
                None => body.zero()?,
            };

            let offset = body.iter();
            let outputs = body.finish(value, offset)?;
            (shell, outputs)
        };

        let id = shell.loop_op;
        close_loop(graph, shell, &outputs, chain, out_tensor, &out_dims, dtype)?;
        Ok(id)
    }
}

fn ensure_rank(name: &str, a: &[usize], b: &[usize]) -> Result<()> {
    if a.len() < 2 || b.len() < 2 {
        return UnsupportedSnafu { name, reason: "matmul lowering needs rank >= 2 operands" }.fail();
    }
    if a[a.len() - 1] != b[b.len() - 2] {
        return UnsupportedSnafu {
            name,
            reason: format!("contraction extents differ: {} vs {}", a[a.len() - 1], b[b.len() - 2]),
        }
        .fail();
    }
    Ok(())
}

/// Gather `operand[batch..., row, col]`, mapping the output batch indices
/// onto the operand's (possibly broadcast) leading axes.
fn gather_operand(
    body: &mut BodyBuilder<'_>,
    operand: NodeId,
    operand_dims: &[usize],
    batch_idx: &[NodeId],
    row: NodeId,
    col: NodeId,
) -> Result<NodeId> {
    let own_batch = &operand_dims[..operand_dims.len() - 2];
    let map = broadcast_axis_map(batch_idx.len(), &from_dims(own_batch));

    let mut indices = vec![None; own_batch.len()];
    for (out_axis, mapped) in map.iter().enumerate() {
        if let Some(src_axis) = mapped {
            indices[*src_axis] = Some(batch_idx[out_axis]);
        }
    }
    let mut resolved = Vec::with_capacity(operand_dims.len());
    for slot in indices {
        let id = match slot {
            Some(id) => id,
            None => body.int_const(0)?,
        };
        resolved.push(id);
    }
    resolved.push(row);
    resolved.push(col);

    let dtype = body.dtype();
    body.gather_at(operand, &resolved, operand_dims, dtype)
}
