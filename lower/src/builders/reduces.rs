//! Axis-reduction lowering (ReduceSum/Mean/Max/Min/Prod).
//!
//! Output-indexed iteration: each loop iteration owns one output element and
//! accumulates the reduced axes with an unrolled gather/combine chain. Mean
//! divides the sum by the reduced element count.

use loft_dtype::ScalarValue;
use loft_ir::graph::{Graph, NodeId};
use loft_ir::node::OpKind;

use crate::body::BodyBuilder;
use crate::builders::{close_loop, open_loop, required_param, root_output, static_dims, Builder};
use crate::chain::Chain;
use crate::context::LoweringContext;
use crate::error::*;
use crate::pipeline::LowerOptions;

pub struct ReducesBuilder;

impl Builder for ReducesBuilder {
    fn name(&self) -> &'static str {
        "reduces"
    }

    fn can_handle(&self, graph: &Graph, chain: &Chain) -> bool {
        graph.try_operation(chain.root()).is_some_and(|op| op.op.is_reduce())
    }

    fn build(
        &self,
        graph: &mut Graph,
        chain: &Chain,
        _ctx: &mut LoweringContext,
        _options: &LowerOptions,
    ) -> Result<NodeId> {
        let root = chain.root();
        let (out_tensor, out_dims, dtype) = root_output(graph, root)?;
        let total: usize = out_dims.iter().product();

        let op = graph.operation(root)?.clone();
        let x = required_param(graph, root, 0)?;
        let x_dims = static_dims(graph, x)?;

        let reduced = reduced_axes(graph, root, x_dims.len())?;
        let keepdims = op.attr_i64("keepdims").unwrap_or(1) != 0;
        let count: usize = reduced.iter().map(|&a| x_dims[a]).product();

        let shell = open_loop(graph, total, total, dtype)?;
        let mut body = BodyBuilder::new(graph, shell.loop_op, dtype, total)?;
        let out_idxs = body.axis_indices(&out_dims)?;

        let combine = match op.op {
            OpKind::ReduceSum | OpKind::ReduceMean => OpKind::Add,
            OpKind::ReduceMax => OpKind::Max,
            OpKind::ReduceMin => OpKind::Min,
            OpKind::ReduceProd => OpKind::Mul,
            other => {
                return UnsupportedSnafu { name: op.name, reason: format!("{other} is not a reduction") }
                    .fail()
            }
        };

        // Output axis index feeding each input axis: reduced axes take the
        // unrolled combination values, the rest follow the output indices.
        let kept_for_axis: Vec<Option<NodeId>> = {
            let mut out_cursor = 0usize;
            (0..x_dims.len())
                .map(|axis| {
                    if reduced.contains(&axis) {
                        if keepdims {
                            out_cursor += 1;
                        }
                        None
                    } else {
                        let idx = out_idxs[out_cursor];
                        out_cursor += 1;
                        Some(idx)
                    }
                })
                .collect()
        };

        let mut acc = None;
        for combo in combinations(&reduced, &x_dims) {
            let mut indices = Vec::with_capacity(x_dims.len());
            let mut combo_cursor = 0usize;
            for kept in &kept_for_axis {
                match kept {
                    Some(idx) => indices.push(*idx),
                    None => {
                        let value = body.int_const(combo[combo_cursor] as i64)?;
                        combo_cursor += 1;
                        indices.push(value);
                    }
                }
            }

            let element = body.gather_at(x, &indices, &x_dims, dtype)?;
            acc = Some(match acc {
                None => element,
                Some(prev) => body.scalar_op(combine, &[prev, element], dtype)?,
            });
        }

        let mut value = match acc {
            Some(v) => v,
            None => body.zero()?,
        };
        if op.op == OpKind::ReduceMean && count > 0 {
            let divisor = body.constant(ScalarValue::Float(count as f64))?;
            value = body.scalar_op(OpKind::Div, &[value, divisor], dtype)?;
        }

        let offset = body.iter();
        let outputs = body.finish(value, offset)?;

        let id = shell.loop_op;
        close_loop(graph, shell, &outputs, chain, out_tensor, &out_dims, dtype)?;
        Ok(id)
    }
}

/// Normalized reduced axes: the `axes` attribute or constant operand, or
/// every axis when absent.
fn reduced_axes(graph: &Graph, root: NodeId, rank: usize) -> Result<Vec<usize>> {
    let op = graph.operation(root)?;
    let raw = op
        .attr_ints("axes")
        .map(<[i64]>::to_vec)
        .or_else(|| {
            op.param(1)
                .and_then(|t| graph.try_tensor(t))
                .and_then(|t| t.data.as_ref())
                .and_then(|d| d.as_i64s())
        });
    let Some(raw) = raw else {
        return Ok((0..rank).collect());
    };
    if raw.is_empty() {
        return Ok((0..rank).collect());
    }

    let mut axes = Vec::with_capacity(raw.len());
    for axis in raw {
        let adjusted = if axis < 0 { axis + rank as i64 } else { axis };
        if adjusted < 0 || adjusted >= rank as i64 {
            return UnsupportedSnafu {
                name: op.name.clone(),
                reason: format!("axis {axis} out of range for rank {rank}"),
            }
            .fail();
        }
        axes.push(adjusted as usize);
    }
    axes.sort_unstable();
    axes.dedup();
    Ok(axes)
}

/// Every assignment of the reduced axes, lexicographic.
fn combinations(reduced: &[usize], dims: &[usize]) -> Vec<Vec<usize>> {
    let mut combos = vec![Vec::new()];
    for &axis in reduced {
        let extent = dims[axis];
        combos = combos
            .into_iter()
            .flat_map(|combo| {
                (0..extent).map(move |v| {
                    let mut next = combo.clone();
                    next.push(v);
                    next
                })
            })
            .collect();
    }
    combos
}
