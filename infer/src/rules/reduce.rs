//! Axis reductions and argmin/argmax.

use loft_dtype::DataType;
use loft_ir::graph::Graph;
use loft_ir::node::OperationNode;
use loft_ir::shape::Shape;
use loft_ir::Dim;

use crate::engine::{InputInfo, Outputs};
use crate::error::*;
use crate::rules::{first_dtype, ints_attr_or_operand, norm_axis, single};

/// ReduceSum/Mean/Max/Min/Prod. Axes come from the attribute or the second
/// operand; no axes means reduce everything. `keepdims` (default 1) keeps
/// reduced axes as size 1 instead of dropping them.
pub(crate) fn reduce(graph: &Graph, op: &OperationNode, inputs: &[InputInfo]) -> Result<Outputs> {
    let dtype = first_dtype(inputs);
    let Some(input) = inputs.first().and_then(|i| i.shape.clone()) else {
        return Ok(single(None, dtype));
    };

    let keepdims = op.attr_i64("keepdims").unwrap_or(1) != 0;
    let mut reduced = vec![false; input.len()];
    match ints_attr_or_operand(graph, op, inputs, "axes", 1) {
        Some(axes) if !axes.is_empty() => {
            for &axis in &axes {
                reduced[norm_axis(op, axis, input.len())?] = true;
            }
        }
        _ => reduced.fill(true),
    }

    let mut out = Shape::new();
    for (axis, dim) in input.iter().enumerate() {
        if !reduced[axis] {
            out.push(dim.clone());
        } else if keepdims {
            out.push(Dim::Known(1));
        }
    }
    Ok(single(Some(out), dtype))
}

/// ArgMax/ArgMin: reduces one axis, always producing Int64 indices.
pub(crate) fn arg_reduce(op: &OperationNode, inputs: &[InputInfo]) -> Result<Outputs> {
    let Some(input) = inputs.first().and_then(|i| i.shape.clone()) else {
        return Ok(single(None, Some(DataType::Int64)));
    };

    let axis = norm_axis(op, op.attr_i64("axis").unwrap_or(0), input.len())?;
    let keepdims = op.attr_i64("keepdims").unwrap_or(1) != 0;

    let mut out = Shape::new();
    for (i, dim) in input.iter().enumerate() {
        if i != axis {
            out.push(dim.clone());
        } else if keepdims {
            out.push(Dim::Known(1));
        }
    }
    Ok(single(Some(out), Some(DataType::Int64)))
}
