//! Generators, metadata operators, control flow, and LSTM.

use loft_dtype::DataType;
use loft_ir::graph::{Graph, NodeId};
use loft_ir::node::{OperationNode, TensorKind, TensorNode};
use loft_ir::shape::Shape;
use loft_ir::Dim;
use smallvec::smallvec;

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::engine::{InputInfo, Outputs};
use crate::error::*;
use crate::rules::{first_dtype, ints_operand, norm_axis, single};

/// Shape: a 1-D Int64 tensor holding the input's rank extents.
pub(crate) fn shape_op(inputs: &[InputInfo]) -> Result<Outputs> {
    let out = inputs
        .first()
        .and_then(|i| i.shape.as_ref())
        .map(|s| {
            let mut shape = Shape::new();
            shape.push(Dim::Known(s.len()));
            shape
        });
    Ok(single(out, Some(DataType::Int64)))
}

/// ConstantOfShape: extents from the constant shape operand, dtype from the
/// `value` attribute (Float when absent).
pub(crate) fn constant_of_shape(graph: &Graph, op: &OperationNode, inputs: &[InputInfo]) -> Result<Outputs> {
    let dtype = op.attr_tensor("value").map(|t| t.dtype()).unwrap_or(DataType::Float);
    let Some(extents) = ints_operand(graph, inputs, 0) else {
        return Ok(single(None, Some(dtype)));
    };
    if extents.iter().any(|&d| d < 0) {
        return InvalidAttributeSnafu {
            op: op.name.clone(),
            attr: "input",
            reason: format!("shape operand {extents:?} contains a negative extent"),
        }
        .fail();
    }
    let out: Shape = extents.iter().map(|&d| Dim::Known(d as usize)).collect();
    Ok(single(Some(out), Some(dtype)))
}

/// OneHot: insert the depth extent into the indices shape at `axis`
/// (default -1, i.e. appended). Dtype follows the values operand.
pub(crate) fn one_hot(graph: &Graph, op: &OperationNode, inputs: &[InputInfo]) -> Result<Outputs> {
    let dtype = inputs.get(2).and_then(|i| i.dtype);
    let Some(indices) = inputs.first().and_then(|i| i.shape.clone()) else {
        return Ok(single(None, dtype));
    };

    let depth = match ints_operand(graph, inputs, 1).and_then(|v| v.first().copied()) {
        Some(d) if d >= 0 => Dim::Known(d as usize),
        Some(_) | None => Dim::Symbolic(String::new()),
    };

    let out_rank = indices.len() + 1;
    let axis = norm_axis(op, op.attr_i64("axis").unwrap_or(-1), out_rank)?;
    let mut out = indices;
    out.insert(axis, depth);
    Ok(single(Some(out), dtype))
}

/// Range: `ceil((limit - start) / delta)` elements when all three scalars
/// are constant.
pub(crate) fn range(graph: &Graph, op: &OperationNode, inputs: &[InputInfo]) -> Result<Outputs> {
    let dtype = first_dtype(inputs);
    let scalar = |index: usize| {
        inputs.get(index).and_then(|i| i.data(graph)).and_then(|d| d.as_scalar()).and_then(|s| s.as_f64())
    };
    let (Some(start), Some(limit), Some(delta)) = (scalar(0), scalar(1), scalar(2)) else {
        let mut out = Shape::new();
        out.push(Dim::Symbolic(String::new()));
        return Ok(single(Some(out), dtype));
    };
    if delta == 0.0 {
        return InvalidAttributeSnafu { op: op.name.clone(), attr: "delta", reason: "delta must be non-zero" }
            .fail();
    }

    let len = ((limit - start) / delta).ceil().max(0.0) as usize;
    let mut out = Shape::new();
    out.push(Dim::Known(len));
    Ok(single(Some(out), dtype))
}

/// Constant: shape and dtype from the embedded `value` payload. A length-1
/// payload is a scalar.
pub(crate) fn constant(_graph: &Graph, op: &OperationNode, _inputs: &[InputInfo]) -> Result<Outputs> {
    let value = op.attr_tensor("value").ok_or_else(|| Error::InvalidAttribute {
        op: op.name.clone(),
        attr: "value".into(),
        reason: "Constant requires a tensor `value` attribute".into(),
    })?;

    let mut shape = Shape::new();
    if value.len() != 1 {
        shape.push(Dim::Known(value.len()));
    }
    Ok(single(Some(shape), Some(value.dtype())))
}

/// Loop: output `i` adopts the shape and dtype of carried input `i + 2`
/// (after trip count and condition). Scan outputs are out of scope.
///
/// The body's carried outputs must agree with the incoming state; a
/// disagreement is recorded and the incoming values kept.
pub(crate) fn loop_op(
    graph: &Graph,
    op_id: NodeId,
    op: &OperationNode,
    inputs: &[InputInfo],
    diags: &mut Diagnostics,
) -> Result<Outputs> {
    // Body carry outputs in creation order; the rank-0 condition
    // passthrough is not a carry.
    let carried: Vec<&TensorNode> = graph
        .children(op_id)
        .into_iter()
        .filter_map(|id| graph.try_tensor(id))
        .filter(|t| t.kind == TensorKind::Output && t.shape.as_ref().is_some_and(|s| !s.is_empty()))
        .collect();

    let mut outputs: Outputs = smallvec![];
    for (index, carry) in inputs.iter().skip(2).enumerate() {
        if let Some(out) = carried.get(index) {
            let shape_differs = matches!((&carry.shape, &out.shape), (Some(a), Some(b)) if a != b);
            let dtype_differs = matches!((carry.dtype, out.dtype), (Some(a), Some(b)) if a != b);
            if shape_differs || dtype_differs {
                diags.record(
                    DiagnosticKind::CarryMismatch,
                    &op.name,
                    format!(
                        "carried output {:?} ({:?}, {:?}) does not match incoming state ({:?}, {:?})",
                        out.name, out.shape, out.dtype, carry.shape, carry.dtype
                    ),
                );
            }
        }
        outputs.push((carry.shape.clone(), carry.dtype));
    }
    if outputs.is_empty() {
        outputs.push((None, None));
    }
    Ok(outputs)
}

/// If: branch outputs are opaque here, so the output keeps whatever its
/// tensor already carries.
pub(crate) fn if_op(_op: &OperationNode, _inputs: &[InputInfo]) -> Result<Outputs> {
    Ok(single(None, None))
}

/// LSTM with `X: [seq, batch, input]` produces
/// `Y: [seq, dirs, batch, hidden]` and `Y_h`/`Y_c: [dirs, batch, hidden]`.
pub(crate) fn lstm(op: &OperationNode, inputs: &[InputInfo]) -> Result<Outputs> {
    let dtype = first_dtype(inputs);
    let hidden = op.attr_i64("hidden_size").ok_or_else(|| Error::InvalidAttribute {
        op: op.name.clone(),
        attr: "hidden_size".into(),
        reason: "LSTM requires the hidden_size attribute".into(),
    })?;
    if hidden <= 0 {
        return InvalidAttributeSnafu {
            op: op.name.clone(),
            attr: "hidden_size",
            reason: format!("hidden_size must be positive, got {hidden}"),
        }
        .fail();
    }
    let dirs = match op.attr_str("direction") {
        Some("bidirectional") => 2,
        _ => 1,
    };

    let Some(x) = inputs.first().and_then(|i| i.shape.clone()) else {
        return Ok(smallvec![(None, dtype), (None, dtype), (None, dtype)]);
    };
    if x.len() != 3 {
        return InvalidAttributeSnafu {
            op: op.name.clone(),
            attr: "X",
            reason: format!("LSTM input must be rank 3, got {}", x.len()),
        }
        .fail();
    }

    let (seq, batch) = (x[0].clone(), x[1].clone());
    let hidden = Dim::Known(hidden as usize);

    let mut y = Shape::new();
    y.extend([seq, Dim::Known(dirs), batch.clone(), hidden.clone()]);
    let mut state = Shape::new();
    state.extend([Dim::Known(dirs), batch, hidden]);

    Ok(smallvec![(Some(y), dtype), (Some(state.clone()), dtype), (Some(state), dtype)])
}
