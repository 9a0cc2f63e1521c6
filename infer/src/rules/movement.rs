//! Movement/geometry operators: Transpose, Reshape, Squeeze, Unsqueeze,
//! Flatten, Expand, Concat, Slice, Pad, Gather.

use loft_ir::graph::Graph;
use loft_ir::node::OperationNode;
use loft_ir::shape::{self, Shape};
use loft_ir::Dim;

use crate::broadcast::broadcast_pair;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::engine::{InputInfo, Outputs};
use crate::error::*;
use crate::rules::{first_dtype, ints_attr_or_operand, ints_operand, norm_axis, single};

/// Permutation from the `perm` attribute; default is reversed axis order.
pub(crate) fn transpose(op: &OperationNode, inputs: &[InputInfo]) -> Result<Outputs> {
    let dtype = first_dtype(inputs);
    let Some(input) = inputs.first().and_then(|i| i.shape.clone()) else {
        return Ok(single(None, dtype));
    };

    let perm: Vec<usize> = match op.attr_ints("perm") {
        Some(perm) => {
            let mut out = Vec::with_capacity(perm.len());
            for &axis in perm {
                out.push(norm_axis(op, axis, input.len())?);
            }
            out
        }
        None => (0..input.len()).rev().collect(),
    };

    if perm.len() != input.len() {
        return InvalidAttributeSnafu {
            op: op.name.clone(),
            attr: "perm",
            reason: format!("permutation of length {} applied to rank {}", perm.len(), input.len()),
        }
        .fail();
    }

    Ok(single(Some(perm.iter().map(|&i| input[i].clone()).collect()), dtype))
}

/// ONNX Reshape: 0 copies the input dimension, a single -1 is inferred
/// from total-size conservation; anything else must multiply out exactly.
pub(crate) fn reshape(
    graph: &Graph,
    op: &OperationNode,
    inputs: &[InputInfo],
    diags: &mut Diagnostics,
) -> Result<Outputs> {
    let dtype = first_dtype(inputs);
    let target = ints_attr_or_operand(graph, op, inputs, "shape", 1)
        .ok_or_else(|| Error::MissingOperand { op: op.name.clone(), index: 1 })?;
    let input = inputs.first().and_then(|i| i.shape.clone());

    let inferred_count = target.iter().filter(|&&d| d == -1).count();
    if inferred_count > 1 {
        return ReshapeMultipleInferredSnafu { target }.fail();
    }
    if target.iter().any(|&d| d < -1) {
        return ReshapeInvalidDimensionSnafu { target }.fail();
    }

    let mut out = Shape::with_capacity(target.len());
    let mut known_product = 1usize;
    let mut inferred_slot = None;

    for (axis, &d) in target.iter().enumerate() {
        match d {
            -1 => {
                inferred_slot = Some(axis);
                out.push(Dim::Known(0)); // patched below
            }
            0 => {
                let copied = input.as_ref().and_then(|s| s.get(axis).cloned()).unwrap_or_else(|| {
                    diags.record(
                        DiagnosticKind::MissingShape,
                        &op.name,
                        format!("target dim {axis} copies an unknown input dim"),
                    );
                    Dim::Symbolic(String::new())
                });
                if let Dim::Known(n) = &copied {
                    known_product *= n;
                }
                out.push(copied);
            }
            d => {
                known_product *= d as usize;
                out.push(Dim::Known(d as usize));
            }
        }
    }

    let input_numel = input.as_ref().and_then(shape::numel);

    if let Some(slot) = inferred_slot {
        match input_numel {
            Some(total) if known_product > 0 && total % known_product == 0 => {
                out[slot] = Dim::Known(total / known_product);
            }
            Some(total) => {
                return ReshapeSizeMismatchSnafu { input_size: total, target, target_size: known_product }.fail();
            }
            None => out[slot] = Dim::Symbolic(String::new()),
        }
    } else if let Some(total) = input_numel {
        // Fully explicit target must conserve the element count, when the
        // whole output is known.
        if shape::is_static(&out) {
            let target_size = shape::numel(&out).unwrap_or(0);
            if target_size != total {
                return ReshapeSizeMismatchSnafu { input_size: total, target, target_size }.fail();
            }
        }
    }

    Ok(single(Some(out), dtype))
}

/// Drop size-1 axes: the listed ones, or every statically known 1.
pub(crate) fn squeeze(graph: &Graph, op: &OperationNode, inputs: &[InputInfo]) -> Result<Outputs> {
    let dtype = first_dtype(inputs);
    let Some(input) = inputs.first().and_then(|i| i.shape.clone()) else {
        return Ok(single(None, dtype));
    };

    let out = match ints_attr_or_operand(graph, op, inputs, "axes", 1) {
        Some(axes) => {
            let mut drop = vec![false; input.len()];
            for &axis in &axes {
                drop[norm_axis(op, axis, input.len())?] = true;
            }
            input.iter().enumerate().filter(|(i, _)| !drop[*i]).map(|(_, d)| d.clone()).collect()
        }
        None => input.iter().filter(|d| d.as_known() != Some(1)).cloned().collect(),
    };
    Ok(single(Some(out), dtype))
}

/// Insert size-1 axes at the listed positions (normalized against the
/// output rank).
pub(crate) fn unsqueeze(graph: &Graph, op: &OperationNode, inputs: &[InputInfo]) -> Result<Outputs> {
    let dtype = first_dtype(inputs);
    let Some(input) = inputs.first().and_then(|i| i.shape.clone()) else {
        return Ok(single(None, dtype));
    };

    let axes = ints_attr_or_operand(graph, op, inputs, "axes", 1)
        .ok_or_else(|| Error::MissingOperand { op: op.name.clone(), index: 1 })?;
    let out_rank = input.len() + axes.len();

    let mut normalized = Vec::with_capacity(axes.len());
    for &axis in &axes {
        normalized.push(norm_axis(op, axis, out_rank)?);
    }
    normalized.sort_unstable();

    let mut out = input;
    for &axis in &normalized {
        out.insert(axis.min(out.len()), Dim::Known(1));
    }
    Ok(single(Some(out), dtype))
}

/// Collapse to 2-D around `axis` (default 1).
pub(crate) fn flatten(op: &OperationNode, inputs: &[InputInfo]) -> Result<Outputs> {
    let dtype = first_dtype(inputs);
    let Some(input) = inputs.first().and_then(|i| i.shape.clone()) else {
        return Ok(single(None, dtype));
    };

    let axis = norm_axis(op, op.attr_i64("axis").unwrap_or(1), input.len() + 1)?;
    let head: Shape = input[..axis.min(input.len())].iter().cloned().collect();
    let tail: Shape = input[axis.min(input.len())..].iter().cloned().collect();

    let collapse = |part: &Shape| match shape::numel(part) {
        Some(n) => Dim::Known(n),
        None => Dim::Symbolic(String::new()),
    };
    let mut out = Shape::new();
    out.push(collapse(&head));
    out.push(collapse(&tail));
    Ok(single(Some(out), dtype))
}

/// Broadcast the input against the target extents from the shape operand.
pub(crate) fn expand(
    graph: &Graph,
    op: &OperationNode,
    inputs: &[InputInfo],
    diags: &mut Diagnostics,
) -> Result<Outputs> {
    let dtype = first_dtype(inputs);
    let Some(input) = inputs.first().and_then(|i| i.shape.clone()) else {
        return Ok(single(None, dtype));
    };
    let Some(target) = ints_operand(graph, inputs, 1) else {
        diags.record(DiagnosticKind::MissingShape, &op.name, "expand target is not a constant");
        return Ok(single(None, dtype));
    };

    let target: Shape = target
        .iter()
        .map(|&d| if d < 0 { Dim::Symbolic(String::new()) } else { Dim::Known(d as usize) })
        .collect();
    Ok(single(Some(broadcast_pair(&input, &target, &op.name, diags)), dtype))
}

/// Sum extents along `axis`; the other axes come from the first shaped
/// input.
pub(crate) fn concat(op: &OperationNode, inputs: &[InputInfo], diags: &mut Diagnostics) -> Result<Outputs> {
    let dtype = first_dtype(inputs);
    let shapes: Vec<Shape> = inputs.iter().filter_map(|i| i.shape.clone()).collect();
    let Some(first) = shapes.first() else {
        diags.record(DiagnosticKind::MissingShape, &op.name, "no concat input has a shape");
        return Ok(single(None, dtype));
    };

    let axis = norm_axis(op, op.attr_i64("axis").unwrap_or(0), first.len())?;
    if shapes.len() < inputs.len() || shapes.iter().any(|s| s.len() != first.len()) {
        diags.record(DiagnosticKind::RankFallback, &op.name, "concat inputs disagree in rank; using the first");
    }

    let mut concat_dim = Some(0usize);
    for s in &shapes {
        match s.get(axis).and_then(Dim::as_known) {
            Some(n) => concat_dim = concat_dim.map(|acc| acc + n),
            None => concat_dim = None,
        }
    }

    let mut out = first.clone();
    out[axis] = match concat_dim {
        Some(n) => Dim::Known(n),
        None => Dim::Symbolic(String::new()),
    };
    Ok(single(Some(out), dtype))
}

/// ONNX Slice with starts/ends/axes/steps from operands (or the opset-1
/// attribute form), with ONNX clamping semantics.
pub(crate) fn slice(graph: &Graph, op: &OperationNode, inputs: &[InputInfo]) -> Result<Outputs> {
    let dtype = first_dtype(inputs);
    let Some(input) = inputs.first().and_then(|i| i.shape.clone()) else {
        return Ok(single(None, dtype));
    };

    let starts = ints_attr_or_operand(graph, op, inputs, "starts", 1)
        .ok_or_else(|| Error::MissingOperand { op: op.name.clone(), index: 1 })?;
    let ends = ints_attr_or_operand(graph, op, inputs, "ends", 2)
        .ok_or_else(|| Error::MissingOperand { op: op.name.clone(), index: 2 })?;
    let axes = ints_attr_or_operand(graph, op, inputs, "axes", 3)
        .unwrap_or_else(|| (0..starts.len() as i64).collect());
    let steps = ints_attr_or_operand(graph, op, inputs, "steps", 4).unwrap_or_else(|| vec![1; starts.len()]);

    let mut out = input.clone();
    for (&start, &end, &axis, &step) in itertools::izip!(&starts, &ends, &axes, &steps) {
        let axis = norm_axis(op, axis, input.len())?;
        if step == 0 {
            return InvalidAttributeSnafu { op: op.name.clone(), attr: "steps", reason: "step must be non-zero" }
                .fail();
        }

        let Some(dim) = input[axis].as_known() else {
            out[axis] = Dim::Symbolic(String::new());
            continue;
        };
        let dim = dim as i64;

        // ONNX clamping: negative indices wrap once, then clamp into the
        // valid range for the step direction.
        let wrap = |v: i64| if v < 0 { v + dim } else { v };
        let (lo, hi) = if step > 0 { (0, dim) } else { (-1, dim - 1) };
        let start = wrap(start).clamp(lo, hi);
        let end = wrap(end).clamp(lo, hi);

        let span = if step > 0 { end - start } else { start - end };
        let len = if span <= 0 { 0 } else { (span + step.abs() - 1) / step.abs() };
        out[axis] = Dim::Known(len as usize);
    }
    Ok(single(Some(out), dtype))
}

/// Add begin/end pads per axis (`pads` operand or attribute, length
/// 2 * rank).
pub(crate) fn pad(graph: &Graph, op: &OperationNode, inputs: &[InputInfo]) -> Result<Outputs> {
    let dtype = first_dtype(inputs);
    let Some(input) = inputs.first().and_then(|i| i.shape.clone()) else {
        return Ok(single(None, dtype));
    };

    let pads = ints_attr_or_operand(graph, op, inputs, "pads", 1)
        .ok_or_else(|| Error::MissingOperand { op: op.name.clone(), index: 1 })?;
    if pads.len() != 2 * input.len() {
        return InvalidAttributeSnafu {
            op: op.name.clone(),
            attr: "pads",
            reason: format!("expected {} pad values, got {}", 2 * input.len(), pads.len()),
        }
        .fail();
    }

    let rank = input.len();
    let out = input
        .iter()
        .enumerate()
        .map(|(i, d)| match d.as_known() {
            Some(n) => Dim::Known((n as i64 + pads[i] + pads[i + rank]).max(0) as usize),
            None => d.clone(),
        })
        .collect();
    Ok(single(Some(out), dtype))
}

/// `out = data[..axis] ++ indices.shape ++ data[axis+1..]`.
pub(crate) fn gather(op: &OperationNode, inputs: &[InputInfo]) -> Result<Outputs> {
    let dtype = first_dtype(inputs);
    let (Some(data), Some(indices)) = (
        inputs.first().and_then(|i| i.shape.clone()),
        inputs.get(1).and_then(|i| i.shape.clone()),
    ) else {
        return Ok(single(None, dtype));
    };

    let axis = norm_axis(op, op.attr_i64("axis").unwrap_or(0), data.len())?;
    let mut out = Shape::new();
    out.extend(data[..axis].iter().cloned());
    out.extend(indices.iter().cloned());
    out.extend(data[axis + 1..].iter().cloned());
    Ok(single(Some(out), dtype))
}
