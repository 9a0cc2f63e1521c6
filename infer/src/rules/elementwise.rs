//! Elementwise operators: broadcast n-ary arithmetic/comparison/logic and
//! shape-preserving unary ops.

use loft_dtype::DataType;
use loft_ir::node::{OpKind, OperationNode};
use loft_ir::shape::Shape;

use crate::broadcast::broadcast_many;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::engine::{InputInfo, Outputs};
use crate::error::*;
use crate::rules::single;

/// Broadcast all input shapes; the result dtype follows the operator class.
pub(crate) fn nary(op: &OperationNode, inputs: &[InputInfo], diags: &mut Diagnostics) -> Result<Outputs> {
    let known: Vec<Shape> = inputs.iter().filter_map(|i| i.shape.clone()).collect();
    if known.len() < inputs.iter().filter(|i| i.id.is_some()).count() {
        diags.record(DiagnosticKind::MissingShape, &op.name, "not every input has a resolvable shape");
    }
    let shape = (!known.is_empty()).then(|| broadcast_many(&known, &op.name, diags));

    let dtype = if op.op.is_comparison() || matches!(op.op, OpKind::And | OpKind::Or | OpKind::Xor) {
        Some(DataType::Bool)
    } else if op.op == OpKind::Where {
        // Value branches sit at operands 1 and 2.
        inputs.get(1).and_then(|i| i.dtype).or_else(|| inputs.get(2).and_then(|i| i.dtype))
    } else {
        promoted_dtype(op, inputs, diags)?
    };

    Ok(single(shape, dtype))
}

/// Shape passes through; dtype follows the operator (Cast reads its `to`
/// attribute, logical Not produces Bool).
pub(crate) fn unary(op: &OperationNode, inputs: &[InputInfo], diags: &mut Diagnostics) -> Result<Outputs> {
    let shape = inputs.first().and_then(|i| i.shape.clone());
    if shape.is_none() {
        diags.record(DiagnosticKind::MissingShape, &op.name, "input has no resolvable shape");
    }

    let dtype = match op.op {
        OpKind::Not => Some(DataType::Bool),
        OpKind::Cast => {
            let code = op.attr_i64("to").ok_or_else(|| Error::InvalidAttribute {
                op: op.name.clone(),
                attr: "to".into(),
                reason: "Cast requires an integer `to` attribute".into(),
            })?;
            Some(DataType::from_onnx(code as i32).map_err(|_| Error::InvalidAttribute {
                op: op.name.clone(),
                attr: "to".into(),
                reason: format!("unknown element type code {code}"),
            })?)
        }
        _ => inputs.first().and_then(|i| i.dtype),
    };

    Ok(single(shape, dtype))
}

fn promoted_dtype(op: &OperationNode, inputs: &[InputInfo], diags: &mut Diagnostics) -> Result<Option<DataType>> {
    let mut result: Option<DataType> = None;
    for input in inputs {
        match (result, input.dtype) {
            (None, d) => result = d,
            (Some(acc), Some(d)) => {
                result = Some(DataType::promote(acc, d).map_err(|_| Error::InvalidAttribute {
                    op: op.name.clone(),
                    attr: "dtype".into(),
                    reason: format!("no common type for {acc} and {d}"),
                })?);
            }
            (Some(_), None) => {}
        }
    }
    if result.is_none() {
        diags.record(DiagnosticKind::MissingDtype, &op.name, "no input carries a dtype");
    }
    Ok(result)
}
