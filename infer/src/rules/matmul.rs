//! MatMul and Gemm shape rules.

use loft_dtype::DataType;
use loft_ir::node::OperationNode;
use loft_ir::shape::Shape;
use loft_ir::Dim;

use crate::broadcast::broadcast_pair;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::engine::{InputInfo, Outputs};
use crate::error::*;
use crate::rules::{first_dtype, single};

/// ONNX MatMul: 2-D matrix rules with 1-D promotion and broadcast batch
/// dims for rank > 2.
pub(crate) fn matmul(op: &OperationNode, inputs: &[InputInfo], diags: &mut Diagnostics) -> Result<Outputs> {
    let dtype = promoted(inputs);
    let (Some(a), Some(b)) = (
        inputs.first().and_then(|i| i.shape.clone()),
        inputs.get(1).and_then(|i| i.shape.clone()),
    ) else {
        diags.record(DiagnosticKind::MissingShape, &op.name, "matmul operand shape unknown");
        return Ok(single(None, dtype));
    };

    // 1-D promotion per the ONNX contract: a gains a leading 1, b a
    // trailing 1; the synthetic axes are dropped from the result.
    let a_vec = a.len() == 1;
    let b_vec = b.len() == 1;
    let mut a = a;
    let mut b = b;
    if a_vec {
        a.insert(0, Dim::Known(1));
    }
    if b_vec {
        b.push(Dim::Known(1));
    }

    if a.len() < 2 || b.len() < 2 {
        diags.record(DiagnosticKind::RankFallback, &op.name, "matmul operand rank below 2");
        return Ok(single(Some(a), dtype));
    }

    let (m, _ka) = (a[a.len() - 2].clone(), a[a.len() - 1].clone());
    let (_kb, n) = (b[b.len() - 2].clone(), b[b.len() - 1].clone());

    let batch_a: Shape = a[..a.len() - 2].iter().cloned().collect();
    let batch_b: Shape = b[..b.len() - 2].iter().cloned().collect();
    let mut out = broadcast_pair(&batch_a, &batch_b, &op.name, diags);

    if !a_vec {
        out.push(m);
    }
    if !b_vec {
        out.push(n);
    }
    Ok(single(Some(out), dtype))
}

/// ONNX Gemm: strictly 2-D, `transA`/`transB` flip the operand orientation.
pub(crate) fn gemm(op: &OperationNode, inputs: &[InputInfo], diags: &mut Diagnostics) -> Result<Outputs> {
    let dtype = promoted(inputs);
    let (Some(a), Some(b)) = (
        inputs.first().and_then(|i| i.shape.clone()),
        inputs.get(1).and_then(|i| i.shape.clone()),
    ) else {
        diags.record(DiagnosticKind::MissingShape, &op.name, "gemm operand shape unknown");
        return Ok(single(None, dtype));
    };

    if a.len() != 2 || b.len() != 2 {
        diags.record(DiagnosticKind::RankFallback, &op.name, "gemm operands must be rank 2");
        return Ok(single(Some(a), dtype));
    }

    let trans_a = op.attr_i64("transA").unwrap_or(0) != 0;
    let trans_b = op.attr_i64("transB").unwrap_or(0) != 0;

    let m = if trans_a { a[1].clone() } else { a[0].clone() };
    let n = if trans_b { b[0].clone() } else { b[1].clone() };

    let mut out = Shape::new();
    out.push(m);
    out.push(n);
    Ok(single(Some(out), dtype))
}

fn promoted(inputs: &[InputInfo]) -> Option<DataType> {
    match (inputs.first().and_then(|i| i.dtype), inputs.get(1).and_then(|i| i.dtype)) {
        (Some(a), Some(b)) => DataType::promote(a, b).ok(),
        _ => first_dtype(inputs),
    }
}
