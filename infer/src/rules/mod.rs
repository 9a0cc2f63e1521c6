//! Per-operator shape/dtype rules, grouped by operator class.
//!
//! Each rule consumes the resolved input views and produces one
//! (shape, dtype) pair per output edge. The dispatch match is exhaustive
//! over [`OpKind`]: adding an operator without a rule is a compile error.

mod conv_pool;
mod elementwise;
mod matmul;
mod misc;
mod movement;
mod reduce;

use loft_dtype::DataType;
use loft_ir::graph::{Graph, NodeId};
use loft_ir::node::{OpKind, OperationNode};
use loft_ir::shape::Shape;
use smallvec::smallvec;

use crate::diagnostics::Diagnostics;
use crate::engine::{InputInfo, Outputs};
use crate::error::*;

pub(crate) fn apply(
    graph: &Graph,
    op_id: NodeId,
    op: &OperationNode,
    inputs: &[InputInfo],
    diags: &mut Diagnostics,
) -> Result<Outputs> {
    use OpKind::*;
    match op.op {
        // Elementwise with broadcast
        Add | Sub | Mul | Div | Pow | Mod | Min | Max | Equal | Less | LessOrEqual | Greater | GreaterOrEqual
        | And | Or | Xor | Where => elementwise::nary(op, inputs, diags),

        // Shape-preserving unary
        Neg | Abs | Sqrt | Exp | Log | Floor | Ceil | Erf | Reciprocal | Relu | LeakyRelu | Sigmoid | Tanh
        | Softplus | Clip | Not | Cast | Identity => elementwise::unary(op, inputs, diags),

        // Matrix
        MatMul => matmul::matmul(op, inputs, diags),
        Gemm => matmul::gemm(op, inputs, diags),

        // Movement / geometry
        Transpose => movement::transpose(op, inputs),
        Reshape => movement::reshape(graph, op, inputs, diags),
        Squeeze => movement::squeeze(graph, op, inputs),
        Unsqueeze => movement::unsqueeze(graph, op, inputs),
        Flatten => movement::flatten(op, inputs),
        Expand => movement::expand(graph, op, inputs, diags),
        Concat => movement::concat(op, inputs, diags),
        Slice => movement::slice(graph, op, inputs),
        Pad => movement::pad(graph, op, inputs),
        Gather => movement::gather(op, inputs),
        ScatterElements => Ok(single(inputs.first().and_then(|i| i.shape.clone()), first_dtype(inputs))),

        // Convolution and pooling
        Conv => conv_pool::conv(op, inputs),
        MaxPool | AveragePool => conv_pool::pool(op, inputs),
        GlobalAveragePool => conv_pool::global_pool(op, inputs),

        // Reductions
        ReduceSum | ReduceMean | ReduceMax | ReduceMin | ReduceProd => reduce::reduce(graph, op, inputs),
        ArgMax | ArgMin => reduce::arg_reduce(op, inputs),

        // Generators and metadata
        Shape => misc::shape_op(inputs),
        ConstantOfShape => misc::constant_of_shape(graph, op, inputs),
        OneHot => misc::one_hot(graph, op, inputs),
        Range => misc::range(graph, op, inputs),
        Constant => misc::constant(graph, op, inputs),

        // Control flow and recurrence
        Loop => misc::loop_op(graph, op_id, op, inputs, diags),
        If => misc::if_op(op, inputs),
        Lstm => misc::lstm(op, inputs),
    }
}

// =========================================================================
// Shared helpers
// =========================================================================

pub(crate) fn single(shape: Option<Shape>, dtype: Option<DataType>) -> Outputs {
    smallvec![(shape, dtype)]
}

pub(crate) fn first_dtype(inputs: &[InputInfo]) -> Option<DataType> {
    inputs.iter().find_map(|i| i.dtype)
}

/// Integer payload of operand `index`, if the operand is a constant tensor.
pub(crate) fn ints_operand(graph: &Graph, inputs: &[InputInfo], index: usize) -> Option<Vec<i64>> {
    inputs.get(index).and_then(|i| i.data(graph)).and_then(|d| d.as_i64s())
}

/// Integer list from an attribute, falling back to a constant operand —
/// newer opsets moved several attribute lists (axes, pads, ...) into inputs.
pub(crate) fn ints_attr_or_operand(
    graph: &Graph,
    op: &OperationNode,
    inputs: &[InputInfo],
    attr: &str,
    operand: usize,
) -> Option<Vec<i64>> {
    op.attr_ints(attr).map(<[i64]>::to_vec).or_else(|| ints_operand(graph, inputs, operand))
}

/// Normalize a possibly negative axis against `rank`.
pub(crate) fn norm_axis(op: &OperationNode, axis: i64, rank: usize) -> Result<usize> {
    let adjusted = if axis < 0 { axis + rank as i64 } else { axis };
    if adjusted < 0 || adjusted >= rank.max(1) as i64 {
        return AxisOutOfRangeSnafu { op: op.name.clone(), axis, rank }.fail();
    }
    Ok(adjusted as usize)
}
