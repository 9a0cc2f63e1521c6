mod property;
mod unit;

use loft_ir::graph::{Graph, NodeId};
use loft_ir::node::{OpKind, OperationNode, TensorKind, TensorNode};
use loft_ir::shape::from_dims;
use loft_ir::{DataType, TensorData};

pub(crate) fn input(graph: &mut Graph, name: &str, dims: &[usize]) -> NodeId {
    graph
        .add_tensor(TensorNode::new(name, TensorKind::Input).with_dtype(DataType::Float).with_shape(from_dims(dims)))
        .unwrap()
}

pub(crate) fn constant(graph: &mut Graph, name: &str, data: TensorData) -> NodeId {
    let len = data.len();
    graph
        .add_tensor(TensorNode::new(name, TensorKind::Constant).with_shape(from_dims(&[len])).with_data(data))
        .unwrap()
}

/// Wire `op` over `operands` with a fresh output tensor; returns the output.
pub(crate) fn apply_op(graph: &mut Graph, op: OperationNode, operands: &[NodeId]) -> NodeId {
    let out = graph.add_tensor(TensorNode::new(format!("{}_out", op.name), TensorKind::Intermediate)).unwrap();
    let op = op.with_params(operands.iter().map(|&id| Some(id)).collect());
    let op_id = graph.add_operation(op).unwrap();
    for &tensor in operands {
        graph.add_edge(tensor, op_id).unwrap();
    }
    graph.add_edge(op_id, out).unwrap();
    out
}

pub(crate) fn simple(graph: &mut Graph, name: &str, op: OpKind, operands: &[NodeId]) -> NodeId {
    apply_op(graph, OperationNode::new(name, op), operands)
}
