use loft_ir::graph::Graph;
use loft_ir::node::{AttrValue, OpKind, OperationNode, TensorKind, TensorNode};
use loft_ir::shape::from_dims;
use loft_ir::{DataType, TensorData};

use crate::diagnostics::DiagnosticKind;
use crate::engine::{infer_graph, resolve_input};
use crate::test::{apply_op, constant, input, simple};

#[test]
fn shapes_flow_through_a_chain() {
    let mut g = Graph::new();
    let a = input(&mut g, "a", &[2, 1]);
    let b = input(&mut g, "b", &[1, 3]);
    let sum = simple(&mut g, "add", OpKind::Add, &[a, b]);
    let neg = simple(&mut g, "neg", OpKind::Neg, &[sum]);

    let diags = infer_graph(&mut g).unwrap();
    assert!(diags.is_empty());
    assert_eq!(g.tensor(sum).unwrap().shape, Some(from_dims(&[2, 3])));
    assert_eq!(g.tensor(neg).unwrap().shape, Some(from_dims(&[2, 3])));
}

#[test]
fn rewired_edges_carry_the_inferred_values() {
    let mut g = Graph::new();
    let a = input(&mut g, "a", &[4]);
    let b = input(&mut g, "b", &[4]);
    let out = simple(&mut g, "add", OpKind::Add, &[a, b]);

    infer_graph(&mut g).unwrap();

    let op = g.producer(out).unwrap().unwrap();
    let outgoing = g.outgoing(op).unwrap();
    assert_eq!(outgoing.len(), 1);
    let edge = g.edge(outgoing[0]).unwrap();
    assert_eq!(edge.shape, Some(from_dims(&[4])));
    assert_eq!(edge.dtype, Some(DataType::Float));
}

#[test]
fn inference_is_idempotent() {
    let mut g = Graph::new();
    let a = input(&mut g, "a", &[2, 3]);
    let b = input(&mut g, "b", &[3]);
    let out = simple(&mut g, "add", OpKind::Add, &[a, b]);

    infer_graph(&mut g).unwrap();
    let first = g.tensor(out).unwrap().shape.clone();
    infer_graph(&mut g).unwrap();
    assert_eq!(g.tensor(out).unwrap().shape, first);

    // Rewiring must not accumulate duplicate edges across runs.
    let op = g.producer(out).unwrap().unwrap();
    assert_eq!(g.outgoing(op).unwrap().len(), 1);
}

#[test]
fn shape_and_dtype_resolve_independently() {
    let mut g = Graph::new();
    let src = input(&mut g, "src", &[2, 2]);
    let producer = g.add_operation(OperationNode::new("make", OpKind::Identity).with_params(vec![Some(src)])).unwrap();
    g.add_edge(src, producer).unwrap();
    let x = g.add_tensor(TensorNode::new("x", TensorKind::Intermediate)).unwrap();
    // The producer edge knows only the dtype; the consumer edge knows only
    // the shape. Neither half may block the other's fallback.
    g.add_edge_with(producer, x, Some(DataType::Float), None, None).unwrap();
    let consumer = g.add_operation(OperationNode::new("use", OpKind::Neg).with_params(vec![Some(x)])).unwrap();
    g.add_edge_with(x, consumer, None, Some(from_dims(&[2, 2])), None).unwrap();

    let info = resolve_input(&g, consumer, Some(x));
    assert_eq!(info.dtype, Some(DataType::Float));
    assert_eq!(info.shape, Some(from_dims(&[2, 2])));
}

#[test]
fn comparison_produces_bool() {
    let mut g = Graph::new();
    let a = input(&mut g, "a", &[4]);
    let b = input(&mut g, "b", &[4]);
    let out = simple(&mut g, "less", OpKind::Less, &[a, b]);

    infer_graph(&mut g).unwrap();
    assert_eq!(g.tensor(out).unwrap().dtype, Some(DataType::Bool));
}

#[test]
fn cast_reads_target_from_attribute() {
    let mut g = Graph::new();
    let x = input(&mut g, "x", &[3]);
    let op = OperationNode::new("cast", OpKind::Cast)
        .with_attr("to", AttrValue::Int(DataType::Int64.onnx_code() as i64));
    let out = apply_op(&mut g, op, &[x]);

    infer_graph(&mut g).unwrap();
    let tensor = g.tensor(out).unwrap();
    assert_eq!(tensor.dtype, Some(DataType::Int64));
    assert_eq!(tensor.shape, Some(from_dims(&[3])));
}

#[test]
fn loop_outputs_adopt_carry_shapes() {
    let mut g = Graph::new();
    let trip = constant(&mut g, "trip", TensorData::scalar_i64(4));
    let cond = constant(&mut g, "cond", TensorData::scalar_bool(true));
    let carry = input(&mut g, "carry", &[4]);
    let out = simple(&mut g, "loop", OpKind::Loop, &[trip, cond, carry]);

    infer_graph(&mut g).unwrap();
    let tensor = g.tensor(out).unwrap();
    assert_eq!(tensor.shape, Some(from_dims(&[4])));
    assert_eq!(tensor.dtype, Some(DataType::Float));
}

#[test]
fn loop_carry_mismatch_is_reported() {
    let mut g = Graph::new();
    let trip = constant(&mut g, "trip", TensorData::scalar_i64(2));
    let cond = constant(&mut g, "cond", TensorData::scalar_bool(true));
    let carry = input(&mut g, "carry", &[4]);
    let out = simple(&mut g, "loop", OpKind::Loop, &[trip, cond, carry]);
    let loop_op = g.producer(out).unwrap().unwrap();

    // Body writes a [3] state back against a [4] incoming carry.
    let body_out = g
        .add_tensor(
            TensorNode::new("state_out", TensorKind::Output)
                .with_dtype(DataType::Float)
                .with_shape(from_dims(&[3])),
        )
        .unwrap();
    g.set_parent(body_out, Some(loop_op)).unwrap();

    let diags = infer_graph(&mut g).unwrap();
    assert_eq!(diags.of_kind(DiagnosticKind::CarryMismatch).len(), 1);
    // The output still adopts the incoming carry shape.
    assert_eq!(g.tensor(out).unwrap().shape, Some(from_dims(&[4])));
}

#[test]
fn body_inference_follows_dependencies_not_creation_order() {
    let mut g = Graph::new();
    let trip = constant(&mut g, "trip", TensorData::scalar_i64(2));
    let cond = constant(&mut g, "cond", TensorData::scalar_bool(true));
    let carry = input(&mut g, "carry", &[4]);
    let out = simple(&mut g, "loop", OpKind::Loop, &[trip, cond, carry]);
    let loop_op = g.producer(out).unwrap().unwrap();

    // Body: state -> first -> mid -> second -> fin, with `second` inserted
    // before `first`.
    let state = g
        .add_tensor(
            TensorNode::new("state", TensorKind::Input).with_dtype(DataType::Float).with_shape(from_dims(&[4])),
        )
        .unwrap();
    let mid = g.add_tensor(TensorNode::new("mid", TensorKind::Intermediate)).unwrap();
    let fin = g.add_tensor(TensorNode::new("fin", TensorKind::Intermediate)).unwrap();

    let second = g.add_operation(OperationNode::new("second", OpKind::Neg).with_params(vec![Some(mid)])).unwrap();
    g.add_edge(mid, second).unwrap();
    g.add_edge(second, fin).unwrap();
    let first = g.add_operation(OperationNode::new("first", OpKind::Relu).with_params(vec![Some(state)])).unwrap();
    g.add_edge(state, first).unwrap();
    g.add_edge(first, mid).unwrap();
    for id in [state, mid, fin, second, first] {
        g.set_parent(id, Some(loop_op)).unwrap();
    }

    infer_graph(&mut g).unwrap();
    let tensor = g.tensor(fin).unwrap();
    assert_eq!(tensor.shape, Some(from_dims(&[4])));
    assert_eq!(tensor.dtype, Some(DataType::Float));
}

#[test]
fn lstm_outputs_are_positional() {
    let mut g = Graph::new();
    let x = input(&mut g, "x", &[7, 2, 5]);
    let w = input(&mut g, "w", &[1, 12, 5]);
    let r = input(&mut g, "r", &[1, 12, 3]);

    let op = OperationNode::new("lstm", OpKind::Lstm)
        .with_attr("hidden_size", AttrValue::Int(3))
        .with_params(vec![Some(x), Some(w), Some(r)]);
    let op_id = g.add_operation(op).unwrap();
    for t in [x, w, r] {
        g.add_edge(t, op_id).unwrap();
    }

    let y = g.add_tensor(TensorNode::new("y", TensorKind::Output)).unwrap();
    let y_h = g.add_tensor(TensorNode::new("y_h", TensorKind::Output)).unwrap();
    let y_c = g.add_tensor(TensorNode::new("y_c", TensorKind::Output)).unwrap();
    for t in [y, y_h, y_c] {
        g.add_edge(op_id, t).unwrap();
    }

    infer_graph(&mut g).unwrap();
    assert_eq!(g.tensor(y).unwrap().shape, Some(from_dims(&[7, 1, 2, 3])));
    assert_eq!(g.tensor(y_h).unwrap().shape, Some(from_dims(&[1, 2, 3])));
    assert_eq!(g.tensor(y_c).unwrap().shape, Some(from_dims(&[1, 2, 3])));
}

#[test]
fn reduce_with_keepdims_and_axes() {
    let mut g = Graph::new();
    let x = input(&mut g, "x", &[2, 3, 4]);
    let op = OperationNode::new("sum", OpKind::ReduceSum)
        .with_attr("axes", AttrValue::Ints(vec![1]))
        .with_attr("keepdims", AttrValue::Int(1));
    let out = apply_op(&mut g, op, &[x]);

    infer_graph(&mut g).unwrap();
    assert_eq!(g.tensor(out).unwrap().shape, Some(from_dims(&[2, 1, 4])));
}

#[test]
fn argmax_yields_int64_indices() {
    let mut g = Graph::new();
    let x = input(&mut g, "x", &[2, 5]);
    let op = OperationNode::new("argmax", OpKind::ArgMax)
        .with_attr("axis", AttrValue::Int(1))
        .with_attr("keepdims", AttrValue::Int(0));
    let out = apply_op(&mut g, op, &[x]);

    infer_graph(&mut g).unwrap();
    let tensor = g.tensor(out).unwrap();
    assert_eq!(tensor.shape, Some(from_dims(&[2])));
    assert_eq!(tensor.dtype, Some(DataType::Int64));
}

#[test]
fn conv_spatial_shrink() {
    let mut g = Graph::new();
    let x = input(&mut g, "x", &[1, 3, 8, 8]);
    let w = input(&mut g, "w", &[16, 3, 3, 3]);
    let op = OperationNode::new("conv", OpKind::Conv)
        .with_attr("strides", AttrValue::Ints(vec![2, 2]))
        .with_attr("pads", AttrValue::Ints(vec![1, 1, 1, 1]));
    let out = apply_op(&mut g, op, &[x, w]);

    infer_graph(&mut g).unwrap();
    assert_eq!(g.tensor(out).unwrap().shape, Some(from_dims(&[1, 16, 4, 4])));
}

#[test]
fn conv_rejects_mismatched_stride_rank() {
    let mut g = Graph::new();
    let x = input(&mut g, "x", &[1, 3, 8, 8]);
    let w = input(&mut g, "w", &[16, 3, 3, 3]);
    // One stride for two spatial axes.
    let op = OperationNode::new("conv", OpKind::Conv).with_attr("strides", AttrValue::Ints(vec![2]));
    apply_op(&mut g, op, &[x, w]);

    assert!(infer_graph(&mut g).is_err());
}

#[test]
fn global_average_pool_collapses_spatial_dims() {
    let mut g = Graph::new();
    let x = input(&mut g, "x", &[2, 8, 5, 7]);
    let out = simple(&mut g, "gap", OpKind::GlobalAveragePool, &[x]);

    infer_graph(&mut g).unwrap();
    assert_eq!(g.tensor(out).unwrap().shape, Some(from_dims(&[2, 8, 1, 1])));
}
