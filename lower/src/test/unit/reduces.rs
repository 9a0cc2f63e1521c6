use loft_ir::graph::Graph;
use loft_ir::node::{AttrValue, OpKind, OperationNode};

use crate::pipeline::{lower_graph, LowerOptions};
use crate::test::{apply_op, floats, the_loop, trip_count, Eval};

#[test]
fn row_sum_accumulates_the_reduced_axis() {
    let mut graph = Graph::new();
    let x = floats(&mut graph, "x", &[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let op = OperationNode::new("rows", OpKind::ReduceSum)
        .with_attr("axes", AttrValue::Ints(vec![1]))
        .with_attr("keepdims", AttrValue::Int(0));
    let out = apply_op(&mut graph, op, &[x]);

    lower_graph(&mut graph, &LowerOptions::default()).unwrap();
    // One iteration per kept row.
    assert_eq!(trip_count(&graph, the_loop(&graph)), 2);

    let eval = Eval::run(&graph);
    assert_eq!(eval.get(out), &[6.0, 15.0]);
}

#[test]
fn keepdims_reduction_skips_the_collapsed_axis_index() {
    let mut graph = Graph::new();
    let x = floats(&mut graph, "x", &[2, 2], &[1.0, 2.0, 3.0, 4.0]);
    let op = OperationNode::new("cols", OpKind::ReduceSum).with_attr("axes", AttrValue::Ints(vec![0]));
    let out = apply_op(&mut graph, op, &[x]);

    lower_graph(&mut graph, &LowerOptions::default()).unwrap();
    let eval = Eval::run(&graph);
    // keepdims defaults on: output shape [1, 2].
    assert_eq!(eval.get(out), &[4.0, 6.0]);
}

#[test]
fn mean_divides_by_the_reduced_count() {
    let mut graph = Graph::new();
    let x = floats(&mut graph, "x", &[2, 2], &[1.0, 2.0, 3.0, 4.0]);
    let op = OperationNode::new("avg", OpKind::ReduceMean).with_attr("keepdims", AttrValue::Int(0));
    let out = apply_op(&mut graph, op, &[x]);

    lower_graph(&mut graph, &LowerOptions::default()).unwrap();
    let eval = Eval::run(&graph);
    assert_eq!(eval.get(out), &[2.5]);
}

#[test]
fn max_reduction_uses_the_max_combiner() {
    let mut graph = Graph::new();
    let x = floats(&mut graph, "x", &[3], &[4.0, -1.0, 2.5]);
    let op = OperationNode::new("peak", OpKind::ReduceMax).with_attr("keepdims", AttrValue::Int(0));
    let out = apply_op(&mut graph, op, &[x]);

    lower_graph(&mut graph, &LowerOptions::default()).unwrap();
    let eval = Eval::run(&graph);
    assert_eq!(eval.get(out), &[4.0]);
}
