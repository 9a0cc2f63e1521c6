use loft_ir::graph::Graph;
use loft_ir::node::{AttrValue, OpKind, OperationNode};

use crate::pipeline::{lower_graph, LowerOptions};
use crate::test::{apply_op, floats, simple, the_loop, trip_count, Eval};

#[test]
fn global_average_pool_reduces_each_channel_to_its_mean() {
    let mut graph = Graph::new();
    let x = floats(&mut graph, "x", &[1, 2, 4], &[1.0, 2.0, 3.0, 4.0, 10.0, 20.0, 30.0, 40.0]);
    let out = simple(&mut graph, "gap", OpKind::GlobalAveragePool, &[x]);

    lower_graph(&mut graph, &LowerOptions::default()).unwrap();
    // Output [1, 2, 1]: one iteration per channel.
    assert_eq!(trip_count(&graph, the_loop(&graph)), 2);

    let eval = Eval::run(&graph);
    assert_eq!(eval.get(out), &[2.5, 25.0]);
}

#[test]
fn unpadded_pool_divides_by_the_window_size() {
    let mut graph = Graph::new();
    let x = floats(&mut graph, "x", &[1, 1, 4], &[1.0, 2.0, 3.0, 4.0]);
    let op = OperationNode::new("pool", OpKind::AveragePool).with_attr("kernel_shape", AttrValue::Ints(vec![2]));
    let out = apply_op(&mut graph, op, &[x]);

    lower_graph(&mut graph, &LowerOptions::default()).unwrap();
    let eval = Eval::run(&graph);
    assert_eq!(eval.get(out), &[1.5, 2.5, 3.5]);
}

#[test]
fn padded_pool_counts_only_in_bounds_taps() {
    let mut graph = Graph::new();
    let x = floats(&mut graph, "x", &[1, 1, 4], &[1.0, 2.0, 3.0, 4.0]);
    let op = OperationNode::new("pool", OpKind::AveragePool)
        .with_attr("kernel_shape", AttrValue::Ints(vec![2]))
        .with_attr("pads", AttrValue::Ints(vec![1, 1]));
    let out = apply_op(&mut graph, op, &[x]);

    lower_graph(&mut graph, &LowerOptions::default()).unwrap();
    // Border windows have a single live tap, so they divide by one.
    let eval = Eval::run(&graph);
    assert_eq!(eval.get(out), &[1.0, 1.5, 2.5, 3.5, 4.0]);
}

#[test]
fn count_include_pad_divides_by_the_full_window() {
    let mut graph = Graph::new();
    let x = floats(&mut graph, "x", &[1, 1, 4], &[1.0, 2.0, 3.0, 4.0]);
    let op = OperationNode::new("pool", OpKind::AveragePool)
        .with_attr("kernel_shape", AttrValue::Ints(vec![2]))
        .with_attr("pads", AttrValue::Ints(vec![1, 1]))
        .with_attr("count_include_pad", AttrValue::Int(1));
    let out = apply_op(&mut graph, op, &[x]);

    lower_graph(&mut graph, &LowerOptions::default()).unwrap();
    let eval = Eval::run(&graph);
    assert_eq!(eval.get(out), &[0.5, 1.5, 2.5, 3.5, 2.0]);
}
