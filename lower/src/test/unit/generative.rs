use loft_ir::graph::Graph;
use loft_ir::node::OpKind;

use crate::pipeline::{lower_graph, LowerOptions};
use crate::test::{ints, simple, the_loop, trip_count, Eval};

#[test]
fn range_generates_the_arithmetic_sequence() {
    let mut graph = Graph::new();
    let start = ints(&mut graph, "start", &[2]);
    let limit = ints(&mut graph, "limit", &[10]);
    let delta = ints(&mut graph, "delta", &[3]);
    let out = simple(&mut graph, "range", OpKind::Range, &[start, limit, delta]);

    lower_graph(&mut graph, &LowerOptions::default()).unwrap();
    assert_eq!(trip_count(&graph, the_loop(&graph)), 3);

    let eval = Eval::run(&graph);
    assert_eq!(eval.get(out), &[2.0, 5.0, 8.0]);
}

#[test]
fn unit_step_range_counts_up_from_start() {
    let mut graph = Graph::new();
    let start = ints(&mut graph, "start", &[0]);
    let limit = ints(&mut graph, "limit", &[4]);
    let delta = ints(&mut graph, "delta", &[1]);
    let out = simple(&mut graph, "iota", OpKind::Range, &[start, limit, delta]);

    lower_graph(&mut graph, &LowerOptions::default()).unwrap();
    let eval = Eval::run(&graph);
    assert_eq!(eval.get(out), &[0.0, 1.0, 2.0, 3.0]);
}
