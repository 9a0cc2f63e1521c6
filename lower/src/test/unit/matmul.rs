use loft_ir::graph::Graph;
use loft_ir::node::OpKind;
use test_case::test_case;

use crate::pipeline::{lower_graph, LowerOptions};
use crate::test::{floats, simple, the_loop, trip_count, Eval};

fn square_matmul(graph: &mut Graph) -> loft_ir::NodeId {
    let a = floats(graph, "a", &[2, 2], &[1.0, 2.0, 3.0, 4.0]);
    let b = floats(graph, "b", &[2, 2], &[5.0, 6.0, 7.0, 8.0]);
    simple(graph, "mm", OpKind::MatMul, &[a, b])
}

// Unrolled mode iterates once per output element; coalescing multiplies the
// trip by the contraction extent while the carry keeps one slot per element.
#[test_case(false, 4 ; "unrolled")]
#[test_case(true, 8 ; "coalesced")]
fn square_matmul_trip_count(coalesced: bool, expected: i64) {
    let mut graph = Graph::new();
    square_matmul(&mut graph);

    lower_graph(&mut graph, &LowerOptions { coalesced_matmul: coalesced }).unwrap();
    assert_eq!(trip_count(&graph, the_loop(&graph)), expected);
}

#[test_case(false ; "unrolled")]
#[test_case(true ; "coalesced")]
fn square_matmul_matches_the_reference_product(coalesced: bool) {
    let mut graph = Graph::new();
    let out = square_matmul(&mut graph);

    lower_graph(&mut graph, &LowerOptions { coalesced_matmul: coalesced }).unwrap();
    let eval = Eval::run(&graph);
    assert_eq!(eval.get(out), &[19.0, 22.0, 43.0, 50.0]);
}

#[test]
fn batched_matmul_broadcasts_the_smaller_operand() {
    let mut graph = Graph::new();
    // [2, 2, 2] x [2, 2]: the right operand is shared across the batch.
    let a = floats(&mut graph, "a", &[2, 2, 2], &[1.0, 0.0, 0.0, 1.0, 2.0, 0.0, 0.0, 2.0]);
    let b = floats(&mut graph, "b", &[2, 2], &[5.0, 6.0, 7.0, 8.0]);
    let out = simple(&mut graph, "mm", OpKind::MatMul, &[a, b]);

    lower_graph(&mut graph, &LowerOptions::default()).unwrap();
    let eval = Eval::run(&graph);
    assert_eq!(eval.get(out), &[5.0, 6.0, 7.0, 8.0, 10.0, 12.0, 14.0, 16.0]);
}

#[test]
fn rectangular_matmul_matches_the_reference_product() {
    let mut graph = Graph::new();
    let a = floats(&mut graph, "a", &[1, 3], &[1.0, 2.0, 3.0]);
    let b = floats(&mut graph, "b", &[3, 2], &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    let out = simple(&mut graph, "mm", OpKind::MatMul, &[a, b]);

    for coalesced in [false, true] {
        let mut g = graph.clone();
        lower_graph(&mut g, &LowerOptions { coalesced_matmul: coalesced }).unwrap();
        let eval = Eval::run(&g);
        assert_eq!(eval.get(out), &[14.0, 32.0], "coalesced = {coalesced}");
    }
}
