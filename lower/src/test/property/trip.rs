use loft_ir::graph::Graph;
use loft_ir::node::OpKind;
use proptest::prelude::*;

use crate::pipeline::{lower_graph, LowerOptions};
use crate::test::{floats, simple, the_loop, trip_count, Eval};

fn arb_case() -> impl Strategy<Value = (Vec<usize>, Vec<f32>, Vec<f32>)> {
    proptest::collection::vec(1usize..4, 1..4).prop_flat_map(|dims| {
        let total: usize = dims.iter().product();
        let values = proptest::collection::vec(-100.0f32..100.0, total);
        (Just(dims), values.clone(), values)
    })
}

proptest! {
    /// Output-indexed lowering iterates exactly once per output element.
    #[test]
    fn trip_count_is_the_output_volume((dims, lhs, rhs) in arb_case()) {
        let mut graph = Graph::new();
        let a = floats(&mut graph, "a", &dims, &lhs);
        let b = floats(&mut graph, "b", &dims, &rhs);
        simple(&mut graph, "sum", OpKind::Add, &[a, b]);

        lower_graph(&mut graph, &LowerOptions::default()).unwrap();
        let total: usize = dims.iter().product();
        prop_assert_eq!(trip_count(&graph, the_loop(&graph)), total as i64);
    }

    #[test]
    fn lowered_add_matches_elementwise_reference((dims, lhs, rhs) in arb_case()) {
        let mut graph = Graph::new();
        let a = floats(&mut graph, "a", &dims, &lhs);
        let b = floats(&mut graph, "b", &dims, &rhs);
        let out = simple(&mut graph, "sum", OpKind::Add, &[a, b]);

        lower_graph(&mut graph, &LowerOptions::default()).unwrap();
        let eval = Eval::run(&graph);
        let expected: Vec<f64> = lhs.iter().zip(&rhs).map(|(&x, &y)| f64::from(x) + f64::from(y)).collect();
        prop_assert_eq!(eval.get(out), expected.as_slice());
    }

    #[test]
    fn lowered_max_matches_elementwise_reference((dims, lhs, rhs) in arb_case()) {
        let mut graph = Graph::new();
        let a = floats(&mut graph, "a", &dims, &lhs);
        let b = floats(&mut graph, "b", &dims, &rhs);
        let out = simple(&mut graph, "peak", OpKind::Max, &[a, b]);

        lower_graph(&mut graph, &LowerOptions::default()).unwrap();
        let eval = Eval::run(&graph);
        let expected: Vec<f64> = lhs.iter().zip(&rhs).map(|(&x, &y)| f64::from(x.max(y))).collect();
        prop_assert_eq!(eval.get(out), expected.as_slice());
    }
}
