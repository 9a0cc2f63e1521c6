use loft_ir::graph::Graph;
use loft_ir::node::{AttrValue, OpKind, OperationNode};
use loft_ir::shape::from_dims;
use test_case::test_case;

use crate::engine::infer_graph;
use crate::test::{apply_op, input, simple};

#[test_case(&[2, 3], &[3, 4], &[2, 4] ; "plain 2d")]
#[test_case(&[5, 2, 3], &[3, 4], &[5, 2, 4] ; "batched lhs")]
#[test_case(&[1, 2, 3], &[5, 3, 4], &[5, 2, 4] ; "broadcast batch dims")]
#[test_case(&[3], &[3, 4], &[4] ; "vector lhs drops synthetic axis")]
#[test_case(&[2, 3], &[3], &[2] ; "vector rhs drops synthetic axis")]
#[test_case(&[3], &[3], &[] ; "dot product is a scalar")]
fn matmul_shapes(a: &[usize], b: &[usize], expected: &[usize]) {
    let mut g = Graph::new();
    let lhs = input(&mut g, "a", a);
    let rhs = input(&mut g, "b", b);
    let out = simple(&mut g, "matmul", OpKind::MatMul, &[lhs, rhs]);

    infer_graph(&mut g).unwrap();
    assert_eq!(g.tensor(out).unwrap().shape, Some(from_dims(expected)));
}

#[test]
fn gemm_respects_transpose_flags() {
    let mut g = Graph::new();
    let a = input(&mut g, "a", &[3, 2]);
    let b = input(&mut g, "b", &[4, 3]);
    let op = OperationNode::new("gemm", OpKind::Gemm)
        .with_attr("transA", AttrValue::Int(1))
        .with_attr("transB", AttrValue::Int(1));
    let out = apply_op(&mut g, op, &[a, b]);

    infer_graph(&mut g).unwrap();
    assert_eq!(g.tensor(out).unwrap().shape, Some(from_dims(&[2, 4])));
}
