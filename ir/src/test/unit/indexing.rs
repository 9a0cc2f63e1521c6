//! Flat-index arithmetic tests.

use test_case::test_case;

use crate::indexing::{broadcast_axis_map, compose, decompose, strides};
use crate::shape::from_dims;

#[test]
fn strides_are_row_major() {
    assert_eq!(strides(&[2, 3, 4]), vec![12, 4, 1]);
    assert_eq!(strides(&[5]), vec![1]);
    assert_eq!(strides(&[]), Vec::<i64>::new());
}

#[test_case(0, &[2, 3] => vec![0, 0])]
#[test_case(5, &[2, 3] => vec![1, 2])]
#[test_case(7, &[2, 2, 2] => vec![1, 1, 1])]
#[test_case(11, &[3, 4] => vec![2, 3])]
fn decompose_examples(flat: i64, dims: &[usize]) -> Vec<i64> {
    decompose(flat, dims)
}

#[test]
fn compose_inverts_decompose() {
    let dims = [2, 3, 4];
    for t in 0..24 {
        assert_eq!(compose(&decompose(t, &dims), &dims), t);
    }
}

#[test]
fn broadcast_map_right_aligns() {
    // output rank 3, source [3, 1, 5]: middle axis always indexes 0
    let map = broadcast_axis_map(3, &from_dims(&[3, 1, 5]));
    assert_eq!(map, vec![Some(0), None, Some(2)]);

    // rank-deficient source [5]: only the last output axis maps through
    let map = broadcast_axis_map(3, &from_dims(&[5]));
    assert_eq!(map, vec![None, None, Some(0)]);

    // scalar source: nothing maps
    let map = broadcast_axis_map(2, &from_dims(&[]));
    assert_eq!(map, vec![None, None]);
}
