use loft_ir::shape::{from_dims, Shape};
use proptest::prelude::*;

use crate::broadcast::broadcast_pair;
use crate::diagnostics::Diagnostics;

/// Shapes whose pairings never mismatch: every extent is 1 or a fixed
/// per-axis value, so broadcasting is total.
fn arb_compatible_dims() -> impl Strategy<Value = (Shape, Shape)> {
    let axis_extents = proptest::collection::vec(2usize..6, 0..4);
    axis_extents.prop_flat_map(|extents| {
        let rank = extents.len();
        // Each side keeps a right-aligned suffix of the axes and may
        // replace any extent with 1.
        let pick = move |extents: Vec<usize>| {
            (proptest::collection::vec(any::<bool>(), rank), 0..=rank).prop_map(move |(mask, cut)| {
                let dims: Vec<usize> = extents
                    .iter()
                    .zip(&mask)
                    .skip(cut)
                    .map(|(&e, &one)| if one { 1 } else { e })
                    .collect();
                from_dims(&dims)
            })
        };
        (pick(extents.clone()), pick(extents))
    })
}

/// Three mutually compatible shapes over one fixed axis profile.
fn arb_compatible_triple() -> impl Strategy<Value = (Shape, Shape, Shape)> {
    let axis_extents = proptest::collection::vec(2usize..6, 0..4);
    axis_extents.prop_flat_map(|extents| {
        let rank = extents.len();
        let pick = move |extents: Vec<usize>| {
            (proptest::collection::vec(any::<bool>(), rank), 0..=rank).prop_map(move |(mask, cut)| {
                let dims: Vec<usize> = extents
                    .iter()
                    .zip(&mask)
                    .skip(cut)
                    .map(|(&e, &one)| if one { 1 } else { e })
                    .collect();
                from_dims(&dims)
            })
        };
        (pick(extents.clone()), pick(extents.clone()), pick(extents))
    })
}

proptest! {
    #[test]
    fn broadcast_is_commutative((lhs, rhs) in arb_compatible_dims()) {
        let mut d1 = Diagnostics::new();
        let mut d2 = Diagnostics::new();
        prop_assert_eq!(
            broadcast_pair(&lhs, &rhs, "t", &mut d1),
            broadcast_pair(&rhs, &lhs, "t", &mut d2)
        );
        prop_assert!(d1.is_empty() && d2.is_empty());
    }

    #[test]
    fn broadcast_is_idempotent((lhs, rhs) in arb_compatible_dims()) {
        let mut diags = Diagnostics::new();
        let out = broadcast_pair(&lhs, &rhs, "t", &mut diags);
        let again = broadcast_pair(&out, &out, "t", &mut diags);
        prop_assert_eq!(out, again);
        prop_assert!(diags.is_empty());
    }

    #[test]
    fn broadcast_is_associative((a, b, c) in arb_compatible_triple()) {
        let mut diags = Diagnostics::new();
        let ab = broadcast_pair(&a, &b, "t", &mut diags);
        let left = broadcast_pair(&ab, &c, "t", &mut diags);
        let bc = broadcast_pair(&b, &c, "t", &mut diags);
        let right = broadcast_pair(&a, &bc, "t", &mut diags);
        prop_assert_eq!(left, right);
        prop_assert!(diags.is_empty());
    }

    #[test]
    fn result_rank_is_the_max_rank((lhs, rhs) in arb_compatible_dims()) {
        let mut diags = Diagnostics::new();
        let out = broadcast_pair(&lhs, &rhs, "t", &mut diags);
        prop_assert_eq!(out.len(), lhs.len().max(rhs.len()));
    }

    #[test]
    fn each_axis_takes_the_larger_extent((lhs, rhs) in arb_compatible_dims()) {
        let mut diags = Diagnostics::new();
        let out = broadcast_pair(&lhs, &rhs, "t", &mut diags);
        for (axis, dim) in out.iter().rev().enumerate() {
            let l = lhs.iter().rev().nth(axis).and_then(|d| d.as_known()).unwrap_or(1);
            let r = rhs.iter().rev().nth(axis).and_then(|d| d.as_known()).unwrap_or(1);
            prop_assert_eq!(dim.as_known(), Some(l.max(r)));
        }
    }
}
