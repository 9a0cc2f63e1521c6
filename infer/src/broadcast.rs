//! NumPy-style broadcasting over partially known shapes.
//!
//! Trailing-dimension alignment: shapes are right-aligned, missing leading
//! axes behave as size 1, and a size-1 axis stretches to the partner's
//! extent. A non-1 mismatch is recorded as a [`DiagnosticKind::BroadcastMismatch`]
//! and resolved by taking the larger dimension, so inference keeps making
//! progress over models with stale shape metadata; strict callers assert the
//! diagnostics list is empty.

use loft_ir::shape::{self, Shape};
use loft_ir::Dim;

use crate::diagnostics::{DiagnosticKind, Diagnostics};

/// Broadcast two shapes. `node` names the operator for diagnostics.
pub fn broadcast_pair(lhs: &Shape, rhs: &Shape, node: &str, diags: &mut Diagnostics) -> Shape {
    let rank = lhs.len().max(rhs.len());
    let mut out = Shape::with_capacity(rank);

    for axis in 0..rank {
        // Right-aligned: walk from the trailing axis.
        let l = axis_from_end(lhs, rank - 1 - axis);
        let r = axis_from_end(rhs, rank - 1 - axis);
        out.push(broadcast_dim(l, r, lhs, rhs, node, diags));
    }
    out
}

/// Broadcast any number of shapes (variadic elementwise operators).
pub fn broadcast_many(shapes: &[Shape], node: &str, diags: &mut Diagnostics) -> Shape {
    let mut iter = shapes.iter();
    let Some(first) = iter.next() else {
        return Shape::new();
    };
    iter.fold(first.clone(), |acc, s| broadcast_pair(&acc, s, node, diags))
}

fn axis_from_end(shape: &Shape, from_end: usize) -> Option<&Dim> {
    shape.len().checked_sub(1 + from_end).map(|i| &shape[i])
}

fn broadcast_dim(
    l: Option<&Dim>,
    r: Option<&Dim>,
    lhs: &Shape,
    rhs: &Shape,
    node: &str,
    diags: &mut Diagnostics,
) -> Dim {
    match (l, r) {
        (None, None) => Dim::Known(1),
        (Some(d), None) | (None, Some(d)) => d.clone(),
        (Some(Dim::Known(1)), Some(d)) | (Some(d), Some(Dim::Known(1))) => d.clone(),
        (Some(Dim::Known(a)), Some(Dim::Known(b))) => {
            if a == b {
                Dim::Known(*a)
            } else {
                // Reference-compatible recovery: warn and take the max.
                diags.record(
                    DiagnosticKind::BroadcastMismatch,
                    node,
                    format!(
                        "cannot broadcast {} with {}; taking the larger dimension",
                        shape::display(lhs),
                        shape::display(rhs)
                    ),
                );
                Dim::Known(*a.max(b))
            }
        }
        (Some(Dim::Symbolic(name)), Some(_)) | (Some(_), Some(Dim::Symbolic(name))) => Dim::Symbolic(name.clone()),
    }
}
