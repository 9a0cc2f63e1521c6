use loft_ir::shape::from_dims;
use loft_ir::Dim;

use crate::broadcast::{broadcast_many, broadcast_pair};
use crate::diagnostics::{DiagnosticKind, Diagnostics};

#[test]
fn right_aligned_stretching() {
    let mut diags = Diagnostics::new();
    let out = broadcast_pair(&from_dims(&[2, 1, 4]), &from_dims(&[3, 1]), "t", &mut diags);
    assert_eq!(out, from_dims(&[2, 3, 4]));
    assert!(diags.is_empty());
}

#[test]
fn scalar_broadcasts_against_anything() {
    let mut diags = Diagnostics::new();
    let out = broadcast_pair(&from_dims(&[]), &from_dims(&[5, 2]), "t", &mut diags);
    assert_eq!(out, from_dims(&[5, 2]));
    assert!(diags.is_empty());
}

#[test]
fn mismatch_records_diagnostic_and_takes_max() {
    let mut diags = Diagnostics::new();
    let out = broadcast_pair(&from_dims(&[3]), &from_dims(&[4]), "bad_add", &mut diags);
    assert_eq!(out, from_dims(&[4]));

    let recorded = diags.of_kind(DiagnosticKind::BroadcastMismatch);
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].node, "bad_add");
}

#[test]
fn symbolic_dim_wins_over_one() {
    let mut diags = Diagnostics::new();
    let mut lhs = from_dims(&[1]);
    lhs[0] = Dim::Symbolic("batch".into());
    let out = broadcast_pair(&lhs, &from_dims(&[1]), "t", &mut diags);
    assert_eq!(out[0], Dim::Symbolic("batch".into()));
}

#[test]
fn many_folds_left_to_right() {
    let mut diags = Diagnostics::new();
    let shapes = [from_dims(&[1, 4]), from_dims(&[3, 1]), from_dims(&[4])];
    let out = broadcast_many(&shapes, "t", &mut diags);
    assert_eq!(out, from_dims(&[3, 4]));
    assert!(diags.is_empty());
}
