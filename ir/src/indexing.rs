//! Mixed-radix flat-index arithmetic.
//!
//! The lowering builders iterate a flattened output space with a single
//! INT64 counter. These helpers convert between that counter and per-axis
//! indices, and map output indices onto differently-shaped operands under
//! right-aligned (NumPy) broadcasting.

use crate::shape::{Dim, Shape};

/// Row-major strides for the given extents. The last axis has stride 1.
pub fn strides(dims: &[usize]) -> Vec<i64> {
    let mut out = vec![1i64; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        out[i] = out[i + 1] * dims[i + 1] as i64;
    }
    out
}

/// Mixed-radix decode of a flat counter into per-axis indices
/// (most-significant axis first). Extraction runs from the least-significant
/// end: `idx_k = rem % d_k; rem /= d_k`.
pub fn decompose(flat: i64, dims: &[usize]) -> Vec<i64> {
    let mut indices = vec![0i64; dims.len()];
    let mut rem = flat;
    for (slot, &d) in indices.iter_mut().rev().zip(dims.iter().rev()) {
        let d = d as i64;
        *slot = rem % d;
        rem /= d;
    }
    indices
}

/// Linear-index composition: dot product of per-axis indices with row-major
/// strides. Inverse of [`decompose`] for in-range inputs.
pub fn compose(indices: &[i64], dims: &[usize]) -> i64 {
    indices.iter().zip(strides(dims)).map(|(&i, s)| i * s).sum()
}

/// Right-aligned broadcast mapping of output axes onto a source shape.
///
/// Returns, for each output axis (most-significant first), `Some(src_axis)`
/// when the source has a corresponding axis of size > 1, and `None` when the
/// axis is absent from the source or has size 1 — those always index 0.
pub fn broadcast_axis_map(out_rank: usize, src_shape: &Shape) -> Vec<Option<usize>> {
    let offset = out_rank.saturating_sub(src_shape.len());
    (0..out_rank)
        .map(|axis| {
            if axis < offset {
                return None;
            }
            let src_axis = axis - offset;
            match &src_shape[src_axis] {
                Dim::Known(1) => None,
                _ => Some(src_axis),
            }
        })
        .collect()
}
