//! Property tests for mixed-radix index arithmetic.

use proptest::prelude::*;

use crate::indexing::{compose, decompose, strides};

/// Dimension vectors with a bounded element count so `prod(dims)` stays small.
fn arb_dims() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..8, 1..5)
}

proptest! {
    /// compose(decompose(t, d), d) == t for every in-range flat index.
    #[test]
    fn mixed_radix_round_trip(dims in arb_dims(), seed in any::<u64>()) {
        let total: usize = dims.iter().product();
        let t = (seed % total as u64) as i64;

        let indices = decompose(t, &dims);
        prop_assert_eq!(indices.len(), dims.len());
        prop_assert_eq!(compose(&indices, &dims), t);
    }

    /// Every decomposed index is within its axis extent.
    #[test]
    fn decomposed_indices_in_range(dims in arb_dims(), seed in any::<u64>()) {
        let total: usize = dims.iter().product();
        let t = (seed % total as u64) as i64;

        for (idx, &d) in decompose(t, &dims).iter().zip(&dims) {
            prop_assert!((0..d as i64).contains(idx));
        }
    }

    /// Strides decrease monotonically and the leading stride covers the rest.
    #[test]
    fn strides_consistent(dims in arb_dims()) {
        let s = strides(&dims);
        for w in s.windows(2) {
            prop_assert!(w[0] >= w[1]);
        }
        let total: i64 = dims.iter().product::<usize>() as i64;
        prop_assert_eq!(s[0] * dims[0] as i64, total);
    }
}
