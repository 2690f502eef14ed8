//! Column-major stride utilities.
//!
//! The whole crate uses column-major (Fortran) order: the first axis is the
//! fastest-varying one, which is also what faer expects for zero-copy
//! matrix views.

/// Compute column-major strides from a shape.
///
/// For shape `[d0, d1, d2, ...]` returns `[1, d0, d0*d1, ...]`.
///
/// # Examples
///
/// ```
/// use tensorops::strides::compute_strides;
///
/// assert_eq!(compute_strides(&[3, 4, 5]), vec![1, 3, 12]);
/// assert_eq!(compute_strides(&[]), Vec::<usize>::new());
/// ```
pub fn compute_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = Vec::with_capacity(shape.len());
    let mut stride = 1;
    for &dim in shape {
        strides.push(stride);
        stride *= dim;
    }
    strides
}

/// Convert cartesian indices to a linear index given per-axis strides.
#[inline]
pub fn cartesian_to_linear(indices: &[usize], strides: &[usize]) -> usize {
    indices
        .iter()
        .zip(strides.iter())
        .map(|(&i, &s)| i * s)
        .sum()
}

/// Convert a linear index to cartesian indices for a column-major shape.
pub fn linear_to_cartesian(mut linear: usize, shape: &[usize]) -> Vec<usize> {
    let mut indices = Vec::with_capacity(shape.len());
    for &dim in shape {
        indices.push(linear % dim);
        linear /= dim;
    }
    indices
}

/// Invert a permutation: `inv[perm[k]] == k`.
///
/// The caller must have validated that `perm` is a permutation of
/// `0..perm.len()`.
pub fn inverse_permutation(perm: &[usize]) -> Vec<usize> {
    let mut inv = vec![0usize; perm.len()];
    for (k, &p) in perm.iter().enumerate() {
        inv[p] = k;
    }
    inv
}

/// Check that `perm` is a permutation of `0..ndim`.
pub fn is_permutation(perm: &[usize], ndim: usize) -> bool {
    if perm.len() != ndim {
        return false;
    }
    let mut seen = vec![false; ndim];
    for &p in perm {
        if p >= ndim || seen[p] {
            return false;
        }
        seen[p] = true;
    }
    true
}
