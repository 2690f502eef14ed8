//! Shape selection and output allocation.
//!
//! For dense tensors a "structure" is simply the tuple of axis sizes, so
//! structure extraction reduces to selecting sizes of the chosen axes.
//! Allocation always zero-initializes; callers overwrite with `β = 0`
//! accumulation anyway.

use crate::cache;
use crate::scalar::Scalar;
use crate::tensor::Tensor;

/// Sizes of the selected axes of `a`, in `(left..., right...)` order.
pub fn similar_structure<T: Scalar>(a: &Tensor<T>, left: &[usize], right: &[usize]) -> Vec<usize> {
    left.iter()
        .chain(right.iter())
        .map(|&p| a.shape()[p])
        .collect()
}

/// Sizes for a two-operand structure: gather `pos_a` of `a` and `pos_b` of
/// `b` into one axis list, then select `(left..., right...)` out of it.
pub fn similar_structure_pair<T: Scalar>(
    a: &Tensor<T>,
    b: &Tensor<T>,
    pos_a: &[usize],
    pos_b: &[usize],
    left: &[usize],
    right: &[usize],
) -> Vec<usize> {
    let combined: Vec<usize> = pos_a
        .iter()
        .map(|&p| a.shape()[p])
        .chain(pos_b.iter().map(|&p| b.shape()[p]))
        .collect();
    left.iter()
        .chain(right.iter())
        .map(|&p| combined[p])
        .collect()
}

/// Allocate a zero-initialized tensor with the given shape.
pub fn allocate<T: Scalar>(shape: &[usize]) -> Tensor<T> {
    Tensor::zeros(shape)
}

/// Allocate an output tensor shaped like the selected axes of `a`.
///
/// This is the allocation primitive referenced by compiled programs for
/// tensor definitions (`:=`).
pub fn similar_from_indices<T: Scalar>(a: &Tensor<T>, left: &[usize], right: &[usize]) -> Tensor<T> {
    allocate(&similar_structure(a, left, right))
}

/// Like [`similar_from_indices`], but served from the temporary cache
/// under the given call-site tag.
///
/// The returned tensor's contents are unspecified on a cache hit; callers
/// overwrite with a `β = 0` accumulation. Return it with
/// [`cache::give_back`] to keep it alive for the next invocation.
pub fn cached_similar_from_indices<T: Scalar>(
    site: u64,
    a: &Tensor<T>,
    left: &[usize],
    right: &[usize],
) -> Tensor<T> {
    cache::take_or_alloc(site, &similar_structure(a, left, right))
}
