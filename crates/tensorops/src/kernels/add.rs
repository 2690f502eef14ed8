//! Permute-and-accumulate kernel.

use crate::error::TensorOpsError;
use crate::kernels::Conj;
use crate::scalar::Scalar;
use crate::strides::is_permutation;
use crate::tensor::Tensor;
use crate::view::{axpby_into, StridedView, StridedViewMut};

/// `C ← β·C + α·op(A)` with the axes of `A` rearranged into `C`'s order.
///
/// `(left..., right...)` gives, for each axis of `C`, the source axis of
/// `A`; the concatenation must be a permutation of `0..rank(A)`. The
/// left/right split mirrors the codomain/domain split of the index lists
/// and has no further meaning for dense tensors.
///
/// # Errors
///
/// * `InvalidIndices` if the selections do not permute `0..rank(A)`.
/// * `DimensionMismatch` if a selected axis size differs from `C`'s.
///
/// # Examples
///
/// ```
/// use tensorops::{add, Conj, Tensor};
///
/// // C[i,j] = 2 · A[j,i]
/// let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
/// let mut c = Tensor::zeros(&[3, 2]);
/// add(2.0, &a, Conj::Plain, 0.0, &mut c, &[1, 0], &[]).unwrap();
/// assert_eq!(c.get(&[2, 1]), Some(&12.0));
/// ```
pub fn add<T: Scalar>(
    alpha: T,
    a: &Tensor<T>,
    conj_a: Conj,
    beta: T,
    c: &mut Tensor<T>,
    left: &[usize],
    right: &[usize],
) -> Result<(), TensorOpsError> {
    let ind: Vec<usize> = left.iter().chain(right.iter()).copied().collect();
    if !is_permutation(&ind, a.ndim()) {
        return Err(TensorOpsError::invalid_indices(format!(
            "selections {:?} and {:?} do not permute the {} axes of the source",
            left,
            right,
            a.ndim()
        )));
    }
    if c.ndim() != ind.len() {
        return Err(TensorOpsError::invalid_indices(format!(
            "destination rank {} does not match {} selected axes",
            c.ndim(),
            ind.len()
        )));
    }
    for (k, &p) in ind.iter().enumerate() {
        if c.shape()[k] != a.shape()[p] {
            return Err(TensorOpsError::DimensionMismatch {
                expected: a.shape()[p],
                actual: c.shape()[k],
            });
        }
    }

    let src = StridedView::permuted(a, &ind, conj_a.conjugates());
    let mut dst = StridedViewMut::of_tensor(c);
    axpby_into(alpha, &src, beta, &mut dst)
}
