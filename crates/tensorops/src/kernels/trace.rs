//! Partial-trace kernel.

use smallvec::SmallVec;

use crate::error::TensorOpsError;
use crate::kernels::Conj;
use crate::scalar::Scalar;
use crate::strides::is_permutation;
use crate::tensor::Tensor;
use crate::view::{reduce_into, Dims, StridedView, StridedViewMut};

/// `C ← β·C + α · partial_trace(op(A))`.
///
/// The axis pair `(cind1[k], cind2[k])` is traced for each `k`; the
/// remaining axes are rearranged into `C`'s order by `(left..., right...)`.
/// The trace walks each diagonal through a synthetic view whose trailing
/// axes carry the summed stride `stride(cind1[k]) + stride(cind2[k])`.
///
/// # Errors
///
/// * `InvalidIndices` if `(left..., right..., cind1..., cind2...)` is not a
///   permutation of `0..rank(A)` or the pair lists differ in length.
/// * `DimensionMismatch` if a traced pair or an output axis disagrees in
///   size.
///
/// # Examples
///
/// ```
/// use tensorops::{trace, Conj, Tensor};
///
/// // C[j] = Σ_i A[i,j,i]
/// let a = Tensor::from_vec((1..=12).map(f64::from).collect(), &[2, 3, 2]).unwrap();
/// let mut c = Tensor::zeros(&[3]);
/// trace(1.0, &a, Conj::Plain, 0.0, &mut c, &[1], &[], &[0], &[2]).unwrap();
/// assert_eq!(c.data(), &[9.0, 13.0, 17.0]);
/// ```
#[allow(clippy::too_many_arguments)]
pub fn trace<T: Scalar>(
    alpha: T,
    a: &Tensor<T>,
    conj_a: Conj,
    beta: T,
    c: &mut Tensor<T>,
    left: &[usize],
    right: &[usize],
    cind1: &[usize],
    cind2: &[usize],
) -> Result<(), TensorOpsError> {
    if cind1.len() != cind2.len() {
        return Err(TensorOpsError::invalid_indices(format!(
            "trace pair lists {:?} and {:?} differ in length",
            cind1, cind2
        )));
    }
    let all: Vec<usize> = left
        .iter()
        .chain(right.iter())
        .chain(cind1.iter())
        .chain(cind2.iter())
        .copied()
        .collect();
    if !is_permutation(&all, a.ndim()) {
        return Err(TensorOpsError::invalid_indices(format!(
            "selections {:?}/{:?} with trace pairs {:?}/{:?} do not permute the {} axes",
            left,
            right,
            cind1,
            cind2,
            a.ndim()
        )));
    }
    let ind_c: Vec<usize> = left.iter().chain(right.iter()).copied().collect();
    if c.ndim() != ind_c.len() {
        return Err(TensorOpsError::invalid_indices(format!(
            "destination rank {} does not match {} open axes",
            c.ndim(),
            ind_c.len()
        )));
    }
    for (k, &p) in ind_c.iter().enumerate() {
        if c.shape()[k] != a.shape()[p] {
            return Err(TensorOpsError::DimensionMismatch {
                expected: a.shape()[p],
                actual: c.shape()[k],
            });
        }
    }
    for (&p1, &p2) in cind1.iter().zip(cind2.iter()) {
        if a.shape()[p1] != a.shape()[p2] {
            return Err(TensorOpsError::DimensionMismatch {
                expected: a.shape()[p1],
                actual: a.shape()[p2],
            });
        }
    }

    // Synthetic view: (shape(C)..., trace sizes...) where each trailing
    // axis advances both members of its pair at once.
    let mut dims: Dims = SmallVec::new();
    let mut strides: Dims = SmallVec::new();
    for &p in &ind_c {
        dims.push(a.shape()[p]);
        strides.push(a.strides()[p]);
    }
    for (&p1, &p2) in cind1.iter().zip(cind2.iter()) {
        dims.push(a.shape()[p1]);
        strides.push(a.strides()[p1] + a.strides()[p2]);
    }
    let src = StridedView::new(a.data(), dims, strides, 0, conj_a.conjugates());
    let mut dst = StridedViewMut::of_tensor(c);
    reduce_into(alpha, &src, beta, &mut dst)
}
