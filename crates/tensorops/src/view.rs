//! Strided views over tensor storage.
//!
//! A [`StridedView`] is a descriptor (dims, strides, offset, elementwise op)
//! over a borrowed buffer. Views are how the kernels express permutations,
//! diagonal-strided partial traces and broadcast padding without copying:
//! a permuted view reorders dims and strides, a trace view adds the strides
//! of the two paired axes, and a broadcast axis has size ≥ 1 with stride 0.
//!
//! The only elementwise ops are identity and complex conjugation, applied
//! on read.
//!
//! The destructive reductions at the bottom of this module
//! ([`axpby_into`], [`reduce_into`], [`reduce_pair_into`]) implement the
//! `C ← β·C + α·…` accumulation with the usual special cases: `β = 0`
//! overwrites (so uninitialized destinations are never read), `β = 1`
//! accumulates, anything else rescales the destination first.

use smallvec::SmallVec;

use crate::error::TensorOpsError;
use crate::scalar::Scalar;
use crate::strides::linear_to_cartesian;
use crate::tensor::Tensor;

/// Inline buffer for dims and strides; ranks above 8 spill to the heap.
pub type Dims = SmallVec<[usize; 8]>;

/// A read-only strided view with an optional conjugation op.
pub struct StridedView<'a, T: Scalar> {
    data: &'a [T],
    dims: Dims,
    strides: Dims,
    offset: usize,
    conj: bool,
}

impl<'a, T: Scalar> StridedView<'a, T> {
    /// Build a view from raw parts.
    pub fn new(data: &'a [T], dims: Dims, strides: Dims, offset: usize, conj: bool) -> Self {
        Self {
            data,
            dims,
            strides,
            offset,
            conj,
        }
    }

    /// Full view of a tensor.
    pub fn of_tensor(t: &'a Tensor<T>, conj: bool) -> Self {
        Self {
            data: t.data(),
            dims: Dims::from_slice(t.shape()),
            strides: Dims::from_slice(t.strides()),
            offset: 0,
            conj,
        }
    }

    /// View of a tensor with its axes reordered by `sel`: axis `k` of the
    /// view is axis `sel[k]` of the tensor.
    pub fn permuted(t: &'a Tensor<T>, sel: &[usize], conj: bool) -> Self {
        let dims: Dims = sel.iter().map(|&p| t.shape()[p]).collect();
        let strides: Dims = sel.iter().map(|&p| t.strides()[p]).collect();
        Self {
            data: t.data(),
            dims,
            strides,
            offset: 0,
            conj,
        }
    }

    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    #[inline]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn is_conj(&self) -> bool {
        self.conj
    }

    /// Number of elements addressed by the view; 1 for rank 0.
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dims.iter().any(|&d| d == 0)
    }

    /// Reinterpret the view with a new shape, without copying.
    ///
    /// Succeeds iff every axis of `new_dims` can be carved out of a run of
    /// old axes whose strides fuse (`d_{i+1} == s_i · d_i`). Returns `None`
    /// when the strides do not permit it.
    pub fn sreshape(&self, new_dims: &[usize]) -> Option<StridedView<'a, T>> {
        let new_len: usize = new_dims.iter().product();
        if new_len != self.len() {
            return None;
        }
        let mut new_strides: Dims = Dims::new();
        let mut old = self
            .dims
            .iter()
            .copied()
            .zip(self.strides.iter().copied())
            .filter(|&(d, _)| d != 1)
            .collect::<Vec<_>>()
            .into_iter()
            .peekable();
        for &nd in new_dims {
            if nd == 1 {
                new_strides.push(0);
                continue;
            }
            let (mut size, stride) = match old.next() {
                Some((d, s)) => (d, s),
                None => return None,
            };
            while size < nd {
                match old.peek() {
                    Some(&(d, s)) if s == size * stride => {
                        size *= d;
                        old.next();
                    }
                    _ => return None,
                }
            }
            if size != nd {
                return None;
            }
            new_strides.push(stride);
        }
        if old.next().is_some() {
            return None;
        }
        Some(StridedView {
            data: self.data,
            dims: Dims::from_slice(new_dims),
            strides: new_strides,
            offset: self.offset,
            conj: self.conj,
        })
    }

    /// Read the element at the given cartesian position, applying the
    /// elementwise op.
    #[inline]
    fn load(&self, cart: &[usize]) -> T {
        let mut off = self.offset;
        for (&i, &s) in cart.iter().zip(self.strides.iter()) {
            off += i * s;
        }
        let v = self.data[off];
        if self.conj {
            v.conj()
        } else {
            v
        }
    }
}

/// A mutable strided view; the destination side of the reductions.
///
/// Destinations carry no elementwise op.
pub struct StridedViewMut<'a, T: Scalar> {
    data: &'a mut [T],
    dims: Dims,
    strides: Dims,
    offset: usize,
}

impl<'a, T: Scalar> StridedViewMut<'a, T> {
    pub fn new(data: &'a mut [T], dims: Dims, strides: Dims, offset: usize) -> Self {
        Self {
            data,
            dims,
            strides,
            offset,
        }
    }

    /// Full mutable view of a tensor.
    pub fn of_tensor(t: &'a mut Tensor<T>) -> Self {
        let dims = Dims::from_slice(t.shape());
        let strides = Dims::from_slice(t.strides());
        Self {
            data: t.data_mut(),
            dims,
            strides,
            offset: 0,
        }
    }

    /// Mutable view of a tensor with its axes reordered by `sel`.
    pub fn permuted(t: &'a mut Tensor<T>, sel: &[usize]) -> Self {
        let dims: Dims = sel.iter().map(|&p| t.shape()[p]).collect();
        let strides: Dims = sel.iter().map(|&p| t.strides()[p]).collect();
        Self {
            data: t.data_mut(),
            dims,
            strides,
            offset: 0,
        }
    }

    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    #[inline]
    fn linear_offset(&self, cart: &[usize]) -> usize {
        let mut off = self.offset;
        for (&i, &s) in cart.iter().zip(self.strides.iter()) {
            off += i * s;
        }
        off
    }
}

fn check_same_dims<T: Scalar>(
    src: &[usize],
    dst: &StridedViewMut<'_, T>,
) -> Result<(), TensorOpsError> {
    if src != dst.dims() {
        return Err(TensorOpsError::DimensionMismatch {
            expected: dst.dims().iter().product::<usize>().max(1),
            actual: src.iter().product::<usize>().max(1),
        });
    }
    Ok(())
}

/// `dst ← β·dst + α·src` over equally-shaped views.
///
/// This is the `axpby!` binding of the kernel layer; `β = 0` never reads
/// the destination, so it is safe on uninitialized output buffers.
pub fn axpby_into<T: Scalar>(
    alpha: T,
    src: &StridedView<'_, T>,
    beta: T,
    dst: &mut StridedViewMut<'_, T>,
) -> Result<(), TensorOpsError> {
    check_same_dims(src.dims(), dst)?;
    let total: usize = dst.dims.iter().product();
    let dims: Vec<usize> = dst.dims.to_vec();
    for linear in 0..total {
        let cart = linear_to_cartesian(linear, &dims);
        let x = alpha * src.load(&cart);
        let off = dst.linear_offset(&cart);
        dst.data[off] = accumulate(beta, dst.data[off], x);
    }
    Ok(())
}

/// `dst ← β·dst + α·Σ src` where `src` has the destination dims followed by
/// trailing axes that are summed over.
///
/// This is the destructive `mapreducedim` used by the trace kernel: the
/// trailing axes of a trace view walk the matched diagonals.
pub fn reduce_into<T: Scalar>(
    alpha: T,
    src: &StridedView<'_, T>,
    beta: T,
    dst: &mut StridedViewMut<'_, T>,
) -> Result<(), TensorOpsError> {
    let n_open = dst.dims.len();
    if src.dims().len() < n_open {
        return Err(TensorOpsError::DimensionMismatch {
            expected: n_open,
            actual: src.dims().len(),
        });
    }
    check_same_dims(&src.dims()[..n_open], dst)?;

    let open_dims: Vec<usize> = src.dims()[..n_open].to_vec();
    let tail_dims: Vec<usize> = src.dims()[n_open..].to_vec();
    let open_total: usize = open_dims.iter().product::<usize>().max(1);
    let tail_total: usize = tail_dims.iter().product::<usize>().max(1);
    if open_dims.iter().any(|&d| d == 0) {
        return Ok(());
    }
    let tail_empty = tail_dims.iter().any(|&d| d == 0);

    let mut cart = vec![0usize; src.dims().len()];
    for open_linear in 0..open_total {
        let open_cart = linear_to_cartesian(open_linear, &open_dims);
        cart[..n_open].copy_from_slice(&open_cart);

        let mut sum = T::zero();
        if !tail_empty {
            for tail_linear in 0..tail_total {
                let tail_cart = linear_to_cartesian(tail_linear, &tail_dims);
                cart[n_open..].copy_from_slice(&tail_cart);
                sum = sum + src.load(&cart);
            }
        }
        let off = dst.linear_offset(&open_cart);
        dst.data[off] = accumulate(beta, dst.data[off], alpha * sum);
    }
    Ok(())
}

/// `dst ← β·dst + α·Σ a·b` over a shared shape `(dst dims..., trailing...)`.
///
/// `a` and `b` must both carry the full shared shape (broadcast axes with
/// stride 0 where an operand does not own the axis). The native contraction
/// path reduces through this.
pub fn reduce_pair_into<T: Scalar>(
    alpha: T,
    a: &StridedView<'_, T>,
    b: &StridedView<'_, T>,
    beta: T,
    dst: &mut StridedViewMut<'_, T>,
) -> Result<(), TensorOpsError> {
    if a.dims() != b.dims() {
        return Err(TensorOpsError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    let n_open = dst.dims.len();
    if a.dims().len() < n_open {
        return Err(TensorOpsError::DimensionMismatch {
            expected: n_open,
            actual: a.dims().len(),
        });
    }
    check_same_dims(&a.dims()[..n_open], dst)?;

    let open_dims: Vec<usize> = a.dims()[..n_open].to_vec();
    let tail_dims: Vec<usize> = a.dims()[n_open..].to_vec();
    let open_total: usize = open_dims.iter().product::<usize>().max(1);
    let tail_total: usize = tail_dims.iter().product::<usize>().max(1);
    if open_dims.iter().any(|&d| d == 0) {
        return Ok(());
    }
    let tail_empty = tail_dims.iter().any(|&d| d == 0);

    let mut cart = vec![0usize; a.dims().len()];
    for open_linear in 0..open_total {
        let open_cart = linear_to_cartesian(open_linear, &open_dims);
        cart[..n_open].copy_from_slice(&open_cart);

        let mut sum = T::zero();
        if !tail_empty {
            for tail_linear in 0..tail_total {
                let tail_cart = linear_to_cartesian(tail_linear, &tail_dims);
                cart[n_open..].copy_from_slice(&tail_cart);
                sum = sum + a.load(&cart) * b.load(&cart);
            }
        }
        let off = dst.linear_offset(&open_cart);
        dst.data[off] = accumulate(beta, dst.data[off], alpha * sum);
    }
    Ok(())
}

/// Fold a new contribution into a destination element under `β`.
#[inline]
fn accumulate<T: Scalar>(beta: T, old: T, contribution: T) -> T {
    if beta == T::zero() {
        contribution
    } else if beta == T::one() {
        old + contribution
    } else {
        beta * old + contribution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalar::c64;

    #[test]
    fn test_permuted_view_reads_transpose() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        let v = StridedView::permuted(&t, &[1, 0], false);
        assert_eq!(v.dims(), &[3, 2]);
        assert_eq!(v.load(&[2, 1]), *t.get(&[1, 2]).unwrap());
    }

    #[test]
    fn test_conj_view() {
        let t = Tensor::from_vec(vec![c64::new(1.0, 2.0)], &[1]).unwrap();
        let v = StridedView::of_tensor(&t, true);
        assert_eq!(v.load(&[0]), c64::new(1.0, -2.0));
    }

    #[test]
    fn test_axpby_overwrite_and_accumulate() {
        let src = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
        let mut dst = Tensor::from_vec(vec![10.0, 10.0, 10.0, 10.0], &[2, 2]).unwrap();

        let v = StridedView::of_tensor(&src, false);
        axpby_into(2.0, &v, 0.0, &mut StridedViewMut::of_tensor(&mut dst)).unwrap();
        assert_eq!(dst.data(), &[2.0, 4.0, 6.0, 8.0]);

        let v = StridedView::of_tensor(&src, false);
        axpby_into(1.0, &v, 1.0, &mut StridedViewMut::of_tensor(&mut dst)).unwrap();
        assert_eq!(dst.data(), &[3.0, 6.0, 9.0, 12.0]);

        let v = StridedView::of_tensor(&src, false);
        axpby_into(1.0, &v, -1.0, &mut StridedViewMut::of_tensor(&mut dst)).unwrap();
        assert_eq!(dst.data(), &[-2.0, -4.0, -6.0, -8.0]);
    }

    #[test]
    fn test_axpby_shape_mismatch() {
        let src: Tensor<f64> = Tensor::zeros(&[2, 2]);
        let mut dst: Tensor<f64> = Tensor::zeros(&[2, 3]);
        let v = StridedView::of_tensor(&src, false);
        let result = axpby_into(1.0, &v, 0.0, &mut StridedViewMut::of_tensor(&mut dst));
        assert!(result.is_err());
    }

    #[test]
    fn test_reduce_trailing_axis() {
        // src dims (2, 3): reduce the trailing axis into a length-2 vector.
        let src = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        let mut dst: Tensor<f64> = Tensor::zeros(&[2]);
        let v = StridedView::of_tensor(&src, false);
        reduce_into(1.0, &v, 0.0, &mut StridedViewMut::of_tensor(&mut dst)).unwrap();
        // row sums in column-major: [1+3+5, 2+4+6]
        assert_eq!(dst.data(), &[9.0, 12.0]);
    }

    #[test]
    fn test_reduce_zero_size_tail_applies_beta() {
        let src: Tensor<f64> = Tensor::zeros(&[2, 0]);
        let mut dst = Tensor::from_vec(vec![5.0, 7.0], &[2]).unwrap();
        let v = StridedView::of_tensor(&src, false);
        reduce_into(1.0, &v, 2.0, &mut StridedViewMut::of_tensor(&mut dst)).unwrap();
        assert_eq!(dst.data(), &[10.0, 14.0]);
    }

    #[test]
    fn test_sreshape_contiguous() {
        let t: Tensor<f64> = Tensor::zeros(&[2, 3, 4]);
        let v = StridedView::of_tensor(&t, false);
        let r = v.sreshape(&[6, 4]).unwrap();
        assert_eq!(r.dims(), &[6, 4]);
        assert_eq!(r.strides(), &[1, 6]);
        assert!(v.sreshape(&[4, 6]).is_some());
        assert!(v.sreshape(&[5, 5]).is_none());
    }

    #[test]
    fn test_sreshape_permuted_fails() {
        let t: Tensor<f64> = Tensor::zeros(&[2, 3]);
        let v = StridedView::permuted(&t, &[1, 0], false);
        assert!(v.sreshape(&[6]).is_none());
    }
}
