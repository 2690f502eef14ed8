//! faer-backed GEMM for the contraction kernels.
//!
//! The kernels are generic over [`Scalar`], which includes integer types,
//! while faer's matmul is only instantiated for the four float types. The
//! bridge is a `TypeId` dispatch: [`mul_into`] recognizes `f32`, `f64`,
//! `c32` and `c64` slices, reinterprets them at their concrete type and
//! calls `matmul_with_conj`; for every other element type it reports
//! "not handled" and the caller falls back to the native reduction.

use std::any::TypeId;
use std::sync::atomic::{AtomicBool, Ordering};

use faer::linalg::matmul::matmul_with_conj;
use faer::{Accum, Conj as FaerConj, MatMut, MatRef, Par};

use crate::scalar::{c32, c64, Scalar};

static BLAS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Enable the GEMM path (the default).
pub fn enable_blas() {
    BLAS_ENABLED.store(true, Ordering::Relaxed);
}

/// Disable the GEMM path; all contractions run the native reduction.
pub fn disable_blas() {
    BLAS_ENABLED.store(false, Ordering::Relaxed);
}

/// Whether the GEMM path is enabled.
pub fn blas_enabled() -> bool {
    BLAS_ENABLED.load(Ordering::Relaxed)
}

/// Whether faer GEMM kernels exist for this element type.
pub fn is_blas_scalar<T: Scalar>() -> bool {
    let id = TypeId::of::<T>();
    id == TypeId::of::<f32>()
        || id == TypeId::of::<f64>()
        || id == TypeId::of::<c32>()
        || id == TypeId::of::<c64>()
}

/// A matrix operand for [`mul_into`]: a column-major buffer with logical
/// dimensions `(rows, cols)`. When `trans` is set, the buffer holds the
/// `(cols, rows)` matrix and is used transposed.
pub struct GemmOperand<'a, T> {
    pub data: &'a [T],
    pub rows: usize,
    pub cols: usize,
    pub trans: bool,
    pub conj: bool,
}

impl<'a, T> GemmOperand<'a, T> {
    fn cast<U: 'static>(&self) -> GemmOperand<'a, U>
    where
        T: 'static,
    {
        debug_assert_eq!(TypeId::of::<T>(), TypeId::of::<U>());
        GemmOperand {
            // SAFETY: caller checked that T and U are the same type.
            data: unsafe { std::mem::transmute::<&[T], &[U]>(self.data) },
            rows: self.rows,
            cols: self.cols,
            trans: self.trans,
            conj: self.conj,
        }
    }
}

/// `C ← β·C + α·op(A)·op(B)` on a contiguous column-major `(m, n)` buffer.
///
/// Returns `false` without touching `c` when the element type has no GEMM
/// kernel.
pub fn mul_into<T: Scalar>(
    alpha: T,
    a: &GemmOperand<'_, T>,
    b: &GemmOperand<'_, T>,
    beta: T,
    c: &mut [T],
    m: usize,
    n: usize,
) -> bool {
    let id = TypeId::of::<T>();
    if id == TypeId::of::<f32>() {
        // SAFETY: T is f32.
        let c32_slice = unsafe { std::mem::transmute::<&mut [T], &mut [f32]>(c) };
        mul_concrete::<f32>(
            cast_scalar(alpha),
            &a.cast(),
            &b.cast(),
            cast_scalar(beta),
            c32_slice,
            m,
            n,
        );
        true
    } else if id == TypeId::of::<f64>() {
        // SAFETY: T is f64.
        let cs = unsafe { std::mem::transmute::<&mut [T], &mut [f64]>(c) };
        mul_concrete::<f64>(
            cast_scalar(alpha),
            &a.cast(),
            &b.cast(),
            cast_scalar(beta),
            cs,
            m,
            n,
        );
        true
    } else if id == TypeId::of::<c32>() {
        // SAFETY: T is c32.
        let cs = unsafe { std::mem::transmute::<&mut [T], &mut [c32]>(c) };
        mul_concrete::<c32>(
            cast_scalar(alpha),
            &a.cast(),
            &b.cast(),
            cast_scalar(beta),
            cs,
            m,
            n,
        );
        true
    } else if id == TypeId::of::<c64>() {
        // SAFETY: T is c64.
        let cs = unsafe { std::mem::transmute::<&mut [T], &mut [c64]>(c) };
        mul_concrete::<c64>(
            cast_scalar(alpha),
            &a.cast(),
            &b.cast(),
            cast_scalar(beta),
            cs,
            m,
            n,
        );
        true
    } else {
        false
    }
}

fn cast_scalar<T: 'static, U: Copy + 'static>(x: T) -> U {
    debug_assert_eq!(TypeId::of::<T>(), TypeId::of::<U>());
    // SAFETY: caller checked that T and U are the same type.
    unsafe { std::mem::transmute_copy::<T, U>(&x) }
}

fn mul_concrete<T: Scalar + faer_traits::ComplexField>(
    alpha: T,
    a: &GemmOperand<'_, T>,
    b: &GemmOperand<'_, T>,
    beta: T,
    c: &mut [T],
    m: usize,
    n: usize,
) {
    let a_mat = operand_mat(a);
    let b_mat = operand_mat(b);

    // β folding: 0 overwrites, 1 accumulates, anything else rescales the
    // destination first and then accumulates.
    let accum = if beta == T::zero() {
        Accum::Replace
    } else {
        if beta != T::one() {
            for x in c.iter_mut() {
                *x = beta * *x;
            }
        }
        Accum::Add
    };

    let c_mat = MatMut::from_column_major_slice_mut(c, m, n);
    matmul_with_conj(
        c_mat,
        accum,
        a_mat,
        faer_conj(a.conj),
        b_mat,
        faer_conj(b.conj),
        alpha,
        Par::Seq,
    );
}

fn operand_mat<'a, T: faer_traits::ComplexField>(op: &GemmOperand<'a, T>) -> MatRef<'a, T> {
    if op.trans {
        MatRef::from_column_major_slice(op.data, op.cols, op.rows).transpose()
    } else {
        MatRef::from_column_major_slice(op.data, op.rows, op.cols)
    }
}

fn faer_conj(conj: bool) -> FaerConj {
    if conj {
        FaerConj::Yes
    } else {
        FaerConj::No
    }
}
