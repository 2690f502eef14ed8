//! Axis-fusion analysis for the GEMM path.
//!
//! A group of axes can be collapsed into a single logical axis when each
//! stride is the previous stride times the previous size. The `contract`
//! kernel fuses its open and contracted axis groups this way to reinterpret
//! an operand as a 2-D matrix without copying; when fusion fails, the
//! operand is repacked through a temporary first.

use crate::blas::is_blas_scalar;
use crate::scalar::Scalar;
use crate::tensor::Tensor;

/// Outcome of fusing one axis group: total size and leading stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fused {
    pub fusable: bool,
    pub size: usize,
    pub stride: usize,
}

/// Decide whether the axes described by `(sizes, strides)` collapse into
/// one contiguous-in-stride axis.
///
/// Size-0 groups fuse trivially; size-1 axes are skipped; the remaining
/// adjacent axes must satisfy `stride[i+1] == size[i] * stride[i]`. An
/// empty group fuses to size 1 with leading stride 1.
pub fn canfuse(sizes: &[usize], strides: &[usize]) -> Fused {
    if sizes.contains(&0) {
        return Fused {
            fusable: true,
            size: 0,
            stride: 1,
        };
    }
    let mut total = 1usize;
    let mut leading = 1usize;
    let mut prev: Option<(usize, usize)> = None;
    for (&s, &d) in sizes.iter().zip(strides.iter()) {
        if s == 1 {
            continue;
        }
        match prev {
            None => {
                leading = d;
            }
            Some((ps, pd)) => {
                if d != ps * pd {
                    return Fused {
                        fusable: false,
                        size: 0,
                        stride: 0,
                    };
                }
            }
        }
        total *= s;
        prev = Some((s, d));
    }
    Fused {
        fusable: true,
        size: total,
        stride: leading,
    }
}

/// The part an operand plays in a GEMM call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlasRole {
    /// The output matrix: identity elementwise op, row group contiguous.
    Destination,
    /// A source without conjugation: either orientation may be contiguous.
    PlainSource,
    /// A conjugated source: transposed orientation required.
    ConjSource,
}

/// Whether the axis groups `p1`/`p2` of `t` can feed a GEMM call directly
/// in the given role.
pub fn is_blas_contractable<T: Scalar>(
    t: &Tensor<T>,
    conj: bool,
    p1: &[usize],
    p2: &[usize],
    role: BlasRole,
) -> bool {
    if !is_blas_scalar::<T>() {
        return false;
    }
    let sizes1: Vec<usize> = p1.iter().map(|&p| t.shape()[p]).collect();
    let strides1: Vec<usize> = p1.iter().map(|&p| t.strides()[p]).collect();
    let sizes2: Vec<usize> = p2.iter().map(|&p| t.shape()[p]).collect();
    let strides2: Vec<usize> = p2.iter().map(|&p| t.strides()[p]).collect();
    let f1 = canfuse(&sizes1, &strides1);
    let f2 = canfuse(&sizes2, &strides2);
    if !f1.fusable || !f2.fusable {
        return false;
    }
    match role {
        BlasRole::Destination => !conj && f1.stride == 1,
        BlasRole::ConjSource => f2.stride == 1,
        BlasRole::PlainSource => f1.stride == 1 || f2.stride == 1,
    }
}
