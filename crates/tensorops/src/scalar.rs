//! Scalar trait for tensor element types.

use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

pub use faer::{c32, c64};

/// Trait for element types supported by the contraction kernels.
///
/// Covers the GEMM-capable floats (`f32`, `f64`, `c32`, `c64`) as well as
/// integer types, which always run on the native strided-reduction path.
/// Whether a type is eligible for the GEMM path is decided separately, in
/// [`crate::blas::is_blas_scalar`].
pub trait Scalar:
    Copy
    + Debug
    + Default
    + PartialEq
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    /// The real type associated with this scalar.
    type Real: Scalar;

    /// Returns the additive identity (zero).
    fn zero() -> Self {
        Self::default()
    }

    /// Returns the multiplicative identity (one).
    fn one() -> Self;

    /// Complex conjugate; identity for real and integer types.
    fn conj(self) -> Self;

    /// Convert a floating-point literal to this type.
    ///
    /// Used by the compiler runtime to inject numeric literals from
    /// compiled programs.
    fn from_f64(x: f64) -> Self;
}

impl Scalar for f64 {
    type Real = f64;

    fn one() -> Self {
        1.0
    }

    fn conj(self) -> Self {
        self
    }

    fn from_f64(x: f64) -> Self {
        x
    }
}

impl Scalar for f32 {
    type Real = f32;

    fn one() -> Self {
        1.0
    }

    fn conj(self) -> Self {
        self
    }

    fn from_f64(x: f64) -> Self {
        x as f32
    }
}

impl Scalar for c64 {
    type Real = f64;

    fn one() -> Self {
        c64::new(1.0, 0.0)
    }

    fn conj(self) -> Self {
        c64::new(self.re, -self.im)
    }

    fn from_f64(x: f64) -> Self {
        c64::new(x, 0.0)
    }
}

impl Scalar for c32 {
    type Real = f32;

    fn one() -> Self {
        c32::new(1.0, 0.0)
    }

    fn conj(self) -> Self {
        c32::new(self.re, -self.im)
    }

    fn from_f64(x: f64) -> Self {
        c32::new(x as f32, 0.0)
    }
}

impl Scalar for i64 {
    type Real = i64;

    fn one() -> Self {
        1
    }

    fn conj(self) -> Self {
        self
    }

    fn from_f64(x: f64) -> Self {
        x as i64
    }
}

impl Scalar for i32 {
    type Real = i32;

    fn one() -> Self {
        1
    }

    fn conj(self) -> Self {
        self
    }

    fn from_f64(x: f64) -> Self {
        x as i32
    }
}
