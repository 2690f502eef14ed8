//! Random tensor construction.
//!
//! Test suites and benchmarks build inputs through these constructors;
//! the `_with_rng` variants take a seeded generator for reproducibility.

use rand::distr::StandardUniform;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::scalar::{c64, Scalar};
use crate::tensor::Tensor;

/// Element types samplable from the uniform distribution on [0, 1).
pub trait RandomUniform: Scalar {
    fn sample_uniform<R: Rng>(rng: &mut R) -> Self;
}

impl RandomUniform for f64 {
    fn sample_uniform<R: Rng>(rng: &mut R) -> Self {
        rng.sample(StandardUniform)
    }
}

impl RandomUniform for c64 {
    fn sample_uniform<R: Rng>(rng: &mut R) -> Self {
        c64::new(rng.sample(StandardUniform), rng.sample(StandardUniform))
    }
}

impl RandomUniform for i64 {
    fn sample_uniform<R: Rng>(rng: &mut R) -> Self {
        rng.random_range(0..10)
    }
}

/// Element types samplable from the standard normal distribution.
pub trait RandomNormal: Scalar {
    fn sample_normal<R: Rng>(rng: &mut R) -> Self;
}

impl RandomNormal for f64 {
    fn sample_normal<R: Rng>(rng: &mut R) -> Self {
        rng.sample(StandardNormal)
    }
}

impl RandomNormal for c64 {
    fn sample_normal<R: Rng>(rng: &mut R) -> Self {
        // Independent N(0, 1/2) parts so |z|² has unit mean.
        let scale = std::f64::consts::FRAC_1_SQRT_2;
        c64::new(
            rng.sample::<f64, _>(StandardNormal) * scale,
            rng.sample::<f64, _>(StandardNormal) * scale,
        )
    }
}

impl<T: RandomUniform> Tensor<T> {
    /// Tensor with uniform random entries.
    pub fn random(shape: &[usize]) -> Self {
        Self::random_with_rng(shape, &mut rand::rng())
    }

    /// Tensor with uniform random entries from a caller-supplied RNG.
    ///
    /// # Examples
    ///
    /// ```
    /// use rand::rngs::StdRng;
    /// use rand::SeedableRng;
    /// use tensorops::Tensor;
    ///
    /// let mut rng = StdRng::seed_from_u64(42);
    /// let t1: Tensor<f64> = Tensor::random_with_rng(&[2, 3], &mut rng);
    /// let mut rng = StdRng::seed_from_u64(42);
    /// let t2: Tensor<f64> = Tensor::random_with_rng(&[2, 3], &mut rng);
    /// assert_eq!(t1.data(), t2.data());
    /// ```
    pub fn random_with_rng<R: Rng>(shape: &[usize], rng: &mut R) -> Self {
        let len: usize = shape.iter().product();
        let data: Vec<T> = (0..len).map(|_| T::sample_uniform(rng)).collect();
        Self::from_vec(data, shape).expect("shape and data length match")
    }
}

impl<T: RandomNormal> Tensor<T> {
    /// Tensor with standard normal random entries.
    pub fn randn(shape: &[usize]) -> Self {
        Self::randn_with_rng(shape, &mut rand::rng())
    }

    /// Tensor with standard normal random entries from a caller-supplied
    /// RNG.
    pub fn randn_with_rng<R: Rng>(shape: &[usize], rng: &mut R) -> Self {
        let len: usize = shape.iter().product();
        let data: Vec<T> = (0..len).map(|_| T::sample_normal(rng)).collect();
        Self::from_vec(data, shape).expect("shape and data length match")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_f64_bounds() {
        let t: Tensor<f64> = Tensor::random(&[2, 3]);
        assert_eq!(t.shape(), &[2, 3]);
        for i in 0..t.len() {
            let v = *t.get_linear(i).unwrap();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn test_random_reproducible() {
        let mut rng1 = StdRng::seed_from_u64(12345);
        let t1: Tensor<f64> = Tensor::random_with_rng(&[3, 4], &mut rng1);
        let mut rng2 = StdRng::seed_from_u64(12345);
        let t2: Tensor<f64> = Tensor::random_with_rng(&[3, 4], &mut rng2);
        assert_eq!(t1.data(), t2.data());
    }

    #[test]
    fn test_randn_c64_magnitude() {
        let mut rng = StdRng::seed_from_u64(7);
        let t: Tensor<c64> = Tensor::randn_with_rng(&[200], &mut rng);
        let mean_sq: f64 = t.data().iter().map(|z| z.re * z.re + z.im * z.im).sum::<f64>() / 200.0;
        assert!(mean_sq > 0.5 && mean_sq < 1.5, "mean |z|² = {}", mean_sq);
    }

    #[test]
    fn test_random_integer_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let t: Tensor<i64> = Tensor::random_with_rng(&[50], &mut rng);
        assert!(t.data().iter().all(|&x| (0..10).contains(&x)));
    }
}
