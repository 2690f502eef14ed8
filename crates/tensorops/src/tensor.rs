//! Dense n-dimensional tensor type.

use crate::error::TensorOpsError;
use crate::kernels::{add, Conj};
use crate::scalar::Scalar;
use crate::strides::{cartesian_to_linear, compute_strides, is_permutation};

/// A dense n-dimensional tensor with column-major storage.
///
/// A rank-0 tensor (empty shape) holds exactly one element and is how the
/// kernels represent scalar outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T: Scalar> {
    data: Vec<T>,
    shape: Vec<usize>,
    strides: Vec<usize>,
}

impl<T: Scalar> Tensor<T> {
    /// Create a new tensor with the given shape, zero-initialized.
    ///
    /// # Examples
    ///
    /// ```
    /// use tensorops::Tensor;
    ///
    /// let t: Tensor<f64> = Tensor::zeros(&[2, 3, 4]);
    /// assert_eq!(t.shape(), &[2, 3, 4]);
    /// assert_eq!(t.len(), 24);
    /// ```
    pub fn zeros(shape: &[usize]) -> Self {
        // Empty shape is a rank-0 scalar holding one element; a zero-size
        // axis yields an empty tensor.
        let len: usize = shape.iter().product();
        Self {
            data: vec![T::zero(); len],
            shape: shape.to_vec(),
            strides: compute_strides(shape),
        }
    }

    /// Create a tensor filled with ones.
    pub fn ones(shape: &[usize]) -> Self {
        let mut t = Self::zeros(shape);
        t.fill(T::one());
        t
    }

    /// Create a tensor from data in column-major order.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the data length does not match the
    /// shape.
    ///
    /// # Examples
    ///
    /// ```
    /// use tensorops::Tensor;
    ///
    /// let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
    /// assert_eq!(t.get(&[1, 0]), Some(&2.0)); // column-major
    /// assert_eq!(t.get(&[0, 1]), Some(&3.0));
    /// ```
    pub fn from_vec(data: Vec<T>, shape: &[usize]) -> Result<Self, TensorOpsError> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(TensorOpsError::DimensionMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            shape: shape.to_vec(),
            strides: compute_strides(shape),
        })
    }

    /// Create a rank-0 tensor holding a single value.
    pub fn from_scalar(value: T) -> Self {
        Self {
            data: vec![value],
            shape: Vec::new(),
            strides: Vec::new(),
        }
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Rank (number of axes).
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of stored elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Get element by linear index.
    #[inline]
    pub fn get_linear(&self, i: usize) -> Option<&T> {
        self.data.get(i)
    }

    /// Get element by cartesian indices.
    ///
    /// Returns `None` for out-of-bounds or a wrong number of indices.
    pub fn get(&self, indices: &[usize]) -> Option<&T> {
        if indices.len() != self.ndim() {
            return None;
        }
        for (&i, &d) in indices.iter().zip(self.shape.iter()) {
            if i >= d {
                return None;
            }
        }
        self.data.get(cartesian_to_linear(indices, &self.strides))
    }

    /// Set element by cartesian indices.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the indices are out of bounds or the
    /// wrong number of indices is given.
    pub fn set(&mut self, indices: &[usize], value: T) -> Result<(), TensorOpsError> {
        if indices.len() != self.ndim() {
            return Err(TensorOpsError::DimensionMismatch {
                expected: self.ndim(),
                actual: indices.len(),
            });
        }
        for (&i, &d) in indices.iter().zip(self.shape.iter()) {
            if i >= d {
                return Err(TensorOpsError::DimensionMismatch {
                    expected: d,
                    actual: i,
                });
            }
        }
        let linear = cartesian_to_linear(indices, &self.strides);
        self.data[linear] = value;
        Ok(())
    }

    /// Fill all elements with a value.
    pub fn fill(&mut self, value: T) {
        for x in &mut self.data {
            *x = value;
        }
    }

    /// The single element of a rank-0 (or single-element) tensor.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the tensor has more than one element.
    pub fn scalar_value(&self) -> Result<T, TensorOpsError> {
        if self.data.len() != 1 {
            return Err(TensorOpsError::DimensionMismatch {
                expected: 1,
                actual: self.data.len(),
            });
        }
        Ok(self.data[0])
    }

    /// Permute the axes, returning a new tensor.
    ///
    /// `perm[k]` gives the source axis for the k-th axis of the result.
    /// Implemented on top of the [`add`] kernel.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIndices` if `perm` is not a permutation of `0..ndim`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tensorops::Tensor;
    ///
    /// let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
    /// let p = t.permutedims(&[1, 0]).unwrap();
    /// assert_eq!(p.shape(), &[3, 2]);
    /// assert_eq!(t.get(&[1, 2]), p.get(&[2, 1]));
    /// ```
    pub fn permutedims(&self, perm: &[usize]) -> Result<Self, TensorOpsError> {
        if !is_permutation(perm, self.ndim()) {
            return Err(TensorOpsError::invalid_indices(format!(
                "{:?} is not a permutation of 0..{}",
                perm,
                self.ndim()
            )));
        }
        let new_shape: Vec<usize> = perm.iter().map(|&p| self.shape[p]).collect();
        let mut out = Tensor::zeros(&new_shape);
        add(T::one(), self, Conj::Plain, T::zero(), &mut out, perm, &[])?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalar::c64;

    fn test_zeros_generic<T: Scalar>() {
        let t: Tensor<T> = Tensor::zeros(&[2, 3]);
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.ndim(), 2);
        assert_eq!(t.len(), 6);
        assert_eq!(t.strides(), &[1, 2]);
        for i in 0..6 {
            assert_eq!(*t.get_linear(i).unwrap(), T::zero());
        }
    }

    #[test]
    fn test_zeros_f64() {
        test_zeros_generic::<f64>();
    }

    #[test]
    fn test_zeros_c64() {
        test_zeros_generic::<c64>();
    }

    #[test]
    fn test_zeros_i64() {
        test_zeros_generic::<i64>();
    }

    #[test]
    fn test_from_vec_column_major() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        assert_eq!(t.get(&[0, 0]), Some(&1.0));
        assert_eq!(t.get(&[1, 0]), Some(&2.0));
        assert_eq!(t.get(&[0, 1]), Some(&3.0));
        assert_eq!(t.get(&[1, 2]), Some(&6.0));
    }

    #[test]
    fn test_from_vec_length_mismatch() {
        let result = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[2, 3]);
        assert!(result.is_err());
    }

    #[test]
    fn test_get_out_of_bounds() {
        let t: Tensor<f64> = Tensor::zeros(&[2, 3]);
        assert_eq!(t.get(&[2, 0]), None);
        assert_eq!(t.get(&[0, 3]), None);
        assert_eq!(t.get(&[0]), None);
    }

    #[test]
    fn test_set_get() {
        let mut t: Tensor<f64> = Tensor::zeros(&[2, 3]);
        t.set(&[1, 2], 42.0).unwrap();
        assert_eq!(t.get(&[1, 2]), Some(&42.0));
        assert!(t.set(&[2, 0], 1.0).is_err());
    }

    #[test]
    fn test_rank0() {
        let t: Tensor<f64> = Tensor::from_scalar(7.0);
        assert_eq!(t.ndim(), 0);
        assert_eq!(t.len(), 1);
        assert_eq!(t.scalar_value().unwrap(), 7.0);
    }

    #[test]
    fn test_permutedims_transpose() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        let p = t.permutedims(&[1, 0]).unwrap();
        assert_eq!(p.shape(), &[3, 2]);
        for i in 0..2 {
            for j in 0..3 {
                assert_eq!(t.get(&[i, j]), p.get(&[j, i]));
            }
        }
    }

    #[test]
    fn test_permutedims_invalid() {
        let t: Tensor<f64> = Tensor::zeros(&[2, 3]);
        assert!(t.permutedims(&[0]).is_err());
        assert!(t.permutedims(&[0, 0]).is_err());
        assert!(t.permutedims(&[0, 2]).is_err());
    }

    #[test]
    fn test_permutedims_rank1_identity() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[3]).unwrap();
        let p = t.permutedims(&[0]).unwrap();
        assert_eq!(p.data(), t.data());
    }
}
