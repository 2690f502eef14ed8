//! tensorops - multidimensional tensor contractions with index notation.
//!
//! Two subsystems share this crate:
//!
//! ```text
//! Level 1: Index-notation compiler (compiler module)
//!     parse → preprocess → contraction-tree sort → instantiate →
//!     postprocess → program over the kernel primitives
//!
//! Level 2: Primitive kernels (kernels module)
//!     add      C ← β·C + α·op(A)            permute + scaled accumulate
//!     trace    C ← β·C + α·partial_trace    diagonal-strided reduction
//!     contract C ← β·C + α·op(A)·op(B)      GEMM path or native reduction
//!
//! Level 3: Strided plumbing (view, fuse, blas, cache, structure)
//!     axis fusion, faer matmul dispatch, keyed scratch reuse
//! ```
//!
//! # Kernels
//!
//! ```
//! use tensorops::{add, contract, Conj, Tensor};
//!
//! // C[i,l] = Σ_j A[i,j]·B[j,l]
//! let a = Tensor::<f64>::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
//! let b = Tensor::<f64>::ones(&[3, 4]);
//! let mut c = Tensor::<f64>::zeros(&[2, 4]);
//! contract(
//!     1.0, &a, Conj::Plain, &b, Conj::Plain, 0.0, &mut c,
//!     &[0], &[1], &[1], &[0], &[0, 1], None,
//! )
//! .unwrap();
//!
//! // Permute with a scalar factor: D[j,i] = 2·A[i,j]
//! let mut d = Tensor::<f64>::zeros(&[3, 2]);
//! add(2.0, &a, Conj::Plain, 0.0, &mut d, &[1, 0], &[]).unwrap();
//! ```
//!
//! # Index notation
//!
//! ```
//! use tensorops::{Env, run_str, Tensor};
//!
//! let mut env: Env<f64> = Env::new();
//! env.insert_tensor("A", Tensor::ones(&[2, 3]));
//! env.insert_tensor("B", Tensor::ones(&[3, 2]));
//! run_str("D[a,c] := A[a,b] * B[b,c]", &mut env).unwrap();
//! assert_eq!(env.tensor("D").unwrap().get(&[0, 0]), Some(&3.0));
//! ```

pub mod blas;
pub mod cache;
pub mod compiler;
pub mod error;
pub mod fuse;
pub mod indices;
pub mod kernels;
pub mod random;
pub mod scalar;
pub mod strides;
pub mod structure;
pub mod tensor;
pub mod view;

pub use blas::{blas_enabled, disable_blas, enable_blas};
pub use cache::{cache_enabled, disable_cache, enable_cache, flush_cache};
pub use compiler::runtime::{execute, run_str, Env};
pub use compiler::{compile, compile_str, parse};
pub use error::TensorOpsError;
pub use kernels::{add, contract, trace, Conj};
pub use scalar::{c32, c64, Scalar};
pub use structure::{cached_similar_from_indices, similar_from_indices};
pub use tensor::Tensor;
