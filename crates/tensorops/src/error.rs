//! Error types for tensorops.

use thiserror::Error;

/// Errors raised by the contraction kernels and the index-notation compiler.
#[derive(Debug, Error)]
pub enum TensorOpsError {
    /// An index-tuple precondition failed: the given selections do not form
    /// a permutation of the operand axes, or an index occurs too often.
    #[error("invalid index selection: {reason}")]
    InvalidIndices { reason: String },

    /// Axis sizes do not align on a contraction, trace or assignment boundary.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A conjugation flag outside {plain, conj, adjoint}.
    #[error("unknown conjugation flag `{flag}`")]
    UnknownFlag { flag: String },

    /// The compiler saw a syntactic shape it cannot classify.
    #[error("invalid expression: {reason}")]
    InvalidExpression { reason: String },
}

impl TensorOpsError {
    pub(crate) fn invalid_indices(reason: impl Into<String>) -> Self {
        TensorOpsError::InvalidIndices {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_expression(reason: impl Into<String>) -> Self {
        TensorOpsError::InvalidExpression {
            reason: reason.into(),
        }
    }
}
