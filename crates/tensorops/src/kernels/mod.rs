//! The three primitive kernels: `add`, `trace` and `contract`.
//!
//! Every kernel computes `C ← β·C + α·op(A) …` for a destination tensor
//! `C`, with `op` selected by a conjugation flag. `β = 0` never reads the
//! destination. Axis bookkeeping is passed as position tuples validated on
//! entry; the symbolic-label layer lives in [`crate::indices`] and the
//! compiler.

mod add;
mod contract;
mod trace;

pub use add::add;
pub use contract::contract;
pub use trace::trace;

use crate::error::TensorOpsError;

/// Elementwise conjugation flag attached to a kernel operand.
///
/// `Adjoint` equals `Conj` for the numeric element types handled here; the
/// distinction matters to the compiler, which swaps index lists for
/// adjoints before the kernel is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conj {
    Plain,
    Conj,
    Adjoint,
}

impl Conj {
    /// Whether the flag conjugates elements.
    #[inline]
    pub fn conjugates(self) -> bool {
        matches!(self, Conj::Conj | Conj::Adjoint)
    }

    /// Parse a flag name from a compiled program.
    ///
    /// # Errors
    ///
    /// `UnknownFlag` for anything outside {`plain`, `conj`, `adjoint`}.
    pub fn from_name(name: &str) -> Result<Self, TensorOpsError> {
        match name {
            "plain" => Ok(Conj::Plain),
            "conj" => Ok(Conj::Conj),
            "adjoint" => Ok(Conj::Adjoint),
            other => Err(TensorOpsError::UnknownFlag {
                flag: other.to_string(),
            }),
        }
    }

    /// The flag name used in compiled programs.
    pub fn name(self) -> &'static str {
        match self {
            Conj::Plain => "plain",
            Conj::Conj => "conj",
            Conj::Adjoint => "adjoint",
        }
    }
}
