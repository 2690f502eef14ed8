//! Index-notation compiler.
//!
//! The compiler is a string-to-program pipeline. [`parse`] turns source
//! text into a tagged syntax tree; [`compile`] rewrites that tree into a
//! program whose statements are calls to the kernel primitives; the
//! [`runtime`] module interprets such programs against an environment of
//! named tensors.
//!
//! Compilation itself never fails on classification problems: a statement
//! the instantiator cannot lower becomes an error construct that throws
//! when the program is executed, so the rest of the program still runs.
//!
//! ```
//! use tensorops::compiler::{compile_str, runtime::{execute, Env}};
//! use tensorops::Tensor;
//!
//! let program = compile_str("C[i,k] := A[i,j] * B[j,k]").unwrap();
//! let mut env: Env<f64> = Env::new();
//! env.insert_tensor("A", Tensor::ones(&[2, 3]));
//! env.insert_tensor("B", Tensor::ones(&[3, 4]));
//! execute(&program, &mut env).unwrap();
//! assert_eq!(env.tensor("C").unwrap().shape(), &[2, 4]);
//! ```

pub mod ast;
pub mod classify;
pub mod decompose;
pub mod instantiate;
pub mod parse;
pub mod postprocess;
pub mod preprocess;
pub mod runtime;
pub mod tree;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::TensorOpsError;

pub use ast::{AssignKind, Expr};
pub use parse::parse;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Fresh identifier for generated names and call-site tags.
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Rewrite a parsed syntax tree into a program over the kernel primitives.
///
/// Passes run in order: prime normalization, conjugation expansion,
/// positional-integer completion, tensor-object extraction,
/// instantiation, block flattening, line-node removal and primitive-name
/// resolution.
pub fn compile(expr: &Expr) -> Expr {
    let e = preprocess::normalize_indices(expr);
    let e = preprocess::expand_conj(&e);
    let e = preprocess::complete_positional(&e);
    let e = preprocess::extract_tensor_objects(&e);
    let e = instantiate::instantiate(&e);
    let e = postprocess::flatten(&e);
    let e = postprocess::remove_line_nodes(&e);
    postprocess::resolve_primitives(&e)
}

/// Parse and compile source text.
///
/// # Errors
///
/// `InvalidExpression` on parse failure. Classification failures do not
/// error here; they surface when the compiled program runs.
pub fn compile_str(src: &str) -> Result<Expr, TensorOpsError> {
    Ok(compile(&parse(src)?))
}
