//! Extraction of object, index lists, scalar factor and conjugation flag
//! from general-tensor expressions.

use crate::compiler::ast::Expr;
use crate::compiler::classify::{is_general_tensor, is_scalar_expr, is_tensor};
use crate::error::TensorOpsError;

/// The parts of a general tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralTensor {
    /// The tensor object (after object extraction, a generated name).
    pub object: Expr,
    /// Left (codomain) index list.
    pub left: Vec<Expr>,
    /// Right (domain) index list.
    pub right: Vec<Expr>,
    /// Accumulated scalar factor expression.
    pub alpha: Expr,
    /// Whether the object is conjugated elementwise.
    pub conj: bool,
    /// Whether an adjoint/transpose swapped the two lists. The underlying
    /// object keeps its axis order, so [`labels`](Self::labels) undoes the
    /// swap when mapping labels to axes.
    pub transposed: bool,
}

impl GeneralTensor {
    /// The index labels in the axis order of the underlying object.
    pub fn labels(&self) -> Vec<Expr> {
        if self.transposed {
            self.right.iter().chain(self.left.iter()).cloned().collect()
        } else {
            self.left.iter().chain(self.right.iter()).cloned().collect()
        }
    }
}

/// Split a subscripted form into `(object, left, right)`.
///
/// # Errors
///
/// `InvalidExpression` if the node is not a tensor.
pub fn decompose_tensor(e: &Expr) -> Result<(Expr, Vec<Expr>, Vec<Expr>), TensorOpsError> {
    if !is_tensor(e) {
        return Err(TensorOpsError::invalid_expression(format!(
            "not a subscripted tensor: {:?}",
            e
        )));
    }
    match e {
        Expr::Ref {
            object,
            left,
            right,
        } => Ok(((**object).clone(), left.clone(), right.clone())),
        _ => unreachable!("is_tensor only accepts Ref nodes"),
    }
}

fn scale(alpha: Expr, factor: Expr) -> Expr {
    if alpha.is_one() {
        factor
    } else if factor.is_one() {
        alpha
    } else {
        Expr::call("*", vec![alpha, factor])
    }
}

/// Walk unary sign, `conj`, adjoint/transpose/prime and scalar factors off
/// a general tensor.
///
/// Adjoint and transpose (and the postfix prime, which means adjoint) are
/// accepted only directly over a conjugation-wrapped or bare tensor; over
/// a scalar-scaled product they are rejected. `adjoint` and the prime swap
/// the two index lists and conjugate; `transpose` swaps without
/// conjugating.
///
/// # Errors
///
/// `InvalidExpression` if the node is not a general tensor.
pub fn decompose_general_tensor(e: &Expr) -> Result<GeneralTensor, TensorOpsError> {
    match e {
        Expr::Ref { .. } => {
            let (object, left, right) = decompose_tensor(e)?;
            Ok(GeneralTensor {
                object,
                left,
                right,
                alpha: Expr::one(),
                conj: false,
                transposed: false,
            })
        }
        Expr::Prime(inner) => transposed(inner, true),
        Expr::Call { head, args } => match (head.as_str(), args.len()) {
            ("+", 1) => decompose_general_tensor(&args[0]),
            ("-", 1) => {
                let mut gt = decompose_general_tensor(&args[0])?;
                gt.alpha = Expr::call("-", vec![gt.alpha]);
                Ok(gt)
            }
            ("conj", 1) => {
                let mut gt = decompose_general_tensor(&args[0])?;
                gt.conj = !gt.conj;
                if !gt.alpha.is_one() {
                    gt.alpha = Expr::call("conj", vec![gt.alpha]);
                }
                Ok(gt)
            }
            ("adjoint", 1) => transposed(&args[0], true),
            ("transpose", 1) => transposed(&args[0], false),
            ("*", _) => {
                let mut tensor: Option<&Expr> = None;
                let mut alpha = Expr::one();
                for arg in args {
                    if is_general_tensor(arg) && tensor.is_none() {
                        tensor = Some(arg);
                    } else if is_scalar_expr(arg) {
                        alpha = scale(alpha, arg.clone());
                    } else {
                        return Err(TensorOpsError::invalid_expression(format!(
                            "not a general tensor: {:?}",
                            e
                        )));
                    }
                }
                let tensor = tensor.ok_or_else(|| {
                    TensorOpsError::invalid_expression(format!("no tensor factor in {:?}", e))
                })?;
                let mut gt = decompose_general_tensor(tensor)?;
                gt.alpha = scale(alpha, gt.alpha);
                Ok(gt)
            }
            ("/", 2) => {
                if !is_scalar_expr(&args[1]) {
                    return Err(TensorOpsError::invalid_expression(format!(
                        "non-scalar divisor in {:?}",
                        e
                    )));
                }
                let mut gt = decompose_general_tensor(&args[0])?;
                gt.alpha = Expr::call("/", vec![gt.alpha, args[1].clone()]);
                Ok(gt)
            }
            _ => Err(TensorOpsError::invalid_expression(format!(
                "not a general tensor: {:?}",
                e
            ))),
        },
        _ => Err(TensorOpsError::invalid_expression(format!(
            "not a general tensor: {:?}",
            e
        ))),
    }
}

/// Adjoint/transpose handling: only a bare tensor, possibly under further
/// conjugations, may sit underneath.
fn transposed(inner: &Expr, conjugate: bool) -> Result<GeneralTensor, TensorOpsError> {
    let gt = decompose_general_tensor(inner)?;
    if !gt.alpha.is_one() {
        return Err(TensorOpsError::invalid_expression(
            "adjoint/transpose of a scalar-scaled tensor is not supported",
        ));
    }
    Ok(GeneralTensor {
        object: gt.object,
        left: gt.right,
        right: gt.left,
        alpha: gt.alpha,
        conj: gt.conj ^ conjugate,
        transposed: !gt.transposed,
    })
}
