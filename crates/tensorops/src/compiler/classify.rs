//! Predicates over syntax trees.
//!
//! These identify the syntactic shapes the instantiator knows how to
//! lower: bare indices, subscripted tensors, general tensors (a tensor
//! under sign/conjugation/scalar prefixes), scalar expressions, tensor
//! expressions and contractions.

use crate::compiler::ast::Expr;

/// A plain name, a small integer, or a primed form of one of those.
pub fn is_index(e: &Expr) -> bool {
    match e {
        Expr::Sym(_) | Expr::Int(_) => true,
        Expr::Prime(inner) => is_index(inner),
        _ => false,
    }
}

/// A subscripted form whose bracket contents are all indices.
pub fn is_tensor(e: &Expr) -> bool {
    match e {
        Expr::Ref { left, right, .. } => left.iter().chain(right.iter()).all(is_index),
        _ => false,
    }
}

/// A tensor under any stack of unary sign, `conj`/`adjoint`/`transpose`,
/// primes and scalar multiplications or divisions.
pub fn is_general_tensor(e: &Expr) -> bool {
    match e {
        _ if is_tensor(e) => true,
        Expr::Prime(inner) => is_general_tensor(inner),
        Expr::Call { head, args } => match (head.as_str(), args.len()) {
            ("-" | "+", 1) => is_general_tensor(&args[0]),
            ("conj" | "adjoint" | "transpose", 1) => is_general_tensor(&args[0]),
            ("*", _) => {
                let tensors = args.iter().filter(|a| is_general_tensor(a)).count();
                tensors == 1 && args.iter().all(|a| is_general_tensor(a) || is_scalar_expr(a))
            }
            ("/", 2) => is_general_tensor(&args[0]) && is_scalar_expr(&args[1]),
            _ => false,
        },
        _ => false,
    }
}

/// Whether any leaf of the expression is a subscripted form.
fn has_tensor_leaf(e: &Expr) -> bool {
    match e {
        Expr::Ref { .. } => true,
        Expr::Prime(inner) | Expr::Opaque(inner) => has_tensor_leaf(inner),
        Expr::Call { head, args } => {
            // `scalar(...)` collapses a tensor expression to a scalar.
            head != "scalar" && args.iter().any(has_tensor_leaf)
        }
        Expr::Tuple(items) | Expr::Block(items) => items.iter().any(has_tensor_leaf),
        Expr::Assign { lhs, rhs, .. } => has_tensor_leaf(lhs) || has_tensor_leaf(rhs),
        _ => false,
    }
}

/// A numeric literal, a plain name, or a call none of whose leaves is a
/// subscripted form. `scalar(…)` is the explicit escape over a tensor
/// expression.
pub fn is_scalar_expr(e: &Expr) -> bool {
    match e {
        Expr::Int(_) | Expr::Num(_) | Expr::Sym(_) => true,
        Expr::Call { head, args } => {
            if head == "scalar" && args.len() == 1 {
                true
            } else {
                !args.iter().any(has_tensor_leaf)
            }
        }
        Expr::Prime(inner) => is_scalar_expr(inner),
        _ => false,
    }
}

/// A general tensor, a sum or difference of tensor expressions, a product
/// with at least one tensor factor, a scalar-divided tensor expression, or
/// a conjugation of one.
pub fn is_tensor_expr(e: &Expr) -> bool {
    if is_general_tensor(e) {
        return true;
    }
    match e {
        Expr::Call { head, args } => match (head.as_str(), args.len()) {
            ("+" | "-", 2) => args.iter().all(is_tensor_expr),
            ("-" | "+", 1) => is_tensor_expr(&args[0]),
            ("*", _) => {
                let tensors = args.iter().filter(|a| is_tensor_expr(a)).count();
                tensors >= 1 && args.iter().all(|a| is_tensor_expr(a) || is_scalar_expr(a))
            }
            ("/", 2) => is_tensor_expr(&args[0]) && is_scalar_expr(&args[1]),
            ("conj" | "adjoint", 1) => is_tensor_expr(&args[0]),
            _ => false,
        },
        _ => false,
    }
}

/// A product with at least two tensor-expression factors.
pub fn is_contraction(e: &Expr) -> bool {
    match e {
        Expr::Call { head, args } if head == "*" => {
            args.iter().filter(|a| is_tensor_expr(a)).count() >= 2
        }
        _ => false,
    }
}
