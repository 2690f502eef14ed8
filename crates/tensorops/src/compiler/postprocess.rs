//! Cleanup passes over instantiated programs.

use crate::compiler::ast::Expr;

/// The primitive names emitted by the instantiator.
const PRIMITIVES: [&str; 7] = [
    "similar_from_indices",
    "cached_similar_from_indices",
    "add",
    "trace",
    "contract",
    "scalar",
    "index_error",
];

/// Hoist nested blocks so every statement sits at the top level of the
/// program.
pub fn flatten(e: &Expr) -> Expr {
    match e {
        Expr::Block(stmts) => {
            let mut out = Vec::new();
            for s in stmts {
                match flatten(s) {
                    Expr::Block(inner) => out.extend(inner),
                    other => out.push(other),
                }
            }
            Expr::Block(out)
        }
        Expr::Opaque(inner) => Expr::Opaque(Box::new(flatten(inner))),
        other => other.clone(),
    }
}

/// Strip source-position annotations.
pub fn remove_line_nodes(e: &Expr) -> Expr {
    match e {
        Expr::Block(stmts) => Expr::Block(
            stmts
                .iter()
                .filter(|s| !matches!(s, Expr::Line(_)))
                .map(remove_line_nodes)
                .collect(),
        ),
        Expr::Opaque(inner) => Expr::Opaque(Box::new(remove_line_nodes(inner))),
        other => other.clone(),
    }
}

/// Resolve the primitive names to the library namespace.
pub fn resolve_primitives(e: &Expr) -> Expr {
    match e {
        Expr::Call { head, args } => {
            let resolved = if PRIMITIVES.contains(&head.as_str()) {
                format!("tensorops::{}", head)
            } else {
                head.clone()
            };
            Expr::Call {
                head: resolved,
                args: args.iter().map(resolve_primitives).collect(),
            }
        }
        Expr::Block(stmts) => Expr::Block(stmts.iter().map(resolve_primitives).collect()),
        Expr::Opaque(inner) => Expr::Opaque(Box::new(resolve_primitives(inner))),
        Expr::Assign { kind, lhs, rhs } => Expr::Assign {
            kind: *kind,
            lhs: Box::new(resolve_primitives(lhs)),
            rhs: Box::new(resolve_primitives(rhs)),
        },
        Expr::Tuple(items) => Expr::Tuple(items.iter().map(resolve_primitives).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten() {
        let nested = Expr::Block(vec![
            Expr::Block(vec![Expr::sym("a"), Expr::sym("b")]),
            Expr::sym("c"),
            Expr::Block(vec![Expr::Block(vec![Expr::sym("d")])]),
        ]);
        match flatten(&nested) {
            Expr::Block(stmts) => {
                assert_eq!(stmts.len(), 4);
                assert_eq!(stmts[3], Expr::sym("d"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_remove_line_nodes() {
        let block = Expr::Block(vec![
            Expr::Line("statement 1".into()),
            Expr::sym("a"),
            Expr::Line("statement 2".into()),
        ]);
        match remove_line_nodes(&block) {
            Expr::Block(stmts) => assert_eq!(stmts, vec![Expr::sym("a")]),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_primitives() {
        let call = Expr::call("add", vec![Expr::call("sqrt", vec![Expr::Int(2)])]);
        match resolve_primitives(&call) {
            Expr::Call { head, args } => {
                assert_eq!(head, "tensorops::add");
                assert!(matches!(&args[0], Expr::Call { head, .. } if head == "sqrt"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
