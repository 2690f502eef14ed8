//! Source-tree normalization passes.
//!
//! Applied in order before instantiation: prime folding, conjugation
//! expansion, positional-integer completion, and tensor-object extraction.
//! None of the passes descend into [`Expr::Opaque`] markers.

use crate::compiler::ast::{AssignKind, Expr};
use crate::compiler::next_id;

/// Fold prime marks on index atoms into the identifier text, appending the
/// prime glyph: `j'` becomes the atom `j′`. Idempotent: a second
/// application finds no prime nodes in index position.
pub fn normalize_indices(e: &Expr) -> Expr {
    match e {
        Expr::Ref {
            object,
            left,
            right,
        } => Expr::Ref {
            object: Box::new(normalize_indices(object)),
            left: left.iter().map(normalize_index_atom).collect(),
            right: right.iter().map(normalize_index_atom).collect(),
        },
        Expr::Opaque(_) => e.clone(),
        _ => map_children(e, normalize_indices),
    }
}

fn normalize_index_atom(e: &Expr) -> Expr {
    match e {
        Expr::Prime(inner) => match normalize_index_atom(inner) {
            Expr::Sym(s) => Expr::Sym(format!("{}′", s)),
            Expr::Int(n) => Expr::Sym(format!("{}′", n)),
            other => other,
        },
        other => other.clone(),
    }
}

/// Push `conj(...)` inward so it sits on individual tensor and scalar
/// leaves: `conj(A[i,j] * x)` becomes `conj(A[i,j]) * conj(x)`, and nested
/// conjugations cancel.
pub fn expand_conj(e: &Expr) -> Expr {
    match e {
        Expr::Call { head, args } if head == "conj" && args.len() == 1 => push_conj(&args[0]),
        Expr::Opaque(_) => e.clone(),
        _ => map_children(e, expand_conj),
    }
}

fn push_conj(e: &Expr) -> Expr {
    match e {
        Expr::Call { head, args } => match head.as_str() {
            "conj" => expand_conj(&args[0]),
            "*" | "+" | "-" | "/" => Expr::Call {
                head: head.clone(),
                args: args.iter().map(push_conj).collect(),
            },
            _ => Expr::call("conj", vec![expand_conj(e)]),
        },
        _ => Expr::call("conj", vec![expand_conj(e)]),
    }
}

/// Complete positional-integer index assignments: when every index on the
/// right-hand side is an integer literal (positive = contracted,
/// negative = free) and the left-hand side bracket is empty, the free
/// labels fill the left list in ascending order of absolute value.
pub fn complete_positional(e: &Expr) -> Expr {
    match e {
        Expr::Assign { kind, lhs, rhs } => {
            let completed = try_complete(lhs, rhs);
            Expr::Assign {
                kind: *kind,
                lhs: Box::new(completed.unwrap_or_else(|| (**lhs).clone())),
                rhs: rhs.clone(),
            }
        }
        Expr::Opaque(_) => e.clone(),
        _ => map_children(e, complete_positional),
    }
}

fn try_complete(lhs: &Expr, rhs: &Expr) -> Option<Expr> {
    let object = match lhs {
        Expr::Ref {
            object,
            left,
            right,
        } if left.is_empty() && right.is_empty() => object,
        _ => return None,
    };
    let mut labels = Vec::new();
    collect_ref_indices(rhs, &mut labels);
    if labels.is_empty() || !labels.iter().all(|l| matches!(l, Expr::Int(_))) {
        return None;
    }
    let mut free: Vec<i64> = labels
        .iter()
        .filter_map(|l| match l {
            Expr::Int(n) if *n < 0 => Some(*n),
            _ => None,
        })
        .collect();
    free.sort_by_key(|n| n.abs());
    free.dedup();
    Some(Expr::Ref {
        object: object.clone(),
        left: free.into_iter().map(Expr::Int).collect(),
        right: Vec::new(),
    })
}

fn collect_ref_indices(e: &Expr, out: &mut Vec<Expr>) {
    match e {
        Expr::Ref { left, right, .. } => {
            out.extend(left.iter().cloned());
            out.extend(right.iter().cloned());
        }
        Expr::Prime(inner) | Expr::Opaque(inner) => collect_ref_indices(inner, out),
        Expr::Call { args, .. } => {
            for a in args {
                collect_ref_indices(a, out);
            }
        }
        Expr::Tuple(items) | Expr::Block(items) => {
            for i in items {
                collect_ref_indices(i, out);
            }
        }
        Expr::Assign { lhs, rhs, .. } => {
            collect_ref_indices(lhs, out);
            collect_ref_indices(rhs, out);
        }
        _ => {}
    }
}

/// Replace every distinct tensor object with a generated identifier.
///
/// A preamble block binds the generated names to their originals and a
/// postamble block rebinds every assigned object back to its user name;
/// both are wrapped in opaque markers so later passes leave them alone.
pub fn extract_tensor_objects(e: &Expr) -> Expr {
    let mut names: Vec<(Expr, String)> = Vec::new();
    // Objects whose first occurrence is a `:=` destination do not exist
    // before the program runs and must not be bound in the preamble.
    let mut introduced: Vec<Expr> = Vec::new();
    let mut assigned: Vec<(Expr, String)> = Vec::new();

    let mut stmts = Vec::new();
    for stmt in e.statements() {
        match stmt {
            Expr::Assign { kind, lhs, rhs } => {
                let new_rhs = rename_objects(rhs, &mut names);
                let lhs_object_is_new = match &**lhs {
                    Expr::Ref { object, .. } => lookup(&names, object).is_none(),
                    _ => false,
                };
                let new_lhs = rename_objects(lhs, &mut names);
                if let Expr::Ref { object, .. } = &**lhs {
                    let name = lookup(&names, object).expect("destination object was renamed");
                    if *kind == AssignKind::Define && lhs_object_is_new {
                        introduced.push((**object).clone());
                    }
                    if !assigned.iter().any(|(o, _)| o == &**object) {
                        assigned.push(((**object).clone(), name));
                    }
                }
                stmts.push(Expr::Assign {
                    kind: *kind,
                    lhs: Box::new(new_lhs),
                    rhs: Box::new(new_rhs),
                });
            }
            other => stmts.push(other.clone()),
        }
    }

    // The preamble binds every pre-existing object to its generated name;
    // the postamble publishes every destination back to its user name.
    let preamble: Vec<Expr> = names
        .iter()
        .filter(|(object, _)| !introduced.contains(object))
        .map(|(object, name)| Expr::Assign {
            kind: AssignKind::Assign,
            lhs: Box::new(Expr::sym(name.clone())),
            rhs: Box::new(object.clone()),
        })
        .collect();
    let postamble: Vec<Expr> = assigned
        .iter()
        .map(|(object, name)| Expr::Assign {
            kind: AssignKind::Assign,
            lhs: Box::new(object.clone()),
            rhs: Box::new(Expr::sym(name.clone())),
        })
        .collect();

    let mut out = Vec::new();
    if !preamble.is_empty() {
        out.push(Expr::Opaque(Box::new(Expr::Block(preamble))));
    }
    out.extend(stmts);
    if !postamble.is_empty() {
        out.push(Expr::Opaque(Box::new(Expr::Block(postamble))));
    }
    Expr::Block(out)
}

fn lookup(names: &[(Expr, String)], object: &Expr) -> Option<String> {
    names
        .iter()
        .find(|(o, _)| o == object)
        .map(|(_, n)| n.clone())
}

fn rename_objects(e: &Expr, names: &mut Vec<(Expr, String)>) -> Expr {
    match e {
        Expr::Ref {
            object,
            left,
            right,
        } => {
            let name = match lookup(names, object) {
                Some(n) => n,
                None => {
                    let n = format!("#t{}", next_id());
                    names.push(((**object).clone(), n.clone()));
                    n
                }
            };
            Expr::Ref {
                object: Box::new(Expr::sym(name)),
                left: left.clone(),
                right: right.clone(),
            }
        }
        Expr::Opaque(_) => e.clone(),
        _ => map_children(e, |c| rename_objects(c, names)),
    }
}

/// Rebuild a node with a function applied to each child.
fn map_children(e: &Expr, mut f: impl FnMut(&Expr) -> Expr) -> Expr {
    match e {
        Expr::Sym(_) | Expr::Int(_) | Expr::Num(_) | Expr::Str(_) | Expr::Line(_) => e.clone(),
        Expr::Prime(inner) => Expr::Prime(Box::new(f(inner))),
        Expr::Call { head, args } => Expr::Call {
            head: head.clone(),
            args: args.iter().map(f).collect(),
        },
        Expr::Ref {
            object,
            left,
            right,
        } => Expr::Ref {
            object: Box::new(f(object)),
            left: left.iter().map(&mut f).collect(),
            right: right.iter().map(&mut f).collect(),
        },
        Expr::Tuple(items) => Expr::Tuple(items.iter().map(f).collect()),
        Expr::Block(items) => Expr::Block(items.iter().map(f).collect()),
        Expr::Opaque(inner) => Expr::Opaque(inner.clone()),
        Expr::Assign { kind, lhs, rhs } => Expr::Assign {
            kind: *kind,
            lhs: Box::new(f(lhs)),
            rhs: Box::new(f(rhs)),
        },
    }
}
