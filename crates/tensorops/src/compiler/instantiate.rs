//! Lowering of assignments to primitive-kernel calls.
//!
//! Each tensor assignment becomes a block of statements: allocations for
//! definitions and intermediate temporaries, then `add`/`trace`/`contract`
//! calls with the permutation tuples computed from the index labels at
//! compile time. A statement the lowering cannot classify is replaced by
//! an error construct that throws when the program runs, so the rest of
//! the program still compiles.

use crate::compiler::ast::{AssignKind, Expr};
use crate::compiler::classify::{is_contraction, is_general_tensor, is_index, is_tensor_expr};
use crate::compiler::decompose::{decompose_general_tensor, decompose_tensor};
use crate::compiler::next_id;
use crate::compiler::tree::{build_tree, sort_product};
use crate::error::TensorOpsError;
use crate::indices::{add_permutation, contract_layout, trace_layout};

/// How the destination of an emitted kernel call comes into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Alloc {
    /// The destination already exists.
    None,
    /// A definition: allocate fresh.
    Fresh,
    /// An intermediate: allocate through the temporary cache.
    Cached,
}

/// Lower every assignment in the program.
pub fn instantiate(e: &Expr) -> Expr {
    match e {
        Expr::Block(stmts) => Expr::Block(stmts.iter().map(instantiate).collect()),
        Expr::Opaque(_) | Expr::Line(_) => e.clone(),
        Expr::Assign { kind, lhs, rhs } => match instantiate_assignment(*kind, lhs, rhs) {
            Ok(block) => block,
            Err(err) => error_construct(&err),
        },
        other => other.clone(),
    }
}

/// Compiler failures surface as emitted constructs that throw at runtime.
fn error_construct(err: &TensorOpsError) -> Expr {
    Expr::call("index_error", vec![Expr::Str(err.to_string())])
}

fn instantiate_assignment(
    kind: AssignKind,
    lhs: &Expr,
    rhs: &Expr,
) -> Result<Expr, TensorOpsError> {
    match lhs {
        Expr::Ref { .. } => instantiate_tensor_assignment(kind, lhs, rhs),
        Expr::Sym(_) => instantiate_scalar_assignment(kind, lhs, rhs),
        other => Err(TensorOpsError::invalid_expression(format!(
            "cannot assign to {:?}",
            other
        ))),
    }
}

fn instantiate_tensor_assignment(
    kind: AssignKind,
    lhs: &Expr,
    rhs: &Expr,
) -> Result<Expr, TensorOpsError> {
    let (object, left, right) = decompose_tensor(lhs)?;
    if !matches!(object, Expr::Sym(_)) {
        return Err(TensorOpsError::invalid_expression(format!(
            "destination object must be a name, found {:?}",
            object
        )));
    }
    let ic: Vec<Expr> = left.iter().chain(right.iter()).cloned().collect();
    for label in &ic {
        if !is_index(label) {
            return Err(TensorOpsError::invalid_expression(format!(
                "destination index {:?} is not an index",
                label
            )));
        }
        if ic.iter().filter(|l| *l == label).count() != 1 {
            return Err(TensorOpsError::invalid_indices(format!(
                "duplicate index {:?} on the left-hand side",
                label
            )));
        }
    }

    let (alpha, beta, alloc) = match kind {
        AssignKind::Assign => (Expr::one(), Expr::Int(0), Alloc::None),
        AssignKind::Define => (Expr::one(), Expr::Int(0), Alloc::Fresh),
        AssignKind::AddAssign => (Expr::one(), Expr::Int(1), Alloc::None),
        // C -= rhs accumulates the negated factor.
        AssignKind::SubAssign => (Expr::Int(-1), Expr::Int(1), Alloc::None),
    };

    let mut stmts = Vec::new();
    instantiate_rhs(&object, &left, &right, alpha, beta, rhs, alloc, &mut stmts)?;
    Ok(Expr::Block(stmts))
}

fn instantiate_scalar_assignment(
    kind: AssignKind,
    lhs: &Expr,
    rhs: &Expr,
) -> Result<Expr, TensorOpsError> {
    if !matches!(kind, AssignKind::Assign | AssignKind::Define) {
        return Err(TensorOpsError::invalid_expression(
            "scalar destinations only support `=` and `:=`",
        ));
    }
    let mut stmts = Vec::new();
    let lowered = lower_scalar_calls(rhs, &mut stmts)?;
    stmts.push(Expr::Assign {
        kind: AssignKind::Assign,
        lhs: Box::new(lhs.clone()),
        rhs: Box::new(lowered),
    });
    Ok(Expr::Block(stmts))
}

/// Replace `scalar(tensor-expr)` calls with references to rank-0
/// temporaries computed by emitted kernel calls.
fn lower_scalar_calls(e: &Expr, stmts: &mut Vec<Expr>) -> Result<Expr, TensorOpsError> {
    match e {
        Expr::Call { head, args } if head == "scalar" && args.len() == 1 => {
            let inner = &args[0];
            if !is_tensor_expr(inner) {
                return Ok(e.clone());
            }
            let free = free_labels(inner)?;
            if !free.is_empty() {
                return Err(TensorOpsError::invalid_indices(format!(
                    "scalar() of an expression with free indices {:?}",
                    free
                )));
            }
            let tmp = Expr::sym(format!("#t{}", next_id()));
            instantiate_rhs(
                &tmp,
                &[],
                &[],
                Expr::one(),
                Expr::Int(0),
                inner,
                Alloc::Cached,
                stmts,
            )?;
            Ok(Expr::call("scalar", vec![tmp]))
        }
        Expr::Call { head, args } => {
            let mut lowered = Vec::with_capacity(args.len());
            for a in args {
                lowered.push(lower_scalar_calls(a, stmts)?);
            }
            Ok(Expr::Call {
                head: head.clone(),
                args: lowered,
            })
        }
        _ => Ok(e.clone()),
    }
}

#[allow(clippy::too_many_arguments)]
fn instantiate_rhs(
    dst: &Expr,
    dst_left: &[Expr],
    dst_right: &[Expr],
    alpha: Expr,
    beta: Expr,
    rhs: &Expr,
    alloc: Alloc,
    stmts: &mut Vec<Expr>,
) -> Result<(), TensorOpsError> {
    match rhs {
        Expr::Call { head, args } if head == "+" && args.len() == 2 && !is_general_tensor(rhs) => {
            instantiate_rhs(
                dst,
                dst_left,
                dst_right,
                alpha.clone(),
                beta,
                &args[0],
                alloc,
                stmts,
            )?;
            instantiate_rhs(
                dst,
                dst_left,
                dst_right,
                alpha,
                Expr::Int(1),
                &args[1],
                Alloc::None,
                stmts,
            )
        }
        Expr::Call { head, args } if head == "-" && args.len() == 2 && !is_general_tensor(rhs) => {
            instantiate_rhs(
                dst,
                dst_left,
                dst_right,
                alpha.clone(),
                beta,
                &args[0],
                alloc,
                stmts,
            )?;
            instantiate_rhs(
                dst,
                dst_left,
                dst_right,
                negate(alpha),
                Expr::Int(1),
                &args[1],
                Alloc::None,
                stmts,
            )
        }
        Expr::Call { head, args }
            if head == "/" && args.len() == 2 && !is_general_tensor(rhs) =>
        {
            let alpha = Expr::call("/", vec![alpha, args[1].clone()]);
            instantiate_rhs(dst, dst_left, dst_right, alpha, beta, &args[0], alloc, stmts)
        }
        _ if is_contraction(rhs) => instantiate_contraction(
            dst, dst_left, dst_right, alpha, beta, rhs, alloc, stmts,
        ),
        _ if is_general_tensor(rhs) => {
            instantiate_single(dst, dst_left, dst_right, alpha, beta, rhs, alloc, stmts)
        }
        Expr::Call { head, args } if head == "-" && args.len() == 1 => instantiate_rhs(
            dst,
            dst_left,
            dst_right,
            negate(alpha),
            beta,
            &args[0],
            alloc,
            stmts,
        ),
        Expr::Call { head, args } if head == "+" && args.len() == 1 => {
            instantiate_rhs(dst, dst_left, dst_right, alpha, beta, &args[0], alloc, stmts)
        }
        other => Err(TensorOpsError::invalid_expression(format!(
            "cannot lower right-hand side {:?}",
            other
        ))),
    }
}

/// Single general-tensor factor: `add` when its indices are unique,
/// `trace` when a label repeats.
#[allow(clippy::too_many_arguments)]
fn instantiate_single(
    dst: &Expr,
    dst_left: &[Expr],
    dst_right: &[Expr],
    alpha: Expr,
    beta: Expr,
    rhs: &Expr,
    alloc: Alloc,
    stmts: &mut Vec<Expr>,
) -> Result<(), TensorOpsError> {
    let gt = decompose_general_tensor(rhs)?;
    let labels = gt.labels();
    check_occurrences(&labels)?;
    let ic: Vec<Expr> = dst_left.iter().chain(dst_right.iter()).cloned().collect();
    let alpha_total = scale(alpha, gt.alpha.clone());
    let flag = Expr::sym(if gt.conj { "conj" } else { "plain" });

    if labels.iter().all(|l| labels.iter().filter(|m| *m == l).count() == 1) {
        let perm = add_permutation(&labels, &ic)?;
        let (pl, pr) = perm.split_at(dst_left.len());
        emit_alloc_single(dst, &gt.object, pl, pr, alloc, stmts);
        stmts.push(Expr::call(
            "add",
            vec![
                alpha_total,
                gt.object.clone(),
                flag,
                beta,
                dst.clone(),
                tuple(pl),
                tuple(pr),
            ],
        ));
    } else {
        let (perm, cind1, cind2) = trace_layout(&labels, &ic)?;
        let (pl, pr) = perm.split_at(dst_left.len());
        emit_alloc_single(dst, &gt.object, pl, pr, alloc, stmts);
        stmts.push(Expr::call(
            "trace",
            vec![
                alpha_total,
                gt.object.clone(),
                flag,
                beta,
                dst.clone(),
                tuple(pl),
                tuple(pr),
                tuple(&cind1),
                tuple(&cind2),
            ],
        ));
    }
    Ok(())
}

/// n-ary product: strip scalar factors, build the contraction tree, then
/// emit the nested binary contractions.
#[allow(clippy::too_many_arguments)]
fn instantiate_contraction(
    dst: &Expr,
    dst_left: &[Expr],
    dst_right: &[Expr],
    alpha: Expr,
    beta: Expr,
    rhs: &Expr,
    alloc: Alloc,
    stmts: &mut Vec<Expr>,
) -> Result<(), TensorOpsError> {
    let args = match rhs {
        Expr::Call { head, args } if head == "*" => args,
        _ => unreachable!("is_contraction only accepts products"),
    };
    let mut alpha = alpha;
    let mut factors = Vec::new();
    for arg in args {
        if is_tensor_expr(arg) {
            factors.push(arg.clone());
        } else {
            alpha = scale(alpha, arg.clone());
        }
    }
    let mut lists = Vec::with_capacity(factors.len());
    for f in &factors {
        lists.push(free_labels(f)?);
    }
    let tree = build_tree(&lists);
    let sorted = sort_product(&tree, &factors);
    emit_node(dst, dst_left, dst_right, alpha, beta, &sorted, alloc, stmts)
}

/// Emit one binary contraction node into `dst`.
#[allow(clippy::too_many_arguments)]
fn emit_node(
    dst: &Expr,
    dst_left: &[Expr],
    dst_right: &[Expr],
    alpha: Expr,
    beta: Expr,
    node: &Expr,
    alloc: Alloc,
    stmts: &mut Vec<Expr>,
) -> Result<(), TensorOpsError> {
    let (x, y) = match node {
        Expr::Call { head, args } if head == "*" && args.len() == 2 => (&args[0], &args[1]),
        single => {
            return instantiate_rhs(
                dst, dst_left, dst_right, alpha, beta, single, alloc, stmts,
            );
        }
    };
    let ox = operandize(x, stmts)?;
    let oy = operandize(y, stmts)?;
    let ic: Vec<Expr> = dst_left.iter().chain(dst_right.iter()).cloned().collect();
    let layout = contract_layout(&ox.labels, &oy.labels, &ic)?;

    if alloc != Alloc::None {
        let combined: Vec<Expr> = ox
            .labels
            .iter()
            .chain(oy.labels.iter())
            .cloned()
            .collect();
        let sel: Vec<usize> = ic
            .iter()
            .map(|l| combined.iter().position(|c| c == l).expect("open label"))
            .collect();
        let (sl, sr) = sel.split_at(dst_left.len());
        let mut args = vec![
            ox.name.clone(),
            oy.name.clone(),
            tuple(&positions(ox.labels.len())),
            tuple(&positions(oy.labels.len())),
            tuple(sl),
            tuple(sr),
        ];
        let head = match alloc {
            Alloc::Fresh => "similar_from_indices",
            Alloc::Cached => {
                args.push(Expr::Int(next_id() as i64));
                "cached_similar_from_indices"
            }
            Alloc::None => unreachable!(),
        };
        stmts.push(Expr::Assign {
            kind: AssignKind::Assign,
            lhs: Box::new(dst.clone()),
            rhs: Box::new(Expr::call(head, args)),
        });
    }

    let alpha_total = scale(alpha, scale(ox.alpha, oy.alpha));
    let sites = Expr::Tuple(vec![
        Expr::Int(next_id() as i64),
        Expr::Int(next_id() as i64),
        Expr::Int(next_id() as i64),
    ]);
    stmts.push(Expr::call(
        "contract",
        vec![
            alpha_total,
            ox.name,
            Expr::sym(ox.flag),
            oy.name,
            Expr::sym(oy.flag),
            beta,
            dst.clone(),
            tuple(&layout.oind_a),
            tuple(&layout.cind_a),
            tuple(&layout.oind_b),
            tuple(&layout.cind_b),
            tuple(&layout.ind_c),
            sites,
        ],
    ));
    Ok(())
}

/// A materialized contraction operand: a named tensor whose axes carry
/// `labels`, with any leftover conjugation flag and scalar factor.
struct Operand {
    name: Expr,
    labels: Vec<Expr>,
    flag: &'static str,
    alpha: Expr,
}

/// Reduce a factor expression to a named operand, emitting temporaries for
/// traces, nested products and sums.
fn operandize(e: &Expr, stmts: &mut Vec<Expr>) -> Result<Operand, TensorOpsError> {
    if is_general_tensor(e) {
        let gt = decompose_general_tensor(e)?;
        let labels = gt.labels();
        check_occurrences(&labels)?;
        let unique = labels
            .iter()
            .all(|l| labels.iter().filter(|m| *m == l).count() == 1);
        if unique {
            return Ok(Operand {
                name: gt.object,
                labels,
                flag: if gt.conj { "conj" } else { "plain" },
                alpha: gt.alpha,
            });
        }
        // Internal trace: materialize the traced factor first.
        let free: Vec<Expr> = labels
            .iter()
            .filter(|l| labels.iter().filter(|m| m == l).count() == 1)
            .cloned()
            .collect();
        let (perm, cind1, cind2) = trace_layout(&labels, &free)?;
        let tmp = Expr::sym(format!("#t{}", next_id()));
        stmts.push(Expr::Assign {
            kind: AssignKind::Assign,
            lhs: Box::new(tmp.clone()),
            rhs: Box::new(Expr::call(
                "cached_similar_from_indices",
                vec![
                    gt.object.clone(),
                    tuple(&perm),
                    tuple(&[]),
                    Expr::Int(next_id() as i64),
                ],
            )),
        });
        stmts.push(Expr::call(
            "trace",
            vec![
                gt.alpha,
                gt.object,
                Expr::sym(if gt.conj { "conj" } else { "plain" }),
                Expr::Int(0),
                tmp.clone(),
                tuple(&perm),
                tuple(&[]),
                tuple(&cind1),
                tuple(&cind2),
            ],
        ));
        return Ok(Operand {
            name: tmp,
            labels: free,
            flag: "plain",
            alpha: Expr::one(),
        });
    }

    // Nested product or sum: compute into a cached temporary.
    let free = free_labels(e)?;
    let tmp = Expr::sym(format!("#t{}", next_id()));
    if matches!(e, Expr::Call { head, args } if head == "*" && args.len() == 2) {
        emit_node(
            &tmp,
            &free,
            &[],
            Expr::one(),
            Expr::Int(0),
            e,
            Alloc::Cached,
            stmts,
        )?;
    } else {
        instantiate_rhs(
            &tmp,
            &free,
            &[],
            Expr::one(),
            Expr::Int(0),
            e,
            Alloc::Cached,
            stmts,
        )?;
    }
    Ok(Operand {
        name: tmp,
        labels: free,
        flag: "plain",
        alpha: Expr::one(),
    })
}

/// Allocation statement for a single-source destination.
fn emit_alloc_single(
    dst: &Expr,
    src: &Expr,
    left: &[usize],
    right: &[usize],
    alloc: Alloc,
    stmts: &mut Vec<Expr>,
) {
    let (head, extra) = match alloc {
        Alloc::None => return,
        Alloc::Fresh => ("similar_from_indices", None),
        Alloc::Cached => (
            "cached_similar_from_indices",
            Some(Expr::Int(next_id() as i64)),
        ),
    };
    let mut args = vec![src.clone(), tuple(left), tuple(right)];
    if let Some(site) = extra {
        args.push(site);
    }
    stmts.push(Expr::Assign {
        kind: AssignKind::Assign,
        lhs: Box::new(dst.clone()),
        rhs: Box::new(Expr::call(head, args)),
    });
}

/// Free labels of a factor: the labels occurring exactly once.
///
/// # Errors
///
/// `InvalidIndices` when a label occurs more than twice.
pub(crate) fn free_labels(e: &Expr) -> Result<Vec<Expr>, TensorOpsError> {
    if is_general_tensor(e) {
        let gt = decompose_general_tensor(e)?;
        let labels = gt.labels();
        check_occurrences(&labels)?;
        return Ok(once_labels(&labels));
    }
    match e {
        Expr::Call { head, args } if head == "*" => {
            let mut all = Vec::new();
            for a in args {
                if is_tensor_expr(a) {
                    all.extend(free_labels(a)?);
                }
            }
            check_occurrences(&all)?;
            Ok(once_labels(&all))
        }
        Expr::Call { head, args } if (head == "+" || head == "-") && !args.is_empty() => {
            free_labels(&args[0])
        }
        Expr::Call { head, args } if head == "/" && args.len() == 2 => free_labels(&args[0]),
        other => Err(TensorOpsError::invalid_expression(format!(
            "no index structure in {:?}",
            other
        ))),
    }
}

fn once_labels(labels: &[Expr]) -> Vec<Expr> {
    labels
        .iter()
        .filter(|l| labels.iter().filter(|m| m == l).count() == 1)
        .cloned()
        .collect()
}

fn check_occurrences(labels: &[Expr]) -> Result<(), TensorOpsError> {
    for l in labels {
        if labels.iter().filter(|m| *m == l).count() > 2 {
            return Err(TensorOpsError::invalid_indices(format!(
                "index {:?} appears more than twice",
                l
            )));
        }
    }
    Ok(())
}

fn negate(e: Expr) -> Expr {
    Expr::call("-", vec![e])
}

fn scale(a: Expr, b: Expr) -> Expr {
    if a.is_one() {
        b
    } else if b.is_one() {
        a
    } else {
        Expr::call("*", vec![a, b])
    }
}

fn tuple(positions: &[usize]) -> Expr {
    Expr::Tuple(positions.iter().map(|&p| Expr::Int(p as i64)).collect())
}

fn positions(n: usize) -> Vec<usize> {
    (0..n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::parse::parse;
    use crate::compiler::preprocess::{extract_tensor_objects, normalize_indices};

    fn lower(src: &str) -> Expr {
        let parsed = parse(src).unwrap();
        let normalized = normalize_indices(&parsed);
        instantiate(&extract_tensor_objects(&normalized))
    }

    fn kernel_calls(e: &Expr, head: &str) -> usize {
        match e {
            Expr::Call { head: h, args } => {
                usize::from(h == head) + args.iter().map(|a| kernel_calls(a, head)).sum::<usize>()
            }
            Expr::Block(items) => items.iter().map(|i| kernel_calls(i, head)).sum(),
            Expr::Assign { rhs, .. } => kernel_calls(rhs, head),
            Expr::Opaque(inner) => kernel_calls(inner, head),
            _ => 0,
        }
    }

    #[test]
    fn test_single_add() {
        let program = lower("C[i,j] = 2 * A[j,i]");
        assert_eq!(kernel_calls(&program, "add"), 1);
        assert_eq!(kernel_calls(&program, "contract"), 0);
    }

    #[test]
    fn test_single_trace() {
        let program = lower("E[a] := A[a,b,b]");
        assert_eq!(kernel_calls(&program, "trace"), 1);
        assert_eq!(kernel_calls(&program, "similar_from_indices"), 1);
    }

    #[test]
    fn test_chain_two_contracts() {
        let program = lower("D[a,d] := A[a,b] * B[b,c] * C[c,d]");
        assert_eq!(kernel_calls(&program, "contract"), 2);
        // One cached temporary for the inner node, one fresh output.
        assert_eq!(kernel_calls(&program, "cached_similar_from_indices"), 1);
        assert_eq!(kernel_calls(&program, "similar_from_indices"), 1);
    }

    #[test]
    fn test_trace_feeding_contract() {
        let program = lower("F[c] := A[a,b,b] * G[a,c]");
        assert_eq!(kernel_calls(&program, "trace"), 1);
        assert_eq!(kernel_calls(&program, "contract"), 1);
    }

    #[test]
    fn test_sum_accumulates() {
        let program = lower("C[i,j] = A[i,j] + B[j,i]");
        assert_eq!(kernel_calls(&program, "add"), 2);
    }

    #[test]
    fn test_batched_index_rejected() {
        // `a` in both factors and the output: three occurrences.
        let program = lower("F[a,c] := A[a,b,b] * G[a,c]");
        assert!(kernel_calls(&program, "index_error") >= 1);
    }

    #[test]
    fn test_triple_contracted_index_rejected() {
        let program = lower("D[i] := A[i,j] * B[j,k] * C[j,k]");
        assert!(kernel_calls(&program, "index_error") >= 1);
    }

    #[test]
    fn test_scalar_assignment() {
        let program = lower("x = scalar(A[i] * B[i])");
        assert_eq!(kernel_calls(&program, "contract"), 1);
        assert_eq!(kernel_calls(&program, "scalar"), 1);
    }
}
