//! Index-label tuple algebra.
//!
//! The compiler works with symbolic index labels; the kernels work with
//! axis positions. The functions here bridge the two: given the label
//! tuples attached to the operands and the destination, they produce the
//! position tuples the kernels consume, and reject anything that violates
//! the permutation preconditions (a label occurring more than twice, a
//! destination label missing from the source, ...).
//!
//! All functions are total over their label type; failures are reported as
//! `InvalidIndices`.

use std::fmt::Debug;

use crate::error::TensorOpsError;

/// `a` with the first occurrence of each element of `b` removed,
/// preserving order. Assumes `b ⊆ a` with multiplicity.
pub fn setdiff<L: PartialEq + Clone>(a: &[L], b: &[L]) -> Vec<L> {
    let mut out: Vec<Option<L>> = a.iter().cloned().map(Some).collect();
    for x in b {
        if let Some(slot) = out
            .iter_mut()
            .find(|s| s.as_ref().map(|v| v == x).unwrap_or(false))
        {
            *slot = None;
        }
    }
    out.into_iter().flatten().collect()
}

/// Deduplicate a sequence in which every element appears exactly twice,
/// preserving first-occurrence order.
pub fn unique_pairs<L: PartialEq + Clone>(src: &[L]) -> Vec<L> {
    let mut out: Vec<L> = Vec::with_capacity(src.len() / 2);
    for x in src {
        if !out.contains(x) {
            out.push(x.clone());
        }
    }
    out
}

/// Count occurrences of `x` in `labels`.
fn count<L: PartialEq>(labels: &[L], x: &L) -> usize {
    labels.iter().filter(|l| *l == x).count()
}

/// The permutation `π` with `ia[π[k]] == ic[k]`, for equal-multiset label
/// tuples (the `add` kernel layout).
///
/// # Errors
///
/// `InvalidIndices` if the tuples differ in length or content.
pub fn add_permutation<L: PartialEq + Clone + Debug>(
    ia: &[L],
    ic: &[L],
) -> Result<Vec<usize>, TensorOpsError> {
    if ia.len() != ic.len() {
        return Err(TensorOpsError::invalid_indices(format!(
            "{:?} and {:?} have different lengths",
            ia, ic
        )));
    }
    let mut used = vec![false; ia.len()];
    let mut perm = Vec::with_capacity(ic.len());
    for label in ic {
        let pos = ia
            .iter()
            .enumerate()
            .position(|(p, l)| !used[p] && l == label)
            .ok_or_else(|| {
                TensorOpsError::invalid_indices(format!(
                    "index {:?} of {:?} not found in {:?}",
                    label, ic, ia
                ))
            })?;
        used[pos] = true;
        perm.push(pos);
    }
    Ok(perm)
}

/// Layout for the `trace` kernel: positions in `ia` of the free indices in
/// `ic` order, plus the first and second occurrences of each traced label.
///
/// Free labels must occur exactly once in `ia` and once in `ic`; every
/// other label of `ia` must occur exactly twice.
///
/// # Errors
///
/// `InvalidIndices` if a label occurs more than twice, a free label is
/// missing, or the resulting positions do not cover `0..ia.len()`.
pub fn trace_layout<L: PartialEq + Clone + Debug>(
    ia: &[L],
    ic: &[L],
) -> Result<(Vec<usize>, Vec<usize>, Vec<usize>), TensorOpsError> {
    for label in ic {
        if count(ic, label) != 1 {
            return Err(TensorOpsError::invalid_indices(format!(
                "duplicate output index {:?} in {:?}",
                label, ic
            )));
        }
        if count(ia, label) != 1 {
            return Err(TensorOpsError::invalid_indices(format!(
                "output index {:?} must appear exactly once in {:?}",
                label, ia
            )));
        }
    }
    let mut perm = Vec::with_capacity(ic.len());
    for label in ic {
        perm.push(ia.iter().position(|l| l == label).unwrap());
    }

    // Whatever remains after removing the free labels must pair up.
    let traced = unique_pairs(&setdiff(ia, ic));
    let mut cind1 = Vec::new();
    let mut cind2 = Vec::new();
    for label in &traced {
        match count(ia, label) {
            2 => {
                let p1 = ia.iter().position(|l| l == label).unwrap();
                let p2 = ia.iter().skip(p1 + 1).position(|l| l == label).unwrap() + p1 + 1;
                cind1.push(p1);
                cind2.push(p2);
            }
            n => {
                return Err(TensorOpsError::invalid_indices(format!(
                    "traced index {:?} appears {} times in {:?}",
                    label, n, ia
                )));
            }
        }
    }
    if perm.len() + cind1.len() + cind2.len() != ia.len() {
        return Err(TensorOpsError::invalid_indices(format!(
            "indices {:?} -> {:?} do not cover the operand axes",
            ia, ic
        )));
    }
    Ok((perm, cind1, cind2))
}

/// Layout produced by [`contract_layout`] for the `contract` kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractLayout {
    /// Open axis positions in A, in the order they appear in A.
    pub oind_a: Vec<usize>,
    /// Contracted axis positions in A.
    pub cind_a: Vec<usize>,
    /// Open axis positions in B.
    pub oind_b: Vec<usize>,
    /// Contracted axis positions in B, paired with `cind_a`.
    pub cind_b: Vec<usize>,
    /// For each destination axis, its position in `(open A..., open B...)`.
    pub ind_c: Vec<usize>,
}

/// Partition the labels of a pairwise contraction into open and contracted
/// positions and derive the output permutation.
///
/// A label shared between `ia` and `ib` is contracted; it must occur once
/// in each and must not appear in `ic`. Every remaining label must occur
/// once in its operand and once in `ic`.
///
/// # Errors
///
/// `InvalidIndices` on any label occurring more than twice across the
/// contraction, or on open/output label mismatch.
pub fn contract_layout<L: PartialEq + Clone + Debug>(
    ia: &[L],
    ib: &[L],
    ic: &[L],
) -> Result<ContractLayout, TensorOpsError> {
    for label in ia {
        if count(ia, label) != 1 {
            return Err(TensorOpsError::invalid_indices(format!(
                "index {:?} repeated within operand {:?}; trace it first",
                label, ia
            )));
        }
    }
    for label in ib {
        if count(ib, label) != 1 {
            return Err(TensorOpsError::invalid_indices(format!(
                "index {:?} repeated within operand {:?}; trace it first",
                label, ib
            )));
        }
    }

    let mut cind_a = Vec::new();
    let mut cind_b = Vec::new();
    let mut contracted: Vec<L> = Vec::new();
    for (p, label) in ia.iter().enumerate() {
        if let Some(q) = ib.iter().position(|l| l == label) {
            if ic.contains(label) {
                return Err(TensorOpsError::invalid_indices(format!(
                    "index {:?} appears more than twice across the contraction",
                    label
                )));
            }
            cind_a.push(p);
            cind_b.push(q);
            contracted.push(label.clone());
        }
    }
    // The open labels of each operand are what is left after the
    // contracted ones are taken out.
    let open_a = setdiff(ia, &contracted);
    let open_b = setdiff(ib, &contracted);
    let oind_a: Vec<usize> = open_a
        .iter()
        .map(|l| ia.iter().position(|m| m == l).unwrap())
        .collect();
    let oind_b: Vec<usize> = open_b
        .iter()
        .map(|l| ib.iter().position(|m| m == l).unwrap())
        .collect();
    let open_labels: Vec<L> = open_a.into_iter().chain(open_b).collect();

    if ic.len() != open_labels.len() {
        return Err(TensorOpsError::invalid_indices(format!(
            "output indices {:?} do not match the open indices {:?}",
            ic, open_labels
        )));
    }
    let ind_c = add_permutation(&open_labels, ic)?;
    Ok(ContractLayout {
        oind_a,
        cind_a,
        oind_b,
        cind_b,
        ind_c,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setdiff() {
        assert_eq!(setdiff(&['a', 'b', 'c', 'b'], &['b']), vec!['a', 'c', 'b']);
        assert_eq!(setdiff(&['a', 'b'], &[]), vec!['a', 'b']);
        assert_eq!(setdiff(&['a', 'b'], &['a', 'b']), Vec::<char>::new());
    }

    #[test]
    fn test_unique_pairs() {
        assert_eq!(unique_pairs(&['a', 'b', 'a', 'b']), vec!['a', 'b']);
        assert_eq!(unique_pairs(&['x', 'x']), vec!['x']);
    }

    #[test]
    fn test_add_permutation() {
        // C[i,j,k] = A[k,i,j]: position of each C label in A
        let perm = add_permutation(&['k', 'i', 'j'], &['i', 'j', 'k']).unwrap();
        assert_eq!(perm, vec![1, 2, 0]);
        assert!(add_permutation(&['i', 'j'], &['i', 'x']).is_err());
        assert!(add_permutation(&['i'], &['i', 'j']).is_err());
    }

    #[test]
    fn test_trace_layout() {
        // C[j] = A[i,j,i]
        let (perm, c1, c2) = trace_layout(&['i', 'j', 'i'], &['j']).unwrap();
        assert_eq!(perm, vec![1]);
        assert_eq!(c1, vec![0]);
        assert_eq!(c2, vec![2]);
    }

    #[test]
    fn test_trace_layout_triple_occurrence() {
        assert!(trace_layout(&['i', 'i', 'i'], &[]).is_err());
    }

    #[test]
    fn test_trace_layout_two_pairs() {
        let (perm, c1, c2) = trace_layout(&['i', 'j', 'a', 'j', 'i'], &['a']).unwrap();
        assert_eq!(perm, vec![2]);
        assert_eq!(c1, vec![0, 1]);
        assert_eq!(c2, vec![4, 3]);
    }

    #[test]
    fn test_contract_layout_matmul() {
        // C[i,l] = A[i,j] * B[j,l]
        let layout = contract_layout(&['i', 'j'], &['j', 'l'], &['i', 'l']).unwrap();
        assert_eq!(layout.oind_a, vec![0]);
        assert_eq!(layout.cind_a, vec![1]);
        assert_eq!(layout.oind_b, vec![1]);
        assert_eq!(layout.cind_b, vec![0]);
        assert_eq!(layout.ind_c, vec![0, 1]);
    }

    #[test]
    fn test_contract_layout_permuted_output() {
        // C[l,i] = A[i,j] * B[j,l]
        let layout = contract_layout(&['i', 'j'], &['j', 'l'], &['l', 'i']).unwrap();
        assert_eq!(layout.ind_c, vec![1, 0]);
    }

    #[test]
    fn test_contract_layout_triple_rejected() {
        // j appears in A, B and C
        assert!(contract_layout(&['i', 'j'], &['j', 'l'], &['i', 'j', 'l']).is_err());
    }

    #[test]
    fn test_contract_layout_repeated_within_operand() {
        assert!(contract_layout(&['i', 'i'], &['j'], &['j']).is_err());
    }

    #[test]
    fn test_contract_layout_outer_product() {
        let layout = contract_layout(&['i'], &['j'], &['j', 'i']).unwrap();
        assert!(layout.cind_a.is_empty());
        assert_eq!(layout.ind_c, vec![1, 0]);
    }
}
