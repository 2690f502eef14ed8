//! Pairwise contraction kernel.
//!
//! `contract` computes `C ← β·C + α · opA(A) · opB(B)` with the contracted
//! axes of `A` matched against those of `B` and the open axes gathered into
//! `C`. When the element type has GEMM kernels and the BLAS path is
//! enabled, operands are fused into 2-D matrices, repacked through cached
//! temporaries when their stride layout does not permit it, and the
//! multiply is dispatched to faer. Otherwise a broadcast-padded strided
//! reduction computes the same sum directly.

use smallvec::SmallVec;

use crate::blas::{blas_enabled, is_blas_scalar, mul_into, GemmOperand};
use crate::cache;
use crate::error::TensorOpsError;
use crate::fuse::{is_blas_contractable, BlasRole};
use crate::kernels::{add, Conj};
use crate::scalar::Scalar;
use crate::strides::{inverse_permutation, is_permutation};
use crate::structure::allocate;
use crate::tensor::Tensor;
use crate::view::{reduce_pair_into, Dims, StridedView, StridedViewMut};

/// `C ← β·C + α · opA(A) · opB(B)`.
///
/// * `oind_a`/`cind_a`: open and contracted axis positions of `A`; their
///   concatenation must permute `0..rank(A)` (likewise for `B`).
/// * `cind_a[k]` is contracted against `cind_b[k]`.
/// * `ind_c[k]`: position of `C`'s axis `k` in `(open A..., open B...)`.
/// * `sites`: optional call-site tags for caching the three repack
///   temporaries of the GEMM path.
///
/// # Errors
///
/// * `InvalidIndices` if any selection fails its permutation precondition.
/// * `DimensionMismatch` if contracted or open axis sizes disagree.
///
/// # Examples
///
/// ```
/// use tensorops::{contract, Conj, Tensor};
///
/// // C[i,l] = Σ_j A[i,j]·B[j,l]
/// let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
/// let b = Tensor::ones(&[3, 4]);
/// let mut c = Tensor::zeros(&[2, 4]);
/// contract(
///     1.0, &a, Conj::Plain, &b, Conj::Plain, 0.0, &mut c,
///     &[0], &[1], &[1], &[0], &[0, 1], None,
/// )
/// .unwrap();
/// assert_eq!(c.get(&[0, 0]), Some(&9.0)); // 1 + 3 + 5
/// ```
#[allow(clippy::too_many_arguments)]
pub fn contract<T: Scalar>(
    alpha: T,
    a: &Tensor<T>,
    conj_a: Conj,
    b: &Tensor<T>,
    conj_b: Conj,
    beta: T,
    c: &mut Tensor<T>,
    oind_a: &[usize],
    cind_a: &[usize],
    oind_b: &[usize],
    cind_b: &[usize],
    ind_c: &[usize],
    sites: Option<[u64; 3]>,
) -> Result<(), TensorOpsError> {
    validate(a, b, c, oind_a, cind_a, oind_b, cind_b, ind_c)?;

    let m: usize = oind_a.iter().map(|&p| a.shape()[p]).product();
    let n: usize = oind_b.iter().map(|&p| b.shape()[p]).product();
    let k: usize = cind_a.iter().map(|&p| a.shape()[p]).product();

    if m * n == 0 {
        return Ok(());
    }
    if k == 0 {
        scale_in_place(beta, c);
        return Ok(());
    }

    if blas_enabled() && is_blas_scalar::<T>() {
        contract_gemm(
            alpha, a, conj_a, b, conj_b, beta, c, oind_a, cind_a, oind_b, cind_b, ind_c, sites, m,
            n, k,
        )
    } else {
        contract_native(
            alpha, a, conj_a, b, conj_b, beta, c, oind_a, cind_a, oind_b, cind_b, ind_c,
        )
    }
}

#[allow(clippy::too_many_arguments)]
fn validate<T: Scalar>(
    a: &Tensor<T>,
    b: &Tensor<T>,
    c: &Tensor<T>,
    oind_a: &[usize],
    cind_a: &[usize],
    oind_b: &[usize],
    cind_b: &[usize],
    ind_c: &[usize],
) -> Result<(), TensorOpsError> {
    if cind_a.len() != cind_b.len() {
        return Err(TensorOpsError::invalid_indices(format!(
            "contracted selections {:?} and {:?} differ in length",
            cind_a, cind_b
        )));
    }
    let all_a: Vec<usize> = oind_a.iter().chain(cind_a.iter()).copied().collect();
    if !is_permutation(&all_a, a.ndim()) {
        return Err(TensorOpsError::invalid_indices(format!(
            "selections {:?}/{:?} do not permute the {} axes of the first operand",
            oind_a,
            cind_a,
            a.ndim()
        )));
    }
    let all_b: Vec<usize> = oind_b.iter().chain(cind_b.iter()).copied().collect();
    if !is_permutation(&all_b, b.ndim()) {
        return Err(TensorOpsError::invalid_indices(format!(
            "selections {:?}/{:?} do not permute the {} axes of the second operand",
            oind_b,
            cind_b,
            b.ndim()
        )));
    }
    if c.ndim() != oind_a.len() + oind_b.len() || !is_permutation(ind_c, c.ndim()) {
        return Err(TensorOpsError::invalid_indices(format!(
            "output selection {:?} does not permute the {} open axes",
            ind_c,
            oind_a.len() + oind_b.len()
        )));
    }
    for (&pa, &pb) in cind_a.iter().zip(cind_b.iter()) {
        if a.shape()[pa] != b.shape()[pb] {
            return Err(TensorOpsError::DimensionMismatch {
                expected: a.shape()[pa],
                actual: b.shape()[pb],
            });
        }
    }
    let open_sizes: Vec<usize> = oind_a
        .iter()
        .map(|&p| a.shape()[p])
        .chain(oind_b.iter().map(|&p| b.shape()[p]))
        .collect();
    for (axis, &pos) in ind_c.iter().enumerate() {
        if c.shape()[axis] != open_sizes[pos] {
            return Err(TensorOpsError::DimensionMismatch {
                expected: open_sizes[pos],
                actual: c.shape()[axis],
            });
        }
    }
    Ok(())
}

fn scale_in_place<T: Scalar>(beta: T, c: &mut Tensor<T>) {
    if beta == T::zero() {
        c.fill(T::zero());
    } else if beta != T::one() {
        for x in c.data_mut() {
            *x = beta * *x;
        }
    }
}

fn src_role(conj: Conj) -> BlasRole {
    if conj.conjugates() {
        BlasRole::ConjSource
    } else {
        BlasRole::PlainSource
    }
}

/// Check whether the `(p1, p2)`-ordered view of `t` reshapes in place to a
/// `(rows, cols)` matrix, via the view layer's `sreshape`. Returns the
/// orientation: `false` for column-major `(rows, cols)`, `true` when the
/// buffer holds the transpose.
fn fused_orientation<T: Scalar>(
    t: &Tensor<T>,
    p1: &[usize],
    p2: &[usize],
    rows: usize,
    cols: usize,
) -> Option<bool> {
    let sel: Vec<usize> = p1.iter().chain(p2.iter()).copied().collect();
    let matrix = StridedView::permuted(t, &sel, false).sreshape(&[rows, cols])?;
    let (r, c) = (matrix.strides()[0], matrix.strides()[1]);
    if (rows <= 1 || r == 1) && (cols <= 1 || c == rows) {
        return Some(false);
    }
    if (cols <= 1 || c == 1) && (rows <= 1 || r == cols) {
        return Some(true);
    }
    None
}

fn alloc_temp<T: Scalar>(sites: Option<[u64; 3]>, slot: usize, shape: &[usize]) -> Tensor<T> {
    match sites {
        Some(tags) => cache::take_or_alloc(tags[slot], shape),
        None => allocate(shape),
    }
}

fn release_temp<T: Scalar>(sites: Option<[u64; 3]>, slot: usize, tensor: Tensor<T>) {
    if let Some(tags) = sites {
        cache::give_back(tags[slot], tensor);
    }
}

#[allow(clippy::too_many_arguments)]
fn contract_gemm<T: Scalar>(
    alpha: T,
    a: &Tensor<T>,
    conj_a: Conj,
    b: &Tensor<T>,
    conj_b: Conj,
    beta: T,
    c: &mut Tensor<T>,
    oind_a: &[usize],
    cind_a: &[usize],
    oind_b: &[usize],
    cind_b: &[usize],
    ind_c: &[usize],
    sites: Option<[u64; 3]>,
    m: usize,
    n: usize,
    k: usize,
) -> Result<(), TensorOpsError> {
    let n_oa = oind_a.len();
    let n_ob = oind_b.len();
    let inv_c = inverse_permutation(ind_c);
    let c_p1: Vec<usize> = inv_c[..n_oa].to_vec();
    let c_p2: Vec<usize> = inv_c[n_oa..].to_vec();

    // Memory-cost heuristic over the two operand orderings: an operand that
    // is not directly usable in its role costs one repack of its length.
    let a_ok = is_blas_contractable(a, conj_a.conjugates(), oind_a, cind_a, src_role(conj_a));
    let b_ok = is_blas_contractable(b, conj_b.conjugates(), cind_b, oind_b, src_role(conj_b));
    let c_ok = is_blas_contractable(c, false, &c_p1, &c_p2, BlasRole::Destination);
    let cost_ab =
        a.len() * usize::from(!a_ok) + b.len() * usize::from(!b_ok) + c.len() * usize::from(!c_ok);

    let a_ok_sw = is_blas_contractable(b, conj_b.conjugates(), oind_b, cind_b, src_role(conj_b));
    let b_ok_sw = is_blas_contractable(a, conj_a.conjugates(), cind_a, oind_a, src_role(conj_a));
    let c_ok_sw = is_blas_contractable(c, false, &c_p2, &c_p1, BlasRole::Destination);
    let cost_ba = b.len() * usize::from(!a_ok_sw)
        + a.len() * usize::from(!b_ok_sw)
        + c.len() * usize::from(!c_ok_sw);

    if cost_ba < cost_ab {
        let ind_c_sw: Vec<usize> = ind_c
            .iter()
            .map(|&j| if j < n_oa { j + n_ob } else { j - n_oa })
            .collect();
        return contract(
            alpha,
            b,
            conj_b,
            a,
            conj_a,
            beta,
            c,
            oind_b,
            cind_b,
            oind_a,
            cind_a,
            &ind_c_sw,
            sites.map(|[sa, sb, sc]| [sb, sa, sc]),
        );
    }

    // A-preparation: use in place when the (open, contracted) groups fuse,
    // otherwise repack into an (open..., contracted...) temporary.
    let a_orient = if a_ok {
        fused_orientation(a, oind_a, cind_a, m, k)
    } else {
        None
    };
    let a_tmp: Option<Tensor<T>> = if a_orient.is_none() {
        let shape: Vec<usize> = oind_a
            .iter()
            .chain(cind_a.iter())
            .map(|&p| a.shape()[p])
            .collect();
        let mut t = alloc_temp(sites, 0, &shape);
        add(T::one(), a, conj_a, T::zero(), &mut t, oind_a, cind_a)?;
        Some(t)
    } else {
        None
    };

    // B-preparation mirrors A with the contracted axes first, giving the
    // (contracted, open) matmul shape.
    let b_orient = if b_ok {
        fused_orientation(b, cind_b, oind_b, k, n)
    } else {
        None
    };
    let b_tmp: Option<Tensor<T>> = if b_orient.is_none() {
        let shape: Vec<usize> = cind_b
            .iter()
            .chain(oind_b.iter())
            .map(|&p| b.shape()[p])
            .collect();
        let mut t = alloc_temp(sites, 1, &shape);
        add(T::one(), b, conj_b, T::zero(), &mut t, cind_b, oind_b)?;
        Some(t)
    } else {
        None
    };

    // C-preparation: write straight into C when its open-axis groups fuse
    // in destination orientation, else multiply into a temporary and
    // permute-accumulate afterwards.
    let c_direct = c_ok && fused_orientation(c, &c_p1, &c_p2, m, n) == Some(false);

    let a_op = match &a_tmp {
        Some(t) => GemmOperand {
            data: t.data(),
            rows: m,
            cols: k,
            trans: false,
            conj: false,
        },
        None => GemmOperand {
            data: a.data(),
            rows: m,
            cols: k,
            trans: a_orient.unwrap_or(false),
            conj: conj_a.conjugates(),
        },
    };
    let b_op = match &b_tmp {
        Some(t) => GemmOperand {
            data: t.data(),
            rows: k,
            cols: n,
            trans: false,
            conj: false,
        },
        None => GemmOperand {
            data: b.data(),
            rows: k,
            cols: n,
            trans: b_orient.unwrap_or(false),
            conj: conj_b.conjugates(),
        },
    };

    if c_direct {
        let handled = mul_into(alpha, &a_op, &b_op, beta, c.data_mut(), m, n);
        debug_assert!(handled);
    } else {
        let open_shape: Vec<usize> = oind_a
            .iter()
            .map(|&p| a.shape()[p])
            .chain(oind_b.iter().map(|&p| b.shape()[p]))
            .collect();
        let mut ct = alloc_temp(sites, 2, &open_shape);
        let handled = mul_into(T::one(), &a_op, &b_op, T::zero(), ct.data_mut(), m, n);
        debug_assert!(handled);
        add(alpha, &ct, Conj::Plain, beta, c, ind_c, &[])?;
        release_temp(sites, 2, ct);
    }

    if let Some(t) = a_tmp {
        release_temp(sites, 0, t);
    }
    if let Some(t) = b_tmp {
        release_temp(sites, 1, t);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn contract_native<T: Scalar>(
    alpha: T,
    a: &Tensor<T>,
    conj_a: Conj,
    b: &Tensor<T>,
    conj_b: Conj,
    beta: T,
    c: &mut Tensor<T>,
    oind_a: &[usize],
    cind_a: &[usize],
    oind_b: &[usize],
    cind_b: &[usize],
    ind_c: &[usize],
) -> Result<(), TensorOpsError> {
    // All three operands are viewed over the common shape
    // (open A..., open B..., contracted...); axes an operand does not own
    // broadcast with stride 0.
    let mut da: Dims = SmallVec::new();
    let mut sa: Dims = SmallVec::new();
    let mut db: Dims = SmallVec::new();
    let mut sb: Dims = SmallVec::new();
    for &p in oind_a {
        da.push(a.shape()[p]);
        sa.push(a.strides()[p]);
        db.push(a.shape()[p]);
        sb.push(0);
    }
    for &p in oind_b {
        da.push(b.shape()[p]);
        sa.push(0);
        db.push(b.shape()[p]);
        sb.push(b.strides()[p]);
    }
    for (&pa, &pb) in cind_a.iter().zip(cind_b.iter()) {
        da.push(a.shape()[pa]);
        sa.push(a.strides()[pa]);
        db.push(b.shape()[pb]);
        sb.push(b.strides()[pb]);
    }
    let va = StridedView::new(a.data(), da, sa, 0, conj_a.conjugates());
    let vb = StridedView::new(b.data(), db, sb, 0, conj_b.conjugates());

    let inv_c = inverse_permutation(ind_c);
    let open_dims: Dims = va.dims()[..inv_c.len()].iter().copied().collect();
    let open_strides: Dims = inv_c.iter().map(|&axis| c.strides()[axis]).collect();
    let mut dst = StridedViewMut::new(c.data_mut(), open_dims, open_strides, 0);

    reduce_pair_into(alpha, &va, &vb, beta, &mut dst)
}
