//! Square-root linear algebra
//!
//! Primitives shared by the square-root filter and its backward sampler.
//! Every factor here is upper triangular with `UᵗU = Σ`; none of the
//! functions materialise a covariance unless they must re-factor it.

use nalgebra::{Cholesky, DMatrix, DVector};

use crate::{FilterError, Result};

// ============================================================================
// Factorisation
// ============================================================================

/// Upper Cholesky factor `U` of a symmetric matrix, `UᵗU = sigma`.
///
/// The input is symmetrised before factorisation. Fails with
/// [`FilterError::CholeskyFailure`] if `sigma` is not numerically positive
/// definite.
pub fn chol(sigma: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    assert!(sigma.is_square(), "Cholesky factorisation needs a square matrix");
    if sigma.nrows() == 0 {
        return Ok(DMatrix::zeros(0, 0));
    }
    let sym = (sigma + sigma.transpose()) * 0.5;
    let factor = Cholesky::new(sym).ok_or(FilterError::CholeskyFailure)?;
    Ok(factor.l().transpose())
}

/// Re-triangularises an arbitrary square-root factor.
///
/// For `a` of shape K×N with K ≥ N, returns an N×N upper-triangular `U` with
/// nonnegative diagonal such that `UᵗU = aᵗa`. Never fails, so it is safe on
/// rank-deficient factors.
pub fn retriangularize(a: &DMatrix<f64>) -> DMatrix<f64> {
    let n = a.ncols();
    if n == 0 {
        return DMatrix::zeros(0, 0);
    }
    let padded = if a.nrows() < n {
        let mut p = DMatrix::zeros(n, n);
        p.view_mut((0, 0), (a.nrows(), n)).copy_from(a);
        p
    } else {
        a.clone()
    };
    let mut u = padded.qr().r();
    for i in 0..n {
        if u[(i, i)] < 0.0 {
            u.row_mut(i).neg_mut();
        }
    }
    u
}

/// Symmetric rank-k update: `sigma ← beta·sigma + aᵗa`.
pub fn syrk(a: &DMatrix<f64>, beta: f64, sigma: &mut DMatrix<f64>) {
    assert_eq!(sigma.nrows(), a.ncols(), "Rank-k update shape mismatch");
    *sigma *= beta;
    *sigma += a.tr_mul(a);
}

/// Triangular multiply from the left: `b ← U·b`.
pub fn trmm(u: &DMatrix<f64>, b: &mut DMatrix<f64>) {
    *b = u.upper_triangle() * &*b;
}

/// Transposed triangular multiply from the left: `b ← Uᵗ·b`.
pub fn trmm_transpose(u: &DMatrix<f64>, b: &mut DMatrix<f64>) {
    *b = u.upper_triangle().tr_mul(b);
}

/// Forward substitution against a transposed upper factor: solves `Uᵗx = b`.
pub fn forward_solve(u: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
    u.tr_solve_upper_triangular(b)
        .ok_or(FilterError::CholeskyFailure)
}

/// Log-determinant of `UᵗU`, halved: `Σ ln U[i,i]`.
pub fn half_log_det(u: &DMatrix<f64>) -> f64 {
    u.diagonal().iter().map(|d| d.ln()).sum()
}

/// Checks that `u` is upper triangular with nonnegative diagonal.
pub fn is_upper_factor(u: &DMatrix<f64>) -> bool {
    u.is_square()
        && (0..u.nrows()).all(|i| u[(i, i)] >= 0.0 && (0..i).all(|j| u[(i, j)] == 0.0))
}

// ============================================================================
// Rank-1 Downdate and Conditioning
// ============================================================================

/// Relative tolerance, against the squared scale of the factor being
/// downdated, below which a pivot is taken as zero.
const DEGENERACY: f64 = 1e-10;

/// Largest column norm of `u`, the square root of the largest variance.
fn factor_scale(u: &DMatrix<f64>) -> f64 {
    u.column_iter().map(|c| c.norm()).fold(0.0, f64::max)
}

/// In-place rank-1 Cholesky downdate of an upper factor.
///
/// Computes `U'` with `U'ᵗU' = UᵗU − v·vᵗ`. `v` is used as workspace.
///
/// The result may be singular: a row whose pivot cancels to within rounding
/// of the original factor's scale is zeroed, and rows that are already zero
/// are skipped while `v` has no weight left on them.
///
/// # Errors
/// [`FilterError::CholeskyFailure`] if `UᵗU − v·vᵗ` is not positive
/// semi-definite.
pub fn chol_downdate(u: &mut DMatrix<f64>, v: &mut DVector<f64>) -> Result<()> {
    let scale = factor_scale(u).max(v.amax());
    downdate(u, v, scale)
}

fn downdate(u: &mut DMatrix<f64>, v: &mut DVector<f64>, scale: f64) -> Result<()> {
    let n = u.nrows();
    assert_eq!(v.len(), n, "Downdate vector length mismatch");
    let tol = DEGENERACY * scale * scale;
    let residual = DEGENERACY.sqrt() * scale;

    for j in 0..n {
        let ujj = u[(j, j)];
        let vj = v[j];
        if ujj == 0.0 {
            if vj.abs() <= residual {
                v[j] = 0.0;
                continue;
            }
            return Err(FilterError::CholeskyFailure);
        }
        let arg = ujj * ujj - vj * vj;
        if arg.abs() <= tol {
            // v matches row j: the row vanishes and takes v with it
            let s = vj / ujj;
            u[(j, j)] = 0.0;
            for i in (j + 1)..n {
                v[i] -= s * u[(j, i)];
                u[(j, i)] = 0.0;
            }
            v[j] = 0.0;
            continue;
        }
        if arg < 0.0 {
            return Err(FilterError::CholeskyFailure);
        }
        let r = arg.sqrt();
        let c = r / ujj;
        let s = vj / ujj;
        u[(j, j)] = r;
        for i in (j + 1)..n {
            let uji = (u[(j, i)] - s * v[i]) / c;
            u[(j, i)] = uji;
            v[i] = c * v[i] - s * uji;
        }
    }
    Ok(())
}

/// Upper factor of a positive semi-definite matrix.
///
/// Factors through the symmetric eigendecomposition, so singular input is
/// accepted: eigenvalues within `1e-10·scale²` of zero are clamped to it.
///
/// # Errors
/// [`FilterError::CholeskyFailure`] if an eigenvalue is below that floor.
pub fn psd_factor(sigma: &DMatrix<f64>, scale: f64) -> Result<DMatrix<f64>> {
    assert!(sigma.is_square(), "Factorisation needs a square matrix");
    let sym = (sigma + sigma.transpose()) * 0.5;
    let eigen = sym.symmetric_eigen();
    let floor = DEGENERACY * scale * scale;

    // rows of Λ^½·Qᵗ
    let mut root = eigen.eigenvectors.transpose();
    for (i, &lambda) in eigen.eigenvalues.iter().enumerate() {
        if lambda < -floor {
            return Err(FilterError::CholeskyFailure);
        }
        root.row_mut(i).scale_mut(lambda.max(0.0).sqrt());
    }
    Ok(retriangularize(&root))
}

/// Mean shift and `Vᵗ = U2⁻ᵗ·Cᵗ` of conditioning `x1` on `x2 = value`.
fn regression(
    mu2: &DVector<f64>,
    u2: &DMatrix<f64>,
    c: &DMatrix<f64>,
    value: &DVector<f64>,
) -> Result<(DVector<f64>, DMatrix<f64>)> {
    assert_eq!(c.ncols(), mu2.len(), "Cross-covariance columns must match x2");
    let w = forward_solve(u2, &(value - mu2))?;
    let vt = u2
        .tr_solve_upper_triangular(&c.transpose())
        .ok_or(FilterError::CholeskyFailure)?;
    Ok((vt.tr_mul(&w), vt))
}

/// Conditions a Gaussian on a jointly Gaussian observation.
///
/// On entry `(mu1, u1)` describe `x1 ~ N(mu1, U1ᵗU1)`, `(mu2, u2)` describe
/// `x2 ~ N(mu2, U2ᵗU2)` and `c = Cov(x1, x2)`. On success `(mu1, u1)`
/// describe `x1 | x2 = value`:
///
/// - `mu1 ← mu1 + V·U2⁻ᵗ(value − mu2)` with `V = C·U2⁻¹`
/// - `U1ᵗU1 ← U1ᵗU1 − V·Vᵗ`, one rank-1 downdate per column of `V`
pub fn condition(
    mu1: &mut DVector<f64>,
    u1: &mut DMatrix<f64>,
    mu2: &DVector<f64>,
    u2: &DMatrix<f64>,
    c: &DMatrix<f64>,
    value: &DVector<f64>,
) -> Result<()> {
    assert_eq!(c.nrows(), mu1.len(), "Cross-covariance rows must match x1");
    let (shift, vt) = regression(mu2, u2, c, value)?;

    let scale = factor_scale(u1);
    *mu1 += shift;
    for i in 0..vt.nrows() {
        let mut v = vt.row(i).transpose();
        downdate(u1, &mut v, scale)?;
    }
    Ok(())
}

/// [`condition`] for a conditional covariance that may be exactly singular.
///
/// Sequential downdates cannot tell a pivot cancelled by rounding from a
/// negative one once several directions vanish, so the conditional
/// covariance is formed densely and factored with [`psd_factor`].
pub fn condition_singular(
    mu1: &mut DVector<f64>,
    u1: &mut DMatrix<f64>,
    mu2: &DVector<f64>,
    u2: &DMatrix<f64>,
    c: &DMatrix<f64>,
    value: &DVector<f64>,
) -> Result<()> {
    assert_eq!(c.nrows(), mu1.len(), "Cross-covariance rows must match x1");
    let (shift, vt) = regression(mu2, u2, c, value)?;

    let upper = u1.upper_triangle();
    let sigma = upper.tr_mul(&upper) - vt.tr_mul(&vt);
    *u1 = psd_factor(&sigma, factor_scale(&upper))?;
    *mu1 += shift;
    Ok(())
}

// ============================================================================
// Gather / Scatter
// ============================================================================

/// Gathers the entries of `x` listed in `map`.
pub fn gather(x: &DVector<f64>, map: &[usize]) -> DVector<f64> {
    DVector::from_iterator(map.len(), map.iter().map(|&i| x[i]))
}

/// Gathers the columns of `a` listed in `map`.
pub fn gather_columns(a: &DMatrix<f64>, map: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), map.len(), |i, j| a[(i, map[j])])
}

/// Gathers the rows of `a` listed in `map`.
pub fn gather_rows(a: &DMatrix<f64>, map: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(map.len(), a.ncols(), |i, j| a[(map[i], j)])
}

/// Gathers the sub-matrix of `a` with rows `rows` and columns `cols`.
pub fn gather_matrix(a: &DMatrix<f64>, rows: &[usize], cols: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), cols.len(), |i, j| a[(rows[i], cols[j])])
}

/// Scatters `local` into `full` at the positions listed in `map`.
pub fn scatter(local: &DVector<f64>, map: &[usize], full: &mut DVector<f64>) {
    assert_eq!(local.len(), map.len(), "Scatter length mismatch");
    for (k, &i) in map.iter().enumerate() {
        full[i] = local[k];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spd() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 3, &[4.0, 2.0, 0.4, 2.0, 5.0, 1.0, 0.4, 1.0, 3.0])
    }

    #[test]
    fn test_chol_reconstructs() {
        let sigma = spd();
        let u = chol(&sigma).unwrap();
        assert!(is_upper_factor(&u));
        assert!((u.tr_mul(&u) - sigma).norm() < 1e-12);
    }

    #[test]
    fn test_chol_rejects_indefinite() {
        let sigma = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert_eq!(chol(&sigma), Err(FilterError::CholeskyFailure));
    }

    #[test]
    fn test_retriangularize_rank_deficient() {
        let a = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 0.0, 0.0, 0.0, 3.0]);
        let u = retriangularize(&a);
        assert_eq!(u.shape(), (3, 3));
        assert!(is_upper_factor(&u));
        assert!((u.tr_mul(&u) - a.tr_mul(&a)).norm() < 1e-12);
    }

    #[test]
    fn test_downdate() {
        let sigma = spd();
        let mut u = chol(&sigma).unwrap();
        let v = DVector::from_vec(vec![0.5, 1.0, 0.2]);
        let expected = &sigma - &v * v.transpose();
        let mut work = v.clone();
        chol_downdate(&mut u, &mut work).unwrap();
        assert!(is_upper_factor(&u));
        assert!((u.tr_mul(&u) - expected).norm() < 1e-10);
    }

    #[test]
    fn test_downdate_loses_definiteness() {
        let mut u = DMatrix::identity(2, 2);
        let mut v = DVector::from_vec(vec![1.5, 0.0]);
        assert_eq!(
            chol_downdate(&mut u, &mut v),
            Err(FilterError::CholeskyFailure)
        );
    }

    #[test]
    fn test_downdate_to_singular() {
        // removing the full weight of one row leaves a rank-one factor
        let u0 = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 0.0, 1.5]);
        let sigma = u0.tr_mul(&u0);
        let v = DVector::from_vec(vec![2.0, 1.0]);
        let expected = &sigma - &v * v.transpose();

        let mut u = u0.clone();
        let mut work = v.clone();
        chol_downdate(&mut u, &mut work).unwrap();
        assert!(is_upper_factor(&u));
        assert_eq!(u[(0, 0)], 0.0);
        assert!((u.tr_mul(&u) - expected).norm() < 1e-12);

        // a second downdate with no weight on the vanished row is accepted
        let mut w = DVector::from_vec(vec![0.0, 0.5]);
        chol_downdate(&mut u, &mut w).unwrap();
        assert!((u[(1, 1)] - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_downdate_tolerance_uses_original_scale() {
        // the second pivot shrinks to 1e-4 before cancelling; rounding in
        // that cancellation is relative to the unit scale, not to 1e-8
        let mut u = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1e-4]);
        let mut v = DVector::from_vec(vec![0.0, 1e-4 * (1.0 + 1e-9)]);
        chol_downdate(&mut u, &mut v).unwrap();
        assert_eq!(u[(1, 1)], 0.0);
        assert_eq!(u[(0, 0)], 1.0);
    }

    #[test]
    fn test_psd_factor_accepts_singular() {
        let a = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 0.5, 0.0, 1.0, -1.0]);
        let mut sigma = a.tr_mul(&a);
        // rounding-sized indefiniteness
        sigma[(2, 2)] -= 1e-15;
        let u = psd_factor(&sigma, 2.0).unwrap();
        assert!(is_upper_factor(&u));
        assert!((u.tr_mul(&u) - &sigma).norm() < 1e-10);

        let indefinite = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert_eq!(psd_factor(&indefinite, 1.0), Err(FilterError::CholeskyFailure));
    }

    #[test]
    fn test_condition_singular_pins_components() {
        // x2 = (x1[0] + x1[1], x1[2]) leaves one free direction in x1
        let s11 = DMatrix::from_row_slice(3, 3, &[2.0, 0.4, 0.1, 0.4, 1.0, 0.3, 0.1, 0.3, 1.5]);
        let b = DMatrix::from_row_slice(2, 3, &[1.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        let c = &s11 * b.transpose();
        let s22 = &b * &s11 * b.transpose();

        let mut mu1 = DVector::zeros(3);
        let mut u1 = chol(&s11).unwrap();
        let mu2 = DVector::zeros(2);
        let u2 = chol(&s22).unwrap();
        let value = DVector::from_vec(vec![1.0, -0.5]);

        let s22_inv = s22.clone().try_inverse().unwrap();
        let expected_mean = &c * &s22_inv * &value;
        let expected_cov = &s11 - &c * &s22_inv * c.transpose();

        condition_singular(&mut mu1, &mut u1, &mu2, &u2, &c, &value).unwrap();
        assert!(is_upper_factor(&u1));
        assert!((&mu1 - expected_mean).norm() < 1e-12);
        assert!((u1.tr_mul(&u1) - expected_cov).norm() < 1e-10);
        // the pinned combinations have no spread left
        assert!((mu1[0] + mu1[1] - 1.0).abs() < 1e-12);
        assert!((&b * u1.tr_mul(&u1) * b.transpose()).norm() < 1e-10);
    }

    #[test]
    fn test_condition_matches_dense_formula() {
        // Joint over (x1 in R^2, x2 in R^1)
        let joint = DMatrix::from_row_slice(3, 3, &[2.0, 0.3, 0.8, 0.3, 1.0, 0.2, 0.8, 0.2, 1.5]);
        let s11 = joint.view((0, 0), (2, 2)).clone_owned();
        let s12 = joint.view((0, 2), (2, 1)).clone_owned();
        let s22 = joint.view((2, 2), (1, 1)).clone_owned();

        let mut mu1 = DVector::from_vec(vec![1.0, -1.0]);
        let mut u1 = chol(&s11).unwrap();
        let mu2 = DVector::from_vec(vec![0.5]);
        let u2 = chol(&s22).unwrap();
        let value = DVector::from_vec(vec![1.25]);

        let s22_inv = s22.clone().try_inverse().unwrap();
        let expected_mean = &mu1 + &s12 * &s22_inv * (&value - &mu2);
        let expected_cov = &s11 - &s12 * &s22_inv * s12.transpose();

        condition(&mut mu1, &mut u1, &mu2, &u2, &s12, &value).unwrap();
        assert!((mu1 - expected_mean).norm() < 1e-12);
        assert!((u1.tr_mul(&u1) - expected_cov).norm() < 1e-12);
    }

    #[test]
    fn test_gather_scatter() {
        let x = DVector::from_vec(vec![10.0, 11.0, 12.0, 13.0]);
        let map = [3, 1];
        let local = gather(&x, &map);
        assert_eq!(local.as_slice(), &[13.0, 11.0]);

        let mut full = DVector::zeros(4);
        scatter(&local, &map, &mut full);
        assert_eq!(full.as_slice(), &[0.0, 11.0, 0.0, 13.0]);

        let a = DMatrix::from_fn(3, 4, |i, j| (10 * i + j) as f64);
        assert_eq!(gather_columns(&a, &map)[(2, 0)], 23.0);
        assert_eq!(gather_rows(&a, &[2])[(0, 1)], 21.0);
        assert_eq!(gather_matrix(&a, &[1], &[0, 3]).as_slice(), &[10.0, 13.0]);
    }

    #[test]
    fn test_triangular_ops() {
        let u = chol(&spd()).unwrap();
        let mut b = DMatrix::identity(3, 3);
        trmm(&u, &mut b);
        assert!((b.clone() - &u).norm() < 1e-14);
        trmm_transpose(&u, &mut b);
        assert!((b - spd()).norm() < 1e-12);

        let mut sigma = DMatrix::identity(3, 3);
        syrk(&u, 0.0, &mut sigma);
        assert!((sigma - spd()).norm() < 1e-12);
    }
}
