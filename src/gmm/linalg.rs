//! Small dense linear algebra helpers for covariance matrices.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::{Result, VcError};

/// Lower-triangular Cholesky factor `L` with `a = L L'`, or `None` if `a`
/// is not numerically positive definite.
pub fn cholesky(a: ArrayView2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::zeros((n, n));
    for j in 0..n {
        let mut diag = a[[j, j]];
        for k in 0..j {
            diag -= l[[j, k]] * l[[j, k]];
        }
        if !(diag > 0.0) || !diag.is_finite() {
            return None;
        }
        let diag = diag.sqrt();
        l[[j, j]] = diag;
        for i in (j + 1)..n {
            let mut value = a[[i, j]];
            for k in 0..j {
                value -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = value / diag;
        }
    }
    Some(l)
}

/// Cholesky factor of `a`, adding a growing ridge to the diagonal until
/// the factorization succeeds. Returns the factor and the ridge used.
pub fn regularized_cholesky(
    a: ArrayView2<f64>,
    floor: f64,
    context: &'static str,
) -> Result<(Array2<f64>, f64)> {
    if let Some(l) = cholesky(a) {
        return Ok((l, 0.0));
    }
    let scale = (0..a.nrows())
        .map(|i| a[[i, i]].abs())
        .fold(0.0, f64::max)
        .max(1.0);
    let mut ridge = floor.max(f64::EPSILON) * scale;
    for _ in 0..12 {
        let mut shifted = a.to_owned();
        shifted.diag_mut().mapv_inplace(|v| v + ridge);
        if let Some(l) = cholesky(shifted.view()) {
            tracing::warn!(context, ridge, "Covariance was regularized before factorization");
            return Ok((l, ridge));
        }
        ridge *= 10.0;
    }
    Err(VcError::SingularMatrix(context))
}

/// Solve `L z = b` for lower-triangular `L`.
pub fn solve_lower(l: ArrayView2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut z = Array1::zeros(n);
    for i in 0..n {
        let mut value = b[i];
        for k in 0..i {
            value -= l[[i, k]] * z[k];
        }
        z[i] = value / l[[i, i]];
    }
    z
}

/// Solve `L' x = z` for lower-triangular `L`.
fn solve_lower_transposed(l: ArrayView2<f64>, z: ArrayView1<f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut value = z[i];
        for k in (i + 1)..n {
            value -= l[[k, i]] * x[k];
        }
        x[i] = value / l[[i, i]];
    }
    x
}

/// `log |a|` from the Cholesky factor of `a`.
pub fn log_det_cholesky(l: ArrayView2<f64>) -> f64 {
    2.0 * l.diag().iter().map(|v| v.ln()).sum::<f64>()
}

/// Inverse of a symmetric positive definite matrix from its Cholesky factor.
pub fn inverse_from_cholesky(l: ArrayView2<f64>) -> Array2<f64> {
    let n = l.nrows();
    let mut inv = Array2::zeros((n, n));
    let mut unit = Array1::zeros(n);
    for j in 0..n {
        unit.fill(0.0);
        unit[j] = 1.0;
        let z = solve_lower(l, unit.view());
        inv.column_mut(j).assign(&solve_lower_transposed(l, z.view()));
    }
    // symmetrize away rounding noise
    let transposed = inv.t().to_owned();
    (inv + transposed) * 0.5
}

/// Solve `a x = b` for a general square `a` by Gaussian elimination with
/// partial pivoting.
pub fn solve(a: ArrayView2<f64>, b: ArrayView2<f64>, context: &'static str) -> Result<Array2<f64>> {
    let n = a.nrows();
    VcError::check_dim(context, n, a.ncols())?;
    VcError::check_dim(context, n, b.nrows())?;

    let mut a = a.to_owned();
    let mut x = b.to_owned();
    let scale = a.iter().fold(0.0f64, |acc, v| acc.max(v.abs())).max(f64::MIN_POSITIVE);

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]].abs() <= scale * 1e-14 {
            return Err(VcError::SingularMatrix(context));
        }
        if pivot != col {
            for k in 0..n {
                a.swap([pivot, k], [col, k]);
            }
            for k in 0..x.ncols() {
                x.swap([pivot, k], [col, k]);
            }
        }
        let p = a[[col, col]];
        for row in (col + 1)..n {
            let factor = a[[row, col]] / p;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            for k in 0..x.ncols() {
                x[[row, k]] -= factor * x[[col, k]];
            }
        }
    }

    for col in (0..n).rev() {
        for k in 0..x.ncols() {
            let mut value = x[[col, k]];
            for j in (col + 1)..n {
                value -= a[[col, j]] * x[[j, k]];
            }
            x[[col, k]] = value / a[[col, col]];
        }
    }
    Ok(x)
}

/// Inverse of a general square matrix.
pub fn inverse(a: ArrayView2<f64>, context: &'static str) -> Result<Array2<f64>> {
    solve(a, Array2::eye(a.nrows()).view(), context)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    use super::{cholesky, inverse, inverse_from_cholesky, log_det_cholesky, regularized_cholesky, solve};

    #[test]
    fn cholesky_factor() {
        let a = array![[4.0, 2.0, 0.4], [2.0, 5.0, 1.0], [0.4, 1.0, 3.0]];
        let l = cholesky(a.view()).unwrap();
        let rebuilt = l.dot(&l.t());
        for (x, y) in rebuilt.iter().zip(a.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-12);
        }
        let inv = inverse_from_cholesky(l.view());
        let eye = a.dot(&inv);
        for ((i, j), v) in eye.indexed_iter() {
            assert_abs_diff_eq!(*v, if i == j { 1.0 } else { 0.0 }, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(
            log_det_cholesky(l.view()),
            (4.0f64 * (5.0 * 3.0 - 1.0) - 2.0 * (2.0 * 3.0 - 0.4) + 0.4 * (2.0 - 5.0 * 0.4)).ln(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn not_positive_definite() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(cholesky(a.view()).is_none());
        let singular = array![[1.0, 1.0], [1.0, 1.0]];
        let (_, ridge) = regularized_cholesky(singular.view(), 1e-6, "test").unwrap();
        assert!(ridge > 0.0);
    }

    #[test]
    fn general_solve() {
        let a = array![[0.0, 2.0], [3.0, 1.0]];
        let b = array![[4.0], [5.0]];
        let x = solve(a.view(), b.view(), "test").unwrap();
        assert_abs_diff_eq!(x[[0, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[[1, 0]], 2.0, epsilon = 1e-12);

        let inv = inverse(a.view(), "test").unwrap();
        let eye: Array2<f64> = a.dot(&inv);
        assert_abs_diff_eq!(eye[[0, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(eye[[0, 1]], 0.0, epsilon = 1e-12);

        assert!(solve(array![[1.0, 2.0], [2.0, 4.0]].view(), b.view(), "test").is_err());
    }
}
