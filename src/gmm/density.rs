use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayView3, Axis};

use crate::{
    constants::{COVARIANCE_FLOOR, LOG_FLOOR},
    error::{Result, VcError},
};

use super::linalg::{log_det_cholesky, regularized_cholesky, solve_lower};

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Gaussian mixture prepared for density evaluation: the Cholesky factor
/// and log-determinant of every covariance are computed once.
#[derive(Debug, Clone)]
pub struct MixtureDensity {
    log_weights: Array1<f64>,
    means: Array2<f64>,
    cholesky: Vec<Array2<f64>>,
    log_dets: Array1<f64>,
}

impl MixtureDensity {
    pub fn new(
        weights: ArrayView1<f64>,
        means: ArrayView2<f64>,
        covariances: ArrayView3<f64>,
    ) -> Result<Self> {
        let (n_mix, dim) = means.dim();
        VcError::check_dim("mixture weights", n_mix, weights.len())?;
        VcError::check_dim("mixture covariances", n_mix, covariances.len_of(Axis(0)))?;
        VcError::check_dim("mixture covariances", dim, covariances.len_of(Axis(1)))?;
        VcError::check_dim("mixture covariances", dim, covariances.len_of(Axis(2)))?;

        let cholesky = covariances
            .axis_iter(Axis(0))
            .map(|cov| {
                regularized_cholesky(cov, COVARIANCE_FLOOR, "mixture covariance").map(|(l, _)| l)
            })
            .collect::<Result<Vec<_>>>()?;
        let log_dets = cholesky.iter().map(|l| log_det_cholesky(l.view())).collect();

        Ok(Self {
            log_weights: weights.mapv(|w| w.max(LOG_FLOOR).ln()),
            means: means.to_owned(),
            cholesky,
            log_dets,
        })
    }

    pub fn n_mix(&self) -> usize {
        self.means.nrows()
    }
    pub fn dim(&self) -> usize {
        self.means.ncols()
    }

    /// `ln w_m + ln N(x_t; mu_m, Sigma_m)` for every frame and component.
    pub fn weighted_log_prob(&self, data: ArrayView2<f64>) -> Array2<f64> {
        let dim = self.dim() as f64;
        let mut out = Array2::zeros((data.nrows(), self.n_mix()));
        for m in 0..self.n_mix() {
            let mean = self.means.row(m);
            let l = self.cholesky[m].view();
            let constant = self.log_weights[m] - 0.5 * (dim * LN_2PI + self.log_dets[m]);
            for (t, frame) in data.axis_iter(Axis(0)).enumerate() {
                let diff = &frame - &mean;
                let z = solve_lower(l, diff.view());
                out[[t, m]] = constant - 0.5 * z.dot(&z);
            }
        }
        out
    }

    /// Per-frame log-likelihood and log-responsibilities.
    pub fn log_responsibilities(&self, data: ArrayView2<f64>) -> (Array1<f64>, Array2<f64>) {
        let mut log_resp = self.weighted_log_prob(data);
        let log_norm: Array1<f64> = log_resp
            .axis_iter(Axis(0))
            .map(|row| log_sum_exp(row))
            .collect();
        for (mut row, norm) in log_resp.axis_iter_mut(Axis(0)).zip(log_norm.iter()) {
            row -= *norm;
        }
        (log_norm, log_resp)
    }

    /// Posterior `p(m | x_t)`, one row per frame.
    pub fn responsibilities(&self, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        VcError::check_dim("responsibilities", self.dim(), data.ncols())?;
        Ok(self.log_responsibilities(data).1.mapv(f64::exp))
    }
}

fn log_sum_exp(values: ArrayView1<f64>) -> f64 {
    let max = values.fold(f64::NEG_INFINITY, |acc, v| acc.max(*v));
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::{Array3, array};

    use super::MixtureDensity;

    #[test]
    fn single_standard_normal() {
        let density = MixtureDensity::new(
            array![1.0].view(),
            array![[0.0, 0.0]].view(),
            Array3::from_shape_fn((1, 2, 2), |(_, i, j)| if i == j { 1.0 } else { 0.0 }).view(),
        )
        .unwrap();
        let (log_norm, log_resp) = density.log_responsibilities(array![[0.0, 0.0], [1.0, 1.0]].view());
        let ln_2pi = (2.0 * std::f64::consts::PI).ln();
        assert_abs_diff_eq!(log_norm[0], -ln_2pi, epsilon = 1e-12);
        assert_abs_diff_eq!(log_norm[1], -ln_2pi - 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(log_resp[[1, 0]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn responsibilities_sum_to_one() {
        let density = MixtureDensity::new(
            array![0.3, 0.7].view(),
            array![[-1.0], [2.0]].view(),
            array![[[0.5]], [[2.0]]].view(),
        )
        .unwrap();
        let resp = density
            .responsibilities(array![[-1.0], [0.4], [2.5]].view())
            .unwrap();
        for row in resp.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }
        assert!(resp[[0, 0]] > resp[[0, 1]]);
        assert!(resp[[2, 1]] > resp[[2, 0]]);
        assert!(density.responsibilities(array![[1.0, 2.0]].view()).is_err());
    }
}
