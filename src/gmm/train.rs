//! Expectation-maximization training of joint GMMs.

use ndarray::{Array1, Array2, Array3, ArrayView2, Axis};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{
    constants::COVARIANCE_FLOOR,
    error::{Result, VcError},
};

use super::{CovarianceKind, JointGmm};

const KMEANS_MAX_ITER: usize = 100;

/// EM trainer for [`JointGmm`].
///
/// Components are initialized from a k-means clustering (k-means++ seeding
/// with a fixed seed) and refined by at most `n_iter` EM steps. After each
/// M-step `floor` is added to every covariance diagonal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmmTrainer {
    n_mix: usize,
    n_iter: usize,
    covariance_kind: CovarianceKind,
    floor: f64,
    tol: f64,
    seed: u64,
}

impl GmmTrainer {
    pub fn new(n_mix: usize, n_iter: usize, covariance_kind: CovarianceKind) -> Self {
        Self {
            n_mix,
            n_iter,
            covariance_kind,
            floor: COVARIANCE_FLOOR,
            tol: 1e-3,
            seed: 0,
        }
    }

    pub fn with_floor(mut self, floor: f64) -> Self {
        self.floor = floor;
        self
    }

    /// Stop once the mean log-likelihood improves by less than `tol`.
    /// A non-positive value always runs `n_iter` steps.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn n_mix(&self) -> usize {
        self.n_mix
    }
    pub fn covariance_kind(&self) -> CovarianceKind {
        self.covariance_kind
    }

    /// Fit a mixture to the rows of `data`.
    pub fn train(&self, data: ArrayView2<f64>) -> Result<JointGmm> {
        self.validate(data)?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let labels = kmeans(data, self.n_mix, &mut rng);
        let mut resp = Array2::zeros((data.nrows(), self.n_mix));
        for (t, label) in labels.into_iter().enumerate() {
            resp[[t, label]] = 1.0;
        }
        let mut gmm = self.m_step(data, resp.view())?;

        let mut lower_bound = f64::NEG_INFINITY;
        for iteration in 0..self.n_iter {
            let (log_norm, log_resp) = gmm.density()?.log_responsibilities(data);
            let current = log_norm.mean().unwrap_or(f64::NEG_INFINITY);
            resp = log_resp.mapv(f64::exp);
            gmm = self.m_step(data, resp.view())?;

            tracing::debug!(iteration, lower_bound = current, "EM step");
            if self.tol > 0.0 && (current - lower_bound).abs() < self.tol {
                tracing::debug!(iteration, "EM converged");
                break;
            }
            lower_bound = current;
        }

        tracing::info!(
            n_mix = self.n_mix,
            frames = data.nrows(),
            dim = data.ncols(),
            covariance = %self.covariance_kind,
            "Trained joint GMM"
        );
        Ok(gmm)
    }

    /// Posterior of each component of `gmm` for every row of `data`.
    pub fn estimate_responsibility(gmm: &JointGmm, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        gmm.density()?.responsibilities(data)
    }

    /// Single M-step on `data` with responsibilities computed on another
    /// (frame-aligned) feature space.
    pub fn train_singlepath(
        &self,
        responsibilities: ArrayView2<f64>,
        data: ArrayView2<f64>,
    ) -> Result<JointGmm> {
        VcError::check_dim("single-path frames", responsibilities.nrows(), data.nrows())?;
        VcError::check_dim("single-path components", self.n_mix, responsibilities.ncols())?;
        self.validate(data)?;
        self.m_step(data, responsibilities)
    }

    fn validate(&self, data: ArrayView2<f64>) -> Result<()> {
        if self.n_mix == 0 {
            return Err(VcError::invalid("n_mix", "must be at least 1"));
        }
        if data.nrows() == 0 {
            return Err(VcError::EmptySequence {
                context: "GMM training",
            });
        }
        if data.nrows() < self.n_mix {
            return Err(VcError::invalid(
                "n_mix",
                format!("{} components for {} frames", self.n_mix, data.nrows()),
            ));
        }
        if !(self.floor >= 0.0) {
            return Err(VcError::invalid("floor", "must be non-negative"));
        }
        if self.covariance_kind == CovarianceKind::BlockDiagonal && data.ncols() % 2 != 0 {
            return Err(VcError::invalid(
                "covariance type",
                format!(
                    "block-diagonal covariance needs an even dimension, got {}",
                    data.ncols()
                ),
            ));
        }
        Ok(())
    }

    fn m_step(&self, data: ArrayView2<f64>, resp: ArrayView2<f64>) -> Result<JointGmm> {
        let dim = data.ncols();
        let nk = resp.sum_axis(Axis(0)) + 10.0 * f64::EPSILON;
        let mut means = resp.t().dot(&data);
        for (mut mean, n) in means.axis_iter_mut(Axis(0)).zip(nk.iter()) {
            mean /= *n;
        }

        let mut covariances = Array3::zeros((self.n_mix, dim, dim));
        for m in 0..self.n_mix {
            let diff = &data - &means.row(m);
            let weight = resp.column(m);
            let mut cov = covariances.index_axis_mut(Axis(0), m);
            match self.covariance_kind {
                CovarianceKind::Full => {
                    let weighted = &diff * &weight.insert_axis(Axis(1));
                    cov.assign(&(weighted.t().dot(&diff) / nk[m]));
                }
                CovarianceKind::BlockDiagonal => {
                    let half = dim / 2;
                    for d in 0..dim {
                        let column = diff.column(d);
                        cov[[d, d]] = (&column * &column).dot(&weight) / nk[m];
                    }
                    for d in 0..half {
                        let cross =
                            (&diff.column(d) * &diff.column(d + half)).dot(&weight) / nk[m];
                        cov[[d, d + half]] = cross;
                        cov[[d + half, d]] = cross;
                    }
                }
            }
            cov.diag_mut().mapv_inplace(|v| v + self.floor);
        }

        let weights: Array1<f64> = &nk / nk.sum();
        JointGmm::new(weights, means, covariances, self.covariance_kind)
    }
}

/// Hard clustering of the rows of `data` into `k` groups.
fn kmeans(data: ArrayView2<f64>, k: usize, rng: &mut StdRng) -> Vec<usize> {
    let n = data.nrows();
    let squared = |a: ndarray::ArrayView1<f64>, b: ndarray::ArrayView1<f64>| {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f64>()
    };

    // k-means++ seeding
    let mut centers = Array2::zeros((k, data.ncols()));
    centers.row_mut(0).assign(&data.row(rng.gen_range(0..n)));
    let mut nearest: Vec<f64> = data
        .rows()
        .into_iter()
        .map(|row| squared(row, centers.row(0)))
        .collect();
    for c in 1..k {
        let total: f64 = nearest.iter().sum();
        let chosen = if total > 0.0 {
            let mut target = rng.r#gen::<f64>() * total;
            nearest
                .iter()
                .position(|d| {
                    target -= d;
                    target <= 0.0
                })
                .unwrap_or(n - 1)
        } else {
            rng.gen_range(0..n)
        };
        centers.row_mut(c).assign(&data.row(chosen));
        for (d, row) in nearest.iter_mut().zip(data.rows()) {
            *d = d.min(squared(row, centers.row(c)));
        }
    }

    let mut labels = vec![0; n];
    for iteration in 0..KMEANS_MAX_ITER {
        let assigned: Vec<usize> = data
            .rows()
            .into_iter()
            .map(|row| {
                (0..k)
                    .min_by(|&a, &b| {
                        squared(row, centers.row(a)).total_cmp(&squared(row, centers.row(b)))
                    })
                    .unwrap_or(0)
            })
            .collect();
        if iteration > 0 && assigned == labels {
            break;
        }
        labels = assigned;

        let mut sums = Array2::<f64>::zeros(centers.dim());
        let mut counts = vec![0usize; k];
        for (row, &label) in data.rows().into_iter().zip(labels.iter()) {
            sums.row_mut(label).scaled_add(1.0, &row);
            counts[label] += 1;
        }
        for (c, count) in counts.into_iter().enumerate() {
            // an empty cluster keeps its previous center
            if count > 0 {
                centers.row_mut(c).assign(&(&sums.row(c) / count as f64));
            }
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, Axis, array};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use crate::gmm::CovarianceKind;

    use super::GmmTrainer;

    fn two_clusters(seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array2::from_shape_fn((200, 4), |(t, d)| {
            let center = if t < 100 { 0.0 } else { 10.0 };
            center + d as f64 * 0.5 + rng.gen_range(-0.5..0.5)
        })
    }

    #[test]
    fn separates_clusters() {
        let data = two_clusters(7);
        for kind in [CovarianceKind::Full, CovarianceKind::BlockDiagonal] {
            let gmm = GmmTrainer::new(2, 20, kind).with_seed(3).train(data.view()).unwrap();
            assert_abs_diff_eq!(gmm.weights.sum(), 1.0, epsilon = 1e-9);
            assert_abs_diff_eq!(gmm.weights[0], 0.5, epsilon = 1e-3);

            let mut firsts: Vec<f64> = gmm.means.column(0).to_vec();
            firsts.sort_by(f64::total_cmp);
            assert_abs_diff_eq!(firsts[0], 0.0, epsilon = 0.2);
            assert_abs_diff_eq!(firsts[1], 10.0, epsilon = 0.2);

            for cov in gmm.covariances.axis_iter(Axis(0)) {
                for ((i, j), v) in cov.indexed_iter() {
                    if !kind.allows(4, i, j) {
                        assert_eq!(*v, 0.0);
                    }
                }
                assert!(cov.diag().iter().all(|v| *v > 0.0));
            }
        }
    }

    #[test]
    fn deterministic_for_seed() {
        let data = two_clusters(11);
        let trainer = GmmTrainer::new(3, 5, CovarianceKind::Full).with_seed(42);
        assert_eq!(
            trainer.train(data.view()).unwrap(),
            trainer.train(data.view()).unwrap()
        );
    }

    #[test]
    fn floor_keeps_constant_dimension_invertible() {
        let data = Array2::from_shape_fn((20, 2), |(t, d)| if d == 0 { t as f64 } else { 3.0 });
        let gmm = GmmTrainer::new(1, 3, CovarianceKind::Full)
            .train(data.view())
            .unwrap();
        assert_abs_diff_eq!(gmm.covariances[[0, 1, 1]], 1e-6, epsilon = 1e-9);
        assert!(gmm.density().is_ok());
    }

    #[test]
    fn single_path() {
        let reference = two_clusters(5);
        let trainer = GmmTrainer::new(2, 10, CovarianceKind::Full).with_seed(1);
        let gmm = trainer.train(reference.view()).unwrap();
        let resp = GmmTrainer::estimate_responsibility(&gmm, reference.view()).unwrap();

        let same = trainer.train_singlepath(resp.view(), reference.view()).unwrap();
        let shifted = &reference + 100.0;
        let moved = trainer.train_singlepath(resp.view(), shifted.view()).unwrap();
        for (a, b) in moved.means.iter().zip(same.means.iter()) {
            assert_abs_diff_eq!(*a, *b + 100.0, epsilon = 1e-6);
        }
        for (a, b) in moved.covariances.iter().zip(same.covariances.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        }
        assert_eq!(moved.weights, same.weights);
    }

    #[test]
    fn invalid_configuration() {
        let data = array![[0.0, 1.0, 2.0]];
        assert!(GmmTrainer::new(2, 1, CovarianceKind::Full).train(data.view()).is_err());
        assert!(GmmTrainer::new(1, 1, CovarianceKind::BlockDiagonal).train(data.view()).is_err());
        assert!(GmmTrainer::new(0, 1, CovarianceKind::Full).train(data.view()).is_err());
    }
}
