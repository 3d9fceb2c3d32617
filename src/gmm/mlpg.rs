//! MLPG trajectory generation for vector-valued frames.
//!
//! For details, please refer to <https://doi.org/10.1109/TASL.2007.907344>.

use ndarray::{Array2, ArrayView2};

use crate::feature::Windows;

/// Banded normal equations `W' D W c = W' D m` of a whole utterance.
///
/// The unknown `c` stacks the static frames, `c[t * dim + d]`. Row `t` of
/// the band holds `(W' D W)[t, t..t + width]`.
#[derive(Debug, Clone)]
pub struct MlpgMatrix {
    dim: usize,
    length: usize,
    width: usize,
    wuw: Box<[f64]>,
    wum: Box<[f64]>,
}

impl MlpgMatrix {
    /// Calculate `W' D W` and `W' D m`.
    ///
    /// `means` is `[T, windows * dim]` with the windows laid out one after
    /// another in each frame, and `precisions[t]` is the matching
    /// `[windows * dim, windows * dim]` precision of frame `t`.
    pub fn calc_wuw_and_wum<'a>(
        windows: &Windows,
        means: ArrayView2<f64>,
        precisions: impl IntoIterator<Item = ArrayView2<'a, f64>>,
    ) -> Self {
        let frames = means.nrows();
        let dim = means.ncols() / windows.size();
        let length = frames * dim;
        let width = (windows.max_width() * 2 + 1) * dim;
        let mut wuw = vec![0.0; width * length].into_boxed_slice();
        let mut wum = vec![0.0; length].into_boxed_slice();

        for (t, precision) in precisions.into_iter().enumerate().take(frames) {
            // columns of c touched by each row of W in frame t
            let rows: Vec<Vec<(usize, f64)>> = windows
                .iter()
                .flat_map(|window| {
                    (0..dim).map(move |d| {
                        window
                            .taps(t, frames)
                            .map(|(frame, coef)| (frame * dim + d, coef))
                            .collect()
                    })
                })
                .collect();

            let pm = precision.dot(&means.row(t));
            for (a, taps_a) in rows.iter().enumerate() {
                for &(ci, wa) in taps_a {
                    wum[ci] += wa * pm[a];
                }
                for (b, taps_b) in rows.iter().enumerate() {
                    let p = precision[[a, b]];
                    if p == 0.0 {
                        continue;
                    }
                    for &(ci, wa) in taps_a {
                        for &(cj, wb) in taps_b {
                            if cj >= ci {
                                wuw[width * ci + (cj - ci)] += wa * p * wb;
                            }
                        }
                    }
                }
            }
        }

        Self {
            dim,
            length,
            width,
            wuw,
            wum,
        }
    }

    /// Solve the equation and return the static trajectory as `[T, dim]`.
    pub fn solve(&mut self) -> Array2<f64> {
        self.ldl_factorization();
        let par = self.substitutions();
        let dim = self.dim;
        let frames = if dim == 0 { 0 } else { self.length / dim };
        Array2::from_shape_fn((frames, dim), |(t, d)| par[t * dim + d])
    }

    /// Perform Cholesky (LDL') decomposition in place.
    fn ldl_factorization(&mut self) {
        for t in 0..self.length {
            for i in 1..self.width.min(t + 1) {
                self.wuw[self.width * t] -= self.wuw[self.width * (t - i) + i]
                    * self.wuw[self.width * (t - i) + i]
                    * self.wuw[self.width * (t - i)];
            }
            for i in 1..self.width {
                for j in 1..(self.width - i).min(t + 1) {
                    self.wuw[self.width * t + i] -= self.wuw[self.width * (t - j) + j]
                        * self.wuw[self.width * (t - j) + i + j]
                        * self.wuw[self.width * (t - j)];
                }
                self.wuw[self.width * t + i] /= self.wuw[self.width * t];
            }
        }
    }

    /// Forward & backward substitution.
    fn substitutions(&self) -> Box<[f64]> {
        let mut g = vec![0.0; self.length].into_boxed_slice();
        // forward
        for t in 0..self.length {
            g[t] = self.wum[t];
            for i in 1..self.width.min(t + 1) {
                g[t] -= self.wuw[self.width * (t - i) + i] * g[t - i];
            }
        }

        let mut par = vec![0.0; self.length].into_boxed_slice();
        // backward
        for t in (0..self.length).rev() {
            par[t] = g[t] / self.wuw[self.width * t];
            for i in 1..self.width.min(self.length - t) {
                par[t] -= self.wuw[self.width * t + i] * par[t + i];
            }
        }

        par
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, Array3, Axis, array, s};

    use crate::feature::{Windows, static_delta};

    use super::MlpgMatrix;

    #[test]
    fn consistent_trajectory_is_recovered() {
        // means that are already static/delta consistent are reproduced exactly
        let statics = array![[1.0, -1.0], [2.0, 0.5], [4.0, 0.0], [3.0, 1.5], [0.0, 2.0]];
        let means = static_delta(statics.view());
        let precisions = Array3::from_shape_fn((5, 4, 4), |(_, i, j)| {
            if i == j {
                1.0 + i as f64
            } else if i + j == 3 {
                0.2
            } else {
                0.0
            }
        });

        let mut mtx = MlpgMatrix::calc_wuw_and_wum(
            &Windows::static_delta(),
            means.view(),
            precisions.axis_iter(Axis(0)),
        );
        let par = mtx.solve();
        assert_eq!(par.dim(), (5, 2));
        for (x, y) in par.iter().zip(statics.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-10);
        }
    }

    #[test]
    fn matches_dense_solution() {
        let means = Array2::from_shape_fn((4, 2), |(t, d)| (t * 2 + d) as f64 * 0.3 - 0.4);
        let precision = array![[2.0, 0.0], [0.0, 0.5]];
        let precisions = vec![precision.view(); 4];

        let mut mtx =
            MlpgMatrix::calc_wuw_and_wum(&Windows::static_delta(), means.view(), precisions);
        let par = mtx.solve();

        // dense W for T = 4, one static dimension
        let mut w = Array2::<f64>::zeros((8, 4));
        for t in 0..4 {
            w[[2 * t, t]] = 1.0;
            if t > 0 {
                w[[2 * t + 1, t - 1]] = -0.5;
            }
            if t < 3 {
                w[[2 * t + 1, t + 1]] = 0.5;
            }
        }
        let mut d = Array2::<f64>::zeros((8, 8));
        for t in 0..4 {
            d[[2 * t, 2 * t]] = 2.0;
            d[[2 * t + 1, 2 * t + 1]] = 0.5;
        }
        let m = means.clone().into_shape_with_order(8).unwrap();
        let lhs = w.t().dot(&d).dot(&w);
        let rhs = w.t().dot(&d).dot(&m);
        let dense = crate::gmm::linalg::solve(
            lhs.view(),
            rhs.view().insert_axis(Axis(1)),
            "test",
        )
        .unwrap();

        for t in 0..4 {
            assert_abs_diff_eq!(par[[t, 0]], dense[[t, 0]], epsilon = 1e-10);
        }
        assert_eq!(par.slice(s![.., 0]).len(), 4);
    }

    #[test]
    fn single_frame_keeps_dimension_order() {
        let statics = array![[0.5, -2.0, 3.0]];
        let means = static_delta(statics.view());
        let precisions = Array3::from_shape_fn((1, 6, 6), |(_, i, j)| (i == j) as u8 as f64);

        let mut mtx = MlpgMatrix::calc_wuw_and_wum(
            &Windows::static_delta(),
            means.view(),
            precisions.axis_iter(Axis(0)),
        );
        let par = mtx.solve();
        assert_eq!(par.dim(), (1, 3));
        assert_abs_diff_eq!(par, statics, epsilon = 1e-12);
    }
}
