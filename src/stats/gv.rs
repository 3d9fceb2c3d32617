use ndarray::{Array1, Array2, ArrayView2, Axis, s};
use serde::{Deserialize, Serialize};

use crate::{
    constants::VARIANCE_FLOOR,
    error::{Result, VcError},
};

/// Global variance: mean and variance, per dimension, of the per-utterance
/// variance of a feature stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GvStatistics {
    pub mean: Array1<f64>,
    pub var: Array1<f64>,
}

impl GvStatistics {
    pub fn new(mean: Array1<f64>, var: Array1<f64>) -> Result<Self> {
        VcError::check_dim("GV statistics", mean.len(), var.len())?;
        Ok(Self { mean, var })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn estimate<'a>(datalist: impl IntoIterator<Item = ArrayView2<'a, f64>>) -> Result<Self> {
        let mut variances: Vec<Array1<f64>> = Vec::new();
        for data in datalist {
            if data.nrows() == 0 {
                return Err(VcError::EmptySequence {
                    context: "GV estimation",
                });
            }
            if let Some(first) = variances.first() {
                VcError::check_dim("GV estimation", first.len(), data.ncols())?;
            }
            variances.push(data.var_axis(Axis(0), 0.0));
        }
        let Some(first) = variances.first() else {
            return Err(VcError::EmptySequence {
                context: "GV estimation",
            });
        };

        let n = variances.len() as f64;
        let zeros = Array1::<f64>::zeros(first.len());
        let mean = variances.iter().fold(zeros.clone(), |acc, v| acc + v) / n;
        let var = variances
            .iter()
            .fold(zeros, |acc, v| acc + (v - &mean).mapv(|d| d * d))
            / n;
        Self::new(mean, var)
    }

    /// Rescale `data` so that its variance matches the mean GV held here.
    ///
    /// The variance being corrected is taken from `reference` when given
    /// (GV of converted training data), otherwise from `data` itself.
    /// Dimensions below `startdim` are left untouched and the result is
    /// blended with the input as `alpha * filtered + (1 - alpha) * data`.
    pub fn postfilter(
        &self,
        data: ArrayView2<f64>,
        reference: Option<&GvStatistics>,
        alpha: f64,
        startdim: usize,
    ) -> Result<Array2<f64>> {
        if data.nrows() == 0 {
            return Err(VcError::EmptySequence {
                context: "GV postfilter",
            });
        }
        let dim = data.ncols();
        VcError::check_dim("GV postfilter", self.dim(), dim)?;
        if startdim > dim {
            return Err(VcError::invalid(
                "startdim",
                format!("{startdim} exceeds dimension {dim}"),
            ));
        }

        let data_mean = data.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(dim));
        let data_var = match reference {
            Some(reference) => {
                VcError::check_dim("GV postfilter (reference)", dim, reference.dim())?;
                reference.mean.clone()
            }
            None => data.var_axis(Axis(0), 0.0),
        };

        let mut filtered = data.to_owned();
        for d in startdim..dim {
            let ratio = (self.mean[d] / data_var[d].max(VARIANCE_FLOOR)).sqrt();
            filtered
                .slice_mut(s![.., d])
                .mapv_inplace(|v| ratio * (v - data_mean[d]) + data_mean[d]);
        }
        Ok(filtered * alpha + &data * (1.0 - alpha))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    use super::GvStatistics;

    fn utterance(length: usize, scale: f64) -> Array2<f64> {
        Array2::from_shape_fn((length, 3), |(t, d)| {
            scale * ((t as f64 * 0.37 + d as f64).sin() + d as f64)
        })
    }

    #[test]
    fn estimate() {
        let a = array![[0.0, 1.0], [2.0, 1.0]];
        let b = array![[0.0, 0.0], [4.0, 2.0]];
        let stats = GvStatistics::estimate([a.view(), b.view()]).unwrap();
        // per-utterance variances: [1, 0] and [4, 1]
        assert_eq!(stats.mean, array![2.5, 0.5]);
        assert_eq!(stats.var, array![2.25, 0.25]);

        assert!(GvStatistics::estimate(std::iter::empty()).is_err());
        let c = array![[0.0, 1.0, 2.0]];
        assert!(GvStatistics::estimate([a.view(), c.view()]).is_err());
    }

    #[test]
    fn zero_alpha_is_identity() {
        let data = utterance(30, 1.0);
        let target = GvStatistics::new(array![5.0, 5.0, 5.0], array![1.0, 1.0, 1.0]).unwrap();
        let out = target.postfilter(data.view(), None, 0.0, 1).unwrap();
        for (x, y) in out.iter().zip(data.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-12);
        }
    }

    #[test]
    fn matching_variance_is_identity() {
        let data = utterance(40, 2.0);
        let own = GvStatistics::estimate([data.view()]).unwrap();
        let out = own.postfilter(data.view(), None, 1.0, 0).unwrap();
        for (x, y) in out.iter().zip(data.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-10);
        }
    }

    #[test]
    fn reaches_target_variance() {
        let data = utterance(50, 1.0);
        let target = GvStatistics::new(array![1.0, 2.0, 3.0], array![0.0, 0.0, 0.0]).unwrap();
        let out = target.postfilter(data.view(), None, 1.0, 1).unwrap();
        let var = out.var_axis(ndarray::Axis(0), 0.0);
        assert_abs_diff_eq!(var[1], 2.0, epsilon = 1e-10);
        assert_abs_diff_eq!(var[2], 3.0, epsilon = 1e-10);
        // below startdim
        assert_eq!(out.column(0), data.column(0));

        // a reference GV replaces the variance of the data
        let reference = GvStatistics::new(array![1.0, 1.0, 1.0], array![0.0, 0.0, 0.0]).unwrap();
        let scaled = target.postfilter(data.view(), Some(&reference), 1.0, 1).unwrap();
        let mean = data.mean_axis(ndarray::Axis(0)).unwrap();
        assert_abs_diff_eq!(
            scaled[[4, 2]],
            3f64.sqrt() * (data[[4, 2]] - mean[2]) + mean[2],
            epsilon = 1e-12
        );
    }
}
