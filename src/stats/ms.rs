//! Modulation spectrum statistics and postfilter.
//!
//! Each dimension of a trajectory is zero-padded to a common power-of-two
//! length and Fourier transformed along time. Statistics are kept for every
//! frequency bin of every dimension.

use ndarray::{Array2, ArrayView2, Axis};
use rustfft::{FftPlanner, num_complex::Complex};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{LOG_FLOOR, VARIANCE_FLOOR},
    error::{Result, VcError},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsStatistics {
    /// `[fftsize, dim]` mean log power.
    pub mean: Array2<f64>,
    /// `[fftsize, dim]` variance of the log power.
    pub var: Array2<f64>,
}

impl MsStatistics {
    pub fn new(mean: Array2<f64>, var: Array2<f64>) -> Result<Self> {
        VcError::check_dim("MS statistics (bins)", mean.nrows(), var.nrows())?;
        VcError::check_dim("MS statistics (dimension)", mean.ncols(), var.ncols())?;
        if !mean.nrows().is_power_of_two() {
            return Err(VcError::invalid(
                "fftsize",
                format!("{} is not a power of two", mean.nrows()),
            ));
        }
        Ok(Self { mean, var })
    }

    pub fn fftsize(&self) -> usize {
        self.mean.nrows()
    }
    pub fn dim(&self) -> usize {
        self.mean.ncols()
    }

    pub fn estimate<'a>(datalist: impl IntoIterator<Item = ArrayView2<'a, f64>>) -> Result<Self> {
        let datalist: Vec<_> = datalist.into_iter().collect();
        let Some(first) = datalist.first() else {
            return Err(VcError::EmptySequence {
                context: "MS estimation",
            });
        };
        let dim = first.ncols();
        for data in &datalist {
            VcError::check_dim("MS estimation", dim, data.ncols())?;
            if data.nrows() == 0 {
                return Err(VcError::EmptySequence {
                    context: "MS estimation",
                });
            }
        }

        let maxlen = datalist.iter().map(|d| d.nrows()).max().unwrap_or(1);
        let fftsize = fft_size(maxlen);
        let mut planner = FftPlanner::new();
        let spectra: Vec<Array2<f64>> = datalist
            .iter()
            .map(|data| {
                let spectrum = Spectrum::forward(&mut planner, *data, fftsize);
                spectrum.log_power()
            })
            .collect();

        let n = spectra.len() as f64;
        let zeros = Array2::<f64>::zeros((fftsize, dim));
        let mean = spectra.iter().fold(zeros.clone(), |acc, s| acc + s) / n;
        let var = spectra
            .iter()
            .fold(zeros, |acc, s| acc + (s - &mean).mapv(|d| d * d))
            / n;
        Self::new(mean, var)
    }

    /// Move the log modulation spectrum of `data` from the converted
    /// statistics `reference` towards the statistics held here.
    ///
    /// The log power of every bin is rescaled like the GV postfilter
    /// rescales a trajectory, by `sqrt(var / reference.var)` around the
    /// means, not by the plain variance ratio.
    ///
    /// `k` controls how much of the corrected spectrum replaces the
    /// original one. The phase is preserved. Dimensions below `startdim`
    /// are left untouched and the result is blended with the input by
    /// `alpha`.
    pub fn postfilter(
        &self,
        data: ArrayView2<f64>,
        reference: &MsStatistics,
        alpha: f64,
        k: f64,
        startdim: usize,
    ) -> Result<Array2<f64>> {
        let (length, dim) = data.dim();
        if length == 0 {
            return Err(VcError::EmptySequence {
                context: "MS postfilter",
            });
        }
        VcError::check_dim("MS postfilter", self.dim(), dim)?;
        VcError::check_dim("MS postfilter (reference)", self.dim(), reference.dim())?;
        VcError::check_dim(
            "MS postfilter (reference bins)",
            self.fftsize(),
            reference.fftsize(),
        )?;
        if length > self.fftsize() {
            return Err(VcError::invalid(
                "data",
                format!("{length} frames exceed MS length {}", self.fftsize()),
            ));
        }
        if !(0.0..=1.0).contains(&k) {
            return Err(VcError::invalid("k", format!("{k} is outside [0, 1]")));
        }

        let mut planner = FftPlanner::new();
        let mut spectrum = Spectrum::forward(&mut planner, data, self.fftsize());
        let log_power = spectrum.log_power();

        for d in startdim.min(dim)..dim {
            for bin in 0..self.fftsize() {
                let ratio = (self.var[[bin, d]] / reference.var[[bin, d]].max(VARIANCE_FLOOR)).sqrt();
                let current = log_power[[bin, d]];
                let corrected =
                    ratio * (current - reference.mean[[bin, d]]) + self.mean[[bin, d]];
                let emphasized = (1.0 - k) * current + k * corrected;
                let value = &mut spectrum.bins[[bin, d]];
                *value = Complex::from_polar((emphasized / 2.0).exp(), value.arg());
            }
        }

        let mut filtered = spectrum.inverse(&mut planner, length);
        for d in 0..startdim.min(dim) {
            filtered.column_mut(d).assign(&data.column(d));
        }
        Ok(filtered * alpha + &data * (1.0 - alpha))
    }
}

/// `2^(bits(maxlen) + 1)`, always more than twice `maxlen`.
fn fft_size(maxlen: usize) -> usize {
    let bits = usize::BITS - maxlen.leading_zeros();
    1 << (bits + 1)
}

/// Per-dimension spectrum, `[fftsize, dim]`.
struct Spectrum {
    bins: Array2<Complex<f64>>,
}

impl Spectrum {
    fn forward(planner: &mut FftPlanner<f64>, data: ArrayView2<f64>, fftsize: usize) -> Self {
        let fft = planner.plan_fft_forward(fftsize);
        let mut bins = Array2::zeros((fftsize, data.ncols()));
        let mut buffer = vec![Complex::new(0.0, 0.0); fftsize];
        for (d, column) in data.axis_iter(Axis(1)).enumerate() {
            buffer.fill(Complex::new(0.0, 0.0));
            for (slot, value) in buffer.iter_mut().zip(column.iter()) {
                *slot = Complex::new(*value, 0.0);
            }
            fft.process(&mut buffer);
            for (bin, value) in buffer.iter().enumerate() {
                bins[[bin, d]] = *value;
            }
        }
        Self { bins }
    }

    /// `2 ln |X|`
    fn log_power(&self) -> Array2<f64> {
        self.bins.mapv(|c| 2.0 * c.norm().max(LOG_FLOOR).ln())
    }

    /// Inverse transform truncated to `length` frames.
    fn inverse(&self, planner: &mut FftPlanner<f64>, length: usize) -> Array2<f64> {
        let (fftsize, dim) = self.bins.dim();
        let ifft = planner.plan_fft_inverse(fftsize);
        let mut out = Array2::zeros((length, dim));
        let mut buffer = vec![Complex::new(0.0, 0.0); fftsize];
        for d in 0..dim {
            for (slot, value) in buffer.iter_mut().zip(self.bins.column(d).iter()) {
                *slot = *value;
            }
            ifft.process(&mut buffer);
            for t in 0..length {
                out[[t, d]] = buffer[t].re / fftsize as f64;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    use super::{MsStatistics, fft_size};

    fn utterance(length: usize, rate: f64) -> Array2<f64> {
        Array2::from_shape_fn((length, 3), |(t, d)| {
            (t as f64 * rate + d as f64).sin() * (1.0 + d as f64) + 0.3 * d as f64
        })
    }

    #[test]
    fn power_of_two_length() {
        assert_eq!(fft_size(1), 4);
        assert_eq!(fft_size(5), 16);
        assert_eq!(fft_size(8), 32);
        assert_eq!(fft_size(100), 256);
    }

    #[test]
    fn estimate_shape() {
        let a = utterance(40, 0.2);
        let b = utterance(70, 0.3);
        let stats = MsStatistics::estimate([a.view(), b.view()]).unwrap();
        assert_eq!(stats.fftsize(), 256);
        assert_eq!(stats.dim(), 3);
        assert!(stats.var.iter().all(|v| *v >= 0.0));
        assert!(MsStatistics::estimate(std::iter::empty()).is_err());
    }

    #[test]
    fn identity_when_statistics_match() {
        let data = utterance(50, 0.25);
        let stats = MsStatistics::estimate([data.view(), utterance(60, 0.4).view()]).unwrap();
        let out = stats.postfilter(data.view(), &stats, 1.0, 0.85, 1).unwrap();
        for (x, y) in out.iter().zip(data.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-8);
        }
    }

    #[test]
    fn zero_alpha_and_invalid_input() {
        let data = utterance(30, 0.2);
        let target = MsStatistics::estimate([utterance(30, 0.5).view()]).unwrap();
        let reference = MsStatistics::estimate([data.view()]).unwrap();
        let out = target.postfilter(data.view(), &reference, 0.0, 0.85, 1).unwrap();
        for (x, y) in out.iter().zip(data.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-12);
        }
        assert!(target.postfilter(data.view(), &reference, 1.0, 1.5, 1).is_err());
        let long = utterance(200, 0.2);
        assert!(target.postfilter(long.view(), &reference, 1.0, 0.85, 1).is_err());
    }

    #[test]
    fn log_power_scales_by_square_root_of_variance_ratio() {
        let data = utterance(6, 0.7);
        let own = MsStatistics::estimate([data.view()]).unwrap();
        let shape = own.mean.dim();
        let reference = MsStatistics::new(&own.mean - 1.0, Array2::ones(shape)).unwrap();
        let target = MsStatistics::new(&own.mean - 1.0, Array2::from_elem(shape, 4.0)).unwrap();

        // 2 * (x - (x - 1)) + (x - 1) = x + 1 in log power, e^0.5 in amplitude
        let filtered = target.postfilter(data.view(), &reference, 1.0, 1.0, 0).unwrap();
        assert_abs_diff_eq!(filtered, &data * 0.5f64.exp(), epsilon = 1e-9);
    }
}
