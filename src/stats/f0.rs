use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, VcError},
    feature::Mask,
};

/// Mean and standard deviation of `ln F0` over voiced frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct F0Statistics {
    pub mean: f64,
    pub std: f64,
}

impl F0Statistics {
    pub fn new(mean: f64, std: f64) -> Self {
        Self { mean, std }
    }

    /// Pool the voiced frames (`f0 > 0`) of every sequence.
    pub fn estimate<'a>(f0list: impl IntoIterator<Item = &'a [f64]>) -> Result<Self> {
        let lf0: Vec<f64> = f0list
            .into_iter()
            .flat_map(|f0| Mask::voiced(f0).filter(f0).map(f64::ln).collect::<Vec<_>>())
            .collect();
        if lf0.is_empty() {
            return Err(VcError::DegenerateData(
                "no voiced frames to estimate F0 statistics".to_owned(),
            ));
        }

        let n = lf0.len() as f64;
        let mean = lf0.iter().sum::<f64>() / n;
        let var = lf0.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        Ok(Self::new(mean, var.sqrt()))
    }
}

/// Linear transform of log F0 between two speakers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct F0Converter {
    source: F0Statistics,
    target: F0Statistics,
}

impl F0Converter {
    pub fn new(source: F0Statistics, target: F0Statistics) -> Result<Self> {
        if !(source.std > 0.0) {
            return Err(VcError::DegenerateData(format!(
                "source log-F0 standard deviation is {}",
                source.std
            )));
        }
        Ok(Self { source, target })
    }

    pub fn source(&self) -> &F0Statistics {
        &self.source
    }
    pub fn target(&self) -> &F0Statistics {
        &self.target
    }

    /// Convert voiced frames; unvoiced frames stay zero.
    pub fn convert(&self, f0: &[f64]) -> Vec<f64> {
        let ratio = self.target.std / self.source.std;
        let mask = Mask::voiced(f0);
        let converted: Vec<f64> = mask
            .filter(f0)
            .map(|v| (ratio * (v.ln() - self.source.mean) + self.target.mean).exp())
            .collect();
        mask.fill(converted, 0.0).collect()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use crate::error::VcError;

    use super::{F0Converter, F0Statistics};

    #[test]
    fn estimate_ignores_unvoiced() {
        let a = [0.0, 100.0, 0.0, 200.0];
        let b = [0.0, 400.0];
        let stats = F0Statistics::estimate([&a[..], &b[..]]).unwrap();
        let lf0 = [100f64.ln(), 200f64.ln(), 400f64.ln()];
        let mean = lf0.iter().sum::<f64>() / 3.0;
        let var = lf0.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 3.0;
        assert_abs_diff_eq!(stats.mean, mean, epsilon = 1e-12);
        assert_abs_diff_eq!(stats.std, var.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn all_unvoiced_is_degenerate() {
        let silent = [0.0; 10];
        assert!(matches!(
            F0Statistics::estimate([&silent[..]]),
            Err(VcError::DegenerateData(_))
        ));
        assert!(matches!(
            F0Statistics::estimate(std::iter::empty()),
            Err(VcError::DegenerateData(_))
        ));
    }

    #[test]
    fn identity_statistics() {
        let stats = F0Statistics::new(5.0, 0.2);
        let converter = F0Converter::new(stats, stats).unwrap();
        let f0 = [0.0, 120.0, 0.0, 230.5];
        for (x, y) in converter.convert(&f0).iter().zip(f0.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-9);
        }
    }
}
