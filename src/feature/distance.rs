//! Frame distance metrics.

use std::str::FromStr;

use ndarray::{ArrayView1, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use crate::{
    constants::MELCD_COEF,
    error::{Result, VcError},
};

/// Mel-cepstral distortion in dB, `10 / ln(10) * ||x - y||`.
pub fn melcd(x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
    let sum = Zip::from(&x)
        .and(&y)
        .fold(0.0, |acc, a, b| acc + (a - b) * (a - b));
    MELCD_COEF * sum.sqrt()
}

/// Mean frame-wise mel-cepstral distortion of two equally shaped sequences.
pub fn normalized_melcd(x: ArrayView2<f64>, y: ArrayView2<f64>) -> Result<f64> {
    VcError::check_dim("normalized_melcd (frames)", x.nrows(), y.nrows())?;
    VcError::check_dim("normalized_melcd (dimension)", x.ncols(), y.ncols())?;
    if x.nrows() == 0 {
        return Err(VcError::EmptySequence {
            context: "normalized_melcd",
        });
    }
    let total: f64 = x
        .rows()
        .into_iter()
        .zip(y.rows())
        .map(|(a, b)| melcd(a, b))
        .sum();
    Ok(total / x.nrows() as f64)
}

/// Distance metric used by the aligner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    #[default]
    #[serde(rename = "melcd")]
    MelCepstral,
    Euclidean,
}

impl Distance {
    #[inline]
    pub fn between(&self, x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
        match self {
            Self::MelCepstral => melcd(x, y),
            Self::Euclidean => melcd(x, y) / MELCD_COEF,
        }
    }
}

impl FromStr for Distance {
    type Err = VcError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "melcd" => Ok(Self::MelCepstral),
            "euclidean" => Ok(Self::Euclidean),
            _ => Err(VcError::unsupported("distance", s)),
        }
    }
}
