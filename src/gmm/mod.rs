//! Joint-density Gaussian mixture model: training and conversion.

use std::{fmt::Display, str::FromStr};

use ndarray::{Array1, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VcError};

pub mod convert;
pub mod density;
pub mod linalg;
pub mod mlpg;
pub mod train;

pub use self::{
    convert::{ConversionModel, ConversionType, GmmMode, JointBlocks},
    density::MixtureDensity,
    train::GmmTrainer,
};

/// Covariance structure of a joint GMM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CovarianceKind {
    /// Unconstrained covariance.
    #[default]
    #[serde(rename = "full")]
    Full,
    /// Only the source block, the target block and the cross terms between
    /// the same dimension of source and target are non-zero.
    #[serde(rename = "block_diag")]
    BlockDiagonal,
}

impl CovarianceKind {
    /// Whether entry `(i, j)` of a `dim x dim` covariance may be non-zero.
    ///
    /// In the block-diagonal case the source half has `dim / 2` dimensions
    /// and both halves are diagonal.
    pub fn allows(&self, dim: usize, i: usize, j: usize) -> bool {
        match self {
            Self::Full => true,
            Self::BlockDiagonal => {
                let half = dim / 2;
                i == j || i.abs_diff(j) == half
            }
        }
    }

    /// Zero every entry the structure does not allow.
    pub fn apply_mask(&self, covariance: &mut Array2<f64>) {
        if *self == Self::Full {
            return;
        }
        let dim = covariance.nrows();
        for ((i, j), value) in covariance.indexed_iter_mut() {
            if !self.allows(dim, i, j) {
                *value = 0.0;
            }
        }
    }
}

impl Display for CovarianceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Full => "full",
            Self::BlockDiagonal => "block_diag",
        })
    }
}

impl FromStr for CovarianceKind {
    type Err = VcError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(Self::Full),
            "block_diag" => Ok(Self::BlockDiagonal),
            _ => Err(VcError::unsupported("covariance type", s)),
        }
    }
}

/// Gaussian mixture over joint `[source, target]` vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointGmm {
    pub weights: Array1<f64>,
    /// `[n_mix, dim]`
    pub means: Array2<f64>,
    /// `[n_mix, dim, dim]`
    pub covariances: Array3<f64>,
    pub covariance_kind: CovarianceKind,
}

impl JointGmm {
    pub fn new(
        weights: Array1<f64>,
        means: Array2<f64>,
        covariances: Array3<f64>,
        covariance_kind: CovarianceKind,
    ) -> Result<Self> {
        let gmm = Self {
            weights,
            means,
            covariances,
            covariance_kind,
        };
        gmm.validate()?;
        Ok(gmm)
    }

    pub fn n_mix(&self) -> usize {
        self.weights.len()
    }
    pub fn dim(&self) -> usize {
        self.means.ncols()
    }

    /// Check shapes and that the weights form a distribution.
    pub fn validate(&self) -> Result<()> {
        let (n_mix, dim) = self.means.dim();
        if n_mix == 0 {
            return Err(VcError::invalid("n_mix", "mixture has no components"));
        }
        VcError::check_dim("gmm weights", n_mix, self.weights.len())?;
        VcError::check_dim("gmm covariances", n_mix, self.covariances.len_of(Axis(0)))?;
        VcError::check_dim("gmm covariances", dim, self.covariances.len_of(Axis(1)))?;
        VcError::check_dim("gmm covariances", dim, self.covariances.len_of(Axis(2)))?;
        if self.weights.iter().any(|w| !(*w >= 0.0)) {
            return Err(VcError::invalid("weights", "negative or NaN weight"));
        }
        let total = self.weights.sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(VcError::invalid(
                "weights",
                format!("weights sum to {total}, not 1"),
            ));
        }
        if self.covariance_kind == CovarianceKind::BlockDiagonal && dim % 2 != 0 {
            return Err(VcError::invalid(
                "covariance type",
                format!("block-diagonal covariance needs an even dimension, got {dim}"),
            ));
        }
        Ok(())
    }

    /// Density over the full joint space.
    pub fn density(&self) -> Result<MixtureDensity> {
        MixtureDensity::new(
            self.weights.view(),
            self.means.view(),
            self.covariances.view(),
        )
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, Array3, array};

    use super::{CovarianceKind, JointGmm};

    #[test]
    fn block_diagonal_mask() {
        let mut cov = Array2::from_elem((4, 4), 1.0);
        CovarianceKind::BlockDiagonal.apply_mask(&mut cov);
        assert_eq!(
            cov,
            array![
                [1.0, 0.0, 1.0, 0.0],
                [0.0, 1.0, 0.0, 1.0],
                [1.0, 0.0, 1.0, 0.0],
                [0.0, 1.0, 0.0, 1.0],
            ]
        );
        let mut full = Array2::from_elem((4, 4), 1.0);
        CovarianceKind::Full.apply_mask(&mut full);
        assert_eq!(full, Array2::from_elem((4, 4), 1.0));
    }

    #[test]
    fn parse_kind() {
        assert_eq!("full".parse::<CovarianceKind>().unwrap(), CovarianceKind::Full);
        assert_eq!(
            "block_diag".parse::<CovarianceKind>().unwrap(),
            CovarianceKind::BlockDiagonal
        );
        assert!("diag".parse::<CovarianceKind>().is_err());
        assert_eq!(
            serde_json::to_string(&CovarianceKind::BlockDiagonal).unwrap(),
            "\"block_diag\""
        );
    }

    #[test]
    fn validation() {
        let covariances = Array3::from_shape_fn((2, 2, 2), |(_, i, j)| (i == j) as u8 as f64);
        assert!(
            JointGmm::new(
                array![0.5, 0.5],
                array![[0.0, 0.0], [1.0, 1.0]],
                covariances.clone(),
                CovarianceKind::Full
            )
            .is_ok()
        );
        assert!(
            JointGmm::new(
                array![0.5, 0.6],
                array![[0.0, 0.0], [1.0, 1.0]],
                covariances.clone(),
                CovarianceKind::Full
            )
            .is_err()
        );
        assert!(
            JointGmm::new(
                array![1.0],
                array![[0.0, 0.0]],
                covariances,
                CovarianceKind::Full
            )
            .is_err()
        );
    }
}
