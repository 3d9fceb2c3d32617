//! Time alignment of two feature sequences by dynamic time warping.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::{
    constants::FASTDTW_RADIUS,
    error::{Result, VcError},
    feature::Distance,
};

mod dtw;
mod fastdtw;
mod twf;

pub use self::{dtw::SearchWindow, twf::TimeWarpFunction};

/// How the warping path is searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtwStrategy {
    /// Full `O(T1 * T2)` dynamic programming.
    Exact,
    /// Multi-resolution search restricted to a band of `radius` frames.
    Fast { radius: usize },
}

impl Default for DtwStrategy {
    fn default() -> Self {
        Self::Fast {
            radius: FASTDTW_RADIUS,
        }
    }
}

/// Result of an alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub twf: TimeWarpFunction,
    /// Mean local distance along the path.
    pub distortion: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aligner {
    pub distance: Distance,
    pub strategy: DtwStrategy,
}

impl Aligner {
    pub fn new(distance: Distance, strategy: DtwStrategy) -> Self {
        Self { distance, strategy }
    }

    /// Estimate the time warping function between `source` and `target`.
    pub fn align(&self, source: ArrayView2<f64>, target: ArrayView2<f64>) -> Result<Alignment> {
        if source.nrows() == 0 || target.nrows() == 0 {
            return Err(VcError::EmptySequence { context: "align" });
        }
        VcError::check_dim("align (frame dimension)", source.ncols(), target.ncols())?;

        let (twf, total) = match self.strategy {
            DtwStrategy::Exact => {
                let window = SearchWindow::full(source.nrows(), target.nrows());
                dtw::dtw_in_window(source, target, self.distance, &window)
            }
            DtwStrategy::Fast { radius } => {
                fastdtw::fastdtw(source, target, self.distance, radius)
            }
        };

        Ok(Alignment {
            distortion: total / twf.len() as f64,
            twf,
        })
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};

    use crate::{error::VcError, feature::Distance};

    use super::{Aligner, DtwStrategy, TimeWarpFunction};

    fn sequence(length: usize, dim: usize, rate: f64) -> Array2<f64> {
        Array2::from_shape_fn((length, dim), |(t, d)| {
            (t as f64 * rate + d as f64 * 0.7).sin() + 0.1 * d as f64
        })
    }

    #[test]
    fn self_alignment_is_identity() {
        let data = sequence(40, 4, 0.3);
        for strategy in [DtwStrategy::Exact, DtwStrategy::Fast { radius: 1 }] {
            let aligner = Aligner::new(Distance::MelCepstral, strategy);
            let alignment = aligner.align(data.view(), data.view()).unwrap();
            assert_eq!(alignment.twf, TimeWarpFunction::identity(40));
            assert_eq!(alignment.distortion, 0.0);
        }
    }

    #[test]
    fn monotonic_path() {
        let source = sequence(37, 3, 0.25);
        let target = sequence(52, 3, 0.18);
        for strategy in [DtwStrategy::Exact, DtwStrategy::default()] {
            let alignment = Aligner::new(Distance::MelCepstral, strategy)
                .align(source.view(), target.view())
                .unwrap();
            let twf = &alignment.twf;
            assert!(twf.is_monotonic());
            assert!(twf.len() >= 52);
            assert_eq!(twf.pairs()[0], (0, 0));
            assert_eq!(*twf.pairs().last().unwrap(), (36, 51));
        }
    }

    #[test]
    fn invalid_inputs() {
        let aligner = Aligner::default();
        let a = array![[0.0, 1.0]];
        let b = array![[0.0, 1.0, 2.0]];
        assert!(matches!(
            aligner.align(a.view(), b.view()),
            Err(VcError::DimensionMismatch { .. })
        ));
        let empty = Array2::<f64>::zeros((0, 2));
        assert!(matches!(
            aligner.align(empty.view(), a.view()),
            Err(VcError::EmptySequence { .. })
        ));
    }
}
