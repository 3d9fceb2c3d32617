use ndarray::{Array2, ArrayView2, ArrayViewMut2, s};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VcError};

/// Frame-to-frame alignment of a source and a target sequence, as
/// `(source index, target index)` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeWarpFunction {
    pairs: Vec<(usize, usize)>,
}

impl TimeWarpFunction {
    pub fn new(pairs: Vec<(usize, usize)>) -> Self {
        Self { pairs }
    }

    /// Diagonal warp of a sequence onto itself.
    pub fn identity(length: usize) -> Self {
        Self::new((0..length).map(|t| (t, t)).collect())
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }
    pub fn len(&self) -> usize {
        self.pairs.len()
    }
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
    pub fn source(&self) -> impl '_ + Iterator<Item = usize> {
        self.pairs.iter().map(|(s, _)| *s)
    }
    pub fn target(&self) -> impl '_ + Iterator<Item = usize> {
        self.pairs.iter().map(|(_, t)| *t)
    }

    /// Both coordinates are non-decreasing and advance by at most one frame
    /// per step.
    pub fn is_monotonic(&self) -> bool {
        self.pairs.windows(2).all(|w| {
            let ((s0, t0), (s1, t1)) = (w[0], w[1]);
            s1 >= s0 && t1 >= t0 && s1 - s0 <= 1 && t1 - t0 <= 1 && (s1, t1) != (s0, t0)
        })
    }

    /// Joint feature matrix `[source[s], target[t]]` along the warp path.
    pub fn join(&self, source: ArrayView2<f64>, target: ArrayView2<f64>) -> Result<Array2<f64>> {
        let mut joint = Array2::zeros((self.len(), source.ncols() + target.ncols()));
        self.join_into(source, target, joint.view_mut())?;
        Ok(joint)
    }

    /// Same as [`TimeWarpFunction::join`], writing into `joint`, which must
    /// have one row per pair.
    pub fn join_into(
        &self,
        source: ArrayView2<f64>,
        target: ArrayView2<f64>,
        mut joint: ArrayViewMut2<f64>,
    ) -> Result<()> {
        let sdim = source.ncols();
        VcError::check_dim("joint rows", self.len(), joint.nrows())?;
        VcError::check_dim("joint dimension", sdim + target.ncols(), joint.ncols())?;
        for (row, &(s, t)) in self.pairs.iter().enumerate() {
            if s >= source.nrows() {
                return Err(VcError::invalid(
                    "twf",
                    format!("source index {} out of {} frames", s, source.nrows()),
                ));
            }
            if t >= target.nrows() {
                return Err(VcError::invalid(
                    "twf",
                    format!("target index {} out of {} frames", t, target.nrows()),
                ));
            }
            joint.slice_mut(s![row, ..sdim]).assign(&source.row(s));
            joint.slice_mut(s![row, sdim..]).assign(&target.row(t));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::TimeWarpFunction;

    #[test]
    fn monotonic() {
        assert!(TimeWarpFunction::identity(5).is_monotonic());
        assert!(TimeWarpFunction::new(vec![(0, 0), (0, 1), (1, 2), (2, 2)]).is_monotonic());
        assert!(!TimeWarpFunction::new(vec![(0, 0), (2, 1)]).is_monotonic());
        assert!(!TimeWarpFunction::new(vec![(1, 1), (0, 2)]).is_monotonic());
    }

    #[test]
    fn join() {
        let source = array![[1.0], [2.0]];
        let target = array![[10.0, 11.0], [20.0, 21.0], [30.0, 31.0]];
        let twf = TimeWarpFunction::new(vec![(0, 0), (1, 1), (1, 2)]);
        assert_eq!(
            twf.join(source.view(), target.view()).unwrap(),
            array![[1.0, 10.0, 11.0], [2.0, 20.0, 21.0], [2.0, 30.0, 31.0]]
        );
        let bad = TimeWarpFunction::new(vec![(2, 0)]);
        assert!(bad.join(source.view(), target.view()).is_err());
    }
}
