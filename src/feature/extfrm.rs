//! Silence removal by normalized power.

use ndarray::{Array2, ArrayView2};

use crate::error::{Result, VcError};

use super::{delta::static_delta, mask::Mask};

/// Keep the frames of `data` whose normalized power exceeds `threshold` [dB].
pub fn extfrm(data: ArrayView2<f64>, npow: &[f64], threshold: f64) -> Result<Array2<f64>> {
    VcError::check_dim("extfrm (npow length)", data.nrows(), npow.len())?;
    Ok(Mask::above(npow, threshold).select_rows(data))
}

/// Append delta features, then remove silent frames.
pub fn extsddata(data: ArrayView2<f64>, npow: &[f64], threshold: f64) -> Result<Array2<f64>> {
    extfrm(static_delta(data).view(), npow, threshold)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use crate::error::VcError;

    use super::{extfrm, extsddata};

    #[test]
    fn removes_silence() {
        let data = array![[1.0], [2.0], [3.0], [4.0]];
        let npow = [-30.0, -10.0, -20.0, 0.0];
        let ext = extfrm(data.view(), &npow, -20.0).unwrap();
        assert_eq!(ext, array![[2.0], [4.0]]);
    }

    #[test]
    fn delta_before_removal() {
        let data = array![[1.0], [2.0], [4.0]];
        let npow = [-50.0, 0.0, 0.0];
        let ext = extsddata(data.view(), &npow, -20.0).unwrap();
        // the delta of frame 1 still sees the removed frame 0
        assert_eq!(ext, array![[2.0, 1.5], [4.0, -1.0]]);
    }

    #[test]
    fn length_mismatch() {
        let data = array![[1.0], [2.0]];
        assert!(matches!(
            extfrm(data.view(), &[0.0], -20.0),
            Err(VcError::DimensionMismatch { .. })
        ));
    }
}
