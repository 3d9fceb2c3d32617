//! Normalized frame power of a power spectrogram.

use ndarray::{ArrayView1, ArrayView2};

use crate::{
    constants::LOG_FLOOR,
    error::{Result, VcError},
};

/// Power of one frame of a one-sided power spectrum (`fftl / 2 + 1` bins).
pub fn frame_power(spectrum: ArrayView1<f64>) -> f64 {
    let bins = spectrum.len();
    if bins < 2 {
        return spectrum.sum();
    }
    let half = bins - 1;
    let inner: f64 = spectrum.slice(ndarray::s![1..half]).sum();
    (spectrum[0] + spectrum[half] + 2.0 * inner) / (2 * half) as f64
}

/// Frame power in dB relative to the mean power of the utterance.
pub fn normalized_power(spectrogram: ArrayView2<f64>) -> Result<Vec<f64>> {
    if spectrogram.nrows() == 0 {
        return Err(VcError::EmptySequence {
            context: "normalized power",
        });
    }
    let power: Vec<f64> = spectrogram.rows().into_iter().map(frame_power).collect();
    let mean = power.iter().sum::<f64>() / power.len() as f64;
    if !(mean > 0.0) {
        return Err(VcError::DegenerateData(
            "spectrogram has no energy".to_owned(),
        ));
    }
    Ok(power
        .into_iter()
        .map(|p| 10.0 * (p.max(LOG_FLOOR) / mean).log10())
        .collect())
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    use super::{frame_power, normalized_power};

    #[test]
    fn one_sided_power() {
        // bins 0 and 2 are counted once, bin 1 twice
        assert_abs_diff_eq!(frame_power(array![1.0, 2.0, 3.0].view()), 2.0);
    }

    #[test]
    fn relative_to_mean() {
        let spectrogram = Array2::from_shape_fn((2, 5), |(t, _)| if t == 0 { 1.0 } else { 3.0 });
        let npow = normalized_power(spectrogram.view()).unwrap();
        assert_abs_diff_eq!(npow[0], 10.0 * 0.5f64.log10(), epsilon = 1e-12);
        assert_abs_diff_eq!(npow[1], 10.0 * 1.5f64.log10(), epsilon = 1e-12);

        assert!(normalized_power(Array2::zeros((3, 5)).view()).is_err());
        assert!(normalized_power(Array2::zeros((0, 5)).view()).is_err());
    }
}
