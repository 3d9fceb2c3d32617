/// 10 / ln(10), converts a natural-log cepstral distance into decibels.
pub const MELCD_COEF: f64 = 4.342_944_819_032_518;

/// Normalized power threshold in dB below which a frame is treated as silence.
pub const POWER_THRESHOLD: f64 = -20.0;

/// Value added to every covariance diagonal after each M-step.
pub const COVARIANCE_FLOOR: f64 = 1e-6;

/// Lower bound on a magnitude before taking its logarithm.
pub const LOG_FLOOR: f64 = 1e-300;

/// Lower bound on a variance used as a divisor in the postfilters.
pub const VARIANCE_FLOOR: f64 = 1e-12;

/// Default search radius of the windowed DTW.
pub const FASTDTW_RADIUS: usize = 1;

/// Default emphasis coefficient of the modulation spectrum postfilter.
pub const MS_EMPHASIS: f64 = 0.85;
