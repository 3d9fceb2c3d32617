//! Speaker and speaker-pair settings.
//!
//! Both structs deserialize from JSON with every key optional; missing keys
//! take the documented defaults. Setters clamp values into their valid
//! range, [`SpeakerConfig::validate`] and [`PairConfig::validate`] report
//! what cannot be clamped.

use serde::{Deserialize, Serialize};

use crate::{
    align::Aligner,
    constants::{MS_EMPHASIS, POWER_THRESHOLD},
    error::{Result, VcError},
    gmm::{ConversionType, CovarianceKind, GmmMode, GmmTrainer},
    jnt::JointFeatureExtractor,
};

/// Analysis settings of one speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakerConfig {
    /// Sampling frequency [Hz]
    fs: usize,
    /// FFT length
    fftl: usize,
    /// Frame shift [ms]
    shiftms: f64,
    /// F0 search floor [Hz]
    minf0: f64,
    /// F0 search ceiling [Hz]
    maxf0: f64,
    /// Mel-cepstral order
    mcep_dim: usize,
    /// All-pass constant of the frequency warping
    mcep_alpha: f64,
    /// Normalized power [dB] below which a frame is silence
    power_threshold: f64,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            fs: 16000,
            fftl: 1024,
            shiftms: 5.0,
            minf0: 40.0,
            maxf0: 700.0,
            mcep_dim: 24,
            mcep_alpha: 0.41,
            power_threshold: POWER_THRESHOLD,
        }
    }
}

impl SpeakerConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fs == 0 {
            return Err(VcError::invalid("fs", "must be positive"));
        }
        if !self.fftl.is_power_of_two() {
            return Err(VcError::invalid("fftl", format!("{} is not a power of two", self.fftl)));
        }
        if self.shiftms <= 0.0 {
            return Err(VcError::invalid("shiftms", "must be positive"));
        }
        if !(0.0 < self.minf0 && self.minf0 < self.maxf0) {
            return Err(VcError::invalid(
                "minf0",
                format!("need 0 < minf0 < maxf0, got {} and {}", self.minf0, self.maxf0),
            ));
        }
        if self.mcep_dim == 0 {
            return Err(VcError::invalid("mcep_dim", "must be positive"));
        }
        if self.mcep_alpha.abs() >= 1.0 {
            return Err(VcError::invalid("mcep_alpha", "must lie in (-1, 1)"));
        }
        Ok(())
    }

    pub fn set_fs(&mut self, i: usize) {
        self.fs = i.max(1);
    }
    pub fn get_fs(&self) -> usize {
        self.fs
    }

    pub fn set_fftl(&mut self, i: usize) {
        self.fftl = i.max(1).next_power_of_two();
    }
    pub fn get_fftl(&self) -> usize {
        self.fftl
    }

    pub fn set_shiftms(&mut self, f: f64) {
        self.shiftms = f.max(f64::EPSILON);
    }
    pub fn get_shiftms(&self) -> f64 {
        self.shiftms
    }
    /// Frame shift in samples.
    pub fn get_shift_samples(&self) -> usize {
        (self.fs as f64 * self.shiftms / 1000.0).round() as usize
    }

    pub fn set_f0_range(&mut self, minf0: f64, maxf0: f64) {
        self.minf0 = minf0.max(0.0).min(maxf0);
        self.maxf0 = maxf0.max(self.minf0);
    }
    pub fn get_minf0(&self) -> f64 {
        self.minf0
    }
    pub fn get_maxf0(&self) -> f64 {
        self.maxf0
    }

    pub fn set_mcep_dim(&mut self, i: usize) {
        self.mcep_dim = i.max(1);
    }
    pub fn get_mcep_dim(&self) -> usize {
        self.mcep_dim
    }

    pub fn set_mcep_alpha(&mut self, f: f64) {
        self.mcep_alpha = f.max(-0.99).min(0.99);
    }
    pub fn get_mcep_alpha(&self) -> f64 {
        self.mcep_alpha
    }

    pub fn set_power_threshold(&mut self, f: f64) {
        self.power_threshold = f;
    }
    pub fn get_power_threshold(&self) -> f64 {
        self.power_threshold
    }
}

/// Training and conversion settings of a speaker pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairConfig {
    /// Refinements of the joint features after the initial alignment
    jnt_n_iter: usize,
    /// Mixture components
    n_mix: usize,
    /// EM iterations
    n_iter: usize,
    covtype: CovarianceKind,
    cvtype: ConversionType,
    gmmmode: GmmMode,
    aligner: Aligner,
    /// Blend of the GV postfilter output with its input
    gv_morph_coeff: f64,
    /// Strength of the modulation spectrum correction
    ms_emphasis: f64,
    /// Seed of the GMM initialisation
    seed: u64,
}

impl Default for PairConfig {
    fn default() -> Self {
        Self {
            jnt_n_iter: 3,
            n_mix: 32,
            n_iter: 100,
            covtype: CovarianceKind::Full,
            cvtype: ConversionType::Mlpg,
            gmmmode: GmmMode::Normal,
            aligner: Aligner::default(),
            gv_morph_coeff: 1.0,
            ms_emphasis: MS_EMPHASIS,
            seed: 0,
        }
    }
}

impl PairConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_mix == 0 {
            return Err(VcError::invalid("n_mix", "must be positive"));
        }
        if self.n_iter == 0 {
            return Err(VcError::invalid("n_iter", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.gv_morph_coeff) {
            return Err(VcError::invalid("gv_morph_coeff", "must lie in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.ms_emphasis) {
            return Err(VcError::invalid("ms_emphasis", "must lie in [0, 1]"));
        }
        Ok(())
    }

    /// EM trainer with these settings.
    pub fn trainer(&self) -> GmmTrainer {
        GmmTrainer::new(self.n_mix, self.n_iter, self.covtype).with_seed(self.seed)
    }

    /// Joint feature extractor of `pair`, trimming silence at the source
    /// speaker's power threshold.
    pub fn extractor(&self, pair: impl Into<String>, speaker: &SpeakerConfig) -> JointFeatureExtractor {
        JointFeatureExtractor::new(pair, self.jnt_n_iter, self.trainer())
            .with_aligner(self.aligner)
            .with_threshold(speaker.get_power_threshold())
    }

    pub fn set_jnt_n_iter(&mut self, i: usize) {
        self.jnt_n_iter = i;
    }
    pub fn get_jnt_n_iter(&self) -> usize {
        self.jnt_n_iter
    }

    pub fn set_n_mix(&mut self, i: usize) {
        self.n_mix = i.max(1);
    }
    pub fn get_n_mix(&self) -> usize {
        self.n_mix
    }

    pub fn set_n_iter(&mut self, i: usize) {
        self.n_iter = i.max(1);
    }
    pub fn get_n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn set_covtype(&mut self, covtype: CovarianceKind) {
        self.covtype = covtype;
    }
    pub fn get_covtype(&self) -> CovarianceKind {
        self.covtype
    }

    pub fn set_cvtype(&mut self, cvtype: ConversionType) {
        self.cvtype = cvtype;
    }
    pub fn get_cvtype(&self) -> ConversionType {
        self.cvtype
    }

    pub fn set_gmmmode(&mut self, gmmmode: GmmMode) {
        self.gmmmode = gmmmode;
    }
    pub fn get_gmmmode(&self) -> GmmMode {
        self.gmmmode
    }

    pub fn set_aligner(&mut self, aligner: Aligner) {
        self.aligner = aligner;
    }
    pub fn get_aligner(&self) -> Aligner {
        self.aligner
    }

    pub fn set_gv_morph_coeff(&mut self, f: f64) {
        self.gv_morph_coeff = f.max(0.0).min(1.0);
    }
    pub fn get_gv_morph_coeff(&self) -> f64 {
        self.gv_morph_coeff
    }

    pub fn set_ms_emphasis(&mut self, f: f64) {
        self.ms_emphasis = f.max(0.0).min(1.0);
    }
    pub fn get_ms_emphasis(&self) -> f64 {
        self.ms_emphasis
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }
    pub fn get_seed(&self) -> u64 {
        self.seed
    }
}
