//! Bridge to the waveform analyzer and synthesizer, and conversion of
//! analysed utterances.
//!
//! Signal processing itself lives behind [`Analyzer`] and [`Synthesizer`].
//! This module turns their output into [`FeatureRecord`]s and converts those
//! records with a trained model and the speaker statistics.

use ndarray::{Array2, ArrayView2, Axis, concatenate, s};
use rayon::prelude::*;

use crate::{
    config::{PairConfig, SpeakerConfig},
    error::{Result, VcError},
    feature::{normalized_power, static_delta},
    gmm::{ConversionModel, ConversionType, GmmMode, JointGmm},
    stats::{F0Converter, GvStatistics, MsStatistics},
    store::{
        Artifact, ArtifactKey, FeatureRecord, Repository,
        record::{AP, F0, MCEP, NPOW},
    },
};

/// Output of [`Analyzer::analyze`], one row per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// F0 [Hz], 0 for unvoiced frames.
    pub f0: Vec<f64>,
    /// One-sided power spectral envelope, `[T, fftl / 2 + 1]`.
    pub spectrum: Array2<f64>,
    /// Aperiodicity, `[T, fftl / 2 + 1]`.
    pub aperiodicity: Array2<f64>,
}

pub trait Analyzer: Send + Sync {
    fn analyze(&self, waveform: &[f64], config: &SpeakerConfig) -> Result<Analysis>;

    /// Mel-cepstrum of order `order` (`order + 1` coefficients) of each
    /// spectral envelope frame.
    fn parameterize(&self, spectrum: ArrayView2<f64>, order: usize, alpha: f64) -> Result<Array2<f64>>;
}

pub trait Synthesizer: Send + Sync {
    /// Waveform of `mcep`. When `reference` is given, the frame power of
    /// `mcep` is matched to it before synthesis.
    fn synthesize(
        &self,
        f0: &[f64],
        mcep: ArrayView2<f64>,
        aperiodicity: ArrayView2<f64>,
        reference: Option<ArrayView2<f64>>,
        config: &SpeakerConfig,
    ) -> Result<Vec<f64>>;

    /// Filter `waveform` by the mel-cepstral difference `diff_mcep`.
    fn synthesize_diff(
        &self,
        waveform: &[f64],
        diff_mcep: ArrayView2<f64>,
        config: &SpeakerConfig,
    ) -> Result<Vec<f64>>;
}

/// Produces the feature record of a waveform.
#[derive(Debug, Clone)]
pub struct FeatureExtractor<A: Analyzer> {
    analyzer: A,
    config: SpeakerConfig,
}

impl<A: Analyzer> FeatureExtractor<A> {
    pub fn new(analyzer: A, config: SpeakerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { analyzer, config })
    }

    pub fn config(&self) -> &SpeakerConfig {
        &self.config
    }

    /// `f0`, `mcep`, `npow` and `ap` streams of `waveform`.
    pub fn extract(&self, waveform: &[f64]) -> Result<FeatureRecord> {
        let analysis = self.analyzer.analyze(waveform, &self.config)?;
        let frames = analysis.f0.len();
        VcError::check_dim("spectral envelope frames", frames, analysis.spectrum.nrows())?;
        VcError::check_dim("aperiodicity frames", frames, analysis.aperiodicity.nrows())?;

        let mcep = self.analyzer.parameterize(
            analysis.spectrum.view(),
            self.config.get_mcep_dim(),
            self.config.get_mcep_alpha(),
        )?;
        VcError::check_dim("mel-cepstrum frames", frames, mcep.nrows())?;
        VcError::check_dim("mel-cepstrum order", self.config.get_mcep_dim() + 1, mcep.ncols())?;
        let npow = normalized_power(analysis.spectrum.view())?;

        let mut record = FeatureRecord::new();
        record
            .insert_scalar(F0, &analysis.f0)
            .insert(MCEP, mcep)
            .insert_scalar(NPOW, &npow)
            .insert(AP, analysis.aperiodicity);
        Ok(record)
    }

    /// Extract and store under [`ArtifactKey::feature`].
    pub fn extract_into(
        &self,
        repository: &Repository,
        speaker: &str,
        utterance: &str,
        waveform: &[f64],
    ) -> Result<FeatureRecord> {
        let record = self.extract(waveform)?;
        repository.put(
            &ArtifactKey::feature(speaker, utterance),
            &Artifact::Feature(record.clone()),
        )?;
        Ok(record)
    }
}

/// Convert the dimensions of `mcep` from `startdim` on and keep the lower
/// ones (the power) from the source.
pub fn convert_mcep(
    model: &ConversionModel,
    mcep: ArrayView2<f64>,
    cvtype: ConversionType,
    startdim: usize,
) -> Result<Array2<f64>> {
    if startdim >= mcep.ncols() {
        return Err(VcError::invalid(
            "startdim",
            format!("{startdim} leaves no dimension of {}", mcep.ncols()),
        ));
    }
    let converted = model.convert(static_delta(mcep.slice(s![.., startdim..])).view(), cvtype)?;
    concatenate(Axis(1), &[mcep.slice(s![.., ..startdim]), converted.view()])
        .map_err(|e| VcError::invalid("mcep", e.to_string()))
}

/// GV of converted training data, the reference variance of the GV
/// postfilter.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedGv {
    /// Of the normal-mode conversion.
    pub normal: GvStatistics,
    /// Of `source + difference` in differential mode.
    pub differential: GvStatistics,
}

impl ConvertedGv {
    pub fn estimate(
        gmm: &JointGmm,
        mceps: &[ArrayView2<f64>],
        cvtype: ConversionType,
        startdim: usize,
    ) -> Result<Self> {
        let normal = ConversionModel::new(gmm, GmmMode::Normal)?;
        let differential = ConversionModel::new(gmm, GmmMode::Differential)?;

        let converted = mceps
            .par_iter()
            .map(|mcep| {
                let cv = convert_mcep(&normal, *mcep, cvtype, startdim)?;
                let mut diffcv = convert_mcep(&differential, *mcep, cvtype, startdim)?;
                let mut upper = diffcv.slice_mut(s![.., startdim..]);
                upper += &mcep.slice(s![.., startdim..]);
                Ok((cv, diffcv))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            normal: GvStatistics::estimate(converted.iter().map(|(cv, _)| cv.view()))?,
            differential: GvStatistics::estimate(converted.iter().map(|(_, diff)| diff.view()))?,
        })
    }

    pub fn save(&self, repository: &Repository, pair: &str) -> Result<()> {
        repository.put(
            &ArtifactKey::converted_gv(pair),
            &Artifact::GvStats(self.normal.clone()),
        )?;
        repository.put(
            &ArtifactKey::diff_converted_gv(pair),
            &Artifact::GvStats(self.differential.clone()),
        )?;
        Ok(())
    }

    pub fn load(repository: &Repository, pair: &str) -> Result<Self> {
        Ok(Self {
            normal: repository.gv_stats(&ArtifactKey::converted_gv(pair))?,
            differential: repository.gv_stats(&ArtifactKey::diff_converted_gv(pair))?,
        })
    }
}

/// Modulation spectrum of converted training data, the reference of the MS
/// postfilter. Stored under [`ArtifactKey::converted_ms`].
pub fn estimate_converted_ms(
    gmm: &JointGmm,
    mceps: &[ArrayView2<f64>],
    cvtype: ConversionType,
    startdim: usize,
) -> Result<MsStatistics> {
    let model = ConversionModel::new(gmm, GmmMode::Normal)?;
    let converted = mceps
        .par_iter()
        .map(|mcep| convert_mcep(&model, *mcep, cvtype, startdim))
        .collect::<Result<Vec<_>>>()?;
    MsStatistics::estimate(converted.iter().map(Array2::view))
}

/// Modulation spectrum correction applied after the GV postfilter.
#[derive(Debug, Clone)]
struct MsCorrection {
    target: MsStatistics,
    converted: MsStatistics,
    emphasis: f64,
    alpha: f64,
}

/// `Ok(None)` for a missing artifact.
fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(VcError::MissingArtifact(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Everything needed to convert utterances of one speaker pair.
#[derive(Debug, Clone)]
pub struct ConversionSession {
    model: ConversionModel,
    cvtype: ConversionType,
    f0: F0Converter,
    target_gv: GvStatistics,
    /// Variance the GV postfilter corrects from. `None` uses the variance of
    /// the converted utterance itself.
    reference_gv: Option<GvStatistics>,
    gv_morph_coeff: f64,
    ms: Option<MsCorrection>,
    startdim: usize,
}

impl ConversionSession {
    pub fn new(
        model: ConversionModel,
        f0: F0Converter,
        target_gv: GvStatistics,
        reference_gv: Option<GvStatistics>,
    ) -> Self {
        Self {
            model,
            cvtype: ConversionType::default(),
            f0,
            target_gv,
            reference_gv,
            gv_morph_coeff: 1.0,
            ms: None,
            startdim: 1,
        }
    }

    /// Load the final model of `pair` and the statistics of both speakers.
    /// Any missing artifact fails the whole session, except the modulation
    /// spectra: the MS postfilter is enabled only when both the target's
    /// and the pair's converted statistics are stored.
    pub fn open(
        repository: &Repository,
        (source, target): (&str, &str),
        pair: &str,
        config: &PairConfig,
    ) -> Result<Self> {
        let gmm = repository.gmm(&ArtifactKey::final_gmm(pair))?;
        let mode = config.get_gmmmode();
        let model = ConversionModel::new(&gmm, mode)?;
        let f0 = F0Converter::new(
            repository.f0_stats(&ArtifactKey::f0_stats(source))?,
            repository.f0_stats(&ArtifactKey::f0_stats(target))?,
        )?;
        let target_gv = repository.gv_stats(&ArtifactKey::gv_stats(target))?;
        let reference_gv = match mode {
            GmmMode::Normal => Some(repository.gv_stats(&ArtifactKey::converted_gv(pair))?),
            GmmMode::Differential => {
                Some(repository.gv_stats(&ArtifactKey::diff_converted_gv(pair))?)
            }
            GmmMode::Intra => None,
        };

        let target_ms = optional(repository.ms_stats(&ArtifactKey::ms_stats(target)))?;
        let converted_ms = optional(repository.ms_stats(&ArtifactKey::converted_ms(pair)))?;

        tracing::info!(pair, %mode, cvtype = %config.get_cvtype(), "Opened conversion session");
        let session = Self::new(model, f0, target_gv, reference_gv)
            .with_conversion_type(config.get_cvtype())
            .with_gv_morph_coeff(config.get_gv_morph_coeff());
        Ok(match (target_ms, converted_ms) {
            (Some(target_ms), Some(converted_ms)) => {
                session.with_ms(target_ms, converted_ms, config.get_ms_emphasis())
            }
            (None, None) => session,
            _ => {
                tracing::warn!(pair, "Only one side of the MS statistics is stored, MS postfilter disabled");
                session
            }
        })
    }

    pub fn with_conversion_type(mut self, cvtype: ConversionType) -> Self {
        self.cvtype = cvtype;
        self
    }
    pub fn with_gv_morph_coeff(mut self, alpha: f64) -> Self {
        self.gv_morph_coeff = alpha.max(0.0).min(1.0);
        self
    }
    /// Also correct the modulation spectrum of normal and intra-mode output
    /// from `converted` towards `target` with emphasis `k`.
    pub fn with_ms(mut self, target: MsStatistics, converted: MsStatistics, k: f64) -> Self {
        self.ms = Some(MsCorrection {
            target,
            converted,
            emphasis: k,
            alpha: 1.0,
        });
        self
    }
    /// Blend of the MS postfilter output with its input. Has no effect
    /// without [`Self::with_ms`].
    pub fn with_ms_morph_coeff(mut self, alpha: f64) -> Self {
        if let Some(ms) = &mut self.ms {
            ms.alpha = alpha.max(0.0).min(1.0);
        }
        self
    }

    /// Emphasis of the MS postfilter, if enabled.
    pub fn ms_emphasis(&self) -> Option<f64> {
        self.ms.as_ref().map(|ms| ms.emphasis)
    }

    pub fn mode(&self) -> GmmMode {
        self.model.mode()
    }
    pub fn model(&self) -> &ConversionModel {
        &self.model
    }

    /// Converted F0 and mel-cepstrum.
    ///
    /// In differential mode the returned mel-cepstrum is the postfiltered
    /// difference to apply to the source waveform, with a zero power term.
    pub fn convert(&self, f0: &[f64], mcep: ArrayView2<f64>) -> Result<(Vec<f64>, Array2<f64>)> {
        VcError::check_dim("F0 frames", mcep.nrows(), f0.len())?;
        let cvf0 = self.f0.convert(f0);
        let mut cvmcep = convert_mcep(&self.model, mcep, self.cvtype, self.startdim)?;

        let cvmcep = match self.model.mode() {
            GmmMode::Differential => {
                cvmcep.slice_mut(s![.., ..self.startdim]).fill(0.0);
                let filtered = self.target_gv.postfilter(
                    (&mcep + &cvmcep).view(),
                    self.reference_gv.as_ref(),
                    self.gv_morph_coeff,
                    self.startdim,
                )?;
                filtered - &mcep
            }
            GmmMode::Normal | GmmMode::Intra => {
                let filtered = self.target_gv.postfilter(
                    cvmcep.view(),
                    self.reference_gv.as_ref(),
                    self.gv_morph_coeff,
                    self.startdim,
                )?;
                match &self.ms {
                    Some(ms) => ms.target.postfilter(
                        filtered.view(),
                        &ms.converted,
                        ms.alpha,
                        ms.emphasis,
                        self.startdim,
                    )?,
                    None => filtered,
                }
            }
        };
        Ok((cvf0, cvmcep))
    }

    /// Convert a feature record. Streams other than `f0` and `mcep` are
    /// carried over unchanged.
    pub fn convert_record(&self, record: &FeatureRecord) -> Result<FeatureRecord> {
        let (f0, mcep) = self.convert(&record.scalar(F0)?, record.stream(MCEP)?)?;
        let mut converted = record.clone();
        converted.insert_scalar(F0, &f0).insert(MCEP, mcep);
        Ok(converted)
    }

    /// Convert every record in parallel. A failed record does not affect
    /// the others.
    pub fn convert_batch(&self, records: &[FeatureRecord]) -> Vec<Result<FeatureRecord>> {
        records
            .par_iter()
            .enumerate()
            .map(|(index, record)| {
                self.convert_record(record).inspect_err(|e| {
                    tracing::warn!(index, error = %e, "Conversion failed");
                })
            })
            .collect()
    }

    /// Waveform of a converted record. Differential sessions filter the
    /// source waveform, the others synthesize from the converted features
    /// with the source mel-cepstrum as the power reference.
    pub fn render(
        &self,
        synthesizer: &impl Synthesizer,
        source_waveform: &[f64],
        source: &FeatureRecord,
        converted: &FeatureRecord,
        config: &SpeakerConfig,
    ) -> Result<Vec<f64>> {
        let mcep = converted.stream(MCEP)?;
        match self.model.mode() {
            GmmMode::Differential => synthesizer.synthesize_diff(source_waveform, mcep, config),
            GmmMode::Normal | GmmMode::Intra => {
                let reference = source.stream(MCEP)?;
                VcError::check_dim("reference mel-cepstrum", mcep.nrows(), reference.nrows())?;
                synthesizer.synthesize(
                    &converted.scalar(F0)?,
                    mcep,
                    converted.stream(AP)?,
                    Some(reference),
                    config,
                )
            }
        }
    }
}
