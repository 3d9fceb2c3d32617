//! Iterative estimation of joint source/target features.
//!
//! Iteration 0 aligns the silence-trimmed source and target directly. Every
//! later iteration trains a joint GMM on the previous joint matrix, converts
//! the source with it, re-aligns the converted source against the target and
//! rebuilds the joint matrix from the unconverted features along the refined
//! warp. Each iteration is persisted, so an interrupted run can resume from
//! the last complete one.

use ndarray::{Array2, ArrayView2, Axis, s};
use rayon::prelude::*;

use crate::{
    align::{Aligner, TimeWarpFunction},
    constants::POWER_THRESHOLD,
    error::{Result, VcError},
    feature::{extsddata, normalized_melcd, static_delta},
    gmm::{ConversionModel, ConversionType, GmmMode, GmmTrainer, JointGmm},
    list::UtteranceList,
    store::{
        Artifact, ArtifactKey, ArtifactKind, FeatureRecord, Repository,
        record::{MCEP, NPOW},
    },
};

/// Mel-cepstrum and normalized power of one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct UtteranceFeatures {
    /// `[T, dim]`, including the 0th (power) coefficient.
    pub mcep: Array2<f64>,
    /// Normalized power in dB, one value per frame.
    pub npow: Vec<f64>,
}

impl UtteranceFeatures {
    pub fn new(mcep: Array2<f64>, npow: Vec<f64>) -> Result<Self> {
        VcError::check_dim("utterance npow", mcep.nrows(), npow.len())?;
        Ok(Self { mcep, npow })
    }

    pub fn from_record(record: &FeatureRecord) -> Result<Self> {
        Self::new(record.stream(MCEP)?.to_owned(), record.scalar(NPOW)?)
    }
}

/// Parallel utterance of the source and target speaker.
#[derive(Debug, Clone, PartialEq)]
pub struct UtterancePair {
    /// Names the warp function of this pair in the repository.
    pub id: String,
    pub source: UtteranceFeatures,
    pub target: UtteranceFeatures,
}

impl UtterancePair {
    pub fn new(id: impl Into<String>, source: UtteranceFeatures, target: UtteranceFeatures) -> Self {
        Self {
            id: id.into(),
            source,
            target,
        }
    }

    /// Read both feature records from `repository`. The pair takes the id of
    /// the source utterance.
    pub fn load(
        repository: &Repository,
        (source_speaker, source_utterance): (&str, &str),
        (target_speaker, target_utterance): (&str, &str),
    ) -> Result<Self> {
        let source = repository.feature(&ArtifactKey::feature(source_speaker, source_utterance))?;
        let target = repository.feature(&ArtifactKey::feature(target_speaker, target_utterance))?;
        Ok(Self::new(
            source_utterance,
            UtteranceFeatures::from_record(&source)?,
            UtteranceFeatures::from_record(&target)?,
        ))
    }

    /// Load every pair named by two lists of equal length.
    pub fn load_all(
        repository: &Repository,
        (source_speaker, source_list): (&str, &UtteranceList),
        (target_speaker, target_list): (&str, &UtteranceList),
    ) -> Result<Vec<Self>> {
        source_list
            .zip(target_list)?
            .map(|(source, target)| {
                Self::load(repository, (source_speaker, source), (target_speaker, target))
            })
            .collect()
    }
}

/// Outcome of one iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct JointSnapshot {
    pub iteration: usize,
    /// One warp per utterance pair, in input order.
    pub twfs: Vec<TimeWarpFunction>,
    /// `[sum of warp lengths, 2 * sddim]`
    pub joint: Array2<f64>,
    /// Model the warps were refined with. `None` at iteration 0.
    pub gmm: Option<JointGmm>,
}

/// Silence-trimmed static+delta features of one pair, fixed across iterations.
struct Prepared<'a> {
    pair: &'a UtterancePair,
    orgdata: Array2<f64>,
    tardata: Array2<f64>,
}

#[derive(Debug, Clone)]
pub struct JointFeatureExtractor {
    pair: String,
    n_iter: usize,
    trainer: GmmTrainer,
    aligner: Aligner,
    threshold: f64,
    cvtype: ConversionType,
    startdim: usize,
}

impl JointFeatureExtractor {
    /// Extractor for the speaker pair `pair` refining the alignment
    /// `n_iter` times.
    pub fn new(pair: impl Into<String>, n_iter: usize, trainer: GmmTrainer) -> Self {
        Self {
            pair: pair.into(),
            n_iter,
            trainer,
            aligner: Aligner::default(),
            threshold: POWER_THRESHOLD,
            cvtype: ConversionType::Mmse,
            startdim: 1,
        }
    }

    pub fn with_aligner(mut self, aligner: Aligner) -> Self {
        self.aligner = aligner;
        self
    }
    /// Normalized power [dB] below which frames are dropped.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
    pub fn with_conversion_type(mut self, cvtype: ConversionType) -> Self {
        self.cvtype = cvtype;
        self
    }
    /// First mel-cepstral dimension taken into the joint features.
    pub fn with_startdim(mut self, startdim: usize) -> Self {
        self.startdim = startdim;
        self
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }
    pub fn trainer(&self) -> &GmmTrainer {
        &self.trainer
    }

    /// Run every iteration from scratch.
    pub fn run(&self, pairs: &[UtterancePair], repository: &Repository) -> Result<JointSnapshot> {
        let prepared = self.prepare(pairs)?;
        let initial = self.initial(&prepared, repository)?;
        self.iterate(initial, &prepared, repository)
    }

    /// Continue from the latest complete iteration found in `repository`,
    /// or start from scratch when there is none.
    pub fn resume(&self, pairs: &[UtterancePair], repository: &Repository) -> Result<JointSnapshot> {
        let prepared = self.prepare(pairs)?;
        let initial = match self.checkpoint(&prepared, repository)? {
            Some(snapshot) => {
                tracing::info!(pair = %self.pair, iteration = snapshot.iteration, "Resuming joint feature extraction");
                snapshot
            }
            None => self.initial(&prepared, repository)?,
        };
        self.iterate(initial, &prepared, repository)
    }

    /// Train the conversion model on the final joint matrix and store it
    /// under [`ArtifactKey::final_gmm`].
    pub fn train_final(&self, snapshot: &JointSnapshot, repository: &Repository) -> Result<JointGmm> {
        let gmm = self.trainer.train(snapshot.joint.view())?;
        repository.put(&ArtifactKey::final_gmm(&self.pair), &Artifact::Gmm(gmm.clone()))?;
        Ok(gmm)
    }

    fn iterate(
        &self,
        start: JointSnapshot,
        prepared: &[Prepared],
        repository: &Repository,
    ) -> Result<JointSnapshot> {
        (start.iteration + 1..=self.n_iter)
            .try_fold(start, |previous, iteration| {
                self.refine(previous, iteration, prepared, repository)
            })
    }

    fn prepare<'a>(&self, pairs: &'a [UtterancePair]) -> Result<Vec<Prepared<'a>>> {
        let first = pairs.first().ok_or(VcError::EmptySequence {
            context: "joint feature extraction",
        })?;
        let dim = first.source.mcep.ncols();
        if dim <= self.startdim {
            return Err(VcError::invalid(
                "startdim",
                format!("{} leaves no dimension of {dim}", self.startdim),
            ));
        }

        pairs
            .par_iter()
            .map(|pair| {
                VcError::check_dim("source mel-cepstrum", dim, pair.source.mcep.ncols())?;
                VcError::check_dim("target mel-cepstrum", dim, pair.target.mcep.ncols())?;
                let trim = |features: &UtteranceFeatures| {
                    extsddata(
                        features.mcep.slice(s![.., self.startdim..]),
                        &features.npow,
                        self.threshold,
                    )
                };
                Ok(Prepared {
                    pair,
                    orgdata: trim(&pair.source)?,
                    tardata: trim(&pair.target)?,
                })
            })
            .collect()
    }

    fn initial(&self, prepared: &[Prepared], repository: &Repository) -> Result<JointSnapshot> {
        tracing::info!(pair = %self.pair, iteration = 0, "Joint feature iteration");
        let twfs = prepared
            .par_iter()
            .map(|p| self.align(p, p.orgdata.view()))
            .collect::<Result<Vec<_>>>()?;
        self.commit(0, twfs, None, prepared, repository)
    }

    fn refine(
        &self,
        previous: JointSnapshot,
        iteration: usize,
        prepared: &[Prepared],
        repository: &Repository,
    ) -> Result<JointSnapshot> {
        tracing::info!(pair = %self.pair, iteration, "Joint feature iteration");
        let gmm = self.trainer.train(previous.joint.view())?;
        drop(previous);
        repository.put(
            &ArtifactKey::gmm(&self.pair, iteration),
            &Artifact::Gmm(gmm.clone()),
        )?;

        let model = ConversionModel::new(&gmm, GmmMode::Normal)?;
        let twfs = prepared
            .par_iter()
            .map(|p| {
                let converted = self.convert(&model, p.pair)?;
                self.align(p, converted.view())
            })
            .collect::<Result<Vec<_>>>()?;
        self.commit(iteration, twfs, Some(gmm), prepared, repository)
    }

    /// Converted source with deltas, trimmed by the source power so that its
    /// frames line up with the trimmed source.
    fn convert(&self, model: &ConversionModel, pair: &UtterancePair) -> Result<Array2<f64>> {
        let source = &pair.source;
        let sddata = static_delta(source.mcep.slice(s![.., self.startdim..]));
        let converted = model.convert(sddata.view(), self.cvtype)?;
        extsddata(converted.view(), &source.npow, self.threshold)
    }

    fn align(&self, prepared: &Prepared, query: ArrayView2<f64>) -> Result<TimeWarpFunction> {
        let alignment = self.aligner.align(query, prepared.tardata.view())?;
        let (source, target): (Vec<usize>, Vec<usize>) = alignment.twf.pairs().iter().copied().unzip();
        let melcd = normalized_melcd(
            query.select(Axis(0), &source).view(),
            prepared.tardata.select(Axis(0), &target).view(),
        )?;
        tracing::debug!(
            utterance = %prepared.pair.id,
            melcd,
            frames = alignment.twf.len(),
            "Aligned utterance"
        );
        Ok(alignment.twf)
    }

    /// Build the joint matrix of `twfs` and persist the iteration.
    fn commit(
        &self,
        iteration: usize,
        twfs: Vec<TimeWarpFunction>,
        gmm: Option<JointGmm>,
        prepared: &[Prepared],
        repository: &Repository,
    ) -> Result<JointSnapshot> {
        let rows = twfs.iter().map(TimeWarpFunction::len).sum();
        let dim = prepared
            .first()
            .map_or(0, |p| p.orgdata.ncols() + p.tardata.ncols());

        let mut joint = Array2::zeros((rows, dim));
        let mut offset = 0;
        for (p, twf) in prepared.iter().zip(&twfs) {
            twf.join_into(
                p.orgdata.view(),
                p.tardata.view(),
                joint.slice_mut(s![offset..offset + twf.len(), ..]),
            )?;
            offset += twf.len();
            repository.put(
                &ArtifactKey::twf(&self.pair, iteration, &p.pair.id),
                &Artifact::Twf(twf.clone()),
            )?;
        }
        repository.put(
            &ArtifactKey::joint(&self.pair, iteration),
            &Artifact::Joint(joint.clone()),
        )?;
        tracing::info!(pair = %self.pair, iteration, frames = rows, "Joint features built");

        Ok(JointSnapshot {
            iteration,
            twfs,
            joint,
            gmm,
        })
    }

    /// Latest iteration up to `n_iter` whose joint matrix and warps are all
    /// stored and consistent with `prepared`.
    fn checkpoint(&self, prepared: &[Prepared], repository: &Repository) -> Result<Option<JointSnapshot>> {
        let mut iterations: Vec<usize> = repository
            .store()
            .list(ArtifactKind::Joint, &self.pair)?
            .into_iter()
            .filter_map(|key| key.iteration)
            .filter(|&iteration| iteration <= self.n_iter)
            .collect();
        iterations.sort_unstable_by(|a, b| b.cmp(a));

        for iteration in iterations {
            match self.load(iteration, prepared, repository) {
                Ok(snapshot) => return Ok(Some(snapshot)),
                Err(VcError::MissingArtifact(key)) => {
                    tracing::debug!(%key, iteration, "Incomplete checkpoint");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    fn load(&self, iteration: usize, prepared: &[Prepared], repository: &Repository) -> Result<JointSnapshot> {
        let joint = repository.joint(&ArtifactKey::joint(&self.pair, iteration))?;
        let twfs = prepared
            .iter()
            .map(|p| repository.twf(&ArtifactKey::twf(&self.pair, iteration, &p.pair.id)))
            .collect::<Result<Vec<_>>>()?;
        let rows = twfs.iter().map(TimeWarpFunction::len).sum();
        VcError::check_dim("stored joint frames", rows, joint.nrows())?;
        if let Some(p) = prepared.first() {
            VcError::check_dim(
                "stored joint dimension",
                p.orgdata.ncols() + p.tardata.ncols(),
                joint.ncols(),
            )?;
        }

        let gmm = match iteration {
            0 => None,
            _ => match repository.gmm(&ArtifactKey::gmm(&self.pair, iteration)) {
                Ok(gmm) => Some(gmm),
                Err(VcError::MissingArtifact(_)) => None,
                Err(e) => return Err(e),
            },
        };
        Ok(JointSnapshot {
            iteration,
            twfs,
            joint,
            gmm,
        })
    }
}
