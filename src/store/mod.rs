//! Persistence of features, alignments, models and statistics.
//!
//! An [`ArtifactStore`] moves raw bytes by [`ArtifactKey`]. A
//! [`Repository`] sits on top of a store and encodes typed [`Artifact`]s.

use std::{fmt::Debug, sync::Arc};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{
    align::TimeWarpFunction,
    error::{Result, VcError},
    gmm::JointGmm,
    stats::{F0Statistics, GvStatistics, MsStatistics},
};

pub mod codec;
mod directory;
mod key;
mod memory;
pub mod record;

pub use self::{
    directory::DirectoryStore,
    key::{ArtifactKey, ArtifactKind},
    memory::MemoryStore,
    record::FeatureRecord,
};

/// Byte-level key-value storage of artifacts.
pub trait ArtifactStore: Send + Sync + Debug {
    /// Get the bytes stored at `key`, if any.
    fn get_bytes(&self, key: &ArtifactKey) -> Result<Option<Vec<u8>>>;

    /// Store `value` at `key`, replacing what was there.
    fn put_bytes(&self, key: &ArtifactKey, value: &[u8]) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn delete(&self, key: &ArtifactKey) -> Result<()>;

    fn contains(&self, key: &ArtifactKey) -> Result<bool> {
        Ok(self.get_bytes(key)?.is_some())
    }

    /// Keys of one kind belonging to `owner`, sorted.
    fn list(&self, kind: ArtifactKind, owner: &str) -> Result<Vec<ArtifactKey>>;
}

/// What to do when writing to a key that already holds an artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    #[default]
    Overwrite,
    /// Leave the stored artifact in place.
    KeepExisting,
    /// Fail with [`VcError::ArtifactExists`].
    Fail,
}

/// Typed artifact payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Feature(FeatureRecord),
    Twf(TimeWarpFunction),
    Joint(Array2<f64>),
    Gmm(JointGmm),
    F0Stats(F0Statistics),
    /// GV statistics, stored under [`ArtifactKind::GvStats`] or
    /// [`ArtifactKind::ConvertedGv`].
    GvStats(GvStatistics),
    MsStats(MsStatistics),
}

impl Artifact {
    /// Whether this payload may be stored under `kind`.
    pub fn fits(&self, kind: ArtifactKind) -> bool {
        matches!(
            (self, kind),
            (Self::Feature(_), ArtifactKind::Feature)
                | (Self::Twf(_), ArtifactKind::Twf)
                | (Self::Joint(_), ArtifactKind::Joint)
                | (Self::Gmm(_), ArtifactKind::Gmm)
                | (Self::F0Stats(_), ArtifactKind::F0Stats)
                | (Self::GvStats(_), ArtifactKind::GvStats | ArtifactKind::ConvertedGv)
                | (Self::MsStats(_), ArtifactKind::MsStats)
        )
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(match self {
            Self::Feature(record) => codec::encode_record(record),
            Self::Twf(twf) => codec::format_twf(twf).into_bytes(),
            Self::Joint(joint) => codec::encode_matrix(joint.view()),
            Self::Gmm(gmm) => serde_json::to_vec(gmm)?,
            Self::F0Stats(stats) => serde_json::to_vec(stats)?,
            Self::GvStats(stats) => serde_json::to_vec(stats)?,
            Self::MsStats(stats) => serde_json::to_vec(stats)?,
        })
    }

    fn decode(key: &ArtifactKey, bytes: &[u8]) -> Result<Self> {
        let malformed = |reason: String| VcError::MalformedArtifact {
            key: key.clone(),
            reason,
        };
        let json = |e: serde_json::Error| malformed(e.to_string());

        Ok(match key.kind {
            ArtifactKind::Feature => {
                Self::Feature(codec::read_record(bytes).map_err(|e| malformed(e.to_string()))?)
            }
            ArtifactKind::Twf => {
                let text = std::str::from_utf8(bytes).map_err(|e| malformed(e.to_string()))?;
                Self::Twf(codec::parse_twf(text).map_err(|e| malformed(e.to_string()))?)
            }
            ArtifactKind::Joint => {
                Self::Joint(codec::read_matrix(bytes).map_err(|e| malformed(e.to_string()))?)
            }
            ArtifactKind::Gmm => {
                let gmm: JointGmm = serde_json::from_slice(bytes).map_err(json)?;
                gmm.validate().map_err(|e| malformed(e.to_string()))?;
                Self::Gmm(gmm)
            }
            ArtifactKind::F0Stats => Self::F0Stats(serde_json::from_slice(bytes).map_err(json)?),
            ArtifactKind::GvStats | ArtifactKind::ConvertedGv => {
                let stats: GvStatistics = serde_json::from_slice(bytes).map_err(json)?;
                VcError::check_dim("GV statistics", stats.mean.len(), stats.var.len())
                    .map_err(|e| malformed(e.to_string()))?;
                Self::GvStats(stats)
            }
            ArtifactKind::MsStats => {
                let stats: MsStatistics = serde_json::from_slice(bytes).map_err(json)?;
                let stats = MsStatistics::new(stats.mean, stats.var)
                    .map_err(|e| malformed(e.to_string()))?;
                Self::MsStats(stats)
            }
        })
    }
}

macro_rules! typed_getter {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&self, key: &ArtifactKey) -> Result<$ty> {
            match self.get(key)? {
                Artifact::$variant(value) => Ok(value),
                _ => Err(VcError::MalformedArtifact {
                    key: key.clone(),
                    reason: concat!("expected ", stringify!($variant)).to_owned(),
                }),
            }
        }
    };
}

/// Typed access to an [`ArtifactStore`].
#[derive(Debug, Clone)]
pub struct Repository {
    store: Arc<dyn ArtifactStore>,
    policy: OverwritePolicy,
}

impl Repository {
    pub fn new(store: impl ArtifactStore + 'static) -> Self {
        Self::from_arc(Arc::new(store))
    }

    pub fn from_arc(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            store,
            policy: OverwritePolicy::default(),
        }
    }

    /// Fresh in-memory repository.
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    pub fn with_policy(mut self, policy: OverwritePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> OverwritePolicy {
        self.policy
    }
    pub fn store(&self) -> &dyn ArtifactStore {
        self.store.as_ref()
    }

    pub fn contains(&self, key: &ArtifactKey) -> Result<bool> {
        self.store.contains(key)
    }

    /// Write `artifact` at `key` following the overwrite policy. Returns
    /// whether anything was written.
    pub fn put(&self, key: &ArtifactKey, artifact: &Artifact) -> Result<bool> {
        if !artifact.fits(key.kind) {
            return Err(VcError::invalid(
                "artifact",
                format!("payload does not fit key {key}"),
            ));
        }
        if self.policy != OverwritePolicy::Overwrite && self.store.contains(key)? {
            return match self.policy {
                OverwritePolicy::Fail => Err(VcError::ArtifactExists(key.clone())),
                _ => {
                    tracing::debug!(%key, "Artifact kept");
                    Ok(false)
                }
            };
        }
        self.store.put_bytes(key, &artifact.encode()?)?;
        tracing::debug!(%key, "Artifact written");
        Ok(true)
    }

    /// Read the artifact at `key`. A missing key is reported as
    /// [`VcError::MissingArtifact`], an undecodable one as
    /// [`VcError::MalformedArtifact`].
    pub fn get(&self, key: &ArtifactKey) -> Result<Artifact> {
        let bytes = self
            .store
            .get_bytes(key)?
            .ok_or_else(|| VcError::MissingArtifact(key.clone()))?;
        Artifact::decode(key, &bytes)
    }

    typed_getter!(feature, Feature, FeatureRecord);
    typed_getter!(twf, Twf, TimeWarpFunction);
    typed_getter!(joint, Joint, Array2<f64>);
    typed_getter!(gmm, Gmm, JointGmm);
    typed_getter!(f0_stats, F0Stats, F0Statistics);
    typed_getter!(gv_stats, GvStats, GvStatistics);
    typed_getter!(ms_stats, MsStats, MsStatistics);
}
