use std::{fmt::Display, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::VcError;

/// What an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Per-utterance acoustic features.
    Feature,
    /// Per-utterance time warping function.
    Twf,
    /// Joint feature matrix of a speaker pair.
    Joint,
    /// Trained joint GMM.
    Gmm,
    F0Stats,
    GvStats,
    MsStats,
    /// GV of converted training data.
    ConvertedGv,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 8] = [
        Self::Feature,
        Self::Twf,
        Self::Joint,
        Self::Gmm,
        Self::F0Stats,
        Self::GvStats,
        Self::MsStats,
        Self::ConvertedGv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Twf => "twf",
            Self::Joint => "jnt",
            Self::Gmm => "gmm",
            Self::F0Stats => "f0stats",
            Self::GvStats => "gvstats",
            Self::MsStats => "msstats",
            Self::ConvertedGv => "cvgv",
        }
    }

    /// File extension used on disk.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Feature | Self::Joint => "bin",
            Self::Twf => "txt",
            Self::Gmm | Self::F0Stats | Self::GvStats | Self::MsStats | Self::ConvertedGv => {
                "json"
            }
        }
    }
}

impl Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = VcError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| VcError::unsupported("artifact kind", s))
    }
}

/// Address of an artifact: what it is, whose it is (a speaker or a speaker
/// pair), the training iteration that produced it and, for per-utterance
/// artifacts, the utterance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub kind: ArtifactKind,
    pub owner: String,
    pub iteration: Option<usize>,
    pub item: Option<String>,
}

impl ArtifactKey {
    pub fn new(kind: ArtifactKind, owner: impl Into<String>) -> Self {
        Self {
            kind,
            owner: owner.into(),
            iteration: None,
            item: None,
        }
    }

    pub fn at_iteration(mut self, iteration: usize) -> Self {
        self.iteration = Some(iteration);
        self
    }

    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }

    pub fn feature(speaker: &str, utterance: &str) -> Self {
        Self::new(ArtifactKind::Feature, speaker).with_item(utterance)
    }
    pub fn twf(pair: &str, iteration: usize, utterance: &str) -> Self {
        Self::new(ArtifactKind::Twf, pair)
            .at_iteration(iteration)
            .with_item(utterance)
    }
    pub fn joint(pair: &str, iteration: usize) -> Self {
        Self::new(ArtifactKind::Joint, pair).at_iteration(iteration)
    }
    pub fn gmm(pair: &str, iteration: usize) -> Self {
        Self::new(ArtifactKind::Gmm, pair).at_iteration(iteration)
    }
    /// The model used for conversion, stored without an iteration.
    pub fn final_gmm(pair: &str) -> Self {
        Self::new(ArtifactKind::Gmm, pair)
    }
    pub fn f0_stats(speaker: &str) -> Self {
        Self::new(ArtifactKind::F0Stats, speaker)
    }
    pub fn gv_stats(speaker: &str) -> Self {
        Self::new(ArtifactKind::GvStats, speaker)
    }
    pub fn ms_stats(speaker: &str) -> Self {
        Self::new(ArtifactKind::MsStats, speaker)
    }
    pub fn converted_gv(pair: &str) -> Self {
        Self::new(ArtifactKind::ConvertedGv, pair)
    }
    /// Modulation spectrum of converted training data of `pair`.
    pub fn converted_ms(pair: &str) -> Self {
        Self::ms_stats(pair).with_item("converted")
    }
    /// GV of `source + converted difference` in differential mode.
    pub fn diff_converted_gv(pair: &str) -> Self {
        Self::converted_gv(pair).with_item("diff")
    }

    /// `owner/kind[/it{n}]/{item or kind}.{ext}`
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::from(&self.owner);
        path.push(self.kind.as_str());
        if let Some(iteration) = self.iteration {
            path.push(format!("it{iteration}"));
        }
        let stem = self.item.as_deref().unwrap_or(self.kind.as_str());
        path.push(format!("{stem}.{}", self.kind.extension()));
        path
    }
}

impl Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.owner, self.kind)?;
        if let Some(iteration) = self.iteration {
            write!(f, "@{iteration}")?;
        }
        if let Some(item) = &self.item {
            write!(f, "/{item}")?;
        }
        Ok(())
    }
}
