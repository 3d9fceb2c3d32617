use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VcError};

pub const F0: &str = "f0";
pub const MCEP: &str = "mcep";
pub const NPOW: &str = "npow";
pub const AP: &str = "ap";
pub const CODEAP: &str = "codeap";

/// Named feature streams of one utterance, each `[T, dim]`.
///
/// Scalar streams (`f0`, `npow`) are stored as a single column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    streams: BTreeMap<String, Array2<f64>>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, stream: Array2<f64>) -> &mut Self {
        self.streams.insert(name.into(), stream);
        self
    }

    /// Insert a scalar stream as a one-column matrix.
    pub fn insert_scalar(&mut self, name: impl Into<String>, values: &[f64]) -> &mut Self {
        let column = Array2::from_shape_fn((values.len(), 1), |(t, _)| values[t]);
        self.insert(name, column)
    }

    pub fn get(&self, name: &str) -> Option<ArrayView2<f64>> {
        self.streams.get(name).map(|s| s.view())
    }

    /// The stream `name`, or an error naming it.
    pub fn stream(&self, name: &str) -> Result<ArrayView2<f64>> {
        self.get(name)
            .ok_or_else(|| VcError::invalid("stream", format!("feature record has no `{name}`")))
    }

    /// First column of the stream `name`.
    pub fn scalar(&self, name: &str) -> Result<Vec<f64>> {
        let stream = self.stream(name)?;
        if stream.ncols() == 0 {
            return Err(VcError::invalid("stream", format!("`{name}` has no column")));
        }
        Ok(stream.column(0).to_vec())
    }

    pub fn names(&self) -> impl '_ + Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }
    pub fn iter(&self) -> impl '_ + Iterator<Item = (&str, ArrayView2<f64>)> {
        self.streams.iter().map(|(k, v)| (k.as_str(), v.view()))
    }
    pub fn len(&self) -> usize {
        self.streams.len()
    }
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Number of frames, provided every stream agrees on it.
    pub fn frames(&self) -> Result<usize> {
        let mut frames = None;
        for stream in self.streams.values() {
            match frames {
                None => frames = Some(stream.nrows()),
                Some(n) => VcError::check_dim("feature record frames", n, stream.nrows())?,
            }
        }
        Ok(frames.unwrap_or(0))
    }
}
