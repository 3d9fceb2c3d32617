//! Frame-level feature utilities: delta features, silence removal and
//! frame distances.
//!
//! Feature sequences are `[T, dim]` matrices with one frame per row.

use ndarray::Array2;

pub mod delta;
pub mod distance;
pub mod extfrm;
pub mod mask;
pub mod power;
pub mod window;

pub use self::{
    delta::{delta, static_delta},
    distance::{Distance, melcd, normalized_melcd},
    extfrm::{extfrm, extsddata},
    mask::Mask,
    power::normalized_power,
    window::{Window, Windows},
};

/// Sequence of frames, one frame per row.
pub type FeatureSequence = Array2<f64>;
