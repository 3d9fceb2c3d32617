//! Statistical voice conversion with joint-density Gaussian mixture models.

pub mod align;
pub mod config;
pub mod constants;
pub mod error;
pub mod feature;
pub mod gmm;
pub mod jnt;
pub mod list;
pub mod stats;
pub mod store;
pub mod vocoder;

pub use crate::error::{Result, VcError};
