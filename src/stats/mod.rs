//! Speaker statistics and the postfilters built on them.

pub mod f0;
pub mod gv;
pub mod ms;

pub use self::{
    f0::{F0Converter, F0Statistics},
    gv::GvStatistics,
    ms::MsStatistics,
};
