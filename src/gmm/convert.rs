//! Conversion with a trained joint GMM.
//!
//! The joint mixture over `[x, y]` is turned into one linear regression per
//! component, `E[y | x, m] = A_m x + b_m`, weighted by the posterior of the
//! source marginal `p(m | x)`.

use std::{fmt::Display, str::FromStr};

use ndarray::{Array2, Array3, ArrayView2, Axis, s};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, VcError},
    feature::Windows,
};

use super::{
    JointGmm,
    density::MixtureDensity,
    linalg::{inverse, inverse_from_cholesky, regularized_cholesky, solve},
    mlpg::MlpgMatrix,
};

/// How the joint parameters are reinterpreted before regression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GmmMode {
    /// Predict the target directly.
    #[default]
    #[serde(alias = "none")]
    Normal,
    /// Predict the target minus the source.
    #[serde(rename = "diff")]
    Differential,
    /// Map the source space onto itself.
    Intra,
}

impl Display for GmmMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::Differential => "diff",
            Self::Intra => "intra",
        })
    }
}

impl FromStr for GmmMode {
    type Err = VcError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "normal" | "none" | "None" => Ok(Self::Normal),
            "diff" => Ok(Self::Differential),
            "intra" => Ok(Self::Intra),
            _ => Err(VcError::unsupported("GMM mode", s)),
        }
    }
}

/// Conversion algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionType {
    /// Maximum likelihood parameter generation over the whole utterance.
    #[default]
    Mlpg,
    /// Frame-wise minimum mean square error regression.
    Mmse,
}

impl Display for ConversionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Mlpg => "mlpg",
            Self::Mmse => "mmse",
        })
    }
}

impl FromStr for ConversionType {
    type Err = VcError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mlpg" => Ok(Self::Mlpg),
            "mmse" => Ok(Self::Mmse),
            _ => Err(VcError::unsupported("conversion type", s)),
        }
    }
}

/// Source (`x`) and target (`y`) blocks of every component of a joint GMM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointBlocks {
    pub mean_x: Array2<f64>,
    pub mean_y: Array2<f64>,
    pub cov_xx: Array3<f64>,
    pub cov_xy: Array3<f64>,
    pub cov_yx: Array3<f64>,
    pub cov_yy: Array3<f64>,
}

impl JointBlocks {
    /// Split the joint parameters in half.
    pub fn partition(gmm: &JointGmm) -> Result<Self> {
        let dim = gmm.dim();
        if dim == 0 || dim % 2 != 0 {
            return Err(VcError::invalid(
                "gmm",
                format!("joint dimension {dim} cannot be split into source and target"),
            ));
        }
        let sd = dim / 2;
        Ok(Self {
            mean_x: gmm.means.slice(s![.., ..sd]).to_owned(),
            mean_y: gmm.means.slice(s![.., sd..]).to_owned(),
            cov_xx: gmm.covariances.slice(s![.., ..sd, ..sd]).to_owned(),
            cov_xy: gmm.covariances.slice(s![.., ..sd, sd..]).to_owned(),
            cov_yx: gmm.covariances.slice(s![.., sd.., ..sd]).to_owned(),
            cov_yy: gmm.covariances.slice(s![.., sd.., sd..]).to_owned(),
        })
    }

    pub fn n_mix(&self) -> usize {
        self.mean_x.nrows()
    }
    /// Dimension of one side.
    pub fn sddim(&self) -> usize {
        self.mean_x.ncols()
    }

    pub fn transform(self, mode: GmmMode) -> Result<Self> {
        match mode {
            GmmMode::Normal => Ok(self),
            GmmMode::Differential => Ok(self.differential()),
            GmmMode::Intra => self.intra(),
        }
    }

    fn differential(self) -> Self {
        let mean_y = &self.mean_y - &self.mean_x;
        let cov_yy = &self.cov_xx + &self.cov_yy - &self.cov_xy - &self.cov_yx;
        let cov_xy = &self.cov_xy - &self.cov_xx;
        let cov_yx = cov_xy.clone().permuted_axes([0, 2, 1]).as_standard_layout().into_owned();
        Self {
            mean_y,
            cov_yy,
            cov_xy,
            cov_yx,
            ..self
        }
    }

    fn intra(self) -> Result<Self> {
        let mut cov_xy = Array3::zeros(self.cov_xy.raw_dim());
        for m in 0..self.n_mix() {
            let projected = solve(
                self.cov_yy.index_axis(Axis(0), m),
                self.cov_yx.index_axis(Axis(0), m),
                "intra transform",
            )?;
            cov_xy
                .index_axis_mut(Axis(0), m)
                .assign(&self.cov_xy.index_axis(Axis(0), m).dot(&projected));
        }
        Ok(Self {
            mean_y: self.mean_x.clone(),
            cov_yx: cov_xy.clone(),
            cov_xy,
            cov_yy: self.cov_xx.clone(),
            ..self
        })
    }
}

/// Per-component regression derived once from a trained [`JointGmm`].
#[derive(Debug, Clone)]
pub struct ConversionModel {
    mode: GmmMode,
    /// `A_m = S_yx S_xx^-1`
    a: Array3<f64>,
    /// `b_m = mu_y - A_m mu_x`
    b: Array2<f64>,
    /// `(S_yy - A_m S_xy)^-1`
    cond_cov_inv: Array3<f64>,
    /// Source marginal used for the posteriors.
    px: MixtureDensity,
    windows: Windows,
}

impl ConversionModel {
    pub fn new(gmm: &JointGmm, mode: GmmMode) -> Result<Self> {
        gmm.validate()?;
        let blocks = JointBlocks::partition(gmm)?.transform(mode)?;
        let (n_mix, sd) = (blocks.n_mix(), blocks.sddim());

        let mut a = Array3::zeros((n_mix, sd, sd));
        let mut b = Array2::zeros((n_mix, sd));
        let mut cond_cov_inv = Array3::zeros((n_mix, sd, sd));
        for m in 0..n_mix {
            let (l, _) = regularized_cholesky(
                blocks.cov_xx.index_axis(Axis(0), m),
                crate::constants::COVARIANCE_FLOOR,
                "source covariance",
            )?;
            let xx_inv = inverse_from_cholesky(l.view());
            let a_m = blocks.cov_yx.index_axis(Axis(0), m).dot(&xx_inv);
            let b_m = &blocks.mean_y.row(m) - &a_m.dot(&blocks.mean_x.row(m));
            let cond = &blocks.cov_yy.index_axis(Axis(0), m)
                - &a_m.dot(&blocks.cov_xy.index_axis(Axis(0), m));
            let cond_inv = inverse(cond.view(), "conditional covariance")?;
            let cond_inv = (&cond_inv + &cond_inv.t()) * 0.5;

            a.index_axis_mut(Axis(0), m).assign(&a_m);
            b.row_mut(m).assign(&b_m);
            cond_cov_inv.index_axis_mut(Axis(0), m).assign(&cond_inv);
        }
        let px = MixtureDensity::new(gmm.weights.view(), blocks.mean_x.view(), blocks.cov_xx.view())?;

        tracing::debug!(n_mix, sddim = sd, %mode, "Deployed conversion model");
        Ok(Self {
            mode,
            a,
            b,
            cond_cov_inv,
            px,
            windows: Windows::static_delta(),
        })
    }

    pub fn mode(&self) -> GmmMode {
        self.mode
    }
    pub fn n_mix(&self) -> usize {
        self.b.nrows()
    }
    /// Dimension of the (static + delta) source frames.
    pub fn sddim(&self) -> usize {
        self.b.ncols()
    }
    pub fn a(&self) -> &Array3<f64> {
        &self.a
    }
    pub fn b(&self) -> &Array2<f64> {
        &self.b
    }
    pub fn cond_cov_inv(&self) -> &Array3<f64> {
        &self.cond_cov_inv
    }

    /// Convert static+delta source frames into static target frames.
    pub fn convert(&self, data: ArrayView2<f64>, cvtype: ConversionType) -> Result<Array2<f64>> {
        match cvtype {
            ConversionType::Mlpg => self.mlpg(data),
            ConversionType::Mmse => self.mmse(data),
        }
    }

    /// Posterior-weighted regression, static half only.
    pub fn mmse(&self, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        let estimate = self.regression(data)?;
        Ok(estimate.slice(s![.., ..self.sddim() / 2]).to_owned())
    }

    /// Minimum mean square error estimate of whole target frames
    /// `sum_m P(m|x) (A_m x + b_m)`.
    pub fn regression(&self, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.check_input(data)?;
        let resp = self.px.responsibilities(data)?;
        let mut out = Array2::zeros((data.nrows(), self.sddim()));
        for m in 0..self.n_mix() {
            let mut regressed = data.dot(&self.a.index_axis(Axis(0), m).t());
            regressed += &self.b.row(m);
            regressed *= &resp.column(m).insert_axis(Axis(1));
            out += &regressed;
        }
        Ok(out)
    }

    /// Static trajectory maximizing the likelihood of the conditional
    /// static+delta distributions of the most likely component per frame.
    pub fn mlpg(&self, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.check_input(data)?;
        if self.sddim() % self.windows.size() != 0 {
            return Err(VcError::invalid(
                "sddim",
                format!("{} is not a static+delta dimension", self.sddim()),
            ));
        }
        let resp = self.px.responsibilities(data)?;
        let components: Vec<usize> = resp
            .rows()
            .into_iter()
            .map(|row| {
                (0..row.len())
                    .max_by(|&i, &j| row[i].total_cmp(&row[j]))
                    .unwrap_or(0)
            })
            .collect();

        let mut means = Array2::zeros(data.raw_dim());
        for ((mut mean, x), &m) in means
            .axis_iter_mut(Axis(0))
            .zip(data.axis_iter(Axis(0)))
            .zip(components.iter())
        {
            mean.assign(&(self.a.index_axis(Axis(0), m).dot(&x) + self.b.row(m)));
        }

        let precisions = components
            .iter()
            .map(|&m| self.cond_cov_inv.index_axis(Axis(0), m));
        let mut mtx = MlpgMatrix::calc_wuw_and_wum(&self.windows, means.view(), precisions);
        Ok(mtx.solve())
    }

    fn check_input(&self, data: ArrayView2<f64>) -> Result<()> {
        if data.nrows() == 0 {
            return Err(VcError::EmptySequence {
                context: "conversion",
            });
        }
        VcError::check_dim("conversion input", self.sddim(), data.ncols())
    }
}
