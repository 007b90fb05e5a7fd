use std::f64::consts::PI;
use std::ops::{Add, Mul};

use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::{GpError, GpResult};
use crate::lightcurve::LightCurve;

/// Quality factors closer than this to 1/2 are nudged upward, since the
/// critically damped SHO has no exponential-times-trig representation.
const SHO_CRITICAL_OFFSET: f64 = 1e-5;

// ---------------------------------------------------------------------------
// Priors and parameters
// ---------------------------------------------------------------------------

/// Prior on a single (log-space) hyperparameter, always truncated to the
/// parameter bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prior {
    #[default]
    Uniform,
    Normal { mean: f64, sigma: f64 },
}

impl Prior {
    /// Unnormalized log density; `-inf` outside `[lower, upper]`.
    pub fn log_density(&self, x: f64, lower: f64, upper: f64) -> f64 {
        if !(x >= lower && x <= upper) {
            return f64::NEG_INFINITY;
        }
        match *self {
            Prior::Uniform => -(upper - lower).ln(),
            Prior::Normal { mean, sigma } => {
                let z = (x - mean) / sigma;
                -0.5 * z * z - sigma.ln() - 0.5 * (2.0 * PI).ln()
            }
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, lower: f64, upper: f64, rng: &mut R) -> f64 {
        match *self {
            Prior::Uniform => rng.random_range(lower..upper),
            Prior::Normal { mean, sigma } => {
                for _ in 0..1000 {
                    let z: f64 = rng.sample(StandardNormal);
                    let x = mean + sigma * z;
                    if x >= lower && x <= upper {
                        return x;
                    }
                }
                mean.clamp(lower, upper)
            }
        }
    }
}

/// A named, bounded hyperparameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
    #[serde(default)]
    pub prior: Prior,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: f64, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            value,
            lower,
            upper,
            prior: Prior::Uniform,
        }
    }

    pub fn with_prior(mut self, prior: Prior) -> Self {
        self.prior = prior;
        self
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.lower && x <= self.upper
    }

    fn validate(&self) -> GpResult<()> {
        if !self.lower.is_finite() || !self.upper.is_finite() || self.lower >= self.upper {
            return Err(GpError::config(format!(
                "parameter `{}` needs finite bounds with lower < upper, got [{}, {}]",
                self.name, self.lower, self.upper
            )));
        }
        if !self.contains(self.value) {
            return Err(GpError::config(format!(
                "initial value of `{}` ({}) lies outside [{}, {}]",
                self.name, self.value, self.lower, self.upper
            )));
        }
        if let Prior::Normal { mean, sigma } = self.prior {
            if !mean.is_finite() || !(sigma > 0.0) {
                return Err(GpError::config(format!(
                    "normal prior on `{}` needs finite mean and positive sigma",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Term kinds
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermKind {
    /// Damped random walk: `a·exp(-cτ)`.
    Real,
    /// Quasi-periodic oscillator: `a·exp(-cτ)·cos(ω0τ)`, `c = ω0 / 2Q`.
    Lorentzian,
    /// Stochastically driven damped harmonic oscillator.
    Sho,
    /// `A·exp(-τ²/2ℓ² - Γ·sin²(πτ/P))`; no semiseparable form.
    QuasiPeriodic,
    /// Extra white noise added to the diagonal.
    Jitter,
}

impl TermKind {
    pub fn parameter_names(self) -> &'static [&'static str] {
        match self {
            TermKind::Real => &["log_a", "log_c"],
            TermKind::Lorentzian => &["log_a", "log_q", "log_omega0"],
            TermKind::Sho => &["log_s0", "log_q", "log_omega0"],
            TermKind::QuasiPeriodic => &["log_amp", "log_gamma", "log_period", "log_length"],
            TermKind::Jitter => &["log_sigma"],
        }
    }

    pub fn n_params(self) -> usize {
        self.parameter_names().len()
    }

    pub fn has_celerite_form(self) -> bool {
        !matches!(self, TermKind::QuasiPeriodic)
    }

    /// True for terms that carry a periodic component.
    pub fn is_periodic(self) -> bool {
        matches!(
            self,
            TermKind::Lorentzian | TermKind::Sho | TermKind::QuasiPeriodic
        )
    }
}

impl std::fmt::Display for TermKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TermKind::Real => write!(f, "Real"),
            TermKind::Lorentzian => write!(f, "Lorentzian"),
            TermKind::Sho => write!(f, "Sho"),
            TermKind::QuasiPeriodic => write!(f, "QuasiPeriodic"),
            TermKind::Jitter => write!(f, "Jitter"),
        }
    }
}

/// One kernel component: a kind plus its parameter definitions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub label: String,
    pub kind: TermKind,
    pub parameters: Vec<Parameter>,
}

impl Term {
    /// Build a term from `(value, lower, upper)` triples given in the
    /// order of [`TermKind::parameter_names`]. Priors default to uniform.
    pub fn new(kind: TermKind, label: impl Into<String>, specs: &[(f64, f64, f64)]) -> GpResult<Self> {
        let label = label.into();
        let names = kind.parameter_names();
        if specs.len() != names.len() {
            return Err(GpError::config(format!(
                "{kind} term `{label}` takes {} parameters, got {}",
                names.len(),
                specs.len()
            )));
        }
        let parameters = names
            .iter()
            .zip(specs)
            .map(|(name, &(value, lower, upper))| Parameter::new(*name, value, lower, upper))
            .collect();
        let term = Self {
            label,
            kind,
            parameters,
        };
        term.validate()?;
        Ok(term)
    }

    pub fn real(label: impl Into<String>, log_a: (f64, f64, f64), log_c: (f64, f64, f64)) -> GpResult<Self> {
        Self::new(TermKind::Real, label, &[log_a, log_c])
    }

    pub fn lorentzian(
        label: impl Into<String>,
        log_a: (f64, f64, f64),
        log_q: (f64, f64, f64),
        log_omega0: (f64, f64, f64),
    ) -> GpResult<Self> {
        Self::new(TermKind::Lorentzian, label, &[log_a, log_q, log_omega0])
    }

    pub fn jitter(label: impl Into<String>, log_sigma: (f64, f64, f64)) -> GpResult<Self> {
        Self::new(TermKind::Jitter, label, &[log_sigma])
    }

    /// Replace the prior on the named parameter.
    pub fn with_prior(mut self, name: &str, prior: Prior) -> GpResult<Self> {
        let label = self.label.clone();
        let param = self
            .parameters
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| GpError::config(format!("term `{label}` has no parameter `{name}`")))?;
        param.prior = prior;
        param.validate()?;
        Ok(self)
    }

    fn validate(&self) -> GpResult<()> {
        if self.parameters.len() != self.kind.n_params() {
            return Err(GpError::config(format!(
                "term `{}` has {} parameters, expected {}",
                self.label,
                self.parameters.len(),
                self.kind.n_params()
            )));
        }
        for p in &self.parameters {
            p.validate()?;
        }
        Ok(())
    }

    fn bind(&self, values: &[f64]) -> BoundTerm {
        let v: Vec<f64> = values.iter().map(|x| x.exp()).collect();
        match self.kind {
            TermKind::Real => BoundTerm::Real { a: v[0], c: v[1] },
            TermKind::Lorentzian => BoundTerm::Lorentzian {
                a: v[0],
                q: v[1],
                omega0: v[2],
            },
            TermKind::Sho => BoundTerm::Sho {
                s0: v[0],
                q: v[1],
                omega0: v[2],
            },
            TermKind::QuasiPeriodic => BoundTerm::QuasiPeriodic {
                amp: v[0],
                gamma: v[1],
                period: v[2],
                length: v[3],
            },
            TermKind::Jitter => BoundTerm::Jitter { variance: v[0] * v[0] },
        }
    }
}

// ---------------------------------------------------------------------------
// Kernel composition
// ---------------------------------------------------------------------------

/// Sum/product tree of terms. Parameters are ordered depth-first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Kernel {
    Term(Term),
    Sum(Vec<Kernel>),
    Product(Vec<Kernel>),
}

impl From<Term> for Kernel {
    fn from(term: Term) -> Self {
        Kernel::Term(term)
    }
}

impl Add for Kernel {
    type Output = Kernel;

    fn add(self, rhs: Kernel) -> Kernel {
        let mut children = match self {
            Kernel::Sum(children) => children,
            other => vec![other],
        };
        match rhs {
            Kernel::Sum(more) => children.extend(more),
            other => children.push(other),
        }
        Kernel::Sum(children)
    }
}

impl Mul for Kernel {
    type Output = Kernel;

    fn mul(self, rhs: Kernel) -> Kernel {
        let mut children = match self {
            Kernel::Product(children) => children,
            other => vec![other],
        };
        match rhs {
            Kernel::Product(more) => children.extend(more),
            other => children.push(other),
        }
        Kernel::Product(children)
    }
}

impl Kernel {
    pub fn terms(&self) -> Vec<&Term> {
        let mut out = Vec::new();
        self.collect_terms(&mut out);
        out
    }

    fn collect_terms<'a>(&'a self, out: &mut Vec<&'a Term>) {
        match self {
            Kernel::Term(t) => out.push(t),
            Kernel::Sum(children) | Kernel::Product(children) => {
                for child in children {
                    child.collect_terms(out);
                }
            }
        }
    }

    pub fn n_params(&self) -> usize {
        self.terms().iter().map(|t| t.kind.n_params()).sum()
    }

    pub fn has_celerite_form(&self) -> bool {
        self.terms().iter().all(|t| t.kind.has_celerite_form())
    }

    pub fn has_periodic_term(&self) -> bool {
        self.terms().iter().any(|t| t.kind.is_periodic())
    }

    fn validate(&self, inside_product: bool) -> GpResult<()> {
        match self {
            Kernel::Term(t) => {
                if inside_product && t.kind == TermKind::Jitter {
                    return Err(GpError::config(format!(
                        "jitter term `{}` cannot appear inside a product",
                        t.label
                    )));
                }
                t.validate()
            }
            Kernel::Sum(children) => {
                if children.is_empty() {
                    return Err(GpError::config("empty kernel sum"));
                }
                children.iter().try_for_each(|c| c.validate(inside_product))
            }
            Kernel::Product(children) => {
                if children.is_empty() {
                    return Err(GpError::config("empty kernel product"));
                }
                children.iter().try_for_each(|c| c.validate(true))
            }
        }
    }

    fn bind(&self, values: &[f64], offset: &mut usize) -> BoundKernel {
        match self {
            Kernel::Term(t) => {
                let n = t.kind.n_params();
                let bound = t.bind(&values[*offset..*offset + n]);
                *offset += n;
                BoundKernel::Term(bound)
            }
            Kernel::Sum(children) => {
                BoundKernel::Sum(children.iter().map(|c| c.bind(values, offset)).collect())
            }
            Kernel::Product(children) => {
                BoundKernel::Product(children.iter().map(|c| c.bind(values, offset)).collect())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Bound (evaluated) kernels
// ---------------------------------------------------------------------------

/// A term with concrete, linear-space hyperparameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoundTerm {
    Real { a: f64, c: f64 },
    Lorentzian { a: f64, q: f64, omega0: f64 },
    Sho { s0: f64, q: f64, omega0: f64 },
    QuasiPeriodic { amp: f64, gamma: f64, period: f64, length: f64 },
    Jitter { variance: f64 },
}

impl BoundTerm {
    pub fn covariance(&self, tau: f64) -> f64 {
        let tau = tau.abs();
        match *self {
            BoundTerm::QuasiPeriodic {
                amp,
                gamma,
                period,
                length,
            } => {
                let s = (PI * tau / period).sin();
                amp * (-0.5 * tau * tau / (length * length) - gamma * s * s).exp()
            }
            BoundTerm::Jitter { variance } => {
                if tau == 0.0 {
                    variance
                } else {
                    0.0
                }
            }
            _ => self
                .celerite()
                .map(|coeffs| coeffs.covariance(tau))
                .unwrap_or(0.0),
        }
    }

    fn celerite(&self) -> Option<CeleriteCoefficients> {
        let mut out = CeleriteCoefficients::default();
        match *self {
            BoundTerm::Real { a, c } => out.real.push((a, c)),
            BoundTerm::Lorentzian { a, q, omega0 } => {
                out.push_complex(a, 0.0, omega0 / (2.0 * q), omega0);
            }
            BoundTerm::Sho { s0, q, omega0 } => {
                let q = if (q - 0.5).abs() < SHO_CRITICAL_OFFSET {
                    0.5 + SHO_CRITICAL_OFFSET
                } else {
                    q
                };
                if q >= 0.5 {
                    let f = (4.0 * q * q - 1.0).sqrt();
                    let a = s0 * omega0 * q;
                    out.push_complex(a, a / f, 0.5 * omega0 / q, 0.5 * omega0 * f / q);
                } else {
                    let f = (1.0 - 4.0 * q * q).sqrt();
                    let a = 0.5 * s0 * omega0 * q;
                    let c = 0.5 * omega0 / q;
                    out.real.push((a * (1.0 + 1.0 / f), c * (1.0 - f)));
                    out.real.push((a * (1.0 - 1.0 / f), c * (1.0 + f)));
                }
            }
            BoundTerm::Jitter { variance } => out.diagonal = variance,
            BoundTerm::QuasiPeriodic { .. } => return None,
        }
        Some(out)
    }

    /// Oscillation period for periodic terms.
    pub fn period(&self) -> Option<f64> {
        match *self {
            BoundTerm::Lorentzian { omega0, .. } => Some(2.0 * PI / omega0),
            BoundTerm::Sho { q, omega0, .. } if q > 0.5 => {
                let d = 0.5 * omega0 * (4.0 * q * q - 1.0).sqrt() / q;
                Some(2.0 * PI / d)
            }
            BoundTerm::QuasiPeriodic { period, .. } => Some(period),
            _ => None,
        }
    }
}

/// A kernel tree with parameters bound to concrete values.
#[derive(Clone, Debug, PartialEq)]
pub enum BoundKernel {
    Term(BoundTerm),
    Sum(Vec<BoundKernel>),
    Product(Vec<BoundKernel>),
}

impl BoundKernel {
    /// Covariance at lag `tau`; jitter contributes only at `tau == 0`.
    pub fn covariance(&self, tau: f64) -> f64 {
        match self {
            BoundKernel::Term(t) => t.covariance(tau),
            BoundKernel::Sum(children) => children.iter().map(|c| c.covariance(tau)).sum(),
            BoundKernel::Product(children) => children.iter().map(|c| c.covariance(tau)).product(),
        }
    }

    /// Semiseparable representation, if every term has one.
    pub fn celerite(&self) -> Option<CeleriteCoefficients> {
        match self {
            BoundKernel::Term(t) => t.celerite(),
            BoundKernel::Sum(children) => {
                let mut acc = CeleriteCoefficients::default();
                for child in children {
                    acc.extend(child.celerite()?);
                }
                Some(acc)
            }
            BoundKernel::Product(children) => {
                let mut iter = children.iter();
                let mut acc = iter.next()?.celerite()?;
                for child in iter {
                    acc = acc.product(&child.celerite()?);
                }
                Some(acc)
            }
        }
    }

    /// Power spectral density at angular frequency `omega` (celerite
    /// normalization, white-noise terms excluded).
    pub fn psd(&self, omega: f64) -> Option<f64> {
        self.celerite().map(|c| c.psd(omega))
    }

    /// Dense `N×N` covariance on the given time grid.
    pub fn matrix(&self, times: &[f64]) -> DMatrix<f64> {
        let n = times.len();
        let mut k = DMatrix::<f64>::zeros(n, n);
        let k0 = self.covariance(0.0);
        for i in 0..n {
            k[(i, i)] = k0;
            for j in 0..i {
                let v = self.covariance(times[i] - times[j]);
                k[(i, j)] = v;
                k[(j, i)] = v;
            }
        }
        k
    }

    /// Periods of every periodic term in depth-first order.
    pub fn periods(&self) -> Vec<f64> {
        match self {
            BoundKernel::Term(t) => t.period().into_iter().collect(),
            BoundKernel::Sum(children) | BoundKernel::Product(children) => {
                children.iter().flat_map(|c| c.periods()).collect()
            }
        }
    }
}

/// Celerite coefficients: `Σ a·e^{-cτ}` plus
/// `Σ e^{-cτ}(a·cos dτ + b·sin dτ)` plus a white diagonal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CeleriteCoefficients {
    pub real: Vec<(f64, f64)>,
    pub complex: Vec<(f64, f64, f64, f64)>,
    pub diagonal: f64,
}

impl CeleriteCoefficients {
    fn push_complex(&mut self, a: f64, b: f64, c: f64, d: f64) {
        if d == 0.0 {
            self.real.push((a, c));
        } else if d < 0.0 {
            self.complex.push((a, -b, c, -d));
        } else {
            self.complex.push((a, b, c, d));
        }
    }

    fn extend(&mut self, other: CeleriteCoefficients) {
        self.real.extend(other.real);
        self.complex.extend(other.complex);
        self.diagonal += other.diagonal;
    }

    /// Expand the product of two coefficient sets. Diagonals are not
    /// carried; jitter inside products is rejected at model construction.
    fn product(&self, other: &CeleriteCoefficients) -> CeleriteCoefficients {
        let mut out = CeleriteCoefficients::default();
        for &(a1, c1) in &self.real {
            for &(a2, c2) in &other.real {
                out.real.push((a1 * a2, c1 + c2));
            }
            for &(a2, b2, c2, d2) in &other.complex {
                out.push_complex(a1 * a2, a1 * b2, c1 + c2, d2);
            }
        }
        for &(a1, b1, c1, d1) in &self.complex {
            for &(a2, c2) in &other.real {
                out.push_complex(a1 * a2, b1 * a2, c1 + c2, d1);
            }
            for &(a2, b2, c2, d2) in &other.complex {
                let c = c1 + c2;
                out.push_complex(
                    0.5 * (a1 * a2 - b1 * b2),
                    0.5 * (a1 * b2 + b1 * a2),
                    c,
                    d1 + d2,
                );
                out.push_complex(
                    0.5 * (a1 * a2 + b1 * b2),
                    0.5 * (b1 * a2 - a1 * b2),
                    c,
                    d1 - d2,
                );
            }
        }
        out
    }

    /// Number of semiseparable columns `J`.
    pub fn width(&self) -> usize {
        self.real.len() + 2 * self.complex.len()
    }

    /// Kernel value at zero lag, excluding the white diagonal.
    pub fn variance(&self) -> f64 {
        self.real.iter().map(|r| r.0).sum::<f64>() + self.complex.iter().map(|c| c.0).sum::<f64>()
    }

    pub fn covariance(&self, tau: f64) -> f64 {
        let tau = tau.abs();
        let mut k = 0.0;
        for &(a, c) in &self.real {
            k += a * (-c * tau).exp();
        }
        for &(a, b, c, d) in &self.complex {
            k += (-c * tau).exp() * (a * (d * tau).cos() + b * (d * tau).sin());
        }
        if tau == 0.0 {
            k += self.diagonal;
        }
        k
    }

    pub fn psd(&self, omega: f64) -> f64 {
        let w2 = omega * omega;
        let norm = (2.0 / PI).sqrt();
        let mut p = 0.0;
        for &(a, c) in &self.real {
            p += norm * a * c / (c * c + w2);
        }
        for &(a, b, c, d) in &self.complex {
            let c2 = c * c;
            let d2 = d * d;
            let num = (a * c + b * d) * (c2 + d2) + (a * c - b * d) * w2;
            let den = w2 * w2 + 2.0 * (c2 - d2) * w2 + (c2 + d2) * (c2 + d2);
            p += norm * num / den;
        }
        p
    }
}

// ---------------------------------------------------------------------------
// Mean models
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeanModel {
    /// Fixed at the light curve's sample mean; not fitted.
    #[default]
    DataMean,
    Fixed(f64),
    Constant(Parameter),
    /// `slope·(t - t_first) + intercept`.
    Linear { slope: Parameter, intercept: Parameter },
}

impl MeanModel {
    /// Fitted constant bounded by the data range.
    pub fn constant_for(lc: &LightCurve) -> Self {
        let (lo, hi) = padded_range(lc);
        MeanModel::Constant(Parameter::new("mean", lc.mean(), lo, hi))
    }

    /// Fitted line with bounds wide enough to cover any line through the data.
    pub fn linear_for(lc: &LightCurve) -> Self {
        let (lo, hi) = padded_range(lc);
        let max_slope = 10.0 * (hi - lo) / lc.duration();
        let t0 = lc.t_min();
        let n = lc.len() as f64;
        let t_mean = lc.times().iter().map(|t| t - t0).sum::<f64>() / n;
        let y_mean = lc.mean();
        let mut sxy = 0.0;
        let mut sxx = 0.0;
        for (t, y) in lc.times().iter().zip(lc.values()) {
            let dt = t - t0 - t_mean;
            sxy += dt * (y - y_mean);
            sxx += dt * dt;
        }
        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        let slope = slope.clamp(-0.99 * max_slope, 0.99 * max_slope);
        let intercept = (y_mean - slope * t_mean).clamp(lo, hi);
        MeanModel::Linear {
            slope: Parameter::new("slope", slope, -max_slope, max_slope),
            intercept: Parameter::new("intercept", intercept, lo, hi),
        }
    }

    pub fn parameters(&self) -> Vec<&Parameter> {
        match self {
            MeanModel::DataMean | MeanModel::Fixed(_) => vec![],
            MeanModel::Constant(p) => vec![p],
            MeanModel::Linear { slope, intercept } => vec![slope, intercept],
        }
    }

    pub fn n_params(&self) -> usize {
        self.parameters().len()
    }

    fn bind(&self, values: &[f64]) -> BoundMean {
        match self {
            MeanModel::DataMean => BoundMean::DataMean,
            MeanModel::Fixed(v) => BoundMean::Constant(*v),
            MeanModel::Constant(_) => BoundMean::Constant(values[0]),
            MeanModel::Linear { .. } => BoundMean::Linear {
                slope: values[0],
                intercept: values[1],
            },
        }
    }
}

fn padded_range(lc: &LightCurve) -> (f64, f64) {
    let lo = lc.min_value();
    let hi = lc.max_value();
    let pad = (hi - lo).max(lc.mean_uncertainty());
    (lo - pad, hi + pad)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoundMean {
    DataMean,
    Constant(f64),
    Linear { slope: f64, intercept: f64 },
}

impl BoundMean {
    /// Mean function evaluated on the light curve's own time grid.
    pub fn evaluate(&self, lc: &LightCurve) -> Vec<f64> {
        match *self {
            BoundMean::DataMean => vec![lc.mean(); lc.len()],
            BoundMean::Constant(v) => vec![v; lc.len()],
            BoundMean::Linear { slope, intercept } => {
                let t0 = lc.t_min();
                lc.times().iter().map(|t| slope * (t - t0) + intercept).collect()
            }
        }
    }
}

/// Kernel and mean with every parameter bound.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundModel {
    pub kernel: BoundKernel,
    pub mean: BoundMean,
}

// ---------------------------------------------------------------------------
// Covariance model
// ---------------------------------------------------------------------------

/// Named kernel + mean model. Never mutated by evaluation: every parameter
/// vector is bound into a fresh [`BoundModel`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CovarianceModel {
    name: String,
    kernel: Kernel,
    #[serde(default)]
    mean: MeanModel,
}

impl CovarianceModel {
    pub fn new(name: impl Into<String>, kernel: impl Into<Kernel>) -> GpResult<Self> {
        let model = Self {
            name: name.into(),
            kernel: kernel.into(),
            mean: MeanModel::DataMean,
        };
        model.kernel.validate(false)?;
        Ok(model)
    }

    pub fn with_mean(mut self, mean: MeanModel) -> GpResult<Self> {
        for p in mean.parameters() {
            p.validate()?;
        }
        self.mean = mean;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn mean_model(&self) -> &MeanModel {
        &self.mean
    }

    pub fn n_params(&self) -> usize {
        self.kernel.n_params() + self.mean.n_params()
    }

    /// Parameters in vector order: kernel terms depth-first, then mean.
    pub fn parameters(&self) -> Vec<&Parameter> {
        let mut out: Vec<&Parameter> = self
            .kernel
            .terms()
            .into_iter()
            .flat_map(|t| t.parameters.iter())
            .collect();
        out.extend(self.mean.parameters());
        out
    }

    /// Fully qualified names, e.g. `red_noise:log_c` or `mean:slope`.
    pub fn parameter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .kernel
            .terms()
            .into_iter()
            .flat_map(|t| t.parameters.iter().map(move |p| format!("{}:{}", t.label, p.name)))
            .collect();
        names.extend(self.mean.parameters().iter().map(|p| format!("mean:{}", p.name)));
        names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.parameter_names().iter().position(|n| n == name)
    }

    pub fn initial_values(&self) -> Vec<f64> {
        self.parameters().iter().map(|p| p.value).collect()
    }

    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.parameters().iter().map(|p| (p.lower, p.upper)).collect()
    }

    pub fn has_celerite_form(&self) -> bool {
        self.kernel.has_celerite_form()
    }

    /// Length and bounds check. Shape mismatches are configuration errors,
    /// out-of-bounds values are domain errors.
    pub fn check(&self, theta: &[f64]) -> GpResult<()> {
        if theta.len() != self.n_params() {
            return Err(GpError::config(format!(
                "model `{}` expects {} parameters, got {}",
                self.name,
                self.n_params(),
                theta.len()
            )));
        }
        for (p, &x) in self.parameters().iter().zip(theta) {
            if !p.contains(x) {
                return Err(GpError::Domain {
                    name: p.name.clone(),
                    value: x,
                    lower: p.lower,
                    upper: p.upper,
                });
            }
        }
        Ok(())
    }

    pub fn log_prior(&self, theta: &[f64]) -> f64 {
        if theta.len() != self.n_params() {
            return f64::NEG_INFINITY;
        }
        self.parameters()
            .iter()
            .zip(theta)
            .map(|(p, &x)| p.prior.log_density(x, p.lower, p.upper))
            .sum()
    }

    pub fn draw_prior<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        self.parameters()
            .iter()
            .map(|p| p.prior.sample(p.lower, p.upper, rng))
            .collect()
    }

    /// Bind a parameter vector into concrete kernel and mean values.
    pub fn bind(&self, theta: &[f64]) -> GpResult<BoundModel> {
        self.check(theta)?;
        let mut offset = 0;
        let kernel = self.kernel.bind(theta, &mut offset);
        let mean = self.mean.bind(&theta[offset..]);
        Ok(BoundModel { kernel, mean })
    }

    /// Copy whose initial values are `theta`.
    pub fn with_values(&self, theta: &[f64]) -> GpResult<Self> {
        self.check(theta)?;
        let mut out = self.clone();
        let mut it = theta.iter();
        fn assign<'a>(kernel: &mut Kernel, it: &mut impl Iterator<Item = &'a f64>) {
            match kernel {
                Kernel::Term(t) => {
                    for p in t.parameters.iter_mut() {
                        if let Some(v) = it.next() {
                            p.value = *v;
                        }
                    }
                }
                Kernel::Sum(children) | Kernel::Product(children) => {
                    for child in children.iter_mut() {
                        assign(child, it);
                    }
                }
            }
        }
        assign(&mut out.kernel, &mut it);
        match &mut out.mean {
            MeanModel::Constant(p) => {
                if let Some(v) = it.next() {
                    p.value = *v;
                }
            }
            MeanModel::Linear { slope, intercept } => {
                if let Some(v) = it.next() {
                    slope.value = *v;
                }
                if let Some(v) = it.next() {
                    intercept.value = *v;
                }
            }
            MeanModel::DataMean | MeanModel::Fixed(_) => {}
        }
        Ok(out)
    }

    /// Single damped-random-walk term with bounds scaled to the data.
    pub fn red_noise(lc: &LightCurve) -> GpResult<Self> {
        let term = red_noise_term(lc, 1.0)?;
        Self::new("red_noise", term)
    }

    /// Damped random walk plus a Lorentzian oscillator whose period is
    /// restricted to `[min_period, max_period]`.
    pub fn red_noise_with_qpo(lc: &LightCurve, min_period: f64, max_period: f64) -> GpResult<Self> {
        if !(min_period > 0.0) || !(max_period > min_period) {
            return Err(GpError::config(format!(
                "period band must satisfy 0 < min < max, got [{min_period}, {max_period}]"
            )));
        }
        let log_var = lc.variance().max(1e-12).ln();
        let lo_w = (2.0 * PI / max_period).ln();
        let hi_w = (2.0 * PI / min_period).ln();
        let qpo = Term::lorentzian(
            "qpo",
            (log_var - 2.0_f64.ln(), log_var - 7.0, log_var + 5.0),
            (10.0_f64.ln(), 0.0, 1000.0_f64.ln()),
            (0.5 * (lo_w + hi_w), lo_w, hi_w),
        )?;
        let kernel = Kernel::from(red_noise_term(lc, 0.5)?) + Kernel::from(qpo);
        Self::new("red_noise_qpo", kernel)
    }
}

fn red_noise_term(lc: &LightCurve, amplitude_fraction: f64) -> GpResult<Term> {
    let log_var = lc.variance().max(1e-12).ln();
    let duration = lc.duration();
    let cadence = lc.median_cadence().max(duration * 1e-6);
    let lo_c = (1.0 / (10.0 * duration)).ln();
    let hi_c = (10.0 / cadence).ln();
    let init_c = (10.0 / duration).ln().clamp(lo_c, hi_c);
    Term::real(
        "red_noise",
        (log_var + amplitude_fraction.ln(), log_var - 7.0, log_var + 5.0),
        (init_c, lo_c, hi_c),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() <= tol * (1.0 + b.abs()), "{a} vs {b}");
    }

    #[test]
    fn product_expansion_matches_direct_product() {
        let k1 = BoundKernel::Term(BoundTerm::Lorentzian {
            a: 1.3,
            q: 4.0,
            omega0: 0.7,
        });
        let k2 = BoundKernel::Term(BoundTerm::Sho {
            s0: 0.5,
            q: 2.0,
            omega0: 1.1,
        });
        let k3 = BoundKernel::Term(BoundTerm::Real { a: 0.8, c: 0.05 });
        let prod = BoundKernel::Product(vec![k1.clone(), k2.clone(), k3.clone()]);
        let coeffs = prod.celerite().expect("celerite form");
        for &tau in &[0.0, 0.3, 1.0, 2.5, 10.0] {
            let direct = k1.covariance(tau) * k2.covariance(tau) * k3.covariance(tau);
            assert_close(coeffs.covariance(tau), direct, 1e-10);
        }
    }

    #[test]
    fn sho_overdamped_matches_two_real_terms() {
        let sho = BoundTerm::Sho {
            s0: 2.0,
            q: 0.3,
            omega0: 0.9,
        };
        let coeffs = sho.celerite().expect("celerite form");
        assert_eq!(coeffs.real.len(), 2);
        assert!(coeffs.complex.is_empty());
        assert_close(coeffs.variance(), 2.0 * 0.9 * 0.3, 1e-12);
    }

    #[test]
    fn quasi_periodic_has_no_celerite_form() {
        let k = BoundKernel::Sum(vec![
            BoundKernel::Term(BoundTerm::Real { a: 1.0, c: 1.0 }),
            BoundKernel::Term(BoundTerm::QuasiPeriodic {
                amp: 1.0,
                gamma: 1.0,
                period: 3.0,
                length: 10.0,
            }),
        ]);
        assert!(k.celerite().is_none());
        assert!(k.psd(1.0).is_none());
    }
}
