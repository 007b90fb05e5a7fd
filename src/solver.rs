use nalgebra::{Cholesky, DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{GpError, GpResult};
use crate::kernels::{BoundKernel, CeleriteCoefficients};

/// Dense factorizations above this size are logged as a warning.
const DENSE_WARN_POINTS: usize = 2000;

/// Which factorization backs a likelihood evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverStrategy {
    /// Semiseparable when every term allows it, dense otherwise.
    #[default]
    Auto,
    Dense,
    Celerite,
}

/// Escalating diagonal jitter used when a factorization fails.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct JitterPolicy {
    /// First retry adds `initial_scale × mean(diagonal)`.
    pub initial_scale: f64,
    pub growth: f64,
    pub max_attempts: usize,
}

impl Default for JitterPolicy {
    fn default() -> Self {
        Self {
            initial_scale: 1e-10,
            growth: 10.0,
            max_attempts: 6,
        }
    }
}

/// Operations every factorization of `K + diag(noise)` provides.
pub trait CovarianceSolver {
    fn len(&self) -> usize;

    fn log_determinant(&self) -> f64;

    /// `rᵀ K⁻¹ r`. NaN if the triangular solve failed.
    fn quadratic_form(&self, residual: &[f64]) -> f64;

    /// `L·ε` for `K = L Lᵀ`: maps white noise onto the covariance.
    fn correlate(&self, white: &[f64]) -> Vec<f64>;

    /// Diagonal jitter that was needed to factorize.
    fn jitter(&self) -> f64;
}

// ---------------------------------------------------------------------------
// Dense path
// ---------------------------------------------------------------------------

pub struct DenseFactor {
    l: DMatrix<f64>,
    jitter: f64,
}

impl DenseFactor {
    fn try_new(mut k: DMatrix<f64>, jitter: f64) -> Option<Self> {
        if jitter > 0.0 {
            for i in 0..k.nrows() {
                k[(i, i)] += jitter;
            }
        }
        let chol = Cholesky::new(k)?;
        let l = chol.unpack();
        if l.diagonal().iter().any(|v| !(v.is_finite() && *v > 0.0)) {
            return None;
        }
        Some(Self { l, jitter })
    }
}

impl CovarianceSolver for DenseFactor {
    fn len(&self) -> usize {
        self.l.nrows()
    }

    fn log_determinant(&self) -> f64 {
        2.0 * self.l.diagonal().iter().map(|v| v.ln()).sum::<f64>()
    }

    fn quadratic_form(&self, residual: &[f64]) -> f64 {
        let r = DVector::from_column_slice(residual);
        self.l
            .solve_lower_triangular(&r)
            .map_or(f64::NAN, |z| z.norm_squared())
    }

    fn correlate(&self, white: &[f64]) -> Vec<f64> {
        let e = DVector::from_column_slice(white);
        (&self.l * e).iter().copied().collect()
    }

    fn jitter(&self) -> f64 {
        self.jitter
    }
}

// ---------------------------------------------------------------------------
// Semiseparable (celerite) path
// ---------------------------------------------------------------------------

/// `K = L·diag(d)·Lᵀ` with `L = I + tril(U Wᵀ)` scaled by the
/// exponential decay between neighbouring times. O(N·J²) to build,
/// O(N·J) per solve.
pub struct CeleriteFactor {
    n: usize,
    width: usize,
    u: Vec<f64>,
    w: Vec<f64>,
    phi: Vec<f64>,
    d: Vec<f64>,
    jitter: f64,
}

struct CeleriteMatrices {
    width: usize,
    diag: Vec<f64>,
    u: Vec<f64>,
    v: Vec<f64>,
    phi: Vec<f64>,
}

impl CeleriteMatrices {
    fn build(coeffs: &CeleriteCoefficients, times: &[f64], noise_var: &[f64]) -> Self {
        let n = times.len();
        let width = coeffs.width();
        let base = coeffs.variance() + coeffs.diagonal;
        let diag = noise_var.iter().map(|s| s + base).collect();
        let mut u = vec![0.0; n * width];
        let mut v = vec![0.0; n * width];
        let mut phi = vec![0.0; n * width];
        let t0 = times.first().copied().unwrap_or(0.0);
        for (i, &t) in times.iter().enumerate() {
            let t = t - t0;
            let dt = if i > 0 { times[i] - times[i - 1] } else { 0.0 };
            let row = i * width;
            let mut j = 0;
            for &(a, c) in &coeffs.real {
                u[row + j] = a;
                v[row + j] = 1.0;
                phi[row + j] = (-c * dt).exp();
                j += 1;
            }
            for &(a, b, c, d) in &coeffs.complex {
                let (s, co) = (d * t).sin_cos();
                let decay = (-c * dt).exp();
                u[row + j] = a * co + b * s;
                u[row + j + 1] = a * s - b * co;
                v[row + j] = co;
                v[row + j + 1] = s;
                phi[row + j] = decay;
                phi[row + j + 1] = decay;
                j += 2;
            }
        }
        Self {
            width,
            diag,
            u,
            v,
            phi,
        }
    }
}

impl CeleriteFactor {
    fn try_new(m: &CeleriteMatrices, jitter: f64) -> Option<Self> {
        let n = m.diag.len();
        let jw = m.width;
        let mut d = vec![0.0; n];
        let mut w = m.v.clone();
        let mut s = vec![0.0; jw * jw];
        let mut tmp = vec![0.0; jw];

        d[0] = m.diag[0] + jitter;
        if !(d[0] > 0.0) {
            return None;
        }
        for k in 0..jw {
            w[k] /= d[0];
        }

        for i in 1..n {
            let row = i * jw;
            let prev = (i - 1) * jw;
            let dp = d[i - 1];
            for a in 0..jw {
                for b in 0..jw {
                    let idx = a * jw + b;
                    s[idx] = m.phi[row + a]
                        * (s[idx] + dp * w[prev + a] * w[prev + b])
                        * m.phi[row + b];
                }
            }
            for a in 0..jw {
                tmp[a] = (0..jw).map(|b| m.u[row + b] * s[b * jw + a]).sum();
            }
            let quad: f64 = (0..jw).map(|a| tmp[a] * m.u[row + a]).sum();
            let di = m.diag[i] + jitter - quad;
            if !(di > 0.0 && di.is_finite()) {
                return None;
            }
            d[i] = di;
            for a in 0..jw {
                w[row + a] = (m.v[row + a] - tmp[a]) / di;
            }
        }

        Some(Self {
            n,
            width: jw,
            u: m.u.clone(),
            w,
            phi: m.phi.clone(),
            d,
            jitter,
        })
    }

    /// Solve `L z = y`.
    fn solve_lower(&self, y: &[f64]) -> Vec<f64> {
        let jw = self.width;
        let mut z = vec![0.0; self.n];
        let mut f = vec![0.0; jw];
        z[0] = y[0];
        for i in 1..self.n {
            let row = i * jw;
            let prev = (i - 1) * jw;
            let mut acc = 0.0;
            for a in 0..jw {
                f[a] = self.phi[row + a] * (f[a] + self.w[prev + a] * z[i - 1]);
                acc += self.u[row + a] * f[a];
            }
            z[i] = y[i] - acc;
        }
        z
    }
}

impl CovarianceSolver for CeleriteFactor {
    fn len(&self) -> usize {
        self.n
    }

    fn log_determinant(&self) -> f64 {
        self.d.iter().map(|v| v.ln()).sum()
    }

    fn quadratic_form(&self, residual: &[f64]) -> f64 {
        let z = self.solve_lower(residual);
        z.iter().zip(&self.d).map(|(z, d)| z * z / d).sum()
    }

    fn correlate(&self, white: &[f64]) -> Vec<f64> {
        let jw = self.width;
        let z: Vec<f64> = white.iter().zip(&self.d).map(|(e, d)| e * d.sqrt()).collect();
        let mut out = vec![0.0; self.n];
        let mut f = vec![0.0; jw];
        out[0] = z[0];
        for i in 1..self.n {
            let row = i * jw;
            let prev = (i - 1) * jw;
            let mut acc = 0.0;
            for a in 0..jw {
                f[a] = self.phi[row + a] * (f[a] + self.w[prev + a] * z[i - 1]);
                acc += self.u[row + a] * f[a];
            }
            out[i] = z[i] + acc;
        }
        out
    }

    fn jitter(&self) -> f64 {
        self.jitter
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub enum Factorization {
    Dense(DenseFactor),
    Celerite(CeleriteFactor),
}

impl Factorization {
    pub fn is_celerite(&self) -> bool {
        matches!(self, Factorization::Celerite(_))
    }
}

impl CovarianceSolver for Factorization {
    fn len(&self) -> usize {
        match self {
            Factorization::Dense(f) => f.len(),
            Factorization::Celerite(f) => f.len(),
        }
    }

    fn log_determinant(&self) -> f64 {
        match self {
            Factorization::Dense(f) => f.log_determinant(),
            Factorization::Celerite(f) => f.log_determinant(),
        }
    }

    fn quadratic_form(&self, residual: &[f64]) -> f64 {
        match self {
            Factorization::Dense(f) => f.quadratic_form(residual),
            Factorization::Celerite(f) => f.quadratic_form(residual),
        }
    }

    fn correlate(&self, white: &[f64]) -> Vec<f64> {
        match self {
            Factorization::Dense(f) => f.correlate(white),
            Factorization::Celerite(f) => f.correlate(white),
        }
    }

    fn jitter(&self) -> f64 {
        match self {
            Factorization::Dense(f) => f.jitter(),
            Factorization::Celerite(f) => f.jitter(),
        }
    }
}

/// Factorize `K(times) + diag(noise_var)`, retrying with growing diagonal
/// jitter per `policy` before giving up with `NumericalInstability`.
pub fn factorize(
    kernel: &BoundKernel,
    times: &[f64],
    noise_var: &[f64],
    strategy: SolverStrategy,
    policy: &JitterPolicy,
) -> GpResult<Factorization> {
    if times.is_empty() || noise_var.len() != times.len() {
        return Err(GpError::config(format!(
            "factorization needs matching, non-empty times ({}) and noise ({})",
            times.len(),
            noise_var.len()
        )));
    }
    let coeffs = match strategy {
        SolverStrategy::Dense => None,
        SolverStrategy::Auto => kernel.celerite(),
        SolverStrategy::Celerite => Some(kernel.celerite().ok_or_else(|| {
            GpError::config("celerite solver requested for a kernel without a semiseparable form")
        })?),
    };

    match coeffs {
        Some(coeffs) => {
            let m = CeleriteMatrices::build(&coeffs, times, noise_var);
            let scale = crate::common::mean(&m.diag).abs();
            retry_with_jitter(scale, policy, |jitter| {
                CeleriteFactor::try_new(&m, jitter).map(Factorization::Celerite)
            })
        }
        None => {
            if times.len() > DENSE_WARN_POINTS {
                warn!(
                    n = times.len(),
                    "dense covariance factorization on a long light curve"
                );
            }
            let mut k = kernel.matrix(times);
            for (i, s) in noise_var.iter().enumerate() {
                k[(i, i)] += s;
            }
            let scale = k.diagonal().mean().abs();
            retry_with_jitter(scale, policy, |jitter| {
                DenseFactor::try_new(k.clone(), jitter).map(Factorization::Dense)
            })
        }
    }
}

fn retry_with_jitter<F>(scale: f64, policy: &JitterPolicy, mut attempt: F) -> GpResult<Factorization>
where
    F: FnMut(f64) -> Option<Factorization>,
{
    if let Some(f) = attempt(0.0) {
        return Ok(f);
    }
    let mut jitter = policy.initial_scale * scale.max(f64::MIN_POSITIVE);
    for i in 0..policy.max_attempts {
        debug!(attempt = i + 1, jitter, "retrying factorization with jitter");
        if let Some(f) = attempt(jitter) {
            return Ok(f);
        }
        if i + 1 < policy.max_attempts {
            jitter *= policy.growth;
        }
    }
    Err(GpError::NumericalInstability {
        jitter,
        reason: "covariance matrix is not positive definite".into(),
    })
}
