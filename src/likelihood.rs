use std::f64::consts::PI;

use rand::Rng;

use crate::error::{GpError, GpResult};
use crate::kernels::CovarianceModel;
use crate::lightcurve::LightCurve;
use crate::solver::{factorize, CovarianceSolver, JitterPolicy, SolverStrategy};

/// A log-density over a bounded parameter space.
///
/// Implemented by [`LikelihoodEvaluator`]; the estimator and sampler only
/// see this trait, so they can be driven by any target.
pub trait Posterior: Sync {
    fn dim(&self) -> usize;

    fn parameter_names(&self) -> Vec<String>;

    fn bounds(&self) -> Vec<(f64, f64)>;

    fn initial_values(&self) -> Vec<f64>;

    /// `(log_likelihood, log_prior)`. Never fails: anything that cannot be
    /// evaluated yields `-inf` in the corresponding slot.
    fn evaluate(&self, theta: &[f64]) -> (f64, f64);

    fn draw_prior<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64>;

    fn log_posterior(&self, theta: &[f64]) -> f64 {
        let (ll, lp) = self.evaluate(theta);
        if lp == f64::NEG_INFINITY || ll == f64::NEG_INFINITY {
            return f64::NEG_INFINITY;
        }
        let v = ll + lp;
        if v.is_finite() {
            v
        } else {
            f64::NEG_INFINITY
        }
    }
}

/// GP marginal likelihood of a light curve under a covariance model.
///
/// Holds only shared references and plain options; every call binds the
/// parameter vector afresh, so one evaluator can serve many threads.
#[derive(Clone, Copy, Debug)]
pub struct LikelihoodEvaluator<'a> {
    lc: &'a LightCurve,
    model: &'a CovarianceModel,
    strategy: SolverStrategy,
    jitter: JitterPolicy,
}

impl<'a> LikelihoodEvaluator<'a> {
    pub fn new(lc: &'a LightCurve, model: &'a CovarianceModel) -> Self {
        Self {
            lc,
            model,
            strategy: SolverStrategy::Auto,
            jitter: JitterPolicy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: SolverStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_jitter_policy(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn light_curve(&self) -> &'a LightCurve {
        self.lc
    }

    pub fn model(&self) -> &'a CovarianceModel {
        self.model
    }

    pub fn strategy(&self) -> SolverStrategy {
        self.strategy
    }

    pub fn jitter_policy(&self) -> &JitterPolicy {
        &self.jitter
    }

    /// Strict evaluation of `log p(y | t, σ, θ)`.
    ///
    /// Length mismatches give `Configuration`, out-of-bounds parameters give
    /// `Domain`, and an irrecoverable factorization gives
    /// `NumericalInstability`.
    pub fn evaluate(&self, theta: &[f64]) -> GpResult<f64> {
        let bound = self.model.bind(theta)?;
        let noise: Vec<f64> = self.lc.errors().iter().map(|s| s * s).collect();
        let factor = factorize(&bound.kernel, self.lc.times(), &noise, self.strategy, &self.jitter)?;
        let mu = bound.mean.evaluate(self.lc);
        let residual: Vec<f64> = self.lc.values().iter().zip(&mu).map(|(y, m)| y - m).collect();

        let quad = factor.quadratic_form(&residual);
        let log_det = factor.log_determinant();
        let n = self.lc.len() as f64;
        let ll = -0.5 * (quad + log_det + n * (2.0 * PI).ln());
        if !ll.is_finite() {
            return Err(GpError::NumericalInstability {
                jitter: factor.jitter(),
                reason: format!("non-finite log-likelihood (quadratic form {quad}, log det {log_det})"),
            });
        }
        Ok(ll)
    }

    /// Like [`evaluate`](Self::evaluate) but out-of-bounds parameters give
    /// `-inf` instead of an error.
    pub fn log_likelihood(&self, theta: &[f64]) -> GpResult<f64> {
        match self.evaluate(theta) {
            Err(GpError::Domain { .. }) => Ok(f64::NEG_INFINITY),
            other => other,
        }
    }

    pub fn log_prior(&self, theta: &[f64]) -> f64 {
        self.model.log_prior(theta)
    }

    /// Hot-path log posterior: `-inf` for any failure.
    pub fn log_posterior(&self, theta: &[f64]) -> f64 {
        Posterior::log_posterior(self, theta)
    }
}

impl Posterior for LikelihoodEvaluator<'_> {
    fn dim(&self) -> usize {
        self.model.n_params()
    }

    fn parameter_names(&self) -> Vec<String> {
        self.model.parameter_names()
    }

    fn bounds(&self) -> Vec<(f64, f64)> {
        self.model.bounds()
    }

    fn initial_values(&self) -> Vec<f64> {
        self.model.initial_values()
    }

    fn evaluate(&self, theta: &[f64]) -> (f64, f64) {
        let lp = self.model.log_prior(theta);
        if lp == f64::NEG_INFINITY {
            return (f64::NEG_INFINITY, lp);
        }
        let ll = LikelihoodEvaluator::evaluate(self, theta).unwrap_or(f64::NEG_INFINITY);
        (ll, lp)
    }

    fn draw_prior<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        self.model.draw_prior(rng)
    }
}
