use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::{info, warn};

use crate::batch::{run_replicates, StopSignal};
use crate::error::{GpError, GpResult};
use crate::kernels::CovarianceModel;
use crate::lightcurve::LightCurve;
use crate::mcmc::SamplingResult;
use crate::optimize::{fit_model, Estimate, EstimatorConfig};
use crate::periodogram::{lomb_scargle, PeriodogramConfig};
use crate::simulate::{simulate, SimulationOptions};

/// Statistic compared between the observed and simulated light curves.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PeriodicityStatistic {
    /// `2·(ℓ_alt − ℓ_null)` between maximum-posterior fits.
    #[default]
    LikelihoodRatio,
    /// Maximum Lomb-Scargle power in the configured band.
    PeriodogramPeak(PeriodogramConfig),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignificanceConfig {
    pub n_simulations: usize,
    /// p-value the caller wants to be able to resolve.
    pub significance_target: f64,
    pub statistic: PeriodicityStatistic,
    /// Used for every refit of a simulated light curve.
    pub estimator: EstimatorConfig,
    pub simulation: SimulationOptions,
}

impl Default for SignificanceConfig {
    fn default() -> Self {
        Self {
            n_simulations: 1000,
            significance_target: 0.01,
            statistic: PeriodicityStatistic::default(),
            estimator: EstimatorConfig {
                n_restarts: 3,
                ..EstimatorConfig::default()
            },
            simulation: SimulationOptions::default(),
        }
    }
}

impl SignificanceConfig {
    pub fn validate(&self) -> GpResult<()> {
        if self.n_simulations == 0 {
            return Err(GpError::config("n_simulations must be positive"));
        }
        if !(self.significance_target > 0.0 && self.significance_target < 1.0) {
            return Err(GpError::config(format!(
                "significance_target must lie in (0, 1), got {}",
                self.significance_target
            )));
        }
        if let PeriodicityStatistic::PeriodogramPeak(pg) = &self.statistic {
            pg.validate()?;
        }
        self.estimator.validate()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SignificanceStatus {
    Complete,
    /// Cancelled before every replicate ran; the p-value uses what finished.
    Incomplete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum NullParameterSource {
    BestFit,
    Posterior,
}

#[derive(Clone, Debug, Serialize)]
pub struct SignificanceResult {
    pub statistic: PeriodicityStatistic,
    pub null_model: String,
    pub null_parameters: Vec<f64>,
    pub null_parameter_source: NullParameterSource,
    pub observed: f64,
    /// Statistic of every completed replicate, in replicate order.
    pub null_distribution: Vec<f64>,
    pub n_requested: usize,
    pub n_completed: usize,
    pub n_failed: usize,
    pub n_exceeding: usize,
    /// `(1 + n_exceeding) / (n_completed + 1)`.
    pub p_value: f64,
    /// Two-sided Gaussian sigma with the same tail probability.
    pub sigma_equivalent: f64,
    pub min_resolvable_p: f64,
    pub significance_target: f64,
    /// The target is below `min_resolvable_p`; `p_value` is only an upper bound.
    pub insufficient_simulations: bool,
    pub status: SignificanceStatus,
}

/// Smoothed empirical p-value.
pub fn empirical_p_value(observed: f64, null_distribution: &[f64]) -> f64 {
    let exceeding = null_distribution.iter().filter(|&&s| s >= observed).count();
    (1 + exceeding) as f64 / (null_distribution.len() + 1) as f64
}

/// Two-sided Gaussian sigma for a p-value.
pub fn sigma_equivalent(p: f64) -> f64 {
    if !(p > 0.0 && p <= 1.0) {
        return f64::NAN;
    }
    Normal::new(0.0, 1.0)
        .map(|n| n.inverse_cdf(1.0 - 0.5 * p))
        .unwrap_or(f64::NAN)
}

/// Simulation-based test of periodicity against a null covariance model.
pub struct SignificanceEvaluator<'a> {
    null: &'a CovarianceModel,
    alternative: Option<&'a CovarianceModel>,
    config: SignificanceConfig,
}

impl<'a> SignificanceEvaluator<'a> {
    pub fn new(null: &'a CovarianceModel, config: SignificanceConfig) -> Self {
        Self {
            null,
            alternative: None,
            config,
        }
    }

    /// Periodic model; required for the likelihood-ratio statistic.
    pub fn with_alternative(mut self, alternative: &'a CovarianceModel) -> Self {
        self.alternative = Some(alternative);
        self
    }

    pub fn config(&self) -> &SignificanceConfig {
        &self.config
    }

    /// The configured statistic on one light curve. `null_fit` skips the
    /// null refit when the caller already has it.
    pub fn statistic<R: Rng + ?Sized>(
        &self,
        lc: &LightCurve,
        null_fit: Option<&Estimate>,
        rng: &mut R,
    ) -> GpResult<f64> {
        match &self.config.statistic {
            PeriodicityStatistic::PeriodogramPeak(pg) => {
                let (lo, hi) = pg.period_band(lc)?;
                let periodogram = lomb_scargle(lc, pg)?;
                Ok(periodogram.peak_in_band(lo, hi).map_or(0.0, |(_, p)| p))
            }
            PeriodicityStatistic::LikelihoodRatio => {
                let alt = self.alternative.ok_or_else(|| {
                    GpError::config("likelihood-ratio statistic needs an alternative model")
                })?;
                let null_ll = match null_fit {
                    Some(fit) => fit.log_likelihood,
                    None => fit_model(lc, self.null, &self.config.estimator, rng)?.log_likelihood,
                };
                let alt_ll = fit_model(lc, alt, &self.config.estimator, rng)?.log_likelihood;
                Ok(2.0 * (alt_ll - null_ll))
            }
        }
    }

    /// Fit the null model (unless `null_fit` is given), simulate
    /// `n_simulations` light curves from it on `lc`'s time grid, and
    /// compare statistics. The observed and simulated statistics both use
    /// `config.estimator`.
    ///
    /// With `null_posterior`, each replicate uses one posterior draw for
    /// the null parameters instead of the best fit.
    pub fn evaluate<R: Rng + ?Sized>(
        &self,
        lc: &LightCurve,
        null_fit: Option<&Estimate>,
        null_posterior: Option<&SamplingResult>,
        rng: &mut R,
        stop: Option<&StopSignal>,
    ) -> GpResult<SignificanceResult> {
        self.config.validate()?;
        if matches!(self.config.statistic, PeriodicityStatistic::LikelihoodRatio) && self.alternative.is_none() {
            return Err(GpError::config("likelihood-ratio statistic needs an alternative model"));
        }
        let posterior = match null_posterior {
            Some(p) if !p.samples.is_empty() => {
                if p.dim() != self.null.n_params() {
                    return Err(GpError::config(format!(
                        "null posterior has {} parameters, model `{}` has {}",
                        p.dim(),
                        self.null.name(),
                        self.null.n_params()
                    )));
                }
                Some(p)
            }
            _ => None,
        };

        // a caller-supplied fit only sets the simulation parameters; the
        // observed statistic is refit with the replicates' estimator
        let fitted;
        let (null_fit, observed_null) = match null_fit {
            Some(f) => (f, None),
            None => {
                fitted = fit_model(lc, self.null, &self.config.estimator, rng)?;
                (&fitted, Some(&fitted))
            }
        };
        let observed = self.statistic(lc, observed_null, rng)?;
        let base_seed: u64 = rng.random();

        let batch = run_replicates(self.config.n_simulations, base_seed, stop, |_, rng| {
            let theta = match posterior {
                Some(p) => p.samples[rng.random_range(0..p.samples.len())].as_slice(),
                None => null_fit.params.as_slice(),
            };
            let sim = simulate(lc, self.null, theta, &self.config.simulation, rng)?;
            self.statistic(&sim.light_curve, None, rng)
        });

        let null_distribution: Vec<f64> = batch.values().copied().collect();
        let n_completed = null_distribution.len();
        if n_completed == 0 && !batch.failed.is_empty() {
            return Err(GpError::Convergence(format!(
                "all {} null replicates failed; first error: {}",
                batch.failed.len(),
                batch.failed[0].1
            )));
        }
        let n_exceeding = null_distribution.iter().filter(|&&s| s >= observed).count();
        let p_value = empirical_p_value(observed, &null_distribution);
        let min_resolvable_p = 1.0 / (n_completed + 1) as f64;
        let insufficient_simulations = self.config.significance_target < min_resolvable_p;
        let status = if batch.was_cancelled() {
            SignificanceStatus::Incomplete
        } else {
            SignificanceStatus::Complete
        };
        if insufficient_simulations {
            warn!(
                target = self.config.significance_target,
                min_resolvable_p,
                "too few simulations to resolve the requested significance"
            );
        }
        info!(
            observed,
            p_value,
            n_completed,
            n_failed = batch.failed.len(),
            "significance test finished"
        );

        Ok(SignificanceResult {
            statistic: self.config.statistic.clone(),
            null_model: self.null.name().to_string(),
            null_parameters: null_fit.params.clone(),
            null_parameter_source: if posterior.is_some() {
                NullParameterSource::Posterior
            } else {
                NullParameterSource::BestFit
            },
            observed,
            null_distribution,
            n_requested: self.config.n_simulations,
            n_completed,
            n_failed: batch.failed.len(),
            n_exceeding,
            p_value,
            sigma_equivalent: sigma_equivalent(p_value),
            min_resolvable_p,
            significance_target: self.config.significance_target,
            insufficient_simulations,
            status,
        })
    }
}
