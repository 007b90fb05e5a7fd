use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{info, warn};

use crate::batch::StopSignal;
use crate::comparison::{compare_models, ModelEvidence, ModelRanking};
use crate::config::AnalysisConfig;
use crate::error::GpResult;
use crate::kernels::CovarianceModel;
use crate::lightcurve::LightCurve;
use crate::likelihood::LikelihoodEvaluator;
use crate::mcmc::{sample, Initialization, SamplingResult};
use crate::optimize::{fit_model, Estimate};
use crate::periodogram::PeriodogramConfig;
use crate::significance::{SignificanceEvaluator, SignificanceResult};

/// Everything one periodicity analysis produces, as plain data.
#[derive(Clone, Debug, Serialize)]
pub struct PeriodicityReport {
    pub null_model: String,
    pub alternative_model: String,
    pub null_estimate: Estimate,
    pub alternative_estimate: Estimate,
    pub null_samples: Option<SamplingResult>,
    pub alternative_samples: Option<SamplingResult>,
    pub ranking: ModelRanking,
    /// Periods of the alternative model's periodic terms at its best fit.
    pub best_fit_periods: Vec<f64>,
    pub significance: SignificanceResult,
}

impl PeriodicityReport {
    /// The alternative model ranks first.
    pub fn periodic_preferred(&self) -> bool {
        self.ranking.best().model_name == self.alternative_model
    }
}

fn run_sampler(
    lc: &LightCurve,
    model: &CovarianceModel,
    estimate: &Estimate,
    config: &AnalysisConfig,
    rng: &mut SmallRng,
    stop: Option<&StopSignal>,
) -> GpResult<SamplingResult> {
    let evaluator = LikelihoodEvaluator::new(lc, model).with_strategy(config.estimator.solver);
    sample(
        &evaluator,
        Initialization::Around(estimate.params.clone()),
        &config.sampler,
        rng,
        stop,
    )
}

/// Evidence for every fitted model from one common source: posterior
/// samples when all models have them, best-fit estimates otherwise.
fn evidence(
    fits: &[(&CovarianceModel, &Estimate, Option<&SamplingResult>)],
    n_obs: usize,
) -> GpResult<Vec<ModelEvidence>> {
    let all_sampled = fits
        .iter()
        .all(|(_, _, s)| s.is_some_and(|s| !s.samples.is_empty()));
    if !all_sampled && fits.iter().any(|(_, _, s)| s.is_some()) {
        warn!("a sampler returned no samples; ranking every model on its point estimate");
    }
    fits.iter()
        .map(|(model, estimate, samples)| match samples {
            Some(s) if all_sampled => ModelEvidence::from_samples(model.name(), s, n_obs),
            _ => Ok(ModelEvidence::from_estimate(model.name(), estimate, n_obs)),
        })
        .collect()
}

/// Fit a null and a periodic model, rank them, and test the periodic
/// feature against simulations from the null.
pub fn analyze_periodicity(
    lc: &LightCurve,
    null: &CovarianceModel,
    alternative: &CovarianceModel,
    config: &AnalysisConfig,
    stop: Option<&StopSignal>,
) -> GpResult<PeriodicityReport> {
    config.validate()?;
    let mut rng = SmallRng::seed_from_u64(config.seed);

    let null_estimate = fit_model(lc, null, &config.estimator, &mut rng)?;
    let alternative_estimate = fit_model(lc, alternative, &config.estimator, &mut rng)?;
    info!(
        null = null.name(),
        alternative = alternative.name(),
        null_ll = null_estimate.log_likelihood,
        alternative_ll = alternative_estimate.log_likelihood,
        "point estimates complete"
    );

    let (null_samples, alternative_samples) = if config.run_sampling {
        let ns = run_sampler(lc, null, &null_estimate, config, &mut rng, stop)?;
        let alt = run_sampler(lc, alternative, &alternative_estimate, config, &mut rng, stop)?;
        (Some(ns), Some(alt))
    } else {
        (None, None)
    };

    let ranking = compare_models(
        &evidence(
            &[
                (null, &null_estimate, null_samples.as_ref()),
                (alternative, &alternative_estimate, alternative_samples.as_ref()),
            ],
            lc.len(),
        )?,
        config.criterion,
    )?;

    let significance = SignificanceEvaluator::new(null, config.significance.clone())
        .with_alternative(alternative)
        .evaluate(lc, Some(&null_estimate), null_samples.as_ref(), &mut rng, stop)?;

    let best_fit_periods = alternative.bind(&alternative_estimate.params)?.kernel.periods();

    Ok(PeriodicityReport {
        null_model: null.name().to_string(),
        alternative_model: alternative.name().to_string(),
        null_estimate,
        alternative_estimate,
        null_samples,
        alternative_samples,
        ranking,
        best_fit_periods,
        significance,
    })
}

/// [`analyze_periodicity`] with the red-noise null and red-noise + QPO
/// alternative presets.
pub fn analyze_light_curve(
    lc: &LightCurve,
    config: &AnalysisConfig,
    stop: Option<&StopSignal>,
) -> GpResult<PeriodicityReport> {
    let band = PeriodogramConfig {
        min_period: config.min_period,
        max_period: config.max_period,
        ..PeriodogramConfig::default()
    };
    let (min_period, max_period) = band.period_band(lc)?;
    let null = CovarianceModel::red_noise(lc)?;
    let alternative = CovarianceModel::red_noise_with_qpo(lc, min_period, max_period)?;
    analyze_periodicity(lc, &null, &alternative, config, stop)
}
