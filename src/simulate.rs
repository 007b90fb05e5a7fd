use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::batch::{run_replicates, BatchOutcome, StopSignal};
use crate::error::{GpError, GpResult};
use crate::kernels::{BoundModel, CovarianceModel};
use crate::lightcurve::LightCurve;
use crate::mcmc::SamplingResult;
use crate::solver::{factorize, CovarianceSolver, Factorization, JitterPolicy, SolverStrategy};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationOptions {
    /// Add independent Gaussian noise at the template's uncertainties.
    pub add_noise: bool,
    /// Add the model's mean function; otherwise the draw is zero-mean.
    pub add_mean: bool,
    pub solver: SolverStrategy,
    pub jitter: JitterPolicy,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            add_noise: true,
            add_mean: true,
            solver: SolverStrategy::Auto,
            jitter: JitterPolicy::default(),
        }
    }
}

/// A synthetic light curve and the parameters that produced it.
#[derive(Clone, Debug, Serialize)]
pub struct SimulatedLightCurve {
    pub light_curve: LightCurve,
    pub parameters: Vec<f64>,
    pub model_name: String,
}

/// Draws light curves on a template's time grid from one parameter vector.
///
/// The kernel covariance is factorized once at construction; every draw
/// after that is linear in the number of points (semiseparable) or
/// quadratic (dense).
pub struct Simulator<'a> {
    template: &'a LightCurve,
    model: &'a CovarianceModel,
    theta: Vec<f64>,
    bound: BoundModel,
    factor: Factorization,
    options: SimulationOptions,
}

impl<'a> Simulator<'a> {
    pub fn new(
        template: &'a LightCurve,
        model: &'a CovarianceModel,
        theta: &[f64],
        options: SimulationOptions,
    ) -> GpResult<Self> {
        let bound = model.bind(theta)?;
        let zeros = vec![0.0; template.len()];
        let factor = factorize(&bound.kernel, template.times(), &zeros, options.solver, &options.jitter)?;
        Ok(Self {
            template,
            model,
            theta: theta.to_vec(),
            bound,
            factor,
            options,
        })
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> GpResult<SimulatedLightCurve> {
        let n = self.template.len();
        let white: Vec<f64> = (0..n).map(|_| rng.sample(StandardNormal)).collect();
        let mut values = self.factor.correlate(&white);
        if self.options.add_noise {
            for (v, s) in values.iter_mut().zip(self.template.errors()) {
                let z: f64 = rng.sample(StandardNormal);
                *v += s * z;
            }
        }
        if self.options.add_mean {
            for (v, m) in values.iter_mut().zip(self.bound.mean.evaluate(self.template)) {
                *v += m;
            }
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(GpError::NumericalInstability {
                jitter: self.factor.jitter(),
                reason: "simulated values are not finite".into(),
            });
        }
        Ok(SimulatedLightCurve {
            light_curve: self.template.with_values(values)?,
            parameters: self.theta.clone(),
            model_name: self.model.name().to_string(),
        })
    }
}

/// One synthetic light curve sharing `template`'s times and uncertainties.
pub fn simulate<R: Rng + ?Sized>(
    template: &LightCurve,
    model: &CovarianceModel,
    theta: &[f64],
    options: &SimulationOptions,
    rng: &mut R,
) -> GpResult<SimulatedLightCurve> {
    Simulator::new(template, model, theta, options.clone())?.draw(rng)
}

/// `n` replicates from a fixed parameter vector, run in parallel.
///
/// A factorization failure is reported before any replicate runs.
pub fn simulate_batch(
    template: &LightCurve,
    model: &CovarianceModel,
    theta: &[f64],
    n: usize,
    base_seed: u64,
    options: &SimulationOptions,
    stop: Option<&StopSignal>,
) -> GpResult<BatchOutcome<SimulatedLightCurve>> {
    let sim = Simulator::new(template, model, theta, options.clone())?;
    Ok(run_replicates(n, base_seed, stop, |_, rng| sim.draw(rng)))
}

/// `n` replicates, each from a parameter vector drawn uniformly from the
/// posterior samples.
pub fn simulate_from_posterior(
    template: &LightCurve,
    model: &CovarianceModel,
    posterior: &SamplingResult,
    n: usize,
    base_seed: u64,
    options: &SimulationOptions,
    stop: Option<&StopSignal>,
) -> GpResult<BatchOutcome<SimulatedLightCurve>> {
    if posterior.samples.is_empty() {
        return Err(GpError::config("posterior has no samples to simulate from"));
    }
    if posterior.dim() != model.n_params() {
        return Err(GpError::config(format!(
            "posterior has {} parameters, model `{}` has {}",
            posterior.dim(),
            model.name(),
            model.n_params()
        )));
    }
    Ok(run_replicates(n, base_seed, stop, |_, rng| {
        let theta = &posterior.samples[rng.random_range(0..posterior.samples.len())];
        Simulator::new(template, model, theta, options.clone())?.draw(rng)
    }))
}
