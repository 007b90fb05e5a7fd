use argmin::core::{CostFunction, Error as ArgminError, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::common::finite_or_none;
use crate::error::{GpError, GpResult};
use crate::kernels::CovarianceModel;
use crate::lightcurve::LightCurve;
use crate::likelihood::{LikelihoodEvaluator, Posterior};
use crate::solver::SolverStrategy;

/// Cost returned for parameter vectors the posterior rejects.
const REJECTED_COST: f64 = 1e99;

/// Fewest observations a fit is attempted on.
pub const MIN_FIT_POINTS: usize = 3;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Total restarts, including the one from the model's initial values.
    pub n_restarts: usize,
    pub max_iters: u64,
    /// Simplex cost standard deviation at which a run counts as converged.
    pub sd_tolerance: f64,
    /// Initial simplex edge as a fraction of each parameter's bound width.
    pub simplex_scale: f64,
    /// Re-run once from the best point.
    pub polish: bool,
    pub solver: SolverStrategy,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            n_restarts: 8,
            max_iters: 3000,
            sd_tolerance: 1e-7,
            simplex_scale: 0.1,
            polish: true,
            solver: SolverStrategy::Auto,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> GpResult<()> {
        if self.n_restarts == 0 {
            return Err(GpError::config("estimator needs at least one restart"));
        }
        if self.max_iters == 0 {
            return Err(GpError::config("estimator max_iters must be positive"));
        }
        if !(self.sd_tolerance > 0.0) {
            return Err(GpError::config("estimator sd_tolerance must be positive"));
        }
        if !(self.simplex_scale > 0.0 && self.simplex_scale <= 1.0) {
            return Err(GpError::config("estimator simplex_scale must lie in (0, 1]"));
        }
        Ok(())
    }
}

/// One optimizer run, kept for diagnostics.
#[derive(Clone, Debug, Serialize)]
pub struct RestartOutcome {
    pub index: usize,
    pub polish: bool,
    pub start: Vec<f64>,
    pub params: Vec<f64>,
    /// Negative log posterior at `params`; `None` if not finite.
    pub objective: Option<f64>,
    pub iterations: u64,
    pub converged: bool,
    pub termination: String,
}

/// Maximum-a-posteriori point estimate.
#[derive(Clone, Debug, Serialize)]
pub struct Estimate {
    pub parameter_names: Vec<String>,
    pub params: Vec<f64>,
    pub log_likelihood: f64,
    pub log_prior: f64,
    /// `-(log_likelihood + log_prior)`.
    pub objective: f64,
    pub restarts: Vec<RestartOutcome>,
}

impl Estimate {
    pub fn log_posterior(&self) -> f64 {
        self.log_likelihood + self.log_prior
    }

    pub fn n_converged(&self) -> usize {
        self.restarts.iter().filter(|r| r.converged).count()
    }

    pub fn param(&self, name: &str) -> Option<f64> {
        self.parameter_names
            .iter()
            .position(|n| n == name)
            .map(|i| self.params[i])
    }
}

// ---------------------------------------------------------------------------
// argmin adapter
// ---------------------------------------------------------------------------

struct NegLogPosterior<'a, P> {
    target: &'a P,
}

impl<P: Posterior> CostFunction for NegLogPosterior<'_, P> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, p: &Self::Param) -> Result<Self::Output, ArgminError> {
        let lp = self.target.log_posterior(p);
        if lp.is_finite() {
            Ok(-lp)
        } else {
            Ok(REJECTED_COST)
        }
    }
}

fn initial_simplex(start: &[f64], bounds: &[(f64, f64)], scale: f64) -> Vec<Vec<f64>> {
    let mut simplex = Vec::with_capacity(start.len() + 1);
    simplex.push(start.to_vec());
    for (i, &(lo, hi)) in bounds.iter().enumerate() {
        let step = scale * (hi - lo);
        let mut vertex = start.to_vec();
        vertex[i] = if start[i] + step <= hi {
            start[i] + step
        } else {
            start[i] - step
        };
        simplex.push(vertex);
    }
    simplex
}

fn run_restart<P: Posterior>(
    target: &P,
    index: usize,
    polish: bool,
    start: Vec<f64>,
    config: &EstimatorConfig,
) -> RestartOutcome {
    let bounds = target.bounds();
    let failed = |start: Vec<f64>, termination: String| RestartOutcome {
        index,
        polish,
        params: start.clone(),
        start,
        objective: None,
        iterations: 0,
        converged: false,
        termination,
    };

    let simplex = initial_simplex(&start, &bounds, config.simplex_scale);
    let solver = match NelderMead::new(simplex).with_sd_tolerance(config.sd_tolerance) {
        Ok(s) => s,
        Err(e) => return failed(start, format!("solver setup failed: {e}")),
    };
    let problem = NegLogPosterior { target };
    let res = Executor::new(problem, solver)
        .configure(|state| state.max_iters(config.max_iters))
        .run();

    match res {
        Ok(res) => {
            let state = res.state();
            let params = match state.get_best_param() {
                Some(p) => p.clone(),
                None => return failed(start, "no best parameter".into()),
            };
            let cost = state.get_best_cost();
            let objective = if cost < REJECTED_COST { finite_or_none(cost) } else { None };
            let status = state.get_termination_status();
            let converged = objective.is_some()
                && matches!(
                    status,
                    TerminationStatus::Terminated(TerminationReason::SolverConverged)
                );
            RestartOutcome {
                index,
                polish,
                start,
                params,
                objective,
                iterations: state.get_iter(),
                converged,
                termination: format!("{status:?}"),
            }
        }
        Err(e) => failed(start, format!("optimizer error: {e}")),
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Multi-start bounded maximization of `target.log_posterior`.
///
/// Starting points are drawn from `rng` up front; the restarts themselves
/// run in parallel and are deterministic given those starts.
pub fn estimate<P, R>(target: &P, config: &EstimatorConfig, rng: &mut R) -> GpResult<Estimate>
where
    P: Posterior,
    R: Rng + ?Sized,
{
    config.validate()?;
    if target.dim() == 0 {
        return Err(GpError::config("cannot optimize a model with no free parameters"));
    }

    let mut starts = Vec::with_capacity(config.n_restarts);
    starts.push(target.initial_values());
    for _ in 1..config.n_restarts {
        starts.push(target.draw_prior(rng));
    }

    let mut restarts: Vec<RestartOutcome> = starts
        .into_par_iter()
        .enumerate()
        .map(|(i, start)| run_restart(target, i, false, start, config))
        .collect();

    for r in &restarts {
        debug!(
            restart = r.index,
            converged = r.converged,
            iterations = r.iterations,
            objective = ?r.objective,
            "restart finished"
        );
    }

    let best = restarts
        .iter()
        .filter(|r| r.converged)
        .filter_map(|r| r.objective.map(|o| (o, r.params.clone())))
        .min_by(|a, b| a.0.total_cmp(&b.0));
    let (mut best_obj, mut best_params) = match best {
        Some(b) => b,
        None => {
            warn!(n_restarts = restarts.len(), "no estimator restart converged");
            return Err(GpError::Convergence(format!(
                "none of {} restarts converged: [{}]",
                restarts.len(),
                restarts
                    .iter()
                    .map(|r| r.termination.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
    };

    if config.polish {
        let polished = run_restart(target, restarts.len(), true, best_params.clone(), config);
        if let Some(obj) = polished.objective {
            if obj < best_obj {
                best_obj = obj;
                best_params = polished.params.clone();
            }
        }
        restarts.push(polished);
    }

    let (log_likelihood, log_prior) = target.evaluate(&best_params);
    info!(
        objective = best_obj,
        converged = restarts.iter().filter(|r| r.converged).count(),
        total = restarts.len(),
        "point estimate complete"
    );

    Ok(Estimate {
        parameter_names: target.parameter_names(),
        params: best_params,
        log_likelihood,
        log_prior,
        objective: best_obj,
        restarts,
    })
}

/// Fit `model` to `lc` by maximum a posteriori.
pub fn fit_model<R: Rng + ?Sized>(
    lc: &LightCurve,
    model: &CovarianceModel,
    config: &EstimatorConfig,
    rng: &mut R,
) -> GpResult<Estimate> {
    if lc.len() < MIN_FIT_POINTS {
        return Err(GpError::config(format!(
            "fitting needs at least {MIN_FIT_POINTS} observations, got {}",
            lc.len()
        )));
    }
    let evaluator = LikelihoodEvaluator::new(lc, model).with_strategy(config.solver);
    estimate(&evaluator, config, rng)
}
