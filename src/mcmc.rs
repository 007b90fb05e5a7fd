use rand::Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::batch::{stopped, StopSignal};
use crate::common::{mean, median, quantile};
use crate::error::{GpError, GpResult};
use crate::likelihood::Posterior;

/// Sokal window constant for the integrated autocorrelation time.
const AUTOCORR_WINDOW: f64 = 5.0;

/// Rejection attempts per walker when initializing.
const MAX_INIT_TRIES: usize = 1000;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub n_walkers: usize,
    pub burn_in: usize,
    /// Upper bound on sampling-phase steps.
    pub max_steps: usize,
    /// Steps between autocorrelation checks.
    pub check_interval: usize,
    /// Converged once every `τ · convergence_multiple` is below the chain length.
    pub convergence_multiple: f64,
    /// ...and `τ` changed by less than this fraction since the previous check.
    pub tau_rtol: f64,
    /// Healthy range for the median burn-in acceptance fraction.
    pub acceptance_band: (f64, f64),
    /// Re-centering attempts after an out-of-band burn-in.
    pub max_recenters: usize,
    pub init_spread: f64,
    /// Stretch-move scale `a`.
    pub stretch_scale: f64,
    /// Extra steps dropped from the start of the sampling phase.
    pub discard: usize,
    /// Overrides the autocorrelation-based thinning.
    pub thin: Option<usize>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            n_walkers: 32,
            burn_in: 500,
            max_steps: 10_000,
            check_interval: 500,
            convergence_multiple: 50.0,
            tau_rtol: 0.01,
            acceptance_band: (0.1, 0.8),
            max_recenters: 1,
            init_spread: 0.1,
            stretch_scale: 2.0,
            discard: 0,
            thin: None,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self, dim: usize) -> GpResult<()> {
        if dim == 0 {
            return Err(GpError::config("cannot sample a model with no free parameters"));
        }
        if self.n_walkers < 2 * dim {
            return Err(GpError::config(format!(
                "need at least {} walkers for {dim} parameters, got {}",
                2 * dim,
                self.n_walkers
            )));
        }
        if self.n_walkers % 2 != 0 {
            return Err(GpError::config(format!(
                "walker count must be even, got {}",
                self.n_walkers
            )));
        }
        if self.max_steps == 0 || self.check_interval == 0 {
            return Err(GpError::config("max_steps and check_interval must be positive"));
        }
        if self.discard >= self.max_steps {
            return Err(GpError::config(format!(
                "discard ({}) must be smaller than max_steps ({})",
                self.discard, self.max_steps
            )));
        }
        if !(self.convergence_multiple > 0.0) || !(self.tau_rtol > 0.0) {
            return Err(GpError::config("convergence_multiple and tau_rtol must be positive"));
        }
        let (lo, hi) = self.acceptance_band;
        if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) || lo >= hi {
            return Err(GpError::config(format!(
                "acceptance band must satisfy 0 <= lo < hi <= 1, got ({lo}, {hi})"
            )));
        }
        if !(self.init_spread > 0.0) {
            return Err(GpError::config("init_spread must be positive"));
        }
        if !(self.stretch_scale > 1.0) {
            return Err(GpError::config("stretch_scale must exceed 1"));
        }
        if self.thin == Some(0) {
            return Err(GpError::config("thin must be at least 1"));
        }
        Ok(())
    }
}

/// Where walkers start.
#[derive(Clone, Debug, PartialEq)]
pub enum Initialization {
    /// Small Gaussian ball around a point, typically the MAP estimate.
    Around(Vec<f64>),
    FromPrior,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SamplerPhase {
    Initialized,
    BurnIn,
    Sampling,
    Converged,
    Stalled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StallReason {
    /// Burn-in acceptance stayed outside the band after re-centering.
    AcceptanceOutOfBand,
    /// `max_steps` reached before the autocorrelation criterion held.
    NotConverged,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SamplerStatus {
    Converged,
    Stalled(StallReason),
    /// Stopped by a [`StopSignal`]; samples collected so far are kept.
    Incomplete,
}

/// One walker position with its likelihood and prior terms.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PosteriorSample {
    pub params: Vec<f64>,
    pub log_likelihood: f64,
    pub log_prior: f64,
}

impl PosteriorSample {
    pub fn log_posterior(&self) -> f64 {
        self.log_likelihood + self.log_prior
    }
}

/// Per-walker chains, flattened posterior samples and chain diagnostics.
#[derive(Clone, Debug, Serialize)]
pub struct SamplingResult {
    pub parameter_names: Vec<String>,
    pub status: SamplerStatus,
    pub n_walkers: usize,
    /// Sampling-phase steps actually taken.
    pub n_steps: usize,
    pub discard: usize,
    pub thin: usize,
    /// Thinned samples, step-major then walker.
    pub samples: Vec<Vec<f64>>,
    pub log_likelihood: Vec<f64>,
    pub log_posterior: Vec<f64>,
    /// Walker-major, burn-in removed, unthinned.
    pub chains: Vec<Vec<PosteriorSample>>,
    pub acceptance_fraction: Vec<f64>,
    pub burn_in_acceptance: Option<f64>,
    pub autocorr_time: Vec<f64>,
    /// Mean `τ` at every convergence check.
    pub autocorr_history: Vec<f64>,
    pub r_hat: Vec<f64>,
    pub effective_sample_size: Vec<f64>,
    pub recenters: usize,
}

impl SamplingResult {
    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn dim(&self) -> usize {
        self.parameter_names.len()
    }

    pub fn is_converged(&self) -> bool {
        self.status == SamplerStatus::Converged
    }

    pub fn mean_acceptance(&self) -> f64 {
        mean(&self.acceptance_fraction)
    }

    pub fn column(&self, index: usize) -> Vec<f64> {
        self.samples.iter().map(|s| s[index]).collect()
    }

    /// Sample with the highest log-likelihood.
    pub fn max_likelihood_sample(&self) -> Option<&[f64]> {
        self.log_likelihood
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| self.samples[i].as_slice())
    }

    pub fn median_params(&self) -> Option<Vec<f64>> {
        (0..self.dim()).map(|i| median(&mut self.column(i))).collect()
    }

    /// Per-parameter quantile, `q` in `[0, 1]`.
    pub fn quantiles(&self, q: f64) -> Option<Vec<f64>> {
        (0..self.dim()).map(|i| quantile(&mut self.column(i), q)).collect()
    }
}

// ---------------------------------------------------------------------------
// Ensemble state
// ---------------------------------------------------------------------------

struct Ensemble {
    pos: Vec<Vec<f64>>,
    log_post: Vec<f64>,
    log_like: Vec<f64>,
}

struct Chain {
    pos: Vec<Vec<Vec<f64>>>,
    log_post: Vec<Vec<f64>>,
    log_like: Vec<Vec<f64>>,
}

impl Chain {
    fn new() -> Self {
        Self {
            pos: Vec::new(),
            log_post: Vec::new(),
            log_like: Vec::new(),
        }
    }

    fn push(&mut self, e: &Ensemble) {
        self.pos.push(e.pos.clone());
        self.log_post.push(e.log_post.clone());
        self.log_like.push(e.log_like.clone());
    }

    fn len(&self) -> usize {
        self.pos.len()
    }

    /// `[walker][step]` series for one parameter, starting at `from`.
    fn series(&self, param: usize, from: usize) -> Vec<Vec<f64>> {
        let n_walkers = self.pos.first().map_or(0, Vec::len);
        (0..n_walkers)
            .map(|w| self.pos[from..].iter().map(|step| step[w][param]).collect())
            .collect()
    }
}

fn evaluate<P: Posterior>(target: &P, theta: &[f64]) -> (f64, f64) {
    let (ll, lp) = target.evaluate(theta);
    let post = if ll == f64::NEG_INFINITY || lp == f64::NEG_INFINITY || !(ll + lp).is_finite() {
        f64::NEG_INFINITY
    } else {
        ll + lp
    };
    (post, ll)
}

fn within_bounds(x: &[f64], bounds: &[(f64, f64)]) -> bool {
    x.iter().zip(bounds).all(|(v, (lo, hi))| v >= lo && v <= hi)
}

fn initialize<P, R>(
    target: &P,
    init: &Initialization,
    n_walkers: usize,
    spread: f64,
    rng: &mut R,
) -> GpResult<Ensemble>
where
    P: Posterior,
    R: Rng + ?Sized,
{
    let dim = target.dim();
    let bounds = target.bounds();
    if let Initialization::Around(center) = init {
        if center.len() != dim {
            return Err(GpError::config(format!(
                "initial point has {} parameters, model has {dim}",
                center.len()
            )));
        }
    }

    let mut slots: Vec<Option<(Vec<f64>, f64, f64)>> = vec![None; n_walkers];
    for _ in 0..MAX_INIT_TRIES {
        let open: Vec<usize> = (0..n_walkers).filter(|&w| slots[w].is_none()).collect();
        if open.is_empty() {
            break;
        }
        let candidates: Vec<Vec<f64>> = open
            .iter()
            .map(|_| match init {
                Initialization::Around(center) => center
                    .iter()
                    .zip(&bounds)
                    .map(|(&c, &(lo, hi))| {
                        let scale = spread * c.abs().max(1e-3 * (hi - lo));
                        let z: f64 = rng.sample(StandardNormal);
                        c + scale * z
                    })
                    .collect(),
                Initialization::FromPrior => target.draw_prior(rng),
            })
            .collect();
        let scored: Vec<Option<(f64, f64)>> = candidates
            .par_iter()
            .map(|x| {
                if !within_bounds(x, &bounds) {
                    return None;
                }
                let (post, ll) = evaluate(target, x);
                post.is_finite().then_some((post, ll))
            })
            .collect();
        for ((w, x), s) in open.into_iter().zip(candidates).zip(scored) {
            if let Some((post, ll)) = s {
                slots[w] = Some((x, post, ll));
            }
        }
    }

    let mut ensemble = Ensemble {
        pos: Vec::with_capacity(n_walkers),
        log_post: Vec::with_capacity(n_walkers),
        log_like: Vec::with_capacity(n_walkers),
    };
    for slot in slots {
        let (x, post, ll) = slot.ok_or_else(|| {
            GpError::config(format!(
                "could not place {n_walkers} walkers at finite posterior within {MAX_INIT_TRIES} tries"
            ))
        })?;
        ensemble.pos.push(x);
        ensemble.log_post.push(post);
        ensemble.log_like.push(ll);
    }
    Ok(ensemble)
}

/// One stretch-move sweep over both halves. Returns per-walker acceptance.
fn stretch_step<P, R>(target: &P, e: &mut Ensemble, a: f64, rng: &mut R) -> Vec<bool>
where
    P: Posterior,
    R: Rng + ?Sized,
{
    let n = e.pos.len();
    let dim = target.dim();
    let mut accepted = vec![false; n];
    for half in 0..2 {
        let active: Vec<usize> = (0..n).filter(|w| w % 2 == half).collect();
        let other: Vec<usize> = (0..n).filter(|w| w % 2 != half).collect();

        // (partner, z, ln u) drawn in walker order before any evaluation
        let draws: Vec<(usize, f64, f64)> = active
            .iter()
            .map(|_| {
                let j = other[rng.random_range(0..other.len())];
                let u: f64 = rng.random();
                let z = ((a - 1.0) * u + 1.0).powi(2) / a;
                let ln_u = rng.random::<f64>().ln();
                (j, z, ln_u)
            })
            .collect();

        let proposals: Vec<Vec<f64>> = active
            .iter()
            .zip(&draws)
            .map(|(&k, &(j, z, _))| {
                e.pos[j]
                    .iter()
                    .zip(&e.pos[k])
                    .map(|(xj, xk)| xj + z * (xk - xj))
                    .collect()
            })
            .collect();

        let scored: Vec<(f64, f64)> = proposals.par_iter().map(|x| evaluate(target, x)).collect();

        for (((&k, &(_, z, ln_u)), x), (post, ll)) in active.iter().zip(&draws).zip(proposals).zip(scored) {
            if post == f64::NEG_INFINITY {
                continue;
            }
            let ln_q = (dim as f64 - 1.0) * z.ln() + post - e.log_post[k];
            if ln_u < ln_q {
                e.pos[k] = x;
                e.log_post[k] = post;
                e.log_like[k] = ll;
                accepted[k] = true;
            }
        }
    }
    accepted
}

// ---------------------------------------------------------------------------
// Autocorrelation and convergence diagnostics
// ---------------------------------------------------------------------------

/// Normalized autocorrelation function of a single series via FFT.
pub(crate) fn autocorr_function(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return vec![];
    }
    let m = mean(x);
    let size = 2 * n.next_power_of_two();
    let mut buf: Vec<Complex<f64>> = x.iter().map(|&v| Complex::new(v - m, 0.0)).collect();
    buf.resize(size, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(size).process(&mut buf);
    for c in buf.iter_mut() {
        *c = Complex::new(c.norm_sqr(), 0.0);
    }
    planner.plan_fft_inverse(size).process(&mut buf);

    let c0 = buf[0].re;
    if !(c0 > 0.0) {
        return vec![f64::NAN; n];
    }
    buf[..n].iter().map(|c| c.re / c0).collect()
}

fn auto_window(taus: &[f64], c: f64) -> usize {
    taus.iter()
        .enumerate()
        .position(|(i, &t)| (i as f64) >= c * t)
        .unwrap_or(taus.len().saturating_sub(1))
}

/// Integrated autocorrelation time of an ensemble series `[walker][step]`,
/// using the walker-averaged ACF and Sokal's adaptive window.
pub fn integrated_time(series: &[Vec<f64>]) -> f64 {
    let n = match series.first() {
        Some(s) if !s.is_empty() => s.len(),
        _ => return f64::NAN,
    };
    let mut f = vec![0.0; n];
    for s in series {
        let acf = autocorr_function(s);
        for (acc, v) in f.iter_mut().zip(acf) {
            *acc += v;
        }
    }
    let k = series.len() as f64;
    let mut taus = Vec::with_capacity(n);
    let mut cum = 0.0;
    for v in &f {
        cum += v / k;
        taus.push(2.0 * cum - 1.0);
    }
    if taus.iter().any(|t| !t.is_finite()) {
        return f64::NAN;
    }
    taus[auto_window(&taus, AUTOCORR_WINDOW)]
}

/// Gelman-Rubin potential scale reduction, each walker treated as a chain.
pub fn gelman_rubin(series: &[Vec<f64>]) -> f64 {
    let m = series.len();
    let n = series.first().map_or(0, Vec::len);
    if m < 2 || n < 2 {
        return f64::NAN;
    }
    let means: Vec<f64> = series.iter().map(|s| mean(s)).collect();
    let w = series
        .iter()
        .zip(&means)
        .map(|(s, mu)| s.iter().map(|v| (v - mu) * (v - mu)).sum::<f64>() / (n as f64 - 1.0))
        .sum::<f64>()
        / m as f64;
    let grand = mean(&means);
    let b_over_n = means.iter().map(|mu| (mu - grand) * (mu - grand)).sum::<f64>() / (m as f64 - 1.0);
    let nf = n as f64;
    let var_hat = (nf - 1.0) / nf * w + b_over_n;
    if !(w > 0.0) {
        return f64::NAN;
    }
    (var_hat / w).sqrt()
}

fn chain_taus(chain: &Chain, dim: usize, from: usize) -> Vec<f64> {
    (0..dim)
        .into_par_iter()
        .map(|p| integrated_time(&chain.series(p, from)))
        .collect()
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Run the ensemble sampler through burn-in and sampling.
///
/// All random numbers come from `rng` in a fixed order; walker proposals
/// are evaluated on the Rayon pool. The sampler keeps no state between
/// calls.
pub fn sample<P, R>(
    target: &P,
    init: Initialization,
    config: &SamplerConfig,
    rng: &mut R,
    stop: Option<&StopSignal>,
) -> GpResult<SamplingResult>
where
    P: Posterior,
    R: Rng + ?Sized,
{
    let dim = target.dim();
    config.validate(dim)?;
    let nw = config.n_walkers;

    let mut phase = SamplerPhase::Initialized;
    let mut ensemble = initialize(target, &init, nw, config.init_spread, rng)?;
    debug!(?phase, walkers = nw, dim, "walkers initialized");

    // ---- burn-in ----
    let mut recenters = 0;
    let mut burn_in_acceptance = None;
    let mut status = None;
    if config.burn_in > 0 {
        phase = SamplerPhase::BurnIn;
        loop {
            let mut accepts = vec![0usize; nw];
            let mut steps = 0;
            for _ in 0..config.burn_in {
                if stopped(stop) {
                    status = Some(SamplerStatus::Incomplete);
                    break;
                }
                for (a, ok) in accepts.iter_mut().zip(stretch_step(target, &mut ensemble, config.stretch_scale, rng)) {
                    *a += ok as usize;
                }
                steps += 1;
            }
            if status.is_some() {
                break;
            }
            let mut fractions: Vec<f64> = accepts.iter().map(|&a| a as f64 / steps as f64).collect();
            let acc = median(&mut fractions).unwrap_or(0.0);
            burn_in_acceptance = Some(acc);
            let (lo, hi) = config.acceptance_band;
            debug!(?phase, acceptance = acc, recenters, "burn-in finished");
            if acc >= lo && acc <= hi {
                break;
            }
            if recenters >= config.max_recenters {
                warn!(
                    acceptance = acc,
                    band = ?config.acceptance_band,
                    "burn-in acceptance outside band; chain flagged as stalled"
                );
                status = Some(SamplerStatus::Stalled(StallReason::AcceptanceOutOfBand));
                break;
            }
            let best = ensemble
                .log_post
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap_or(0);
            let center = ensemble.pos[best].clone();
            recenters += 1;
            info!(acceptance = acc, recenters, "re-centering walkers on best burn-in point");
            ensemble = initialize(
                target,
                &Initialization::Around(center),
                nw,
                config.init_spread,
                rng,
            )?;
        }
    }

    // ---- sampling ----
    let mut chain = Chain::new();
    let mut accepts = vec![0usize; nw];
    let mut autocorr_history = Vec::new();
    let mut old_tau: Option<Vec<f64>> = None;
    if status.is_none() {
        phase = SamplerPhase::Sampling;
        debug!(?phase, max_steps = config.max_steps, "sampling started");
        for step in 1..=config.max_steps {
            if stopped(stop) {
                info!(steps = chain.len(), "sampler cancelled");
                status = Some(SamplerStatus::Incomplete);
                break;
            }
            for (a, ok) in accepts.iter_mut().zip(stretch_step(target, &mut ensemble, config.stretch_scale, rng)) {
                *a += ok as usize;
            }
            chain.push(&ensemble);

            if step % config.check_interval != 0 {
                continue;
            }
            let tau = chain_taus(&chain, dim, 0);
            let mean_tau = mean(&tau);
            autocorr_history.push(mean_tau);
            let long_enough = tau
                .iter()
                .all(|t| t.is_finite() && t * config.convergence_multiple < step as f64);
            let stable = old_tau.as_ref().is_some_and(|old| {
                old.iter()
                    .zip(&tau)
                    .all(|(o, t)| ((o - t) / t).abs() < config.tau_rtol)
            });
            debug!(step, mean_tau, long_enough, stable, "autocorrelation check");
            if long_enough && stable {
                phase = SamplerPhase::Converged;
                status = Some(SamplerStatus::Converged);
                info!(?phase, step, mean_tau, "sampler converged");
                break;
            }
            old_tau = Some(tau);
        }
    }
    let status = match status {
        Some(s) => s,
        None => {
            phase = SamplerPhase::Stalled;
            warn!(
                ?phase,
                steps = chain.len(),
                "sampler hit max_steps before the autocorrelation criterion held"
            );
            SamplerStatus::Stalled(StallReason::NotConverged)
        }
    };

    finish(target, chain, accepts, status, burn_in_acceptance, autocorr_history, recenters, config)
}

#[allow(clippy::too_many_arguments)]
fn finish<P: Posterior>(
    target: &P,
    chain: Chain,
    accepts: Vec<usize>,
    status: SamplerStatus,
    burn_in_acceptance: Option<f64>,
    autocorr_history: Vec<f64>,
    recenters: usize,
    config: &SamplerConfig,
) -> GpResult<SamplingResult> {
    let dim = target.dim();
    let nw = config.n_walkers;
    let n_steps = chain.len();
    let discard = config.discard.min(n_steps);

    let autocorr_time = if n_steps - discard >= 2 {
        chain_taus(&chain, dim, discard)
    } else {
        vec![f64::NAN; dim]
    };
    let finite: Vec<f64> = autocorr_time.iter().copied().filter(|t| t.is_finite()).collect();
    let mean_tau = if finite.is_empty() { 1.0 } else { mean(&finite) };
    let thin = config.thin.unwrap_or_else(|| {
        let div = if status == SamplerStatus::Converged { 2.0 } else { 4.0 };
        ((mean_tau / div).floor() as usize).max(1)
    });

    let mut samples = Vec::new();
    let mut log_likelihood = Vec::new();
    let mut log_posterior = Vec::new();
    for s in (discard..n_steps).step_by(thin) {
        for w in 0..nw {
            samples.push(chain.pos[s][w].clone());
            log_likelihood.push(chain.log_like[s][w]);
            log_posterior.push(chain.log_post[s][w]);
        }
    }

    let chains = (0..nw)
        .map(|w| {
            (discard..n_steps)
                .map(|s| {
                    let (ll, lpost) = (chain.log_like[s][w], chain.log_post[s][w]);
                    PosteriorSample {
                        params: chain.pos[s][w].clone(),
                        log_likelihood: ll,
                        log_prior: if lpost.is_finite() { lpost - ll } else { f64::NEG_INFINITY },
                    }
                })
                .collect()
        })
        .collect();

    let kept = (n_steps - discard) as f64;
    let r_hat = (0..dim).map(|p| gelman_rubin(&chain.series(p, discard))).collect();
    let effective_sample_size = autocorr_time
        .iter()
        .map(|t| if t.is_finite() && *t > 0.0 { nw as f64 * kept / t } else { f64::NAN })
        .collect();
    let acceptance_fraction = accepts
        .iter()
        .map(|&a| if n_steps > 0 { a as f64 / n_steps as f64 } else { 0.0 })
        .collect();

    Ok(SamplingResult {
        parameter_names: target.parameter_names(),
        status,
        n_walkers: nw,
        n_steps,
        discard,
        thin,
        samples,
        log_likelihood,
        log_posterior,
        chains,
        acceptance_fraction,
        burn_in_acceptance,
        autocorr_time,
        autocorr_history,
        r_hat,
        effective_sample_size,
        recenters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_noise_has_unit_autocorrelation_time() {
        let mut state = 12345u64;
        let x: Vec<f64> = (0..4000)
            .map(|_| {
                state = crate::common::counter_rng_seed(state, 1);
                (state >> 11) as f64 / (1u64 << 53) as f64 - 0.5
            })
            .collect();
        let acf = autocorr_function(&x);
        assert!((acf[0] - 1.0).abs() < 1e-12);
        let tau = integrated_time(&[x]);
        assert!(tau > 0.7 && tau < 1.4, "tau = {tau}");
    }

    #[test]
    fn ar1_autocorrelation_time_matches_theory() {
        // AR(1) with coefficient rho has tau = (1 + rho) / (1 - rho) = 9
        let rho = 0.8;
        let mut state = 777u64;
        let mut series = Vec::new();
        for _ in 0..8 {
            let mut v = 0.0;
            let mut s = Vec::with_capacity(20_000);
            for _ in 0..20_000 {
                state = crate::common::counter_rng_seed(state, 1);
                let u = (state >> 11) as f64 / (1u64 << 53) as f64 - 0.5;
                v = rho * v + u;
                s.push(v);
            }
            series.push(s);
        }
        let tau = integrated_time(&series);
        assert!(tau > 7.5 && tau < 10.5, "tau = {tau}");
    }

    #[test]
    fn identical_chains_have_unit_r_hat() {
        let s: Vec<f64> = (0..200).map(|i| ((i * 37) % 101) as f64).collect();
        let r = gelman_rubin(&[s.clone(), s.clone(), s]);
        assert!((r - (199.0f64 / 200.0).sqrt()).abs() < 1e-12, "r_hat = {r}");
    }
}
