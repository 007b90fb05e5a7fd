use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::common::counter_rng_seed;
use crate::error::GpResult;
use crate::kernels::CovarianceModel;
use crate::lightcurve::LightCurve;
use crate::optimize::{fit_model, Estimate, EstimatorConfig};

/// Cooperative cancellation flag shared between a caller and running work.
///
/// Work checks the flag between units (chain steps, replicates) and stops
/// early; results already collected are kept.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub(crate) fn stopped(stop: Option<&StopSignal>) -> bool {
    stop.is_some_and(StopSignal::is_stopped)
}

/// Result of a batch of independent, seeded replicates.
#[derive(Clone, Debug, Serialize)]
pub struct BatchOutcome<T> {
    /// Successful replicates as `(index, value)`, in index order.
    pub completed: Vec<(usize, T)>,
    /// Failed replicates as `(index, error message)`.
    pub failed: Vec<(usize, String)>,
    /// Replicates never started because the stop signal was raised.
    pub skipped: usize,
}

impl<T> BatchOutcome<T> {
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.completed.iter().map(|(_, v)| v)
    }

    pub fn was_cancelled(&self) -> bool {
        self.skipped > 0
    }
}

/// Run `n` replicates of `f` in parallel. Replicate `i` gets its own
/// `SmallRng` seeded from `(base_seed, i)`, so the outcome does not depend
/// on thread scheduling.
pub fn run_replicates<T, F>(n: usize, base_seed: u64, stop: Option<&StopSignal>, f: F) -> BatchOutcome<T>
where
    T: Send,
    F: Fn(usize, &mut SmallRng) -> GpResult<T> + Sync,
{
    let raw: Vec<(usize, Option<GpResult<T>>)> = (0..n)
        .into_par_iter()
        .map(|i| {
            if stopped(stop) {
                return (i, None);
            }
            let mut rng = SmallRng::seed_from_u64(counter_rng_seed(base_seed, i as u64));
            (i, Some(f(i, &mut rng)))
        })
        .collect();

    let mut outcome = BatchOutcome {
        completed: Vec::with_capacity(n),
        failed: Vec::new(),
        skipped: 0,
    };
    for (i, r) in raw {
        match r {
            Some(Ok(v)) => outcome.completed.push((i, v)),
            Some(Err(e)) => outcome.failed.push((i, e.to_string())),
            None => outcome.skipped += 1,
        }
    }
    if !outcome.failed.is_empty() {
        warn!(
            failed = outcome.failed.len(),
            total = n,
            "some replicates failed and were excluded"
        );
    }
    if outcome.skipped > 0 {
        info!(skipped = outcome.skipped, total = n, "replicate batch cancelled");
    }
    outcome
}

/// Fit one model family to many light curves in parallel.
///
/// `model_for` builds the model per light curve (presets scale their
/// bounds to the data). Light curves are processed independently via Rayon.
pub fn estimate_batch<M>(
    curves: &[LightCurve],
    model_for: M,
    config: &EstimatorConfig,
    base_seed: u64,
) -> Vec<GpResult<Estimate>>
where
    M: Fn(&LightCurve) -> GpResult<CovarianceModel> + Sync,
{
    curves
        .par_iter()
        .enumerate()
        .map(|(i, lc)| {
            let model = model_for(lc)?;
            let mut rng = SmallRng::seed_from_u64(counter_rng_seed(base_seed, i as u64));
            fit_model(lc, &model, config, &mut rng)
        })
        .collect()
}
