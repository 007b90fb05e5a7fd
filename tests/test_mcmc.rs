mod synthetic;

use lightcurve_periodicity::common::{mean, variance};
use lightcurve_periodicity::{
    sample, GpError, Initialization, SamplerConfig, SamplerStatus, StallReason, StopSignal,
};
use rand::rngs::SmallRng;
use rand::SeedableRng;

fn short_run() -> SamplerConfig {
    SamplerConfig {
        n_walkers: 16,
        burn_in: 50,
        max_steps: 100,
        check_interval: 1000,
        discard: 10,
        thin: Some(3),
        ..SamplerConfig::default()
    }
}

// ---------------------------------------------------------------------------
// configuration
// ---------------------------------------------------------------------------

#[test]
fn walker_count_checked() {
    let target = synthetic::GaussianTarget::new(vec![0.0, 0.0], vec![1.0, 1.0]);
    let mut rng = SmallRng::seed_from_u64(1);
    let too_few = SamplerConfig {
        n_walkers: 3,
        ..short_run()
    };
    let odd = SamplerConfig {
        n_walkers: 15,
        ..short_run()
    };
    assert!(matches!(
        sample(&target, Initialization::FromPrior, &too_few, &mut rng, None),
        Err(GpError::Configuration(_))
    ));
    assert!(matches!(
        sample(&target, Initialization::FromPrior, &odd, &mut rng, None),
        Err(GpError::Configuration(_))
    ));
}

#[test]
fn initial_point_length_checked() {
    let target = synthetic::GaussianTarget::new(vec![0.0, 0.0], vec![1.0, 1.0]);
    let res = sample(
        &target,
        Initialization::Around(vec![0.0]),
        &short_run(),
        &mut SmallRng::seed_from_u64(2),
        None,
    );
    assert!(matches!(res, Err(GpError::Configuration(_))));
}

// ---------------------------------------------------------------------------
// bookkeeping
// ---------------------------------------------------------------------------

#[test]
fn discard_and_thin_shape_output() {
    let target = synthetic::GaussianTarget::new(vec![1.0, -1.0], vec![0.5, 2.0]);
    let res = sample(
        &target,
        Initialization::Around(vec![1.0, -1.0]),
        &short_run(),
        &mut SmallRng::seed_from_u64(3),
        None,
    )
    .unwrap();
    assert_eq!(res.status, SamplerStatus::Stalled(StallReason::NotConverged));
    assert_eq!(res.n_steps, 100);
    assert_eq!(res.thin, 3);
    // 16 walkers × ceil(90 / 3) steps
    assert_eq!(res.n_samples(), 480);
    assert_eq!(res.log_likelihood.len(), 480);
    assert_eq!(res.log_posterior.len(), 480);
    assert_eq!(res.acceptance_fraction.len(), 16);
    assert_eq!(res.dim(), 2);
    assert!(res.burn_in_acceptance.is_some());
    assert!(res.samples.iter().all(|s| s.len() == 2));
}

#[test]
fn chains_keep_walker_order_unthinned() {
    let target = synthetic::GaussianTarget::new(vec![1.0, -1.0], vec![0.5, 2.0]);
    let res = sample(
        &target,
        Initialization::Around(vec![1.0, -1.0]),
        &short_run(),
        &mut SmallRng::seed_from_u64(3),
        None,
    )
    .unwrap();
    assert_eq!(res.chains.len(), res.n_walkers);
    for (w, chain) in res.chains.iter().enumerate() {
        assert_eq!(chain.len(), res.n_steps - res.discard, "walker {w}");
        for (k, step) in chain.iter().step_by(res.thin).enumerate() {
            let flat = k * res.n_walkers + w;
            assert_eq!(step.params, res.samples[flat]);
            assert_eq!(step.log_likelihood, res.log_likelihood[flat]);
            assert!((step.log_posterior() - res.log_posterior[flat]).abs() < 1e-9);
            assert!(step.log_prior.is_finite());
        }
    }
}

#[test]
fn runs_are_reproducible() {
    let target = synthetic::GaussianTarget::new(vec![0.3, 0.1, -0.2], vec![1.0, 1.0, 1.0]);
    let a = sample(&target, Initialization::FromPrior, &short_run(), &mut SmallRng::seed_from_u64(4), None).unwrap();
    let b = sample(&target, Initialization::FromPrior, &short_run(), &mut SmallRng::seed_from_u64(4), None).unwrap();
    assert_eq!(a.samples, b.samples);
    assert_eq!(a.log_posterior, b.log_posterior);
}

#[test]
fn stop_signal_returns_incomplete() {
    let target = synthetic::GaussianTarget::new(vec![0.0, 0.0], vec![1.0, 1.0]);
    let stop = StopSignal::new();
    stop.stop();
    let res = sample(
        &target,
        Initialization::FromPrior,
        &short_run(),
        &mut SmallRng::seed_from_u64(5),
        Some(&stop),
    )
    .unwrap();
    assert_eq!(res.status, SamplerStatus::Incomplete);
    assert_eq!(res.n_samples(), 0);
}

#[test]
fn out_of_band_acceptance_stalls_after_recentering() {
    let target = synthetic::GaussianTarget::new(vec![0.0, 0.0], vec![1.0, 1.0]);
    let config = SamplerConfig {
        acceptance_band: (0.95, 1.0),
        ..short_run()
    };
    let res = sample(&target, Initialization::FromPrior, &config, &mut SmallRng::seed_from_u64(6), None).unwrap();
    assert_eq!(res.status, SamplerStatus::Stalled(StallReason::AcceptanceOutOfBand));
    assert_eq!(res.recenters, 1);
    assert_eq!(res.n_samples(), 0);
    assert!(res.burn_in_acceptance.unwrap() < 0.95);
}

// ---------------------------------------------------------------------------
// statistical behaviour
// ---------------------------------------------------------------------------

#[test]
fn acceptance_reasonable_in_eight_dimensions() {
    let target = synthetic::GaussianTarget::new(vec![0.0; 8], vec![1.0; 8]);
    let config = SamplerConfig {
        n_walkers: 32,
        burn_in: 200,
        max_steps: 400,
        check_interval: 1000,
        ..SamplerConfig::default()
    };
    let res = sample(
        &target,
        Initialization::Around(vec![0.0; 8]),
        &config,
        &mut SmallRng::seed_from_u64(7),
        None,
    )
    .unwrap();
    let acc = res.mean_acceptance();
    assert!((0.15..0.7).contains(&acc), "mean acceptance {acc}");
}

#[test]
fn converges_on_two_dimensional_gaussian() {
    let target = synthetic::GaussianTarget::new(vec![1.0, -2.0], vec![0.5, 1.5]);
    let config = SamplerConfig {
        n_walkers: 32,
        burn_in: 300,
        max_steps: 20_000,
        tau_rtol: 0.1,
        ..SamplerConfig::default()
    };
    let res = sample(
        &target,
        Initialization::Around(vec![0.5, -1.0]),
        &config,
        &mut SmallRng::seed_from_u64(8),
        None,
    )
    .unwrap();
    assert!(res.is_converged(), "status {:?}", res.status);
    assert!(!res.autocorr_history.is_empty());
    for (i, (&m, &s)) in target.mu.iter().zip(&target.sigma).enumerate() {
        let col = res.column(i);
        let mu_hat = mean(&col);
        let sd_hat = variance(&col).sqrt();
        assert!((mu_hat - m).abs() < 0.1 * s.max(1.0), "param {i}: mean {mu_hat} vs {m}");
        assert!((sd_hat / s - 1.0).abs() < 0.15, "param {i}: sd {sd_hat} vs {s}");
        assert!(res.r_hat[i] < 1.1, "param {i}: r_hat {}", res.r_hat[i]);
        assert!(res.effective_sample_size[i] > 100.0);
    }
    let median = res.median_params().unwrap();
    assert!((median[0] - 1.0).abs() < 0.1);
    assert!(res.max_likelihood_sample().is_some());
}
