mod synthetic;

use lightcurve_periodicity::common::{mean, variance};
use lightcurve_periodicity::{
    simulate, simulate_batch, simulate_from_posterior, CovarianceModel, GpError, MeanModel, SamplerStatus,
    SamplingResult, SimulationOptions, StopSignal, Term,
};
use rand::rngs::SmallRng;
use rand::SeedableRng;

fn damped_model() -> CovarianceModel {
    CovarianceModel::new("red", Term::real("red", (0.0, -5.0, 5.0), (-2.0, -8.0, 3.0)).unwrap()).unwrap()
}

fn fake_posterior(samples: Vec<Vec<f64>>) -> SamplingResult {
    let n = samples.len();
    SamplingResult {
        parameter_names: vec!["red:log_a".into(), "red:log_c".into()],
        status: SamplerStatus::Converged,
        n_walkers: 4,
        n_steps: n / 4,
        discard: 0,
        thin: 1,
        samples,
        log_likelihood: vec![0.0; n],
        log_posterior: vec![0.0; n],
        chains: Vec::new(),
        acceptance_fraction: vec![0.4; 4],
        burn_in_acceptance: Some(0.4),
        autocorr_time: vec![1.0; 2],
        autocorr_history: vec![],
        r_hat: vec![1.0; 2],
        effective_sample_size: vec![n as f64; 2],
        recenters: 0,
    }
}

// ---------------------------------------------------------------------------
// single draws
// ---------------------------------------------------------------------------

#[test]
fn keeps_template_grid() {
    let template = synthetic::red_noise_curve(60, 100.0, 1.0, 5.0, 0.3, 1);
    let model = damped_model();
    let sim = simulate(
        &template,
        &model,
        &[0.0, -2.0],
        &SimulationOptions::default(),
        &mut SmallRng::seed_from_u64(2),
    )
    .unwrap();
    assert_eq!(sim.light_curve.times(), template.times());
    assert_eq!(sim.light_curve.errors(), template.errors());
    assert_ne!(sim.light_curve.values(), template.values());
    assert_eq!(sim.parameters, vec![0.0, -2.0]);
    assert_eq!(sim.model_name, "red");
}

#[test]
fn draws_are_seeded() {
    let template = synthetic::red_noise_curve(40, 80.0, 1.0, 5.0, 0.3, 3);
    let model = damped_model();
    let opts = SimulationOptions::default();
    let a = simulate(&template, &model, &[0.0, -2.0], &opts, &mut SmallRng::seed_from_u64(4)).unwrap();
    let b = simulate(&template, &model, &[0.0, -2.0], &opts, &mut SmallRng::seed_from_u64(4)).unwrap();
    let c = simulate(&template, &model, &[0.0, -2.0], &opts, &mut SmallRng::seed_from_u64(5)).unwrap();
    assert_eq!(a.light_curve, b.light_curve);
    assert_ne!(a.light_curve, c.light_curve);
}

#[test]
fn out_of_bounds_parameters_rejected() {
    let template = synthetic::red_noise_curve(20, 40.0, 1.0, 5.0, 0.3, 6);
    let res = simulate(
        &template,
        &damped_model(),
        &[0.0, 9.0],
        &SimulationOptions::default(),
        &mut SmallRng::seed_from_u64(7),
    );
    assert!(matches!(res, Err(GpError::Domain { .. })));
}

// ---------------------------------------------------------------------------
// ensemble statistics
// ---------------------------------------------------------------------------

#[test]
fn pointwise_moments_match_model() {
    let template = synthetic::red_noise_curve(30, 60.0, 1.0, 5.0, 0.5, 8);
    let model = damped_model()
        .with_mean(MeanModel::Fixed(3.0))
        .unwrap();
    let batch = simulate_batch(&template, &model, &[0.0, -2.0], 3000, 9, &SimulationOptions::default(), None).unwrap();
    assert_eq!(batch.completed.len(), 3000);
    for idx in [0, 15, 29] {
        let x: Vec<f64> = batch.values().map(|s| s.light_curve.values()[idx]).collect();
        let m = mean(&x);
        let v = variance(&x);
        // kernel variance a = 1 plus measurement noise 0.25
        assert!((m - 3.0).abs() < 0.1, "point {idx}: mean {m}");
        assert!((v - 1.25).abs() < 0.15, "point {idx}: variance {v}");
    }
}

#[test]
fn noise_and_mean_can_be_disabled() {
    let template = synthetic::red_noise_curve(30, 60.0, 1.0, 5.0, 0.5, 10);
    let model = damped_model().with_mean(MeanModel::Fixed(50.0)).unwrap();
    let opts = SimulationOptions {
        add_noise: false,
        add_mean: false,
        ..SimulationOptions::default()
    };
    let batch = simulate_batch(&template, &model, &[0.0, -2.0], 2000, 11, &opts, None).unwrap();
    let x: Vec<f64> = batch.values().map(|s| s.light_curve.values()[7]).collect();
    assert!(mean(&x).abs() < 0.1, "mean {}", mean(&x));
    assert!((variance(&x) - 1.0).abs() < 0.12, "variance {}", variance(&x));
}

// ---------------------------------------------------------------------------
// batches
// ---------------------------------------------------------------------------

#[test]
fn batch_is_reproducible_and_ordered() {
    let template = synthetic::red_noise_curve(25, 50.0, 1.0, 5.0, 0.3, 12);
    let model = damped_model();
    let opts = SimulationOptions::default();
    let a = simulate_batch(&template, &model, &[0.0, -2.0], 16, 13, &opts, None).unwrap();
    let b = simulate_batch(&template, &model, &[0.0, -2.0], 16, 13, &opts, None).unwrap();
    let idx: Vec<usize> = a.completed.iter().map(|(i, _)| *i).collect();
    assert_eq!(idx, (0..16).collect::<Vec<_>>());
    for ((_, x), (_, y)) in a.completed.iter().zip(&b.completed) {
        assert_eq!(x.light_curve, y.light_curve);
    }
    assert!(a.failed.is_empty());
    assert!(!a.was_cancelled());
}

#[test]
fn cancelled_batch_skips_work() {
    let template = synthetic::red_noise_curve(25, 50.0, 1.0, 5.0, 0.3, 14);
    let stop = StopSignal::new();
    stop.stop();
    let out = simulate_batch(
        &template,
        &damped_model(),
        &[0.0, -2.0],
        10,
        15,
        &SimulationOptions::default(),
        Some(&stop),
    )
    .unwrap();
    assert!(out.completed.is_empty());
    assert_eq!(out.skipped, 10);
    assert!(out.was_cancelled());
}

#[test]
fn posterior_draws_use_sample_parameters() {
    let template = synthetic::red_noise_curve(25, 50.0, 1.0, 5.0, 0.3, 16);
    let model = damped_model();
    let samples = vec![vec![0.0, -2.0], vec![-1.0, -1.0], vec![0.5, -3.0], vec![0.2, -2.2]];
    let posterior = fake_posterior(samples.clone());
    let out = simulate_from_posterior(&template, &model, &posterior, 20, 17, &SimulationOptions::default(), None)
        .unwrap();
    assert_eq!(out.completed.len(), 20);
    assert!(out.values().all(|s| samples.contains(&s.parameters)));
}

#[test]
fn posterior_must_match_model() {
    let template = synthetic::red_noise_curve(25, 50.0, 1.0, 5.0, 0.3, 18);
    let model = damped_model();
    let empty = fake_posterior(vec![]);
    let res = simulate_from_posterior(&template, &model, &empty, 5, 1, &SimulationOptions::default(), None);
    assert!(matches!(res, Err(GpError::Configuration(_))));

    let mut wrong = fake_posterior(vec![vec![0.0, -2.0, 1.0]]);
    wrong.parameter_names.push("extra".into());
    let res = simulate_from_posterior(&template, &model, &wrong, 5, 1, &SimulationOptions::default(), None);
    assert!(matches!(res, Err(GpError::Configuration(_))));
}
