mod synthetic;

use lightcurve_periodicity::{
    estimate_batch, run_replicates, CovarianceModel, EstimatorConfig, GpError, GpResult, StopSignal,
};
use rand::rngs::SmallRng;
use rand::Rng;

#[test]
fn replicates_seeded_by_index() {
    let draw = |_: usize, rng: &mut SmallRng| -> GpResult<u64> { Ok(rng.random()) };
    let a = run_replicates(64, 99, None, draw);
    let b = run_replicates(64, 99, None, draw);
    let c = run_replicates(64, 100, None, draw);
    assert_eq!(a.completed, b.completed);
    assert_ne!(a.completed, c.completed);
    let idx: Vec<usize> = a.completed.iter().map(|(i, _)| *i).collect();
    assert_eq!(idx, (0..64).collect::<Vec<_>>());
}

#[test]
fn failures_are_collected_not_fatal() {
    let out = run_replicates(10, 1, None, |i, _| {
        if i % 3 == 0 {
            Err(GpError::Convergence(format!("replicate {i}")))
        } else {
            Ok(i * 2)
        }
    });
    assert_eq!(out.completed.len(), 6);
    let failed: Vec<usize> = out.failed.iter().map(|(i, _)| *i).collect();
    assert_eq!(failed, vec![0, 3, 6, 9]);
    assert!(out.failed[0].1.contains("replicate 0"));
    assert_eq!(out.values().copied().collect::<Vec<_>>(), vec![2, 4, 8, 10, 14, 16]);
}

#[test]
fn stop_signal_skips_remaining() {
    let stop = StopSignal::new();
    assert!(!stop.is_stopped());
    let handle = stop.clone();
    handle.stop();
    assert!(stop.is_stopped());
    let out = run_replicates(8, 1, Some(&stop), |i, _| Ok(i));
    assert_eq!(out.skipped, 8);
    assert!(out.completed.is_empty());
}

#[test]
fn fits_many_curves() {
    let curves: Vec<_> = (0..4)
        .map(|s| synthetic::red_noise_curve(60, 120.0, 1.0, 6.0, 0.2, 30 + s))
        .collect();
    let config = EstimatorConfig {
        n_restarts: 3,
        ..EstimatorConfig::default()
    };
    let results = estimate_batch(&curves, CovarianceModel::red_noise, &config, 5);
    assert_eq!(results.len(), 4);
    for r in &results {
        let est = r.as_ref().unwrap();
        assert!(est.log_likelihood.is_finite());
        assert_eq!(est.params.len(), 2);
    }
    let again = estimate_batch(&curves, CovarianceModel::red_noise, &config, 5);
    for (a, b) in results.iter().zip(&again) {
        assert_eq!(a.as_ref().unwrap().params, b.as_ref().unwrap().params);
    }
}
