use lightcurve_periodicity::{
    compare_models, Criterion, GpError, ModelEvidence, SamplerStatus, SamplingResult,
};

fn evidence(name: &str, n_params: usize, ll: f64) -> ModelEvidence {
    ModelEvidence {
        model_name: name.into(),
        n_obs: 100,
        n_params,
        max_log_likelihood: ll,
        mean_log_likelihood: None,
        log_likelihood_variance: None,
    }
}

fn samples_with(log_likelihood: Vec<f64>) -> SamplingResult {
    let n = log_likelihood.len();
    SamplingResult {
        parameter_names: vec!["a".into(), "b".into()],
        status: SamplerStatus::Converged,
        n_walkers: n,
        n_steps: 1,
        discard: 0,
        thin: 1,
        samples: vec![vec![0.0, 0.0]; n],
        log_posterior: log_likelihood.clone(),
        chains: Vec::new(),
        log_likelihood,
        acceptance_fraction: vec![0.5; n],
        burn_in_acceptance: None,
        autocorr_time: vec![1.0; 2],
        autocorr_history: vec![],
        r_hat: vec![1.0; 2],
        effective_sample_size: vec![n as f64; 2],
        recenters: 0,
    }
}

// ---------------------------------------------------------------------------
// criteria
// ---------------------------------------------------------------------------

#[test]
fn aic_and_bic_formulas() {
    let e = evidence("m", 3, -50.0);
    assert!((e.aic() - 106.0).abs() < 1e-12);
    let expected_bic = 3.0 * 100f64.ln() + 100.0;
    assert!((e.bic() - expected_bic).abs() < 1e-12);
    assert!(e.dic().is_none());
    assert!(matches!(e.score(Criterion::Dic), Err(GpError::Configuration(_))));
}

#[test]
fn sample_evidence_ignores_non_finite() {
    let result = samples_with(vec![-10.0, -12.0, -11.0, f64::NEG_INFINITY]);
    let e = ModelEvidence::from_samples("m", &result, 100).unwrap();
    assert_eq!(e.n_params, 2);
    assert_eq!(e.max_log_likelihood, -10.0);
    assert!((e.mean_log_likelihood.unwrap() + 11.0).abs() < 1e-12);
    let var = 2.0 / 3.0;
    assert!((e.effective_params().unwrap() - 2.0 * var).abs() < 1e-12);
    assert!((e.dic().unwrap() - (22.0 + 4.0 * var)).abs() < 1e-12);

    let empty = samples_with(vec![f64::NEG_INFINITY; 3]);
    assert!(ModelEvidence::from_samples("m", &empty, 100).is_err());
}

// ---------------------------------------------------------------------------
// ranking
// ---------------------------------------------------------------------------

#[test]
fn ranks_lowest_score_first() {
    let models = [
        evidence("simple", 2, -60.0),
        evidence("complex", 5, -40.0),
        evidence("middle", 3, -55.0),
    ];
    let ranking = compare_models(&models, Criterion::Aic).unwrap();
    let order: Vec<&str> = ranking.ranked.iter().map(|m| m.model_name.as_str()).collect();
    assert_eq!(order, vec!["complex", "middle", "simple"]);
    assert_eq!(ranking.best().delta, 0.0);
    assert_eq!(ranking.rank_of("simple"), Some(2));
    let weights: f64 = ranking.ranked.iter().map(|m| m.weight).sum();
    assert!((weights - 1.0).abs() < 1e-12);
    assert!(ranking.ranked.windows(2).all(|w| w[0].weight >= w[1].weight));
}

#[test]
fn pairwise_differences_in_input_order() {
    let models = [evidence("a", 2, -60.0), evidence("b", 3, -50.0), evidence("c", 4, -49.0)];
    let ranking = compare_models(&models, Criterion::Bic).unwrap();
    assert_eq!(ranking.pairwise.len(), 3);
    let ab = &ranking.pairwise[0];
    assert_eq!((ab.first.as_str(), ab.second.as_str()), ("a", "b"));
    assert!((ab.difference - (models[0].bic() - models[1].bic())).abs() < 1e-12);
    assert!((ranking.difference("a", "b").unwrap() - ab.difference).abs() < 1e-12);
    assert!(ranking.difference("a", "nope").is_none());
}

#[test]
fn bic_penalizes_extra_parameters_more_than_aic() {
    let models = [evidence("small", 2, -50.0), evidence("large", 4, -47.5)];
    let aic = compare_models(&models, Criterion::Aic).unwrap();
    let bic = compare_models(&models, Criterion::Bic).unwrap();
    assert_eq!(aic.best().model_name, "large");
    assert_eq!(bic.best().model_name, "small");
}

#[test]
fn rejects_invalid_inputs() {
    assert!(matches!(
        compare_models(&[evidence("a", 1, 0.0)], Criterion::Aic),
        Err(GpError::Configuration(_))
    ));
    let mut other = evidence("b", 1, 0.0);
    other.n_obs = 50;
    assert!(matches!(
        compare_models(&[evidence("a", 1, 0.0), other], Criterion::Aic),
        Err(GpError::Configuration(_))
    ));
    assert!(compare_models(&[evidence("a", 1, 0.0), evidence("b", 1, 0.0)], Criterion::Dic).is_err());
}
