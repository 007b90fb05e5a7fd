use lightcurve_periodicity::{
    AnalysisConfig, Criterion, GpError, PeriodicityStatistic, PeriodogramConfig, SolverStrategy,
};

#[test]
fn empty_document_gives_defaults() {
    let config = AnalysisConfig::from_json_str("{}").unwrap();
    assert_eq!(config, AnalysisConfig::default());
    assert_eq!(config.seed, 42);
    assert_eq!(config.criterion, Criterion::Bic);
    assert_eq!(config.significance.n_simulations, 1000);
    assert_eq!(config.sampler.n_walkers, 32);
}

#[test]
fn partial_document_overrides_nested_fields() {
    let json = r#"{
        "seed": 7,
        "criterion": "aic",
        "estimator": { "n_restarts": 4, "solver": "dense" },
        "sampler": { "n_walkers": 64 },
        "significance": {
            "n_simulations": 200,
            "statistic": { "kind": "periodogram_peak", "min_period": 2.0, "max_period": 20.0 }
        }
    }"#;
    let config = AnalysisConfig::from_json_str(json).unwrap();
    assert_eq!(config.seed, 7);
    assert_eq!(config.criterion, Criterion::Aic);
    assert_eq!(config.estimator.n_restarts, 4);
    assert_eq!(config.estimator.solver, SolverStrategy::Dense);
    assert_eq!(config.estimator.max_iters, 3000);
    assert_eq!(config.sampler.n_walkers, 64);
    assert_eq!(config.sampler.burn_in, 500);
    assert_eq!(config.significance.n_simulations, 200);
    match &config.significance.statistic {
        PeriodicityStatistic::PeriodogramPeak(pg) => {
            assert_eq!(pg.min_period, Some(2.0));
            assert_eq!(pg.max_period, Some(20.0));
            assert_eq!(pg.oversampling, PeriodogramConfig::default().oversampling);
        }
        other => panic!("unexpected statistic {other:?}"),
    }
}

#[test]
fn json_round_trip() {
    let mut config = AnalysisConfig::default();
    config.min_period = Some(3.0);
    config.max_period = Some(30.0);
    config.run_sampling = true;
    config.criterion = Criterion::Dic;
    config.sampler.thin = Some(5);
    let back = AnalysisConfig::from_json_str(&config.to_json_string().unwrap()).unwrap();
    assert_eq!(back, config);
}

#[test]
fn invalid_documents_rejected() {
    let cases = [
        r#"{ "seed": "x" }"#,
        r#"{ "min_period": 10.0, "max_period": 5.0 }"#,
        r#"{ "criterion": "dic" }"#,
        r#"{ "sampler": { "n_walkers": 3 } }"#,
        r#"{ "significance": { "n_simulations": 0 } }"#,
        r#"{ "significance": { "significance_target": 1.5 } }"#,
        r#"{ "estimator": { "n_restarts": 0 } }"#,
        "not json",
    ];
    for case in cases {
        assert!(
            matches!(AnalysisConfig::from_json_str(case), Err(GpError::Configuration(_))),
            "accepted {case}"
        );
    }
}
