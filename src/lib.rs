pub mod analysis;
pub mod batch;
pub mod common;
pub mod comparison;
pub mod config;
pub mod error;
pub mod kernels;
pub mod lightcurve;
pub mod likelihood;
pub mod mcmc;
pub mod optimize;
pub mod periodogram;
pub mod significance;
pub mod simulate;
pub mod solver;

pub use analysis::{analyze_light_curve, analyze_periodicity, PeriodicityReport};
pub use batch::{estimate_batch, run_replicates, BatchOutcome, StopSignal};
pub use comparison::{compare_models, Criterion, ModelEvidence, ModelRanking};
pub use config::AnalysisConfig;
pub use error::{GpError, GpResult};
pub use kernels::{
    BoundKernel, BoundTerm, CeleriteCoefficients, CovarianceModel, Kernel, MeanModel, Parameter, Prior, Term,
    TermKind,
};
pub use lightcurve::LightCurve;
pub use likelihood::{LikelihoodEvaluator, Posterior};
pub use mcmc::{sample, Initialization, PosteriorSample, SamplerConfig, SamplerStatus, SamplingResult, StallReason};
pub use optimize::{estimate, fit_model, Estimate, EstimatorConfig, RestartOutcome};
pub use periodogram::{lomb_scargle, Periodogram, PeriodogramConfig};
pub use significance::{PeriodicityStatistic, SignificanceConfig, SignificanceEvaluator, SignificanceResult};
pub use simulate::{simulate, simulate_batch, simulate_from_posterior, SimulatedLightCurve, SimulationOptions};
pub use solver::{JitterPolicy, SolverStrategy};
