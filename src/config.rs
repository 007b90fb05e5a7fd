use serde::{Deserialize, Serialize};

use crate::comparison::Criterion;
use crate::error::{GpError, GpResult};
use crate::mcmc::SamplerConfig;
use crate::optimize::EstimatorConfig;
use crate::significance::SignificanceConfig;

/// Options for a full periodicity analysis. Every field has a default, so
/// a JSON document only needs the keys it wants to change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub seed: u64,
    /// Period band for the preset oscillator term; defaults follow the
    /// periodogram (twice the median cadence up to half the baseline).
    pub min_period: Option<f64>,
    pub max_period: Option<f64>,
    /// Sample both posteriors; otherwise evidence comes from point estimates.
    pub run_sampling: bool,
    pub criterion: Criterion,
    pub estimator: EstimatorConfig,
    pub sampler: SamplerConfig,
    pub significance: SignificanceConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            min_period: None,
            max_period: None,
            run_sampling: false,
            criterion: Criterion::Bic,
            estimator: EstimatorConfig::default(),
            sampler: SamplerConfig::default(),
            significance: SignificanceConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_str(s: &str) -> GpResult<Self> {
        let config: Self = serde_json::from_str(s)
            .map_err(|e| GpError::config(format!("invalid analysis config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> GpResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| GpError::config(format!("cannot serialize analysis config: {e}")))
    }

    pub fn validate(&self) -> GpResult<()> {
        if let (Some(lo), Some(hi)) = (self.min_period, self.max_period) {
            if !(lo > 0.0 && lo < hi) {
                return Err(GpError::config(format!(
                    "period band must satisfy 0 < min < max, got [{lo}, {hi}]"
                )));
            }
        }
        if self.criterion == Criterion::Dic && !self.run_sampling {
            return Err(GpError::config("DIC ranking requires run_sampling"));
        }
        self.estimator.validate()?;
        // walker count is checked against the real dimension at run time
        self.sampler.validate(1)?;
        self.significance.validate()
    }
}
