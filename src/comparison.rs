use serde::{Deserialize, Serialize};

use crate::common::{mean, variance};
use crate::error::{GpError, GpResult};
use crate::mcmc::SamplingResult;
use crate::optimize::Estimate;

/// Information criterion used to rank models; lower is better.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    Aic,
    #[default]
    Bic,
    /// Needs posterior samples.
    Dic,
}

/// Likelihood summary of one model fitted to one light curve.
#[derive(Clone, Debug, Serialize)]
pub struct ModelEvidence {
    pub model_name: String,
    pub n_obs: usize,
    pub n_params: usize,
    pub max_log_likelihood: f64,
    /// Posterior mean of the log-likelihood; sample-based evidence only.
    pub mean_log_likelihood: Option<f64>,
    pub log_likelihood_variance: Option<f64>,
}

impl ModelEvidence {
    pub fn from_estimate(model_name: impl Into<String>, estimate: &Estimate, n_obs: usize) -> Self {
        Self {
            model_name: model_name.into(),
            n_obs,
            n_params: estimate.params.len(),
            max_log_likelihood: estimate.log_likelihood,
            mean_log_likelihood: None,
            log_likelihood_variance: None,
        }
    }

    pub fn from_samples(
        model_name: impl Into<String>,
        result: &SamplingResult,
        n_obs: usize,
    ) -> GpResult<Self> {
        let ll: Vec<f64> = result
            .log_likelihood
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        let model_name = model_name.into();
        if ll.is_empty() {
            return Err(GpError::config(format!(
                "no finite posterior samples for model `{model_name}`"
            )));
        }
        Ok(Self {
            model_name,
            n_obs,
            n_params: result.dim(),
            max_log_likelihood: ll.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean_log_likelihood: Some(mean(&ll)),
            log_likelihood_variance: Some(variance(&ll)),
        })
    }

    pub fn aic(&self) -> f64 {
        2.0 * self.n_params as f64 - 2.0 * self.max_log_likelihood
    }

    pub fn bic(&self) -> f64 {
        self.n_params as f64 * (self.n_obs as f64).ln() - 2.0 * self.max_log_likelihood
    }

    /// Effective parameter count `p_V = 2·Var(ℓ)`.
    pub fn effective_params(&self) -> Option<f64> {
        self.log_likelihood_variance.map(|v| 2.0 * v)
    }

    pub fn dic(&self) -> Option<f64> {
        Some(-2.0 * self.mean_log_likelihood? + 2.0 * self.effective_params()?)
    }

    pub fn score(&self, criterion: Criterion) -> GpResult<f64> {
        match criterion {
            Criterion::Aic => Ok(self.aic()),
            Criterion::Bic => Ok(self.bic()),
            Criterion::Dic => self.dic().ok_or_else(|| {
                GpError::config(format!(
                    "DIC for `{}` needs posterior samples",
                    self.model_name
                ))
            }),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RankedModel {
    pub model_name: String,
    pub score: f64,
    /// Score minus the best score.
    pub delta: f64,
    /// `exp(-delta/2)`, normalized over all models.
    pub weight: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct PairwiseDifference {
    pub first: String,
    pub second: String,
    /// `score(first) - score(second)`; negative favours `first`.
    pub difference: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ModelRanking {
    pub criterion: Criterion,
    /// Best model first.
    pub ranked: Vec<RankedModel>,
    /// Every pair in input order.
    pub pairwise: Vec<PairwiseDifference>,
}

impl ModelRanking {
    pub fn best(&self) -> &RankedModel {
        &self.ranked[0]
    }

    pub fn rank_of(&self, model_name: &str) -> Option<usize> {
        self.ranked.iter().position(|m| m.model_name == model_name)
    }

    pub fn difference(&self, first: &str, second: &str) -> Option<f64> {
        let score = |name: &str| self.ranked.iter().find(|m| m.model_name == name).map(|m| m.score);
        Some(score(first)? - score(second)?)
    }
}

/// Rank models fitted to the same light curve. Ranking only; deciding
/// whether a periodic feature is real is the significance test's job.
pub fn compare_models(evidence: &[ModelEvidence], criterion: Criterion) -> GpResult<ModelRanking> {
    if evidence.len() < 2 {
        return Err(GpError::config("model comparison needs at least two models"));
    }
    let n_obs = evidence[0].n_obs;
    if let Some(e) = evidence.iter().find(|e| e.n_obs != n_obs) {
        return Err(GpError::config(format!(
            "model `{}` was fitted to {} observations, `{}` to {n_obs}",
            e.model_name, e.n_obs, evidence[0].model_name
        )));
    }

    let scores: Vec<f64> = evidence
        .iter()
        .map(|e| e.score(criterion))
        .collect::<GpResult<_>>()?;

    let mut pairwise = Vec::new();
    for i in 0..evidence.len() {
        for j in i + 1..evidence.len() {
            pairwise.push(PairwiseDifference {
                first: evidence[i].model_name.clone(),
                second: evidence[j].model_name.clone(),
                difference: scores[i] - scores[j],
            });
        }
    }

    let mut order: Vec<usize> = (0..evidence.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));
    let best = scores[order[0]];
    let raw: Vec<f64> = order.iter().map(|&i| (-0.5 * (scores[i] - best)).exp()).collect();
    let total: f64 = raw.iter().sum();
    let ranked = order
        .iter()
        .zip(raw)
        .map(|(&i, w)| RankedModel {
            model_name: evidence[i].model_name.clone(),
            score: scores[i],
            delta: scores[i] - best,
            weight: if total > 0.0 { w / total } else { f64::NAN },
        })
        .collect();

    Ok(ModelRanking {
        criterion,
        ranked,
        pairwise,
    })
}
