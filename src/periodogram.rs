use std::f64::consts::PI;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{GpError, GpResult};
use crate::lightcurve::LightCurve;

// ---------------------------------------------------------------------------
// Generalized Lomb-Scargle periodogram
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodogramConfig {
    /// Shortest period searched; defaults to twice the median cadence.
    pub min_period: Option<f64>,
    /// Longest period searched; defaults to half the baseline.
    pub max_period: Option<f64>,
    /// Grid points per `1/T` frequency resolution element.
    pub oversampling: f64,
    /// Cap on grid size; the spacing is widened to respect it.
    pub max_frequencies: usize,
}

impl Default for PeriodogramConfig {
    fn default() -> Self {
        Self {
            min_period: None,
            max_period: None,
            oversampling: 5.0,
            max_frequencies: 100_000,
        }
    }
}

impl PeriodogramConfig {
    pub fn with_band(min_period: f64, max_period: f64) -> Self {
        Self {
            min_period: Some(min_period),
            max_period: Some(max_period),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> GpResult<()> {
        if !(self.oversampling > 0.0) {
            return Err(GpError::config("periodogram oversampling must be positive"));
        }
        if self.max_frequencies < 2 {
            return Err(GpError::config("periodogram needs at least 2 frequencies"));
        }
        for p in [self.min_period, self.max_period].into_iter().flatten() {
            if !(p > 0.0 && p.is_finite()) {
                return Err(GpError::config(format!("periodogram periods must be positive, got {p}")));
            }
        }
        Ok(())
    }

    /// Resolved `(min_period, max_period)` for a light curve.
    pub fn period_band(&self, lc: &LightCurve) -> GpResult<(f64, f64)> {
        let lo = self.min_period.unwrap_or(2.0 * lc.median_cadence());
        let hi = self.max_period.unwrap_or(0.5 * lc.duration());
        if !(lo > 0.0 && lo < hi) {
            return Err(GpError::config(format!(
                "period band [{lo}, {hi}] is empty for this light curve"
            )));
        }
        Ok((lo, hi))
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Periodogram {
    pub frequencies: Vec<f64>,
    /// Normalized power in `[0, 1]`.
    pub power: Vec<f64>,
    pub peak_frequency: f64,
    pub peak_period: f64,
    pub peak_power: f64,
}

impl Periodogram {
    pub fn periods(&self) -> Vec<f64> {
        self.frequencies.iter().map(|f| 1.0 / f).collect()
    }

    /// Highest `(period, power)` with period inside `[min_period, max_period]`.
    pub fn peak_in_band(&self, min_period: f64, max_period: f64) -> Option<(f64, f64)> {
        self.frequencies
            .iter()
            .zip(&self.power)
            .map(|(f, p)| (1.0 / f, *p))
            .filter(|(period, _)| *period >= min_period && *period <= max_period)
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Evenly spaced frequency grid covering the configured period band.
pub fn frequency_grid(lc: &LightCurve, config: &PeriodogramConfig) -> GpResult<Vec<f64>> {
    config.validate()?;
    let (min_p, max_p) = config.period_band(lc)?;
    let f_lo = 1.0 / max_p;
    let f_hi = 1.0 / min_p;
    let mut df = 1.0 / (config.oversampling * lc.duration());
    let span = f_hi - f_lo;
    if span / df + 1.0 > config.max_frequencies as f64 {
        df = span / (config.max_frequencies - 1) as f64;
    }
    let n = (span / df).floor() as usize + 1;
    Ok((0..n).map(|i| f_lo + i as f64 * df).collect())
}

/// Floating-mean, error-weighted Lomb-Scargle periodogram evaluated
/// directly on the irregular time grid.
pub fn lomb_scargle(lc: &LightCurve, config: &PeriodogramConfig) -> GpResult<Periodogram> {
    let freqs = frequency_grid(lc, config)?;

    let inv_var: Vec<f64> = lc.errors().iter().map(|s| 1.0 / (s * s)).collect();
    let w_total: f64 = inv_var.iter().sum();
    let w: Vec<f64> = inv_var.iter().map(|v| v / w_total).collect();
    let y = lc.values();
    let y_bar: f64 = w.iter().zip(y).map(|(w, y)| w * y).sum();
    let yy: f64 = w.iter().zip(y).map(|(w, y)| w * (y - y_bar) * (y - y_bar)).sum();
    // y_bar carries rounding error, so a flat series leaves yy just above zero
    if lc.max_value() == lc.min_value() || !(yy > 1e-12 * (y_bar * y_bar).max(f64::MIN_POSITIVE)) {
        return Err(GpError::config("light curve is constant; periodogram undefined"));
    }

    let power: Vec<f64> = freqs
        .par_iter()
        .map(|&f| single_frequency_power(lc.times(), y, &w, y_bar, yy, 2.0 * PI * f))
        .collect();

    let (idx, peak_power) = power
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap_or((0, 0.0));
    let peak_frequency = freqs.get(idx).copied().unwrap_or(f64::NAN);

    Ok(Periodogram {
        peak_period: 1.0 / peak_frequency,
        peak_frequency,
        peak_power,
        frequencies: freqs,
        power,
    })
}

fn single_frequency_power(t: &[f64], y: &[f64], w: &[f64], y_bar: f64, yy: f64, omega: f64) -> f64 {
    let mut c = 0.0;
    let mut s = 0.0;
    let mut yc = 0.0;
    let mut ys = 0.0;
    let mut cc = 0.0;
    let mut ss = 0.0;
    let mut cs = 0.0;
    let t0 = t[0];
    for i in 0..t.len() {
        let (sn, cn) = (omega * (t[i] - t0)).sin_cos();
        let wi = w[i];
        let dy = y[i] - y_bar;
        c += wi * cn;
        s += wi * sn;
        yc += wi * dy * cn;
        ys += wi * dy * sn;
        cc += wi * cn * cn;
        ss += wi * sn * sn;
        cs += wi * cn * sn;
    }
    // residual sums are already centred on y_bar, so only the trig sums
    // need their weighted means removed
    let cc = cc - c * c;
    let ss = ss - s * s;
    let cs = cs - c * s;
    let d = cc * ss - cs * cs;
    if !(d > 0.0) {
        return 0.0;
    }
    let p = (ss * yc * yc + cc * ys * ys - 2.0 * cs * yc * ys) / (yy * d);
    p.clamp(0.0, 1.0)
}
