use rand::seq::index::sample;
use rand::Rng;
use serde::Serialize;

use crate::common::{mean, median, variance};
use crate::error::{GpError, GpResult};

/// Minimum number of points a light curve may hold.
pub const MIN_POINTS: usize = 2;

/// Slack on the exposure spacing check so equal-but-rounded spacings pass.
const EXPOSURE_SLACK: f64 = 1.01;

/// Immutable, validated `(time, value, uncertainty)` series.
///
/// Times are strictly increasing and uncertainties strictly positive; both
/// are checked once at construction so downstream code can rely on them.
///
/// Per-point exposure times and background rates are optional metadata
/// (zero when not given). They follow the points through every slicing
/// operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LightCurve {
    times: Vec<f64>,
    values: Vec<f64>,
    errors: Vec<f64>,
    exposures: Vec<f64>,
    bkg_rate: Vec<f64>,
    bkg_rate_err: Vec<f64>,
}

impl LightCurve {
    pub fn new(times: Vec<f64>, values: Vec<f64>, errors: Vec<f64>) -> GpResult<Self> {
        let n = times.len();
        if values.len() != n || errors.len() != n {
            return Err(GpError::config(format!(
                "times, values and errors must have equal length (got {}, {}, {})",
                n,
                values.len(),
                errors.len()
            )));
        }
        if n < MIN_POINTS {
            return Err(GpError::config(format!(
                "a light curve needs at least {MIN_POINTS} points, got {n}"
            )));
        }
        for i in 0..n {
            if !times[i].is_finite() || !values[i].is_finite() || !errors[i].is_finite() {
                return Err(GpError::config(format!("non-finite entry at index {i}")));
            }
            if errors[i] <= 0.0 {
                return Err(GpError::config(format!(
                    "uncertainty at index {i} must be strictly positive, got {}",
                    errors[i]
                )));
            }
            if i > 0 && times[i] <= times[i - 1] {
                return Err(GpError::config(format!(
                    "times must be strictly increasing (index {i}: {} after {})",
                    times[i],
                    times[i - 1]
                )));
            }
        }
        Ok(Self {
            exposures: vec![0.0; n],
            bkg_rate: vec![0.0; n],
            bkg_rate_err: vec![0.0; n],
            times,
            values,
            errors,
        })
    }

    /// Attach per-point exposure times. Consecutive timestamps must be at
    /// least half an exposure apart.
    pub fn with_exposures(mut self, exposures: Vec<f64>) -> GpResult<Self> {
        if exposures.len() != self.len() {
            return Err(GpError::config(format!(
                "exposures must match the light curve length (got {}, expected {})",
                exposures.len(),
                self.len()
            )));
        }
        if let Some(i) = exposures.iter().position(|e| !e.is_finite() || *e < 0.0) {
            return Err(GpError::config(format!(
                "exposure at index {i} must be finite and non-negative, got {}",
                exposures[i]
            )));
        }
        let overlapping = self
            .times
            .windows(2)
            .zip(&exposures)
            .filter(|(w, e)| w[1] - w[0] < *e * EXPOSURE_SLACK / 2.0)
            .count();
        if overlapping > 0 {
            return Err(GpError::config(format!(
                "{overlapping} timestamps are spaced below the exposure time"
            )));
        }
        self.exposures = exposures;
        Ok(self)
    }

    /// Same exposure time for every point.
    pub fn with_uniform_exposure(self, exposure: f64) -> GpResult<Self> {
        let n = self.len();
        self.with_exposures(vec![exposure; n])
    }

    /// Attach the background rate and its uncertainty for every point.
    pub fn with_background(mut self, rate: Vec<f64>, rate_err: Vec<f64>) -> GpResult<Self> {
        let n = self.len();
        if rate.len() != n || rate_err.len() != n {
            return Err(GpError::config(format!(
                "background rate and error must have {n} entries (got {}, {})",
                rate.len(),
                rate_err.len()
            )));
        }
        if let Some(i) = (0..n).find(|&i| !rate[i].is_finite() || !rate_err[i].is_finite() || rate_err[i] < 0.0) {
            return Err(GpError::config(format!(
                "background at index {i} must be finite with a non-negative error"
            )));
        }
        self.bkg_rate = rate;
        self.bkg_rate_err = rate_err;
        Ok(self)
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn errors(&self) -> &[f64] {
        &self.errors
    }

    pub fn exposures(&self) -> &[f64] {
        &self.exposures
    }

    pub fn bkg_rate(&self) -> &[f64] {
        &self.bkg_rate
    }

    pub fn bkg_rate_err(&self) -> &[f64] {
        &self.bkg_rate_err
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn t_min(&self) -> f64 {
        self.times[0]
    }

    pub fn t_max(&self) -> f64 {
        self.times[self.times.len() - 1]
    }

    pub fn duration(&self) -> f64 {
        self.t_max() - self.t_min()
    }

    pub fn mean(&self) -> f64 {
        mean(&self.values)
    }

    pub fn variance(&self) -> f64 {
        variance(&self.values)
    }

    pub fn min_value(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max_value(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Mean reported uncertainty.
    pub fn mean_uncertainty(&self) -> f64 {
        mean(&self.errors)
    }

    /// Consecutive sampling gaps.
    pub fn gaps(&self) -> Vec<f64> {
        self.times.windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn median_cadence(&self) -> f64 {
        let mut gaps = self.gaps();
        median(&mut gaps).unwrap_or(f64::NAN)
    }

    /// Coefficient of variation of the sampling gaps; zero for a uniform grid.
    pub fn irregularity(&self) -> f64 {
        let gaps = self.gaps();
        let m = mean(&gaps);
        if m <= 0.0 {
            return 0.0;
        }
        variance(&gaps).sqrt() / m
    }

    /// Same time grid, uncertainties and metadata, new values.
    pub fn with_values(&self, values: Vec<f64>) -> GpResult<Self> {
        let mut lc = Self::new(self.times.clone(), values, self.errors.clone())?;
        lc.exposures = self.exposures.clone();
        lc.bkg_rate = self.bkg_rate.clone();
        lc.bkg_rate_err = self.bkg_rate_err.clone();
        Ok(lc)
    }

    fn select(&self, keep: impl Fn(usize) -> bool) -> GpResult<Self> {
        let idx: Vec<usize> = (0..self.len()).filter(|&i| keep(i)).collect();
        let pick = |v: &[f64]| idx.iter().map(|&i| v[i]).collect::<Vec<f64>>();
        let mut lc = Self::new(pick(&self.times), pick(&self.values), pick(&self.errors))?;
        lc.exposures = pick(&self.exposures);
        lc.bkg_rate = pick(&self.bkg_rate);
        lc.bkg_rate_err = pick(&self.bkg_rate_err);
        Ok(lc)
    }

    /// Keep only observations with `tmin <= t <= tmax`.
    pub fn truncate(&self, tmin: f64, tmax: f64) -> GpResult<Self> {
        if tmin >= tmax {
            return Err(GpError::config(format!(
                "truncation window is empty: tmin ({tmin}) >= tmax ({tmax})"
            )));
        }
        if tmax < self.t_min() || tmin > self.t_max() {
            return Err(GpError::config(format!(
                "truncation window [{tmin}, {tmax}] does not overlap [{}, {}]",
                self.t_min(),
                self.t_max()
            )));
        }
        self.select(|i| self.times[i] >= tmin && self.times[i] <= tmax)
    }

    /// Split at every gap wider than `max_gap`. Segments with fewer than
    /// [`MIN_POINTS`] observations are dropped.
    pub fn split(&self, max_gap: f64) -> GpResult<Vec<Self>> {
        if !(max_gap > 0.0) {
            return Err(GpError::config(format!(
                "split interval must be positive, got {max_gap}"
            )));
        }
        let mut segments = Vec::new();
        let mut start = 0;
        for i in 1..=self.len() {
            let boundary = i == self.len() || self.times[i] - self.times[i - 1] > max_gap;
            if boundary {
                if i - start >= MIN_POINTS {
                    segments.push(Self {
                        times: self.times[start..i].to_vec(),
                        values: self.values[start..i].to_vec(),
                        errors: self.errors[start..i].to_vec(),
                        exposures: self.exposures[start..i].to_vec(),
                        bkg_rate: self.bkg_rate[start..i].to_vec(),
                        bkg_rate_err: self.bkg_rate_err[start..i].to_vec(),
                    });
                }
                start = i;
            }
        }
        Ok(segments)
    }

    /// Copy with `n_remove` randomly chosen observations dropped.
    pub fn remove_random<R: Rng + ?Sized>(&self, n_remove: usize, rng: &mut R) -> GpResult<Self> {
        if n_remove > self.len().saturating_sub(MIN_POINTS) {
            return Err(GpError::config(format!(
                "cannot remove {n_remove} of {} points and keep at least {MIN_POINTS}",
                self.len()
            )));
        }
        let mut mask = vec![true; self.len()];
        for idx in sample(rng, self.len(), n_remove) {
            mask[idx] = false;
        }
        self.select(|i| mask[i])
    }
}
