//! Synthetic light curve generator for tests.
//!
//! Draws irregular time grids and Gaussian-process light curves from known
//! covariance functions, independently of the crate's own simulator.

use lightcurve_periodicity::LightCurve;
use nalgebra::DMatrix;

/// Simple xorshift64 PRNG for reproducible tests.
pub struct Rng64 {
    state: u64,
}

impl Rng64 {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.max(1),
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform [0, 1)
    pub fn uniform(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / ((1u64 << 53) as f64)
    }

    /// Box-Muller normal(0, 1)
    pub fn normal(&mut self) -> f64 {
        let u1 = self.uniform().max(1e-15);
        let u2 = self.uniform();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

/// `n` sorted, strictly increasing times scattered over `[0, t_max]`.
pub fn irregular_times(n: usize, t_max: f64, seed: u64) -> Vec<f64> {
    let mut rng = Rng64::new(seed);
    let mut t: Vec<f64> = (0..n).map(|_| rng.uniform() * t_max).collect();
    t.sort_by(|a, b| a.total_cmp(b));
    for i in 1..n {
        if t[i] <= t[i - 1] {
            t[i] = t[i - 1] + 1e-6;
        }
    }
    t
}

/// Gaussian-process draw with covariance `k(|Δt|)` plus white noise `sigma`
/// around a constant `mean`.
pub fn gp_light_curve(
    times: &[f64],
    k: impl Fn(f64) -> f64,
    mean: f64,
    sigma: f64,
    seed: u64,
) -> LightCurve {
    let n = times.len();
    let mut cov = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            cov[(i, j)] = k((times[i] - times[j]).abs());
        }
        cov[(i, i)] += 1e-6;
    }
    let l = cov.cholesky().expect("synthetic covariance must be positive definite").unpack();
    let mut rng = Rng64::new(seed);
    let z: Vec<f64> = (0..n).map(|_| rng.normal()).collect();
    let values: Vec<f64> = (0..n)
        .map(|i| {
            let signal: f64 = (0..=i).map(|j| l[(i, j)] * z[j]).sum();
            mean + signal + sigma * rng.normal()
        })
        .collect();
    LightCurve::new(times.to_vec(), values, vec![sigma; n]).expect("valid synthetic light curve")
}

/// Damped-random-walk light curve: `k = a·exp(-τ/timescale)`.
pub fn red_noise_curve(n: usize, t_max: f64, a: f64, timescale: f64, sigma: f64, seed: u64) -> LightCurve {
    let times = irregular_times(n, t_max, seed);
    gp_light_curve(&times, |tau| a * (-tau / timescale).exp(), 10.0, sigma, seed.wrapping_add(1))
}

/// Quasi-periodic light curve: `k = a·exp(-τ²/2ℓ²)·exp(-Γ sin²(πτ/P))`.
pub fn quasi_periodic_curve(n: usize, t_max: f64, period: f64, sigma: f64, seed: u64) -> LightCurve {
    let times = irregular_times(n, t_max, seed);
    let length = 10.0 * period;
    gp_light_curve(
        &times,
        |tau| {
            let s = (std::f64::consts::PI * tau / period).sin();
            (-0.5 * tau * tau / (length * length) - 2.0 * s * s).exp()
        },
        10.0,
        sigma,
        seed.wrapping_add(1),
    )
}

/// Sinusoid plus white noise.
pub fn sine_curve(n: usize, t_max: f64, period: f64, amplitude: f64, sigma: f64, seed: u64) -> LightCurve {
    let times = irregular_times(n, t_max, seed);
    let mut rng = Rng64::new(seed.wrapping_add(7));
    let values = times
        .iter()
        .map(|t| 10.0 + amplitude * (2.0 * std::f64::consts::PI * t / period).sin() + sigma * rng.normal())
        .collect();
    LightCurve::new(times, values, vec![sigma; n]).expect("valid synthetic light curve")
}

/// Independent Gaussian log-likelihood inside a box, for exercising the
/// estimator and sampler without a GP.
pub struct GaussianTarget {
    pub mu: Vec<f64>,
    pub sigma: Vec<f64>,
    pub half_width: f64,
}

impl GaussianTarget {
    pub fn new(mu: Vec<f64>, sigma: Vec<f64>) -> Self {
        Self {
            mu,
            sigma,
            half_width: 10.0,
        }
    }
}

impl lightcurve_periodicity::Posterior for GaussianTarget {
    fn dim(&self) -> usize {
        self.mu.len()
    }

    fn parameter_names(&self) -> Vec<String> {
        (0..self.dim()).map(|i| format!("x{i}")).collect()
    }

    fn bounds(&self) -> Vec<(f64, f64)> {
        vec![(-self.half_width, self.half_width); self.dim()]
    }

    fn initial_values(&self) -> Vec<f64> {
        vec![0.0; self.dim()]
    }

    fn evaluate(&self, theta: &[f64]) -> (f64, f64) {
        if theta.iter().any(|x| x.abs() > self.half_width) {
            return (f64::NEG_INFINITY, f64::NEG_INFINITY);
        }
        let ll = theta
            .iter()
            .zip(&self.mu)
            .zip(&self.sigma)
            .map(|((x, m), s)| -0.5 * ((x - m) / s).powi(2))
            .sum();
        let lp = -(self.dim() as f64) * (2.0 * self.half_width).ln();
        (ll, lp)
    }

    fn draw_prior<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        (0..self.dim())
            .map(|_| rng.random_range(-self.half_width..self.half_width))
            .collect()
    }
}
