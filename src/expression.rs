//! Probability expressions attached to basic events.
//!
//! An expression is a pure function of the mission time `t`, plus an
//! optional sample draw for the epistemic distributions used by the
//! uncertainty analysis. `value` gives the deterministic point estimate
//! (the mean for the deviate expressions); `sample` draws from the
//! distribution with a caller-supplied RNG so runs stay reproducible.

use rand::Rng;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Fixed probability, time-independent.
    Constant(f64),
    /// Unavailability of a non-repairable component: `1 - exp(-lambda * t)`.
    Exponential { lambda: f64 },
    /// Four-parameter exponential with dormancy and repair:
    /// `(lambda - (lambda - gamma * (lambda + mu)) * exp(-(lambda + mu) * t)) / (lambda + mu)`.
    Glm { gamma: f64, lambda: f64, mu: f64 },
    /// Weibull life distribution: `1 - exp(-(t / scale)^shape)`.
    Weibull { shape: f64, scale: f64 },
    /// Epistemic uniform on `[min, max]`.
    Uniform { min: f64, max: f64 },
    /// Epistemic normal; point value is the mean.
    Normal { mean: f64, sigma: f64 },
    /// Epistemic log-normal with parameters of the underlying normal.
    Lognormal { mu: f64, sigma: f64 },
    /// Piecewise-uniform epistemic histogram.
    ///
    /// `boundaries` has one more element than `weights`.
    Histogram { boundaries: Vec<f64>, weights: Vec<f64> },
    /// A base expression scaled by a constant in [0, 1].
    ///
    /// Produced by common-cause expansion, which splits a group's total
    /// failure probability across the generated events.
    Scaled { factor: f64, base: Box<Expression> },
}

impl Expression {
    /// Checks parameter sanity once, at model load time.
    pub fn validate(&self) -> Result<()> {
        match self {
            Expression::Constant(p) => {
                if !(0.0..=1.0).contains(p) {
                    return Err(Error::validity(format!("constant probability {p} outside [0, 1]")));
                }
            }
            Expression::Exponential { lambda } => {
                if *lambda < 0.0 || !lambda.is_finite() {
                    return Err(Error::validity(format!("negative failure rate {lambda}")));
                }
            }
            Expression::Glm { gamma, lambda, mu } => {
                if !(0.0..=1.0).contains(gamma) {
                    return Err(Error::validity(format!("dormant fraction {gamma} outside [0, 1]")));
                }
                if *lambda < 0.0 || *mu < 0.0 || lambda + mu <= 0.0 {
                    return Err(Error::validity("GLM rates must be non-negative with lambda + mu > 0"));
                }
            }
            Expression::Weibull { shape, scale } => {
                if *shape <= 0.0 || *scale <= 0.0 {
                    return Err(Error::validity("Weibull shape and scale must be positive"));
                }
            }
            Expression::Uniform { min, max } => {
                if min >= max {
                    return Err(Error::validity(format!("uniform bounds [{min}, {max}] are empty")));
                }
            }
            Expression::Normal { sigma, .. } | Expression::Lognormal { sigma, .. } => {
                if *sigma <= 0.0 {
                    return Err(Error::validity(format!("non-positive deviation {sigma}")));
                }
            }
            Expression::Histogram { boundaries, weights } => {
                if boundaries.len() != weights.len() + 1 {
                    return Err(Error::validity("histogram boundary/weight arity mismatch"));
                }
                if !boundaries.windows(2).all(|w| w[0] < w[1]) {
                    return Err(Error::validity("histogram boundaries must be strictly increasing"));
                }
                if weights.iter().any(|&w| w < 0.0) || weights.iter().sum::<f64>() <= 0.0 {
                    return Err(Error::validity("histogram weights must be non-negative and not all zero"));
                }
            }
            Expression::Scaled { factor, base } => {
                if !(0.0..=1.0).contains(factor) {
                    return Err(Error::validity(format!("scale factor {factor} outside [0, 1]")));
                }
                base.validate()?;
            }
        }
        Ok(())
    }

    /// Deterministic point value at mission time `t`.
    pub fn value(&self, t: f64) -> f64 {
        match self {
            Expression::Constant(p) => *p,
            Expression::Exponential { lambda } => 1.0 - (-lambda * t).exp(),
            Expression::Glm { gamma, lambda, mu } => {
                let rate = lambda + mu;
                (lambda - (lambda - gamma * rate) * (-rate * t).exp()) / rate
            }
            Expression::Weibull { shape, scale } => 1.0 - (-(t / scale).powf(*shape)).exp(),
            Expression::Uniform { min, max } => (min + max) / 2.0,
            Expression::Normal { mean, .. } => *mean,
            Expression::Lognormal { mu, sigma } => (mu + sigma * sigma / 2.0).exp(),
            Expression::Histogram { boundaries, weights } => {
                let total: f64 = weights.iter().sum();
                let mean: f64 = weights
                    .iter()
                    .zip(boundaries.windows(2))
                    .map(|(w, b)| w * (b[0] + b[1]) / 2.0)
                    .sum();
                mean / total
            }
            Expression::Scaled { factor, base } => factor * base.value(t),
        }
    }

    /// Whether `value` actually depends on `t`.
    pub fn is_time_dependent(&self) -> bool {
        match self {
            Expression::Exponential { .. } | Expression::Glm { .. } | Expression::Weibull { .. } => {
                true
            }
            Expression::Scaled { base, .. } => base.is_time_dependent(),
            _ => false,
        }
    }

    /// One draw from the distribution at mission time `t`.
    ///
    /// The time-dependent expressions have no epistemic spread and return
    /// their point value; the deviate expressions draw and clamp into
    /// [0, 1], since they model a probability.
    pub fn sample(&self, t: f64, rng: &mut impl Rng) -> f64 {
        let raw = match self {
            Expression::Uniform { min, max } => rng.gen_range(*min..*max),
            Expression::Normal { mean, sigma } => mean + sigma * standard_normal(rng),
            Expression::Lognormal { mu, sigma } => (mu + sigma * standard_normal(rng)).exp(),
            Expression::Histogram { boundaries, weights } => {
                let total: f64 = weights.iter().sum();
                let mut pick = rng.gen::<f64>() * total;
                let mut bin = weights.len() - 1;
                for (i, w) in weights.iter().enumerate() {
                    if pick < *w {
                        bin = i;
                        break;
                    }
                    pick -= w;
                }
                rng.gen_range(boundaries[bin]..boundaries[bin + 1])
            }
            Expression::Scaled { factor, base } => factor * base.sample(t, rng),
            _ => return self.value(t),
        };
        raw.clamp(0.0, 1.0)
    }
}

/// Box-Muller transform over the uniform draws `rand` provides.
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}
