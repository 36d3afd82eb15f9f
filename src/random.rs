use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Binomial, Distribution, Exp, Normal, Poisson};

use crate::error::{SimResult, SimulationError};

/// Domain-checked random variates used by every stochastic component.
///
/// Each draw validates its parameters first and returns a `Domain` error
/// instead of clamping, so a malformed rate never reaches the segmentation logic.
pub struct Sampler<R: Rng> {
    rng: R,
}

impl Sampler<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_os_rng())
    }
}

impl<R: Rng> Sampler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn binomial(&mut self, n: u64, p: f64) -> SimResult<u64> {
        if !(0.0..=1.0).contains(&p) {
            return Err(SimulationError::domain(
                "binomial",
                format!("probability must lie in [0, 1], got {p}"),
            ));
        }
        let dist = Binomial::new(n, p)
            .map_err(|e| SimulationError::domain("binomial", e.to_string()))?;
        Ok(dist.sample(&mut self.rng))
    }

    /// Uniform on `[lo, hi)`.
    pub fn uniform(&mut self, lo: f64, hi: f64) -> SimResult<f64> {
        if !lo.is_finite() || !hi.is_finite() || lo >= hi {
            return Err(SimulationError::domain(
                "uniform",
                format!("bounds must be finite with lo < hi, got [{lo}, {hi})"),
            ));
        }
        Ok(self.rng.random_range(lo..hi))
    }

    /// Exponential with the given mean. A zero mean always yields 0.
    pub fn exponential(&mut self, mean: f64) -> SimResult<f64> {
        if !mean.is_finite() || mean < 0.0 {
            return Err(SimulationError::domain(
                "exponential",
                format!("mean must be finite and >= 0, got {mean}"),
            ));
        }
        if mean == 0.0 {
            return Ok(0.0);
        }
        let dist = Exp::new(1.0 / mean)
            .map_err(|e| SimulationError::domain("exponential", e.to_string()))?;
        Ok(dist.sample(&mut self.rng))
    }

    /// Whole-frame duration: the mean is rounded to an integer number of frames
    /// before sampling and the draw is rounded back to frames.
    pub fn exponential_frames(&mut self, mean_frames: f64) -> SimResult<usize> {
        let draw = self.exponential(mean_frames.round())?;
        Ok(draw.round() as usize)
    }

    pub fn normal(&mut self, mean: f64, std: f64) -> SimResult<f64> {
        if !mean.is_finite() || !std.is_finite() || std < 0.0 {
            return Err(SimulationError::domain(
                "normal",
                format!("need finite mean and std >= 0, got mean={mean}, std={std}"),
            ));
        }
        let dist =
            Normal::new(mean, std).map_err(|e| SimulationError::domain("normal", e.to_string()))?;
        Ok(dist.sample(&mut self.rng))
    }

    pub fn poisson(&mut self, lambda: f64) -> SimResult<u64> {
        if !lambda.is_finite() || lambda < 0.0 {
            return Err(SimulationError::domain(
                "poisson",
                format!("rate must be finite and >= 0, got {lambda}"),
            ));
        }
        if lambda == 0.0 {
            return Ok(0);
        }
        let dist =
            Poisson::new(lambda).map_err(|e| SimulationError::domain("poisson", e.to_string()))?;
        let count: f64 = dist.sample(&mut self.rng);
        Ok(count as u64)
    }
}
