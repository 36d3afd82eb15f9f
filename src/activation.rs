use log::debug;
use rand::Rng;

use crate::error::SimResult;
use crate::random::Sampler;
use crate::structs::{Emitter, Population, PopulationMix, SimulationParams};

/// The finite pool of not-yet-activated emitters.
///
/// Owned by the driver and handed to the scheduler by `&mut` each frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmitterPool {
    remaining: usize,
    activated: usize,
}

impl EmitterPool {
    pub fn new(size: usize) -> Self {
        Self {
            remaining: size,
            activated: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn activated(&self) -> usize {
        self.activated
    }

    fn take(&mut self, n: usize) -> usize {
        let n = n.min(self.remaining);
        self.remaining -= n;
        self.activated += n;
        n
    }
}

/// Per-frame photo-activation of emitters from the shared pool.
pub struct ActivationScheduler {
    mean_activation: f64,
    image_size_px: f64,
    pixel_size_um: f64,
    mean_lifetime_frames: f64,
    mix: PopulationMix,
}

impl ActivationScheduler {
    pub fn new(params: &SimulationParams) -> Self {
        Self {
            mean_activation: params.mean_activation,
            image_size_px: params.image_size_px as f64,
            pixel_size_um: params.pixel_size_um,
            mean_lifetime_frames: params.to_frames(params.mean_bleaching_time_s),
            mix: params.population_mix(),
        }
    }

    /// Draws how many emitters switch on at `frame` and creates them.
    pub fn activate<R: Rng>(
        &self,
        frame: usize,
        pool: &mut EmitterPool,
        sampler: &mut Sampler<R>,
    ) -> SimResult<Vec<Emitter>> {
        let remaining = pool.remaining();
        if remaining == 0 {
            return Ok(Vec::new());
        }
        let ratio = self.mean_activation / remaining as f64;
        // Once fewer emitters remain than the expected arrivals, every one of them activates.
        let p = if ratio > 1.0 {
            debug!(
                "frame {frame}: activation probability {ratio:.3} clamped to 1 ({remaining} left)"
            );
            1.0
        } else {
            ratio
        };
        let drawn = sampler.binomial(remaining as u64, p)? as usize;
        let n = pool.take(drawn);
        if n > 0 {
            debug!("frame {frame}: {n} activations, {} left in pool", pool.remaining());
        }

        let first_id = pool.activated() - n;
        let mut emitters = Vec::with_capacity(n);
        for k in 0..n {
            emitters.push(self.new_emitter(first_id + k, frame, sampler)?);
        }
        Ok(emitters)
    }

    fn new_emitter<R: Rng>(
        &self,
        id: usize,
        frame: usize,
        sampler: &mut Sampler<R>,
    ) -> SimResult<Emitter> {
        let x_px = sampler.uniform(0.0, self.image_size_px)?;
        let y_px = sampler.uniform(0.0, self.image_size_px)?;
        let population = if sampler.binomial(1, self.mix.ratio)? == 1 {
            Population::One
        } else {
            Population::Two
        };
        // An activated emitter is present for at least its activation frame.
        let lifetime = sampler.exponential_frames(self.mean_lifetime_frames)?.max(1);

        Ok(Emitter {
            id,
            activation_frame: frame,
            x_um: x_px * self.pixel_size_um,
            y_um: y_px * self.pixel_size_um,
            population,
            lifetime,
            diffusion_coefficient: self.mix.diffusion_coefficient(population),
        })
    }
}
