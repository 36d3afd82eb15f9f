use std::f64::consts::PI;

use rand::Rng;

use crate::error::SimResult;
use crate::random::Sampler;
use crate::structs::{Emitter, PathPoint};

/// Generates the full-lifetime 2D Brownian path of one emitter.
///
/// Each step has a radius `r ~ N(0, sqrt(4·D·dt))` in a uniformly random
/// direction, which gives a per-axis displacement variance of `2·D·dt`.
pub fn generate_path<R: Rng>(
    sampler: &mut Sampler<R>,
    emitter: &Emitter,
    acquisition_time_s: f64,
) -> SimResult<Vec<PathPoint>> {
    let sigma = (4.0 * emitter.diffusion_coefficient * acquisition_time_s).sqrt();
    let mut path = Vec::with_capacity(emitter.lifetime);
    if emitter.lifetime == 0 {
        return Ok(path);
    }

    let mut current = PathPoint {
        frame: emitter.activation_frame,
        x_um: emitter.x_um,
        y_um: emitter.y_um,
        step_um: 0.0,
    };
    path.push(current);

    for _ in 1..emitter.lifetime {
        let r = sampler.normal(0.0, sigma)?;
        let theta = sampler.uniform(0.0, 2.0 * PI)?;
        current = PathPoint {
            frame: current.frame + 1,
            x_um: current.x_um + r * theta.cos(),
            y_um: current.y_um + r * theta.sin(),
            step_um: r.abs(),
        };
        path.push(current);
    }
    Ok(path)
}
