use serde::{Deserialize, Serialize};

use crate::error::{SimResult, SimulationError};

/// Acquisition, photophysics and mobility parameters of one simulated SPT experiment.
///
/// Times are in seconds, lengths in µm, diffusion coefficients in µm²/s.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    pub pixel_size_um: f64,
    pub acquisition_time_s: f64,
    pub n_emitters_init: usize,
    /// Expected number of activations per frame.
    pub mean_activation: f64,
    pub mean_bleaching_time_s: f64,
    pub mean_photons: f64,
    pub ton_s: f64,
    pub toff1_s: f64,
    pub toff2_s: f64,
    /// Consecutive missed frames tolerated inside one trajectory.
    pub max_blink: usize,
    pub min_traj_length: usize,
    pub image_size_px: usize,
    pub diff1: f64,
    pub diff2: f64,
    /// Probability that an emitter belongs to population 1.
    pub population_ratio: f64,
    pub n_frames: usize,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            pixel_size_um: 0.16,
            acquisition_time_s: 0.02,
            n_emitters_init: 500,
            mean_activation: 0.5,
            mean_bleaching_time_s: 1.0,
            mean_photons: 200.0,
            ton_s: 0.5,
            toff1_s: 0.04,
            toff2_s: 1.0,
            max_blink: 2,
            min_traj_length: 5,
            image_size_px: 128,
            diff1: 0.1,
            diff2: 0.0,
            population_ratio: 1.0,
            n_frames: 500,
        }
    }
}

impl SimulationParams {
    pub fn validate(&self) -> SimResult<()> {
        let positive = [
            ("pixel_size_um", self.pixel_size_um),
            ("acquisition_time_s", self.acquisition_time_s),
            ("mean_activation", self.mean_activation),
            ("mean_bleaching_time_s", self.mean_bleaching_time_s),
            ("mean_photons", self.mean_photons),
            ("ton_s", self.ton_s),
            ("toff1_s", self.toff1_s),
            ("toff2_s", self.toff2_s),
            ("diff1", self.diff1),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(SimulationError::config(
                    field,
                    format!("must be a finite value > 0, got {value}"),
                ));
            }
        }
        if !self.diff2.is_finite() || self.diff2 < 0.0 {
            return Err(SimulationError::config(
                "diff2",
                format!("must be a finite value >= 0, got {}", self.diff2),
            ));
        }
        if !(0.0..=1.0).contains(&self.population_ratio) {
            return Err(SimulationError::config(
                "population_ratio",
                format!("must lie in [0, 1], got {}", self.population_ratio),
            ));
        }
        let counts = [
            ("n_emitters_init", self.n_emitters_init),
            ("min_traj_length", self.min_traj_length),
            ("image_size_px", self.image_size_px),
            ("n_frames", self.n_frames),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(SimulationError::config(field, "must be at least 1"));
            }
        }
        Ok(())
    }

    pub fn population_mix(&self) -> PopulationMix {
        PopulationMix {
            diff1: self.diff1,
            diff2: self.diff2,
            ratio: self.population_ratio,
        }
    }

    pub fn set_population_mix(&mut self, mix: PopulationMix) {
        self.diff1 = mix.diff1;
        self.diff2 = mix.diff2;
        self.population_ratio = mix.ratio;
    }

    /// Converts a duration in seconds to (fractional) frames.
    pub fn to_frames(&self, seconds: f64) -> f64 {
        seconds / self.acquisition_time_s
    }

    pub fn image_extent_um(&self) -> f64 {
        self.image_size_px as f64 * self.pixel_size_um
    }
}

/// Two-population diffusion mixture. A single population has `ratio == 1`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PopulationMix {
    pub diff1: f64,
    pub diff2: f64,
    pub ratio: f64,
}

impl PopulationMix {
    pub fn single(diff1: f64) -> Self {
        Self {
            diff1,
            diff2: 0.0,
            ratio: 1.0,
        }
    }

    pub fn diffusion_coefficient(&self, population: Population) -> f64 {
        match population {
            Population::One => self.diff1,
            Population::Two => self.diff2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Population {
    One,
    Two,
}

impl Population {
    pub fn label(self) -> u8 {
        match self {
            Population::One => 1,
            Population::Two => 2,
        }
    }
}

/// One activated fluorophore, fixed at activation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Emitter {
    pub id: usize,
    pub activation_frame: usize,
    pub x_um: f64,
    pub y_um: f64,
    pub population: Population,
    /// Frames until photobleaching.
    pub lifetime: usize,
    pub diffusion_coefficient: f64,
}

/// A row of a diffusion path. Detection records share this layout.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub frame: usize,
    pub x_um: f64,
    pub y_um: f64,
    /// Distance travelled since the previous path row, 0 for the first row.
    pub step_um: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubTrajectory {
    pub points: Vec<PathPoint>,
}

impl SubTrajectory {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_frame(&self) -> Option<usize> {
        self.points.first().map(|p| p.frame)
    }

    pub fn last_frame(&self) -> Option<usize> {
        self.points.last().map(|p| p.frame)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationResult {
    pub emitters: Vec<Emitter>,
    /// All ON rows of every emitter, sorted by frame once the run completes.
    pub detections: Vec<PathPoint>,
    pub trajectories: Vec<SubTrajectory>,
    /// Bleaching lifetime of every emitter, in frames.
    pub lifetimes: Vec<usize>,
    pub step_lengths: Vec<f64>,
    pub trajectory_lengths: Vec<usize>,
    /// Number of emitters activated at each frame, index 0 being frame 1.
    pub activations_per_frame: Vec<usize>,
    pub remaining_pool: usize,
    pub stats: SummaryStats,
}

impl SimulationResult {
    /// Detections belonging to frame `frame`. Requires the frame-sorted order.
    pub fn detections_in_frame(&self, frame: usize) -> &[PathPoint] {
        let start = self.detections.partition_point(|d| d.frame < frame);
        let end = self.detections.partition_point(|d| d.frame <= frame);
        &self.detections[start..end]
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub n_emitters: usize,
    pub n_detections: usize,
    pub n_trajectories: usize,
    pub mean_lifetime_s: f64,
    pub mean_step_um: f64,
    pub step_variance_um2: f64,
    pub mean_trajectory_length: f64,
}
