//! Single-particle-tracking simulator: Brownian emitters with photo-activation,
//! blinking and bleaching, segmented into observable trajectories and rendered
//! as a noisy movie.

pub mod activation;
pub mod analysis;
pub mod config;
pub mod diffusion;
pub mod error;
pub mod movie;
pub mod photophysics;
pub mod random;
pub mod report;
pub mod segmentation;
pub mod simulation;
pub mod structs;
