//! Mean-squared-displacement analysis of finished trajectories.
//!
//! The simulator hands its trajectory collection to a [`TrajectoryAnalyzer`]
//! and gets back an [`AnalysisReport`] it can keep appending to.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{SimResult, SimulationError};
use crate::structs::{SimulationParams, SubTrajectory};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub max_blink: usize,
    /// Minimum fraction of frames in a trajectory's span that must carry a detection.
    pub min_point_fraction: f64,
    pub pixel_size_um: f64,
    pub acquisition_time_s: f64,
    /// Largest lag, in frames, of the MSD curves.
    pub max_lag: usize,
    /// Number of leading MSD points used for the diffusion fit.
    pub fit_points: usize,
    pub parallel: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        let params = SimulationParams::default();
        Self {
            max_blink: params.max_blink,
            min_point_fraction: 0.5,
            pixel_size_um: params.pixel_size_um,
            acquisition_time_s: params.acquisition_time_s,
            max_lag: 10,
            fit_points: 4,
            parallel: false,
        }
    }
}

impl AnalysisSettings {
    /// Copies the acquisition-side settings of a simulation run.
    pub fn with_simulation(mut self, params: &SimulationParams) -> Self {
        self.max_blink = params.max_blink;
        self.pixel_size_um = params.pixel_size_um;
        self.acquisition_time_s = params.acquisition_time_s;
        self
    }

    fn validate(&self) -> SimResult<()> {
        if self.fit_points < 2 {
            return Err(SimulationError::config("fit_points", "need at least 2"));
        }
        if self.max_lag < self.fit_points {
            return Err(SimulationError::config(
                "max_lag",
                format!("must be >= fit_points ({})", self.fit_points),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_point_fraction) {
            return Err(SimulationError::config(
                "min_point_fraction",
                format!("must lie in [0, 1], got {}", self.min_point_fraction),
            ));
        }
        if self.acquisition_time_s.is_nan() || self.acquisition_time_s <= 0.0 {
            return Err(SimulationError::config("acquisition_time_s", "must be > 0"));
        }
        Ok(())
    }
}

pub trait TrajectoryAnalyzer {
    fn analyze(
        &self,
        settings: &AnalysisSettings,
        trajectories: &[SubTrajectory],
    ) -> SimResult<AnalysisReport>;
}

/// Squared-displacement sums per lag, in frames (index 0 is lag 1).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MsdAccumulator {
    pub sums: Vec<f64>,
    pub counts: Vec<usize>,
}

impl MsdAccumulator {
    pub fn new(max_lag: usize) -> Self {
        Self {
            sums: vec![0.0; max_lag],
            counts: vec![0; max_lag],
        }
    }

    /// Accumulates every pair of points exactly `lag` frames apart, so blink
    /// gaps leave holes instead of shortening the lag.
    pub fn from_trajectory(trajectory: &SubTrajectory, max_lag: usize) -> Self {
        let mut acc = Self::new(max_lag);
        let by_frame: HashMap<usize, (f64, f64)> = trajectory
            .points
            .iter()
            .map(|p| (p.frame, (p.x_um, p.y_um)))
            .collect();
        for p in &trajectory.points {
            for lag in 1..=max_lag {
                if let Some(&(x, y)) = by_frame.get(&(p.frame + lag)) {
                    acc.sums[lag - 1] += (x - p.x_um).powi(2) + (y - p.y_um).powi(2);
                    acc.counts[lag - 1] += 1;
                }
            }
        }
        acc
    }

    pub fn merge(mut self, other: &Self) -> Self {
        for (s, o) in self.sums.iter_mut().zip(&other.sums) {
            *s += o;
        }
        for (c, o) in self.counts.iter_mut().zip(&other.counts) {
            *c += o;
        }
        self
    }

    /// `(lag_s, msd_um2)` for every lag with at least one pair.
    pub fn curve(&self, acquisition_time_s: f64) -> Vec<(f64, f64)> {
        self.sums
            .iter()
            .zip(&self.counts)
            .enumerate()
            .filter(|(_, (_, count))| **count > 0)
            .map(|(i, (sum, count))| ((i + 1) as f64 * acquisition_time_s, sum / *count as f64))
            .collect()
    }
}

/// Least-squares fit of `MSD = 4·D·τ + offset`. Returns `(D, offset)`.
pub fn fit_diffusion(curve: &[(f64, f64)]) -> Option<(f64, f64)> {
    if curve.len() < 2 {
        return None;
    }
    let n = curve.len() as f64;
    let mean_t = curve.iter().map(|(t, _)| t).sum::<f64>() / n;
    let mean_m = curve.iter().map(|(_, m)| m).sum::<f64>() / n;
    let sxx: f64 = curve.iter().map(|(t, _)| (t - mean_t).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = curve
        .iter()
        .map(|(t, m)| (t - mean_t) * (m - mean_m))
        .sum();
    let slope = sxy / sxx;
    Some((slope / 4.0, mean_m - slope * mean_t))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryFit {
    pub trajectory: usize,
    pub n_points: usize,
    pub diffusion_coefficient: f64,
    pub offset_um2: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReportSection {
    pub title: String,
    pub rows: Vec<(String, String)>,
}

impl ReportSection {
    pub fn row(&mut self, label: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.rows.push((label.into(), value.into()));
        self
    }
}

/// Analysis output plus a free-form, appendable text report.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnalysisReport {
    pub ensemble_msd: Vec<(f64, f64)>,
    pub ensemble_diffusion: Option<f64>,
    pub fits: Vec<TrajectoryFit>,
    pub sections: Vec<ReportSection>,
}

impl AnalysisReport {
    pub fn section(&mut self, title: impl Into<String>) -> &mut ReportSection {
        self.sections.push(ReportSection {
            title: title.into(),
            rows: Vec::new(),
        });
        let last = self.sections.len() - 1;
        &mut self.sections[last]
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            let _ = writeln!(out, "== {} ==", section.title);
            let width = section.rows.iter().map(|(l, _)| l.len()).max().unwrap_or(0);
            for (label, value) in &section.rows {
                let _ = writeln!(out, "{label:<width$}  {value}");
            }
            out.push('\n');
        }
        out
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        fs::write(path, self.render())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MsdAnalyzer;

impl MsdAnalyzer {
    fn qualifies(settings: &AnalysisSettings, trajectory: &SubTrajectory) -> bool {
        let (Some(first), Some(last)) = (trajectory.first_frame(), trajectory.last_frame()) else {
            return false;
        };
        let span = (last - first + 1) as f64;
        trajectory.len() > settings.fit_points
            && trajectory.len() as f64 >= settings.min_point_fraction * span
    }

    fn fit_one(
        settings: &AnalysisSettings,
        index: usize,
        acc: &MsdAccumulator,
        trajectory: &SubTrajectory,
    ) -> Option<TrajectoryFit> {
        if !Self::qualifies(settings, trajectory) {
            return None;
        }
        let curve = acc.curve(settings.acquisition_time_s);
        let head = &curve[..curve.len().min(settings.fit_points)];
        let (d, offset) = fit_diffusion(head)?;
        Some(TrajectoryFit {
            trajectory: index,
            n_points: trajectory.len(),
            diffusion_coefficient: d,
            offset_um2: offset,
        })
    }
}

impl TrajectoryAnalyzer for MsdAnalyzer {
    fn analyze(
        &self,
        settings: &AnalysisSettings,
        trajectories: &[SubTrajectory],
    ) -> SimResult<AnalysisReport> {
        settings.validate()?;
        let per_trajectory = |(index, trajectory): (usize, &SubTrajectory)| {
            let acc = MsdAccumulator::from_trajectory(trajectory, settings.max_lag);
            let fit = Self::fit_one(settings, index, &acc, trajectory);
            (acc, fit)
        };
        let results: Vec<(MsdAccumulator, Option<TrajectoryFit>)> = if settings.parallel {
            trajectories.par_iter().enumerate().map(per_trajectory).collect()
        } else {
            trajectories.iter().enumerate().map(per_trajectory).collect()
        };

        let mut ensemble = MsdAccumulator::new(settings.max_lag);
        let mut fits = Vec::new();
        for (acc, fit) in results {
            ensemble = ensemble.merge(&acc);
            fits.extend(fit);
        }
        let ensemble_msd = ensemble.curve(settings.acquisition_time_s);
        let head = &ensemble_msd[..ensemble_msd.len().min(settings.fit_points)];
        let ensemble_diffusion = fit_diffusion(head).map(|(d, _)| d);
        debug!(
            "MSD analysis: {} trajectories, {} fitted",
            trajectories.len(),
            fits.len()
        );

        let mut report = AnalysisReport {
            ensemble_msd,
            ensemble_diffusion,
            fits,
            sections: Vec::new(),
        };
        let mean_d = if report.fits.is_empty() {
            None
        } else {
            Some(
                report
                    .fits
                    .iter()
                    .map(|f| f.diffusion_coefficient)
                    .sum::<f64>()
                    / report.fits.len() as f64,
            )
        };
        let fmt_d = |d: Option<f64>| d.map_or("n/a".to_string(), |d| format!("{d:.4} um^2/s"));
        let ensemble_d = fmt_d(report.ensemble_diffusion);
        let msd_rows: Vec<(String, String)> = report
            .ensemble_msd
            .iter()
            .map(|(t, m)| (format!("MSD({t:.3} s)"), format!("{m:.5} um^2")))
            .collect();
        let n_fits = report.fits.len();

        let section = report.section("Trajectory analysis");
        section
            .row("Trajectories", trajectories.len().to_string())
            .row("Fitted trajectories", n_fits.to_string())
            .row("Blink tolerance (frames)", settings.max_blink.to_string())
            .row(
                "Min point fraction",
                format!("{:.2}", settings.min_point_fraction),
            )
            .row("Max lag (frames)", settings.max_lag.to_string())
            .row("Fit points", settings.fit_points.to_string())
            .row("D ensemble", ensemble_d)
            .row("D mean of fits", fmt_d(mean_d));
        let section = report.section("Ensemble MSD");
        for (label, value) in msd_rows {
            section.row(label, value);
        }
        Ok(report)
    }
}
