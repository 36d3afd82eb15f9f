//! Run configuration: JSON parameter files plus the raw diffusion inputs
//! typed in by the user.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisSettings;
use crate::error::{SimResult, SimulationError};
use crate::movie::RenderSettings;
use crate::structs::{PopulationMix, SimulationParams};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(flatten)]
    pub simulation: SimulationParams,
    #[serde(default)]
    pub render: RenderSettings,
    #[serde(default)]
    pub analysis: AnalysisSettings,
}

impl RunConfig {
    pub fn from_json_str(text: &str) -> SimResult<Self> {
        serde_json::from_str(text).map_err(|e| SimulationError::config("config", e.to_string()))
    }

    pub fn load(path: &Path) -> SimResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// Parses the diffusion inputs of one run.
///
/// `diff1` is mandatory. A missing or blank `diff2` collapses the mixture to a
/// single population (`diff2 = 0`, `ratio = 1`); otherwise `ratio` is required.
pub fn parse_population(
    diff1: &str,
    diff2: Option<&str>,
    ratio: Option<&str>,
) -> SimResult<PopulationMix> {
    let diff1 = parse_number("diff1", diff1)?;
    if diff1 <= 0.0 {
        return Err(SimulationError::config(
            "diff1",
            format!("diffusion coefficient must be > 0, got {diff1}"),
        ));
    }

    let Some(diff2) = diff2.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(PopulationMix::single(diff1));
    };
    let diff2 = parse_number("diff2", diff2)?;
    if diff2 < 0.0 {
        return Err(SimulationError::config(
            "diff2",
            format!("diffusion coefficient must be >= 0, got {diff2}"),
        ));
    }

    let ratio = ratio.ok_or_else(|| {
        SimulationError::config("population_ratio", "required when diff2 is given")
    })?;
    let ratio = parse_number("population_ratio", ratio)?;
    if !(0.0..=1.0).contains(&ratio) {
        return Err(SimulationError::config(
            "population_ratio",
            format!("must lie in [0, 1], got {ratio}"),
        ));
    }

    Ok(PopulationMix {
        diff1,
        diff2,
        ratio,
    })
}

fn parse_number(field: &'static str, raw: &str) -> SimResult<f64> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(SimulationError::config(
            field,
            format!("expected a number, got {raw:?}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_population_when_diff2_missing() {
        let mix = parse_population("0.12", None, Some("0.3")).unwrap();
        assert_eq!(mix, PopulationMix::single(0.12));
        let mix = parse_population("0.12", Some("  "), None).unwrap();
        assert_eq!(mix.ratio, 1.0);
        assert_eq!(mix.diff2, 0.0);
    }

    #[test]
    fn two_populations() {
        let mix = parse_population("0.5", Some("0.01"), Some("0.7")).unwrap();
        assert_eq!(
            mix,
            PopulationMix {
                diff1: 0.5,
                diff2: 0.01,
                ratio: 0.7
            }
        );
    }

    #[test]
    fn non_numeric_diff1_is_reported() {
        let err = parse_population("fast", None, None).unwrap_err();
        assert!(matches!(err, SimulationError::Config { field: "diff1", .. }));
        assert!(err.to_string().contains("fast"));
    }

    #[test]
    fn diff2_requires_valid_ratio() {
        assert!(parse_population("0.5", Some("0.1"), None).is_err());
        assert!(parse_population("0.5", Some("0.1"), Some("abc")).is_err());
        assert!(parse_population("0.5", Some("0.1"), Some("1.2")).is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RunConfig::from_json_str(
            r#"{ "n_frames": 42, "max_blink": 0, "render": { "frames_per_file": 10 } }"#,
        )
        .unwrap();
        assert_eq!(config.simulation.n_frames, 42);
        assert_eq!(config.simulation.max_blink, 0);
        assert_eq!(
            config.simulation.pixel_size_um,
            SimulationParams::default().pixel_size_um
        );
        assert_eq!(config.render.frames_per_file, 10);
        assert_eq!(config.analysis, AnalysisSettings::default());
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            RunConfig::from_json_str("{ n_frames: }"),
            Err(SimulationError::Config { field: "config", .. })
        ));
    }
}
