use spt_simulation_tool::analysis::{AnalysisSettings, MsdAnalyzer, TrajectoryAnalyzer};
use spt_simulation_tool::config::{RunConfig, parse_population};
use spt_simulation_tool::movie::MovieRenderer;
use spt_simulation_tool::random::Sampler;
use spt_simulation_tool::report::{append_simulation_metadata, write_report};
use spt_simulation_tool::simulation::{SptSimulator, simulate};
use spt_simulation_tool::structs::{Population, SimulationParams};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn full_run_writes_movie_and_report() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut config = RunConfig::from_json_str(
        r#"{
            "n_emitters_init": 80,
            "mean_activation": 1.5,
            "n_frames": 60,
            "image_size_px": 40,
            "render": { "frames_per_file": 25 },
            "analysis": { "max_lag": 5, "fit_points": 3 }
        }"#,
    )
    .unwrap();
    config
        .simulation
        .set_population_mix(parse_population("0.2", Some("0.02"), Some("0.5")).unwrap());
    let params = &config.simulation;

    let result = simulate(params, Some(2024)).unwrap();
    assert!(!result.emitters.is_empty());

    let renderer = MovieRenderer::new(params, &config.render);
    let mut sampler = Sampler::seeded(1);
    let movies = renderer
        .write_movie(&result, params.n_frames, dir.path(), &mut sampler)
        .unwrap();
    assert_eq!(movies.len(), 3);

    let settings = config.analysis.clone().with_simulation(params);
    let mut report = MsdAnalyzer.analyze(&settings, &result.trajectories).unwrap();
    append_simulation_metadata(&mut report, params, &config.render, &result);
    let report_path = write_report(dir.path(), &report).unwrap();
    let text = std::fs::read_to_string(report_path).unwrap();
    assert!(text.contains("Trajectory analysis"));
    assert!(text.contains("Diff2"));
}

#[test]
fn explicit_sampler_matches_seeded_run() {
    let params = SimulationParams {
        n_emitters_init: 50,
        mean_activation: 2.0,
        n_frames: 40,
        ..Default::default()
    };
    let from_seed = simulate(&params, Some(77)).unwrap();
    let from_sampler = SptSimulator::with_sampler(Sampler::seeded(77))
        .simulate_spt(&params)
        .unwrap();
    assert_eq!(from_seed.detections, from_sampler.detections);
    assert_eq!(from_seed.trajectories, from_sampler.trajectories);
}

#[test]
fn single_population_diffusion_statistics() {
    // Diff2 unset: every emitter belongs to population 1 and steps reflect Diff1 only.
    let d = 0.4;
    let mut params = SimulationParams {
        n_emitters_init: 200,
        mean_activation: 200.0,
        n_frames: 1,
        mean_bleaching_time_s: 4.0,
        ton_s: 1_000.0,
        ..Default::default()
    };
    params.set_population_mix(parse_population("0.4", None, None).unwrap());
    let result = simulate(&params, Some(31)).unwrap();
    assert_eq!(result.emitters.len(), 200);
    assert!(result.emitters.iter().all(|e| e.population == Population::One));
    assert!(result.step_lengths.len() >= 10_000, "{} steps", result.step_lengths.len());

    let mean_square = result.step_lengths.iter().map(|s| s * s).sum::<f64>()
        / result.step_lengths.len() as f64;
    let expected = 4.0 * d * params.acquisition_time_s;
    assert!(
        (mean_square - expected).abs() / expected < 0.05,
        "mean square step {mean_square} vs {expected}"
    );
}

#[test]
fn analysis_recovers_simulated_diffusion() {
    let d = 0.2;
    let params = SimulationParams {
        n_emitters_init: 300,
        mean_activation: 3.0,
        n_frames: 200,
        mean_bleaching_time_s: 2.0,
        ton_s: 10.0,
        diff1: d,
        ..Default::default()
    };
    let result = simulate(&params, Some(8)).unwrap();
    let settings = AnalysisSettings {
        max_lag: 4,
        fit_points: 4,
        ..Default::default()
    }
    .with_simulation(&params);
    let report = MsdAnalyzer.analyze(&settings, &result.trajectories).unwrap();
    let estimate = report.ensemble_diffusion.unwrap();
    assert!((estimate - d).abs() / d < 0.15, "estimated D {estimate}");
}
