use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;
use spt_simulation_tool::analysis::{MsdAnalyzer, TrajectoryAnalyzer};
use spt_simulation_tool::config::{RunConfig, parse_population};
use spt_simulation_tool::movie::MovieRenderer;
use spt_simulation_tool::random::Sampler;
use spt_simulation_tool::report::{
    append_simulation_metadata, export_csv, export_plots, write_report,
};
use spt_simulation_tool::simulation::simulate;

/// Simulate single-particle-tracking movies and trajectories
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON parameter file; omitted fields keep their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Diffusion coefficient of population 1 (um^2/s)
    #[arg(long)]
    diff1: String,

    /// Diffusion coefficient of population 2 (um^2/s); omit for a single population
    #[arg(long)]
    diff2: Option<String>,

    /// Fraction of emitters in population 1, required with --diff2
    #[arg(long)]
    ratio: Option<String>,

    /// Number of frames to simulate (overrides the config file)
    #[arg(short = 'n', long)]
    frames: Option<usize>,

    /// Output directory
    #[arg(short, long, default_value = "spt_output")]
    output: PathBuf,

    /// Random seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Skip rendering the movie
    #[arg(long)]
    no_movie: bool,

    /// Skip the summary plots
    #[arg(long)]
    no_plots: bool,

    /// Let the trajectory analysis run in parallel
    #[arg(long)]
    parallel_analysis: bool,

    /// Frames per movie file (overrides the config file)
    #[arg(long)]
    frames_per_file: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("reading parameters from {}", path.display()))?,
        None => RunConfig::default(),
    };
    let mix = parse_population(&args.diff1, args.diff2.as_deref(), args.ratio.as_deref())?;
    config.simulation.set_population_mix(mix);
    if let Some(frames) = args.frames {
        config.simulation.n_frames = frames;
    }
    if let Some(frames_per_file) = args.frames_per_file {
        config.render.frames_per_file = frames_per_file;
    }
    config.analysis.parallel |= args.parallel_analysis;
    config.simulation.validate()?;

    fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    let params = &config.simulation;

    let result = simulate(params, args.seed)?;

    if !args.no_movie {
        let renderer = MovieRenderer::new(params, &config.render);
        // Movie noise uses its own stream so it never perturbs the trajectories.
        let mut sampler = match args.seed {
            Some(seed) => Sampler::seeded(seed.wrapping_add(1)),
            None => Sampler::from_entropy(),
        };
        renderer.write_movie(&result, params.n_frames, &args.output, &mut sampler)?;
    }

    let settings = config.analysis.clone().with_simulation(params);
    let mut report = MsdAnalyzer.analyze(&settings, &result.trajectories)?;
    append_simulation_metadata(&mut report, params, &config.render, &result);
    let report_path = write_report(&args.output, &report)?;

    export_csv(&args.output, &result)?;
    if !args.no_plots {
        export_plots(&args.output, params, &result)?;
    }

    info!("results written to {}", args.output.display());
    info!("report: {}", report_path.display());
    Ok(())
}
