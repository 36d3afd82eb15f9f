use crate::analysis::AnalysisReport;
use crate::movie::RenderSettings;
use crate::simulation::{empirical_cdf, simple_histogram};
use crate::structs::{SimulationParams, SimulationResult};
use chrono::Utc;
use plotters::prelude::*;
use std::path::{Path, PathBuf};

/// Appends the parameters of the run to the analysis report.
pub fn append_simulation_metadata(
    report: &mut AnalysisReport,
    params: &SimulationParams,
    render: &RenderSettings,
    result: &SimulationResult,
) {
    report
        .section("Diffusion")
        .row("Diff1 (um^2/s)", format!("{:.4}", params.diff1))
        .row("Diff2 (um^2/s)", format!("{:.4}", params.diff2))
        .row("Population ratio", format!("{:.3}", params.population_ratio));

    report
        .section("Acquisition")
        .row("Frames", params.n_frames.to_string())
        .row(
            "Acquisition time (s)",
            format!("{:.4}", params.acquisition_time_s),
        )
        .row("Pixel size (um)", format!("{:.3}", params.pixel_size_um))
        .row("Image size (px)", params.image_size_px.to_string())
        .row("PSF sigma (um)", format!("{:.3}", render.psf_sigma_um))
        .row(
            "Background (photons/px)",
            format!("{:.1}", render.background_photons),
        );

    report
        .section("Photophysics")
        .row("Emitter pool", params.n_emitters_init.to_string())
        .row(
            "Mean activations/frame",
            format!("{:.3}", params.mean_activation),
        )
        .row(
            "Mean bleaching time (s)",
            format!("{:.3}", params.mean_bleaching_time_s),
        )
        .row("Mean photons", format!("{:.0}", params.mean_photons))
        .row("Ton (s)", format!("{:.3}", params.ton_s))
        .row("Toff1 (s)", format!("{:.3}", params.toff1_s))
        .row("Toff2 (s)", format!("{:.3}", params.toff2_s))
        .row("Max blink (frames)", params.max_blink.to_string())
        .row("Min trajectory length", params.min_traj_length.to_string());

    let stats = &result.stats;
    report
        .section("Results summary")
        .row("Emitters activated", stats.n_emitters.to_string())
        .row("Left in pool", result.remaining_pool.to_string())
        .row("Detections", stats.n_detections.to_string())
        .row("Trajectories", stats.n_trajectories.to_string())
        .row("Mean lifetime (s)", format!("{:.3}", stats.mean_lifetime_s))
        .row("Mean step (um)", format!("{:.4}", stats.mean_step_um))
        .row(
            "Step variance (um^2)",
            format!("{:.5}", stats.step_variance_um2),
        )
        .row(
            "Mean trajectory length",
            format!("{:.1}", stats.mean_trajectory_length),
        )
        .row(
            "Generated",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        );
}

pub fn write_report(dir: &Path, report: &AnalysisReport) -> anyhow::Result<PathBuf> {
    let path = dir.join("simulation_report.txt");
    report.write_to(&path)?;
    Ok(path)
}

/// Writes the trajectory map, bleaching-time histogram and step-length CDF.
/// Plots without data are skipped.
pub fn export_plots(
    dir: &Path,
    params: &SimulationParams,
    result: &SimulationResult,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    if !result.trajectories.is_empty() {
        let path = dir.join("trajectories.png");
        generate_trajectory_plot(&path, params, result)?;
        written.push(path);
    }

    let lifetimes_s: Vec<f64> = result
        .lifetimes
        .iter()
        .map(|&l| l as f64 * params.acquisition_time_s)
        .collect();
    if !lifetimes_s.is_empty() {
        let path = dir.join("bleaching_time_histogram.png");
        generate_bleaching_plot(&path, &lifetimes_s)?;
        written.push(path);
    }

    if !result.step_lengths.is_empty() {
        let path = dir.join("step_length_cdf.png");
        generate_step_cdf_plot(&path, &result.step_lengths)?;
        written.push(path);
    }

    Ok(written)
}

fn padded_range(min: f64, max: f64) -> std::ops::Range<f64> {
    if max > min {
        min..max
    } else {
        (min - 0.5)..(max + 0.5)
    }
}

fn generate_trajectory_plot(
    path: &Path,
    params: &SimulationParams,
    result: &SimulationResult,
) -> anyhow::Result<()> {
    let root = BitMapBackend::new(path, (1200, 1200)).into_drawing_area();
    root.fill(&WHITE)?;

    let extent = params.image_extent_um();
    let mut chart = ChartBuilder::on(&root)
        .caption("Simulated Trajectories", ("sans-serif", 40))
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d(0.0..extent, 0.0..extent)?;

    chart
        .configure_mesh()
        .x_desc("x (um)")
        .y_desc("y (um)")
        .label_style(("sans-serif", 20))
        .draw()?;

    // Hue runs from blue (early) to red (late) by the first frame of each trajectory.
    let last_frame = result
        .trajectories
        .iter()
        .filter_map(|t| t.first_frame())
        .max()
        .unwrap_or(1)
        .max(1) as f64;
    for trajectory in &result.trajectories {
        let order = trajectory.first_frame().unwrap_or(0) as f64 / last_frame;
        let color = HSLColor(0.66 * (1.0 - order), 0.9, 0.45);
        chart.draw_series(LineSeries::new(
            trajectory.points.iter().map(|p| (p.x_um, p.y_um)),
            color.stroke_width(2),
        ))?;
    }

    root.present()?;
    Ok(())
}

fn generate_bleaching_plot(path: &Path, lifetimes_s: &[f64]) -> anyhow::Result<()> {
    let root = BitMapBackend::new(path, (1600, 1000)).into_drawing_area();
    root.fill(&WHITE)?;

    let bins = 30.min(lifetimes_s.len() / 5).max(1);
    let (hist, edges) = simple_histogram(lifetimes_s, bins);
    let max_y = hist.iter().cloned().fold(0.0, f64::max).max(f64::EPSILON);
    let x_range = padded_range(edges[0], edges[bins]);

    let mut chart = ChartBuilder::on(&root)
        .caption("Photobleaching Time", ("sans-serif", 48))
        .margin(10)
        .x_label_area_size(70)
        .y_label_area_size(90)
        .build_cartesian_2d(x_range, 0.0..max_y * 1.05)?;

    chart
        .configure_mesh()
        .x_desc("Bleaching time (s)")
        .y_desc("Fraction of emitters")
        .label_style(("sans-serif", 24))
        .draw()?;

    chart.draw_series(hist.iter().enumerate().map(|(i, &h)| {
        Rectangle::new([(edges[i], 0.0), (edges[i + 1], h)], BLUE.mix(0.6).filled())
    }))?;

    root.present()?;
    Ok(())
}

fn generate_step_cdf_plot(path: &Path, step_lengths: &[f64]) -> anyhow::Result<()> {
    let root = BitMapBackend::new(path, (1600, 1000)).into_drawing_area();
    root.fill(&WHITE)?;

    let cdf = empirical_cdf(step_lengths);
    let min_x = cdf.first().map(|&(x, _)| x).unwrap_or(0.0);
    let max_x = cdf.last().map(|&(x, _)| x).unwrap_or(1.0);

    let mut chart = ChartBuilder::on(&root)
        .caption("Step Length Distribution", ("sans-serif", 48))
        .margin(10)
        .x_label_area_size(70)
        .y_label_area_size(90)
        .build_cartesian_2d(padded_range(min_x, max_x), 0.0..1.0)?;

    chart
        .configure_mesh()
        .x_desc("Step length (um)")
        .y_desc("Cumulative fraction")
        .label_style(("sans-serif", 24))
        .draw()?;

    chart
        .draw_series(LineSeries::new(cdf, RED.stroke_width(3)))?
        .label("Empirical CDF")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

    chart
        .configure_series_labels()
        .background_style(&WHITE)
        .label_font(("sans-serif", 24))
        .draw()?;

    root.present()?;
    Ok(())
}

pub fn export_csv(dir: &Path, result: &SimulationResult) -> anyhow::Result<Vec<PathBuf>> {
    let stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let mut written = Vec::new();

    {
        let path = dir.join(format!("detections_{stamp}.csv"));
        let mut wtr = csv::Writer::from_path(&path)?;
        wtr.write_record(["Frame", "x (um)", "y (um)"])?;
        for d in &result.detections {
            wtr.write_record(&[d.frame.to_string(), d.x_um.to_string(), d.y_um.to_string()])?;
        }
        wtr.flush()?;
        written.push(path);
    }

    {
        let path = dir.join(format!("trajectories_{stamp}.csv"));
        let mut wtr = csv::Writer::from_path(&path)?;
        wtr.write_record(["Trajectory", "Frame", "x (um)", "y (um)", "Step (um)"])?;
        for (id, trajectory) in result.trajectories.iter().enumerate() {
            for p in &trajectory.points {
                wtr.write_record(&[
                    id.to_string(),
                    p.frame.to_string(),
                    p.x_um.to_string(),
                    p.y_um.to_string(),
                    p.step_um.to_string(),
                ])?;
            }
        }
        wtr.flush()?;
        written.push(path);
    }

    {
        let path = dir.join(format!("lifetimes_{stamp}.csv"));
        let mut wtr = csv::Writer::from_path(&path)?;
        wtr.write_record(["Emitter", "Population", "Activation frame", "Lifetime (frames)"])?;
        for e in &result.emitters {
            wtr.write_record(&[
                e.id.to_string(),
                e.population.label().to_string(),
                e.activation_frame.to_string(),
                e.lifetime.to_string(),
            ])?;
        }
        wtr.flush()?;
        written.push(path);
    }

    {
        let path = dir.join(format!("step_lengths_{stamp}.csv"));
        let mut wtr = csv::Writer::from_path(&path)?;
        wtr.write_record(["Step (um)"])?;
        for s in &result.step_lengths {
            wtr.write_record(&[s.to_string()])?;
        }
        wtr.flush()?;
        written.push(path);
    }

    Ok(written)
}
