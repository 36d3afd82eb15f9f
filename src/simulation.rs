use crate::activation::{ActivationScheduler, EmitterPool};
use crate::diffusion::generate_path;
use crate::error::SimResult;
use crate::photophysics::{self, BlinkingKinetics};
use crate::random::Sampler;
use crate::segmentation::{SegmentationRules, segment};
use crate::structs::{SimulationParams, SimulationResult, SummaryStats};
use log::info;
use rand::Rng;
use rand::rngs::StdRng;

pub struct SptSimulator<R: Rng> {
    sampler: Sampler<R>,
}

impl SptSimulator<StdRng> {
    /// Seeded runs are reproducible; `None` draws a fresh entropy source.
    pub fn new(seed: Option<u64>) -> Self {
        let sampler = match seed {
            Some(seed) => Sampler::seeded(seed),
            None => Sampler::from_entropy(),
        };
        Self { sampler }
    }
}

impl<R: Rng> SptSimulator<R> {
    pub fn with_sampler(sampler: Sampler<R>) -> Self {
        Self { sampler }
    }

    pub fn simulate_spt(&mut self, params: &SimulationParams) -> SimResult<SimulationResult> {
        params.validate()?;

        let scheduler = ActivationScheduler::new(params);
        let kinetics = BlinkingKinetics::from_params(params);
        let rules = SegmentationRules::from_params(params);
        let mut pool = EmitterPool::new(params.n_emitters_init);
        let mut result = SimulationResult {
            activations_per_frame: Vec::with_capacity(params.n_frames),
            ..Default::default()
        };

        for frame in 1..=params.n_frames {
            let emitters = scheduler.activate(frame, &mut pool, &mut self.sampler)?;
            result.activations_per_frame.push(emitters.len());

            for emitter in emitters {
                // Lifetimes are not cut at the last frame: late emitters run to bleaching.
                let path = generate_path(&mut self.sampler, &emitter, params.acquisition_time_s)?;
                let timeline = photophysics::generate_state_timeline(
                    &mut self.sampler,
                    emitter.lifetime,
                    &kinetics,
                )?;

                let detected = photophysics::detections(&path, &timeline);
                result
                    .step_lengths
                    .extend(photophysics::emitted_step_lengths(&path, &timeline));
                for trajectory in segment(&detected, &rules) {
                    result.trajectory_lengths.push(trajectory.len());
                    result.trajectories.push(trajectory);
                }
                result.detections.extend(detected);
                result.lifetimes.push(emitter.lifetime);
                result.emitters.push(emitter);
            }
        }

        result.detections.sort_by_key(|d| d.frame);
        result.remaining_pool = pool.remaining();
        result.stats = Self::summarize(&result, params);

        info!(
            "simulated {} frames: {} emitters, {} detections, {} trajectories ({} left in pool)",
            params.n_frames,
            result.stats.n_emitters,
            result.stats.n_detections,
            result.stats.n_trajectories,
            result.remaining_pool
        );
        Ok(result)
    }

    fn summarize(result: &SimulationResult, params: &SimulationParams) -> SummaryStats {
        let lifetimes_s: Vec<f64> = result
            .lifetimes
            .iter()
            .map(|&l| l as f64 * params.acquisition_time_s)
            .collect();
        let lengths: Vec<f64> = result
            .trajectory_lengths
            .iter()
            .map(|&l| l as f64)
            .collect();

        SummaryStats {
            n_emitters: result.emitters.len(),
            n_detections: result.detections.len(),
            n_trajectories: result.trajectories.len(),
            mean_lifetime_s: mean(&lifetimes_s),
            mean_step_um: mean(&result.step_lengths),
            step_variance_um2: variance(&result.step_lengths),
            mean_trajectory_length: mean(&lengths),
        }
    }
}

pub fn simulate(params: &SimulationParams, seed: Option<u64>) -> SimResult<SimulationResult> {
    let mut simulator = SptSimulator::new(seed);
    simulator.simulate_spt(params)
}

pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / (data.len() as f64)
}

pub fn variance(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mean = mean(data);
    data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (data.len() as f64)
}

/// Equal-width histogram normalised to unit sum. Returns `(counts, edges)`.
pub fn simple_histogram(data: &[f64], bins: usize) -> (Vec<f64>, Vec<f64>) {
    if data.is_empty() || bins == 0 {
        return (vec![0.0; bins], vec![0.0; bins + 1]);
    }
    let min = data.iter().fold(f64::INFINITY, |a, b| a.min(*b));
    let max = data.iter().fold(f64::NEG_INFINITY, |a, b| a.max(*b));
    let bin_width = ((max - min) / (bins as f64)).max(f64::EPSILON);
    let mut histogram = vec![0.0; bins];
    let edges: Vec<f64> = (0..=bins).map(|i| min + (i as f64) * bin_width).collect();

    for x in data {
        // The maximum lands on the closing edge; keep it in the last bin.
        let bin_idx = (((x - min) / bin_width).floor() as usize).min(bins - 1);
        histogram[bin_idx] += 1.0;
    }
    let sum = data.len() as f64;
    for h in histogram.iter_mut() {
        *h /= sum;
    }
    (histogram, edges)
}

/// Sorted values paired with their cumulative fraction.
pub fn empirical_cdf(data: &[f64]) -> Vec<(f64, f64)> {
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len() as f64;
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, x)| (x, (i + 1) as f64 / n))
        .collect()
}
