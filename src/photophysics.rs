use rand::Rng;

use crate::error::SimResult;
use crate::random::Sampler;
use crate::structs::{PathPoint, SimulationParams};

/// Mean ON and OFF durations, in frames.
///
/// Two OFF states are modelled: a short blink (`toff1`) and a long dark state (`toff2`),
/// entered with equal probability.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlinkingKinetics {
    pub ton: f64,
    pub toff1: f64,
    pub toff2: f64,
}

impl BlinkingKinetics {
    pub fn from_params(params: &SimulationParams) -> Self {
        Self {
            ton: params.to_frames(params.ton_s),
            toff1: params.to_frames(params.toff1_s),
            toff2: params.to_frames(params.toff2_s),
        }
    }
}

/// ON/OFF emission flags for each of the `lifetime` frames of an emitter.
///
/// Frames are counted from 1. The process starts ON at frame 1; an ON run of
/// `ton` frames covers `[t, t + ton]` and the next run starts at `t + ton + 1`.
/// Generation stops once the cursor reaches `lifetime`.
pub fn generate_state_timeline<R: Rng>(
    sampler: &mut Sampler<R>,
    lifetime: usize,
    kinetics: &BlinkingKinetics,
) -> SimResult<Vec<bool>> {
    let mut timeline = vec![false; lifetime];
    let mut t = 1;
    let mut emitting = true;

    while t < lifetime {
        if emitting {
            let ton = sampler.exponential_frames(kinetics.ton)?;
            let end = (t + ton).min(lifetime);
            for flag in &mut timeline[t - 1..end] {
                *flag = true;
            }
            t += ton + 1;
        } else {
            let mean = if sampler.uniform(0.0, 1.0)? < 0.5 {
                kinetics.toff1
            } else {
                kinetics.toff2
            };
            t += sampler.exponential_frames(mean)? + 1;
        }
        emitting = !emitting;
    }
    Ok(timeline)
}

/// Path rows during which the emitter was ON.
pub fn detections(path: &[PathPoint], timeline: &[bool]) -> Vec<PathPoint> {
    path.iter()
        .zip(timeline)
        .filter(|(_, on)| **on)
        .map(|(point, _)| *point)
        .collect()
}

/// Step lengths observable in the emitted signal.
///
/// A step counts only when both of its end frames were ON, so the first frame
/// of every ON run contributes nothing.
pub fn emitted_step_lengths(path: &[PathPoint], timeline: &[bool]) -> Vec<f64> {
    path.iter()
        .zip(timeline)
        .enumerate()
        .skip(1)
        .filter(|&(i, (point, on))| *on && timeline[i - 1] && point.step_um != 0.0)
        .map(|(_, (point, _))| point.step_um)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinetics(ton: f64, toff1: f64, toff2: f64) -> BlinkingKinetics {
        BlinkingKinetics { ton, toff1, toff2 }
    }

    fn point(frame: usize, step_um: f64) -> PathPoint {
        PathPoint {
            frame,
            x_um: frame as f64,
            y_um: 0.0,
            step_um,
        }
    }

    #[test]
    fn timeline_length_matches_lifetime() {
        let mut sampler = Sampler::seeded(1);
        for lifetime in [0, 1, 2, 17, 300] {
            let timeline =
                generate_state_timeline(&mut sampler, lifetime, &kinetics(5.0, 1.0, 20.0))
                    .unwrap();
            assert_eq!(timeline.len(), lifetime);
        }
    }

    #[test]
    fn starts_on() {
        let mut sampler = Sampler::seeded(2);
        for _ in 0..50 {
            let timeline =
                generate_state_timeline(&mut sampler, 40, &kinetics(4.0, 2.0, 10.0)).unwrap();
            assert!(timeline[0]);
        }
    }

    #[test]
    fn single_frame_lifetime_never_emits() {
        let mut sampler = Sampler::seeded(3);
        let timeline = generate_state_timeline(&mut sampler, 1, &kinetics(5.0, 1.0, 1.0)).unwrap();
        assert_eq!(timeline, vec![false]);
    }

    #[test]
    fn long_on_time_covers_whole_lifetime() {
        let mut sampler = Sampler::seeded(4);
        // With a huge mean ON time the first run virtually always outlasts the emitter.
        let timeline =
            generate_state_timeline(&mut sampler, 10, &kinetics(1e9, 1.0, 1.0)).unwrap();
        assert!(timeline.iter().all(|&on| on));
    }

    #[test]
    fn sub_frame_means_alternate_single_frames() {
        // Means below half a frame round to zero: ON [t, t], OFF skips one frame.
        let mut sampler = Sampler::seeded(5);
        let timeline = generate_state_timeline(&mut sampler, 9, &kinetics(0.2, 0.1, 0.3)).unwrap();
        assert_eq!(
            timeline,
            vec![true, false, true, false, true, false, true, false, false]
        );
    }

    #[test]
    fn on_fraction_tracks_kinetics() {
        let mut sampler = Sampler::seeded(6);
        let timeline =
            generate_state_timeline(&mut sampler, 200_000, &kinetics(10.0, 10.0, 10.0)).unwrap();
        let on = timeline.iter().filter(|&&f| f).count() as f64 / timeline.len() as f64;
        // ON and OFF runs both last their rounded draw plus one frame.
        assert!((on - 0.5).abs() < 0.02, "on fraction {on}");
    }

    #[test]
    fn detections_keep_only_on_rows() {
        let path: Vec<PathPoint> = (1..=5).map(|f| point(f, 0.1)).collect();
        let timeline = [true, false, true, true, false];
        let frames: Vec<usize> = detections(&path, &timeline).iter().map(|p| p.frame).collect();
        assert_eq!(frames, vec![1, 3, 4]);
    }

    #[test]
    fn step_lengths_skip_run_starts() {
        let path = vec![
            point(1, 0.0),
            point(2, 0.2),
            point(3, 0.3),
            point(4, 0.4),
            point(5, 0.5),
            point(6, 0.6),
        ];
        let timeline = [true, true, false, true, true, true];
        assert_eq!(emitted_step_lengths(&path, &timeline), vec![0.2, 0.5, 0.6]);
    }
}
