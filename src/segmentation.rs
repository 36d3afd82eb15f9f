use crate::structs::{PathPoint, SimulationParams, SubTrajectory};

/// Gap and length limits applied when cutting an emitter's detections into trajectories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentationRules {
    /// Consecutive missed frames tolerated inside one trajectory.
    pub max_blink: usize,
    pub min_length: usize,
}

impl SegmentationRules {
    pub fn from_params(params: &SimulationParams) -> Self {
        Self {
            max_blink: params.max_blink,
            min_length: params.min_traj_length,
        }
    }

    fn max_gap(&self) -> usize {
        self.max_blink + 1
    }
}

/// Splits one emitter's frame-ordered detections into accepted sub-trajectories.
///
/// A frame gap larger than `max_blink + 1` closes the running segment, which is
/// kept when it has at least `min_length` points. The gap leading into the final
/// detection is never tested: the last point always joins the running segment.
pub fn segment(detections: &[PathPoint], rules: &SegmentationRules) -> Vec<SubTrajectory> {
    let mut accepted = Vec::new();
    let Some(last) = detections.len().checked_sub(1) else {
        return accepted;
    };

    let mut start = 0;
    for i in 1..detections.len() {
        let gap = detections[i].frame - detections[i - 1].frame;
        if i < last && gap > rules.max_gap() {
            if i - start >= rules.min_length {
                accepted.push(SubTrajectory {
                    points: detections[start..i].to_vec(),
                });
            }
            start = i;
        }
    }
    if last + 1 - start >= rules.min_length {
        accepted.push(SubTrajectory {
            points: detections[start..].to_vec(),
        });
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detections(frames: &[usize]) -> Vec<PathPoint> {
        frames
            .iter()
            .map(|&frame| PathPoint {
                frame,
                x_um: frame as f64 * 0.1,
                y_um: 0.0,
                step_um: 0.1,
            })
            .collect()
    }

    fn frames(trajectory: &SubTrajectory) -> Vec<usize> {
        trajectory.points.iter().map(|p| p.frame).collect()
    }

    const STRICT: SegmentationRules = SegmentationRules {
        max_blink: 0,
        min_length: 5,
    };

    #[test]
    fn empty_input_yields_nothing() {
        assert!(segment(&[], &STRICT).is_empty());
    }

    #[test]
    fn single_detection_accepted_only_for_unit_minimum() {
        let rules = SegmentationRules {
            max_blink: 0,
            min_length: 1,
        };
        assert_eq!(segment(&detections(&[4]), &rules).len(), 1);
        assert!(segment(&detections(&[4]), &STRICT).is_empty());
    }

    #[test]
    fn contiguous_run_is_one_trajectory() {
        let result = segment(&detections(&[1, 2, 3, 4, 5, 6]), &STRICT);
        assert_eq!(result.len(), 1);
        assert_eq!(frames(&result[0]), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn one_frame_gap_splits_into_two_when_both_sides_long_enough() {
        let result = segment(&detections(&[1, 2, 3, 4, 5, 7, 8, 9, 10, 11]), &STRICT);
        assert_eq!(result.len(), 2);
        assert_eq!(frames(&result[0]), vec![1, 2, 3, 4, 5]);
        assert_eq!(frames(&result[1]), vec![7, 8, 9, 10, 11]);
    }

    #[test]
    fn one_frame_gap_in_eight_frame_run_leaves_nothing() {
        let result = segment(&detections(&[1, 2, 3, 4, 6, 7, 8, 9]), &STRICT);
        assert!(result.is_empty());
    }

    #[test]
    fn one_frame_gap_keeps_only_long_side() {
        let result = segment(&detections(&[1, 2, 6, 7, 8, 9, 10]), &STRICT);
        assert_eq!(result.len(), 1);
        assert_eq!(frames(&result[0]), vec![6, 7, 8, 9, 10]);
    }

    #[test]
    fn tolerated_blinks_do_not_split() {
        let rules = SegmentationRules {
            max_blink: 2,
            min_length: 5,
        };
        let result = segment(&detections(&[1, 2, 5, 6, 9, 10]), &rules);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].len(), 6);
    }

    #[test]
    fn gap_before_final_detection_does_not_split() {
        // Boundary behaviour kept on purpose: the 96-frame gap before the final
        // point is ignored and that point is appended to the running segment.
        let result = segment(&detections(&[1, 2, 3, 4, 100]), &STRICT);
        assert_eq!(result.len(), 1);
        assert_eq!(frames(&result[0]), vec![1, 2, 3, 4, 100]);
    }

    #[test]
    fn accepted_trajectories_respect_rules_away_from_final_boundary() {
        let rules = SegmentationRules {
            max_blink: 1,
            min_length: 3,
        };
        let input = detections(&[1, 2, 3, 5, 6, 10, 11, 12, 13, 20, 21, 30, 31, 32, 40]);
        let result = segment(&input, &rules);
        for trajectory in &result {
            assert!(trajectory.len() >= rules.min_length);
            let gaps: Vec<usize> = trajectory
                .points
                .windows(2)
                .map(|w| w[1].frame - w[0].frame)
                .collect();
            let is_final = trajectory.last_frame() == input.last().map(|p| p.frame);
            let checked = if is_final { &gaps[..gaps.len() - 1] } else { &gaps[..] };
            assert!(checked.iter().all(|&g| g <= rules.max_blink + 1));
        }
        let all: Vec<Vec<usize>> = result.iter().map(frames).collect();
        assert_eq!(
            all,
            vec![vec![1, 2, 3, 5, 6], vec![10, 11, 12, 13], vec![30, 31, 32, 40]]
        );
    }
}
