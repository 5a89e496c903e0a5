//! Eye-movement metric calculation
//!
//! Scores gaze accuracy, speed and smoothness against the active test
//! stage's target. Targets live in percent-of-frame coordinates; gaze is
//! normalized into the same space when frame dimensions are known.

use log::warn;

use crate::error::EngineError;
use crate::metrics::{make_sample, MetricCalculator, TickContext};
use crate::types::{
    keys, AssessmentDomain, DomainMetrics, EyeMetrics, EyePhaseKind, FrameObservation,
    MeasurementSample,
};

/// Composite blend weights (velocity/accuracy/smoothness); must sum to 1.0
pub const EYE_WEIGHT_VELOCITY: f64 = 0.3;
pub const EYE_WEIGHT_ACCURACY: f64 = 0.4;
pub const EYE_WEIGHT_SMOOTHNESS: f64 = 0.3;

/// Expected maximum gaze speed used for scaling (units/s)
const EXPECTED_MAX_SPEED: f64 = 500.0;

/// Accuracy falls to zero at the far corner of the 100x100 target space
const MAX_TARGET_DISTANCE: f64 = 141.4;

/// Saccade target grid, percent coordinates
const SACCADE_GRID: [(f64, f64); 4] = [(20.0, 50.0), (80.0, 50.0), (50.0, 20.0), (50.0, 80.0)];

/// Seconds each saccade target stays on screen
const SACCADE_DWELL_SEC: f64 = 2.0;

/// Pursuit circle: radius (percent) and full-revolution period (seconds)
const PURSUIT_RADIUS: f64 = 30.0;
const PURSUIT_PERIOD_SEC: f64 = 8.0;

/// Eye-movement metric calculator
pub struct EyeCalculator {
    prev_gaze: Option<(f64, f64)>,
    prev_inter_eye: Option<(f64, f64)>,
}

impl EyeCalculator {
    pub fn new() -> Self {
        Self {
            prev_gaze: None,
            prev_inter_eye: None,
        }
    }
}

impl Default for EyeCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricCalculator for EyeCalculator {
    fn domain(&self) -> AssessmentDomain {
        AssessmentDomain::EyeMovement
    }

    fn process(
        &mut self,
        frame: &FrameObservation,
        ctx: &TickContext,
    ) -> Result<MeasurementSample, EngineError> {
        let stage = stage_for_phase(ctx.phase_name);

        let (Some(left), Some(right)) = (
            frame.keypoint(keys::LEFT_EYE),
            frame.keypoint(keys::RIGHT_EYE),
        ) else {
            warn!("eye calculation degraded: eye landmarks not detected");
            return Ok(make_sample(
                frame,
                ctx,
                true,
                DomainMetrics::EyeMovement(EyeMetrics {
                    stage,
                    accuracy: 0.0,
                    speed: 0.0,
                    smoothness: 0.0,
                    composite: 0.0,
                }),
            ));
        };

        let (lx, ly) = to_percent(frame, left.x, left.y);
        let (rx, ry) = to_percent(frame, right.x, right.y);
        let gaze = ((lx + rx) / 2.0, (ly + ry) / 2.0);
        let inter_eye = (lx - rx, ly - ry);

        let target = target_for(stage, ctx.elapsed_in_phase_sec);
        let accuracy = compute_accuracy(gaze, target);
        let speed = compute_speed(gaze, self.prev_gaze, ctx.dt_sec);
        let smoothness = compute_smoothness(inter_eye, self.prev_inter_eye);

        self.prev_gaze = Some(gaze);
        self.prev_inter_eye = Some(inter_eye);

        let composite = EYE_WEIGHT_VELOCITY * speed
            + EYE_WEIGHT_ACCURACY * accuracy
            + EYE_WEIGHT_SMOOTHNESS * smoothness;

        Ok(make_sample(
            frame,
            ctx,
            false,
            DomainMetrics::EyeMovement(EyeMetrics {
                stage,
                accuracy,
                speed,
                smoothness,
                composite,
            }),
        ))
    }

    fn reset_phase(&mut self) {
        self.prev_gaze = None;
        self.prev_inter_eye = None;
    }
}

/// Map the phase name onto the test stage kind
pub(crate) fn stage_for_phase(phase_name: &str) -> EyePhaseKind {
    match phase_name {
        "calibration" => EyePhaseKind::Calibration,
        "saccadic" => EyePhaseKind::Saccadic,
        "pursuit" => EyePhaseKind::Pursuit,
        _ => EyePhaseKind::Fixation,
    }
}

/// Target position (percent coordinates) for a stage at a moment in time
pub(crate) fn target_for(stage: EyePhaseKind, elapsed_sec: f64) -> (f64, f64) {
    match stage {
        EyePhaseKind::Calibration | EyePhaseKind::Fixation => (50.0, 50.0),
        EyePhaseKind::Saccadic => {
            let index = (elapsed_sec / SACCADE_DWELL_SEC).max(0.0) as usize % SACCADE_GRID.len();
            SACCADE_GRID[index]
        }
        EyePhaseKind::Pursuit => {
            let theta = 2.0 * std::f64::consts::PI * elapsed_sec / PURSUIT_PERIOD_SEC;
            (50.0 + PURSUIT_RADIUS * theta.cos(), 50.0 + PURSUIT_RADIUS * theta.sin())
        }
    }
}

fn to_percent(frame: &FrameObservation, x: f64, y: f64) -> (f64, f64) {
    match (frame.frame_width, frame.frame_height) {
        (Some(w), Some(h)) => (x / w * 100.0, y / h * 100.0),
        // Without dimensions the producer is assumed to send percent already
        _ => (x, y),
    }
}

/// Inverse normalized distance to the target, 0-100
fn compute_accuracy(gaze: (f64, f64), target: (f64, f64)) -> f64 {
    let distance = ((gaze.0 - target.0).powi(2) + (gaze.1 - target.1).powi(2)).sqrt();
    (100.0 - distance * 100.0 / MAX_TARGET_DISTANCE).max(0.0)
}

/// Gaze velocity scaled against the expected maximum, 0-100
fn compute_speed(gaze: (f64, f64), prev: Option<(f64, f64)>, dt_sec: f64) -> f64 {
    let Some(prev) = prev else {
        return 0.0;
    };
    if dt_sec <= 0.0 {
        return 0.0;
    }
    let distance = ((gaze.0 - prev.0).powi(2) + (gaze.1 - prev.1).powi(2)).sqrt();
    let speed = distance / dt_sec;
    (speed / EXPECTED_MAX_SPEED * 100.0).min(100.0)
}

/// Inverse inter-eye jitter, 0-100. Jitter is the frame-to-frame change of
/// the vector between the two eyes, so a still gaze scores 100.
fn compute_smoothness(inter_eye: (f64, f64), prev: Option<(f64, f64)>) -> f64 {
    let Some(prev) = prev else {
        return 100.0;
    };
    let jitter = (inter_eye.0 - prev.0).abs() + (inter_eye.1 - prev.1).abs();
    (100.0 - jitter * 5.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Keypoint;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn eye_frame(lx: f64, ly: f64, rx: f64, ry: f64) -> FrameObservation {
        let mut landmarks = BTreeMap::new();
        landmarks.insert(
            keys::LEFT_EYE.to_string(),
            Keypoint {
                x: lx,
                y: ly,
                z: None,
                confidence: 0.9,
            },
        );
        landmarks.insert(
            keys::RIGHT_EYE.to_string(),
            Keypoint {
                x: rx,
                y: ry,
                z: None,
                confidence: 0.9,
            },
        );
        FrameObservation {
            timestamp: Utc::now(),
            landmarks,
            frame_width: Some(640.0),
            frame_height: Some(480.0),
            audio: None,
            response_latency_ms: None,
        }
    }

    fn ctx(phase: &'static str, elapsed: f64, dt: f64) -> TickContext<'static> {
        TickContext {
            prev: None,
            dt_sec: dt,
            phase_name: phase,
            elapsed_in_phase_sec: elapsed,
            elapsed_in_session_sec: elapsed,
        }
    }

    fn eye(sample: &MeasurementSample) -> &EyeMetrics {
        match &sample.metrics {
            DomainMetrics::EyeMovement(e) => e,
            _ => panic!("expected eye metrics"),
        }
    }

    #[test]
    fn test_gaze_on_target_is_full_accuracy() {
        let mut calc = EyeCalculator::new();
        // Eyes centered on frame center: gaze = (50%, 50%)
        let frame = eye_frame(300.0, 240.0, 340.0, 240.0);
        let sample = calc.process(&frame, &ctx("fixation", 1.0, 0.033)).unwrap();
        let metrics = eye(&sample);
        assert!((metrics.accuracy - 100.0).abs() < 1e-6);
        assert_eq!(metrics.stage, EyePhaseKind::Fixation);
    }

    #[test]
    fn test_still_gaze_is_fully_smooth() {
        let mut calc = EyeCalculator::new();
        let frame = eye_frame(300.0, 240.0, 340.0, 240.0);
        calc.process(&frame, &ctx("fixation", 1.0, 0.033)).unwrap();
        let sample = calc.process(&frame, &ctx("fixation", 1.03, 0.033)).unwrap();
        let metrics = eye(&sample);
        assert_eq!(metrics.smoothness, 100.0);
        assert_eq!(metrics.speed, 0.0);
    }

    #[test]
    fn test_zero_dt_speed_is_zero() {
        let mut calc = EyeCalculator::new();
        let frame = eye_frame(300.0, 240.0, 340.0, 240.0);
        calc.process(&frame, &ctx("pursuit", 0.0, 0.033)).unwrap();
        let moved = eye_frame(350.0, 240.0, 390.0, 240.0);
        let sample = calc.process(&moved, &ctx("pursuit", 0.0, 0.0)).unwrap();
        assert_eq!(eye(&sample).speed, 0.0);
    }

    #[test]
    fn test_missing_eyes_degrade() {
        let mut calc = EyeCalculator::new();
        let mut frame = eye_frame(300.0, 240.0, 340.0, 240.0);
        frame.landmarks.remove(keys::RIGHT_EYE);
        let sample = calc.process(&frame, &ctx("saccadic", 1.0, 0.033)).unwrap();
        assert!(sample.degraded);
        assert_eq!(eye(&sample).accuracy, 0.0);
    }

    #[test]
    fn test_saccade_targets_cycle() {
        assert_eq!(target_for(EyePhaseKind::Saccadic, 0.0), (20.0, 50.0));
        assert_eq!(target_for(EyePhaseKind::Saccadic, 2.5), (80.0, 50.0));
        assert_eq!(target_for(EyePhaseKind::Saccadic, 4.5), (50.0, 20.0));
        assert_eq!(target_for(EyePhaseKind::Saccadic, 6.5), (50.0, 80.0));
        assert_eq!(target_for(EyePhaseKind::Saccadic, 8.5), (20.0, 50.0));
    }

    #[test]
    fn test_pursuit_target_stays_on_circle() {
        for step in 0..16 {
            let (x, y) = target_for(EyePhaseKind::Pursuit, step as f64 * 0.5);
            let r = ((x - 50.0).powi(2) + (y - 50.0).powi(2)).sqrt();
            assert!((r - PURSUIT_RADIUS).abs() < 1e-9);
        }
    }

    #[test]
    fn test_composite_blend_weights() {
        assert!(
            (EYE_WEIGHT_VELOCITY + EYE_WEIGHT_ACCURACY + EYE_WEIGHT_SMOOTHNESS - 1.0).abs() < 1e-12
        );

        let mut calc = EyeCalculator::new();
        let frame = eye_frame(300.0, 240.0, 340.0, 240.0);
        calc.process(&frame, &ctx("fixation", 1.0, 0.033)).unwrap();
        let sample = calc.process(&frame, &ctx("fixation", 1.03, 0.033)).unwrap();
        let metrics = eye(&sample);
        let expected = EYE_WEIGHT_VELOCITY * metrics.speed
            + EYE_WEIGHT_ACCURACY * metrics.accuracy
            + EYE_WEIGHT_SMOOTHNESS * metrics.smoothness;
        assert!((metrics.composite - expected).abs() < 1e-9);
    }

    #[test]
    fn test_scores_within_bounds_on_wild_input() {
        let mut calc = EyeCalculator::new();
        let frame = eye_frame(-5000.0, 9000.0, 7000.0, -1200.0);
        calc.process(&frame, &ctx("saccadic", 0.1, 0.01)).unwrap();
        let frame2 = eye_frame(5000.0, -9000.0, -7000.0, 1200.0);
        let sample = calc.process(&frame2, &ctx("saccadic", 0.11, 0.01)).unwrap();
        let metrics = eye(&sample);
        assert!((0.0..=100.0).contains(&metrics.accuracy));
        assert!((0.0..=100.0).contains(&metrics.speed));
        assert!((0.0..=100.0).contains(&metrics.smoothness));
        assert!((0.0..=100.0).contains(&metrics.composite));
    }
}
