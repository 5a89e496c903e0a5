//! Metric calculators
//!
//! One calculator family per assessment domain. All share the same contract:
//! never panic, degrade to the documented zero-value metrics when required
//! keypoints are missing, and flag degraded samples for downstream quality
//! assessment. The neck calculator's neutral-baseline precondition is the one
//! documented exception that surfaces as a recoverable error.

mod eye;
mod facial;
mod gait;
mod neck;
mod response;
mod speech;
mod tapping;
mod tremor;

pub use eye::{
    EyeCalculator, EYE_WEIGHT_ACCURACY, EYE_WEIGHT_SMOOTHNESS, EYE_WEIGHT_VELOCITY,
};
pub use facial::FacialCalculator;
pub use gait::GaitCalculator;
pub use neck::NeckCalculator;
pub use response::ResponseCalculator;
pub use speech::SpeechCalculator;
pub use tapping::TapCalculator;
pub use tremor::TremorCalculator;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::types::{
    AssessmentDomain, DomainMetrics, FrameObservation, Keypoint, MeasurementSample,
};

/// Per-tick context handed to a calculator by the engine
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    /// Previous valid observation, if any
    pub prev: Option<&'a FrameObservation>,
    /// Seconds since the previous valid observation (0 for the first)
    pub dt_sec: f64,
    /// Name of the active phase
    pub phase_name: &'a str,
    /// Seconds since the active phase started
    pub elapsed_in_phase_sec: f64,
    /// Seconds since the session started
    pub elapsed_in_session_sec: f64,
}

/// A per-domain instantaneous metric calculator.
///
/// Calculators own whatever phase-local state their formulas need (position
/// windows, tap intervals, baselines) and are reset on phase entry.
pub trait MetricCalculator {
    fn domain(&self) -> AssessmentDomain;

    /// Compute one measurement sample from the current observation.
    ///
    /// Only the neck calculator's missing-baseline precondition may return
    /// an error; every other anomaly degrades to defaults.
    fn process(
        &mut self,
        frame: &FrameObservation,
        ctx: &TickContext,
    ) -> Result<MeasurementSample, EngineError>;

    /// Phase entry action: clear phase-local buffers
    fn reset_phase(&mut self);
}

/// Construct the calculator for a domain.
///
/// This is the single dispatch point on the domain variant; nothing else in
/// the engine branches on the domain to pick computation.
pub fn calculator_for(
    domain: AssessmentDomain,
    config: &EngineConfig,
) -> Box<dyn MetricCalculator> {
    match domain {
        AssessmentDomain::GaitAnalysis => Box::new(GaitCalculator::new()),
        AssessmentDomain::Tremor => Box::new(TremorCalculator::new(config.tremor)),
        AssessmentDomain::EyeMovement => Box::new(EyeCalculator::new()),
        AssessmentDomain::FingerTapping => Box::new(TapCalculator::new(config.tap_threshold)),
        AssessmentDomain::NeckMobility => Box::new(NeckCalculator::new()),
        AssessmentDomain::FacialSymmetry => Box::new(FacialCalculator::new()),
        AssessmentDomain::SpeechPattern => Box::new(SpeechCalculator::new()),
        AssessmentDomain::ResponseTime => Box::new(ResponseCalculator::new()),
    }
}

/// Build a sample stamped with the frame's timestamp and the active phase
pub(crate) fn make_sample(
    frame: &FrameObservation,
    ctx: &TickContext,
    degraded: bool,
    metrics: DomainMetrics,
) -> MeasurementSample {
    MeasurementSample {
        timestamp: frame.timestamp,
        phase: ctx.phase_name.to_string(),
        degraded,
        metrics,
    }
}

/// Angle at `center` formed by rays to `a` and `b`, normalized to [0,180]
pub(crate) fn three_point_angle(center: &Keypoint, a: &Keypoint, b: &Keypoint) -> f64 {
    let angle1 = (a.y - center.y).atan2(a.x - center.x);
    let angle2 = (b.y - center.y).atan2(b.x - center.x);
    let mut angle = (angle1 - angle2).to_degrees();
    if angle < 0.0 {
        angle += 360.0;
    }
    if angle > 180.0 {
        angle = 360.0 - angle;
    }
    angle
}

/// Angle of the `from`→`to` ray against the vertical axis, in [0,180]
pub(crate) fn angle_to_vertical(from: &Keypoint, to: &Keypoint) -> f64 {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    dx.abs().atan2(dy).to_degrees().abs()
}

/// Population variance of a slice; 0 for fewer than two values
pub(crate) fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kp(x: f64, y: f64) -> Keypoint {
        Keypoint {
            x,
            y,
            z: None,
            confidence: 1.0,
        }
    }

    #[test]
    fn test_three_point_angle_right_angle() {
        let center = kp(0.0, 0.0);
        let a = kp(1.0, 0.0);
        let b = kp(0.0, 1.0);
        assert!((three_point_angle(&center, &a, &b) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_three_point_angle_straight_line() {
        let center = kp(0.0, 0.0);
        let a = kp(-1.0, 0.0);
        let b = kp(1.0, 0.0);
        assert!((three_point_angle(&center, &a, &b) - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_three_point_angle_in_bounds() {
        let center = kp(3.0, -2.0);
        let a = kp(-7.0, 4.5);
        let b = kp(9.0, 9.0);
        let angle = three_point_angle(&center, &a, &b);
        assert!((0.0..=180.0).contains(&angle));
    }

    #[test]
    fn test_angle_to_vertical() {
        // Straight down (screen coordinates grow downward)
        let a = angle_to_vertical(&kp(0.0, 0.0), &kp(0.0, 5.0));
        assert!(a.abs() < 1e-9);

        // Horizontal
        let b = angle_to_vertical(&kp(0.0, 0.0), &kp(5.0, 0.0));
        assert!((b - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_variance() {
        assert_eq!(variance(&[]), 0.0);
        assert_eq!(variance(&[3.0]), 0.0);
        let v = variance(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((v - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_calculator_lookup_covers_all_domains() {
        let config = EngineConfig::default();
        for &domain in AssessmentDomain::all() {
            let calc = calculator_for(domain, &config);
            assert_eq!(calc.domain(), domain);
        }
    }
}
