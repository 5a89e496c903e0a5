//! Neck-mobility metric calculation
//!
//! Measures head position angles against a neutral baseline captured at the
//! start of the assessment. Flexion, extension and rotation are scored as a
//! share of the normal range of motion.

use log::warn;

use crate::error::EngineError;
use crate::metrics::{make_sample, MetricCalculator, TickContext};
use crate::types::{
    keys, AssessmentDomain, DomainMetrics, FrameObservation, MeasurementSample, NeckMetrics,
    NeckPosition,
};

/// Normal ranges of motion, degrees
const NORMAL_FLEXION_DEG: f64 = 40.0;
const NORMAL_EXTENSION_DEG: f64 = 50.0;
const NORMAL_ROTATION_DEG: f64 = 70.0;

/// Neck-mobility calculator.
///
/// The neutral baseline is session-scoped: it is captured during the neutral
/// phase and survives phase transitions.
pub struct NeckCalculator {
    neutral_angle: Option<f64>,
}

impl NeckCalculator {
    pub fn new() -> Self {
        Self {
            neutral_angle: None,
        }
    }

    /// Capture the neutral baseline from the current head position.
    /// Returns false when the required landmarks are missing.
    pub fn set_neutral(&mut self, frame: &FrameObservation) -> bool {
        match neck_angle(frame) {
            Some(angle) => {
                self.neutral_angle = Some(angle);
                true
            }
            None => false,
        }
    }

    pub fn has_neutral(&self) -> bool {
        self.neutral_angle.is_some()
    }

    /// Measure one position against the neutral baseline.
    ///
    /// Measuring anything but the neutral position before the baseline is
    /// set is a precondition violation, not a computed angle.
    pub fn measure(
        &mut self,
        position: NeckPosition,
        frame: &FrameObservation,
    ) -> Result<Option<NeckMetrics>, EngineError> {
        if position == NeckPosition::Neutral {
            if self.neutral_angle.is_none() && !self.set_neutral(frame) {
                return Ok(None);
            }
            let Some(current) = neck_angle(frame) else {
                return Ok(None);
            };
            return Ok(Some(NeckMetrics {
                position,
                angle_deg: current - self.neutral_angle.unwrap_or(current),
                percent_of_normal: 0.0,
            }));
        }

        let Some(neutral) = self.neutral_angle else {
            return Err(EngineError::NeutralBaselineNotSet(
                position.as_str().to_string(),
            ));
        };

        let (angle_deg, normal) = match position {
            NeckPosition::Flexion => {
                let Some(current) = neck_angle(frame) else {
                    return Ok(None);
                };
                ((neutral - current).max(0.0), NORMAL_FLEXION_DEG)
            }
            NeckPosition::Extension => {
                let Some(current) = neck_angle(frame) else {
                    return Ok(None);
                };
                ((current - neutral).max(0.0), NORMAL_EXTENSION_DEG)
            }
            NeckPosition::Rotation => {
                let Some(rotation) = rotation_angle(frame) else {
                    return Ok(None);
                };
                (rotation.abs(), NORMAL_ROTATION_DEG)
            }
            NeckPosition::Neutral => unreachable!(),
        };

        // Readings beyond 1.5x the normal range are tracker glitches
        let angle_deg = angle_deg.min(normal * 1.5);
        let percent_of_normal = (angle_deg / normal * 100.0).min(100.0);

        Ok(Some(NeckMetrics {
            position,
            angle_deg,
            percent_of_normal,
        }))
    }
}

impl Default for NeckCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricCalculator for NeckCalculator {
    fn domain(&self) -> AssessmentDomain {
        AssessmentDomain::NeckMobility
    }

    fn process(
        &mut self,
        frame: &FrameObservation,
        ctx: &TickContext,
    ) -> Result<MeasurementSample, EngineError> {
        let position = position_for_phase(ctx.phase_name);

        match self.measure(position, frame)? {
            Some(metrics) => Ok(make_sample(
                frame,
                ctx,
                false,
                DomainMetrics::NeckMobility(metrics),
            )),
            None => {
                warn!("neck calculation degraded: head landmarks not detected");
                Ok(make_sample(
                    frame,
                    ctx,
                    true,
                    DomainMetrics::NeckMobility(NeckMetrics {
                        position,
                        angle_deg: 0.0,
                        percent_of_normal: 0.0,
                    }),
                ))
            }
        }
    }

    // The neutral baseline is session-scoped by design; there is no
    // phase-local buffer to clear.
    fn reset_phase(&mut self) {}
}

/// Map the phase name onto the neck position being captured
pub(crate) fn position_for_phase(phase_name: &str) -> NeckPosition {
    match phase_name {
        "flexion" => NeckPosition::Flexion,
        "extension" => NeckPosition::Extension,
        "rotation" => NeckPosition::Rotation,
        _ => NeckPosition::Neutral,
    }
}

/// Sagittal neck angle: shoulder-midpoint to ear-midpoint vector against the
/// vertical, negative when the head tilts forward. Clamped to ±90.
fn neck_angle(frame: &FrameObservation) -> Option<f64> {
    let ear_mid = frame.midpoint(keys::LEFT_EAR, keys::RIGHT_EAR)?;
    let shoulder_mid = frame.midpoint(keys::LEFT_SHOULDER, keys::RIGHT_SHOULDER)?;

    let vx = ear_mid.x - shoulder_mid.x;
    let vy = ear_mid.y - shoulder_mid.y;
    let angle = -vx.atan2(-vy).to_degrees();
    Some(angle.clamp(-90.0, 90.0))
}

/// Rotation from nose-to-ear distance asymmetry, scaled to ±70 degrees.
/// Positive when the head is turned right.
fn rotation_angle(frame: &FrameObservation) -> Option<f64> {
    let nose = frame.keypoint(keys::NOSE)?;
    let left_ear = frame.keypoint(keys::LEFT_EAR)?;
    let right_ear = frame.keypoint(keys::RIGHT_EAR)?;

    let left_dist = nose.distance_to(left_ear);
    let right_dist = nose.distance_to(right_ear);
    let total = left_dist + right_dist;
    if total <= 0.0 {
        return Some(0.0);
    }

    let rotation = (left_dist - right_dist) / total * NORMAL_ROTATION_DEG;
    Some(rotation.clamp(-NORMAL_ROTATION_DEG, NORMAL_ROTATION_DEG))
}
