//! Gait metric calculation
//!
//! Computes instantaneous velocity, balance, bilateral symmetry, stability
//! and joint angles from consecutive pose observations.

use log::warn;

use crate::error::EngineError;
use crate::metrics::{
    angle_to_vertical, make_sample, three_point_angle, MetricCalculator, TickContext,
};
use crate::types::{
    keys, AssessmentDomain, DomainMetrics, FrameObservation, GaitMetrics, JointAngle,
    MeasurementSample, StabilityScores, SymmetryScores, Velocity,
};

/// Joints scored per frame, with their adjacent points. A `None` second
/// neighbour marks a terminal joint measured against the vertical axis.
const JOINT_CONNECTIONS: &[(&str, &str, Option<&str>)] = &[
    (keys::LEFT_HIP, keys::LEFT_KNEE, Some(keys::LEFT_SHOULDER)),
    (keys::RIGHT_HIP, keys::RIGHT_KNEE, Some(keys::RIGHT_SHOULDER)),
    (keys::LEFT_KNEE, keys::LEFT_HIP, Some(keys::LEFT_ANKLE)),
    (keys::RIGHT_KNEE, keys::RIGHT_HIP, Some(keys::RIGHT_ANKLE)),
    (keys::LEFT_ANKLE, keys::LEFT_KNEE, None),
    (keys::RIGHT_ANKLE, keys::RIGHT_KNEE, None),
];

/// Gait metric calculator
pub struct GaitCalculator;

impl GaitCalculator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GaitCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricCalculator for GaitCalculator {
    fn domain(&self) -> AssessmentDomain {
        AssessmentDomain::GaitAnalysis
    }

    fn process(
        &mut self,
        frame: &FrameObservation,
        ctx: &TickContext,
    ) -> Result<MeasurementSample, EngineError> {
        let velocity = compute_velocity(frame, ctx.prev, ctx.dt_sec);
        let balance = compute_balance(frame);
        let symmetry = compute_symmetry(frame);
        let stability = compute_stability(frame);
        let joint_angles = compute_joint_angles(frame);

        let degraded = balance.is_none() || symmetry.is_none() || stability.is_none();
        if degraded {
            warn!(
                "gait calculation degraded: missing keypoints at phase '{}'",
                ctx.phase_name
            );
        }

        let metrics = GaitMetrics {
            velocity,
            balance: balance.unwrap_or(0.0),
            symmetry: symmetry.unwrap_or_default(),
            stability: stability.unwrap_or_default(),
            joint_angles,
        };

        Ok(make_sample(
            frame,
            ctx,
            degraded,
            DomainMetrics::GaitAnalysis(metrics),
        ))
    }

    fn reset_phase(&mut self) {}
}

/// Velocity of the hip-center reference point between consecutive frames.
/// Zero when there is no previous frame or elapsed time is zero.
fn compute_velocity(frame: &FrameObservation, prev: Option<&FrameObservation>, dt_sec: f64) -> Velocity {
    let Some(prev) = prev else {
        return Velocity::default();
    };
    if dt_sec <= 0.0 {
        return Velocity::default();
    }

    let (Some(current), Some(last)) = (
        frame.midpoint(keys::LEFT_HIP, keys::RIGHT_HIP),
        prev.midpoint(keys::LEFT_HIP, keys::RIGHT_HIP),
    ) else {
        return Velocity::default();
    };

    Velocity {
        x: (current.x - last.x) / dt_sec,
        y: (current.y - last.y) / dt_sec,
    }
}

/// Vertical alignment of shoulder-center over hip-center, 0-100
fn compute_balance(frame: &FrameObservation) -> Option<f64> {
    let hip_center = frame.midpoint(keys::LEFT_HIP, keys::RIGHT_HIP)?;
    let shoulder_center = frame.midpoint(keys::LEFT_SHOULDER, keys::RIGHT_SHOULDER)?;

    let vertical_alignment = (hip_center.x - shoulder_center.x).abs();
    Some((100.0 - vertical_alignment * 2.0).max(0.0))
}

/// Bilateral symmetry from left/right thigh segment lengths, 0-100
fn compute_symmetry(frame: &FrameObservation) -> Option<SymmetryScores> {
    let left_hip = frame.keypoint(keys::LEFT_HIP)?;
    let right_hip = frame.keypoint(keys::RIGHT_HIP)?;
    let left_knee = frame.keypoint(keys::LEFT_KNEE)?;
    let right_knee = frame.keypoint(keys::RIGHT_KNEE)?;

    let left_leg = left_hip.distance_to(left_knee);
    let right_leg = right_hip.distance_to(right_knee);
    let leg = (100.0 - (left_leg - right_leg).abs()).clamp(0.0, 100.0);

    // Arm landmarks are frequently out of frame during gait; score legs and
    // fall back to arm parity when shoulders are tracked.
    let arm = match (
        frame.keypoint(keys::LEFT_SHOULDER),
        frame.keypoint(keys::RIGHT_SHOULDER),
    ) {
        (Some(ls), Some(rs)) => {
            let left_arm = left_hip.distance_to(ls);
            let right_arm = right_hip.distance_to(rs);
            (100.0 - (left_arm - right_arm).abs()).clamp(0.0, 100.0)
        }
        _ => 100.0,
    };

    Some(SymmetryScores {
        overall: leg,
        leg,
        arm,
    })
}

/// Head sway relative to hip-center, inverted to 0-100
fn compute_stability(frame: &FrameObservation) -> Option<StabilityScores> {
    let nose = frame.keypoint(keys::NOSE)?;
    let hip_center = frame.midpoint(keys::LEFT_HIP, keys::RIGHT_HIP)?;

    let lateral_sway = (nose.x - hip_center.x).abs();
    let vertical_sway = (nose.y - hip_center.y).abs() / 100.0;
    let score = (100.0 - (lateral_sway + vertical_sway * 50.0)).max(0.0);

    Some(StabilityScores {
        score,
        lateral_sway,
        vertical_sway,
    })
}

/// Per-joint angles with the confidence of the weakest contributing keypoint.
/// Joints with missing neighbours are skipped, not zero-filled.
fn compute_joint_angles(frame: &FrameObservation) -> Vec<JointAngle> {
    let mut angles = Vec::new();

    for &(joint_name, neighbour_a, neighbour_b) in JOINT_CONNECTIONS {
        let Some(joint) = frame.keypoint(joint_name) else {
            continue;
        };
        let Some(a) = frame.keypoint(neighbour_a) else {
            continue;
        };

        let (angle_deg, confidence) = match neighbour_b.and_then(|n| frame.keypoint(n)) {
            Some(b) => (
                three_point_angle(joint, a, b),
                joint.confidence.min(a.confidence).min(b.confidence),
            ),
            None => (
                angle_to_vertical(joint, a),
                joint.confidence.min(a.confidence),
            ),
        };

        angles.push(JointAngle {
            joint: joint_name.to_string(),
            angle_deg,
            confidence,
        });
    }

    angles
}
