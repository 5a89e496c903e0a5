//! Core types for the Kinesia assessment engine
//!
//! This module defines the data structures that flow through each stage of the
//! engine: canonical frame observations, per-tick measurement samples, composite
//! results, and the assembled output handed to the persistence boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Assessment domain identifier.
///
/// Serialized values match the persistence boundary's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssessmentDomain {
    GaitAnalysis,
    Tremor,
    EyeMovement,
    FingerTapping,
    NeckMobility,
    FacialSymmetry,
    SpeechPattern,
    ResponseTime,
}

impl AssessmentDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentDomain::GaitAnalysis => "GAIT_ANALYSIS",
            AssessmentDomain::Tremor => "TREMOR",
            AssessmentDomain::EyeMovement => "EYE_MOVEMENT",
            AssessmentDomain::FingerTapping => "FINGER_TAPPING",
            AssessmentDomain::NeckMobility => "NECK_MOBILITY",
            AssessmentDomain::FacialSymmetry => "FACIAL_SYMMETRY",
            AssessmentDomain::SpeechPattern => "SPEECH_PATTERN",
            AssessmentDomain::ResponseTime => "RESPONSE_TIME",
        }
    }

    /// All supported domains, in a stable order
    pub fn all() -> &'static [AssessmentDomain] {
        &[
            AssessmentDomain::GaitAnalysis,
            AssessmentDomain::Tremor,
            AssessmentDomain::EyeMovement,
            AssessmentDomain::FingerTapping,
            AssessmentDomain::NeckMobility,
            AssessmentDomain::FacialSymmetry,
            AssessmentDomain::SpeechPattern,
            AssessmentDomain::ResponseTime,
        ]
    }
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Aborted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "PENDING",
            SessionStatus::Running => "RUNNING",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Aborted => "ABORTED",
        }
    }
}

/// Canonical names for the landmarks the calculators look up.
///
/// The perception collaborator is free to send more; these are the ones the
/// engine consumes.
pub mod keys {
    pub const NOSE: &str = "nose";
    pub const LEFT_EYE: &str = "left_eye";
    pub const RIGHT_EYE: &str = "right_eye";
    pub const LEFT_EAR: &str = "left_ear";
    pub const RIGHT_EAR: &str = "right_ear";
    pub const LEFT_SHOULDER: &str = "left_shoulder";
    pub const RIGHT_SHOULDER: &str = "right_shoulder";
    pub const LEFT_HIP: &str = "left_hip";
    pub const RIGHT_HIP: &str = "right_hip";
    pub const LEFT_KNEE: &str = "left_knee";
    pub const RIGHT_KNEE: &str = "right_knee";
    pub const LEFT_ANKLE: &str = "left_ankle";
    pub const RIGHT_ANKLE: &str = "right_ankle";
    pub const THUMB_TIP: &str = "thumb_tip";
    pub const INDEX_TIP: &str = "index_tip";
    pub const LEFT_EYEBROW: &str = "left_eyebrow";
    pub const RIGHT_EYEBROW: &str = "right_eyebrow";
    pub const MOUTH_LEFT: &str = "mouth_left";
    pub const MOUTH_RIGHT: &str = "mouth_right";
    pub const JAW_LEFT: &str = "jaw_left";
    pub const JAW_RIGHT: &str = "jaw_right";
}

/// A named 2D/3D point with detection confidence.
///
/// Confidence is always within [0,1]. A keypoint the detector did not see is
/// absent from the frame, never present with fabricated coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    pub confidence: f64,
}

impl Keypoint {
    /// Euclidean distance to another keypoint (3D when both carry z)
    pub fn distance_to(&self, other: &Keypoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = match (self.z, other.z) {
            (Some(a), Some(b)) => a - b,
            _ => 0.0,
        };
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// One audio-feature sample for the speech domain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioSample {
    /// Input level in dBFS (typically -90..-10)
    pub volume_db: Option<f64>,
    /// Fundamental frequency estimate in Hz
    pub pitch_hz: Option<f64>,
    /// Whether the tick contained voiced speech
    #[serde(default)]
    pub voiced: bool,
}

/// A validated per-tick observation.
///
/// Landmarks are keyed by canonical name; lookup returns `None` for points the
/// detector did not report this tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameObservation {
    pub timestamp: DateTime<Utc>,
    pub landmarks: BTreeMap<String, Keypoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioSample>,
    /// Stimulus-to-response latency reported by the host for response-time rounds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_latency_ms: Option<f64>,
}

impl FrameObservation {
    pub fn keypoint(&self, name: &str) -> Option<&Keypoint> {
        self.landmarks.get(name)
    }

    /// Midpoint of two named keypoints, if both are present.
    ///
    /// Confidence of the midpoint is the weaker of the two contributors.
    pub fn midpoint(&self, a: &str, b: &str) -> Option<Keypoint> {
        let pa = self.keypoint(a)?;
        let pb = self.keypoint(b)?;
        Some(Keypoint {
            x: (pa.x + pb.x) / 2.0,
            y: (pa.y + pb.y) / 2.0,
            z: match (pa.z, pb.z) {
                (Some(za), Some(zb)) => Some((za + zb) / 2.0),
                _ => None,
            },
            confidence: pa.confidence.min(pb.confidence),
        })
    }
}

/// 2D velocity of a reference point
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub x: f64,
    pub y: f64,
}

impl Velocity {
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

/// Bilateral symmetry scores (0-100)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SymmetryScores {
    pub overall: f64,
    pub leg: f64,
    pub arm: f64,
}

/// Postural stability scores
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StabilityScores {
    /// Composite stability (0-100)
    pub score: f64,
    pub lateral_sway: f64,
    pub vertical_sway: f64,
}

/// Angle at one joint with the confidence of the weakest contributing keypoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointAngle {
    pub joint: String,
    /// Normalized to [0,180] degrees
    pub angle_deg: f64,
    pub confidence: f64,
}

/// Instantaneous gait metrics
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GaitMetrics {
    pub velocity: Velocity,
    /// Vertical alignment of shoulder-center over hip-center (0-100)
    pub balance: f64,
    pub symmetry: SymmetryScores,
    pub stability: StabilityScores,
    pub joint_angles: Vec<JointAngle>,
}

/// Tremor frequency band classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TremorBand {
    None,
    Resting,
    Action,
    Postural,
}

/// Qualitative severity band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityBand {
    None,
    Mild,
    Moderate,
    Severe,
}

/// Instantaneous tremor metrics over the calculator's short position window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TremorMetrics {
    /// Dominant oscillation rate (Hz)
    pub frequency_hz: f64,
    /// Peak-to-peak displacement of the tracked fingertip
    pub amplitude: f64,
    pub peak_count: u32,
    pub band: TremorBand,
    pub severity: SeverityBand,
}

impl Default for TremorMetrics {
    fn default() -> Self {
        Self {
            frequency_hz: 0.0,
            amplitude: 0.0,
            peak_count: 0,
            band: TremorBand::None,
            severity: SeverityBand::None,
        }
    }
}

/// Eye-movement test stage kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EyePhaseKind {
    Calibration,
    Saccadic,
    Pursuit,
    Fixation,
}

/// Instantaneous eye-movement metrics against the active stage target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeMetrics {
    pub stage: EyePhaseKind,
    /// Target-focusing precision (0-100)
    pub accuracy: f64,
    /// Gaze velocity scaled against the expected maximum (0-100)
    pub speed: f64,
    /// Inverse inter-eye jitter (0-100)
    pub smoothness: f64,
    /// Weighted blend of the three sub-metrics (0-100)
    pub composite: f64,
}

/// Instantaneous finger-tapping metrics
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TapMetrics {
    /// Thumb-to-index fingertip distance
    pub distance: f64,
    pub is_tapping: bool,
    /// Taps registered so far in the active phase
    pub tap_count: u32,
    pub taps_per_sec: f64,
    /// Interval consistency (0-100)
    pub rhythm: f64,
    /// Valid taps over total taps (0-100)
    pub accuracy: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_interval_ms: Option<f64>,
}

/// Neck position being measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeckPosition {
    Neutral,
    Flexion,
    Extension,
    Rotation,
}

impl NeckPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            NeckPosition::Neutral => "neutral",
            NeckPosition::Flexion => "flexion",
            NeckPosition::Extension => "extension",
            NeckPosition::Rotation => "rotation",
        }
    }
}

/// Instantaneous neck-mobility metrics for the active position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeckMetrics {
    pub position: NeckPosition,
    /// Angle relative to the neutral baseline, degrees
    pub angle_deg: f64,
    /// Share of the normal range of motion reached (0-100)
    pub percent_of_normal: f64,
}

/// Advisory risk band for a neurological condition heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Low,
    Moderate,
    High,
}

/// Advisory risk indicator. A classification aid, not a diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskIndicator {
    /// 0-1, higher = more asymmetry-driven risk signal
    pub score: f64,
    pub band: RiskBand,
}

/// Advisory neurological indicators derived from facial asymmetry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FacialRisk {
    pub bells_palsy: RiskIndicator,
    pub stroke: RiskIndicator,
    pub parkinsons: RiskIndicator,
}

/// Instantaneous facial-symmetry metrics.
///
/// Region scores are absent when the frame lacked that region's landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacialMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eye_symmetry: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eyebrow_symmetry: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mouth_symmetry: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jaw_symmetry: Option<f64>,
    /// Mean of the available region scores (0-100)
    pub overall: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<FacialRisk>,
}

/// Instantaneous speech-pattern metrics
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpeechMetrics {
    /// Input level mapped from dBFS to 0-100
    pub volume_level: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_hz: Option<f64>,
    /// Inverse scaled pitch variance over the calculator window (0-100)
    pub pitch_stability: f64,
    /// Pauses (silence runs in the clinical range) detected so far
    pub pause_count: u32,
    /// Fraction of ticks with voiced speech (0-1)
    pub speaking_ratio: f64,
}

/// Instantaneous response-time metrics
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResponseMetrics {
    pub latency_ms: f64,
    pub rounds: u32,
    pub average_ms: f64,
    pub fastest_ms: f64,
    pub slowest_ms: f64,
}

/// Per-domain metric payload of one measurement sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainMetrics {
    GaitAnalysis(GaitMetrics),
    Tremor(TremorMetrics),
    EyeMovement(EyeMetrics),
    FingerTapping(TapMetrics),
    NeckMobility(NeckMetrics),
    FacialSymmetry(FacialMetrics),
    SpeechPattern(SpeechMetrics),
    ResponseTime(ResponseMetrics),
}

impl DomainMetrics {
    pub fn domain(&self) -> AssessmentDomain {
        match self {
            DomainMetrics::GaitAnalysis(_) => AssessmentDomain::GaitAnalysis,
            DomainMetrics::Tremor(_) => AssessmentDomain::Tremor,
            DomainMetrics::EyeMovement(_) => AssessmentDomain::EyeMovement,
            DomainMetrics::FingerTapping(_) => AssessmentDomain::FingerTapping,
            DomainMetrics::NeckMobility(_) => AssessmentDomain::NeckMobility,
            DomainMetrics::FacialSymmetry(_) => AssessmentDomain::FacialSymmetry,
            DomainMetrics::SpeechPattern(_) => AssessmentDomain::SpeechPattern,
            DomainMetrics::ResponseTime(_) => AssessmentDomain::ResponseTime,
        }
    }
}

/// One instantaneous calculator result, immutable once produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSample {
    pub timestamp: DateTime<Utc>,
    /// Name of the phase that was active when the sample was produced
    pub phase: String,
    /// Whether required input was missing and defaults were substituted
    pub degraded: bool,
    #[serde(flatten)]
    pub metrics: DomainMetrics,
}

/// One named sub-score contributing to a composite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    pub name: String,
    /// Clamped to 0-100
    pub value: f64,
    /// Contribution weight; weights per domain sum to 1.0
    pub weight: f64,
}

/// Qualitative interpretation band for a composite score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    Excellent,
    Good,
    Fair,
    Poor,
}

/// Final weighted composite for one completed (or partial) session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeResult {
    pub domain: AssessmentDomain,
    pub sub_scores: Vec<SubScore>,
    /// Weighted overall score, clamped to 0-100
    pub overall: f64,
    pub band: ScoreBand,
    /// Set when one or more sub-metrics had no valid samples
    pub degraded: bool,
    /// Names of sub-metrics that were entirely unavailable
    pub missing: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<FacialRisk>,
}

/// Aggregates snapshotted when a phase exits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub name: String,
    pub sample_count: u32,
    pub degraded_count: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Mean of each scored field over the phase's samples
    pub averages: BTreeMap<String, f64>,
}

/// Producer stamp embedded in every assembled result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerInfo {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Session metadata carried on the assembled result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub phases: Vec<PhaseSummary>,
}

/// Final packaged result, ready for the external persistence boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(rename = "type")]
    pub kind: AssessmentDomain,
    /// Full raw sample trail (not capped by the rolling window)
    pub data: Vec<MeasurementSample>,
    pub metrics: CompositeResult,
    pub status: SessionStatus,
    /// Set when the session was stopped or aborted before completing
    pub partial: bool,
    pub session: SessionMetadata,
    pub producer: ProducerInfo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_domain_serialization() {
        let json = serde_json::to_string(&AssessmentDomain::GaitAnalysis).unwrap();
        assert_eq!(json, "\"GAIT_ANALYSIS\"");

        let parsed: AssessmentDomain = serde_json::from_str("\"NECK_MOBILITY\"").unwrap();
        assert_eq!(parsed, AssessmentDomain::NeckMobility);
    }

    #[test]
    fn test_keypoint_distance() {
        let a = Keypoint {
            x: 0.0,
            y: 0.0,
            z: None,
            confidence: 1.0,
        };
        let b = Keypoint {
            x: 3.0,
            y: 4.0,
            z: None,
            confidence: 1.0,
        };
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_midpoint_takes_weaker_confidence() {
        let mut landmarks = BTreeMap::new();
        landmarks.insert(
            keys::LEFT_HIP.to_string(),
            Keypoint {
                x: 0.0,
                y: 0.0,
                z: None,
                confidence: 0.9,
            },
        );
        landmarks.insert(
            keys::RIGHT_HIP.to_string(),
            Keypoint {
                x: 2.0,
                y: 2.0,
                z: None,
                confidence: 0.4,
            },
        );
        let frame = FrameObservation {
            timestamp: Utc::now(),
            landmarks,
            frame_width: None,
            frame_height: None,
            audio: None,
            response_latency_ms: None,
        };

        let mid = frame.midpoint(keys::LEFT_HIP, keys::RIGHT_HIP).unwrap();
        assert_eq!(mid.x, 1.0);
        assert_eq!(mid.y, 1.0);
        assert_eq!(mid.confidence, 0.4);
    }

    #[test]
    fn test_missing_keypoint_is_none() {
        let frame = FrameObservation {
            timestamp: Utc::now(),
            landmarks: BTreeMap::new(),
            frame_width: None,
            frame_height: None,
            audio: None,
            response_latency_ms: None,
        };
        assert!(frame.keypoint(keys::NOSE).is_none());
        assert!(frame.midpoint(keys::LEFT_HIP, keys::RIGHT_HIP).is_none());
    }

    #[test]
    fn test_sample_serialization_is_domain_tagged() {
        let sample = MeasurementSample {
            timestamp: Utc::now(),
            phase: "walk".to_string(),
            degraded: false,
            metrics: DomainMetrics::Tremor(TremorMetrics::default()),
        };

        let value = serde_json::to_value(&sample).unwrap();
        assert_eq!(value["domain"], "TREMOR");
        assert_eq!(value["phase"], "walk");
        assert_eq!(value["band"], "none");
    }
}
