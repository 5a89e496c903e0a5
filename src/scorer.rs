//! Composite scoring
//!
//! Applies the per-domain formulas over the full measurement trail (not just
//! the last snapshot) and combines sub-scores through explicit weight tables.
//! Every weight table sums to 1.0. A sub-metric with no valid samples
//! contributes 0 and flags the composite as degraded instead of failing.

use log::warn;

use crate::types::{
    AssessmentDomain, CompositeResult, DomainMetrics, FacialRisk, MeasurementSample, ScoreBand,
    SubScore,
};

// ---------------------------------------------------------------------------
// Weight tables. Preserved from the original assessment implementation as
// labeled constants; each domain's weights sum to 1.0.
// ---------------------------------------------------------------------------

/// Gait: speed / balance / stability / symmetry / joint range
pub const GAIT_WEIGHT_SPEED: f64 = 0.25;
pub const GAIT_WEIGHT_BALANCE: f64 = 0.20;
pub const GAIT_WEIGHT_STABILITY: f64 = 0.20;
pub const GAIT_WEIGHT_SYMMETRY: f64 = 0.20;
pub const GAIT_WEIGHT_JOINT_RANGE: f64 = 0.15;

/// Tremor steadiness: inverse frequency / inverse amplitude
pub const TREMOR_WEIGHT_FREQUENCY: f64 = 0.5;
pub const TREMOR_WEIGHT_AMPLITUDE: f64 = 0.5;

/// Finger tapping: accuracy / rhythm
pub const TAP_WEIGHT_ACCURACY: f64 = 0.5;
pub const TAP_WEIGHT_RHYTHM: f64 = 0.5;

/// Neck: the four captured positions weigh equally
pub const NECK_WEIGHT_PER_POSITION: f64 = 0.25;

/// Facial: the four regions weigh equally
pub const FACIAL_WEIGHT_PER_REGION: f64 = 0.25;

/// Speech: volume / pitch stability / fluency
pub const SPEECH_WEIGHT_VOLUME: f64 = 0.30;
pub const SPEECH_WEIGHT_PITCH_STABILITY: f64 = 0.35;
pub const SPEECH_WEIGHT_FLUENCY: f64 = 0.35;

// ---------------------------------------------------------------------------
// Scaling constants
// ---------------------------------------------------------------------------

/// Normal walking speed range (m/s)
const NORMAL_WALK_SPEED_MIN: f64 = 1.0;
const NORMAL_WALK_SPEED_MAX: f64 = 1.4;

/// Coordinate units per metre assumed for uncalibrated camera streams
const SPEED_UNITS_PER_METRE: f64 = 250.0;

/// Joint range of motion considered full mobility (degrees)
const NORMAL_JOINT_RANGE_DEG: f64 = 60.0;

/// Frequency and amplitude at which tremor steadiness bottoms out
const TREMOR_MAX_FREQUENCY_HZ: f64 = 12.0;
const TREMOR_MAX_AMPLITUDE: f64 = 3.0;

/// Fluency penalty per detected pause (points)
const SPEECH_PAUSE_PENALTY: f64 = 5.0;

/// Response-time latency mapping: full score at or under the floor,
/// zero at or over the ceiling (milliseconds)
const RESPONSE_BEST_MS: f64 = 200.0;
const RESPONSE_WORST_MS: f64 = 1000.0;

/// Fields surfaced in real-time window summaries, per domain
pub struct ScoredField {
    pub name: &'static str,
    pub extract: fn(&MeasurementSample) -> Option<f64>,
}

/// Instantaneous fields for UI aggregates. Degraded samples yield `None` so
/// substituted defaults never skew the averages.
pub fn scored_fields(domain: AssessmentDomain) -> &'static [ScoredField] {
    match domain {
        AssessmentDomain::GaitAnalysis => &[
            ScoredField { name: "speed", extract: gait_speed },
            ScoredField { name: "balance", extract: gait_balance },
            ScoredField { name: "stability", extract: gait_stability },
            ScoredField { name: "symmetry", extract: gait_symmetry },
        ],
        AssessmentDomain::Tremor => &[
            ScoredField { name: "frequency_hz", extract: tremor_frequency },
            ScoredField { name: "amplitude", extract: tremor_amplitude },
        ],
        AssessmentDomain::EyeMovement => &[
            ScoredField { name: "accuracy", extract: eye_accuracy },
            ScoredField { name: "speed", extract: eye_speed },
            ScoredField { name: "smoothness", extract: eye_smoothness },
            ScoredField { name: "composite", extract: eye_composite },
        ],
        AssessmentDomain::FingerTapping => &[
            ScoredField { name: "taps_per_sec", extract: tap_rate },
            ScoredField { name: "rhythm", extract: tap_rhythm },
            ScoredField { name: "accuracy", extract: tap_accuracy },
        ],
        AssessmentDomain::NeckMobility => &[
            ScoredField { name: "angle_deg", extract: neck_angle },
            ScoredField { name: "percent_of_normal", extract: neck_percent },
        ],
        AssessmentDomain::FacialSymmetry => &[ScoredField {
            name: "symmetry",
            extract: facial_overall,
        }],
        AssessmentDomain::SpeechPattern => &[
            ScoredField { name: "volume", extract: speech_volume },
            ScoredField { name: "pitch_stability", extract: speech_pitch_stability },
        ],
        AssessmentDomain::ResponseTime => &[
            ScoredField { name: "latency_ms", extract: response_latency },
            ScoredField { name: "average_ms", extract: response_average },
        ],
    }
}

/// Composite scorer over a full measurement trail
pub struct CompositeScorer;

impl CompositeScorer {
    /// Compute the composite result for a session's trail.
    ///
    /// Works on whatever samples exist; an empty or partially-missing trail
    /// produces a degraded result, never an error.
    pub fn score(domain: AssessmentDomain, trail: &[MeasurementSample]) -> CompositeResult {
        let sub_scores = match domain {
            AssessmentDomain::GaitAnalysis => score_gait(trail),
            AssessmentDomain::Tremor => score_tremor(trail),
            AssessmentDomain::EyeMovement => score_eye(trail),
            AssessmentDomain::FingerTapping => score_tapping(trail),
            AssessmentDomain::NeckMobility => score_neck(trail),
            AssessmentDomain::FacialSymmetry => score_facial(trail),
            AssessmentDomain::SpeechPattern => score_speech(trail),
            AssessmentDomain::ResponseTime => score_response(trail),
        };

        let missing: Vec<String> = sub_scores
            .iter()
            .filter(|s| s.value.is_none())
            .map(|s| s.name.to_string())
            .collect();
        let degraded = !missing.is_empty();
        if degraded {
            warn!(
                "{} composite degraded: no valid samples for {:?}",
                domain.as_str(),
                missing
            );
        }

        let overall = sub_scores
            .iter()
            .map(|s| s.value.unwrap_or(0.0).clamp(0.0, 100.0) * s.weight)
            .sum::<f64>()
            .clamp(0.0, 100.0);

        let risk = match domain {
            AssessmentDomain::FacialSymmetry => facial_risk(trail),
            _ => None,
        };

        CompositeResult {
            domain,
            sub_scores: sub_scores
                .into_iter()
                .map(|s| SubScore {
                    name: s.name.to_string(),
                    value: s.value.unwrap_or(0.0).clamp(0.0, 100.0),
                    weight: s.weight,
                })
                .collect(),
            overall,
            band: interpret(overall),
            degraded,
            missing,
            risk,
        }
    }
}

/// Qualitative interpretation of a 0-100 score
pub fn interpret(score: f64) -> ScoreBand {
    if score >= 90.0 {
        ScoreBand::Excellent
    } else if score >= 75.0 {
        ScoreBand::Good
    } else if score >= 60.0 {
        ScoreBand::Fair
    } else {
        ScoreBand::Poor
    }
}

/// Map a raw value onto 0-100 against a normal range. Values inside the range
/// land between 70 and 100; values below scale toward 0; values above decay
/// gently from 100.
fn normalize_to_score(value: f64, min: f64, max: f64) -> f64 {
    if value < min {
        (70.0 * (value / min)).max(0.0)
    } else if value > max {
        (100.0 - 10.0 * ((value - max) / max)).max(0.0)
    } else {
        70.0 + 30.0 * ((value - min) / (max - min))
    }
}

struct RawSubScore {
    name: &'static str,
    value: Option<f64>,
    weight: f64,
}

fn average(trail: &[MeasurementSample], extract: fn(&MeasurementSample) -> Option<f64>) -> Option<f64> {
    let values: Vec<f64> = trail.iter().filter_map(extract).filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn last_value(trail: &[MeasurementSample], extract: fn(&MeasurementSample) -> Option<f64>) -> Option<f64> {
    trail.iter().rev().filter_map(extract).find(|v| v.is_finite())
}

// --- gait ------------------------------------------------------------------

fn score_gait(trail: &[MeasurementSample]) -> Vec<RawSubScore> {
    let speed = average(trail, gait_speed).map(|avg| {
        normalize_to_score(
            avg / SPEED_UNITS_PER_METRE,
            NORMAL_WALK_SPEED_MIN,
            NORMAL_WALK_SPEED_MAX,
        )
    });
    let joint_range = joint_range_score(trail);

    vec![
        RawSubScore { name: "speed", value: speed, weight: GAIT_WEIGHT_SPEED },
        RawSubScore {
            name: "balance",
            value: average(trail, gait_balance),
            weight: GAIT_WEIGHT_BALANCE,
        },
        RawSubScore {
            name: "stability",
            value: average(trail, gait_stability),
            weight: GAIT_WEIGHT_STABILITY,
        },
        RawSubScore {
            name: "symmetry",
            value: average(trail, gait_symmetry),
            weight: GAIT_WEIGHT_SYMMETRY,
        },
        RawSubScore {
            name: "joint_range",
            value: joint_range,
            weight: GAIT_WEIGHT_JOINT_RANGE,
        },
    ]
}

/// Mean range of motion across tracked joints, scaled against full mobility
fn joint_range_score(trail: &[MeasurementSample]) -> Option<f64> {
    use std::collections::BTreeMap;

    let mut ranges: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for sample in trail {
        if sample.degraded {
            continue;
        }
        if let DomainMetrics::GaitAnalysis(g) = &sample.metrics {
            for joint in &g.joint_angles {
                let entry = ranges
                    .entry(joint.joint.as_str())
                    .or_insert((joint.angle_deg, joint.angle_deg));
                entry.0 = entry.0.min(joint.angle_deg);
                entry.1 = entry.1.max(joint.angle_deg);
            }
        }
    }
    if ranges.is_empty() {
        return None;
    }
    let mean_range = ranges
        .values()
        .map(|(min, max)| max - min)
        .sum::<f64>()
        / ranges.len() as f64;
    Some((mean_range / NORMAL_JOINT_RANGE_DEG * 100.0).min(100.0))
}

// --- tremor ----------------------------------------------------------------

fn score_tremor(trail: &[MeasurementSample]) -> Vec<RawSubScore> {
    let frequency = average(trail, tremor_frequency)
        .map(|f| (100.0 * (1.0 - (f / TREMOR_MAX_FREQUENCY_HZ).clamp(0.0, 1.0))).clamp(0.0, 100.0));
    let amplitude = average(trail, tremor_amplitude)
        .map(|a| (100.0 * (1.0 - (a / TREMOR_MAX_AMPLITUDE).clamp(0.0, 1.0))).clamp(0.0, 100.0));

    vec![
        RawSubScore {
            name: "frequency_steadiness",
            value: frequency,
            weight: TREMOR_WEIGHT_FREQUENCY,
        },
        RawSubScore {
            name: "amplitude_steadiness",
            value: amplitude,
            weight: TREMOR_WEIGHT_AMPLITUDE,
        },
    ]
}

// --- eye -------------------------------------------------------------------

fn score_eye(trail: &[MeasurementSample]) -> Vec<RawSubScore> {
    use crate::metrics::{EYE_WEIGHT_ACCURACY, EYE_WEIGHT_SMOOTHNESS, EYE_WEIGHT_VELOCITY};

    vec![
        RawSubScore {
            name: "velocity",
            value: average(trail, eye_speed),
            weight: EYE_WEIGHT_VELOCITY,
        },
        RawSubScore {
            name: "accuracy",
            value: average(trail, eye_accuracy),
            weight: EYE_WEIGHT_ACCURACY,
        },
        RawSubScore {
            name: "smoothness",
            value: average(trail, eye_smoothness),
            weight: EYE_WEIGHT_SMOOTHNESS,
        },
    ]
}

// --- finger tapping --------------------------------------------------------

fn score_tapping(trail: &[MeasurementSample]) -> Vec<RawSubScore> {
    // Tap metrics accumulate within the phase, so the final sample carries
    // the session's totals.
    vec![
        RawSubScore {
            name: "accuracy",
            value: last_value(trail, tap_accuracy),
            weight: TAP_WEIGHT_ACCURACY,
        },
        RawSubScore {
            name: "rhythm",
            value: last_value(trail, tap_rhythm),
            weight: TAP_WEIGHT_RHYTHM,
        },
    ]
}

// --- neck ------------------------------------------------------------------

fn score_neck(trail: &[MeasurementSample]) -> Vec<RawSubScore> {
    use crate::types::NeckPosition;

    let best = |position: NeckPosition| -> Option<f64> {
        trail
            .iter()
            .filter(|s| !s.degraded)
            .filter_map(|s| match &s.metrics {
                DomainMetrics::NeckMobility(n) if n.position == position => {
                    Some(n.percent_of_normal)
                }
                _ => None,
            })
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
    };

    // The neutral position anchors the baseline and scores full when captured
    let neutral = trail.iter().any(|s| {
        !s.degraded
            && matches!(
                &s.metrics,
                DomainMetrics::NeckMobility(n) if n.position == NeckPosition::Neutral
            )
    });

    vec![
        RawSubScore {
            name: "neutral",
            value: if neutral { Some(100.0) } else { None },
            weight: NECK_WEIGHT_PER_POSITION,
        },
        RawSubScore {
            name: "flexion",
            value: best(NeckPosition::Flexion),
            weight: NECK_WEIGHT_PER_POSITION,
        },
        RawSubScore {
            name: "extension",
            value: best(NeckPosition::Extension),
            weight: NECK_WEIGHT_PER_POSITION,
        },
        RawSubScore {
            name: "rotation",
            value: best(NeckPosition::Rotation),
            weight: NECK_WEIGHT_PER_POSITION,
        },
    ]
}

// --- facial ----------------------------------------------------------------

fn score_facial(trail: &[MeasurementSample]) -> Vec<RawSubScore> {
    let region = |extract: fn(&MeasurementSample) -> Option<f64>, name: &'static str| RawSubScore {
        name,
        value: average(trail, extract),
        weight: FACIAL_WEIGHT_PER_REGION,
    };

    vec![
        region(facial_eyes, "eye_symmetry"),
        region(facial_eyebrows, "eyebrow_symmetry"),
        region(facial_mouth, "mouth_symmetry"),
        region(facial_jaw, "jaw_symmetry"),
    ]
}

/// Most conservative (highest) risk reading per indicator across the trail
fn facial_risk(trail: &[MeasurementSample]) -> Option<FacialRisk> {
    trail
        .iter()
        .filter(|s| !s.degraded)
        .filter_map(|s| match &s.metrics {
            DomainMetrics::FacialSymmetry(f) => f.risk,
            _ => None,
        })
        .reduce(|worst, candidate| {
            let pick = |a: crate::types::RiskIndicator, b: crate::types::RiskIndicator| {
                if b.score > a.score {
                    b
                } else {
                    a
                }
            };
            FacialRisk {
                bells_palsy: pick(worst.bells_palsy, candidate.bells_palsy),
                stroke: pick(worst.stroke, candidate.stroke),
                parkinsons: pick(worst.parkinsons, candidate.parkinsons),
            }
        })
}

// --- speech ----------------------------------------------------------------

fn score_speech(trail: &[MeasurementSample]) -> Vec<RawSubScore> {
    let fluency = last_value(trail, speech_speaking_ratio).map(|ratio| {
        let pauses = last_value(trail, speech_pauses).unwrap_or(0.0);
        (ratio * 100.0 - pauses * SPEECH_PAUSE_PENALTY).clamp(0.0, 100.0)
    });

    vec![
        RawSubScore {
            name: "volume",
            value: average(trail, speech_volume),
            weight: SPEECH_WEIGHT_VOLUME,
        },
        RawSubScore {
            name: "pitch_stability",
            value: last_value(trail, speech_pitch_stability),
            weight: SPEECH_WEIGHT_PITCH_STABILITY,
        },
        RawSubScore {
            name: "fluency",
            value: fluency,
            weight: SPEECH_WEIGHT_FLUENCY,
        },
    ]
}

// --- response time ---------------------------------------------------------

fn score_response(trail: &[MeasurementSample]) -> Vec<RawSubScore> {
    let value = last_value(trail, response_average).map(|avg| {
        ((RESPONSE_WORST_MS - avg) / (RESPONSE_WORST_MS - RESPONSE_BEST_MS) * 100.0)
            .clamp(0.0, 100.0)
    });

    vec![RawSubScore {
        name: "reaction",
        value,
        weight: 1.0,
    }]
}

// --- field extractors ------------------------------------------------------

fn gait_speed(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::GaitAnalysis(g), false) => Some(g.velocity.magnitude()),
        _ => None,
    }
}

fn gait_balance(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::GaitAnalysis(g), false) => Some(g.balance),
        _ => None,
    }
}

fn gait_stability(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::GaitAnalysis(g), false) => Some(g.stability.score),
        _ => None,
    }
}

fn gait_symmetry(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::GaitAnalysis(g), false) => Some(g.symmetry.overall),
        _ => None,
    }
}

fn tremor_frequency(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::Tremor(t), false) => Some(t.frequency_hz),
        _ => None,
    }
}

fn tremor_amplitude(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::Tremor(t), false) => Some(t.amplitude),
        _ => None,
    }
}

fn eye_accuracy(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::EyeMovement(e), false) => Some(e.accuracy),
        _ => None,
    }
}

fn eye_speed(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::EyeMovement(e), false) => Some(e.speed),
        _ => None,
    }
}

fn eye_smoothness(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::EyeMovement(e), false) => Some(e.smoothness),
        _ => None,
    }
}

fn eye_composite(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::EyeMovement(e), false) => Some(e.composite),
        _ => None,
    }
}

fn tap_rate(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::FingerTapping(t), false) => Some(t.taps_per_sec),
        _ => None,
    }
}

fn tap_rhythm(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::FingerTapping(t), false) => Some(t.rhythm),
        _ => None,
    }
}

fn tap_accuracy(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::FingerTapping(t), false) => Some(t.accuracy),
        _ => None,
    }
}

fn neck_angle(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::NeckMobility(n), false) => Some(n.angle_deg),
        _ => None,
    }
}

fn neck_percent(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::NeckMobility(n), false) => Some(n.percent_of_normal),
        _ => None,
    }
}

fn facial_overall(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::FacialSymmetry(f), false) => Some(f.overall),
        _ => None,
    }
}

fn facial_eyes(s: &MeasurementSample) -> Option<f64> {
    match &s.metrics {
        DomainMetrics::FacialSymmetry(f) => f.eye_symmetry,
        _ => None,
    }
}

fn facial_eyebrows(s: &MeasurementSample) -> Option<f64> {
    match &s.metrics {
        DomainMetrics::FacialSymmetry(f) => f.eyebrow_symmetry,
        _ => None,
    }
}

fn facial_mouth(s: &MeasurementSample) -> Option<f64> {
    match &s.metrics {
        DomainMetrics::FacialSymmetry(f) => f.mouth_symmetry,
        _ => None,
    }
}

fn facial_jaw(s: &MeasurementSample) -> Option<f64> {
    match &s.metrics {
        DomainMetrics::FacialSymmetry(f) => f.jaw_symmetry,
        _ => None,
    }
}

fn speech_volume(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::SpeechPattern(sp), false) => Some(sp.volume_level),
        _ => None,
    }
}

fn speech_pitch_stability(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::SpeechPattern(sp), false) => Some(sp.pitch_stability),
        _ => None,
    }
}

fn speech_speaking_ratio(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::SpeechPattern(sp), false) => Some(sp.speaking_ratio),
        _ => None,
    }
}

fn speech_pauses(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::SpeechPattern(sp), false) => Some(sp.pause_count as f64),
        _ => None,
    }
}

fn response_latency(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::ResponseTime(r), false) => Some(r.latency_ms),
        _ => None,
    }
}

fn response_average(s: &MeasurementSample) -> Option<f64> {
    match (&s.metrics, s.degraded) {
        (DomainMetrics::ResponseTime(r), false) => Some(r.average_ms),
        _ => None,
    }
}
