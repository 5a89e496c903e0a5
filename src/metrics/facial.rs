//! Facial-symmetry metric calculation
//!
//! Scores left/right symmetry per facial region against the face midline and
//! derives advisory neurological risk indicators from the asymmetries. The
//! indicators are classification aids only, never diagnoses.

use log::warn;

use crate::error::EngineError;
use crate::metrics::{make_sample, MetricCalculator, TickContext};
use crate::types::{
    keys, AssessmentDomain, DomainMetrics, FacialMetrics, FacialRisk, FrameObservation,
    MeasurementSample, RiskBand, RiskIndicator,
};

/// Risk band thresholds on the 0-1 asymmetry score
const RISK_HIGH_THRESHOLD: f64 = 0.4;
const RISK_MODERATE_THRESHOLD: f64 = 0.25;

/// Region weights feeding the Bell's palsy heuristic (mouth/eye/eyebrow)
const BELLS_WEIGHT_MOUTH: f64 = 0.5;
const BELLS_WEIGHT_EYE: f64 = 0.3;
const BELLS_WEIGHT_EYEBROW: f64 = 0.2;

/// Region weights feeding the stroke heuristic (mouth/eye)
const STROKE_WEIGHT_MOUTH: f64 = 0.6;
const STROKE_WEIGHT_EYE: f64 = 0.4;

/// Scale on mean asymmetry feeding the Parkinson's (hypomimia) heuristic
const PARKINSONS_SCALE: f64 = 0.5;

/// Facial-symmetry metric calculator
pub struct FacialCalculator;

impl FacialCalculator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FacialCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricCalculator for FacialCalculator {
    fn domain(&self) -> AssessmentDomain {
        AssessmentDomain::FacialSymmetry
    }

    fn process(
        &mut self,
        frame: &FrameObservation,
        ctx: &TickContext,
    ) -> Result<MeasurementSample, EngineError> {
        let Some(nose) = frame.keypoint(keys::NOSE) else {
            warn!("facial calculation degraded: no midline reference");
            return Ok(make_sample(
                frame,
                ctx,
                true,
                DomainMetrics::FacialSymmetry(FacialMetrics {
                    eye_symmetry: None,
                    eyebrow_symmetry: None,
                    mouth_symmetry: None,
                    jaw_symmetry: None,
                    overall: 0.0,
                    risk: None,
                }),
            ));
        };
        let midline_x = nose.x;

        let eye_symmetry = region_symmetry(frame, keys::LEFT_EYE, keys::RIGHT_EYE, midline_x);
        let eyebrow_symmetry =
            region_symmetry(frame, keys::LEFT_EYEBROW, keys::RIGHT_EYEBROW, midline_x);
        let mouth_symmetry = region_symmetry(frame, keys::MOUTH_LEFT, keys::MOUTH_RIGHT, midline_x);
        let jaw_symmetry = region_symmetry(frame, keys::JAW_LEFT, keys::JAW_RIGHT, midline_x);

        let regions: Vec<f64> = [eye_symmetry, eyebrow_symmetry, mouth_symmetry, jaw_symmetry]
            .into_iter()
            .flatten()
            .collect();

        if regions.is_empty() {
            warn!("facial calculation degraded: no region landmarks detected");
            return Ok(make_sample(
                frame,
                ctx,
                true,
                DomainMetrics::FacialSymmetry(FacialMetrics {
                    eye_symmetry: None,
                    eyebrow_symmetry: None,
                    mouth_symmetry: None,
                    jaw_symmetry: None,
                    overall: 0.0,
                    risk: None,
                }),
            ));
        }

        let overall = regions.iter().sum::<f64>() / regions.len() as f64;
        let degraded = regions.len() < 4;
        let risk = derive_risk(eye_symmetry, eyebrow_symmetry, mouth_symmetry, jaw_symmetry);

        Ok(make_sample(
            frame,
            ctx,
            degraded,
            DomainMetrics::FacialSymmetry(FacialMetrics {
                eye_symmetry,
                eyebrow_symmetry,
                mouth_symmetry,
                jaw_symmetry,
                overall,
                risk,
            }),
        ))
    }

    fn reset_phase(&mut self) {}
}

/// Symmetry of one left/right landmark pair around the midline, 0-100.
/// Identical distances score 100.
fn region_symmetry(
    frame: &FrameObservation,
    left: &str,
    right: &str,
    midline_x: f64,
) -> Option<f64> {
    let left = frame.keypoint(left)?;
    let right = frame.keypoint(right)?;

    let left_dist = (left.x - midline_x).abs();
    let right_dist = (right.x - midline_x).abs();
    let total = left_dist + right_dist;
    if total <= 0.0 {
        return Some(100.0);
    }

    let symmetry = 1.0 - (left_dist - right_dist).abs() / total;
    Some((symmetry * 100.0).clamp(0.0, 100.0))
}

/// Advisory risk indicators from region asymmetries.
///
/// Requires at least the mouth and eye regions; the thresholds and weights
/// are the original heuristic constants, preserved without clinical
/// reinterpretation.
fn derive_risk(
    eye: Option<f64>,
    eyebrow: Option<f64>,
    mouth: Option<f64>,
    jaw: Option<f64>,
) -> Option<FacialRisk> {
    let eye_asym = 1.0 - eye? / 100.0;
    let mouth_asym = 1.0 - mouth? / 100.0;
    let eyebrow_asym = eyebrow.map(|s| 1.0 - s / 100.0).unwrap_or(eye_asym);

    let bells = BELLS_WEIGHT_MOUTH * mouth_asym
        + BELLS_WEIGHT_EYE * eye_asym
        + BELLS_WEIGHT_EYEBROW * eyebrow_asym;
    let stroke = STROKE_WEIGHT_MOUTH * mouth_asym + STROKE_WEIGHT_EYE * eye_asym;

    let mut asyms = vec![eye_asym, mouth_asym, eyebrow_asym];
    if let Some(jaw) = jaw {
        asyms.push(1.0 - jaw / 100.0);
    }
    let parkinsons = asyms.iter().sum::<f64>() / asyms.len() as f64 * PARKINSONS_SCALE;

    Some(FacialRisk {
        bells_palsy: indicator(bells),
        stroke: indicator(stroke),
        parkinsons: indicator(parkinsons),
    })
}

fn indicator(score: f64) -> RiskIndicator {
    let score = score.clamp(0.0, 1.0);
    let band = if score > RISK_HIGH_THRESHOLD {
        RiskBand::High
    } else if score > RISK_MODERATE_THRESHOLD {
        RiskBand::Moderate
    } else {
        RiskBand::Low
    };
    RiskIndicator { score, band }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Keypoint;
    use chrono::Utc;
    use std::collections::BTreeMap;

    /// Face with the right side of each region pulled toward the midline by
    /// `droop` pixels (0 = perfectly symmetric).
    fn face_frame(droop: f64) -> FrameObservation {
        let mut landmarks = BTreeMap::new();
        let mut add = |name: &str, x: f64, y: f64| {
            landmarks.insert(
                name.to_string(),
                Keypoint {
                    x,
                    y,
                    z: None,
                    confidence: 0.9,
                },
            );
        };

        add(keys::NOSE, 320.0, 240.0);
        add(keys::LEFT_EYE, 280.0, 200.0);
        add(keys::RIGHT_EYE, 360.0 - droop, 200.0);
        add(keys::LEFT_EYEBROW, 275.0, 180.0);
        add(keys::RIGHT_EYEBROW, 365.0 - droop, 180.0);
        add(keys::MOUTH_LEFT, 295.0, 300.0);
        add(keys::MOUTH_RIGHT, 345.0 - droop, 300.0);
        add(keys::JAW_LEFT, 260.0, 280.0);
        add(keys::JAW_RIGHT, 380.0 - droop, 280.0);

        FrameObservation {
            timestamp: Utc::now(),
            landmarks,
            frame_width: Some(640.0),
            frame_height: Some(480.0),
            audio: None,
            response_latency_ms: None,
        }
    }

    fn ctx() -> TickContext<'static> {
        TickContext {
            prev: None,
            dt_sec: 1.0 / 30.0,
            phase_name: "capture",
            elapsed_in_phase_sec: 0.5,
            elapsed_in_session_sec: 0.5,
        }
    }

    fn facial(sample: &MeasurementSample) -> &FacialMetrics {
        match &sample.metrics {
            DomainMetrics::FacialSymmetry(f) => f,
            _ => panic!("expected facial metrics"),
        }
    }

    #[test]
    fn test_symmetric_face_scores_100() {
        let mut calc = FacialCalculator::new();
        let sample = calc.process(&face_frame(0.0), &ctx()).unwrap();
        let metrics = facial(&sample);
        assert_eq!(metrics.eye_symmetry, Some(100.0));
        assert_eq!(metrics.mouth_symmetry, Some(100.0));
        assert_eq!(metrics.jaw_symmetry, Some(100.0));
        assert!((metrics.overall - 100.0).abs() < 1e-9);
        assert!(!sample.degraded);

        let risk = metrics.risk.unwrap();
        assert_eq!(risk.bells_palsy.band, RiskBand::Low);
        assert_eq!(risk.stroke.band, RiskBand::Low);
    }

    #[test]
    fn test_droop_lowers_symmetry_and_raises_risk() {
        let mut calc = FacialCalculator::new();
        let sample = calc.process(&face_frame(30.0), &ctx()).unwrap();
        let metrics = facial(&sample);
        assert!(metrics.overall < 80.0);

        let risk = metrics.risk.unwrap();
        assert!(risk.bells_palsy.score > 0.0);
        assert!(risk.stroke.score >= risk.parkinsons.score);
    }

    #[test]
    fn test_severe_droop_is_high_risk() {
        // Right mouth corner collapses onto the midline
        let mut calc = FacialCalculator::new();
        let sample = calc.process(&face_frame(25.0), &ctx()).unwrap();
        let risk = facial(&sample).risk.unwrap();
        assert_eq!(risk.stroke.band, RiskBand::High);
    }

    #[test]
    fn test_missing_nose_degrades() {
        let mut calc = FacialCalculator::new();
        let mut frame = face_frame(0.0);
        frame.landmarks.remove(keys::NOSE);

        let sample = calc.process(&frame, &ctx()).unwrap();
        assert!(sample.degraded);
        assert_eq!(facial(&sample).overall, 0.0);
        assert!(facial(&sample).risk.is_none());
    }

    #[test]
    fn test_partial_regions_still_score_but_degrade() {
        let mut calc = FacialCalculator::new();
        let mut frame = face_frame(0.0);
        frame.landmarks.remove(keys::JAW_LEFT);
        frame.landmarks.remove(keys::JAW_RIGHT);

        let sample = calc.process(&frame, &ctx()).unwrap();
        assert!(sample.degraded);
        let metrics = facial(&sample);
        assert!(metrics.jaw_symmetry.is_none());
        assert!((metrics.overall - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_scores_in_bounds() {
        let mut calc = FacialCalculator::new();
        for droop in [0.0, 10.0, 35.0, 80.0, 200.0] {
            let sample = calc.process(&face_frame(droop), &ctx()).unwrap();
            let metrics = facial(&sample);
            assert!((0.0..=100.0).contains(&metrics.overall));
            if let Some(risk) = metrics.risk {
                assert!((0.0..=1.0).contains(&risk.bells_palsy.score));
                assert!((0.0..=1.0).contains(&risk.stroke.score));
                assert!((0.0..=1.0).contains(&risk.parkinsons.score));
            }
        }
    }
}
