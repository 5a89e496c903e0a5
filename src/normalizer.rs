//! Observation normalization
//!
//! This module validates a raw per-tick payload into a canonical
//! `FrameObservation`, or an invalid-frame sentinel the tick loop skips.
//! - Keypoints with non-finite coordinates are dropped
//! - Confidence is clamped into [0,1]
//! - Missing named points stay absent; nothing is defaulted to (0,0)

use std::collections::BTreeMap;

use crate::schema::RawFrame;
use crate::types::{AudioSample, FrameObservation, Keypoint};

/// Why a frame failed normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    /// No keypoints and no audio sample
    EmptyFrame,
    /// Keypoints were present but none survived validation
    NoUsableKeypoints,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::EmptyFrame => "empty frame",
            InvalidReason::NoUsableKeypoints => "no usable keypoints",
        }
    }
}

/// Result of normalizing one raw frame.
///
/// Invalid frames are a first-class value, not an error: callers skip them
/// and let the phase controller's detection policy decide when too many in a
/// row become fatal.
#[derive(Debug, Clone)]
pub enum NormalizedFrame {
    Valid(FrameObservation),
    Invalid(InvalidReason),
}

impl NormalizedFrame {
    pub fn is_valid(&self) -> bool {
        matches!(self, NormalizedFrame::Valid(_))
    }

    pub fn into_observation(self) -> Option<FrameObservation> {
        match self {
            NormalizedFrame::Valid(obs) => Some(obs),
            NormalizedFrame::Invalid(_) => None,
        }
    }
}

/// Normalizer for converting raw frames to canonical observations
pub struct ObservationNormalizer;

impl ObservationNormalizer {
    /// Normalize a raw frame. Never fails; malformed input yields the
    /// invalid-frame sentinel.
    pub fn normalize(raw: &RawFrame) -> NormalizedFrame {
        let audio = raw.audio.as_ref().map(|a| AudioSample {
            volume_db: a.volume_db.filter(|v| v.is_finite()),
            pitch_hz: a.pitch_hz.filter(|p| p.is_finite() && *p > 0.0),
            voiced: a.voiced,
        });

        if raw.keypoints.is_empty() && audio.is_none() && raw.response_latency_ms.is_none() {
            return NormalizedFrame::Invalid(InvalidReason::EmptyFrame);
        }

        let mut landmarks = BTreeMap::new();
        for kp in &raw.keypoints {
            if kp.name.is_empty() || !kp.x.is_finite() || !kp.y.is_finite() {
                continue;
            }
            let z = kp.z.filter(|z| z.is_finite());
            let confidence = if kp.confidence.is_finite() {
                kp.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };
            landmarks.insert(
                kp.name.clone(),
                Keypoint {
                    x: kp.x,
                    y: kp.y,
                    z,
                    confidence,
                },
            );
        }

        if landmarks.is_empty() && audio.is_none() && raw.response_latency_ms.is_none() {
            return NormalizedFrame::Invalid(if raw.keypoints.is_empty() {
                InvalidReason::EmptyFrame
            } else {
                InvalidReason::NoUsableKeypoints
            });
        }

        NormalizedFrame::Valid(FrameObservation {
            timestamp: raw.timestamp,
            landmarks,
            frame_width: raw.frame_width.filter(|w| w.is_finite() && *w > 0.0),
            frame_height: raw.frame_height.filter(|h| h.is_finite() && *h > 0.0),
            audio,
            response_latency_ms: raw.response_latency_ms.filter(|l| l.is_finite() && *l >= 0.0),
        })
    }
}
