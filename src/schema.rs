//! perception.raw_frame.v1 schema definition
//!
//! The wire shape the perception collaborator sends each tick: a named
//! keypoint map with per-point confidence, optional frame dimensions, and
//! optional audio features for the speech domain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Current schema version
pub const SCHEMA_VERSION: &str = "perception.raw_frame.v1";

/// One raw keypoint as reported by the detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawKeypoint {
    pub name: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    /// Detection confidence. Some producers report this as `score`.
    #[serde(default = "default_confidence")]
    #[serde(alias = "score")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

/// Raw audio features for the speech domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAudioFeatures {
    #[serde(default)]
    pub volume_db: Option<f64>,
    #[serde(default)]
    pub pitch_hz: Option<f64>,
    #[serde(default)]
    pub voiced: bool,
}

/// One raw per-tick payload from the perception collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFrame {
    /// Observation timestamp (UTC)
    pub timestamp: DateTime<Utc>,
    /// Detected keypoints; may be empty when nothing was detected
    #[serde(default)]
    pub keypoints: Vec<RawKeypoint>,
    /// Source frame width in pixels, when known
    #[serde(default)]
    pub frame_width: Option<f64>,
    /// Source frame height in pixels, when known
    #[serde(default)]
    pub frame_height: Option<f64>,
    /// Audio features, present for speech assessments
    #[serde(default)]
    pub audio: Option<RawAudioFeatures>,
    /// Host-measured stimulus-to-response latency for response-time rounds
    #[serde(default)]
    pub response_latency_ms: Option<f64>,
}

impl RawFrame {
    /// Parse a raw frame from a JSON string
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(EngineError::JsonError)
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string(self).map_err(EngineError::JsonError)
    }

    /// Structural validation beyond what serde enforces.
    ///
    /// Returns the list of problems found; an empty list means the frame is
    /// well-formed (it may still normalize to an invalid observation, e.g.
    /// when every keypoint has non-finite coordinates).
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for kp in &self.keypoints {
            if kp.name.is_empty() {
                problems.push("keypoint with empty name".to_string());
            }
            if !kp.x.is_finite() || !kp.y.is_finite() {
                problems.push(format!("keypoint '{}' has non-finite coordinates", kp.name));
            }
            if !(0.0..=1.0).contains(&kp.confidence) {
                problems.push(format!(
                    "keypoint '{}' confidence {} outside [0,1]",
                    kp.name, kp.confidence
                ));
            }
        }

        if let Some(w) = self.frame_width {
            if w <= 0.0 {
                problems.push(format!("frame_width {} is not positive", w));
            }
        }
        if let Some(h) = self.frame_height {
            if h <= 0.0 {
                problems.push(format!("frame_height {} is not positive", h));
            }
        }

        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_frame() {
        let json = r#"{
            "timestamp": "2024-03-02T10:00:00Z",
            "keypoints": [
                {"name": "nose", "x": 320.0, "y": 120.0, "confidence": 0.92},
                {"name": "left_hip", "x": 300.0, "y": 360.0, "z": -0.1, "score": 0.88}
            ],
            "frame_width": 640,
            "frame_height": 480
        }"#;

        let frame = RawFrame::from_json(json).unwrap();
        assert_eq!(frame.keypoints.len(), 2);
        // `score` alias maps onto confidence
        assert_eq!(frame.keypoints[1].confidence, 0.88);
        assert_eq!(frame.keypoints[1].z, Some(-0.1));
        assert!(frame.validate().is_empty());
    }

    #[test]
    fn test_missing_confidence_defaults_to_one() {
        let json = r#"{
            "timestamp": "2024-03-02T10:00:00Z",
            "keypoints": [{"name": "nose", "x": 1.0, "y": 2.0}]
        }"#;

        let frame = RawFrame::from_json(json).unwrap();
        assert_eq!(frame.keypoints[0].confidence, 1.0);
    }

    #[test]
    fn test_validate_flags_bad_values() {
        let json = r#"{
            "timestamp": "2024-03-02T10:00:00Z",
            "keypoints": [{"name": "nose", "x": 1.0, "y": 2.0, "confidence": 1.5}],
            "frame_width": -640
        }"#;

        let frame = RawFrame::from_json(json).unwrap();
        let problems = frame.validate();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("confidence"));
        assert!(problems[1].contains("frame_width"));
    }

    #[test]
    fn test_audio_only_frame() {
        let json = r#"{
            "timestamp": "2024-03-02T10:00:00Z",
            "audio": {"volume_db": -32.5, "pitch_hz": 180.0, "voiced": true}
        }"#;

        let frame = RawFrame::from_json(json).unwrap();
        assert!(frame.keypoints.is_empty());
        let audio = frame.audio.unwrap();
        assert_eq!(audio.volume_db, Some(-32.5));
        assert!(audio.voiced);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(RawFrame::from_json("not json").is_err());
    }
}
