//! Engine configuration
//!
//! Recognized options: rolling-window capacity per domain, auto-stop duration
//! per domain, the detection-timeout policy, and calculator thresholds.
//! Composite-score weights are deliberately not configuration; they live as
//! labeled constants in the scorer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::EngineError;
use crate::types::AssessmentDomain;

/// Default rolling-window capacity
pub const DEFAULT_WINDOW_CAPACITY: usize = 100;

/// Detection failure policy: how long the engine waits for a usable
/// observation before aborting the session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DetectionPolicy {
    /// Consecutive invalid frames tolerated before aborting
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Wall-clock bound without a valid frame before aborting (seconds)
    #[serde(default = "default_detection_timeout")]
    pub timeout_sec: f64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_detection_timeout() -> f64 {
    15.0
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_sec: default_detection_timeout(),
        }
    }
}

/// Tremor classification thresholds.
///
/// Frequency bands: below `resting_max_hz` is resting, up to and including
/// `action_max_hz` is action, above that is postural. Amplitude bands follow
/// the same pattern for mild/moderate/severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TremorThresholds {
    #[serde(default = "default_resting_max")]
    pub resting_max_hz: f64,
    #[serde(default = "default_action_max")]
    pub action_max_hz: f64,
    #[serde(default = "default_mild_max")]
    pub mild_max_amplitude: f64,
    #[serde(default = "default_moderate_max")]
    pub moderate_max_amplitude: f64,
}

fn default_resting_max() -> f64 {
    4.0
}

fn default_action_max() -> f64 {
    7.0
}

fn default_mild_max() -> f64 {
    0.5
}

fn default_moderate_max() -> f64 {
    1.5
}

impl Default for TremorThresholds {
    fn default() -> Self {
        Self {
            resting_max_hz: default_resting_max(),
            action_max_hz: default_action_max(),
            mild_max_amplitude: default_mild_max(),
            moderate_max_amplitude: default_moderate_max(),
        }
    }
}

/// Engine configuration, deserializable with every field defaulted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-domain rolling-window capacity overrides
    #[serde(default)]
    pub window_capacity: HashMap<AssessmentDomain, usize>,
    /// Per-domain auto-stop duration overrides (seconds)
    #[serde(default)]
    pub auto_stop_sec: HashMap<AssessmentDomain, f64>,
    #[serde(default)]
    pub detection: DetectionPolicy,
    #[serde(default)]
    pub tremor: TremorThresholds,
    /// Thumb-to-index distance below which a tap is registered
    #[serde(default = "default_tap_threshold")]
    pub tap_threshold: f64,
}

fn default_tap_threshold() -> f64 {
    40.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_capacity: HashMap::new(),
            auto_stop_sec: HashMap::new(),
            detection: DetectionPolicy::default(),
            tremor: TremorThresholds::default(),
            tap_threshold: default_tap_threshold(),
        }
    }
}

impl EngineConfig {
    /// Parse configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Rolling-window capacity for one domain
    pub fn window_capacity(&self, domain: AssessmentDomain) -> usize {
        self.window_capacity
            .get(&domain)
            .copied()
            .unwrap_or(DEFAULT_WINDOW_CAPACITY)
    }

    /// Auto-stop duration for one domain, `None` for domains that complete
    /// on phase criteria alone.
    pub fn auto_stop(&self, domain: AssessmentDomain) -> Option<f64> {
        if let Some(&sec) = self.auto_stop_sec.get(&domain) {
            return Some(sec);
        }
        match domain {
            AssessmentDomain::GaitAnalysis => Some(30.0),
            AssessmentDomain::Tremor => Some(10.0),
            AssessmentDomain::FingerTapping => Some(30.0),
            AssessmentDomain::SpeechPattern => Some(15.0),
            // Eye phases carry their own durations; neck, facial and
            // response-time complete on explicit signals or sample counts.
            AssessmentDomain::EyeMovement
            | AssessmentDomain::NeckMobility
            | AssessmentDomain::FacialSymmetry
            | AssessmentDomain::ResponseTime => None,
        }
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), EngineError> {
        for (domain, &cap) in &self.window_capacity {
            if cap == 0 {
                return Err(EngineError::InvalidConfig(format!(
                    "window capacity for {} must be at least 1",
                    domain.as_str()
                )));
            }
        }
        for (domain, &sec) in &self.auto_stop_sec {
            if !sec.is_finite() || sec <= 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "auto-stop duration for {} must be positive",
                    domain.as_str()
                )));
            }
        }
        if self.detection.max_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "detection max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.detection.timeout_sec.is_finite() || self.detection.timeout_sec <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "detection timeout must be positive".to_string(),
            ));
        }
        if self.tremor.resting_max_hz >= self.tremor.action_max_hz {
            return Err(EngineError::InvalidConfig(
                "tremor resting band must end below the action band".to_string(),
            ));
        }
        if self.tremor.mild_max_amplitude >= self.tremor.moderate_max_amplitude {
            return Err(EngineError::InvalidConfig(
                "tremor mild amplitude band must end below the moderate band".to_string(),
            ));
        }
        if !self.tap_threshold.is_finite() || self.tap_threshold <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "tap threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
