//! Error types for the Kinesia engine

use thiserror::Error;

/// Errors that can occur while running an assessment session
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to parse frame payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Session is not running (status: {0})")]
    SessionNotActive(String),

    #[error("No further phases to advance to")]
    PhaseExhausted,

    #[error("Neutral baseline not set; capture the neutral position before measuring {0}")]
    NeutralBaselineNotSet(String),

    #[error("Detection timed out: no usable observation after {attempts} attempts over {elapsed_sec:.1}s")]
    DetectionTimeout { attempts: u32, elapsed_sec: f64 },

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

impl EngineError {
    /// Whether the session can continue after this error.
    ///
    /// Recoverable errors leave the session RUNNING and await correction;
    /// everything else is fatal to the current session.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::NeutralBaselineNotSet(_) | EngineError::ParseError(_)
        )
    }
}
