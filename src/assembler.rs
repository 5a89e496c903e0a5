//! Result assembly
//!
//! Packages the composite result, the full raw sample trail and session
//! metadata into an `AssessmentResult` for the external persistence boundary.
//! The assembler is the sole owner of the result until it is handed off.

use uuid::Uuid;

use crate::error::EngineError;
use crate::session::AssessmentSession;
use crate::types::{
    AssessmentResult, CompositeResult, ProducerInfo, SessionMetadata,
};
use crate::{ENGINE_VERSION, PRODUCER_NAME};

/// Assembler stamping results with producer provenance
pub struct ResultAssembler {
    instance_id: String,
}

impl Default for ResultAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultAssembler {
    /// Create an assembler with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an assembler with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    /// Build the final result from a finished (or cancelled) session
    pub fn assemble(
        &self,
        session: &AssessmentSession,
        metrics: CompositeResult,
        partial: bool,
    ) -> AssessmentResult {
        let started_at = session.started_at.unwrap_or_else(chrono::Utc::now);
        let ended_at = session.ended_at.unwrap_or(started_at);

        AssessmentResult {
            user: session.user.clone(),
            kind: session.domain,
            data: session.trail.clone(),
            metrics,
            status: session.status,
            partial,
            session: SessionMetadata {
                id: session.id.clone(),
                started_at,
                ended_at,
                phases: session.phase_summaries.clone(),
            },
            producer: ProducerInfo {
                name: PRODUCER_NAME.to_string(),
                version: ENGINE_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
        }
    }

    /// Serialize a result to the persistence boundary's JSON shape
    pub fn encode_to_json(&self, result: &AssessmentResult) -> Result<String, EngineError> {
        serde_json::to_string(result)
            .map_err(|e| EngineError::EncodingError(e.to_string()))
    }
}
