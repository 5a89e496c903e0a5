//! Kinesia - On-device motion-assessment engine for camera-based
//! neurological screening
//!
//! Kinesia turns a per-tick stream of body/face landmarks (or audio
//! features) from an external perception subsystem into phase-sequenced
//! clinical metrics and a final weighted composite result: observation
//! normalization → per-domain metric calculation → rolling aggregation →
//! phase control → composite scoring → result assembly.
//!
//! ## Modules
//!
//! - **Engine**: tick-driven orchestration of one assessment session
//! - **Metrics**: per-domain calculators (gait, tremor, eye movement,
//!   finger tapping, neck mobility, facial symmetry, speech, response time)

pub mod assembler;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod normalizer;
pub mod phase;
pub mod schema;
pub mod scorer;
pub mod session;
pub mod types;
pub mod window;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::EngineConfig;
pub use engine::{AssessmentEngine, TickUpdate};
pub use error::EngineError;
pub use scorer::CompositeScorer;
pub use session::AssessmentSession;

// Schema exports
pub use schema::{RawFrame, SCHEMA_VERSION};

// Core type exports
pub use types::{
    AssessmentDomain, AssessmentResult, CompositeResult, FrameObservation, MeasurementSample,
    SessionStatus,
};

/// Engine version embedded in all assembled results
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for assembled results
pub const PRODUCER_NAME: &str = "kinesia";
