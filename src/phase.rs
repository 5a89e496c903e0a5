//! Phase sequencing
//!
//! An explicit state machine over the ordered sub-stages of an assessment,
//! driven by discrete events (valid frame, missing frame, manual advance,
//! clock). Transitions are strictly forward; the phase index never decreases.
//! The controller also owns the session's deadline handles (detection timeout
//! and auto-stop) and tears them down as one unit.

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};

use crate::config::{DetectionPolicy, EngineConfig};
use crate::error::EngineError;
use crate::types::AssessmentDomain;

/// How a phase decides it is finished
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompletionRule {
    /// Elapses after this many seconds in the phase
    Duration(f64),
    /// Completes after this many non-degraded samples
    SampleCount(u32),
    /// Completes only on an explicit advance signal
    Manual,
}

/// One sub-stage of an assessment
#[derive(Debug, Clone)]
pub struct Phase {
    pub name: &'static str,
    pub completion: CompletionRule,
    pub completed: bool,
    pub started_at: Option<DateTime<Utc>>,
    /// Non-degraded samples recorded in this phase
    pub sample_count: u32,
    pub degraded_count: u32,
}

impl Phase {
    fn new(name: &'static str, completion: CompletionRule) -> Self {
        Self {
            name,
            completion,
            completed: false,
            started_at: None,
            sample_count: 0,
            degraded_count: 0,
        }
    }
}

/// Ordered phase list for a domain
pub fn phase_plan(domain: AssessmentDomain, config: &EngineConfig) -> Vec<Phase> {
    use CompletionRule::*;

    let timed = |name| {
        let rule = match config.auto_stop(domain) {
            Some(sec) => Duration(sec),
            None => Manual,
        };
        vec![Phase::new(name, rule)]
    };

    match domain {
        AssessmentDomain::GaitAnalysis => timed("walk"),
        AssessmentDomain::Tremor => timed("recording"),
        AssessmentDomain::FingerTapping => timed("tapping"),
        AssessmentDomain::SpeechPattern => timed("recording"),
        AssessmentDomain::EyeMovement => vec![
            Phase::new("calibration", Duration(5.0)),
            Phase::new("saccadic", Duration(15.0)),
            Phase::new("pursuit", Duration(15.0)),
            Phase::new("fixation", Duration(10.0)),
        ],
        AssessmentDomain::NeckMobility => vec![
            Phase::new("neutral", Manual),
            Phase::new("flexion", Manual),
            Phase::new("extension", Manual),
            Phase::new("rotation", Manual),
        ],
        AssessmentDomain::FacialSymmetry => vec![Phase::new("capture", SampleCount(10))],
        AssessmentDomain::ResponseTime => vec![Phase::new("rounds", SampleCount(5))],
    }
}

/// Result of evaluating the controller after an event
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutcome {
    /// Stay in the current phase
    Continue,
    /// Moved to the next phase
    Advanced {
        from: &'static str,
        to: &'static str,
    },
    /// The final phase completed
    SessionComplete { last: &'static str },
}

/// Deadline handles owned by the controller.
///
/// Plain instants compared against the caller's clock; dropping the pair
/// cancels both together.
#[derive(Debug, Clone, Copy)]
struct Deadlines {
    detection: DateTime<Utc>,
    auto_stop: Option<DateTime<Utc>>,
}

/// Phase state machine for one session
pub struct PhaseController {
    phases: Vec<Phase>,
    active: usize,
    detection: DetectionPolicy,
    missing_streak: u32,
    /// Start of the current detection-miss run (session start or last valid)
    detection_anchor: Option<DateTime<Utc>>,
    deadlines: Option<Deadlines>,
}

impl PhaseController {
    pub fn new(domain: AssessmentDomain, config: &EngineConfig) -> Self {
        Self {
            phases: phase_plan(domain, config),
            active: 0,
            detection: config.detection,
            missing_streak: 0,
            detection_anchor: None,
            deadlines: None,
        }
    }

    /// Arm the deadlines and enter the first phase
    pub fn start(&mut self, now: DateTime<Utc>, auto_stop_sec: Option<f64>) {
        self.detection_anchor = Some(now);
        self.deadlines = Some(Deadlines {
            detection: now + seconds(self.detection.timeout_sec),
            auto_stop: auto_stop_sec.map(|sec| now + seconds(sec)),
        });
        if let Some(phase) = self.phases.get_mut(self.active) {
            phase.started_at = Some(now);
        }
    }

    /// Cancel every deadline as one unit (session stop/abort)
    pub fn cancel_timers(&mut self) {
        self.deadlines = None;
    }

    pub fn active_phase(&self) -> &Phase {
        &self.phases[self.active]
    }

    pub fn phase_index(&self) -> usize {
        self.active
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn missing_streak(&self) -> u32 {
        self.missing_streak
    }

    /// Seconds spent in the active phase as of `now`
    pub fn phase_elapsed(&self, now: DateTime<Utc>) -> f64 {
        match self.phases[self.active].started_at {
            Some(started) => (now - started).num_milliseconds() as f64 / 1000.0,
            None => 0.0,
        }
    }

    /// A usable observation arrived: clear the miss streak and push the
    /// detection deadline forward.
    pub fn record_valid(&mut self, now: DateTime<Utc>) {
        self.missing_streak = 0;
        self.detection_anchor = Some(now);
        if let Some(deadlines) = self.deadlines.as_mut() {
            deadlines.detection = now + seconds(self.detection.timeout_sec);
        }
    }

    /// The perception collaborator failed to deliver a usable observation.
    ///
    /// Fatal once the consecutive-miss budget or the wall-clock bound is
    /// exhausted.
    pub fn record_missing(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.missing_streak += 1;
        warn!(
            "no usable observation ({} consecutive misses)",
            self.missing_streak
        );

        let wall_clock_expired = self
            .deadlines
            .map(|d| now >= d.detection)
            .unwrap_or(false);

        if self.missing_streak >= self.detection.max_attempts || wall_clock_expired {
            let elapsed_sec = self
                .detection_anchor
                .map(|anchor| (now - anchor).num_milliseconds() as f64 / 1000.0)
                .unwrap_or(0.0)
                .max(0.0);
            return Err(EngineError::DetectionTimeout {
                attempts: self.missing_streak,
                elapsed_sec,
            });
        }
        Ok(())
    }

    /// Whether the session-level auto-stop deadline has passed
    pub fn auto_stop_due(&self, now: DateTime<Utc>) -> bool {
        self.deadlines
            .and_then(|d| d.auto_stop)
            .map(|at| now >= at)
            .unwrap_or(false)
    }

    /// Record one produced sample on the active phase
    pub fn note_sample(&mut self, degraded: bool) {
        let phase = &mut self.phases[self.active];
        if degraded {
            phase.degraded_count += 1;
        } else {
            phase.sample_count += 1;
        }
    }

    /// Check the active phase's completion criterion and advance if met
    pub fn evaluate(&mut self, now: DateTime<Utc>) -> PhaseOutcome {
        let phase = &self.phases[self.active];
        let done = match phase.completion {
            CompletionRule::Duration(sec) => self.phase_elapsed(now) >= sec,
            CompletionRule::SampleCount(n) => phase.sample_count >= n,
            CompletionRule::Manual => false,
        };
        if done {
            self.advance(now)
        } else {
            PhaseOutcome::Continue
        }
    }

    /// Move to the next phase (explicit completion signal or elapsed timer)
    pub fn advance(&mut self, now: DateTime<Utc>) -> PhaseOutcome {
        let from = self.phases[self.active].name;
        self.phases[self.active].completed = true;

        if self.active + 1 >= self.phases.len() {
            info!("final phase '{}' complete", from);
            return PhaseOutcome::SessionComplete { last: from };
        }

        self.active += 1;
        self.missing_streak = 0;
        let to = {
            let next = &mut self.phases[self.active];
            next.started_at = Some(now);
            next.name
        };
        info!("phase transition: {} -> {}", from, to);
        PhaseOutcome::Advanced { from, to }
    }
}

fn seconds(sec: f64) -> Duration {
    Duration::milliseconds((sec * 1000.0) as i64)
}
