//! Engine orchestration
//!
//! `AssessmentEngine` owns one session and drives the per-tick pipeline:
//! normalize → calculate → aggregate, with the phase controller gating
//! transitions and the scorer/assembler producing the final result. The
//! engine is single-threaded and tick-driven; it never blocks inside a tick
//! and takes its clock from the frame timestamps the host supplies.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::assembler::ResultAssembler;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::metrics::{calculator_for, MetricCalculator, TickContext};
use crate::normalizer::{NormalizedFrame, ObservationNormalizer};
use crate::phase::{PhaseController, PhaseOutcome};
use crate::schema::RawFrame;
use crate::scorer::{scored_fields, CompositeScorer};
use crate::session::AssessmentSession;
use crate::types::{
    AssessmentDomain, AssessmentResult, FrameObservation, MeasurementSample, SessionStatus,
};
use crate::window::RollingWindow;

/// Real-time feedback pushed to the UI boundary every tick
#[derive(Debug, Clone, Serialize)]
pub struct TickUpdate {
    /// The snapshot produced this tick, absent when the frame was invalid
    pub snapshot: Option<MeasurementSample>,
    /// Rolling-window averages of the domain's scored fields
    pub averages: BTreeMap<String, f64>,
    /// Rolling-window trends (newer half minus older half)
    pub trends: BTreeMap<String, f64>,
    /// Samples currently buffered in the rolling window
    pub window_len: usize,
    pub phase: &'static str,
    pub phase_index: usize,
    pub status: SessionStatus,
    /// Consecutive invalid frames so far
    pub missing_streak: u32,
    /// Set on the tick that completed the session
    pub session_complete: bool,
}

/// Tick-driven assessment engine for one session
pub struct AssessmentEngine {
    config: EngineConfig,
    session: AssessmentSession,
    controller: PhaseController,
    calculator: Box<dyn MetricCalculator>,
    window: RollingWindow,
    assembler: ResultAssembler,
    prev_frame: Option<FrameObservation>,
    result: Option<AssessmentResult>,
}

impl AssessmentEngine {
    /// Create an engine for one assessment domain
    pub fn new(domain: AssessmentDomain, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let controller = PhaseController::new(domain, &config);
        let calculator = calculator_for(domain, &config);
        let window = RollingWindow::new(config.window_capacity(domain));
        Ok(Self {
            config,
            session: AssessmentSession::new(domain),
            controller,
            calculator,
            window,
            assembler: ResultAssembler::new(),
            prev_frame: None,
            result: None,
        })
    }

    /// Create an engine with the owning user recorded on the result
    pub fn with_user(
        domain: AssessmentDomain,
        config: EngineConfig,
        user: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let mut engine = Self::new(domain, config)?;
        engine.session.user = Some(user.into());
        Ok(engine)
    }

    pub fn domain(&self) -> AssessmentDomain {
        self.session.domain
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    pub fn session(&self) -> &AssessmentSession {
        &self.session
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    /// Begin the session. The first valid detection is awaited inside the
    /// tick loop, bounded by the detection policy.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if self.session.status != SessionStatus::Pending {
            return Err(EngineError::SessionNotActive(
                self.session.status.as_str().to_string(),
            ));
        }
        self.session.begin(now);
        self.controller
            .start(now, self.config.auto_stop(self.session.domain));
        info!(
            "session {} started: {} ({} phases)",
            self.session.id,
            self.session.domain.as_str(),
            self.controller.phases().len()
        );
        Ok(())
    }

    /// Process one raw frame from the perception collaborator.
    ///
    /// Invalid frames are skipped and counted against the detection policy;
    /// exceeding it aborts the session (the partial result stays retrievable
    /// through `take_result`). Recoverable calculator errors leave the
    /// session RUNNING.
    pub fn tick(&mut self, raw: &RawFrame) -> Result<TickUpdate, EngineError> {
        if self.session.status != SessionStatus::Running {
            return Err(EngineError::SessionNotActive(
                self.session.status.as_str().to_string(),
            ));
        }
        let now = raw.timestamp;

        let observation = match ObservationNormalizer::normalize(raw) {
            NormalizedFrame::Valid(obs) => obs,
            NormalizedFrame::Invalid(reason) => {
                debug!("skipping invalid frame: {}", reason.as_str());
                if let Err(err) = self.controller.record_missing(now) {
                    self.abort(now);
                    return Err(err);
                }
                let complete = self.progress_clock(now);
                return Ok(self.update(None, complete));
            }
        };

        self.controller.record_valid(now);

        let dt_sec = self
            .prev_frame
            .as_ref()
            .map(|prev| (now - prev.timestamp).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
            .max(0.0);
        let elapsed_in_session_sec = self
            .session
            .started_at
            .map(|start| (now - start).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        let ctx = TickContext {
            prev: self.prev_frame.as_ref(),
            dt_sec,
            phase_name: self.controller.active_phase().name,
            elapsed_in_phase_sec: self.controller.phase_elapsed(now),
            elapsed_in_session_sec,
        };

        // Recoverable precondition errors propagate without touching state
        let sample = self.calculator.process(&observation, &ctx)?;

        self.window.push(sample.clone());
        self.session.record(sample.clone());
        self.controller.note_sample(sample.degraded);
        self.prev_frame = Some(observation);

        let complete = self.progress_clock(now);
        Ok(self.update(Some(sample), complete))
    }

    /// Parse-and-tick convenience for JSON frame payloads (FFI, replay)
    pub fn tick_json(&mut self, frame_json: &str) -> Result<TickUpdate, EngineError> {
        let raw = RawFrame::from_json(frame_json)?;
        self.tick(&raw)
    }

    /// Explicit completion signal for the active phase (e.g. the user has
    /// held the requested neck position).
    pub fn advance_phase(&mut self, now: DateTime<Utc>) -> Result<TickUpdate, EngineError> {
        if self.session.status != SessionStatus::Running {
            return Err(EngineError::SessionNotActive(
                self.session.status.as_str().to_string(),
            ));
        }
        let outcome = self.controller.advance(now);
        let complete = self.apply_outcome(outcome, now);
        if complete {
            self.finish(now, false);
        }
        Ok(self.update(None, complete))
    }

    /// Stop the session mid-stream.
    ///
    /// Halts tick processing, preserves the existing trail, and still runs
    /// the scorer over the partial data, marking the result as partial.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Result<AssessmentResult, EngineError> {
        if self.session.status != SessionStatus::Running {
            return Err(EngineError::SessionNotActive(
                self.session.status.as_str().to_string(),
            ));
        }
        let fully_complete = self
            .controller
            .phases()
            .iter()
            .all(|phase| phase.completed);
        self.finish(now, !fully_complete);
        self.result.clone().ok_or_else(|| {
            EngineError::EncodingError("no result after session stop".to_string())
        })
    }

    /// Take ownership of the finished result, if any. The engine holds no
    /// reference afterwards.
    pub fn take_result(&mut self) -> Option<AssessmentResult> {
        self.result.take()
    }

    /// Advance the session clock: duration-based phase completion and the
    /// auto-stop deadline. Returns true when the session completed.
    fn progress_clock(&mut self, now: DateTime<Utc>) -> bool {
        let outcome = self.controller.evaluate(now);
        if self.apply_outcome(outcome, now) {
            self.finish(now, false);
            return true;
        }
        if self.controller.auto_stop_due(now) {
            info!("auto-stop elapsed for session {}", self.session.id);
            let outcome = self.controller.advance(now);
            self.apply_outcome(outcome, now);
            self.finish(now, false);
            return true;
        }
        false
    }

    /// Run phase exit/entry actions for a controller outcome. Returns true
    /// when the final phase completed.
    fn apply_outcome(&mut self, outcome: PhaseOutcome, now: DateTime<Utc>) -> bool {
        match outcome {
            PhaseOutcome::Continue => false,
            PhaseOutcome::Advanced { from, .. } => {
                if let Some(finished) = self
                    .controller
                    .phases()
                    .iter()
                    .find(|phase| phase.name == from)
                {
                    let finished = finished.clone();
                    self.session.snapshot_phase(&finished, now);
                }
                // Entry actions: phase-local calculator state goes away
                self.calculator.reset_phase();
                false
            }
            PhaseOutcome::SessionComplete { last } => {
                if let Some(finished) = self
                    .controller
                    .phases()
                    .iter()
                    .find(|phase| phase.name == last)
                {
                    let finished = finished.clone();
                    self.session.snapshot_phase(&finished, now);
                }
                true
            }
        }
    }

    /// Terminal bookkeeping shared by completion, stop and abort
    fn finish(&mut self, now: DateTime<Utc>, partial: bool) {
        if self.session.status != SessionStatus::Running {
            return;
        }
        // A mid-phase stop still snapshots what the active phase gathered
        let active = self.controller.active_phase().clone();
        if !active.completed {
            self.session.snapshot_phase(&active, now);
        }

        self.session.status = SessionStatus::Completed;
        self.session.ended_at = Some(now);
        self.controller.cancel_timers();

        let composite = CompositeScorer::score(self.session.domain, &self.session.trail);
        info!(
            "session {} finished: overall {:.1} ({:?}){}",
            self.session.id,
            composite.overall,
            composite.band,
            if partial { ", partial" } else { "" }
        );
        self.result = Some(self.assembler.assemble(&self.session, composite, partial));
    }

    /// Fatal detection failure: abort, but still assemble partial data
    fn abort(&mut self, now: DateTime<Utc>) {
        warn!("session {} aborted: detection timeout", self.session.id);
        let active = self.controller.active_phase().clone();
        self.session.snapshot_phase(&active, now);
        self.session.status = SessionStatus::Aborted;
        self.session.ended_at = Some(now);
        self.controller.cancel_timers();

        let composite = CompositeScorer::score(self.session.domain, &self.session.trail);
        self.result = Some(self.assembler.assemble(&self.session, composite, true));
    }

    fn update(&self, snapshot: Option<MeasurementSample>, session_complete: bool) -> TickUpdate {
        let mut averages = BTreeMap::new();
        let mut trends = BTreeMap::new();
        for field in scored_fields(self.session.domain) {
            if let Some(avg) = self.window.average(field.extract) {
                averages.insert(field.name.to_string(), avg);
            }
            if let Some(trend) = self.window.trend(field.extract) {
                trends.insert(field.name.to_string(), trend);
            }
        }

        TickUpdate {
            snapshot,
            averages,
            trends,
            window_len: self.window.len(),
            phase: self.controller.active_phase().name,
            phase_index: self.controller.phase_index(),
            status: self.session.status,
            missing_streak: self.controller.missing_streak(),
            session_complete,
        }
    }
}
