//! Assessment session state
//!
//! The session record accumulates the full measurement trail and the
//! per-phase aggregate snapshots taken on phase exit. Exactly one session is
//! active per engine instance; its status only moves forward through
//! PENDING → RUNNING → COMPLETED/ABORTED.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::phase::Phase;
use crate::scorer::scored_fields;
use crate::types::{
    AssessmentDomain, MeasurementSample, PhaseSummary, SessionStatus,
};

/// One assessment session's accumulated state
#[derive(Debug, Clone)]
pub struct AssessmentSession {
    pub id: String,
    pub user: Option<String>,
    pub domain: AssessmentDomain,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Full raw sample trail, uncapped
    pub trail: Vec<MeasurementSample>,
    /// Aggregates snapshotted on each phase exit
    pub phase_summaries: Vec<PhaseSummary>,
}

impl AssessmentSession {
    pub fn new(domain: AssessmentDomain) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user: None,
            domain,
            status: SessionStatus::Pending,
            started_at: None,
            ended_at: None,
            trail: Vec::new(),
            phase_summaries: Vec::new(),
        }
    }

    pub fn with_user(domain: AssessmentDomain, user: impl Into<String>) -> Self {
        let mut session = Self::new(domain);
        session.user = Some(user.into());
        session
    }

    pub fn begin(&mut self, now: DateTime<Utc>) {
        self.status = SessionStatus::Running;
        self.started_at = Some(now);
    }

    pub fn record(&mut self, sample: MeasurementSample) {
        self.trail.push(sample);
    }

    /// Exit action for a finishing phase: snapshot its aggregates into the
    /// session's summary trail.
    pub fn snapshot_phase(&mut self, phase: &Phase, now: DateTime<Utc>) {
        let mut averages = std::collections::BTreeMap::new();
        for field in scored_fields(self.domain) {
            let values: Vec<f64> = self
                .trail
                .iter()
                .filter(|s| s.phase == phase.name)
                .filter_map(|s| (field.extract)(s))
                .filter(|v| v.is_finite())
                .collect();
            if !values.is_empty() {
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                averages.insert(field.name.to_string(), mean);
            }
        }

        self.phase_summaries.push(PhaseSummary {
            name: phase.name.to_string(),
            sample_count: phase.sample_count,
            degraded_count: phase.degraded_count,
            started_at: phase.started_at.unwrap_or(now),
            ended_at: now,
            averages,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::CompletionRule;
    use crate::types::{DomainMetrics, NeckMetrics, NeckPosition};

    fn neck_sample(phase: &str, percent: f64) -> MeasurementSample {
        MeasurementSample {
            timestamp: Utc::now(),
            phase: phase.to_string(),
            degraded: false,
            metrics: DomainMetrics::NeckMobility(NeckMetrics {
                position: NeckPosition::Flexion,
                angle_deg: percent / 2.5,
                percent_of_normal: percent,
            }),
        }
    }

    #[test]
    fn test_new_session_is_pending() {
        let session = AssessmentSession::new(AssessmentDomain::NeckMobility);
        assert_eq!(session.status, SessionStatus::Pending);
        assert!(session.started_at.is_none());
        assert!(!session.id.is_empty());
    }

    #[test]
    fn test_snapshot_averages_only_phase_samples() {
        let mut session = AssessmentSession::new(AssessmentDomain::NeckMobility);
        let now = Utc::now();
        session.begin(now);

        session.record(neck_sample("flexion", 40.0));
        session.record(neck_sample("flexion", 60.0));
        session.record(neck_sample("extension", 90.0));

        let phase = Phase {
            name: "flexion",
            completion: CompletionRule::Manual,
            completed: true,
            started_at: Some(now),
            sample_count: 2,
            degraded_count: 0,
        };
        session.snapshot_phase(&phase, now);

        let summary = &session.phase_summaries[0];
        assert_eq!(summary.name, "flexion");
        assert_eq!(summary.sample_count, 2);
        let percent = summary.averages.get("percent_of_normal").unwrap();
        assert!((percent - 50.0).abs() < 1e-9);
    }
}
