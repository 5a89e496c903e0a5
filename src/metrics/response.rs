//! Response-time metric calculation
//!
//! The host measures stimulus-to-response latency per round and reports it on
//! the observation; the calculator keeps the running distribution. Ticks
//! without a completed round carry the latest stats and are flagged degraded
//! so they do not count toward round completion.

use crate::error::EngineError;
use crate::metrics::{make_sample, MetricCalculator, TickContext};
use crate::types::{
    AssessmentDomain, DomainMetrics, FrameObservation, MeasurementSample, ResponseMetrics,
};

/// Response-time metric calculator
pub struct ResponseCalculator {
    latencies_ms: Vec<f64>,
}

impl ResponseCalculator {
    pub fn new() -> Self {
        Self {
            latencies_ms: Vec::new(),
        }
    }

    fn metrics(&self, latest: f64) -> ResponseMetrics {
        if self.latencies_ms.is_empty() {
            return ResponseMetrics::default();
        }
        let sum: f64 = self.latencies_ms.iter().sum();
        let fastest = self.latencies_ms.iter().cloned().fold(f64::MAX, f64::min);
        let slowest = self.latencies_ms.iter().cloned().fold(0.0f64, f64::max);
        ResponseMetrics {
            latency_ms: latest,
            rounds: self.latencies_ms.len() as u32,
            average_ms: sum / self.latencies_ms.len() as f64,
            fastest_ms: fastest,
            slowest_ms: slowest,
        }
    }
}

impl Default for ResponseCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricCalculator for ResponseCalculator {
    fn domain(&self) -> AssessmentDomain {
        AssessmentDomain::ResponseTime
    }

    fn process(
        &mut self,
        frame: &FrameObservation,
        ctx: &TickContext,
    ) -> Result<MeasurementSample, EngineError> {
        match frame.response_latency_ms {
            Some(latency) => {
                self.latencies_ms.push(latency);
                Ok(make_sample(
                    frame,
                    ctx,
                    false,
                    DomainMetrics::ResponseTime(self.metrics(latency)),
                ))
            }
            None => {
                let latest = self.latencies_ms.last().copied().unwrap_or(0.0);
                Ok(make_sample(
                    frame,
                    ctx,
                    true,
                    DomainMetrics::ResponseTime(self.metrics(latest)),
                ))
            }
        }
    }

    fn reset_phase(&mut self) {
        self.latencies_ms.clear();
    }
}
