//! Finger-tapping metric calculation
//!
//! Detects taps from thumb-to-index fingertip distance, gates tap intervals
//! with median-adaptive bounds, and derives rate, rhythm consistency and
//! accuracy.

use std::collections::VecDeque;

use log::warn;

use crate::error::EngineError;
use crate::metrics::{make_sample, MetricCalculator, TickContext};
use crate::types::{
    keys, AssessmentDomain, DomainMetrics, FrameObservation, MeasurementSample, TapMetrics,
};

/// Interval history length used for threshold adaptation
const INTERVAL_HISTORY: usize = 15;

/// Base valid-interval gate (milliseconds)
const BASE_MIN_INTERVAL_MS: f64 = 100.0;
const BASE_MAX_INTERVAL_MS: f64 = 2000.0;

/// Accuracy floor once any tap was registered
const ACCURACY_FLOOR: f64 = 10.0;

/// Finger-tapping metric calculator
pub struct TapCalculator {
    threshold: f64,
    last_tap_state: bool,
    last_tap_at_sec: Option<f64>,
    tap_count: u32,
    valid_taps: u32,
    intervals_ms: Vec<f64>,
    history: VecDeque<f64>,
    adaptive_min_ms: f64,
    adaptive_max_ms: f64,
}

impl TapCalculator {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            last_tap_state: false,
            last_tap_at_sec: None,
            tap_count: 0,
            valid_taps: 0,
            intervals_ms: Vec::new(),
            history: VecDeque::with_capacity(INTERVAL_HISTORY),
            adaptive_min_ms: BASE_MIN_INTERVAL_MS,
            adaptive_max_ms: BASE_MAX_INTERVAL_MS,
        }
    }

    /// Re-center the valid-interval gate on the median of recent intervals
    fn adapt_thresholds(&mut self) {
        if self.history.len() < 5 {
            return;
        }
        let mut sorted: Vec<f64> = self.history.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let median = sorted[sorted.len() / 2];
        self.adaptive_min_ms = (median * 0.4).clamp(80.0, 300.0);
        self.adaptive_max_ms = (median * 2.5).clamp(600.0, 2500.0);
    }

    fn register_tap(&mut self, now_sec: f64) {
        self.tap_count += 1;

        let interval_ms = self.last_tap_at_sec.map(|last| (now_sec - last) * 1000.0);
        self.last_tap_at_sec = Some(now_sec);

        match interval_ms {
            // First tap has nothing to gate against
            None => self.valid_taps += 1,
            Some(ms) => {
                self.adapt_thresholds();
                if ms >= self.adaptive_min_ms && ms <= self.adaptive_max_ms {
                    self.valid_taps += 1;
                    self.intervals_ms.push(ms);
                    self.history.push_back(ms);
                    while self.history.len() > INTERVAL_HISTORY {
                        self.history.pop_front();
                    }
                }
            }
        }
    }

    fn rhythm(&self) -> f64 {
        if self.intervals_ms.len() < 2 {
            return 100.0;
        }
        let deltas: Vec<f64> = self
            .intervals_ms
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .collect();
        let mean_delta = deltas.iter().sum::<f64>() / deltas.len() as f64;
        (100.0 - mean_delta * 0.5).max(0.0)
    }

    fn accuracy(&self) -> f64 {
        if self.tap_count == 0 {
            return 0.0;
        }
        let ratio = self.valid_taps as f64 / self.tap_count as f64;
        (ratio * 100.0).max(ACCURACY_FLOOR)
    }

    fn metrics(&self, distance: f64, is_tapping: bool, elapsed_sec: f64) -> TapMetrics {
        let taps_per_sec = if elapsed_sec > 0.0 {
            self.tap_count as f64 / elapsed_sec
        } else {
            0.0
        };
        TapMetrics {
            distance,
            is_tapping,
            tap_count: self.tap_count,
            taps_per_sec,
            rhythm: self.rhythm(),
            accuracy: self.accuracy(),
            last_interval_ms: self.intervals_ms.last().copied(),
        }
    }
}

impl MetricCalculator for TapCalculator {
    fn domain(&self) -> AssessmentDomain {
        AssessmentDomain::FingerTapping
    }

    fn process(
        &mut self,
        frame: &FrameObservation,
        ctx: &TickContext,
    ) -> Result<MeasurementSample, EngineError> {
        let (Some(thumb), Some(index)) = (
            frame.keypoint(keys::THUMB_TIP),
            frame.keypoint(keys::INDEX_TIP),
        ) else {
            warn!("tap calculation degraded: fingertips not detected");
            // Hand lost: drop the tap state so re-acquisition does not count
            // a phantom tap, but keep accumulated counts.
            self.last_tap_state = false;
            return Ok(make_sample(
                frame,
                ctx,
                true,
                DomainMetrics::FingerTapping(self.metrics(
                    0.0,
                    false,
                    ctx.elapsed_in_phase_sec,
                )),
            ));
        };

        let distance = thumb.distance_to(index);
        let is_tapping = distance < self.threshold;

        if is_tapping && !self.last_tap_state {
            self.register_tap(ctx.elapsed_in_phase_sec);
        }
        self.last_tap_state = is_tapping;

        Ok(make_sample(
            frame,
            ctx,
            false,
            DomainMetrics::FingerTapping(self.metrics(
                distance,
                is_tapping,
                ctx.elapsed_in_phase_sec,
            )),
        ))
    }

    fn reset_phase(&mut self) {
        self.last_tap_state = false;
        self.last_tap_at_sec = None;
        self.tap_count = 0;
        self.valid_taps = 0;
        self.intervals_ms.clear();
        self.history.clear();
        self.adaptive_min_ms = BASE_MIN_INTERVAL_MS;
        self.adaptive_max_ms = BASE_MAX_INTERVAL_MS;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Keypoint;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn hand_frame(distance: f64) -> FrameObservation {
        let mut landmarks = BTreeMap::new();
        landmarks.insert(
            keys::THUMB_TIP.to_string(),
            Keypoint {
                x: 100.0,
                y: 100.0,
                z: None,
                confidence: 0.9,
            },
        );
        landmarks.insert(
            keys::INDEX_TIP.to_string(),
            Keypoint {
                x: 100.0 + distance,
                y: 100.0,
                z: None,
                confidence: 0.9,
            },
        );
        FrameObservation {
            timestamp: Utc::now(),
            landmarks,
            frame_width: Some(640.0),
            frame_height: Some(480.0),
            audio: None,
            response_latency_ms: None,
        }
    }

    fn ctx(elapsed: f64) -> TickContext<'static> {
        TickContext {
            prev: None,
            dt_sec: 1.0 / 30.0,
            phase_name: "tapping",
            elapsed_in_phase_sec: elapsed,
            elapsed_in_session_sec: elapsed,
        }
    }

    fn tap(sample: &MeasurementSample) -> &TapMetrics {
        match &sample.metrics {
            DomainMetrics::FingerTapping(t) => t,
            _ => panic!("expected tap metrics"),
        }
    }

    /// Alternate closed/open at a steady cadence and return the last sample
    fn run_steady_taps(calc: &mut TapCalculator, taps: u32, period_sec: f64) -> MeasurementSample {
        let mut last = None;
        for i in 0..taps {
            let t = i as f64 * period_sec;
            last = Some(calc.process(&hand_frame(10.0), &ctx(t)).unwrap());
            last = Some(
                calc.process(&hand_frame(120.0), &ctx(t + period_sec / 2.0))
                    .unwrap(),
            );
        }
        last.unwrap()
    }

    #[test]
    fn test_tap_detection_on_rising_edge_only() {
        let mut calc = TapCalculator::new(40.0);
        // Closed for three consecutive frames: one tap, not three
        calc.process(&hand_frame(10.0), &ctx(0.0)).unwrap();
        calc.process(&hand_frame(12.0), &ctx(0.03)).unwrap();
        let sample = calc.process(&hand_frame(11.0), &ctx(0.06)).unwrap();
        assert_eq!(tap(&sample).tap_count, 1);
        assert!(tap(&sample).is_tapping);
    }

    #[test]
    fn test_steady_rhythm_scores_high() {
        let mut calc = TapCalculator::new(40.0);
        let sample = run_steady_taps(&mut calc, 10, 0.4);
        let metrics = tap(&sample);
        assert_eq!(metrics.tap_count, 10);
        assert!(metrics.rhythm > 95.0, "rhythm was {}", metrics.rhythm);
        assert!(metrics.accuracy > 95.0, "accuracy was {}", metrics.accuracy);
    }

    #[test]
    fn test_taps_per_second() {
        let mut calc = TapCalculator::new(40.0);
        let sample = run_steady_taps(&mut calc, 10, 0.5);
        let metrics = tap(&sample);
        // 10 taps over ~4.75s of phase time
        assert!(metrics.taps_per_sec > 1.5 && metrics.taps_per_sec < 2.5);
    }

    #[test]
    fn test_too_fast_interval_rejected() {
        let mut calc = TapCalculator::new(40.0);
        calc.process(&hand_frame(10.0), &ctx(0.00)).unwrap();
        calc.process(&hand_frame(120.0), &ctx(0.01)).unwrap();
        // 20ms after the first tap: below the 100ms gate
        let sample = calc.process(&hand_frame(10.0), &ctx(0.02)).unwrap();
        let metrics = tap(&sample);
        assert_eq!(metrics.tap_count, 2);
        assert!(metrics.last_interval_ms.is_none());
        // 1 valid of 2 = 50%
        assert!((metrics.accuracy - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_accuracy_floor() {
        let mut calc = TapCalculator::new(40.0);
        calc.process(&hand_frame(10.0), &ctx(0.0)).unwrap();
        // Dozens of jittery sub-gate taps drive the ratio down but never below the floor
        for i in 1..40 {
            let t = i as f64 * 0.02;
            calc.process(&hand_frame(120.0), &ctx(t)).unwrap();
            calc.process(&hand_frame(10.0), &ctx(t + 0.01)).unwrap();
        }
        let sample = calc.process(&hand_frame(120.0), &ctx(0.9)).unwrap();
        assert!(tap(&sample).accuracy >= ACCURACY_FLOOR);
    }

    #[test]
    fn test_hand_lost_degrades_and_resets_state() {
        let mut calc = TapCalculator::new(40.0);
        calc.process(&hand_frame(10.0), &ctx(0.0)).unwrap();

        let mut empty = hand_frame(10.0);
        empty.landmarks.clear();
        empty.landmarks.insert(
            keys::NOSE.to_string(),
            Keypoint {
                x: 0.0,
                y: 0.0,
                z: None,
                confidence: 0.5,
            },
        );
        let sample = calc.process(&empty, &ctx(0.5)).unwrap();
        assert!(sample.degraded);
        assert_eq!(tap(&sample).tap_count, 1);

        // Hand comes back still closed: counts as a fresh tap
        let sample = calc.process(&hand_frame(10.0), &ctx(1.0)).unwrap();
        assert_eq!(tap(&sample).tap_count, 2);
    }

    #[test]
    fn test_reset_phase_clears_counters() {
        let mut calc = TapCalculator::new(40.0);
        run_steady_taps(&mut calc, 5, 0.4);
        calc.reset_phase();
        let sample = calc.process(&hand_frame(120.0), &ctx(0.0)).unwrap();
        let metrics = tap(&sample);
        assert_eq!(metrics.tap_count, 0);
        assert_eq!(metrics.accuracy, 0.0);
        assert_eq!(metrics.rhythm, 100.0);
    }
}
