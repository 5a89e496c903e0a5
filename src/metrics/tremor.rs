//! Tremor metric calculation
//!
//! Estimates dominant oscillation frequency and peak-to-peak amplitude from a
//! short window of fingertip positions, then classifies the tremor by
//! frequency band and amplitude severity.

use std::collections::VecDeque;

use log::warn;

use crate::config::TremorThresholds;
use crate::error::EngineError;
use crate::metrics::{make_sample, MetricCalculator, TickContext};
use crate::types::{
    keys, AssessmentDomain, DomainMetrics, FrameObservation, MeasurementSample, SeverityBand,
    TremorBand, TremorMetrics,
};

/// Length of the position window used for frequency estimation (seconds)
const WINDOW_SEC: f64 = 3.0;

/// Minimum samples before a frequency estimate is attempted
const MIN_SAMPLES: usize = 30;

/// Hard cap on buffered positions
const MAX_SAMPLES: usize = 256;

/// Tremor metric calculator tracking the index fingertip
pub struct TremorCalculator {
    thresholds: TremorThresholds,
    /// (seconds since session start, x, y)
    positions: VecDeque<(f64, f64, f64)>,
}

impl TremorCalculator {
    pub fn new(thresholds: TremorThresholds) -> Self {
        Self {
            thresholds,
            positions: VecDeque::with_capacity(MAX_SAMPLES),
        }
    }
}

impl MetricCalculator for TremorCalculator {
    fn domain(&self) -> AssessmentDomain {
        AssessmentDomain::Tremor
    }

    fn process(
        &mut self,
        frame: &FrameObservation,
        ctx: &TickContext,
    ) -> Result<MeasurementSample, EngineError> {
        let Some(tip) = frame.keypoint(keys::INDEX_TIP) else {
            warn!("tremor calculation degraded: index fingertip not detected");
            return Ok(make_sample(
                frame,
                ctx,
                true,
                DomainMetrics::Tremor(TremorMetrics::default()),
            ));
        };

        let t = ctx.elapsed_in_session_sec;
        self.positions.push_back((t, tip.x, tip.y));
        while self.positions.len() > MAX_SAMPLES {
            self.positions.pop_front();
        }
        while let Some(&(t0, _, _)) = self.positions.front() {
            if t - t0 > WINDOW_SEC {
                self.positions.pop_front();
            } else {
                break;
            }
        }

        // Not enough history yet: report an empty estimate without the
        // degraded flag, the fingertip itself was tracked fine.
        if self.positions.len() < MIN_SAMPLES {
            return Ok(make_sample(
                frame,
                ctx,
                false,
                DomainMetrics::Tremor(TremorMetrics::default()),
            ));
        }

        let metrics = analyze_window(&self.positions, &self.thresholds);
        Ok(make_sample(frame, ctx, false, DomainMetrics::Tremor(metrics)))
    }

    fn reset_phase(&mut self) {
        self.positions.clear();
    }
}

/// Estimate frequency and amplitude over the buffered window
fn analyze_window(positions: &VecDeque<(f64, f64, f64)>, thresholds: &TremorThresholds) -> TremorMetrics {
    let n = positions.len();
    let duration = positions.back().map(|p| p.0).unwrap_or(0.0)
        - positions.front().map(|p| p.0).unwrap_or(0.0);
    if duration <= 0.0 {
        return TremorMetrics::default();
    }

    let mean_x = positions.iter().map(|p| p.1).sum::<f64>() / n as f64;
    let mean_y = positions.iter().map(|p| p.2).sum::<f64>() / n as f64;

    let dx: Vec<f64> = positions.iter().map(|p| p.1 - mean_x).collect();
    let dy: Vec<f64> = positions.iter().map(|p| p.2 - mean_y).collect();

    // Oscillation is read off the axis with the larger spread
    let var_x = dx.iter().map(|v| v * v).sum::<f64>();
    let var_y = dy.iter().map(|v| v * v).sum::<f64>();
    let dominant = if var_x >= var_y { &dx } else { &dy };

    let crossings = mean_crossings(dominant);
    let frequency_hz = crossings as f64 / (2.0 * duration);

    let max = dominant.iter().cloned().fold(f64::MIN, f64::max);
    let min = dominant.iter().cloned().fold(f64::MAX, f64::min);
    let amplitude = max - min;

    let magnitude: Vec<f64> = dx
        .iter()
        .zip(dy.iter())
        .map(|(x, y)| (x * x + y * y).sqrt())
        .collect();
    let peak_count = count_peaks(&magnitude);

    TremorMetrics {
        frequency_hz,
        amplitude,
        peak_count,
        band: classify_band(frequency_hz, thresholds),
        severity: classify_severity(amplitude, thresholds),
    }
}

/// Count sign changes of a mean-removed signal
fn mean_crossings(signal: &[f64]) -> u32 {
    let mut crossings = 0;
    let mut last_sign = 0i8;
    for &v in signal {
        let sign = if v > 0.0 {
            1
        } else if v < 0.0 {
            -1
        } else {
            0
        };
        if sign != 0 {
            if last_sign != 0 && sign != last_sign {
                crossings += 1;
            }
            last_sign = sign;
        }
    }
    crossings
}

/// Local maxima at least a tenth of the global maximum
fn count_peaks(signal: &[f64]) -> u32 {
    let max = signal.iter().cloned().fold(0.0f64, f64::max);
    if max <= 0.0 {
        return 0;
    }
    let floor = max / 10.0;
    let mut peaks = 0;
    for i in 1..signal.len().saturating_sub(1) {
        if signal[i] >= floor && signal[i] > signal[i - 1] && signal[i] > signal[i + 1] {
            peaks += 1;
        }
    }
    peaks
}

/// Frequency band: below the resting bound is resting, up to and including
/// the action bound is action, above is postural.
pub(crate) fn classify_band(frequency_hz: f64, thresholds: &TremorThresholds) -> TremorBand {
    if frequency_hz <= 0.0 {
        TremorBand::None
    } else if frequency_hz < thresholds.resting_max_hz {
        TremorBand::Resting
    } else if frequency_hz <= thresholds.action_max_hz {
        TremorBand::Action
    } else {
        TremorBand::Postural
    }
}

/// Amplitude severity banding
pub(crate) fn classify_severity(amplitude: f64, thresholds: &TremorThresholds) -> SeverityBand {
    if amplitude <= 0.0 {
        SeverityBand::None
    } else if amplitude < thresholds.mild_max_amplitude {
        SeverityBand::Mild
    } else if amplitude <= thresholds.moderate_max_amplitude {
        SeverityBand::Moderate
    } else {
        SeverityBand::Severe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Keypoint;
    use chrono::{Duration, Utc};
    use std::collections::BTreeMap;

    fn frame_with_tip(x: f64, y: f64, t_ms: i64) -> FrameObservation {
        let mut landmarks = BTreeMap::new();
        landmarks.insert(
            keys::INDEX_TIP.to_string(),
            Keypoint {
                x,
                y,
                z: None,
                confidence: 0.95,
            },
        );
        FrameObservation {
            timestamp: Utc::now() + Duration::milliseconds(t_ms),
            landmarks,
            frame_width: Some(640.0),
            frame_height: Some(480.0),
            audio: None,
            response_latency_ms: None,
        }
    }

    fn tremor(sample: &MeasurementSample) -> &TremorMetrics {
        match &sample.metrics {
            DomainMetrics::Tremor(t) => t,
            _ => panic!("expected tremor metrics"),
        }
    }

    /// Feed a synthetic sine oscillation at `freq_hz` and return the last sample
    fn run_sine(freq_hz: f64, amplitude: f64) -> MeasurementSample {
        let mut calc = TremorCalculator::new(TremorThresholds::default());
        let fps = 30.0;
        let mut last = None;
        for i in 0..90 {
            let t = i as f64 / fps;
            let x = 100.0 + amplitude / 2.0 * (2.0 * std::f64::consts::PI * freq_hz * t).sin();
            let frame = frame_with_tip(x, 200.0, (t * 1000.0) as i64);
            let ctx = TickContext {
                prev: None,
                dt_sec: 1.0 / fps,
                phase_name: "recording",
                elapsed_in_phase_sec: t,
                elapsed_in_session_sec: t,
            };
            last = Some(calc.process(&frame, &ctx).unwrap());
        }
        last.unwrap()
    }

    #[test]
    fn test_sine_frequency_estimate() {
        let sample = run_sine(4.0, 10.0);
        let metrics = tremor(&sample);
        assert!(
            (metrics.frequency_hz - 4.0).abs() < 0.5,
            "estimated {} Hz",
            metrics.frequency_hz
        );
        assert!(metrics.peak_count > 0);
    }

    #[test]
    fn test_sine_amplitude_is_peak_to_peak() {
        let sample = run_sine(5.0, 10.0);
        let metrics = tremor(&sample);
        assert!(
            (metrics.amplitude - 10.0).abs() < 1.0,
            "estimated amplitude {}",
            metrics.amplitude
        );
    }

    #[test]
    fn test_band_boundaries() {
        let th = TremorThresholds::default();
        assert_eq!(classify_band(3.9, &th), TremorBand::Resting);
        assert_eq!(classify_band(4.0, &th), TremorBand::Action);
        assert_eq!(classify_band(4.1, &th), TremorBand::Action);
        assert_eq!(classify_band(7.0, &th), TremorBand::Action);
        assert_eq!(classify_band(7.1, &th), TremorBand::Postural);
        assert_eq!(classify_band(0.0, &th), TremorBand::None);
    }

    #[test]
    fn test_severity_bands() {
        let th = TremorThresholds::default();
        assert_eq!(classify_severity(0.0, &th), SeverityBand::None);
        assert_eq!(classify_severity(0.4, &th), SeverityBand::Mild);
        assert_eq!(classify_severity(0.5, &th), SeverityBand::Moderate);
        assert_eq!(classify_severity(1.5, &th), SeverityBand::Moderate);
        assert_eq!(classify_severity(1.6, &th), SeverityBand::Severe);
    }

    #[test]
    fn test_missing_fingertip_degrades() {
        let mut calc = TremorCalculator::new(TremorThresholds::default());
        let mut frame = frame_with_tip(0.0, 0.0, 0);
        frame.landmarks.clear();
        frame.landmarks.insert(
            keys::NOSE.to_string(),
            Keypoint {
                x: 1.0,
                y: 1.0,
                z: None,
                confidence: 0.9,
            },
        );

        let ctx = TickContext {
            prev: None,
            dt_sec: 0.033,
            phase_name: "recording",
            elapsed_in_phase_sec: 0.0,
            elapsed_in_session_sec: 0.0,
        };
        let sample = calc.process(&frame, &ctx).unwrap();
        assert!(sample.degraded);
        assert_eq!(*tremor(&sample), TremorMetrics::default());
    }

    #[test]
    fn test_short_history_reports_empty_estimate() {
        let mut calc = TremorCalculator::new(TremorThresholds::default());
        let frame = frame_with_tip(100.0, 100.0, 0);
        let ctx = TickContext {
            prev: None,
            dt_sec: 0.033,
            phase_name: "recording",
            elapsed_in_phase_sec: 0.0,
            elapsed_in_session_sec: 0.0,
        };
        let sample = calc.process(&frame, &ctx).unwrap();
        assert!(!sample.degraded);
        assert_eq!(tremor(&sample).frequency_hz, 0.0);
        assert_eq!(tremor(&sample).band, TremorBand::None);
    }

    #[test]
    fn test_reset_phase_clears_window() {
        let mut calc = TremorCalculator::new(TremorThresholds::default());
        for i in 0..40 {
            let t = i as f64 / 30.0;
            let frame = frame_with_tip(100.0 + (i % 2) as f64 * 5.0, 100.0, (t * 1000.0) as i64);
            let ctx = TickContext {
                prev: None,
                dt_sec: 1.0 / 30.0,
                phase_name: "recording",
                elapsed_in_phase_sec: t,
                elapsed_in_session_sec: t,
            };
            calc.process(&frame, &ctx).unwrap();
        }
        calc.reset_phase();
        assert!(calc.positions.is_empty());
    }
}
