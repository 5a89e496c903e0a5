//! Speech-pattern metric calculation
//!
//! Works on per-tick audio features instead of landmarks: input level,
//! fundamental frequency and a voiced flag. Pause detection and pitch
//! stability accumulate over the recording phase.

use log::warn;

use crate::error::EngineError;
use crate::metrics::{make_sample, variance, MetricCalculator, TickContext};
use crate::types::{
    AssessmentDomain, DomainMetrics, FrameObservation, MeasurementSample, SpeechMetrics,
};

/// Expected input level range (dBFS)
const VOLUME_MIN_DB: f64 = -90.0;
const VOLUME_MAX_DB: f64 = -10.0;

/// Plausible fundamental frequency range (Hz)
const PITCH_MIN_HZ: f64 = 50.0;
const PITCH_MAX_HZ: f64 = 500.0;

/// Silence runs inside this range count as clinical pauses (seconds)
const MIN_PAUSE_SEC: f64 = 0.2;
const MAX_PAUSE_SEC: f64 = 2.0;

/// Pitch samples kept for the stability estimate
const PITCH_WINDOW: usize = 90;

/// Speech-pattern metric calculator
pub struct SpeechCalculator {
    pitches: Vec<f64>,
    silence_run_sec: f64,
    pause_count: u32,
    voiced_ticks: u32,
    total_ticks: u32,
}

impl SpeechCalculator {
    pub fn new() -> Self {
        Self {
            pitches: Vec::with_capacity(PITCH_WINDOW),
            silence_run_sec: 0.0,
            pause_count: 0,
            voiced_ticks: 0,
            total_ticks: 0,
        }
    }

    fn pitch_stability(&self) -> f64 {
        if self.pitches.len() < 2 {
            return 100.0;
        }
        let std_dev = variance(&self.pitches).sqrt();
        (100.0 - std_dev).max(0.0)
    }
}

impl Default for SpeechCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricCalculator for SpeechCalculator {
    fn domain(&self) -> AssessmentDomain {
        AssessmentDomain::SpeechPattern
    }

    fn process(
        &mut self,
        frame: &FrameObservation,
        ctx: &TickContext,
    ) -> Result<MeasurementSample, EngineError> {
        let Some(audio) = frame.audio else {
            warn!("speech calculation degraded: no audio features on frame");
            return Ok(make_sample(
                frame,
                ctx,
                true,
                DomainMetrics::SpeechPattern(SpeechMetrics::default()),
            ));
        };

        self.total_ticks += 1;

        if audio.voiced {
            // A silence run that just ended in the clinical range was a pause
            if (MIN_PAUSE_SEC..=MAX_PAUSE_SEC).contains(&self.silence_run_sec) {
                self.pause_count += 1;
            }
            self.silence_run_sec = 0.0;
            self.voiced_ticks += 1;

            if let Some(pitch) = audio.pitch_hz {
                if (PITCH_MIN_HZ..=PITCH_MAX_HZ).contains(&pitch) {
                    self.pitches.push(pitch);
                    if self.pitches.len() > PITCH_WINDOW {
                        self.pitches.remove(0);
                    }
                }
            }
        } else {
            self.silence_run_sec += ctx.dt_sec;
        }

        let volume_level = audio
            .volume_db
            .map(|db| ((db - VOLUME_MIN_DB) / (VOLUME_MAX_DB - VOLUME_MIN_DB) * 100.0).clamp(0.0, 100.0))
            .unwrap_or(0.0);

        let speaking_ratio = if self.total_ticks > 0 {
            self.voiced_ticks as f64 / self.total_ticks as f64
        } else {
            0.0
        };

        Ok(make_sample(
            frame,
            ctx,
            false,
            DomainMetrics::SpeechPattern(SpeechMetrics {
                volume_level,
                pitch_hz: audio.pitch_hz,
                pitch_stability: self.pitch_stability(),
                pause_count: self.pause_count,
                speaking_ratio,
            }),
        ))
    }

    fn reset_phase(&mut self) {
        self.pitches.clear();
        self.silence_run_sec = 0.0;
        self.pause_count = 0;
        self.voiced_ticks = 0;
        self.total_ticks = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AudioSample;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn audio_frame(volume_db: f64, pitch_hz: Option<f64>, voiced: bool) -> FrameObservation {
        FrameObservation {
            timestamp: Utc::now(),
            landmarks: BTreeMap::new(),
            frame_width: None,
            frame_height: None,
            audio: Some(AudioSample {
                volume_db: Some(volume_db),
                pitch_hz,
                voiced,
            }),
            response_latency_ms: None,
        }
    }

    fn ctx(elapsed: f64) -> TickContext<'static> {
        TickContext {
            prev: None,
            dt_sec: 0.1,
            phase_name: "recording",
            elapsed_in_phase_sec: elapsed,
            elapsed_in_session_sec: elapsed,
        }
    }

    fn speech(sample: &MeasurementSample) -> &SpeechMetrics {
        match &sample.metrics {
            DomainMetrics::SpeechPattern(s) => s,
            _ => panic!("expected speech metrics"),
        }
    }

    #[test]
    fn test_volume_mapping() {
        let mut calc = SpeechCalculator::new();
        let sample = calc
            .process(&audio_frame(-50.0, Some(150.0), true), &ctx(0.0))
            .unwrap();
        // -50 dB is halfway through the -90..-10 range
        assert!((speech(&sample).volume_level - 50.0).abs() < 1e-9);

        let sample = calc
            .process(&audio_frame(-5.0, Some(150.0), true), &ctx(0.1))
            .unwrap();
        assert_eq!(speech(&sample).volume_level, 100.0);
    }

    #[test]
    fn test_stable_pitch_scores_high() {
        let mut calc = SpeechCalculator::new();
        let mut last = None;
        for i in 0..20 {
            last = Some(
                calc.process(
                    &audio_frame(-40.0, Some(150.0 + (i % 2) as f64), true),
                    &ctx(i as f64 * 0.1),
                )
                .unwrap(),
            );
        }
        assert!(speech(last.as_ref().unwrap()).pitch_stability > 95.0);
    }

    #[test]
    fn test_pause_counted_in_clinical_range() {
        let mut calc = SpeechCalculator::new();
        // Speak, pause 0.5s (5 ticks of 0.1s), speak again
        calc.process(&audio_frame(-40.0, Some(150.0), true), &ctx(0.0))
            .unwrap();
        for i in 1..=5 {
            calc.process(&audio_frame(-80.0, None, false), &ctx(i as f64 * 0.1))
                .unwrap();
        }
        let sample = calc
            .process(&audio_frame(-40.0, Some(150.0), true), &ctx(0.7))
            .unwrap();
        assert_eq!(speech(&sample).pause_count, 1);
    }

    #[test]
    fn test_long_silence_is_not_a_pause() {
        let mut calc = SpeechCalculator::new();
        calc.process(&audio_frame(-40.0, Some(150.0), true), &ctx(0.0))
            .unwrap();
        // 3 seconds of silence exceeds the pause range
        for i in 1..=30 {
            calc.process(&audio_frame(-85.0, None, false), &ctx(i as f64 * 0.1))
                .unwrap();
        }
        let sample = calc
            .process(&audio_frame(-40.0, Some(150.0), true), &ctx(3.2))
            .unwrap();
        assert_eq!(speech(&sample).pause_count, 0);
    }

    #[test]
    fn test_out_of_range_pitch_excluded_from_stability() {
        let mut calc = SpeechCalculator::new();
        for i in 0..10 {
            calc.process(&audio_frame(-40.0, Some(150.0), true), &ctx(i as f64 * 0.1))
                .unwrap();
        }
        // A 900 Hz glitch is outside the plausible band
        let sample = calc
            .process(&audio_frame(-40.0, Some(900.0), true), &ctx(1.1))
            .unwrap();
        assert!(speech(&sample).pitch_stability > 95.0);
    }

    #[test]
    fn test_missing_audio_degrades() {
        let mut calc = SpeechCalculator::new();
        let mut frame = audio_frame(-40.0, None, false);
        frame.audio = None;
        let sample = calc.process(&frame, &ctx(0.0)).unwrap();
        assert!(sample.degraded);
        assert_eq!(*speech(&sample), SpeechMetrics::default());
    }

    #[test]
    fn test_speaking_ratio() {
        let mut calc = SpeechCalculator::new();
        for i in 0..6 {
            calc.process(&audio_frame(-40.0, Some(150.0), true), &ctx(i as f64 * 0.1))
                .unwrap();
        }
        let mut last = None;
        for i in 6..10 {
            last = Some(
                calc.process(&audio_frame(-85.0, None, false), &ctx(i as f64 * 0.1))
                    .unwrap(),
            );
        }
        assert!((speech(last.as_ref().unwrap()).speaking_ratio - 0.6).abs() < 1e-9);
    }
}
