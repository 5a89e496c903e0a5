//! Rolling measurement window
//!
//! A capacity-bounded FIFO buffer of recent measurement samples used for
//! real-time trend feedback. Eviction keeps `len() <= capacity` at all times.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config::DEFAULT_WINDOW_CAPACITY;
use crate::types::MeasurementSample;

/// Bounded rolling buffer of measurement samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingWindow {
    samples: VecDeque<MeasurementSample>,
    capacity: usize,
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

impl RollingWindow {
    /// Create a window with the given capacity (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append a sample, evicting the oldest once over capacity
    pub fn push(&mut self, sample: MeasurementSample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn latest(&self) -> Option<&MeasurementSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MeasurementSample> {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Mean of a selected field over the window.
    ///
    /// Samples whose selector yields `None` or a non-finite number are
    /// excluded from both numerator and denominator; they are never coerced
    /// to zero. Returns `None` when no sample contributed.
    pub fn average<F>(&self, selector: F) -> Option<f64>
    where
        F: Fn(&MeasurementSample) -> Option<f64>,
    {
        let values: Vec<f64> = self
            .samples
            .iter()
            .filter_map(&selector)
            .filter(|v| v.is_finite())
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    /// Direction of change of a selected field: mean of the newer half minus
    /// mean of the older half. Requires at least 4 valid values.
    pub fn trend<F>(&self, selector: F) -> Option<f64>
    where
        F: Fn(&MeasurementSample) -> Option<f64>,
    {
        let values: Vec<f64> = self
            .samples
            .iter()
            .filter_map(&selector)
            .filter(|v| v.is_finite())
            .collect();
        if values.len() < 4 {
            return None;
        }
        let mid = values.len() / 2;
        let older = values[..mid].iter().sum::<f64>() / mid as f64;
        let newer = values[mid..].iter().sum::<f64>() / (values.len() - mid) as f64;
        Some(newer - older)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DomainMetrics, TremorMetrics};
    use chrono::Utc;

    fn sample(frequency_hz: f64) -> MeasurementSample {
        MeasurementSample {
            timestamp: Utc::now(),
            phase: "recording".to_string(),
            degraded: false,
            metrics: DomainMetrics::Tremor(TremorMetrics {
                frequency_hz,
                ..Default::default()
            }),
        }
    }

    fn frequency(sample: &MeasurementSample) -> Option<f64> {
        match &sample.metrics {
            DomainMetrics::Tremor(t) => Some(t.frequency_hz),
            _ => None,
        }
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let mut window = RollingWindow::new(10);
        for i in 0..25 {
            window.push(sample(i as f64));
            assert!(window.len() <= 10);
        }
        assert_eq!(window.len(), 10);

        // Exactly the last 10 survive: 15..25
        let first = window.iter().next().unwrap();
        match &first.metrics {
            DomainMetrics::Tremor(t) => assert_eq!(t.frequency_hz, 15.0),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_average_excludes_nan() {
        let mut window = RollingWindow::new(10);
        window.push(sample(2.0));
        window.push(sample(f64::NAN));
        window.push(sample(4.0));

        // NaN sample contributes to neither numerator nor denominator
        let avg = window.average(frequency).unwrap();
        assert!((avg - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_average_empty_is_none() {
        let window = RollingWindow::new(10);
        assert!(window.average(frequency).is_none());
    }

    #[test]
    fn test_trend_direction() {
        let mut window = RollingWindow::new(10);
        for v in [1.0, 1.0, 5.0, 5.0] {
            window.push(sample(v));
        }
        let trend = window.trend(frequency).unwrap();
        assert!((trend - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_trend_needs_four_values() {
        let mut window = RollingWindow::new(10);
        for v in [1.0, 2.0, 3.0] {
            window.push(sample(v));
        }
        assert!(window.trend(frequency).is_none());
    }

    #[test]
    fn test_zero_capacity_clamped_to_one() {
        let mut window = RollingWindow::new(0);
        window.push(sample(1.0));
        window.push(sample(2.0));
        assert_eq!(window.len(), 1);
    }
}
