use super::{
    NetworkSample,
    TransportStats,
};
use crate::participant::ConnectionQuality;
use chrono::{
    DateTime,
    Utc,
};
use huddle_config::{
    NetworkThresholds,
    QualityThreshold,
};
use std::collections::VecDeque;

/// Rolling window of the last `capacity` samples.
#[derive(Debug, Clone)]
pub struct NetworkWindow {
    samples: VecDeque<NetworkSample>,
    capacity: usize,
    thresholds: NetworkThresholds,
    latest: Option<TransportStats>,
}

impl NetworkWindow {
    pub fn new(capacity: usize, thresholds: NetworkThresholds) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            thresholds,
            latest: None,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = &NetworkSample> {
        self.samples.iter()
    }

    /// Remembers the latest transport statistics until the next sample.
    pub fn ingest(&mut self, stats: TransportStats) {
        self.latest = Some(stats);
    }

    /// Turns the latest ingested statistics into a sample. Without fresh
    /// statistics since the last call nothing is recorded.
    pub fn sample(&mut self, now: DateTime<Utc>) -> Option<NetworkSample> {
        let stats = self.latest.take()?;
        let sample = NetworkSample::from_stats(stats, now);
        self.push(sample.clone());
        Some(sample)
    }

    pub fn push(&mut self, sample: NetworkSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Median available bandwidth of the window.
    pub fn estimated_bandwidth(&self) -> Option<u32> {
        median(self.samples.iter().map(|s| s.available_bandwidth_kbps as f64).collect()).map(|kbps| kbps.round() as u32)
    }

    pub fn classify(&self) -> ConnectionQuality {
        let Some(bandwidth) = self.estimated_bandwidth() else {
            return ConnectionQuality::Good;
        };
        let round_trip = median(self.samples.iter().map(|s| s.round_trip_ms as f64).collect()).unwrap_or_default();
        let loss = median(self.samples.iter().map(|s| s.loss_ratio).collect()).unwrap_or_default();

        let meets = |threshold: &QualityThreshold| {
            bandwidth >= threshold.min_bandwidth_kbps
                && round_trip <= threshold.max_round_trip_ms as f64
                && loss <= threshold.max_loss_ratio
        };

        if meets(&self.thresholds.excellent) {
            ConnectionQuality::Excellent
        } else if meets(&self.thresholds.good) {
            ConnectionQuality::Good
        } else {
            ConnectionQuality::Poor
        }
    }
}

/// Even-sized inputs average the two middle values.
fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
