//! Rolling view of the local uplink built from transport statistics.

mod monitor;
mod window;

use chrono::{
    DateTime,
    Utc,
};
pub use monitor::NetworkQualityMonitor;
use serde::{
    Deserialize,
    Serialize,
};
pub use window::NetworkWindow;

/// Raw statistics as reported by the media transport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransportStats {
    pub available_bandwidth_kbps: u32,
    pub round_trip_ms: u32,
    pub loss_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSample {
    pub available_bandwidth_kbps: u32,
    pub round_trip_ms: u32,
    pub loss_ratio: f64,
    pub captured_at: DateTime<Utc>,
}

impl NetworkSample {
    pub fn from_stats(stats: TransportStats, captured_at: DateTime<Utc>) -> Self {
        Self {
            available_bandwidth_kbps: stats.available_bandwidth_kbps,
            round_trip_ms: stats.round_trip_ms,
            loss_ratio: stats.loss_ratio,
            captured_at,
        }
    }
}
