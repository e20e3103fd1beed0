use serde::{
    Deserialize,
    Serialize,
};
use strum::{
    Display,
    EnumIter,
    EnumString,
};

#[derive(Debug, Clone, Copy, Display, EnumIter, EnumString, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Codec {
    Vp9,
    Vp8,
    H264,
    Av1,
}

/// Limits a smoothed window has to satisfy to be classified at a given level.
/// All three limits must hold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThreshold {
    pub min_bandwidth_kbps: u32,
    pub max_round_trip_ms: u32,
    pub max_loss_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkThresholds {
    pub excellent: QualityThreshold,
    pub good: QualityThreshold,
}

impl Default for NetworkThresholds {
    fn default() -> Self {
        Self {
            excellent: QualityThreshold {
                min_bandwidth_kbps: 2500,
                max_round_trip_ms: 100,
                max_loss_ratio: 0.01,
            },
            good: QualityThreshold {
                min_bandwidth_kbps: 800,
                max_round_trip_ms: 300,
                max_loss_ratio: 0.05,
            },
        }
    }
}
