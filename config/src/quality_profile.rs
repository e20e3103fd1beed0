use serde::{
    Deserialize,
    Serialize,
};
use strum::{
    Display,
    EnumIter,
    EnumString,
};

#[derive(
    Debug, Default, Clone, Copy, Display, EnumIter, EnumString, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Resolution {
    P144,
    P240,
    #[default]
    P360,
    P480,
    P720,
    P1080,
}

impl Resolution {
    pub fn height(&self) -> u32 {
        match self {
            Resolution::P144 => 144,
            Resolution::P240 => 240,
            Resolution::P360 => 360,
            Resolution::P480 => 480,
            Resolution::P720 => 720,
            Resolution::P1080 => 1080,
        }
    }

    /// Width for a 16:9 frame, rounded down to an even pixel count.
    pub fn width(&self) -> u32 {
        (self.height() * 16 / 9) & !1
    }
}

/// One entry of the quality catalog. Entries are immutable and the
/// controller only ever picks from the configured catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualityProfile {
    pub tier_rank: u8,
    pub resolution: Resolution,
    pub target_frame_rate: u32,
    pub target_bitrate_kbps: u32,
}

impl std::fmt::Display for QualityProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} {}@{}fps {}kbps",
            self.tier_rank, self.resolution, self.target_frame_rate, self.target_bitrate_kbps
        )
    }
}

impl PartialOrd for QualityProfile {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QualityProfile {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.tier_rank.cmp(&other.tier_rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr as _;

    #[test]
    fn resolution_round_trips_through_strings() {
        assert_eq!(Resolution::from_str("p720").unwrap(), Resolution::P720);
        assert_eq!(Resolution::P1080.to_string(), "p1080");
        assert_eq!(Resolution::P720.width(), 1280);
        assert_eq!(Resolution::P360.width(), 640);
    }

    #[test]
    fn profiles_order_by_rank_only() {
        let low = QualityProfile {
            tier_rank: 0,
            resolution: Resolution::P720,
            target_frame_rate: 60,
            target_bitrate_kbps: 9000,
        };
        let high = QualityProfile {
            tier_rank: 1,
            resolution: Resolution::P144,
            target_frame_rate: 5,
            target_bitrate_kbps: 10,
        };
        assert!(low < high);
        assert_eq!(low.to_string(), "#0 p720@60fps 9000kbps");
    }
}
