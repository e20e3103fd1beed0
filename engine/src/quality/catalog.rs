use eyre::{
    ensure,
    Result,
};
use huddle_config::{
    EngineConfig,
    QualityProfile,
};
use std::sync::Arc;

/// The fixed, rank-ordered set of tiers a stream may run at.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityCatalog {
    tiers: Arc<[QualityProfile]>,
}

impl QualityCatalog {
    pub fn new(tiers: impl Into<Vec<QualityProfile>>) -> Result<Self> {
        let mut tiers = tiers.into();
        ensure!(!tiers.is_empty(), "a quality catalog needs at least one tier");
        tiers.sort();
        for pair in tiers.windows(2) {
            ensure!(
                pair[0].tier_rank < pair[1].tier_rank,
                "tiers {} and {} share a rank",
                pair[0],
                pair[1]
            );
            ensure!(
                pair[0].target_bitrate_kbps < pair[1].target_bitrate_kbps,
                "tier {} does not need more bitrate than {}",
                pair[1],
                pair[0]
            );
        }
        Ok(Self { tiers: tiers.into() })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(config.quality_catalog.clone())
    }

    pub fn tiers(&self) -> &[QualityProfile] {
        &self.tiers
    }

    pub fn floor(&self) -> QualityProfile {
        self.tiers[0]
    }

    pub fn highest(&self) -> QualityProfile {
        self.tiers[self.tiers.len() - 1]
    }

    pub fn position(&self, tier: &QualityProfile) -> Option<usize> {
        self.tiers.iter().position(|t| t.tier_rank == tier.tier_rank)
    }

    /// The tier one rank below, or `None` at the floor.
    pub fn lower(&self, tier: &QualityProfile) -> Option<QualityProfile> {
        self.tiers.iter().rev().find(|t| t.tier_rank < tier.tier_rank).copied()
    }

    pub fn higher(&self, tier: &QualityProfile) -> Option<QualityProfile> {
        self.tiers.iter().find(|t| t.tier_rank > tier.tier_rank).copied()
    }

    /// Highest tier whose bitrate fits into `budget_kbps`.
    pub fn best_within(&self, budget_kbps: f64) -> Option<QualityProfile> {
        self.tiers
            .iter()
            .rev()
            .find(|t| t.target_bitrate_kbps as f64 <= budget_kbps)
            .copied()
    }
}
