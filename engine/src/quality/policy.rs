use super::QualityCatalog;
use huddle_config::QualityProfile;
use serde::{
    Deserialize,
    Serialize,
};

/// A tier chosen for one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityTarget {
    pub profile: QualityProfile,
    /// No tier fit the budget and the floor was forced.
    pub constrained: bool,
}

impl QualityTarget {
    pub fn unconstrained(profile: QualityProfile) -> Self {
        Self {
            profile,
            constrained: false,
        }
    }
}

impl std::fmt::Display for QualityTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.constrained {
            write!(f, "{} (constrained)", self.profile)
        } else {
            write!(f, "{}", self.profile)
        }
    }
}

/// Maps a bandwidth estimate onto the catalog.
#[derive(Debug, Clone)]
pub struct QualityPolicy {
    catalog: QualityCatalog,
    safety_margin: f64,
}

impl QualityPolicy {
    pub fn new(catalog: QualityCatalog, safety_margin: f64) -> Self {
        Self { catalog, safety_margin }
    }

    pub fn catalog(&self) -> &QualityCatalog {
        &self.catalog
    }

    pub fn budget_per_stream(&self, estimate_kbps: u32, live_streams: usize) -> f64 {
        estimate_kbps as f64 / live_streams.max(1) as f64 * self.safety_margin
    }

    pub fn target_for(&self, estimate_kbps: u32, live_streams: usize) -> QualityTarget {
        let budget = self.budget_per_stream(estimate_kbps, live_streams);
        match self.catalog.best_within(budget) {
            Some(profile) => QualityTarget::unconstrained(profile),
            None => QualityTarget {
                profile: self.catalog.floor(),
                constrained: true,
            },
        }
    }
}
