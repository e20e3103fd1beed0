use super::{
    QualityCatalog,
    QualityPolicy,
    QualityTarget,
};
use crate::participant::ParticipantId;
use huddle_config::QualityProfile;
use std::collections::HashMap;

/// What the controller needs to know about one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamView {
    pub participant_id: ParticipantId,
    pub tier: QualityProfile,
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum CycleKind {
    /// A tick of the control cadence.
    Regular,
    /// Triggered by a change in the number of streams.
    Recompute,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualityCommand {
    pub participant_id: ParticipantId,
    pub target: QualityTarget,
}

/// Tier selection with hysteresis.
///
/// Downward moves are issued on the first cycle that asks for them. Upward
/// moves need two consecutive regular cycles above the current tier and then
/// go to the smaller of the two targets.
#[derive(Debug, Clone)]
pub struct QualityController {
    policy: QualityPolicy,
    upward_evidence: HashMap<ParticipantId, QualityTarget>,
}

impl QualityController {
    pub fn new(policy: QualityPolicy) -> Self {
        Self {
            policy,
            upward_evidence: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &QualityPolicy {
        &self.policy
    }

    /// Orders tiers and the constrained floor on one scale: a constrained
    /// floor sits just below the unconstrained floor.
    fn level(catalog: &QualityCatalog, profile: &QualityProfile, constrained: bool) -> usize {
        catalog.position(profile).unwrap_or(0) * 2 + usize::from(!constrained)
    }

    pub fn evaluate(&mut self, estimate_kbps: u32, streams: &[StreamView], cycle: CycleKind) -> Vec<QualityCommand> {
        let target = self.policy.target_for(estimate_kbps, streams.len());
        let catalog = self.policy.catalog();
        let target_level = Self::level(catalog, &target.profile, target.constrained);
        trace!(estimate_kbps, streams = streams.len(), %target, %cycle, "Control cycle");

        let mut commands = Vec::new();
        for stream in streams {
            let current_level = Self::level(catalog, &stream.tier, stream.degraded);
            let id = &stream.participant_id;

            if target_level < current_level {
                self.upward_evidence.remove(id);
                debug!(participant = %id, from = %stream.tier, to = %target, "Lowering stream quality");
                commands.push(QualityCommand {
                    participant_id: id.clone(),
                    target,
                });
            } else if target_level == current_level {
                self.upward_evidence.remove(id);
            } else if cycle == CycleKind::Regular {
                match self.upward_evidence.remove(id) {
                    Some(previous) => {
                        let previous_level = Self::level(catalog, &previous.profile, previous.constrained);
                        let applied = if previous_level < target_level { previous } else { target };
                        debug!(participant = %id, from = %stream.tier, to = %applied, "Raising stream quality");
                        commands.push(QualityCommand {
                            participant_id: id.clone(),
                            target: applied,
                        });
                    }
                    None => {
                        trace!(participant = %id, %target, "Upward evidence recorded");
                        self.upward_evidence.insert(id.clone(), target);
                    }
                }
            }
        }
        commands
    }

    /// Forgets evidence for streams that no longer exist.
    pub fn retain(&mut self, streams: &[StreamView]) {
        self.upward_evidence
            .retain(|id, _| streams.iter().any(|stream| &stream.participant_id == id));
    }
}
