use eyre::{
    ensure,
    Context as _,
    Result,
};
use huddle_engine::{
    ErrorKind,
    EventSource,
    ParticipantId,
    ParticipantPatch,
    Role,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::path::Path;

/// A timed list of things that happen to a session.
///
/// ```yaml
/// name: fourth joiner
/// steps:
///   - at_ms: 0
///     action: bandwidth
///     kbps: 3000
///   - at_ms: 0
///     action: join
///     participant: a
///     video: true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    /// Participant the session runs as. Its connection quality follows the
    /// network monitor.
    #[serde(default)]
    pub local: Option<ParticipantId>,
    /// How long the session keeps running after the last step.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    pub steps: Vec<Step>,
}

fn default_settle_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Offset from the start of the run.
    pub at_ms: u64,
    /// Event timestamp relative to the start of the run, `at_ms` when unset.
    /// Lets a scenario deliver events late or out of order.
    #[serde(default)]
    pub timestamp_ms: Option<i64>,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Join {
        participant: ParticipantId,
        #[serde(default)]
        display_name: Option<String>,
        #[serde(default)]
        role: Role,
        #[serde(default)]
        video: bool,
        #[serde(default)]
        audio: bool,
    },
    Leave {
        participant: ParticipantId,
    },
    Heartbeat {
        participant: ParticipantId,
    },
    Patch {
        participant: ParticipantId,
        #[serde(default)]
        source: EventSource,
        #[serde(default)]
        change_id: Option<String>,
        patch: ParticipantPatch,
    },
    Bandwidth {
        kbps: u32,
        #[serde(default = "default_round_trip_ms")]
        round_trip_ms: u32,
        #[serde(default)]
        loss_ratio: f64,
    },
    /// Queues acquisition failures on the scripted transport.
    FailAcquire {
        participant: ParticipantId,
        kind: ErrorKind,
        #[serde(default = "default_count")]
        count: usize,
    },
    /// A failure on an established stream, as the transport would report it.
    ReportFailure {
        participant: ParticipantId,
        kind: ErrorKind,
    },
    ResetStream {
        participant: ParticipantId,
    },
}

fn default_round_trip_ms() -> u32 {
    40
}

fn default_count() -> usize {
    1
}

impl Scenario {
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.steps.is_empty(), "scenario has no steps");
        for (index, step) in self.steps.iter().enumerate() {
            match &step.action {
                Action::Bandwidth { loss_ratio, .. } => ensure!(
                    (0.0..=1.0).contains(loss_ratio),
                    "step {index}: loss_ratio must be within [0, 1], got {loss_ratio}"
                ),
                Action::Patch { patch, .. } => {
                    ensure!(!patch.is_empty(), "step {index}: patch does not set any field")
                }
                Action::FailAcquire { count, .. } => ensure!(*count > 0, "step {index}: count must be positive"),
                _ => {}
            }
        }
        Ok(())
    }

    /// Steps in the order they fire. Steps sharing an offset keep file order.
    pub fn ordered_steps(&self) -> Vec<Step> {
        let mut steps = self.steps.clone();
        steps.sort_by_key(|step| step.at_ms);
        steps
    }
}

pub fn parse_scenario(path: &Path) -> Result<Scenario> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read scenario {}", path.display()))?;
    let scenario = serde_yml::from_str::<Scenario>(&content)
        .with_context(|| format!("failed to parse scenario {}", path.display()))?;
    scenario.validate()?;
    Ok(scenario)
}
