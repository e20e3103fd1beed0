use super::StreamState;
use crate::{
    error::StreamError,
    participant::ParticipantId,
};
use chrono::{
    DateTime,
    Utc,
};
use huddle_config::QualityProfile;
use serde::{
    Deserialize,
    Serialize,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StreamEventKind {
    StateChanged {
        from: StreamState,
        to: StreamState,
    },
    TierChanged {
        from: QualityProfile,
        to: QualityProfile,
    },
    /// A retry is about to start. Only from the second attempt on is it
    /// worth telling the user about.
    Reconnecting {
        attempt: u32,
        user_visible: bool,
    },
    Error {
        error: StreamError,
        user_actionable: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub participant_id: ParticipantId,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: StreamEventKind,
}

impl StreamEvent {
    pub fn new(participant_id: ParticipantId, kind: StreamEventKind) -> Self {
        Self {
            participant_id,
            at: Utc::now(),
            kind,
        }
    }

    pub fn error(participant_id: ParticipantId, error: StreamError) -> Self {
        let user_actionable = error.is_user_actionable();
        Self::new(participant_id, StreamEventKind::Error { error, user_actionable })
    }
}

impl std::fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            StreamEventKind::StateChanged { from, to } => write!(f, "{}: {from} -> {to}", self.participant_id),
            StreamEventKind::TierChanged { from, to } => write!(f, "{}: tier {from} -> {to}", self.participant_id),
            StreamEventKind::Reconnecting { attempt, .. } => {
                write!(f, "{}: reconnecting (attempt {attempt})", self.participant_id)
            }
            StreamEventKind::Error { error, .. } => write!(f, "{}: {error}", self.participant_id),
        }
    }
}
