//! Lifecycle of the per-participant video streams.

mod events;
mod manager;
mod retry;
mod state;
mod worker;

use crate::{
    error::StreamError,
    participant::ParticipantId,
};
pub use events::{
    StreamEvent,
    StreamEventKind,
};
use huddle_config::{
    Codec,
    QualityProfile,
};
pub use manager::StreamManager;
pub use retry::{
    RetryPolicy,
    StreamSettings,
};
use serde::{
    Deserialize,
    Serialize,
};
pub use state::{
    StreamInput,
    StreamState,
    TransitionError,
};

/// Published view of one participant's stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamHandle {
    pub participant_id: ParticipantId,
    pub state: StreamState,
    pub current_tier: QualityProfile,
    pub retry_count: u32,
    pub last_error: Option<StreamError>,
    pub codec: Codec,
}

impl StreamHandle {
    pub fn new(participant_id: ParticipantId, tier: QualityProfile, codec: Codec) -> Self {
        Self {
            participant_id,
            state: StreamState::Idle,
            current_tier: tier,
            retry_count: 0,
            last_error: None,
            codec,
        }
    }
}
