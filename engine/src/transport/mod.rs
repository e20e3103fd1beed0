//! Seam to the media layer that actually captures and sends video.

mod scripted;

use crate::participant::ParticipantId;
use async_trait::async_trait;
use huddle_config::{
    Codec,
    QualityProfile,
};
pub use scripted::{
    Acquisition,
    ScriptedTransport,
};
use serde::{
    Deserialize,
    Serialize,
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    NetworkFailure,
    CodecUnsupported,
    PermissionDenied,
    Unknown,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// An acquired outgoing or incoming video stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRef {
    pub participant_id: ParticipantId,
    pub stream_id: u64,
    pub codec: Codec,
}

#[async_trait]
pub trait MediaTransport: Send + Sync + std::fmt::Debug {
    async fn acquire_stream(
        &self,
        participant: &ParticipantId,
        tier: &QualityProfile,
        codec: Codec,
    ) -> Result<StreamRef, TransportError>;

    async fn release_stream(&self, participant: &ParticipantId);

    async fn apply_tier_constraints(&self, stream: &StreamRef, tier: &QualityProfile) -> Result<(), TransportError>;
}
