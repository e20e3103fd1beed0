use crate::participant::{
    ParticipantId,
    ParticipantInit,
    ParticipantPatch,
    Role,
};
use chrono::{
    DateTime,
    Utc,
};
use derive_more::{
    Display,
    From,
};
use serde::{
    Deserialize,
    Serialize,
};
use uuid::Uuid;

/// Where a proposed change came from. The order of the variants is the
/// priority used to break exact timestamp ties.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum EventSource {
    /// The local user's own action, applied before the backend confirms it.
    LocalOptimistic,
    /// Relayed by the sync backend; authoritative over local guesses.
    #[default]
    RemoteRelay,
    /// Issued by the session host.
    HostOverride,
}

impl EventSource {
    pub fn has_host_authority(&self) -> bool {
        matches!(self, EventSource::HostOverride)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Correlates a local optimistic change with the relay event confirming it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(String);

impl From<&str> for ChangeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPayload {
    Join(ParticipantInit),
    Patch(ParticipantPatch),
    Heartbeat,
    Leave,
}

impl SyncPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncPayload::Join(_) => "join",
            SyncPayload::Patch(_) => "patch",
            SyncPayload::Heartbeat => "heartbeat",
            SyncPayload::Leave => "leave",
        }
    }
}

/// An incoming proposal to change one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub id: EventId,
    pub participant_id: ParticipantId,
    pub payload: SyncPayload,
    pub source: EventSource,
    pub timestamp: DateTime<Utc>,
    pub origin_role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_id: Option<ChangeId>,
}

impl SyncEvent {
    pub fn new(
        participant_id: impl Into<ParticipantId>,
        payload: SyncPayload,
        source: EventSource,
        origin_role: Role,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::random(),
            participant_id: participant_id.into(),
            payload,
            source,
            timestamp,
            origin_role,
            change_id: None,
        }
    }

    pub fn join(participant_id: impl Into<ParticipantId>, init: ParticipantInit, timestamp: DateTime<Utc>) -> Self {
        let role = init.role;
        Self::new(
            participant_id,
            SyncPayload::Join(init),
            EventSource::RemoteRelay,
            role,
            timestamp,
        )
    }

    pub fn leave(participant_id: impl Into<ParticipantId>, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            participant_id,
            SyncPayload::Leave,
            EventSource::RemoteRelay,
            Role::Member,
            timestamp,
        )
    }

    pub fn heartbeat(participant_id: impl Into<ParticipantId>, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            participant_id,
            SyncPayload::Heartbeat,
            EventSource::RemoteRelay,
            Role::Member,
            timestamp,
        )
    }

    pub fn patch(
        participant_id: impl Into<ParticipantId>,
        patch: ParticipantPatch,
        source: EventSource,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let origin_role = if source.has_host_authority() {
            Role::Host
        } else {
            Role::Member
        };
        Self::new(participant_id, SyncPayload::Patch(patch), source, origin_role, timestamp)
    }

    pub fn with_id(mut self, id: EventId) -> Self {
        self.id = id;
        self
    }

    pub fn with_change_id(mut self, change_id: impl Into<ChangeId>) -> Self {
        self.change_id = Some(change_id.into());
        self
    }

    pub fn with_origin_role(mut self, role: Role) -> Self {
        self.origin_role = role;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tie_break_priority_follows_variant_order() {
        assert!(EventSource::LocalOptimistic < EventSource::RemoteRelay);
        assert!(EventSource::RemoteRelay < EventSource::HostOverride);
        assert!(EventSource::HostOverride.has_host_authority());
        assert!(!EventSource::RemoteRelay.has_host_authority());
    }

    #[test]
    fn events_deserialize_from_relay_json() {
        let event: SyncEvent = serde_json::from_value(serde_json::json!({
            "id": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
            "participant_id": "b",
            "payload": { "patch": { "video_enabled": true } },
            "source": "host-override",
            "timestamp": "2024-05-01T10:00:00Z",
            "origin_role": "host",
            "change_id": "c-1"
        }))
        .unwrap();

        assert_eq!(event.participant_id, ParticipantId::from("b"));
        assert_eq!(event.source, EventSource::HostOverride);
        assert_eq!(event.origin_role, Role::Host);
        assert_eq!(event.payload, SyncPayload::Patch(ParticipantPatch::video(true)));
        assert_eq!(event.change_id, Some(ChangeId::from("c-1")));
    }
}
