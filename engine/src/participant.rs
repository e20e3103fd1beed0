use crate::sync::EventSource;
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
use strum::EnumIter;

/// Opaque, stable identifier of a session member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Host,
    #[default]
    Member,
}

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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionQuality {
    Poor,
    #[default]
    Good,
    Excellent,
}

/// Canonical record of one session member as published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub role: Role,
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub connection_quality: ConnectionQuality,
    pub is_spotlighted: bool,
    pub last_updated_at: DateTime<Utc>,
    pub last_updated_by_role: Role,
    pub last_updated_source: EventSource,
}

impl Participant {
    pub(crate) fn from_init(
        id: ParticipantId,
        init: &ParticipantInit,
        at: DateTime<Utc>,
        role: Role,
        source: EventSource,
    ) -> Self {
        Self {
            id,
            display_name: init.display_name.clone(),
            role: init.role,
            video_enabled: init.video_enabled,
            audio_enabled: init.audio_enabled,
            connection_quality: ConnectionQuality::default(),
            is_spotlighted: false,
            last_updated_at: at,
            last_updated_by_role: role,
            last_updated_source: source,
        }
    }

    pub fn value_of(&self, field: Field) -> FieldValue {
        match field {
            Field::DisplayName => FieldValue::Text(self.display_name.clone()),
            Field::Role => FieldValue::Role(self.role),
            Field::VideoEnabled => FieldValue::Flag(self.video_enabled),
            Field::AudioEnabled => FieldValue::Flag(self.audio_enabled),
            Field::ConnectionQuality => FieldValue::Quality(self.connection_quality),
            Field::Spotlighted => FieldValue::Flag(self.is_spotlighted),
        }
    }
}

/// Fields a participant announces when joining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInit {
    pub display_name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub video_enabled: bool,
    #[serde(default)]
    pub audio_enabled: bool,
}

impl ParticipantInit {
    pub fn new(display_name: impl Into<String>, role: Role) -> Self {
        Self {
            display_name: display_name.into(),
            role,
            video_enabled: false,
            audio_enabled: false,
        }
    }

    pub fn with_video(mut self, enabled: bool) -> Self {
        self.video_enabled = enabled;
        self
    }

    pub fn with_audio(mut self, enabled: bool) -> Self {
        self.audio_enabled = enabled;
        self
    }

    /// The join fields as a patch, used when a known participant joins again.
    pub(crate) fn as_patch(&self) -> ParticipantPatch {
        ParticipantPatch {
            display_name: Some(self.display_name.clone()),
            role: Some(self.role),
            video_enabled: Some(self.video_enabled),
            audio_enabled: Some(self.audio_enabled),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Field {
    DisplayName,
    Role,
    VideoEnabled,
    AudioEnabled,
    ConnectionQuality,
    Spotlighted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Role(Role),
    Flag(bool),
    Quality(ConnectionQuality),
}

/// A subset of participant fields. Absent fields are left untouched.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_quality: Option<ConnectionQuality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_spotlighted: Option<bool>,
}

impl ParticipantPatch {
    pub fn video(enabled: bool) -> Self {
        Self {
            video_enabled: Some(enabled),
            ..Default::default()
        }
    }

    pub fn audio(enabled: bool) -> Self {
        Self {
            audio_enabled: Some(enabled),
            ..Default::default()
        }
    }

    pub fn spotlight(enabled: bool) -> Self {
        Self {
            is_spotlighted: Some(enabled),
            ..Default::default()
        }
    }

    pub fn connection_quality(quality: ConnectionQuality) -> Self {
        Self {
            connection_quality: Some(quality),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    pub fn fields(&self) -> Vec<Field> {
        let mut fields = Vec::new();
        if self.display_name.is_some() {
            fields.push(Field::DisplayName);
        }
        if self.role.is_some() {
            fields.push(Field::Role);
        }
        if self.video_enabled.is_some() {
            fields.push(Field::VideoEnabled);
        }
        if self.audio_enabled.is_some() {
            fields.push(Field::AudioEnabled);
        }
        if self.connection_quality.is_some() {
            fields.push(Field::ConnectionQuality);
        }
        if self.is_spotlighted.is_some() {
            fields.push(Field::Spotlighted);
        }
        fields
    }

    pub fn value_of(&self, field: Field) -> Option<FieldValue> {
        match field {
            Field::DisplayName => self.display_name.clone().map(FieldValue::Text),
            Field::Role => self.role.map(FieldValue::Role),
            Field::VideoEnabled => self.video_enabled.map(FieldValue::Flag),
            Field::AudioEnabled => self.audio_enabled.map(FieldValue::Flag),
            Field::ConnectionQuality => self.connection_quality.map(FieldValue::Quality),
            Field::Spotlighted => self.is_spotlighted.map(FieldValue::Flag),
        }
    }

    /// Copy of this patch keeping only `fields`.
    pub fn restricted_to(&self, fields: &[Field]) -> Self {
        let keep = |field| fields.contains(&field);
        Self {
            display_name: self.display_name.clone().filter(|_| keep(Field::DisplayName)),
            role: self.role.filter(|_| keep(Field::Role)),
            video_enabled: self.video_enabled.filter(|_| keep(Field::VideoEnabled)),
            audio_enabled: self.audio_enabled.filter(|_| keep(Field::AudioEnabled)),
            connection_quality: self.connection_quality.filter(|_| keep(Field::ConnectionQuality)),
            is_spotlighted: self.is_spotlighted.filter(|_| keep(Field::Spotlighted)),
        }
    }

    /// Replaces every field present in the patch on `participant`.
    pub fn apply_to(&self, participant: &mut Participant) {
        if let Some(display_name) = &self.display_name {
            participant.display_name = display_name.clone();
        }
        if let Some(role) = self.role {
            participant.role = role;
        }
        if let Some(video_enabled) = self.video_enabled {
            participant.video_enabled = video_enabled;
        }
        if let Some(audio_enabled) = self.audio_enabled {
            participant.audio_enabled = audio_enabled;
        }
        if let Some(connection_quality) = self.connection_quality {
            participant.connection_quality = connection_quality;
        }
        if let Some(is_spotlighted) = self.is_spotlighted {
            participant.is_spotlighted = is_spotlighted;
        }
    }

    /// Fields whose patched value differs from the participant's current one.
    pub fn differing_fields(&self, participant: &Participant) -> Vec<Field> {
        self.fields()
            .into_iter()
            .filter(|field| self.value_of(*field).as_ref() != Some(&participant.value_of(*field)))
            .collect()
    }
}
