use super::event::{
    ChangeId,
    EventId,
    EventSource,
    SyncEvent,
    SyncPayload,
};
use crate::participant::{
    Field,
    Participant,
    ParticipantId,
    ParticipantInit,
    ParticipantPatch,
    Role,
};
use chrono::{
    DateTime,
    Utc,
};
use std::{
    collections::{
        BTreeMap,
        HashMap,
        HashSet,
        VecDeque,
    },
    time::Duration,
};
use strum::IntoEnumIterator as _;
use tokio::time::Instant;

/// Why an event did not change canonical state.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    #[error("event was already processed")]
    Duplicate,
    #[error("event is older than the recorded state")]
    Stale,
    #[error("field is held by a host override")]
    HostAuthority,
    #[error("participant is not in the session")]
    UnknownParticipant,
    #[error("host override from a non-host origin")]
    Unauthorized,
    #[error("patch carries no fields")]
    EmptyPatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Joined,
    Updated(Vec<Field>),
    /// A relay event confirmed an optimistic change with different values.
    Corrected(Vec<Field>),
    /// A relay event confirmed an optimistic change as-is.
    Confirmed,
    Left,
    Refreshed,
    Discarded(DiscardReason),
}

impl Outcome {
    pub fn changed_state(&self) -> bool {
        matches!(
            self,
            Outcome::Joined | Outcome::Updated(_) | Outcome::Corrected(_) | Outcome::Left
        )
    }
}

/// Who wrote a field, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    at: DateTime<Utc>,
    source: EventSource,
    role: Role,
}

impl Stamp {
    fn of(event: &SyncEvent) -> Self {
        Self {
            at: event.timestamp,
            source: event.source,
            role: event.origin_role,
        }
    }
}

/// Decides whether a write from `incoming` may replace a field stamped `current`.
///
/// Within the skew window host authority decides regardless of timestamps.
/// Outside it the later write wins and exact ties go to the higher source.
fn resolve(current: &Stamp, incoming: &Stamp, skew: chrono::Duration) -> Result<(), DiscardReason> {
    let within_window = (incoming.at - current.at).abs() <= skew;
    let incoming_host = incoming.source.has_host_authority();
    if within_window && incoming_host != current.source.has_host_authority() {
        return if incoming_host {
            Ok(())
        } else {
            Err(DiscardReason::HostAuthority)
        };
    }

    if incoming.at < current.at {
        return Err(DiscardReason::Stale);
    }
    if incoming.at == current.at && incoming.source < current.source {
        return Err(DiscardReason::Stale);
    }
    Ok(())
}

/// Judges an event as a whole against the stamps of the fields it touches.
///
/// A non-host write never lands on a host-held field inside the skew window.
/// Otherwise the event is resolved against the newest touched stamp.
fn judge(
    stamps: &HashMap<Field, Stamp>,
    fields: &[Field],
    incoming: &Stamp,
    skew: chrono::Duration,
) -> Result<(), DiscardReason> {
    let touched = fields.iter().filter_map(|field| stamps.get(field)).collect::<Vec<_>>();
    let host_held = touched
        .iter()
        .any(|stamp| stamp.source.has_host_authority() && (incoming.at - stamp.at).abs() <= skew);
    if host_held && !incoming.source.has_host_authority() {
        return Err(DiscardReason::HostAuthority);
    }

    match touched.into_iter().max_by_key(|stamp| (stamp.at, stamp.source)) {
        Some(newest) => resolve(newest, incoming, skew),
        None => Ok(()),
    }
}

#[derive(Debug, Clone)]
struct PendingChange {
    change_id: ChangeId,
    patch: ParticipantPatch,
    stamp: Stamp,
}

#[derive(Debug, Clone)]
struct Entry {
    participant: Participant,
    stamps: HashMap<Field, Stamp>,
    joined_at: DateTime<Utc>,
    last_seen: Instant,
    pending: VecDeque<PendingChange>,
}

impl Entry {
    fn touch(&mut self, now: Instant) {
        self.last_seen = now;
    }

    fn record_write(&mut self, field: Field, stamp: Stamp) {
        self.stamps.insert(field, stamp);
        if stamp.at >= self.participant.last_updated_at {
            self.participant.last_updated_at = stamp.at;
        }
        self.participant.last_updated_by_role = stamp.role;
        self.participant.last_updated_source = stamp.source;
    }
}

/// Canonical participant state and the merge rules that maintain it.
///
/// Not thread safe on purpose: the sync engine owns exactly one registry and
/// feeds it from a single queue.
#[derive(Debug)]
pub struct ParticipantRegistry {
    entries: BTreeMap<ParticipantId, Entry>,
    seen: VecDeque<EventId>,
    seen_index: HashSet<EventId>,
    replay_window: usize,
    skew: chrono::Duration,
}

impl ParticipantRegistry {
    pub fn new(replay_window: usize, skew: Duration) -> Self {
        Self {
            entries: BTreeMap::new(),
            seen: VecDeque::with_capacity(replay_window),
            seen_index: HashSet::with_capacity(replay_window),
            replay_window: replay_window.max(1),
            skew: chrono::Duration::from_std(skew).unwrap_or(chrono::Duration::zero()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&Participant> {
        self.entries.get(id).map(|entry| &entry.participant)
    }

    /// Participants ordered by id.
    pub fn snapshot(&self) -> Vec<Participant> {
        self.entries.values().map(|entry| entry.participant.clone()).collect()
    }

    pub fn apply(&mut self, event: SyncEvent, now: Instant) -> Outcome {
        if self.seen_index.contains(&event.id) {
            debug!(id = %event.id, participant = %event.participant_id, "Dropping duplicate event");
            return Outcome::Discarded(DiscardReason::Duplicate);
        }

        if event.source.has_host_authority() && event.origin_role != Role::Host {
            warn!(
                participant = %event.participant_id,
                origin_role = %event.origin_role,
                "Dropping host override from a non-host origin"
            );
            return Outcome::Discarded(DiscardReason::Unauthorized);
        }

        let known = self.entries.contains_key(&event.participant_id);
        if !known && !matches!(event.payload, SyncPayload::Join(_)) {
            warn!(
                participant = %event.participant_id,
                kind = event.payload.kind(),
                "Dropping event for a participant that is not in the session"
            );
            return Outcome::Discarded(DiscardReason::UnknownParticipant);
        }

        self.remember(event.id);

        let outcome = match &event.payload {
            SyncPayload::Join(init) if !known => self.insert(&event, init, now),
            SyncPayload::Join(init) => self.merge(&event, &init.as_patch(), now),
            SyncPayload::Patch(patch) => self.merge(&event, patch, now),
            SyncPayload::Heartbeat => {
                if let Some(entry) = self.entries.get_mut(&event.participant_id) {
                    entry.touch(now);
                }
                Outcome::Refreshed
            }
            SyncPayload::Leave => self.leave(&event, now),
        };

        match &outcome {
            Outcome::Discarded(reason) => {
                debug!(participant = %event.participant_id, source = %event.source, %reason, "Discarded event")
            }
            Outcome::Refreshed => trace!(participant = %event.participant_id, "Heartbeat"),
            outcome => debug!(participant = %event.participant_id, source = %event.source, ?outcome, "Applied event"),
        }

        outcome
    }

    /// Removes participants that have not been heard of within `timeout`.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<ParticipantId> {
        let expired = self
            .entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.last_seen) >= timeout)
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();
        for id in &expired {
            info!(participant = %id, "No events within the liveness timeout, treating participant as departed");
            self.entries.remove(id);
        }
        expired
    }

    fn remember(&mut self, id: EventId) {
        if self.seen.len() >= self.replay_window {
            if let Some(evicted) = self.seen.pop_front() {
                self.seen_index.remove(&evicted);
            }
        }
        self.seen.push_back(id);
        self.seen_index.insert(id);
    }

    fn insert(&mut self, event: &SyncEvent, init: &ParticipantInit, now: Instant) -> Outcome {
        let stamp = Stamp::of(event);
        let participant = Participant::from_init(
            event.participant_id.clone(),
            init,
            event.timestamp,
            event.origin_role,
            event.source,
        );
        let stamps = Field::iter().map(|field| (field, stamp)).collect();
        self.entries.insert(
            event.participant_id.clone(),
            Entry {
                participant,
                stamps,
                joined_at: event.timestamp,
                last_seen: now,
                pending: VecDeque::new(),
            },
        );
        info!(participant = %event.participant_id, name = %init.display_name, role = %init.role, "Participant joined");
        Outcome::Joined
    }

    fn leave(&mut self, event: &SyncEvent, now: Instant) -> Outcome {
        let Some(entry) = self.entries.get_mut(&event.participant_id) else {
            return Outcome::Discarded(DiscardReason::UnknownParticipant);
        };
        if event.timestamp < entry.joined_at {
            entry.touch(now);
            return Outcome::Discarded(DiscardReason::Stale);
        }
        self.entries.remove(&event.participant_id);
        info!(participant = %event.participant_id, "Participant left");
        Outcome::Left
    }

    fn merge(&mut self, event: &SyncEvent, patch: &ParticipantPatch, now: Instant) -> Outcome {
        let skew = self.skew;
        let max_pending = self.replay_window;
        let Some(entry) = self.entries.get_mut(&event.participant_id) else {
            return Outcome::Discarded(DiscardReason::UnknownParticipant);
        };
        entry.touch(now);

        if patch.is_empty() {
            return Outcome::Discarded(DiscardReason::EmptyPatch);
        }

        let incoming = Stamp::of(event);
        let mut remaining = patch.fields();
        let mut corrected = Vec::new();
        let mut confirmed = false;

        // A relay event for a pending optimistic change settles it: the relay
        // value wins on every field the optimistic write still holds.
        if event.source == EventSource::RemoteRelay {
            if let Some(change_id) = &event.change_id {
                let position = entry.pending.iter().position(|p| &p.change_id == change_id);
                if let Some(pending) = position.and_then(|index| entry.pending.remove(index)) {
                    let settle_stamp = Stamp {
                        at: incoming.at.max(pending.stamp.at),
                        ..incoming
                    };
                    for field in pending.patch.fields() {
                        if !remaining.contains(&field) || entry.stamps.get(&field) != Some(&pending.stamp) {
                            continue;
                        }
                        remaining.retain(|f| *f != field);
                        confirmed = true;
                        let single = patch.restricted_to(&[field]);
                        if single.differing_fields(&entry.participant).is_empty() {
                            entry.stamps.insert(field, settle_stamp);
                        } else {
                            single.apply_to(&mut entry.participant);
                            corrected.push(field);
                            entry.record_write(field, settle_stamp);
                        }
                    }
                }
            }
        }

        let mut accepted = Vec::new();
        let mut rejection = None;
        if !remaining.is_empty() {
            match judge(&entry.stamps, &remaining, &incoming, skew) {
                Ok(()) => accepted = remaining,
                Err(reason) => rejection = Some(reason),
            }
        }

        if !accepted.is_empty() {
            patch.restricted_to(&accepted).apply_to(&mut entry.participant);
            for field in &accepted {
                entry.record_write(*field, incoming);
            }

            if event.source == EventSource::LocalOptimistic {
                if let Some(change_id) = &event.change_id {
                    if entry.pending.len() >= max_pending {
                        entry.pending.pop_front();
                    }
                    entry.pending.push_back(PendingChange {
                        change_id: change_id.clone(),
                        patch: patch.restricted_to(&accepted),
                        stamp: incoming,
                    });
                }
            }
        }

        if !corrected.is_empty() {
            info!(participant = %event.participant_id, fields = ?corrected, "Relay corrected an optimistic change");
            corrected.extend(accepted);
            Outcome::Corrected(corrected)
        } else if !accepted.is_empty() {
            Outcome::Updated(accepted)
        } else if confirmed {
            Outcome::Confirmed
        } else {
            Outcome::Discarded(rejection.unwrap_or(DiscardReason::Stale))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::ConnectionQuality;
    use pretty_assertions::assert_eq;

    const SKEW: Duration = Duration::from_millis(500);

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn at_ms(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    fn registry() -> ParticipantRegistry {
        ParticipantRegistry::new(256, SKEW)
    }

    fn join(registry: &mut ParticipantRegistry, id: &str, role: Role, t: DateTime<Utc>) {
        let outcome = registry.apply(
            SyncEvent::join(id, ParticipantInit::new(id.to_uppercase(), role), t),
            Instant::now(),
        );
        assert_eq!(outcome, Outcome::Joined);
    }

    fn patch(id: &str, patch: ParticipantPatch, source: EventSource, t: DateTime<Utc>) -> SyncEvent {
        SyncEvent::patch(id, patch, source, t)
    }

    #[test]
    fn join_creates_a_record_and_patches_replace_fields() {
        let mut registry = registry();
        join(&mut registry, "a", Role::Host, at(0));

        let outcome = registry.apply(
            patch("a", ParticipantPatch::video(true), EventSource::RemoteRelay, at(1)),
            Instant::now(),
        );
        assert_eq!(outcome, Outcome::Updated(vec![Field::VideoEnabled]));

        let a = registry.get(&"a".into()).unwrap();
        assert!(a.video_enabled);
        assert_eq!(a.role, Role::Host);
        assert_eq!(a.last_updated_at, at(1));
        assert_eq!(a.last_updated_source, EventSource::RemoteRelay);
    }

    #[test]
    fn stale_remote_event_is_discarded_after_newer_local_change() {
        let mut registry = registry();
        join(&mut registry, "b", Role::Member, at(0));

        registry.apply(
            patch("b", ParticipantPatch::video(true), EventSource::LocalOptimistic, at(10)),
            Instant::now(),
        );
        let outcome = registry.apply(
            patch("b", ParticipantPatch::video(false), EventSource::RemoteRelay, at(9)),
            Instant::now(),
        );

        assert_eq!(outcome, Outcome::Discarded(DiscardReason::Stale));
        let b = registry.get(&"b".into()).unwrap();
        assert!(b.video_enabled);
        assert_eq!(b.last_updated_at, at(10));
    }

    #[test]
    fn stale_event_never_changes_state() {
        let mut registry = registry();
        join(&mut registry, "b", Role::Member, at(0));
        registry.apply(
            patch("b", ParticipantPatch::audio(true), EventSource::RemoteRelay, at(20)),
            Instant::now(),
        );
        let before = registry.snapshot();

        for source in [EventSource::LocalOptimistic, EventSource::RemoteRelay] {
            let outcome = registry.apply(
                patch("b", ParticipantPatch::audio(false), source, at(5)),
                Instant::now(),
            );
            assert_eq!(outcome, Outcome::Discarded(DiscardReason::Stale));
        }
        assert_eq!(registry.snapshot(), before);
    }

    #[test]
    fn host_override_wins_over_local_regardless_of_arrival_order() {
        let local = |t| patch("b", ParticipantPatch::video(true), EventSource::LocalOptimistic, t);
        let host = |t| patch("b", ParticipantPatch::video(false), EventSource::HostOverride, t);

        // Host stamped earlier than the local patch but arriving after it.
        let mut registry = registry();
        join(&mut registry, "b", Role::Member, at(0));
        registry.apply(local(at_ms(10_000)), Instant::now());
        let outcome = registry.apply(host(at_ms(9_800)), Instant::now());
        assert_eq!(outcome, Outcome::Updated(vec![Field::VideoEnabled]));
        assert!(!registry.get(&"b".into()).unwrap().video_enabled);

        // Same stamps, reversed arrival order.
        let mut registry = self::registry();
        join(&mut registry, "b", Role::Member, at(0));
        registry.apply(host(at_ms(9_800)), Instant::now());
        let outcome = registry.apply(local(at_ms(10_000)), Instant::now());
        assert_eq!(outcome, Outcome::Discarded(DiscardReason::HostAuthority));
        assert!(!registry.get(&"b".into()).unwrap().video_enabled);

        // Equal timestamps.
        let mut registry = self::registry();
        join(&mut registry, "b", Role::Member, at(0));
        registry.apply(local(at(10)), Instant::now());
        registry.apply(host(at(10)), Instant::now());
        assert!(!registry.get(&"b".into()).unwrap().video_enabled);
    }

    #[test]
    fn host_authority_is_limited_to_the_skew_window() {
        let mut registry = registry();
        join(&mut registry, "b", Role::Member, at(0));
        registry.apply(
            patch("b", ParticipantPatch::spotlight(true), EventSource::HostOverride, at(10)),
            Instant::now(),
        );

        // Well after the override, an ordinary later write wins again.
        let outcome = registry.apply(
            patch("b", ParticipantPatch::spotlight(false), EventSource::RemoteRelay, at(12)),
            Instant::now(),
        );
        assert_eq!(outcome, Outcome::Updated(vec![Field::Spotlighted]));

        // A stale host override outside the window is still stale.
        let outcome = registry.apply(
            patch("b", ParticipantPatch::spotlight(true), EventSource::HostOverride, at(5)),
            Instant::now(),
        );
        assert_eq!(outcome, Outcome::Discarded(DiscardReason::Stale));
    }

    #[test]
    fn exact_tie_prefers_remote_relay_over_local() {
        let mut registry = registry();
        join(&mut registry, "b", Role::Member, at(0));
        registry.apply(
            patch("b", ParticipantPatch::audio(true), EventSource::RemoteRelay, at(10)),
            Instant::now(),
        );
        let outcome = registry.apply(
            patch("b", ParticipantPatch::audio(false), EventSource::LocalOptimistic, at(10)),
            Instant::now(),
        );
        assert_eq!(outcome, Outcome::Discarded(DiscardReason::Stale));

        let mut registry = self::registry();
        join(&mut registry, "b", Role::Member, at(0));
        registry.apply(
            patch("b", ParticipantPatch::audio(false), EventSource::LocalOptimistic, at(10)),
            Instant::now(),
        );
        let outcome = registry.apply(
            patch("b", ParticipantPatch::audio(true), EventSource::RemoteRelay, at(10)),
            Instant::now(),
        );
        assert_eq!(outcome, Outcome::Updated(vec![Field::AudioEnabled]));
        assert!(registry.get(&"b".into()).unwrap().audio_enabled);
    }

    #[test]
    fn relay_confirmation_corrects_a_diverging_optimistic_change() {
        let mut registry = registry();
        join(&mut registry, "b", Role::Member, at(0));
        registry.apply(
            patch("b", ParticipantPatch::video(true), EventSource::LocalOptimistic, at(10)).with_change_id("c-1"),
            Instant::now(),
        );

        // The backend stamped the change earlier but refused it.
        let outcome = registry.apply(
            patch("b", ParticipantPatch::video(false), EventSource::RemoteRelay, at(9)).with_change_id("c-1"),
            Instant::now(),
        );
        assert_eq!(outcome, Outcome::Corrected(vec![Field::VideoEnabled]));
        let b = registry.get(&"b".into()).unwrap();
        assert!(!b.video_enabled);
        assert_eq!(b.last_updated_source, EventSource::RemoteRelay);

        // A late duplicate of the optimistic guess cannot bring it back.
        let outcome = registry.apply(
            patch("b", ParticipantPatch::video(true), EventSource::LocalOptimistic, at(10)),
            Instant::now(),
        );
        assert_eq!(outcome, Outcome::Discarded(DiscardReason::Stale));
    }

    #[test]
    fn relay_confirmation_with_equal_values_is_quiet() {
        let mut registry = registry();
        join(&mut registry, "b", Role::Member, at(0));
        registry.apply(
            patch("b", ParticipantPatch::audio(true), EventSource::LocalOptimistic, at(10)).with_change_id("c-2"),
            Instant::now(),
        );
        let outcome = registry.apply(
            patch("b", ParticipantPatch::audio(true), EventSource::RemoteRelay, at(11)).with_change_id("c-2"),
            Instant::now(),
        );
        assert_eq!(outcome, Outcome::Confirmed);
        assert!(!outcome.changed_state());
    }

    #[test]
    fn confirmation_does_not_undo_a_newer_write() {
        let mut registry = registry();
        join(&mut registry, "b", Role::Member, at(0));
        registry.apply(
            patch("b", ParticipantPatch::video(true), EventSource::LocalOptimistic, at(10)).with_change_id("c-3"),
            Instant::now(),
        );
        registry.apply(
            patch("b", ParticipantPatch::video(true), EventSource::RemoteRelay, at(20)),
            Instant::now(),
        );
        let outcome = registry.apply(
            patch("b", ParticipantPatch::video(false), EventSource::RemoteRelay, at(11)).with_change_id("c-3"),
            Instant::now(),
        );
        assert_eq!(outcome, Outcome::Discarded(DiscardReason::Stale));
        assert!(registry.get(&"b".into()).unwrap().video_enabled);
    }

    #[test]
    fn malformed_events_are_dropped() {
        let mut registry = registry();
        let outcome = registry.apply(
            patch("ghost", ParticipantPatch::video(true), EventSource::RemoteRelay, at(1)),
            Instant::now(),
        );
        assert_eq!(outcome, Outcome::Discarded(DiscardReason::UnknownParticipant));
        assert_eq!(
            registry.apply(SyncEvent::leave("ghost", at(1)), Instant::now()),
            Outcome::Discarded(DiscardReason::UnknownParticipant)
        );

        join(&mut registry, "b", Role::Member, at(0));
        let forged = patch("b", ParticipantPatch::spotlight(true), EventSource::HostOverride, at(1))
            .with_origin_role(Role::Member);
        assert_eq!(
            registry.apply(forged, Instant::now()),
            Outcome::Discarded(DiscardReason::Unauthorized)
        );
        assert_eq!(
            registry.apply(
                patch("b", ParticipantPatch::default(), EventSource::RemoteRelay, at(2)),
                Instant::now()
            ),
            Outcome::Discarded(DiscardReason::EmptyPatch)
        );
        assert!(!registry.get(&"b".into()).unwrap().is_spotlighted);
    }

    #[test]
    fn duplicate_events_inside_the_replay_window_are_ignored() {
        let mut registry = ParticipantRegistry::new(2, SKEW);
        join(&mut registry, "b", Role::Member, at(0));
        let event = patch("b", ParticipantPatch::audio(true), EventSource::RemoteRelay, at(1));

        assert!(registry.apply(event.clone(), Instant::now()).changed_state());
        assert_eq!(
            registry.apply(event.clone(), Instant::now()),
            Outcome::Discarded(DiscardReason::Duplicate)
        );

        // Two more events push it out of the window; it is then judged on its
        // timestamp again.
        registry.apply(SyncEvent::heartbeat("b", at(2)), Instant::now());
        registry.apply(SyncEvent::heartbeat("b", at(3)), Instant::now());
        assert_eq!(registry.apply(event, Instant::now()), Outcome::Updated(vec![Field::AudioEnabled]));
    }

    #[test]
    fn stale_leave_from_an_earlier_stint_is_ignored() {
        let mut registry = registry();
        join(&mut registry, "c", Role::Member, at(10));
        assert_eq!(
            registry.apply(SyncEvent::leave("c", at(5)), Instant::now()),
            Outcome::Discarded(DiscardReason::Stale)
        );
        assert_eq!(registry.apply(SyncEvent::leave("c", at(11)), Instant::now()), Outcome::Left);
        assert!(registry.is_empty());
    }

    #[test]
    fn rejoin_updates_the_join_fields() {
        let mut registry = registry();
        join(&mut registry, "c", Role::Member, at(0));
        let outcome = registry.apply(
            SyncEvent::join("c", ParticipantInit::new("Cleo", Role::Member).with_video(true), at(5)),
            Instant::now(),
        );
        assert_eq!(
            outcome,
            Outcome::Updated(vec![
                Field::DisplayName,
                Field::Role,
                Field::VideoEnabled,
                Field::AudioEnabled
            ])
        );
        let c = registry.get(&"c".into()).unwrap();
        assert_eq!(c.display_name, "Cleo");
        assert!(c.video_enabled);
        assert_eq!(c.connection_quality, ConnectionQuality::Good);
    }

    #[test]
    fn partially_stale_patch_is_discarded_as_a_whole() {
        let mut registry = registry();
        join(&mut registry, "b", Role::Member, at(0));
        registry.apply(
            patch("b", ParticipantPatch::video(true), EventSource::RemoteRelay, at(10)),
            Instant::now(),
        );
        let both = ParticipantPatch {
            video_enabled: Some(false),
            audio_enabled: Some(true),
            ..Default::default()
        };
        let before = registry.snapshot();
        let outcome = registry.apply(patch("b", both, EventSource::RemoteRelay, at(5)), Instant::now());
        assert_eq!(outcome, Outcome::Discarded(DiscardReason::Stale));
        assert_eq!(registry.snapshot(), before);
        let b = registry.get(&"b".into()).unwrap();
        assert!(b.video_enabled);
        assert!(!b.audio_enabled);
    }

    #[test]
    fn host_held_field_blocks_the_whole_member_patch() {
        let mut registry = registry();
        join(&mut registry, "b", Role::Member, at(0));
        registry.apply(
            patch("b", ParticipantPatch::spotlight(true), EventSource::HostOverride, at_ms(10_000)),
            Instant::now(),
        );
        registry.apply(
            patch("b", ParticipantPatch::audio(true), EventSource::RemoteRelay, at_ms(10_100)),
            Instant::now(),
        );

        let mixed = ParticipantPatch {
            audio_enabled: Some(false),
            is_spotlighted: Some(false),
            ..Default::default()
        };
        let outcome = registry.apply(
            patch("b", mixed.clone(), EventSource::RemoteRelay, at_ms(10_200)),
            Instant::now(),
        );
        assert_eq!(outcome, Outcome::Discarded(DiscardReason::HostAuthority));
        let b = registry.get(&"b".into()).unwrap();
        assert!(b.audio_enabled);
        assert!(b.is_spotlighted);

        // Once the override is outside the window the same fields can move together.
        let outcome = registry.apply(patch("b", mixed, EventSource::RemoteRelay, at(12)), Instant::now());
        assert_eq!(
            outcome,
            Outcome::Updated(vec![Field::AudioEnabled, Field::Spotlighted])
        );
    }

    #[test]
    fn fresh_multi_field_patch_is_applied_whole() {
        let mut registry = registry();
        join(&mut registry, "b", Role::Member, at(0));
        registry.apply(
            patch("b", ParticipantPatch::video(true), EventSource::RemoteRelay, at(10)),
            Instant::now(),
        );
        let both = ParticipantPatch {
            video_enabled: Some(false),
            audio_enabled: Some(true),
            ..Default::default()
        };
        let outcome = registry.apply(patch("b", both, EventSource::RemoteRelay, at(11)), Instant::now());
        assert_eq!(outcome, Outcome::Updated(vec![Field::VideoEnabled, Field::AudioEnabled]));
        let b = registry.get(&"b".into()).unwrap();
        assert!(!b.video_enabled);
        assert!(b.audio_enabled);
        assert_eq!(b.last_updated_at, at(11));
    }

    #[test]
    fn expire_removes_silent_participants() {
        let mut registry = registry();
        let start = Instant::now();
        registry.apply(SyncEvent::join("a", ParticipantInit::new("A", Role::Host), at(0)), start);
        registry.apply(SyncEvent::join("b", ParticipantInit::new("B", Role::Member), at(0)), start);
        registry.apply(SyncEvent::heartbeat("a", at(20)), start + Duration::from_secs(20));

        let expired = registry.expire(start + Duration::from_secs(30), Duration::from_secs(30));
        assert_eq!(expired, vec![ParticipantId::from("b")]);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&"a".into()).is_some());
    }

    #[test]
    fn interleavings_preserving_per_participant_order_converge() {
        let b_events = vec![
            patch("b", ParticipantPatch::video(true), EventSource::LocalOptimistic, at(10)),
            patch("b", ParticipantPatch::video(false), EventSource::RemoteRelay, at(9)),
            patch("b", ParticipantPatch::spotlight(true), EventSource::HostOverride, at(11)),
            patch("b", ParticipantPatch::spotlight(false), EventSource::LocalOptimistic, at(11)),
        ];
        let c_events = vec![
            patch("c", ParticipantPatch::audio(true), EventSource::RemoteRelay, at(3)),
            patch("c", ParticipantPatch::audio(false), EventSource::LocalOptimistic, at(3)),
            SyncEvent::heartbeat("c", at(4)),
            patch("c", ParticipantPatch::video(true), EventSource::RemoteRelay, at(8)),
        ];

        let mut results = Vec::new();
        // Every way of merging the two sequences while keeping each in order.
        for mask in 0u32..(1 << 8) {
            if mask.count_ones() != 4 {
                continue;
            }
            let mut registry = registry();
            join(&mut registry, "b", Role::Member, at(0));
            join(&mut registry, "c", Role::Member, at(0));
            let (mut bi, mut ci) = (0, 0);
            for slot in 0..8 {
                let event = if mask & (1 << slot) != 0 {
                    bi += 1;
                    b_events[bi - 1].clone()
                } else {
                    ci += 1;
                    c_events[ci - 1].clone()
                };
                registry.apply(event, Instant::now());
            }
            results.push(
                registry
                    .snapshot()
                    .into_iter()
                    .map(|p| (p.id, p.video_enabled, p.audio_enabled, p.is_spotlighted, p.last_updated_at))
                    .collect::<Vec<_>>(),
            );
        }

        assert_eq!(results.len(), 70);
        assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
        let b = &results[0][0];
        assert_eq!((b.1, b.3), (true, true));
        let c = &results[0][1];
        assert_eq!((c.1, c.2), (true, true));
    }

    #[test]
    fn resolve_rules() {
        let stamp = |secs, source| Stamp {
            at: at(secs),
            source,
            role: Role::Member,
        };
        let skew = chrono::Duration::milliseconds(500);
        use EventSource::*;

        assert_eq!(resolve(&stamp(10, RemoteRelay), &stamp(9, RemoteRelay), skew), Err(DiscardReason::Stale));
        assert_eq!(resolve(&stamp(10, RemoteRelay), &stamp(11, LocalOptimistic), skew), Ok(()));
        assert_eq!(resolve(&stamp(10, LocalOptimistic), &stamp(10, RemoteRelay), skew), Ok(()));
        assert_eq!(resolve(&stamp(10, RemoteRelay), &stamp(10, RemoteRelay), skew), Ok(()));
        assert_eq!(resolve(&stamp(10, LocalOptimistic), &stamp(10, HostOverride), skew), Ok(()));
        assert_eq!(
            resolve(&stamp(10, HostOverride), &stamp(10, RemoteRelay), skew),
            Err(DiscardReason::HostAuthority)
        );
        assert_eq!(resolve(&stamp(10, HostOverride), &stamp(11, RemoteRelay), skew), Ok(()));
    }
}
