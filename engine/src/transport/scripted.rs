use super::{
    ErrorKind,
    MediaTransport,
    StreamRef,
    TransportError,
};
use crate::participant::ParticipantId;
use async_trait::async_trait;
use huddle_config::{
    Codec,
    QualityProfile,
};
use std::{
    collections::{
        HashMap,
        HashSet,
        VecDeque,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    time::Duration,
};

/// One recorded `acquire_stream` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    pub participant: ParticipantId,
    pub tier_rank: u8,
    pub codec: Codec,
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct Script {
    next_stream_id: u64,
    acquire_delay: Duration,
    acquire_failures: HashMap<ParticipantId, VecDeque<ErrorKind>>,
    constraint_failures: HashMap<ParticipantId, VecDeque<ErrorKind>>,
    unsupported_codecs: HashSet<Codec>,
    acquisitions: Vec<Acquisition>,
    releases: Vec<ParticipantId>,
    applied: HashMap<ParticipantId, Vec<u8>>,
}

/// In-process transport whose results are queued up front.
///
/// Acquisitions succeed unless a failure was queued for the participant or
/// the requested codec was marked unsupported. Every call is recorded.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fail_next_acquire(&self, participant: impl Into<ParticipantId>, kind: ErrorKind) {
        self.fail_acquires(participant, kind, 1);
    }

    pub fn fail_acquires(&self, participant: impl Into<ParticipantId>, kind: ErrorKind, count: usize) {
        self.lock()
            .acquire_failures
            .entry(participant.into())
            .or_default()
            .extend(std::iter::repeat(kind).take(count));
    }

    pub fn fail_next_constraint(&self, participant: impl Into<ParticipantId>, kind: ErrorKind) {
        self.lock()
            .constraint_failures
            .entry(participant.into())
            .or_default()
            .push_back(kind);
    }

    pub fn unsupport_codec(&self, codec: Codec) {
        self.lock().unsupported_codecs.insert(codec);
    }

    /// Every acquisition takes this long before resolving.
    pub fn set_acquire_delay(&self, delay: Duration) {
        self.lock().acquire_delay = delay;
    }

    pub fn acquisitions(&self) -> Vec<Acquisition> {
        self.lock().acquisitions.clone()
    }

    pub fn acquisitions_for(&self, participant: &ParticipantId) -> Vec<Acquisition> {
        self.lock()
            .acquisitions
            .iter()
            .filter(|a| &a.participant == participant)
            .cloned()
            .collect()
    }

    pub fn releases(&self) -> Vec<ParticipantId> {
        self.lock().releases.clone()
    }

    /// Tier ranks applied to the participant's stream, oldest first.
    pub fn applied_tiers(&self, participant: &ParticipantId) -> Vec<u8> {
        self.lock().applied.get(participant).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl MediaTransport for ScriptedTransport {
    async fn acquire_stream(
        &self,
        participant: &ParticipantId,
        tier: &QualityProfile,
        codec: Codec,
    ) -> Result<StreamRef, TransportError> {
        let delay = self.lock().acquire_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.lock();
        let failure = if script.unsupported_codecs.contains(&codec) {
            Some(ErrorKind::CodecUnsupported)
        } else {
            script
                .acquire_failures
                .get_mut(participant)
                .and_then(|queue| queue.pop_front())
        };
        script.acquisitions.push(Acquisition {
            participant: participant.clone(),
            tier_rank: tier.tier_rank,
            codec,
            succeeded: failure.is_none(),
        });

        if let Some(kind) = failure {
            return Err(TransportError::new(kind, format!("scripted {kind} for {participant}")));
        }

        script.next_stream_id += 1;
        script.applied.entry(participant.clone()).or_default().push(tier.tier_rank);
        Ok(StreamRef {
            participant_id: participant.clone(),
            stream_id: script.next_stream_id,
            codec,
        })
    }

    async fn release_stream(&self, participant: &ParticipantId) {
        self.lock().releases.push(participant.clone());
    }

    async fn apply_tier_constraints(&self, stream: &StreamRef, tier: &QualityProfile) -> Result<(), TransportError> {
        let mut script = self.lock();
        if let Some(kind) = script
            .constraint_failures
            .get_mut(&stream.participant_id)
            .and_then(|queue| queue.pop_front())
        {
            return Err(TransportError::new(
                kind,
                format!("scripted {kind} while applying {tier}"),
            ));
        }
        script
            .applied
            .entry(stream.participant_id.clone())
            .or_default()
            .push(tier.tier_rank);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_config::EngineConfig;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn queued_failures_are_consumed_in_order() {
        let transport = ScriptedTransport::new();
        let tier = EngineConfig::default().quality_catalog[2];
        let b = ParticipantId::from("b");
        transport.fail_next_acquire("b", ErrorKind::NetworkFailure);

        let err = transport.acquire_stream(&b, &tier, Codec::Vp9).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NetworkFailure);
        let stream = transport.acquire_stream(&b, &tier, Codec::Vp9).await.unwrap();
        assert_eq!(stream.codec, Codec::Vp9);

        transport.unsupport_codec(Codec::Vp8);
        let err = transport.acquire_stream(&b, &tier, Codec::Vp8).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::CodecUnsupported);

        assert_eq!(
            transport.acquisitions_for(&b).iter().map(|a| a.succeeded).collect::<Vec<_>>(),
            vec![false, true, false]
        );
        assert_eq!(transport.applied_tiers(&b), vec![2]);
    }
}
