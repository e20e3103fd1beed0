//! Shared setup for the session-level tests.

#![allow(dead_code)]

use chrono::{
    DateTime,
    Utc,
};
use huddle_engine::{
    EngineConfig,
    ParticipantId,
    ParticipantInit,
    Role,
    Session,
    ScriptedTransport,
    StreamHandle,
    StreamState,
    SyncEvent,
    TransportStats,
};
use std::{
    sync::Arc,
    time::Duration,
};

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

pub fn at_ms(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
}

pub struct Harness {
    pub session: Session,
    pub transport: ScriptedTransport,
}

impl Harness {
    pub fn start() -> Self {
        Self::with_config(EngineConfig::default(), None)
    }

    pub fn with_config(config: EngineConfig, local: Option<&str>) -> Self {
        let transport = ScriptedTransport::new();
        let session = Session::start(config, Arc::new(transport.clone()), local.map(ParticipantId::from)).unwrap();
        Self { session, transport }
    }

    /// Lets the sync engine and the session tasks catch up.
    pub async fn settle(&self) {
        self.session.flush().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    pub fn join(&self, id: &str, role: Role, video: bool, t: DateTime<Utc>) {
        self.session.submit(SyncEvent::join(
            id,
            ParticipantInit::new(id.to_uppercase(), role).with_video(video).with_audio(true),
            t,
        ));
    }

    /// Records one sample at `kbps` right away.
    pub fn set_bandwidth(&self, kbps: u32) {
        self.session.ingest_stats(TransportStats {
            available_bandwidth_kbps: kbps,
            round_trip_ms: 40,
            loss_ratio: 0.0,
        });
        self.session.monitor().sample();
    }

    pub fn handle(&self, id: &str) -> Option<StreamHandle> {
        self.session.streams().handle(&ParticipantId::from(id))
    }

    pub fn tier(&self, id: &str) -> Option<u8> {
        self.handle(id).map(|handle| handle.current_tier.tier_rank)
    }

    pub async fn wait_for_state(&self, id: &str, state: StreamState) -> StreamHandle {
        let mut receiver = self.session.streams().watch(&ParticipantId::from(id)).unwrap();
        let handle = tokio::time::timeout(Duration::from_secs(600), receiver.wait_for(|h| h.state == state))
            .await
            .unwrap()
            .unwrap()
            .clone();
        handle
    }
}
