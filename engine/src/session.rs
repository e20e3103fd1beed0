use crate::{
    network::{
        NetworkQualityMonitor,
        TransportStats,
    },
    participant::{
        ConnectionQuality,
        ParticipantId,
        ParticipantPatch,
    },
    quality::{
        ControlLoop,
        QualityCatalog,
        QualityController,
        QualityPolicy,
    },
    stream::{
        StreamEvent,
        StreamManager,
        StreamSettings,
    },
    sync::{
        EventSource,
        Snapshot,
        SyncEngine,
        SyncEvent,
    },
    transport::MediaTransport,
};
use chrono::Utc;
use eyre::{
    Context as _,
    Result,
};
use huddle_config::EngineConfig;
use std::{
    collections::BTreeSet,
    sync::Arc,
};
use tokio::sync::{
    broadcast,
    watch,
};
use tokio_util::sync::{
    CancellationToken,
    DropGuard,
};

/// One running session: the sync engine, the stream manager, the network
/// monitor and the control loop, plus a reactor task that keeps the set of
/// streams in line with the participants that have video on.
///
/// Dropping the session stops every task it spawned.
#[derive(Debug)]
pub struct Session {
    config: EngineConfig,
    local: Option<ParticipantId>,
    sync: SyncEngine,
    streams: StreamManager,
    monitor: NetworkQualityMonitor,
    control: ControlLoop,
    _session_task_guard: DropGuard,
}

impl Session {
    pub fn start(
        config: EngineConfig,
        transport: Arc<dyn MediaTransport>,
        local: Option<ParticipantId>,
    ) -> Result<Self> {
        config.validate().context("invalid engine configuration")?;
        let catalog = QualityCatalog::from_config(&config)?;
        let policy = QualityPolicy::new(catalog.clone(), config.safety_margin);

        let sync = SyncEngine::spawn(&config);
        let monitor = NetworkQualityMonitor::new(&config);
        let streams = StreamManager::new(transport, StreamSettings::from_config(&config), catalog);
        let control = ControlLoop::spawn(
            QualityController::new(policy.clone()),
            monitor.clone(),
            streams.clone(),
            config.control_cycle_interval(),
        );

        let task_cancellation_token = CancellationToken::new();
        let task_cancellation_guard = task_cancellation_token.clone().drop_guard();
        monitor.spawn_sampler(config.sample_interval(), task_cancellation_token.child_token());

        let reactor = Reactor {
            local: local.clone(),
            sync: sync.clone(),
            streams: streams.clone(),
            monitor: monitor.clone(),
            control: control.clone(),
            policy,
        };
        tokio::task::spawn(async move {
            tokio::select! {
                biased;
                _ = task_cancellation_token.cancelled() => {},
                _ = reactor.run() => {},
            };
            debug!("Session reactor stopped");
        });

        info!(local = ?local, "Session started");
        Ok(Self {
            config,
            local,
            sync,
            streams,
            monitor,
            control,
            _session_task_guard: task_cancellation_guard,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn local_participant(&self) -> Option<&ParticipantId> {
        self.local.as_ref()
    }

    pub fn submit(&self, event: SyncEvent) {
        self.sync.submit(event);
    }

    /// Waits until everything submitted so far is reflected in the snapshot.
    pub async fn flush(&self) {
        self.sync.flush().await;
    }

    pub fn snapshot(&self) -> Snapshot {
        self.sync.current_snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.sync.subscribe()
    }

    pub fn stream_events(&self) -> broadcast::Receiver<StreamEvent> {
        self.streams.subscribe()
    }

    pub fn ingest_stats(&self, stats: TransportStats) {
        self.monitor.ingest(stats);
    }

    pub fn sync(&self) -> &SyncEngine {
        &self.sync
    }

    pub fn streams(&self) -> &StreamManager {
        &self.streams
    }

    pub fn monitor(&self) -> &NetworkQualityMonitor {
        &self.monitor
    }

    pub fn control(&self) -> &ControlLoop {
        &self.control
    }

    /// Stops every task and releases every stream. Same as dropping.
    pub fn shutdown(self) {
        info!(local = ?self.local, streams = self.streams.live_stream_count(), "Session shutting down");
    }
}

struct Reactor {
    local: Option<ParticipantId>,
    sync: SyncEngine,
    streams: StreamManager,
    monitor: NetworkQualityMonitor,
    control: ControlLoop,
    policy: QualityPolicy,
}

impl Reactor {
    async fn run(self) {
        let mut snapshots = self.sync.subscribe();
        let mut classification = self.monitor.classification();
        let initial = snapshots.borrow_and_update().clone();
        self.reconcile_streams(&initial);

        loop {
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    self.reconcile_streams(&snapshot);
                }
                changed = classification.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let quality = *classification.borrow_and_update();
                    self.report_local_quality(quality);
                }
            }
        }
    }

    /// Creates handles for participants that turned video on and removes
    /// the handles of those that turned it off or left.
    fn reconcile_streams(&self, snapshot: &Snapshot) {
        let wanted = snapshot
            .iter()
            .filter(|participant| participant.video_enabled)
            .map(|participant| participant.id.clone())
            .collect::<BTreeSet<_>>();

        let mut count_changed = false;
        for handle in self.streams.handles() {
            if !wanted.contains(&handle.participant_id) && self.streams.remove(&handle.participant_id) {
                count_changed = true;
            }
        }

        let joining = wanted
            .iter()
            .filter(|id| !self.streams.contains(id))
            .collect::<Vec<_>>();
        if !joining.is_empty() {
            let expected = self.streams.live_stream_count() + joining.len();
            let tier = match self.monitor.current_estimated_bandwidth() {
                Some(estimate) => self.policy.target_for(estimate, expected).profile,
                None => self.policy.catalog().floor(),
            };
            for id in joining {
                if self.streams.create_handle(id.clone(), tier) {
                    self.streams.request_start(id);
                    count_changed = true;
                }
            }
        }

        if count_changed {
            debug!(streams = self.streams.live_stream_count(), "Stream set changed, recomputing quality");
            self.control.recompute_now();
        }
    }

    fn report_local_quality(&self, quality: ConnectionQuality) {
        let Some(local) = &self.local else {
            return;
        };
        if !self.sync.current_snapshot().iter().any(|p| &p.id == local) {
            return;
        }
        debug!(participant = %local, %quality, "Reporting local connection quality");
        self.sync.submit(SyncEvent::patch(
            local.clone(),
            ParticipantPatch::connection_quality(quality),
            EventSource::LocalOptimistic,
            Utc::now(),
        ));
    }
}
