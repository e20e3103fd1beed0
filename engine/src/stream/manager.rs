use super::{
    events::StreamEvent,
    retry::StreamSettings,
    worker::{
        StreamCommand,
        StreamWorker,
    },
    StreamHandle,
};
use crate::{
    participant::ParticipantId,
    quality::{
        QualityCatalog,
        QualityTarget,
    },
    transport::{
        ErrorKind,
        MediaTransport,
    },
};
use eyre::Result;
use huddle_config::{
    EngineConfig,
    QualityProfile,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};
use tokio::sync::{
    broadcast,
    mpsc::{
        unbounded_channel,
        UnboundedSender,
    },
    watch,
};
use tokio_util::sync::{
    CancellationToken,
    DropGuard,
};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug)]
struct HandleEntry {
    commands: UnboundedSender<StreamCommand>,
    state: watch::Receiver<StreamHandle>,
    _stream_task_guard: DropGuard,
}

/// Registry of per-participant stream actors.
///
/// Every handle runs on its own task, so a slow reconnect for one
/// participant never holds up another. Removing a handle cancels its task,
/// which releases the transport stream on the way out.
#[derive(Debug, Clone)]
pub struct StreamManager {
    handles: Arc<Mutex<HashMap<ParticipantId, HandleEntry>>>,
    transport: Arc<dyn MediaTransport>,
    settings: StreamSettings,
    catalog: QualityCatalog,
    events: broadcast::Sender<StreamEvent>,
}

impl StreamManager {
    pub fn new(transport: Arc<dyn MediaTransport>, settings: StreamSettings, catalog: QualityCatalog) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            handles: Default::default(),
            transport,
            settings,
            catalog,
            events,
        }
    }

    pub fn from_config(config: &EngineConfig, transport: Arc<dyn MediaTransport>) -> Result<Self> {
        Ok(Self::new(
            transport,
            StreamSettings::from_config(config),
            QualityCatalog::from_config(config)?,
        ))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ParticipantId, HandleEntry>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn catalog(&self) -> &QualityCatalog {
        &self.catalog
    }

    /// Spawns an idle handle. Returns `false` if the participant already has one.
    pub fn create_handle(&self, participant: ParticipantId, tier: QualityProfile) -> bool {
        let mut handles = self.lock();
        if handles.contains_key(&participant) {
            return false;
        }

        let codec = self.settings.preferred_codec();
        let (state_sender, state_receiver) = watch::channel(StreamHandle::new(participant.clone(), tier, codec));
        let (sender, receiver) = unbounded_channel::<StreamCommand>();
        let task_cancellation_token = CancellationToken::new();
        let task_cancellation_guard = task_cancellation_token.clone().drop_guard();

        let worker = StreamWorker::new(
            participant.clone(),
            self.transport.clone(),
            self.settings.clone(),
            self.catalog.clone(),
            state_sender,
            self.events.clone(),
            task_cancellation_token,
        );
        tokio::task::spawn(worker.run(receiver));

        debug!(%participant, %tier, "Created stream handle");
        handles.insert(
            participant,
            HandleEntry {
                commands: sender,
                state: state_receiver,
                _stream_task_guard: task_cancellation_guard,
            },
        );
        true
    }

    fn send(&self, participant: &ParticipantId, command: StreamCommand) -> bool {
        let handles = self.lock();
        let Some(entry) = handles.get(participant) else {
            debug!(%participant, %command, "No stream handle, dropping command");
            return false;
        };
        if entry.commands.send(command.clone()).is_err() {
            error!(%participant, "Was not able to send stream command: {command}");
            return false;
        }
        true
    }

    pub fn request_start(&self, participant: &ParticipantId) -> bool {
        self.send(participant, StreamCommand::Start)
    }

    pub fn request_stop(&self, participant: &ParticipantId) -> bool {
        self.send(participant, StreamCommand::Stop)
    }

    pub fn report_failure(&self, participant: &ParticipantId, kind: ErrorKind) -> bool {
        self.send(participant, StreamCommand::Failure(kind))
    }

    /// Returns `false` when the handle is gone and nothing was dispatched.
    pub fn apply_quality_target(&self, participant: &ParticipantId, target: QualityTarget) -> bool {
        self.send(participant, StreamCommand::ApplyTarget(target))
    }

    pub fn reset(&self, participant: &ParticipantId) -> bool {
        self.send(participant, StreamCommand::Reset)
    }

    pub fn remove(&self, participant: &ParticipantId) -> bool {
        let removed = self.lock().remove(participant).is_some();
        if removed {
            debug!(%participant, "Removed stream handle");
        }
        removed
    }

    pub fn contains(&self, participant: &ParticipantId) -> bool {
        self.lock().contains_key(participant)
    }

    pub fn handle(&self, participant: &ParticipantId) -> Option<StreamHandle> {
        self.lock().get(participant).map(|entry| entry.state.borrow().clone())
    }

    /// Every handle, ordered by participant id.
    pub fn handles(&self) -> Vec<StreamHandle> {
        let mut handles = self
            .lock()
            .values()
            .map(|entry| entry.state.borrow().clone())
            .collect::<Vec<_>>();
        handles.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
        handles
    }

    pub fn watch(&self, participant: &ParticipantId) -> Option<watch::Receiver<StreamHandle>> {
        self.lock().get(participant).map(|entry| entry.state.clone())
    }

    /// Handles that still compete for bandwidth.
    pub fn live_stream_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|entry| entry.state.borrow().state.is_live())
            .count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }
}
