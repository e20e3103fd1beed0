use super::{
    event::SyncEvent,
    registry::ParticipantRegistry,
};
use crate::participant::Participant;
use derive_more::Display;
use huddle_config::EngineConfig;
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{
        mpsc::{
            unbounded_channel,
            UnboundedReceiver,
            UnboundedSender,
        },
        oneshot,
        watch,
    },
    time::{
        Instant,
        MissedTickBehavior,
    },
};
use tokio_util::sync::{
    CancellationToken,
    DropGuard,
};

/// Immutable, id-ordered view of every participant in the session.
pub type Snapshot = Arc<[Participant]>;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Display)]
enum EngineMessage {
    #[display("Event({})", _0.participant_id)]
    Event(SyncEvent),
    #[display("Flush")]
    Flush(oneshot::Sender<()>),
}

/// Single writer of canonical participant state.
///
/// Producers call [`SyncEngine::submit`] from any task; a spawned worker
/// applies the events one at a time and publishes a fresh [`Snapshot`] after
/// every batch that changed something. Dropping the last clone stops the
/// worker.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    sender: UnboundedSender<EngineMessage>,
    snapshot: watch::Receiver<Snapshot>,
    _engine_task_guard: Arc<DropGuard>,
}

impl SyncEngine {
    pub fn spawn(config: &EngineConfig) -> Self {
        let registry = ParticipantRegistry::new(config.replay_window, config.clock_skew_tolerance());
        Self::spawn_with_registry(registry, config.liveness_timeout())
    }

    pub fn spawn_with_registry(registry: ParticipantRegistry, liveness_timeout: Duration) -> Self {
        let (sender, receiver) = unbounded_channel::<EngineMessage>();
        let (snapshot_sender, snapshot_receiver) = watch::channel::<Snapshot>(registry.snapshot().into());
        let task_cancellation_token = CancellationToken::new();
        let task_cancellation_guard = task_cancellation_token.clone().drop_guard();

        tokio::task::spawn(async move {
            tokio::select! {
                biased;
                _ = task_cancellation_token.cancelled() => {},
                _ = run(registry, receiver, snapshot_sender, liveness_timeout) => {},
            };
            debug!("Sync engine task stopped");
        });

        Self {
            sender,
            snapshot: snapshot_receiver,
            _engine_task_guard: Arc::new(task_cancellation_guard),
        }
    }

    /// Enqueues an event. Never blocks and never fails the caller.
    pub fn submit(&self, event: SyncEvent) {
        let participant = event.participant_id.clone();
        if self.sender.send(EngineMessage::Event(event)).is_err() {
            error!(%participant, "Sync engine is gone, dropping event");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    pub fn current_snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Resolves once every event submitted before this call has been applied
    /// and its snapshot published.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(EngineMessage::Flush(ack)).is_err() {
            error!("Sync engine is gone, cannot flush");
            return;
        }
        let _ = done.await;
    }
}

fn sweep_interval(liveness_timeout: Duration) -> Duration {
    (liveness_timeout / 4).max(MIN_SWEEP_INTERVAL)
}

async fn run(
    mut registry: ParticipantRegistry,
    mut receiver: UnboundedReceiver<EngineMessage>,
    snapshot: watch::Sender<Snapshot>,
    liveness_timeout: Duration,
) {
    let period = sweep_interval(liveness_timeout);
    let mut sweep = tokio::time::interval_at(Instant::now() + period, period);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            message = receiver.recv() => {
                let Some(message) = message else {
                    break;
                };

                let mut changed = false;
                let mut flushes = Vec::new();
                let mut next = Some(message);
                while let Some(message) = next {
                    trace!(%message, "Sync engine message");
                    match message {
                        EngineMessage::Event(event) => {
                            changed |= registry.apply(event, Instant::now()).changed_state();
                        }
                        EngineMessage::Flush(ack) => flushes.push(ack),
                    }
                    next = receiver.try_recv().ok();
                }

                if changed {
                    publish(&registry, &snapshot);
                }
                for ack in flushes {
                    let _ = ack.send(());
                }
            }

            _ = sweep.tick() => {
                if !registry.expire(Instant::now(), liveness_timeout).is_empty() {
                    publish(&registry, &snapshot);
                }
            }
        }
    }
}

fn publish(registry: &ParticipantRegistry, snapshot: &watch::Sender<Snapshot>) {
    let participants: Snapshot = registry.snapshot().into();
    trace!(count = participants.len(), "Publishing participant snapshot");
    snapshot.send_replace(participants);
}
