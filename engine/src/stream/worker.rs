use super::{
    events::{
        StreamEvent,
        StreamEventKind,
    },
    retry::{
        RetryBackoff,
        StreamSettings,
    },
    state::{
        StreamInput,
        StreamState,
    },
    StreamHandle,
};
use crate::{
    error::StreamError,
    participant::ParticipantId,
    quality::{
        QualityCatalog,
        QualityTarget,
    },
    transport::{
        ErrorKind,
        MediaTransport,
        StreamRef,
    },
};
use derive_more::Display;
use huddle_config::{
    Codec,
    QualityProfile,
};
use std::sync::Arc;
use tokio::{
    sync::{
        broadcast,
        mpsc::UnboundedReceiver,
        watch,
    },
    time::Instant,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Display)]
pub(crate) enum StreamCommand {
    #[display("Start")]
    Start,
    #[display("Stop")]
    Stop,
    #[display("Failure({_0})")]
    Failure(ErrorKind),
    #[display("ApplyTarget({_0})")]
    ApplyTarget(QualityTarget),
    #[display("Reset")]
    Reset,
}

/// Owns one participant's stream. Runs until its command channel closes or
/// its token is cancelled, then releases whatever it holds.
pub(crate) struct StreamWorker {
    participant: ParticipantId,
    transport: Arc<dyn MediaTransport>,
    settings: StreamSettings,
    catalog: QualityCatalog,
    handle: watch::Sender<StreamHandle>,
    events: broadcast::Sender<StreamEvent>,
    token: CancellationToken,
    stream: Option<StreamRef>,
    codec_index: usize,
    retry_at: Option<Instant>,
    backoff: RetryBackoff,
    /// Whether the last target forced the floor tier.
    constrained: bool,
}

impl StreamWorker {
    pub(crate) fn new(
        participant: ParticipantId,
        transport: Arc<dyn MediaTransport>,
        settings: StreamSettings,
        catalog: QualityCatalog,
        handle: watch::Sender<StreamHandle>,
        events: broadcast::Sender<StreamEvent>,
        token: CancellationToken,
    ) -> Self {
        let backoff = settings.retry.backoff();
        Self {
            participant,
            transport,
            settings,
            catalog,
            handle,
            events,
            token,
            stream: None,
            codec_index: 0,
            retry_at: None,
            backoff,
            constrained: false,
        }
    }

    #[instrument(level = "debug", skip_all, fields(participant = %self.participant))]
    pub(crate) async fn run(mut self, mut commands: UnboundedReceiver<StreamCommand>) {
        loop {
            let retry_at = self.retry_at;
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,

                command = commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    trace!(%command, "Stream command");
                    self.on_command(command).await;
                }

                _ = tokio::time::sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    self.retry_at = None;
                    if self.transition(StreamInput::RetryDue) {
                        self.acquire().await;
                    }
                }
            }
        }

        self.release().await;
        debug!("Stream task stopped");
    }

    async fn on_command(&mut self, command: StreamCommand) {
        match command {
            StreamCommand::Start => {
                if self.transition(StreamInput::Start) {
                    self.codec_index = 0;
                    self.backoff.disarm();
                    self.set_retry_count(0);
                    self.acquire().await;
                }
            }
            StreamCommand::Stop => {
                if self.transition(StreamInput::Stop) {
                    self.retry_at = None;
                    self.backoff.disarm();
                    self.release().await;
                }
            }
            StreamCommand::Failure(kind) => {
                if self.state().is_live() && self.state() != StreamState::Idle {
                    self.on_failure(kind, format!("{kind} reported for the stream")).await;
                } else {
                    debug!(state = %self.state(), %kind, "Ignoring failure report");
                }
            }
            StreamCommand::ApplyTarget(target) => self.apply_target(target).await,
            StreamCommand::Reset => {
                if self.transition(StreamInput::Reset) {
                    self.codec_index = 0;
                    self.backoff.disarm();
                    let codec = self.settings.preferred_codec();
                    self.handle.send_modify(|handle| {
                        handle.retry_count = 0;
                        handle.last_error = None;
                        handle.codec = codec;
                    });
                }
            }
        }
    }

    fn state(&self) -> StreamState {
        self.handle.borrow().state
    }

    fn current_tier(&self) -> QualityProfile {
        self.handle.borrow().current_tier
    }

    fn codec(&self) -> Codec {
        self.settings.codec_at(self.codec_index)
    }

    fn emit(&self, kind: StreamEventKind) {
        let _ = self.events.send(StreamEvent::new(self.participant.clone(), kind));
    }

    fn transition(&mut self, input: StreamInput) -> bool {
        let from = self.state();
        match from.on(input) {
            Ok(to) => {
                debug!(%from, %to, %input, "Stream state changed");
                self.handle.send_modify(|handle| handle.state = to);
                self.emit(StreamEventKind::StateChanged { from, to });
                true
            }
            Err(err) => {
                warn!("Rejected stream transition: {err}");
                false
            }
        }
    }

    fn set_retry_count(&self, count: u32) {
        self.handle.send_if_modified(|handle| {
            let changed = handle.retry_count != count;
            handle.retry_count = count;
            changed
        });
    }

    fn set_tier(&mut self, tier: QualityProfile) {
        let from = self.current_tier();
        if from == tier {
            return;
        }
        debug!(%from, to = %tier, "Stream tier changed");
        self.handle.send_modify(|handle| handle.current_tier = tier);
        self.emit(StreamEventKind::TierChanged { from, to: tier });
    }

    async fn acquire(&mut self) {
        let tier = self.current_tier();
        let codec = self.codec();
        let transport = self.transport.clone();

        let result = tokio::select! {
            biased;
            _ = self.token.cancelled() => return,
            result = transport.acquire_stream(&self.participant, &tier, codec) => result,
        };

        match result {
            Ok(stream) => {
                info!(%tier, %codec, stream_id = stream.stream_id, "Stream acquired");
                self.stream = Some(stream);
                self.handle.send_modify(|handle| handle.codec = codec);
                self.set_retry_count(0);
                self.backoff.disarm();
                if self.transition(StreamInput::Acquired) && self.constrained {
                    self.transition(StreamInput::Degrade);
                }
            }
            Err(err) => self.on_failure(err.kind, err.message).await,
        }
    }

    async fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!(stream_id = stream.stream_id, "Releasing stream");
            self.transport.release_stream(&stream.participant_id).await;
        }
    }

    /// The recovery ladder.
    async fn on_failure(&mut self, kind: ErrorKind, message: String) {
        let error = StreamError::from_kind(kind, message);
        match kind {
            ErrorKind::PermissionDenied => error!(%error, "Stream failed"),
            _ => warn!(%error, "Stream failed"),
        }
        self.handle.send_modify(|handle| handle.last_error = Some(error.clone()));
        let _ = self.events.send(StreamEvent::error(self.participant.clone(), error));
        self.release().await;

        match kind {
            ErrorKind::PermissionDenied => {
                self.retry_at = None;
                self.transition(StreamInput::Fatal);
            }
            ErrorKind::CodecUnsupported if self.codec_index + 1 < self.settings.codec_preference.len() => {
                self.codec_index += 1;
                info!(codec = %self.codec(), "Renegotiating with the next codec");
                if self.state() == StreamState::Retrying || self.transition(StreamInput::Failure) {
                    self.retry_at = Some(Instant::now());
                }
            }
            ErrorKind::CodecUnsupported => {
                self.codec_index = 0;
                self.schedule_retry(kind);
            }
            ErrorKind::NetworkFailure => {
                if let Some(lower) = self.catalog.lower(&self.current_tier()) {
                    self.set_tier(lower);
                }
                self.schedule_retry(kind);
            }
            ErrorKind::Unknown => self.schedule_retry(kind),
        }
    }

    fn schedule_retry(&mut self, kind: ErrorKind) {
        if self.state() != StreamState::Retrying && !self.transition(StreamInput::Failure) {
            return;
        }

        let attempt = self.handle.borrow().retry_count + 1;
        if !self.settings.retry.allows(attempt) {
            let error = StreamError::RetriesExhausted {
                attempts: attempt - 1,
                last: kind,
            };
            error!(%error, "Giving up on the stream");
            self.retry_at = None;
            self.handle.send_modify(|handle| handle.last_error = Some(error.clone()));
            self.transition(StreamInput::Exhausted);
            let _ = self.events.send(StreamEvent::error(self.participant.clone(), error));
            return;
        }

        let delay = self.backoff.next_delay();
        self.set_retry_count(attempt);
        self.retry_at = Some(Instant::now() + delay);
        info!(attempt, ?delay, "Scheduling reconnect");
        self.emit(StreamEventKind::Reconnecting {
            attempt,
            user_visible: attempt >= 2,
        });
    }

    async fn apply_target(&mut self, target: QualityTarget) {
        self.constrained = target.constrained;
        let state = self.state();

        if target.profile != self.current_tier() {
            if let Some(stream) = self.stream.clone().filter(|_| state.is_streaming()) {
                if let Err(err) = self.transport.apply_tier_constraints(&stream, &target.profile).await {
                    self.on_failure(err.kind, err.message).await;
                    return;
                }
            }
            self.set_tier(target.profile);
        }

        match (self.state(), target.constrained) {
            (StreamState::Active, true) => {
                self.transition(StreamInput::Degrade);
            }
            (StreamState::Degraded, false) => {
                self.transition(StreamInput::Recover);
            }
            _ => {}
        }
    }
}
