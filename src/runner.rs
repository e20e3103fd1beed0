use crate::{
    report::Report,
    scenario::{
        Action,
        Scenario,
    },
};
use chrono::{
    DateTime,
    TimeDelta,
    Utc,
};
use color_eyre::Result;
use huddle_config::EngineConfig;
use huddle_engine::{
    ParticipantInit,
    ScriptedTransport,
    Session,
    StreamEvent,
    SyncEvent,
    TransportStats,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::broadcast::{
        self,
        error::TryRecvError,
    },
    time::{
        sleep,
        sleep_until,
        Instant,
    },
};

/// Replays `scenario` against a fresh session backed by a scripted
/// transport and reports where everything ended up.
pub async fn run(config: EngineConfig, scenario: Scenario) -> Result<Report> {
    let transport = ScriptedTransport::new();
    let session = Session::start(config, Arc::new(transport.clone()), scenario.local.clone())?;
    let mut stream_events = session.stream_events();
    let mut collected = Vec::new();

    let steps = scenario.ordered_steps();
    let epoch = Utc::now();
    let start = Instant::now();
    info!(name = ?scenario.name, steps = steps.len(), "Replaying scenario");

    for (index, step) in steps.into_iter().enumerate() {
        sleep_until(start + Duration::from_millis(step.at_ms)).await;
        let offset = step.timestamp_ms.unwrap_or(step.at_ms as i64);
        let timestamp = epoch + TimeDelta::milliseconds(offset);
        debug!(index, at_ms = step.at_ms, action = ?step.action, "Applying step");
        apply(&session, &transport, step.action, timestamp);
        drain(&mut stream_events, &mut collected);
    }

    session.flush().await;
    sleep(Duration::from_millis(scenario.settle_ms)).await;
    session.flush().await;
    drain(&mut stream_events, &mut collected);

    let acquisitions = transport.acquisitions();
    let report = Report {
        name: scenario.name,
        estimated_bandwidth_kbps: session.monitor().current_estimated_bandwidth(),
        participants: session.snapshot().to_vec(),
        streams: session.streams().handles(),
        acquisitions: acquisitions.len(),
        failed_acquisitions: acquisitions.iter().filter(|a| !a.succeeded).count(),
        stream_events: collected,
    };
    info!(
        participants = report.participants.len(),
        streams = report.streams.len(),
        "Scenario finished"
    );
    session.shutdown();
    Ok(report)
}

fn apply(session: &Session, transport: &ScriptedTransport, action: Action, timestamp: DateTime<Utc>) {
    match action {
        Action::Join {
            participant,
            display_name,
            role,
            video,
            audio,
        } => {
            let name = display_name.unwrap_or_else(|| participant.to_string());
            let init = ParticipantInit::new(name, role).with_video(video).with_audio(audio);
            session.submit(SyncEvent::join(participant, init, timestamp));
        }
        Action::Leave { participant } => session.submit(SyncEvent::leave(participant, timestamp)),
        Action::Heartbeat { participant } => session.submit(SyncEvent::heartbeat(participant, timestamp)),
        Action::Patch {
            participant,
            source,
            change_id,
            patch,
        } => {
            let mut event = SyncEvent::patch(participant, patch, source, timestamp);
            if let Some(change_id) = change_id {
                event = event.with_change_id(change_id);
            }
            session.submit(event);
        }
        Action::Bandwidth {
            kbps,
            round_trip_ms,
            loss_ratio,
        } => {
            session.ingest_stats(TransportStats {
                available_bandwidth_kbps: kbps,
                round_trip_ms,
                loss_ratio,
            });
            session.monitor().sample();
        }
        Action::FailAcquire {
            participant,
            kind,
            count,
        } => transport.fail_acquires(participant, kind, count),
        Action::ReportFailure { participant, kind } => {
            if !session.streams().report_failure(&participant, kind) {
                warn!(%participant, "No stream to report a failure on");
            }
        }
        Action::ResetStream { participant } => {
            if !session.streams().reset(&participant) {
                warn!(%participant, "No stream to reset");
            }
        }
    }
}

fn drain(receiver: &mut broadcast::Receiver<StreamEvent>, into: &mut Vec<StreamEvent>) {
    loop {
        match receiver.try_recv() {
            Ok(event) => into.push(event),
            Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "Stream event log fell behind"),
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}
