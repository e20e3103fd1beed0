use super::controller::{
    CycleKind,
    QualityController,
    StreamView,
};
use crate::{
    network::NetworkQualityMonitor,
    stream::{
        StreamManager,
        StreamState,
    },
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::Notify,
    time::{
        Instant,
        MissedTickBehavior,
    },
};
use tokio_util::sync::{
    CancellationToken,
    DropGuard,
};

/// Handle on the periodic control task. Dropping every clone stops it.
#[derive(Debug, Clone)]
pub struct ControlLoop {
    recompute: Arc<Notify>,
    _control_task_guard: Arc<DropGuard>,
}

impl ControlLoop {
    pub fn spawn(
        controller: QualityController,
        monitor: NetworkQualityMonitor,
        streams: StreamManager,
        period: Duration,
    ) -> Self {
        let recompute = Arc::new(Notify::new());
        let task_cancellation_token = CancellationToken::new();
        let task_cancellation_guard = task_cancellation_token.clone().drop_guard();

        tokio::task::spawn({
            let recompute = recompute.clone();
            async move {
                let mut controller = controller;
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        biased;
                        _ = task_cancellation_token.cancelled() => break,
                        _ = recompute.notified() => {
                            run_cycle(&mut controller, &monitor, &streams, CycleKind::Recompute);
                        }
                        _ = ticker.tick() => {
                            run_cycle(&mut controller, &monitor, &streams, CycleKind::Regular);
                        }
                    }
                }
                debug!("Control loop stopped");
            }
        });

        Self {
            recompute,
            _control_task_guard: Arc::new(task_cancellation_guard),
        }
    }

    /// Runs an extra cycle as soon as possible. It may only lower tiers.
    pub fn recompute_now(&self) {
        self.recompute.notify_one();
    }
}

fn run_cycle(
    controller: &mut QualityController,
    monitor: &NetworkQualityMonitor,
    streams: &StreamManager,
    cycle: CycleKind,
) {
    let Some(estimate) = monitor.current_estimated_bandwidth() else {
        debug!(%cycle, "No bandwidth estimate yet, skipping control cycle");
        return;
    };

    let views = streams
        .handles()
        .into_iter()
        .filter(|handle| handle.state.is_live())
        .map(|handle| StreamView {
            degraded: handle.state == StreamState::Degraded,
            participant_id: handle.participant_id,
            tier: handle.current_tier,
        })
        .collect::<Vec<_>>();
    controller.retain(&views);

    for command in controller.evaluate(estimate, &views, cycle) {
        if !streams.apply_quality_target(&command.participant_id, command.target) {
            debug!(participant = %command.participant_id, "Stream went away, dropping quality command");
        }
    }
}
