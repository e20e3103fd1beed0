use super::{
    NetworkSample,
    NetworkWindow,
    TransportStats,
};
use crate::participant::ConnectionQuality;
use chrono::Utc;
use huddle_config::EngineConfig;
use std::{
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    time::Duration,
};
use tokio::{
    sync::watch,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

/// Shared handle on the network window.
///
/// Cheap to clone: the transport keeps one to push statistics through
/// [`NetworkQualityMonitor::ingest`], the session samples and reads it.
#[derive(Debug, Clone)]
pub struct NetworkQualityMonitor {
    window: Arc<Mutex<NetworkWindow>>,
    classification: Arc<watch::Sender<ConnectionQuality>>,
}

impl NetworkQualityMonitor {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_window(NetworkWindow::new(config.sample_window, config.network))
    }

    pub fn with_window(window: NetworkWindow) -> Self {
        let (classification, _) = watch::channel(window.classify());
        Self {
            window: Arc::new(Mutex::new(window)),
            classification: Arc::new(classification),
        }
    }

    fn lock(&self) -> MutexGuard<'_, NetworkWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ingest(&self, stats: TransportStats) {
        trace!(?stats, "Transport statistics");
        self.lock().ingest(stats);
    }

    /// Records the latest ingested statistics as a sample.
    pub fn sample(&self) -> Option<NetworkSample> {
        let (sample, quality) = {
            let mut window = self.lock();
            let sample = window.sample(Utc::now());
            (sample, window.classify())
        };
        self.publish(quality);
        sample
    }

    /// Appends an already captured sample, bypassing the ingest step.
    pub fn push_sample(&self, sample: NetworkSample) {
        let quality = {
            let mut window = self.lock();
            window.push(sample);
            window.classify()
        };
        self.publish(quality);
    }

    pub fn classify(&self) -> ConnectionQuality {
        self.lock().classify()
    }

    pub fn current_estimated_bandwidth(&self) -> Option<u32> {
        self.lock().estimated_bandwidth()
    }

    pub fn classification(&self) -> watch::Receiver<ConnectionQuality> {
        self.classification.subscribe()
    }

    fn publish(&self, quality: ConnectionQuality) {
        self.classification.send_if_modified(|current| {
            if *current == quality {
                return false;
            }
            debug!(from = %current, to = %quality, "Connection quality changed");
            *current = quality;
            true
        });
    }

    /// Samples every `period` until `token` is cancelled.
    pub fn spawn_sampler(&self, period: Duration, token: CancellationToken) {
        let monitor = self.clone();
        tokio::task::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Some(sample) = monitor.sample() {
                            trace!(kbps = sample.available_bandwidth_kbps, "Network sample");
                        }
                    }
                }
            }
            debug!("Network sampler stopped");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stats(kbps: u32) -> TransportStats {
        TransportStats {
            available_bandwidth_kbps: kbps,
            round_trip_ms: 40,
            loss_ratio: 0.0,
        }
    }

    #[test]
    fn sampling_updates_estimate_and_classification() {
        let monitor = NetworkQualityMonitor::new(&EngineConfig::default());
        let mut classification = monitor.classification();
        assert_eq!(*classification.borrow_and_update(), ConnectionQuality::Good);

        monitor.ingest(stats(3_000));
        assert_eq!(monitor.current_estimated_bandwidth(), None);
        assert!(monitor.sample().is_some());

        assert_eq!(monitor.current_estimated_bandwidth(), Some(3_000));
        assert_eq!(monitor.classify(), ConnectionQuality::Excellent);
        assert!(classification.has_changed().unwrap());
        assert_eq!(*classification.borrow_and_update(), ConnectionQuality::Excellent);
    }

    #[tokio::test(start_paused = true)]
    async fn sampler_runs_until_cancelled() {
        let monitor = NetworkQualityMonitor::new(&EngineConfig::default());
        let token = CancellationToken::new();
        monitor.spawn_sampler(Duration::from_secs(5), token.clone());

        monitor.ingest(stats(1_200));
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(monitor.current_estimated_bandwidth(), Some(1_200));

        token.cancel();
        monitor.ingest(stats(200));
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(monitor.current_estimated_bandwidth(), Some(1_200));
    }
}
