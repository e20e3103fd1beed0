use backoff::{
    backoff::Backoff as _,
    ExponentialBackoff,
    ExponentialBackoffBuilder,
};
use huddle_config::{
    Codec,
    EngineConfig,
};
use std::time::Duration;

/// Bounded backoff used by the recovery ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub ceiling_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay(),
            ceiling_delay: config.retry_ceiling_delay(),
        }
    }

    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }

    pub fn backoff(&self) -> RetryBackoff {
        RetryBackoff {
            policy: self.clone(),
            backoff: None,
            issued: 0,
        }
    }
}

/// Delay schedule of one stream: armed on the first failure, disarmed once
/// the stream is acquired again.
///
/// Delays double from `base_delay` and every delay from the third on is the
/// ceiling.
#[derive(Debug)]
pub struct RetryBackoff {
    policy: RetryPolicy,
    backoff: Option<ExponentialBackoff>,
    issued: u32,
}

impl RetryBackoff {
    pub fn arm(&mut self) {
        if self.backoff.is_none() {
            self.backoff = Some(
                ExponentialBackoffBuilder::new()
                    .with_initial_interval(self.policy.base_delay)
                    .with_multiplier(2.0)
                    .with_randomization_factor(0.0)
                    .with_max_interval(self.policy.ceiling_delay)
                    .with_max_elapsed_time(None)
                    .build(),
            );
            self.issued = 0;
        }
    }

    pub fn disarm(&mut self) {
        self.backoff = None;
        self.issued = 0;
    }

    pub fn is_armed(&self) -> bool {
        self.backoff.is_some()
    }

    /// Arms the schedule if needed and returns the delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.arm();
        self.issued += 1;
        let ceiling = self.policy.ceiling_delay;
        let next = self
            .backoff
            .as_mut()
            .and_then(|backoff| backoff.next_backoff())
            .unwrap_or(ceiling);
        if self.issued >= 3 {
            ceiling
        } else {
            next.min(ceiling)
        }
    }
}

/// Per-stream settings shared by every handle of a manager.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub retry: RetryPolicy,
    pub codec_preference: Vec<Codec>,
}

impl StreamSettings {
    /// An empty codec preference falls back to VP9 alone.
    pub fn from_config(config: &EngineConfig) -> Self {
        let codec_preference = if config.codec_preference.is_empty() {
            warn!("No codec preference configured, falling back to vp9");
            vec![Codec::Vp9]
        } else {
            config.codec_preference.clone()
        };
        Self {
            retry: RetryPolicy::from_config(config),
            codec_preference,
        }
    }

    pub fn preferred_codec(&self) -> Codec {
        self.codec_preference.first().copied().unwrap_or(Codec::Vp9)
    }

    /// Codec at `index` in the preference list, clamped to the last entry.
    pub fn codec_at(&self, index: usize) -> Codec {
        self.codec_preference
            .get(index)
            .or_else(|| self.codec_preference.last())
            .copied()
            .unwrap_or(Codec::Vp9)
    }
}
