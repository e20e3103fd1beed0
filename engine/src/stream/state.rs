use serde::{
    Deserialize,
    Serialize,
};

#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StreamState {
    #[default]
    Idle,
    Starting,
    Active,
    Degraded,
    Retrying,
    Failed,
    Stopped,
}

/// Inputs driving [`StreamState::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum StreamInput {
    Start,
    Acquired,
    /// A recoverable failure.
    Failure,
    /// A failure that must not be retried.
    Fatal,
    Degrade,
    Recover,
    RetryDue,
    Exhausted,
    Stop,
    Reset,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{input} is not allowed while {state}")]
pub struct TransitionError {
    pub state: StreamState,
    pub input: StreamInput,
}

impl StreamState {
    pub fn on(self, input: StreamInput) -> Result<Self, TransitionError> {
        use StreamInput as I;
        use StreamState as S;

        let next = match (self, input) {
            (S::Idle | S::Stopped, I::Start) => S::Starting,
            (S::Starting, I::Acquired) => S::Active,
            (S::Starting | S::Active | S::Degraded, I::Failure) => S::Retrying,
            (S::Starting | S::Active | S::Degraded | S::Retrying, I::Fatal) => S::Failed,
            (S::Active, I::Degrade) => S::Degraded,
            (S::Degraded, I::Recover) => S::Active,
            (S::Retrying, I::RetryDue) => S::Starting,
            (S::Retrying, I::Exhausted) => S::Failed,
            (S::Starting | S::Active | S::Degraded | S::Retrying, I::Stop) => S::Stopped,
            (S::Failed | S::Stopped, I::Reset) => S::Idle,
            (state, input) => return Err(TransitionError { state, input }),
        };
        Ok(next)
    }

    /// Whether a transport stream is held in this state.
    pub fn is_streaming(&self) -> bool {
        matches!(self, StreamState::Active | StreamState::Degraded)
    }

    /// Counted by the quality controller when splitting bandwidth.
    pub fn is_live(&self) -> bool {
        !matches!(self, StreamState::Failed | StreamState::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use strum::IntoEnumIterator as _;

    #[test]
    fn happy_path() {
        let state = StreamState::Idle
            .on(StreamInput::Start)
            .and_then(|s| s.on(StreamInput::Acquired))
            .and_then(|s| s.on(StreamInput::Degrade))
            .and_then(|s| s.on(StreamInput::Recover))
            .and_then(|s| s.on(StreamInput::Stop))
            .unwrap();
        assert_eq!(state, StreamState::Stopped);
    }

    #[test]
    fn failed_is_terminal_until_reset() {
        for input in [
            StreamInput::Start,
            StreamInput::Acquired,
            StreamInput::Failure,
            StreamInput::RetryDue,
            StreamInput::Recover,
            StreamInput::Stop,
        ] {
            assert_eq!(
                StreamState::Failed.on(input),
                Err(TransitionError {
                    state: StreamState::Failed,
                    input
                })
            );
        }
        assert_eq!(StreamState::Failed.on(StreamInput::Reset), Ok(StreamState::Idle));
    }

    #[test]
    fn idle_never_jumps_to_failed_or_retrying() {
        assert!(StreamState::Idle.on(StreamInput::Fatal).is_err());
        assert!(StreamState::Idle.on(StreamInput::Failure).is_err());
    }

    #[test]
    fn every_state_can_be_left_by_some_input() {
        for state in StreamState::iter() {
            let reachable = [
                StreamInput::Start,
                StreamInput::Stop,
                StreamInput::Reset,
                StreamInput::Acquired,
            ]
            .into_iter()
            .any(|input| state.on(input).is_ok());
            assert!(reachable, "{state} is a dead end");
        }
    }

    #[test]
    fn retrying_goes_back_to_starting_or_fails() {
        assert_eq!(StreamState::Retrying.on(StreamInput::RetryDue), Ok(StreamState::Starting));
        assert_eq!(StreamState::Retrying.on(StreamInput::Exhausted), Ok(StreamState::Failed));
        assert!(StreamState::Retrying.on(StreamInput::Degrade).is_err());
    }
}
