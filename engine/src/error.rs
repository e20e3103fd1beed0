use crate::transport::{
    ErrorKind,
    TransportError,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Classified failure of one stream, as reported to subscribers.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamError {
    #[error("Network failure, reconnecting: {0}")]
    TransportFailure(String),
    #[error("No supported codec could be negotiated: {0}")]
    CodecFailure(String),
    #[error("Camera or network permission was denied: {0}")]
    PermissionFailure(String),
    #[error("Giving up after {attempts} attempts, last failure was {last}")]
    RetriesExhausted { attempts: u32, last: ErrorKind },
    #[error("Unexpected stream failure: {0}")]
    Unknown(String),
}

impl StreamError {
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::NetworkFailure => StreamError::TransportFailure(message),
            ErrorKind::CodecUnsupported => StreamError::CodecFailure(message),
            ErrorKind::PermissionDenied => StreamError::PermissionFailure(message),
            ErrorKind::Unknown => StreamError::Unknown(message),
        }
    }

    /// Whether the user has to do something before the stream can work again.
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            StreamError::PermissionFailure(_) | StreamError::RetriesExhausted { .. }
        )
    }
}

impl From<TransportError> for StreamError {
    fn from(err: TransportError) -> Self {
        Self::from_kind(err.kind, err.message)
    }
}
