//! # Huddle session core
//!
//! Keeps every client's view of a multi-party video session consistent and
//! keeps each video stream's quality matched to the network.
//!
//! - **`sync`**: serialized reconciliation of participant updates coming from
//!   local optimistic actions, the backend relay and host overrides.
//! - **`stream`**: per-participant stream lifecycle with a bounded recovery
//!   ladder.
//! - **`network`**: rolling window of transport statistics, median bandwidth
//!   estimate and connection classification.
//! - **`quality`**: periodic tier selection with hysteresis.
//! - **`session`**: wires the pieces together for one session.

#[macro_use]
extern crate tracing;

pub mod error;
pub mod network;
pub mod participant;
pub mod quality;
pub mod session;
pub mod stream;
pub mod sync;
pub mod transport;

pub use error::StreamError;
pub use huddle_config::{
    Codec,
    EngineConfig,
    QualityProfile,
    Resolution,
};
pub use network::{
    NetworkQualityMonitor,
    NetworkSample,
    TransportStats,
};
pub use participant::{
    ConnectionQuality,
    Participant,
    ParticipantId,
    ParticipantInit,
    ParticipantPatch,
    Role,
};
pub use quality::{
    QualityCatalog,
    QualityController,
    QualityTarget,
};
pub use session::Session;
pub use stream::{
    StreamEvent,
    StreamEventKind,
    StreamHandle,
    StreamManager,
    StreamState,
};
pub use sync::{
    EventSource,
    Snapshot,
    SyncEngine,
    SyncEvent,
    SyncPayload,
};
pub use transport::{
    ErrorKind,
    MediaTransport,
    ScriptedTransport,
    StreamRef,
    TransportError,
};
