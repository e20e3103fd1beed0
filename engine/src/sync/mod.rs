//! Serialized reconciliation of participant updates.
//!
//! Every event goes through [`ParticipantRegistry::apply`], which compares
//! field stamps rather than arrival order, so any interleaving that keeps
//! each participant's events in order yields the same state.

mod engine;
mod event;
mod registry;

pub use engine::{
    Snapshot,
    SyncEngine,
};
pub use event::{
    ChangeId,
    EventId,
    EventSource,
    SyncEvent,
    SyncPayload,
};
pub use registry::{
    DiscardReason,
    Outcome,
    ParticipantRegistry,
};
