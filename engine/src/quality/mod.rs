//! Adaptive tier selection for the session's video streams.

mod catalog;
mod control_loop;
mod controller;
mod policy;

pub use catalog::QualityCatalog;
pub use control_loop::ControlLoop;
pub use controller::{
    CycleKind,
    QualityCommand,
    QualityController,
    StreamView,
};
pub use policy::{
    QualityPolicy,
    QualityTarget,
};
