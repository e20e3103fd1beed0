#[macro_use]
extern crate tracing;

pub mod args;
mod logging;
pub mod report;
pub mod runner;
pub mod scenario;

pub use args::Args;
pub use logging::{
    init_errors,
    init_logging,
};
pub use report::Report;
pub use runner::run;
pub use scenario::{
    parse_scenario,
    Action,
    Scenario,
    Step,
};
