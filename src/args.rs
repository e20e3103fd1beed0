use clap::Parser;
use std::path::PathBuf;

/// Replays a participant scenario against an in-process session and prints
/// the reconciled participants and their streams.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Scenario file (yaml) to replay.
    #[arg(long, short)]
    pub scenario: PathBuf,

    /// Print the final state as JSON instead of tables.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub engine: huddle_config::Args,
}
