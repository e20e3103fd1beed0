use clap::Parser;
use color_eyre::Result;
use huddle::{
    init_errors,
    init_logging,
    parse_scenario,
    run,
    Args,
};
use huddle_config::EngineConfig;

#[tokio::main]
async fn main() -> Result<()> {
    init_errors()?;
    init_logging()?;

    let args = Args::parse();
    let config = EngineConfig::new(args.engine.clone())?;
    let scenario = parse_scenario(&args.scenario)?;

    let report = run(config, scenario).await?;
    if args.json {
        println!("{}", report.to_json()?);
    } else {
        println!("{report}");
    }
    Ok(())
}
