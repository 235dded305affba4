use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ember_runner::config::{Cli, Config};
use ember_runner::pipeline::{build_engine, initial_state, resume_state};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ember=info".parse()?))
        .init();

    let config = Config::from_env()?.with_cli(Cli::parse());
    config.log_summary();

    let state = match &config.resume {
        Some(path) => resume_state(path)?,
        None => initial_state(),
    };

    let mut engine = build_engine(&config);
    let state = engine.run(state)?;

    info!(
        step = state.counters.step,
        epoch = state.counters.epoch,
        "Run finished"
    );
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}
