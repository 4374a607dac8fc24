mod config;
mod control;
mod motor;
mod report;
mod telemetry;

use anyhow::Result;
use clap::Parser;

use crate::config::{FollowerCliArgs, FollowerConfig};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = FollowerConfig::try_from(FollowerCliArgs::parse())?;
    let _telemetry = telemetry::enter_runtime(config.verbose);
    telemetry::init_metrics_recorder(config.metrics_addr)?;

    let outcome = control::run(config);
    telemetry::log_metrics_snapshot();
    outcome
}
