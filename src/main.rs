mod cli;
mod commands;
mod confidence;
mod index;
mod model;
mod policy;
mod quarantine;
mod report;
mod resolve;
mod scope;
mod signal;
mod stagedoc;
mod stages;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() {
    init_tracing();

    match run() {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(err) => {
            error!(error = %err, "command failed");
            for cause in err.chain().skip(1) {
                error!(cause = %cause, "caused by");
            }
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::CheckReports(args) => commands::check_reports::run(args),
        Commands::CrossStage(args) => commands::cross_stage::run(args),
        Commands::Preflight(args) => commands::preflight::run(args),
        Commands::Gate(args) => commands::gate::run(args),
        Commands::Drift(args) => commands::drift::run(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
