use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cleanup;
mod cli;
mod config;
mod controller;
mod error;
mod joblist;
mod resolve;
mod staging;
mod workflow;

use cli::{Command, RootArgs};
use config::DedupConfig;

fn main() -> ExitCode {
    let args = RootArgs::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match args.command {
        Command::Clean(args) => workflow::run_clean(args),
        Command::Plan(args) => workflow::run_plan(args),
        Command::Run => DedupConfig::from_env()
            .map_err(anyhow::Error::from)
            .and_then(|config| workflow::run_cycle(&config)),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "aborted");
            ExitCode::FAILURE
        }
    }
}
