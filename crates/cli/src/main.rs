//! `kgq`, the command-line client for the query engine.
//!
//! Usage:
//!   KGQ_PASSWORD=secret kgq exec '?edge(X,Y)'
//!   kgq repl
//!   kgq config show
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); results go to stdout.

mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let (config, config_path) = cli::load_config(&cli)?;
    tracing::debug!(path = %config_path, url = %config.client.url, "configuration loaded");

    match cli.command {
        Command::Exec {
            program,
            json,
            timeout_ms,
        } => cli::exec::run(&config, &program, json, timeout_ms).await,
        Command::Repl { json } => cli::repl::run(&config, json).await,
        Command::Config(ConfigCommand::Show) => cli::config::show(&config),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
