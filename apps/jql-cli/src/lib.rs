//! Command-line driver for ModKit JQL.
//!
//! Loads a YAML registry with seed rows into an in-memory store and runs one
//! query or write per invocation for the identity given on the command line.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;

use cli::Cli;
use config::AppConfig;

/// Load configuration, initialise logging and run the selected command.
///
/// # Errors
/// Configuration, logging or command failures.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::load(&cli.config)?;
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    logging::init(&config.logging)?;

    let identity = cli.identity();
    let service = config.into_service()?;
    commands::execute(&service, &identity, cli.command).await
}
