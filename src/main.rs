//! recproxy: lifecycle manager for the record/playback test proxy.
//!
//! Parses the command line, initializes logging, and hands off to the
//! subcommand handler. Logs go to stderr so stdout stays machine-readable
//! (`eval "$(recproxy trust)"`).

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use recproxy::{cli::Cli, cli_handler::handle_command};
use tracing::debug;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_tracing(cli.verbose)?;

    debug!("Parsed CLI arguments: {:?}", cli);

    let code = handle_command(&cli)?;
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}

/// Initialize the tracing subscriber.
///
/// # Verbosity Levels
/// - 0 (default): `RUST_LOG`, or warnings and errors
/// - 1 (-v): Info level
/// - 2 (-vv): Debug level
/// - 3+ (-vvv): Trace level
fn init_tracing(verbose: u8) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}
