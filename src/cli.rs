//! Command-line interface definitions for recproxy.
//!
//! Uses clap's derive API for type-safe argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Lifecycle manager for the record/playback test proxy.
///
/// recproxy downloads the proxy build a repository pins, makes its
/// development certificate trusted, starts and health-checks the proxy,
/// registers the common sanitizers, and stops it again.
#[derive(Parser, Debug)]
#[command(name = "recproxy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Directory inside the repository (defaults to the current directory).
    #[arg(short = 'C', long = "repo", value_name = "PATH", global = true)]
    pub repo: Option<PathBuf>,

    /// Path to additional config file.
    ///
    /// Merged on top of the user and repository configs.
    #[arg(short = 'c', long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity.
    ///
    /// Can be specified multiple times:
    /// -v    = info level
    /// -vv   = debug level
    /// -vvv  = trace level
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Make sure the pinned proxy build is unpacked and print its path.
    Ensure,

    /// Build the merged trust bundle and print shell exports for it.
    Trust,

    /// Start the proxy, register sanitizers, and leave it running.
    ///
    /// Prints an `export PROXY_PID=...` line for a later `stop`.
    Start,

    /// Stop a proxy started by `start`.
    Stop {
        /// PID to stop (defaults to `PROXY_PID`).
        #[arg(long)]
        pid: Option<u32>,
    },

    /// Report whether the proxy answers its readiness route.
    Status,

    /// Run a command inside a proxy session and exit with its status.
    Run {
        /// Command and arguments.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
}
