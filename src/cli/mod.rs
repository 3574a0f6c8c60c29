//! CLI definitions for the `hishtory-core` bootstrap binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Bootstrap and inspect the local hishtory installation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Home directory to use instead of the current user's
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Create the config file if missing and initialize the local DB
    Init,

    /// Show resolved paths and the active config (default if no subcommand given)
    Status,
}
