//! hishtory-core binary
//!
//! Initializes the hishtory data directory and reports on it. Bootstrap
//! failures are printed and the process exits with a non-zero status.

use anyhow::Result;
use clap::Parser;
use hishtory_core::cli::{Cli, Command};
use hishtory_core::config::ConfigStore;
use hishtory_core::context::Context;
use hishtory_core::logging::{self, LogHandle, LogSink};
use hishtory_core::paths::{self, HishtoryPaths};
use std::process::ExitCode;
use tracing::info;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let (paths, log) = match &cli.home {
        Some(home) => {
            let paths = HishtoryPaths::new(home, paths::data_dir_name());
            let log = LogSink::new(&paths).try_get()?.clone();
            (paths, log)
        }
        None => (HishtoryPaths::resolve()?, logging::logger().clone()),
    };
    install(&log);

    match cli.command.unwrap_or(Command::Status) {
        Command::Init => init(&paths),
        Command::Status => status(&paths),
    }
}

fn install(log: &LogHandle) {
    if log.install_global().is_err() {
        eprintln!("Warning: a global tracing subscriber was already installed");
    }
}

fn init(paths: &HishtoryPaths) -> Result<()> {
    ConfigStore::new(paths).init_if_absent()?;
    let ctx = Context::bootstrap_at(paths)?;
    info!(data_dir = %paths.data_dir().display(), "Initialized hishtory");
    ctx.db().ping()?;
    println!("Initialized {}", paths.data_dir().display());
    Ok(())
}

fn status(paths: &HishtoryPaths) -> Result<()> {
    let ctx = Context::bootstrap_at(paths)?;
    let config = ctx.config();
    let entries = ctx.db().count_entries()?;

    println!("Home:       {}", ctx.home_dir().display());
    println!("Config:     {}", paths.config_file().display());
    println!("Database:   {}", paths.db_file().display());
    println!("Log:        {}", paths.log_file().display());
    println!("Enabled:    {}", config.is_enabled);
    println!("Offline:    {}", config.is_offline);
    println!("Device ID:  {}", config.device_id);
    println!("Columns:    {}", config.displayed_columns.join(", "));
    println!("Timestamps: {}", config.timestamp_format);
    println!("Entries:    {entries}");
    Ok(())
}
