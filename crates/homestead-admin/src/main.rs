//! Homestead administration tool.
//!
//! Opens the claim data directory named by the configuration, runs one
//! subcommand, and writes any changes back before exiting.

mod commands;
mod error;
mod paths;
mod session;

use std::process::ExitCode;

use clap::Parser;
use homestead_config::{CliArgs, Config};

use crate::commands::Command;
use crate::error::AdminError;
use crate::paths::ServerDirs;
use crate::session::Session;

#[derive(Parser, Debug)]
#[command(name = "homestead-admin", about = "Inspect and edit homestead land claims")]
struct AdminArgs {
    #[command(flatten)]
    cli: CliArgs,

    #[command(subcommand)]
    command: Command,
}

fn main() -> ExitCode {
    let args = AdminArgs::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:?} failed: {err}", args.command);
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &AdminArgs) -> Result<(), AdminError> {
    let dirs = match &args.cli.config {
        Some(dir) => ServerDirs::resolve_with_root(dir),
        None => ServerDirs::resolve()?,
    };
    dirs.create_all()?;

    let mut config = Config::load_or_create(&dirs.config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args.cli);
    config.validate()?;

    homestead_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));

    let session = Session::open(&config, dirs.claims_dir(&config.storage.data_dir))?;
    let stdout = std::io::stdout();
    commands::execute(&session, &args.command, &mut stdout.lock())?;
    session.close()
}
