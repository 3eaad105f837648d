//! Command-line overrides shared by the homestead binaries.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Homestead command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "homestead", about = "Homestead land claims")]
pub struct CliArgs {
    /// Directory holding claimant records.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Lowest claimable Y coordinate.
    #[arg(long, global = true, allow_hyphen_values = true)]
    pub min_y: Option<i32>,

    /// Highest claimable Y coordinate.
    #[arg(long, global = true, allow_hyphen_values = true)]
    pub max_y: Option<i32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref dir) = args.data_dir {
            self.storage.data_dir = dir.clone();
        }
        if let Some(min_y) = args.min_y {
            self.world.min_y = min_y;
        }
        if let Some(max_y) = args.max_y {
            self.world.max_y = max_y;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
