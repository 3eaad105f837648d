//! Configuration for the homestead claim server.
//!
//! Settings persist to disk as a RON file, tolerate missing and unknown
//! fields, and can be overridden from the command line via clap.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{ClaimsConfig, Config, DebugConfig, StorageConfig, WorldConfig};
pub use error::ConfigError;
