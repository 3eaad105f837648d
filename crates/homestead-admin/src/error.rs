//! Errors surfaced by the admin tool.

use std::path::PathBuf;

use homestead_claimant::{Rejection, StoreError};
use homestead_config::ConfigError;
use homestead_land::LandStoreError;

/// Anything that stops an admin command from completing.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    /// The OS did not provide a configuration directory.
    #[error("could not determine OS configuration directory")]
    NoConfigDir,
    /// A server directory could not be created.
    #[error("failed to create {path}: {source}")]
    CreateDir {
        /// Directory being created.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Claimant storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A claim map could not be read or written.
    #[error(transparent)]
    Land(#[from] LandStoreError),
    /// The claim model refused the request.
    #[error("rejected: {0}")]
    Rejected(#[from] Rejection),
    /// A rank argument was not a rank name or `none`.
    #[error("unknown rank {0:?}, expected enemy, passive, ally, owner or none")]
    UnknownRank(String),
    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}
