//! Claim map persistence errors.

use std::path::PathBuf;

/// Errors raised while reading or writing a claim map snapshot.
#[derive(Debug, thiserror::Error)]
pub enum LandStoreError {
    /// Filesystem failure.
    #[error("claim map I/O error on {path}: {source}")]
    Io {
        /// File or directory being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The snapshot file could not be parsed.
    #[error("failed to parse claim map {path}: {source}")]
    Parse {
        /// Offending file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: ron::error::SpannedError,
    },
    /// The snapshot could not be serialized.
    #[error("failed to serialize claim map: {0}")]
    Serialize(#[source] ron::Error),
}
