//! Server directory resolution.

use std::path::{Path, PathBuf};

use crate::error::AdminError;

const APP_NAME: &str = "homestead";

/// OS-specific directories used by the homestead server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerDirs {
    /// Holds `config.ron`.
    pub config_dir: PathBuf,
    /// Base for relative claim storage paths.
    pub data_dir: PathBuf,
    /// Log files.
    pub log_dir: PathBuf,
}

impl ServerDirs {
    /// Resolve platform directories without creating them.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::NoConfigDir`] if the OS does not expose a
    /// configuration directory.
    pub fn resolve() -> Result<Self, AdminError> {
        let app_config = dirs::config_dir()
            .ok_or(AdminError::NoConfigDir)?
            .join(APP_NAME);
        let data_dir = dirs::data_dir()
            .map(|dir| dir.join(APP_NAME))
            .unwrap_or_else(|| app_config.join("data"));
        Ok(Self {
            log_dir: app_config.join("logs"),
            config_dir: app_config,
            data_dir,
        })
    }

    /// Every directory under one root, for `--config` and tests.
    pub fn resolve_with_root(root: &Path) -> Self {
        Self {
            config_dir: root.to_path_buf(),
            data_dir: root.join("data"),
            log_dir: root.join("logs"),
        }
    }

    /// Create all directories on disk.
    pub fn create_all(&self) -> Result<(), AdminError> {
        for dir in [&self.config_dir, &self.data_dir, &self.log_dir] {
            std::fs::create_dir_all(dir).map_err(|source| AdminError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Where claim records live. Relative configured paths sit under
    /// [`data_dir`](Self::data_dir).
    pub fn claims_dir(&self, configured: &Path) -> PathBuf {
        if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            self.data_dir.join(configured)
        }
    }
}
