//! Configuration structs with sensible defaults and RON persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use homestead_claimant::{Permission, PermissionTable, Rank, TownNameRules};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Vertical world limits.
    pub world: WorldConfig,
    /// Claim and town rules.
    pub claims: ClaimsConfig,
    /// Claimant persistence settings.
    pub storage: StorageConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Vertical bounds of every chunk column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    /// Lowest buildable Y coordinate (inclusive).
    pub min_y: i32,
    /// Highest buildable Y coordinate (inclusive).
    pub max_y: i32,
}

/// Claim and town rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClaimsConfig {
    /// Maximum length of a town name in characters.
    pub max_town_name_len: usize,
    /// Accept town names containing whitespace.
    pub allow_whitespace_in_town_names: bool,
    /// Server-wide required rank per permission. Claimant overrides still win;
    /// permissions absent here use their built-in default.
    pub permission_overrides: BTreeMap<Permission, Rank>,
}

/// Claimant persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the claimant records and claim map snapshots.
    pub data_dir: PathBuf,
    /// Write each claimant as soon as it changes. When disabled, changes are
    /// only flushed by an explicit save pass.
    pub save_on_mutation: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            min_y: -64,
            max_y: 319,
        }
    }
}

impl Default for ClaimsConfig {
    fn default() -> Self {
        Self {
            max_town_name_len: 32,
            allow_whitespace_in_town_names: false,
            permission_overrides: BTreeMap::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("claims"),
            save_on_mutation: true,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Derived views ---

impl Config {
    /// Builds the permission requirement table from the configured overrides.
    pub fn permission_table(&self) -> PermissionTable {
        let mut table = PermissionTable::builtin();
        for (&permission, &rank) in &self.claims.permission_overrides {
            table.set(permission, rank);
        }
        table
    }

    /// Town name validation rules from the claims section.
    pub fn town_name_rules(&self) -> TownNameRules {
        TownNameRules {
            max_len: self.claims.max_town_name_len,
            allow_whitespace: self.claims.allow_whitespace_in_town_names,
        }
    }

    /// Rejects settings that cannot describe a valid world.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.min_y > self.world.max_y {
            return Err(ConfigError::InvalidWorldBounds {
                min_y: self.world.min_y,
                max_y: self.world.max_y,
            });
        }
        Ok(())
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Reads `config.ron` from `config_dir`, writing the defaults there first
    /// if the file does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        if !path.exists() {
            let defaults = Config::default();
            defaults.save(config_dir)?;
            log::info!("wrote default claim config to {}", path.display());
            return Ok(defaults);
        }
        let config = Self::read(&path)?;
        log::info!("claim config loaded from {}", path.display());
        Ok(config)
    }

    /// Writes `config.ron` into `config_dir`, replacing any previous file.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;
        let serialized = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::new())
            .map_err(ConfigError::SerializeError)?;
        let path = config_dir.join(CONFIG_FILE);
        let tmp = path.with_extension("ron.tmp");
        std::fs::write(&tmp, serialized).map_err(ConfigError::WriteError)?;
        std::fs::rename(&tmp, &path).map_err(ConfigError::WriteError)
    }

    /// Re-reads `config.ron`. `Ok(None)` means the file matches `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = Self::read(&config_dir.join(CONFIG_FILE))?;
        if fresh == *self {
            return Ok(None);
        }
        log::info!("claim config changed on disk");
        Ok(Some(fresh))
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }
}
