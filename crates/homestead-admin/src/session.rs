//! One admin run: the claim registry and every saved world, opened from
//! disk and written back on close.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use homestead_claimant::{ClaimContext, ClaimRegistry, RonFileStore};
use homestead_config::Config;
use homestead_land::{ColumnBounds, LandClaims};

use crate::error::AdminError;

/// World registered even when nothing has been saved yet.
pub const DEFAULT_WORLD: &str = "overworld";

/// Open claim state backed by a data directory.
pub struct Session {
    land: LandClaims,
    data_dir: PathBuf,
}

impl Session {
    /// Loads every town and saved world map under `data_dir`.
    pub fn open(config: &Config, data_dir: PathBuf) -> Result<Self, AdminError> {
        let ctx = ClaimContext::new(Arc::new(RonFileStore::new(&data_dir)))
            .with_permissions(config.permission_table())
            .with_town_names(config.town_name_rules())
            .with_save_on_mutation(config.storage.save_on_mutation);
        let land = LandClaims::new(ClaimRegistry::open(ctx)?);

        let bounds = Arc::new(ColumnBounds::new(config.world.min_y, config.world.max_y));
        land.add_world(DEFAULT_WORLD, bounds.clone());
        for name in LandClaims::saved_world_names(&data_dir)? {
            land.add_world(&name, bounds.clone());
        }
        let loaded = land.load_worlds(&data_dir)?;
        tracing::info!(
            "opened {} with {} town(s) and {loaded} saved world(s)",
            data_dir.display(),
            land.registry().town_count()
        );
        Ok(Self { land, data_dir })
    }

    /// Registry and worlds.
    pub fn land(&self) -> &LandClaims {
        &self.land
    }

    /// Directory holding claimant records and world maps.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Writes dirty claimants and every world map.
    pub fn close(self) -> Result<(), AdminError> {
        let saved = self.land.registry().save_all()?;
        let worlds = self.land.save_worlds(&self.data_dir)?;
        tracing::info!("closed session: {saved} claimant(s), {worlds} world(s) written");
        Ok(())
    }
}
