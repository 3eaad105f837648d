//! Session-wide land claim context.
//!
//! [`LandClaims`] is constructed once per server session. It owns the
//! claimant registry and every world's claim map, and runs operations that
//! span both, such as disbanding a town together with its land.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use homestead_claimant::{ClaimRegistry, ClaimantRef, DisbandedTown, Rejection};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::LandStoreError;
use crate::pos::ColumnHeights;
use crate::snapshot::WorldClaimsRecord;
use crate::world::ClaimWorld;

const WORLDS_DIR: &str = "worlds";

/// Registry plus per-world claim maps.
pub struct LandClaims {
    registry: Arc<ClaimRegistry>,
    worlds: RwLock<BTreeMap<String, Arc<ClaimWorld>>>,
}

impl LandClaims {
    /// Creates a context with no worlds.
    pub fn new(registry: ClaimRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            worlds: RwLock::new(BTreeMap::new()),
        }
    }

    /// The claimant registry.
    pub fn registry(&self) -> &Arc<ClaimRegistry> {
        &self.registry
    }

    /// Registers a world, or returns the existing one with that name.
    pub fn add_world(&self, name: &str, heights: Arc<dyn ColumnHeights>) -> Arc<ClaimWorld> {
        let mut worlds = self.worlds.write();
        let world = worlds.entry(name.to_string()).or_insert_with(|| {
            tracing::info!("claim world {name:?} registered");
            Arc::new(ClaimWorld::new(name, heights, Arc::clone(&self.registry)))
        });
        Arc::clone(world)
    }

    /// The world called `name`.
    pub fn world(&self, name: &str) -> Option<Arc<ClaimWorld>> {
        self.worlds.read().get(name).cloned()
    }

    /// Every registered world, sorted by name.
    pub fn worlds(&self) -> Vec<Arc<ClaimWorld>> {
        self.worlds.read().values().cloned().collect()
    }

    /// Columns owned (wholly or in part) by `owner` across every world.
    pub fn claimed_columns(&self, owner: ClaimantRef) -> usize {
        self.worlds()
            .iter()
            .map(|world| world.claimed_columns(owner))
            .sum()
    }

    /// Disbands a town. Owner only.
    ///
    /// The town is deleted first, then every whole-column and slice claim
    /// it held is released in every world. Column edits re-check town
    /// owners under the column lock, so no claim for the town survives.
    pub fn disband_town(&self, actor: Uuid, town: Uuid) -> Result<DisbandedTown, Rejection> {
        let disbanded = self.registry.delete_town(actor, town)?;
        let owner = ClaimantRef::town(town);
        let released: usize = self
            .worlds()
            .iter()
            .map(|world| world.release_owner(owner))
            .sum();
        tracing::info!("town {town} released {released} column(s) after disbanding");
        Ok(disbanded)
    }

    /// Writes every world's claim map to `<dir>/worlds/<name>.ron`.
    pub fn save_worlds(&self, dir: &Path) -> Result<usize, LandStoreError> {
        let worlds = self.worlds();
        for world in &worlds {
            world.snapshot().save_ron(&world_path(dir, world.name()))?;
        }
        tracing::debug!("saved {} claim map(s)", worlds.len());
        Ok(worlds.len())
    }

    /// Restores every registered world that has a saved claim map under
    /// `dir`. Worlds without a file keep their current claims.
    pub fn load_worlds(&self, dir: &Path) -> Result<usize, LandStoreError> {
        let mut loaded = 0;
        for world in self.worlds() {
            let path = world_path(dir, world.name());
            if !path.exists() {
                continue;
            }
            world.restore(&WorldClaimsRecord::load_ron(&path)?);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Names of the worlds with a saved claim map under `dir`, sorted.
    pub fn saved_world_names(dir: &Path) -> Result<Vec<String>, LandStoreError> {
        let worlds_dir = dir.join(WORLDS_DIR);
        if !worlds_dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&worlds_dir).map_err(|source| LandStoreError::Io {
            path: worlds_dir.clone(),
            source,
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| LandStoreError::Io {
                    path: worlds_dir.clone(),
                    source,
                })?
                .path();
            if path.extension().is_some_and(|ext| ext == "ron")
                && let Some(stem) = path.file_stem().and_then(|stem| stem.to_str())
            {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

fn world_path(dir: &Path, name: &str) -> std::path::PathBuf {
    dir.join(WORLDS_DIR).join(format!("{name}.ron"))
}

#[cfg(test)]
mod tests {
    use homestead_claimant::{ClaimContext, MemoryStore};

    use super::*;
    use crate::pos::{ChunkPos, ColumnBounds};

    fn land() -> LandClaims {
        LandClaims::new(ClaimRegistry::new(ClaimContext::new(Arc::new(
            MemoryStore::new(),
        ))))
    }

    #[test]
    fn test_add_world_is_idempotent() {
        let land = land();
        let first = land.add_world("overworld", Arc::new(ColumnBounds::default()));
        let second = land.add_world("overworld", Arc::new(ColumnBounds::new(0, 10)));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(land.worlds().len(), 1);
        assert!(land.world("nether").is_none());
    }

    #[test]
    fn test_disband_releases_land_in_every_world() {
        let land = land();
        let overworld = land.add_world("overworld", Arc::new(ColumnBounds::default()));
        let nether = land.add_world("nether", Arc::new(ColumnBounds::new(0, 127)));
        let founder = Uuid::new_v4();
        let town = land.registry().make_town_claim(founder, "Bree").unwrap();
        let owner = ClaimantRef::town(town.id());
        let bystander = ClaimantRef::player(Uuid::new_v4());

        overworld.update_town_owner(ChunkPos::new(0, 0), Some(town.id())).unwrap();
        overworld
            .update_slice_owner(ChunkPos::new(1, 0), Some(owner), 40, 0)
            .unwrap();
        overworld
            .update_slice_owner(ChunkPos::new(1, 0), Some(bystander), 80, 41)
            .unwrap();
        nether.update_town_owner(ChunkPos::new(5, 5), Some(town.id())).unwrap();
        assert_eq!(land.claimed_columns(owner), 3);

        assert_eq!(
            land.disband_town(Uuid::new_v4(), town.id()).unwrap_err(),
            Rejection::NotTownOwner(town.id())
        );
        assert_eq!(land.claimed_columns(owner), 3);

        let disbanded = land.disband_town(founder, town.id()).unwrap();
        assert_eq!(disbanded.members, vec![founder]);
        assert_eq!(land.claimed_columns(owner), 0);
        assert_eq!(overworld.claimed_columns(bystander), 1);
        assert!(nether.is_empty());
        assert!(land.registry().get_town(town.id()).is_none());
    }

    #[test]
    fn test_claims_racing_disband_leave_no_stale_owner() {
        for _ in 0..20 {
            let land = land();
            let world = land.add_world("overworld", Arc::new(ColumnBounds::default()));
            let founder = Uuid::new_v4();
            let town = land.registry().make_town_claim(founder, "Bree").unwrap();
            let owner = ClaimantRef::town(town.id());

            std::thread::scope(|scope| {
                scope.spawn(|| {
                    for x in 0..64 {
                        let chunk = ChunkPos::new(x, 0);
                        if world.update_town_owner(chunk, Some(town.id())).is_err() {
                            break;
                        }
                        let _ = world.update_slice_owner(ChunkPos::new(x, 1), Some(owner), 40, 0);
                    }
                });
                scope.spawn(|| {
                    land.disband_town(founder, town.id()).unwrap();
                });
            });

            assert_eq!(land.claimed_columns(owner), 0);
            assert!(world.is_empty());
            assert_eq!(
                world.update_town_owner(ChunkPos::new(0, 0), Some(town.id())),
                Err(Rejection::UnknownTown(town.id().to_string()))
            );
        }
    }

    #[test]
    fn test_save_and_load_worlds() {
        let dir = tempfile::tempdir().unwrap();
        let player = Uuid::new_v4();
        {
            let land = land();
            let world = land.add_world("overworld", Arc::new(ColumnBounds::default()));
            world.update_player_owner(ChunkPos::new(2, 3), player);
            assert_eq!(land.save_worlds(dir.path()).unwrap(), 1);
        }
        let land = land();
        let world = land.add_world("overworld", Arc::new(ColumnBounds::default()));
        land.add_world("nether", Arc::new(ColumnBounds::default()));
        assert_eq!(land.load_worlds(dir.path()).unwrap(), 1);
        assert_eq!(world.claimed_columns(ClaimantRef::player(player)), 1);
    }

    #[test]
    fn test_saved_world_names() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LandClaims::saved_world_names(dir.path()).unwrap().is_empty());

        let land = land();
        land.add_world("overworld", Arc::new(ColumnBounds::default()));
        land.add_world("nether", Arc::new(ColumnBounds::new(0, 127)));
        land.save_worlds(dir.path()).unwrap();
        std::fs::write(dir.path().join("worlds").join("notes.txt"), "x").unwrap();

        assert_eq!(
            LandClaims::saved_world_names(dir.path()).unwrap(),
            vec!["nether".to_string(), "overworld".to_string()]
        );
    }
}
