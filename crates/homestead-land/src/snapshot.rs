//! Serializable copy of a world's claim map.

use std::path::Path;

use homestead_claimant::ClaimantRef;
use serde::{Deserialize, Serialize};

use crate::chunk::{ChunkClaim, ChunkOwnership};
use crate::error::LandStoreError;
use crate::pos::ChunkPos;
use crate::slice::InnerClaim;
use crate::world::ClaimWorld;

/// Ownership of one column as stored on disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnRecord {
    /// Whole-column owner.
    Whole(ClaimantRef),
    /// Owned intervals, bottom to top.
    Sliced(Vec<InnerClaim>),
}

/// Every claimed column of one world.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldClaimsRecord {
    /// World name.
    pub world: String,
    /// Claimed columns, sorted by position.
    pub columns: Vec<(ChunkPos, ColumnRecord)>,
}

impl WorldClaimsRecord {
    /// Writes the snapshot as RON, creating parent directories.
    pub fn save_ron(&self, path: &Path) -> Result<(), LandStoreError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| LandStoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let pretty = ron::ser::PrettyConfig::new().depth_limit(4);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(LandStoreError::Serialize)?;
        let tmp = path.with_extension("ron.tmp");
        std::fs::write(&tmp, serialized).map_err(|source| LandStoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, path).map_err(|source| LandStoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads a snapshot written by [`save_ron`](Self::save_ron).
    pub fn load_ron(path: &Path) -> Result<Self, LandStoreError> {
        let contents = std::fs::read_to_string(path).map_err(|source| LandStoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&contents).map_err(|source| LandStoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl ClaimWorld {
    /// Copies the current claim map.
    pub fn snapshot(&self) -> WorldClaimsRecord {
        let mut columns = Vec::with_capacity(self.len());
        self.for_each_column(|chunk, column| {
            let record = match column.ownership() {
                ChunkOwnership::Unclaimed => return,
                ChunkOwnership::Whole(owner) => ColumnRecord::Whole(*owner),
                ChunkOwnership::Sliced(slice) => ColumnRecord::Sliced(slice.iter().copied().collect()),
            };
            columns.push((chunk, record));
        });
        columns.sort_by_key(|(chunk, _)| *chunk);
        WorldClaimsRecord {
            world: self.name().to_string(),
            columns,
        }
    }

    /// Replaces the claim map with `record`.
    ///
    /// Intervals are clamped to the current column limits. Overlapping
    /// entries resolve in file order, later entries winning.
    pub fn restore(&self, record: &WorldClaimsRecord) {
        let columns = record.columns.iter().map(|(chunk, stored)| {
            let bounds = self.bounds(*chunk);
            let column = match stored {
                ColumnRecord::Whole(owner) => ChunkClaim::whole(bounds, *owner),
                ColumnRecord::Sliced(claims) => {
                    let mut column = ChunkClaim::new(bounds);
                    for claim in claims {
                        column.update_slice_owner(Some(claim.owner), claim.upper, claim.lower);
                    }
                    column
                }
            };
            (*chunk, column)
        });
        self.replace_columns(columns);
        tracing::info!("{}: restored {} claimed column(s)", self.name(), self.len());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use homestead_claimant::{ClaimContext, ClaimRegistry, MemoryStore};
    use uuid::Uuid;

    use super::*;
    use crate::pos::{BlockPos, ColumnBounds};

    fn world(bounds: ColumnBounds) -> ClaimWorld {
        let registry = Arc::new(ClaimRegistry::new(ClaimContext::new(Arc::new(
            MemoryStore::new(),
        ))));
        ClaimWorld::new("overworld", Arc::new(bounds), registry)
    }

    #[test]
    fn test_snapshot_survives_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worlds").join("overworld.ron");
        let source = world(ColumnBounds::new(-64, 319));
        let a = ClaimantRef::player(Uuid::new_v4());
        let b = ClaimantRef::player(Uuid::new_v4());
        source.update_whole_owner(ChunkPos::new(-1, 4), Some(a)).unwrap();
        source.update_slice_owner(ChunkPos::new(0, 0), Some(a), 63, 0).unwrap();
        source.update_slice_owner(ChunkPos::new(0, 0), Some(b), 100, 80).unwrap();

        let record = source.snapshot();
        record.save_ron(&path).unwrap();
        let loaded = WorldClaimsRecord::load_ron(&path).unwrap();
        assert_eq!(loaded, record);

        let target = world(ColumnBounds::new(-64, 319));
        target.restore(&loaded);
        assert_eq!(target.snapshot(), record);
        assert_eq!(target.owner_at(BlockPos::new(0, 90, 0)), Some(b));
        assert_eq!(target.owner_at(BlockPos::new(-5, 200, 70)), Some(a));
    }

    #[test]
    fn test_restore_clamps_and_resolves_overlaps() {
        let a = ClaimantRef::player(Uuid::new_v4());
        let b = ClaimantRef::player(Uuid::new_v4());
        let record = WorldClaimsRecord {
            world: "overworld".to_string(),
            columns: vec![(
                ChunkPos::new(0, 0),
                ColumnRecord::Sliced(vec![
                    InnerClaim::new(a, -100, 50),
                    InnerClaim::new(b, 40, 400),
                ]),
            )],
        };
        let world = world(ColumnBounds::new(0, 255));
        world.restore(&record);

        let column = world.column(ChunkPos::new(0, 0)).unwrap();
        let slice = column.slice().unwrap();
        let stored: Vec<(i32, i32)> = slice.iter().map(|c| (c.lower, c.upper)).collect();
        assert_eq!(stored, vec![(0, 39), (40, 255)]);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = WorldClaimsRecord::load_ron(&dir.path().join("none.ron")).unwrap_err();
        assert!(matches!(err, LandStoreError::Io { .. }));
    }
}
