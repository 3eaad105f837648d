//! Claim state of one world: every claimed chunk column, keyed by position.
//!
//! [`ClaimWorld`] is the entry point every interaction site calls. Columns
//! live in a sharded map, so edits to one column are serialized while
//! lookups elsewhere proceed. Owner references are copied out of the map
//! before the owning claimant is resolved; no column lock is ever held while
//! the registry touches the store.

use std::sync::Arc;

use dashmap::DashMap;
use homestead_claimant::{
    Access, ClaimRegistry, ClaimSetting, ClaimantKind, ClaimantRef, Outcome, Permission,
    Rejection,
};
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxBuildHasher;
use uuid::Uuid;

use crate::chunk::{ChunkClaim, setting_for};
use crate::pos::{BlockPos, ChunkPos, ColumnBounds, ColumnHeights};
use crate::slice::owner_access;

/// All claimed columns of one world.
pub struct ClaimWorld {
    name: String,
    heights: Arc<dyn ColumnHeights>,
    registry: Arc<ClaimRegistry>,
    columns: DashMap<ChunkPos, ChunkClaim, FxBuildHasher>,
    /// Held by region operations that must check and act atomically.
    region_lock: Mutex<()>,
}

impl std::fmt::Debug for ClaimWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimWorld")
            .field("name", &self.name)
            .field("columns", &self.columns.len())
            .finish()
    }
}

impl ClaimWorld {
    /// Creates a world with no claims.
    pub fn new(
        name: impl Into<String>,
        heights: Arc<dyn ColumnHeights>,
        registry: Arc<ClaimRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            heights,
            registry,
            columns: DashMap::with_hasher(FxBuildHasher),
            region_lock: Mutex::new(()),
        }
    }

    /// World name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The registry owners are resolved through.
    pub fn registry(&self) -> &Arc<ClaimRegistry> {
        &self.registry
    }

    /// Vertical limits of the column at `chunk`.
    pub fn bounds(&self, chunk: ChunkPos) -> ColumnBounds {
        self.heights.bounds(chunk)
    }

    /// Number of columns with any claim.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if nothing in the world is claimed.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Copy of the column state at `chunk`, if claimed.
    pub fn column(&self, chunk: ChunkPos) -> Option<ChunkClaim> {
        self.columns.get(&chunk).map(|column| column.value().clone())
    }

    /// Positions of every claimed column, sorted.
    pub fn claimed_positions(&self) -> Vec<ChunkPos> {
        let mut positions: Vec<ChunkPos> = self.columns.iter().map(|entry| *entry.key()).collect();
        positions.sort_unstable();
        positions
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Who owns the block at `pos`.
    pub fn owner_at(&self, pos: BlockPos) -> Option<ClaimantRef> {
        self.columns
            .get(&pos.chunk())
            .and_then(|column| column.owner_at(pos.y))
    }

    /// Permission check for `actor` at `pos`.
    pub fn access(&self, permission: Permission, actor: Uuid, pos: BlockPos) -> Access {
        match self.owner_at(pos) {
            Some(owner) => owner_access(&self.registry, owner, actor, permission),
            None => Access::Wilderness,
        }
    }

    /// Returns `true` if `actor` may perform `permission` at `pos`.
    /// Wilderness permits everything.
    pub fn can_player_do(&self, permission: Permission, actor: Uuid, pos: BlockPos) -> bool {
        self.access(permission, actor, pos).is_allowed()
    }

    /// Value of `setting` at `pos`: the owner's setting, or the wilderness
    /// default.
    pub fn is_setting(&self, pos: BlockPos, setting: ClaimSetting) -> bool {
        setting_for(&self.registry, self.owner_at(pos), setting)
    }

    /// Number of columns in which `owner` owns anything. Recomputed on every
    /// call.
    pub fn claimed_columns(&self, owner: ClaimantRef) -> usize {
        self.columns
            .iter()
            .filter(|entry| entry.value().is_owned_by(owner))
            .count()
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Gives `upper..=lower` of the column at `chunk` to `owner`, or clears
    /// it. A whole-owned column is converted to slices.
    pub fn update_slice_owner(
        &self,
        chunk: ChunkPos,
        owner: Option<ClaimantRef>,
        upper: i32,
        lower: i32,
    ) -> Result<Outcome, Rejection> {
        self.check_owner(owner)?;
        let outcome = self.edit_column(chunk, owner, |column| {
            column.update_slice_owner(owner, upper, lower)
        })?;
        if outcome.is_applied() {
            tracing::debug!(
                "{}: column ({}, {}) y {lower}..={upper} -> {:?}",
                self.name,
                chunk.x,
                chunk.z,
                owner.map(|owner| owner.id)
            );
        }
        Ok(outcome)
    }

    /// Gives the whole column to `town`, or unclaims it when `None`.
    pub fn update_town_owner(
        &self,
        chunk: ChunkPos,
        town: Option<Uuid>,
    ) -> Result<Outcome, Rejection> {
        self.update_whole_owner(chunk, town.map(ClaimantRef::town))
    }

    /// Gives the whole column to `player`.
    pub fn update_player_owner(&self, chunk: ChunkPos, player: Uuid) -> Outcome {
        // Players always resolve, so this cannot be rejected.
        self.update_whole_owner(chunk, Some(ClaimantRef::player(player)))
            .unwrap_or(Outcome::Unchanged)
    }

    /// Sets or clears the whole-column owner. Any slice is discarded.
    pub fn update_whole_owner(
        &self,
        chunk: ChunkPos,
        owner: Option<ClaimantRef>,
    ) -> Result<Outcome, Rejection> {
        self.check_owner(owner)?;
        let outcome = self.edit_column(chunk, owner, |column| {
            column.update_whole_owner(owner)
        })?;
        if outcome.is_applied() {
            tracing::debug!(
                "{}: column ({}, {}) whole owner -> {:?}",
                self.name,
                chunk.x,
                chunk.z,
                owner.map(|owner| owner.id)
            );
        }
        Ok(outcome)
    }

    /// Removes everything `owner` owns in this world. Returns the number of
    /// columns changed.
    pub fn release_owner(&self, owner: ClaimantRef) -> usize {
        let mut changed = 0;
        self.columns.retain(|_, column| {
            if column.release(owner) {
                changed += 1;
            }
            !column.is_unclaimed()
        });
        if changed > 0 {
            tracing::debug!("{}: released {changed} column(s) of {}", self.name, owner.id);
        }
        changed
    }

    /// Drops every claim not owned by the server. Returns the number of
    /// columns changed.
    pub fn reset(&self) -> usize {
        let mut changed = 0;
        self.columns.retain(|_, column| {
            if column.reset() {
                changed += 1;
            }
            !column.is_unclaimed()
        });
        changed
    }

    /// Replaces every column at once. Used when restoring a snapshot.
    pub(crate) fn replace_columns(&self, columns: impl IntoIterator<Item = (ChunkPos, ChunkClaim)>) {
        self.columns.clear();
        for (chunk, column) in columns {
            if !column.is_unclaimed() {
                self.columns.insert(chunk, column);
            }
        }
    }

    /// Iterates every claimed column under its shard lock.
    pub(crate) fn for_each_column(&self, mut visit: impl FnMut(ChunkPos, &ChunkClaim)) {
        for entry in self.columns.iter() {
            visit(*entry.key(), entry.value());
        }
    }

    /// Serializes region operations on this world.
    pub(crate) fn lock_regions(&self) -> MutexGuard<'_, ()> {
        self.region_lock.lock()
    }

    /// Applies `edit` to the column at `chunk` under its lock. The column is
    /// created only when `owner` is set; columns left unclaimed are dropped.
    ///
    /// A town owner is checked again under the column lock. Disbanding
    /// deletes the town before releasing its land, so a claim either sees
    /// the town gone or lands before the release pass reaches its shard.
    fn edit_column(
        &self,
        chunk: ChunkPos,
        owner: Option<ClaimantRef>,
        edit: impl FnOnce(&mut ChunkClaim) -> Outcome,
    ) -> Result<Outcome, Rejection> {
        let (result, unclaimed) = match owner {
            Some(owner) => {
                let mut column = self
                    .columns
                    .entry(chunk)
                    .or_insert_with(|| ChunkClaim::new(self.heights.bounds(chunk)));
                let result = if self.is_deleted_town(owner) {
                    Err(Rejection::UnknownTown(owner.id.to_string()))
                } else {
                    Ok(edit(column.value_mut()))
                };
                (result, column.is_unclaimed())
            }
            None => match self.columns.get_mut(&chunk) {
                Some(mut column) => {
                    let outcome = edit(column.value_mut());
                    (Ok(outcome), column.is_unclaimed())
                }
                None => (Ok(Outcome::Unchanged), false),
            },
        };
        if unclaimed {
            self.columns.remove_if(&chunk, |_, column| column.is_unclaimed());
        }
        result
    }

    /// Map lookup only; never reaches the store.
    fn is_deleted_town(&self, owner: ClaimantRef) -> bool {
        owner.kind == ClaimantKind::Town && self.registry.get_town(owner.id).is_none()
    }

    /// Towns must exist to own land; players always resolve.
    fn check_owner(&self, owner: Option<ClaimantRef>) -> Result<(), Rejection> {
        match owner {
            Some(owner) if self.registry.resolve(owner).is_none() => {
                Err(Rejection::UnknownTown(owner.id.to_string()))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use homestead_claimant::{ClaimContext, MemoryStore, Rank};

    use super::*;

    fn world() -> ClaimWorld {
        let registry = Arc::new(ClaimRegistry::new(ClaimContext::new(Arc::new(
            MemoryStore::new(),
        ))));
        ClaimWorld::new("overworld", Arc::new(ColumnBounds::new(-64, 319)), registry)
    }

    #[test]
    fn test_wilderness_everywhere_by_default() {
        let world = world();
        let pos = BlockPos::new(100, 64, -300);
        assert!(world.can_player_do(Permission::Blocks, Uuid::new_v4(), pos));
        assert_eq!(world.access(Permission::Blocks, Uuid::new_v4(), pos), Access::Wilderness);
        assert!(world.is_setting(pos, ClaimSetting::CreeperGrief));
    }

    #[test]
    fn test_player_owner_and_friend() {
        let world = world();
        let owner = Uuid::new_v4();
        let visitor = Uuid::new_v4();
        let pos = BlockPos::new(20, 70, 20);
        world.update_player_owner(pos.chunk(), owner);

        assert!(world.can_player_do(Permission::Blocks, owner, pos));
        assert!(!world.can_player_do(Permission::Blocks, visitor, pos));
        world
            .registry()
            .get_player_claim(owner)
            .update_friend(visitor, Some(Rank::Ally))
            .unwrap();
        assert!(world.can_player_do(Permission::Blocks, visitor, pos));
        assert!(world.can_player_do(Permission::Blocks, visitor, BlockPos::new(31, -64, 16)));
        assert!(world.can_player_do(Permission::Blocks, Uuid::new_v4(), BlockPos::new(32, 70, 20)));
    }

    #[test]
    fn test_unknown_town_cannot_own_land() {
        let world = world();
        let ghost = Uuid::new_v4();
        assert_eq!(
            world.update_town_owner(ChunkPos::new(0, 0), Some(ghost)),
            Err(Rejection::UnknownTown(ghost.to_string()))
        );
        assert!(world.is_empty());
    }

    #[test]
    fn test_town_owner_and_unclaim() {
        let world = world();
        let founder = Uuid::new_v4();
        let town = world.registry().make_town_claim(founder, "Bree").unwrap();
        let chunk = ChunkPos::new(3, -2);

        assert_eq!(world.update_town_owner(chunk, Some(town.id())), Ok(Outcome::Applied));
        assert_eq!(world.claimed_columns(ClaimantRef::town(town.id())), 1);
        assert!(world.can_player_do(Permission::Blocks, founder, BlockPos::new(48, 0, -32)));

        assert_eq!(world.update_town_owner(chunk, None), Ok(Outcome::Applied));
        assert!(world.is_empty());
        assert_eq!(world.update_town_owner(chunk, None), Ok(Outcome::Unchanged));
    }

    #[test]
    fn test_slice_edits_drop_empty_columns() {
        let world = world();
        let owner = ClaimantRef::player(Uuid::new_v4());
        let chunk = ChunkPos::new(0, 0);
        world.update_slice_owner(chunk, Some(owner), 63, 0).unwrap();
        assert_eq!(world.owner_at(BlockPos::new(0, 30, 0)), Some(owner));
        assert_eq!(world.owner_at(BlockPos::new(0, 100, 0)), None);

        world.update_slice_owner(chunk, None, 63, 0).unwrap();
        assert!(world.column(chunk).is_none());
        assert_eq!(
            world.update_slice_owner(ChunkPos::new(5, 5), None, 10, 0),
            Ok(Outcome::Unchanged)
        );
        assert!(world.is_empty());
    }

    #[test]
    fn test_release_owner_and_reset() {
        let world = world();
        let a = ClaimantRef::player(Uuid::new_v4());
        let b = ClaimantRef::player(Uuid::new_v4());
        world.update_whole_owner(ChunkPos::new(0, 0), Some(a)).unwrap();
        world.update_slice_owner(ChunkPos::new(1, 0), Some(a), 10, 0).unwrap();
        world.update_slice_owner(ChunkPos::new(1, 0), Some(b), 20, 11).unwrap();
        world
            .update_whole_owner(ChunkPos::new(2, 0), Some(ClaimantRef::spawn()))
            .unwrap();

        assert_eq!(world.release_owner(a), 2);
        assert_eq!(world.claimed_columns(a), 0);
        assert_eq!(world.len(), 2);
        assert_eq!(world.reset(), 1);
        assert_eq!(world.claimed_positions(), vec![ChunkPos::new(2, 0)]);
    }

    #[test]
    fn test_concurrent_slice_edits_on_one_column() {
        let world = world();
        let chunk = ChunkPos::new(0, 0);
        let owners: Vec<ClaimantRef> = (0..8).map(|_| ClaimantRef::player(Uuid::new_v4())).collect();

        std::thread::scope(|scope| {
            for (i, owner) in owners.iter().enumerate() {
                let world = &world;
                scope.spawn(move || {
                    for round in 0..50 {
                        let lower = ((i as i32 * 37 + round * 11) % 300) - 64;
                        world
                            .update_slice_owner(chunk, Some(*owner), lower + 20, lower)
                            .unwrap();
                        let _ = world.can_player_do(
                            Permission::Blocks,
                            owner.id,
                            BlockPos::new(0, lower, 0),
                        );
                    }
                });
            }
        });

        let column = world.column(chunk).unwrap();
        let slice = column.slice().unwrap();
        assert!(slice.is_consistent());
    }
}
