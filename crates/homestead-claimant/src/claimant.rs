//! Live claimants: players and towns that own land and rank other players.
//!
//! A [`Claimant`] is owned by the [`ClaimRegistry`](crate::ClaimRegistry)
//! and shared by `Arc`. Chunks and slices only store a [`ClaimantRef`], so
//! every rank or setting change is visible everywhere as soon as it is made.
//!
//! Rank resolution order for an actor is: the claimant itself, the server
//! identity, an explicit grant, town roster membership, and finally
//! [`Rank::Enemy`].

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::ClaimContext;
use crate::notify::ClaimEvent;
use crate::outcome::{Access, Outcome, Rejection};
use crate::rank::{ClaimSetting, Permission, Rank};
use crate::record::{ClaimantKind, ClaimantRecord, Role};
use crate::store::StoreError;

/// Reserved identity of the server ("world spawn"). No player can outrank it
/// and it can never be the target of a rank change.
pub const SPAWN_ID: Uuid = Uuid::nil();

/// Returns `true` for the reserved server identity.
pub fn is_server(id: Uuid) -> bool {
    id == SPAWN_ID
}

// ---------------------------------------------------------------------------
// ClaimantRef
// ---------------------------------------------------------------------------

/// Id plus kind: what chunks and slices store instead of the claimant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClaimantRef {
    /// Claimant id.
    pub id: Uuid,
    /// Claimant kind, used to pick the right registry table.
    pub kind: ClaimantKind,
}

impl ClaimantRef {
    /// Reference to a player claimant.
    pub fn player(id: Uuid) -> Self {
        Self {
            id,
            kind: ClaimantKind::Player,
        }
    }

    /// Reference to a town claimant.
    pub fn town(id: Uuid) -> Self {
        Self {
            id,
            kind: ClaimantKind::Town,
        }
    }

    /// Reference to the server-owned spawn claimant.
    pub fn spawn() -> Self {
        Self::player(SPAWN_ID)
    }

    /// Returns `true` if this refers to the server identity.
    pub fn is_spawn(self) -> bool {
        is_server(self.id)
    }
}

// ---------------------------------------------------------------------------
// Claimant
// ---------------------------------------------------------------------------

/// A player or town with ranks, permission overrides and settings.
pub struct Claimant {
    id: Uuid,
    kind: ClaimantKind,
    record: RwLock<ClaimantRecord>,
    /// Serializes store writes so the last write carries the newest state.
    save_lock: Mutex<()>,
    dirty: AtomicBool,
    /// Set once the registry deletes the claimant. Nothing is written after.
    retired: AtomicBool,
    ctx: Arc<ClaimContext>,
}

impl std::fmt::Debug for Claimant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Claimant")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("dirty", &self.is_dirty())
            .field("retired", &self.is_retired())
            .finish()
    }
}

impl Claimant {
    pub(crate) fn new(record: ClaimantRecord, ctx: Arc<ClaimContext>) -> Self {
        Self {
            id: record.id,
            kind: record.kind(),
            record: RwLock::new(record),
            save_lock: Mutex::new(()),
            dirty: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            ctx,
        }
    }

    /// Claimant id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Claimant kind; fixed at creation.
    pub fn kind(&self) -> ClaimantKind {
        self.kind
    }

    /// Reference suitable for storing in chunks and slices.
    pub fn reference(&self) -> ClaimantRef {
        ClaimantRef {
            id: self.id,
            kind: self.kind,
        }
    }

    /// Display name.
    pub fn name(&self) -> String {
        self.record.read().name.clone()
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> ClaimantRecord {
        self.record.read().clone()
    }

    /// Returns `true` if in-memory state has not reached the store yet.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Returns `true` once the registry has deleted this claimant. A retired
    /// claimant ignores every change and is never written again.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    // --- Rank resolution ---

    /// Rank `actor` holds with this claimant.
    pub fn friend_rank(&self, actor: Uuid) -> Rank {
        if actor == self.id || is_server(actor) {
            return Rank::Owner;
        }
        let record = self.record.read();
        if let Some(&rank) = record.friends.get(&actor) {
            return rank;
        }
        if let Role::Town { members, .. } = &record.role
            && let Some(&rank) = members.get(&actor)
        {
            return rank;
        }
        Rank::Enemy
    }

    /// Rank required for `permission`: this claimant's override if present,
    /// else the server-wide table.
    pub fn permission_requirement(&self, permission: Permission) -> Rank {
        self.record
            .read()
            .permissions
            .get(&permission)
            .copied()
            .unwrap_or_else(|| self.ctx.permissions().required(permission))
    }

    /// Full permission check for `actor` inside a claim owned by `self`.
    pub fn access(&self, actor: Uuid, permission: Permission) -> Access {
        if actor == self.id {
            return Access::Owner;
        }
        if is_server(actor) {
            return Access::Server;
        }
        Access::from_ranks(
            self.friend_rank(actor),
            self.permission_requirement(permission),
        )
    }

    /// Returns `true` if `actor` may perform `permission` in this claim.
    pub fn can_player_do(&self, actor: Uuid, permission: Permission) -> bool {
        self.access(actor, permission).is_allowed()
    }

    /// Returns `true` if `actor` holds at least [`Rank::Ally`].
    pub fn is_friend(&self, actor: Uuid) -> bool {
        self.friend_rank(actor).can_perform(Rank::Ally)
    }

    /// Explicit grants, sorted by id.
    pub fn friends(&self) -> BTreeMap<Uuid, Rank> {
        self.record.read().friends.clone()
    }

    /// Current value of `setting`, falling back to the kind default.
    pub fn setting(&self, setting: ClaimSetting) -> bool {
        self.record
            .read()
            .settings
            .get(&setting)
            .copied()
            .unwrap_or_else(|| setting.claimed_default(self.kind))
    }

    // --- Mutation ---

    /// Sets (`Some`) or clears (`None`) the explicit rank of `actor`.
    ///
    /// A claimant cannot change its own rank, and the server identity cannot
    /// be ranked at all.
    pub fn update_friend(&self, actor: Uuid, rank: Option<Rank>) -> Result<Outcome, Rejection> {
        if actor == self.id {
            return Err(Rejection::SelfRankChange);
        }
        if is_server(actor) {
            return Err(Rejection::ReservedIdentity);
        }
        let changed = self.mutate(|record| match rank {
            Some(rank) => record.friends.insert(actor, rank) != Some(rank),
            None => record.friends.remove(&actor).is_some(),
        });
        if changed {
            tracing::debug!("claimant {} set rank of {actor} to {rank:?}", self.id);
            self.ctx.notify(ClaimEvent::RankChanged {
                claimant: self.id,
                target: actor,
                rank,
            });
        }
        Ok(Outcome::from_changed(changed))
    }

    /// Sets a claim-wide toggle.
    pub fn update_setting(&self, setting: ClaimSetting, value: bool) -> Outcome {
        let changed = self.mutate(|record| record.settings.insert(setting, value) != Some(value));
        if changed {
            self.ctx.notify(ClaimEvent::SettingChanged {
                claimant: self.id,
                setting,
                value,
            });
        }
        Outcome::from_changed(changed)
    }

    /// Overrides the rank required for `permission` in this claimant's land.
    pub fn update_permission(&self, permission: Permission, rank: Rank) -> Outcome {
        let changed =
            self.mutate(|record| record.permissions.insert(permission, rank) != Some(rank));
        if changed {
            self.ctx.notify(ClaimEvent::PermissionChanged {
                claimant: self.id,
                permission,
                rank,
            });
        }
        Outcome::from_changed(changed)
    }

    /// Writes the current state to the store and clears the dirty flag.
    pub fn save(&self) -> Result<(), StoreError> {
        let _guard = self.save_lock.lock();
        if self.is_retired() {
            return Ok(());
        }
        let record = self.snapshot();
        self.ctx.save(&record)?;
        self.dirty.store(false, Ordering::Release);
        Ok(())
    }

    /// Applies `change` under the write lock. When it reports a change the
    /// claimant is marked dirty and, if configured, written after the lock is
    /// released.
    pub(crate) fn mutate(&self, change: impl FnOnce(&mut ClaimantRecord) -> bool) -> bool {
        if self.is_retired() {
            return false;
        }
        let changed = {
            let mut record = self.record.write();
            change(&mut record)
        };
        if changed {
            self.dirty.store(true, Ordering::Release);
            if self.ctx.save_on_mutation() {
                self.flush();
            }
        }
        changed
    }

    /// Marks a freshly created claimant as changed so it reaches the store.
    pub(crate) fn touch(&self) {
        self.mutate(|_| true);
    }

    /// Deletes the stored record and stops all later writes.
    ///
    /// Runs under the save lock, so a write racing with retirement either
    /// lands before the delete or is skipped.
    pub(crate) fn retire(&self) {
        let _guard = self.save_lock.lock();
        self.retired.store(true, Ordering::Release);
        self.dirty.store(false, Ordering::Release);
        self.ctx.forget(&self.snapshot());
    }

    fn flush(&self) {
        let _guard = self.save_lock.lock();
        if self.is_retired() {
            return;
        }
        let record = self.snapshot();
        if self.ctx.persist(&record) {
            self.dirty.store(false, Ordering::Release);
        }
    }

    // --- Kind-specific reads ---

    /// Town owner, `None` for players.
    pub fn owner_id(&self) -> Option<Uuid> {
        match &self.record.read().role {
            Role::Town { owner, .. } => Some(*owner),
            Role::Player { .. } => None,
        }
    }

    /// Town roster, empty for players.
    pub fn members(&self) -> BTreeMap<Uuid, Rank> {
        match &self.record.read().role {
            Role::Town { members, .. } => members.clone(),
            Role::Player { .. } => BTreeMap::new(),
        }
    }

    /// Roster rank of `player`, `None` when not a member (or for players).
    pub fn member_rank(&self, player: Uuid) -> Option<Rank> {
        match &self.record.read().role {
            Role::Town { members, .. } => members.get(&player).copied(),
            Role::Player { .. } => None,
        }
    }

    /// Pending town invites, empty for towns.
    pub fn invites(&self) -> BTreeSet<Uuid> {
        match &self.record.read().role {
            Role::Player { invites } => invites.clone(),
            Role::Town { .. } => BTreeSet::new(),
        }
    }

    /// Returns `true` if `town` has a pending invite for this player.
    pub fn has_invite(&self, town: Uuid) -> bool {
        match &self.record.read().role {
            Role::Player { invites } => invites.contains(&town),
            Role::Town { .. } => false,
        }
    }

    // --- Kind-specific writes (registry only) ---

    pub(crate) fn set_name(&self, name: &str) -> bool {
        self.mutate(|record| {
            if record.name == name {
                return false;
            }
            record.name = name.to_string();
            true
        })
    }

    pub(crate) fn set_member(&self, player: Uuid, rank: Option<Rank>) -> bool {
        self.mutate(|record| match &mut record.role {
            Role::Town { members, .. } => match rank {
                Some(rank) => members.insert(player, rank) != Some(rank),
                None => members.remove(&player).is_some(),
            },
            Role::Player { .. } => false,
        })
    }

    /// Makes `new_owner` the owner and demotes the previous owner to ally.
    pub(crate) fn transfer_owner(&self, new_owner: Uuid) -> bool {
        self.mutate(|record| match &mut record.role {
            Role::Town { owner, members } => {
                if *owner == new_owner {
                    return false;
                }
                members.insert(*owner, Rank::Ally);
                members.insert(new_owner, Rank::Owner);
                *owner = new_owner;
                true
            }
            Role::Player { .. } => false,
        })
    }

    pub(crate) fn set_invite(&self, town: Uuid, pending: bool) -> bool {
        self.mutate(|record| match &mut record.role {
            Role::Player { invites } => {
                if pending {
                    invites.insert(town)
                } else {
                    invites.remove(&town)
                }
            }
            Role::Town { .. } => false,
        })
    }
}

// ---------------------------------------------------------------------------
// Typed handles
// ---------------------------------------------------------------------------

/// Handle to a claimant known to be a player.
#[derive(Clone, Debug)]
pub struct ClaimantPlayer(Arc<Claimant>);

/// Handle to a claimant known to be a town.
#[derive(Clone, Debug)]
pub struct ClaimantTown(Arc<Claimant>);

impl ClaimantPlayer {
    pub(crate) fn new(claimant: Arc<Claimant>) -> Self {
        debug_assert_eq!(claimant.kind(), ClaimantKind::Player);
        Self(claimant)
    }

    /// The shared claimant.
    pub fn claimant(&self) -> &Arc<Claimant> {
        &self.0
    }
}

impl ClaimantTown {
    pub(crate) fn new(claimant: Arc<Claimant>) -> Self {
        debug_assert_eq!(claimant.kind(), ClaimantKind::Town);
        Self(claimant)
    }

    /// The shared claimant.
    pub fn claimant(&self) -> &Arc<Claimant> {
        &self.0
    }

    /// Current owner. Always a roster member with [`Rank::Owner`].
    pub fn owner(&self) -> Uuid {
        self.0.owner_id().unwrap_or(SPAWN_ID)
    }

    /// Number of roster members, owner included.
    pub fn member_count(&self) -> usize {
        self.0.members().len()
    }

    /// Returns `true` if `player` is on the roster.
    pub fn is_member(&self, player: Uuid) -> bool {
        self.0.member_rank(player).is_some()
    }
}

impl Deref for ClaimantPlayer {
    type Target = Claimant;

    fn deref(&self) -> &Claimant {
        &self.0
    }
}

impl Deref for ClaimantTown {
    type Target = Claimant;

    fn deref(&self) -> &Claimant {
        &self.0
    }
}
