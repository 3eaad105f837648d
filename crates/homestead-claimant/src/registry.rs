//! Claim registry: the single authoritative map from id to [`Claimant`].
//!
//! Players are loaded lazily on first lookup. Towns are all loaded up front
//! by [`ClaimRegistry::load_towns`] and indexed by id, lowercase name and
//! member. The town roster is the only record of membership; the member
//! index is derived from it and only changed by registry operations.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::claimant::{Claimant, ClaimantPlayer, ClaimantRef, ClaimantTown, is_server};
use crate::context::ClaimContext;
use crate::notify::ClaimEvent;
use crate::outcome::{Outcome, Rejection};
use crate::rank::Rank;
use crate::record::{ClaimantKind, ClaimantRecord, Role};
use crate::store::StoreError;

/// Roster rank given to a player who accepts an invite.
pub const DEFAULT_MEMBER_RANK: Rank = Rank::Ally;

/// What remains of a town after [`ClaimRegistry::delete_town`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisbandedTown {
    /// Former town id.
    pub id: Uuid,
    /// Former town name.
    pub name: String,
    /// Former roster, owner included.
    pub members: Vec<Uuid>,
}

/// Process-wide claimant cache fronting a [`ClaimStore`](crate::ClaimStore).
pub struct ClaimRegistry {
    ctx: Arc<ClaimContext>,
    players: DashMap<Uuid, Arc<Claimant>>,
    towns: DashMap<Uuid, Arc<Claimant>>,
    /// Lowercase town name to town id.
    town_names: DashMap<String, Uuid>,
    /// Player id to town id, derived from rosters.
    memberships: DashMap<Uuid, Uuid>,
    /// Serializes operations that touch more than one index.
    town_lock: Mutex<()>,
}

impl ClaimRegistry {
    /// Creates an empty registry. Call [`load_towns`](Self::load_towns) to
    /// populate the town cache from the store.
    pub fn new(ctx: ClaimContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            players: DashMap::new(),
            towns: DashMap::new(),
            town_names: DashMap::new(),
            memberships: DashMap::new(),
            town_lock: Mutex::new(()),
        }
    }

    /// Creates a registry and loads every stored town.
    pub fn open(ctx: ClaimContext) -> Result<Self, StoreError> {
        let registry = Self::new(ctx);
        registry.load_towns()?;
        Ok(registry)
    }

    /// Shared services and rules.
    pub fn context(&self) -> &Arc<ClaimContext> {
        &self.ctx
    }

    /// Loads every stored town and rebuilds the name and member indexes.
    ///
    /// A town whose name is already taken, or a member already listed by
    /// another town, is skipped with a warning. Returns the number of towns
    /// added.
    pub fn load_towns(&self) -> Result<usize, StoreError> {
        let records = self.ctx.store().load_all(ClaimantKind::Town)?;
        let _guard = self.town_lock.lock();
        let mut added = 0;
        for record in records {
            if self.towns.contains_key(&record.id) {
                continue;
            }
            let key = record.name.to_lowercase();
            if let Some(existing) = self.town_names.get(&key) {
                tracing::warn!(
                    "town {} skipped: name {:?} already used by {}",
                    record.id,
                    record.name,
                    *existing
                );
                continue;
            }
            let town = Arc::new(Claimant::new(record, Arc::clone(&self.ctx)));
            for member in town.members().into_keys() {
                if let Some(other) = self.memberships.get(&member) {
                    tracing::warn!(
                        "player {member} listed by towns {} and {}, keeping {}",
                        *other,
                        town.id(),
                        *other
                    );
                    continue;
                }
                self.memberships.insert(member, town.id());
            }
            self.town_names.insert(key, town.id());
            self.towns.insert(town.id(), town);
            added += 1;
        }
        tracing::info!("loaded {added} town(s)");
        Ok(added)
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Returns the player claimant for `id`, loading it on first use.
    ///
    /// Never fails: a missing or unreadable record yields a fresh claimant
    /// that is not written until its first change. Concurrent first lookups
    /// of the same id all receive the same instance.
    pub fn get_player_claim(&self, id: Uuid) -> ClaimantPlayer {
        if let Some(found) = self.players.get(&id) {
            return ClaimantPlayer::new(Arc::clone(found.value()));
        }

        let mut record = match self.ctx.store().load(ClaimantKind::Player, id) {
            Ok(Some(record)) => record,
            Ok(None) => ClaimantRecord::new_player(id),
            Err(err) => {
                tracing::warn!("player {id} could not be loaded, using defaults: {err}");
                ClaimantRecord::new_player(id)
            }
        };
        if let Role::Player { invites } = &mut record.role {
            let before = invites.len();
            invites.retain(|town| self.towns.contains_key(town));
            if invites.len() < before {
                tracing::debug!(
                    "player {id}: dropped {} invite(s) to unknown towns",
                    before - invites.len()
                );
            }
        }

        let entry = self
            .players
            .entry(id)
            .or_insert_with(|| Arc::new(Claimant::new(record, Arc::clone(&self.ctx))));
        ClaimantPlayer::new(Arc::clone(entry.value()))
    }

    /// Returns the player claimant only if it is already cached.
    pub fn player_if_loaded(&self, id: Uuid) -> Option<ClaimantPlayer> {
        self.players
            .get(&id)
            .map(|found| ClaimantPlayer::new(Arc::clone(found.value())))
    }

    /// Returns the town with `id`.
    pub fn get_town(&self, id: Uuid) -> Option<ClaimantTown> {
        self.towns
            .get(&id)
            .map(|found| ClaimantTown::new(Arc::clone(found.value())))
    }

    /// Returns the town called `name`, compared case-insensitively.
    pub fn get_town_claim(&self, name: &str) -> Option<ClaimantTown> {
        let id = *self.town_names.get(&name.trim().to_lowercase())?;
        self.get_town(id)
    }

    /// Every known town, sorted by name.
    pub fn town_caches(&self) -> Vec<ClaimantTown> {
        let mut towns: Vec<ClaimantTown> = self
            .towns
            .iter()
            .map(|entry| ClaimantTown::new(Arc::clone(entry.value())))
            .collect();
        towns.sort_by_cached_key(|town| town.name().to_lowercase());
        towns
    }

    /// Resolves a stored owner reference to the live claimant.
    ///
    /// Players always resolve. A town that no longer exists resolves to
    /// `None`.
    pub fn resolve(&self, owner: ClaimantRef) -> Option<Arc<Claimant>> {
        match owner.kind {
            ClaimantKind::Player => Some(Arc::clone(self.get_player_claim(owner.id).claimant())),
            ClaimantKind::Town => self.get_town(owner.id).map(|town| Arc::clone(town.claimant())),
        }
    }

    /// The town `player` belongs to.
    pub fn town_of(&self, player: Uuid) -> Option<ClaimantTown> {
        let town = *self.memberships.get(&player)?;
        self.get_town(town)
    }

    /// Number of cached players.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Number of known towns.
    pub fn town_count(&self) -> usize {
        self.towns.len()
    }

    // -----------------------------------------------------------------------
    // Town lifecycle
    // -----------------------------------------------------------------------

    /// Founds a town named `name` with `founder` as owner.
    pub fn make_town_claim(&self, founder: Uuid, name: &str) -> Result<ClaimantTown, Rejection> {
        if is_server(founder) {
            return Err(Rejection::ReservedIdentity);
        }
        let name = self
            .ctx
            .town_names()
            .normalize(name)
            .ok_or_else(|| Rejection::InvalidTownName(name.to_string()))?;

        let _guard = self.town_lock.lock();
        if let Some(town) = self.memberships.get(&founder) {
            return Err(Rejection::AlreadyInTown {
                player: founder,
                town: *town,
            });
        }
        let key = name.to_lowercase();
        if self.town_names.contains_key(&key) {
            return Err(Rejection::TownNameTaken(name));
        }

        let mut id = Uuid::new_v4();
        while is_server(id) || self.towns.contains_key(&id) {
            id = Uuid::new_v4();
        }
        let town = Arc::new(Claimant::new(
            ClaimantRecord::new_town(id, name.as_str(), founder),
            Arc::clone(&self.ctx),
        ));
        self.towns.insert(id, Arc::clone(&town));
        self.town_names.insert(key, id);
        self.memberships.insert(founder, id);
        town.touch();

        let player = self.get_player_claim(founder);
        player.set_invite(id, false);

        tracing::info!("town {name:?} ({id}) founded by {founder}");
        self.ctx.notify(ClaimEvent::TownJoined { player: founder, town: id });
        self.ctx.notify(ClaimEvent::CommandsChanged { player: founder });
        Ok(ClaimantTown::new(town))
    }

    /// Renames a town. Owner only.
    pub fn rename_town(&self, actor: Uuid, town: Uuid, name: &str) -> Result<Outcome, Rejection> {
        let town = self.owned_town(actor, town)?;
        let name = self
            .ctx
            .town_names()
            .normalize(name)
            .ok_or_else(|| Rejection::InvalidTownName(name.to_string()))?;

        let _guard = self.town_lock.lock();
        self.ensure_live(&town)?;
        let key = name.to_lowercase();
        if let Some(existing) = self.town_names.get(&key)
            && *existing != town.id()
        {
            return Err(Rejection::TownNameTaken(name));
        }
        let old = town.name();
        if old == name {
            return Ok(Outcome::Unchanged);
        }
        self.town_names.remove(&old.to_lowercase());
        self.town_names.insert(key, town.id());
        town.set_name(&name);
        tracing::info!("town {} renamed from {old:?} to {name:?}", town.id());
        Ok(Outcome::Applied)
    }

    /// Disbands a town. Owner only.
    ///
    /// Clears the roster and every index entry, deletes the stored record,
    /// and tells each former member their commands changed. Land owned by
    /// the town is not touched here; callers release it first.
    pub fn delete_town(&self, actor: Uuid, town: Uuid) -> Result<DisbandedTown, Rejection> {
        let town = self.owned_town(actor, town)?;
        let _guard = self.town_lock.lock();
        self.ensure_live(&town)?;
        let id = town.id();
        let name = town.name();
        let members: Vec<Uuid> = town.members().into_keys().collect();

        self.towns.remove(&id);
        self.town_names.remove(&name.to_lowercase());
        for member in &members {
            self.memberships.remove_if(member, |_, joined| *joined == id);
        }
        // Uncached players drop the invite when they are next loaded.
        for player in self.pending_invites(id) {
            if let Some(player) = self.player_if_loaded(player) {
                player.set_invite(id, false);
            }
        }
        town.retire();

        tracing::info!("town {name:?} ({id}) disbanded with {} member(s)", members.len());
        self.ctx.notify(ClaimEvent::TownDisbanded {
            town: id,
            members: members.clone(),
        });
        for member in &members {
            self.ctx.notify(ClaimEvent::CommandsChanged { player: *member });
        }
        Ok(DisbandedTown { id, name, members })
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Invites `player` to `town`. Owner only.
    pub fn invite_to_town(
        &self,
        actor: Uuid,
        town: Uuid,
        player: Uuid,
    ) -> Result<Outcome, Rejection> {
        let town = self.owned_town(actor, town)?;
        if is_server(player) {
            return Err(Rejection::ReservedIdentity);
        }
        let _guard = self.town_lock.lock();
        self.ensure_live(&town)?;
        if let Some(current) = self.memberships.get(&player) {
            return Err(Rejection::AlreadyInTown {
                player,
                town: *current,
            });
        }
        let invited = self.get_player_claim(player).set_invite(town.id(), true);
        if invited {
            self.ctx.notify(ClaimEvent::TownInvite {
                player,
                town: town.id(),
            });
        }
        Ok(Outcome::from_changed(invited))
    }

    /// Accepts a pending invite. The player joins with
    /// [`DEFAULT_MEMBER_RANK`].
    pub fn join_town(&self, player: Uuid, town: Uuid) -> Result<Outcome, Rejection> {
        let town = self
            .get_town(town)
            .ok_or_else(|| Rejection::UnknownTown(town.to_string()))?;
        let claimant = self.get_player_claim(player);

        let _guard = self.town_lock.lock();
        self.ensure_live(&town)?;
        if let Some(current) = self.memberships.get(&player) {
            return Err(Rejection::AlreadyInTown {
                player,
                town: *current,
            });
        }
        if !claimant.has_invite(town.id()) {
            return Err(Rejection::NotInvited {
                player,
                town: town.id(),
            });
        }
        town.set_member(player, Some(DEFAULT_MEMBER_RANK));
        self.memberships.insert(player, town.id());
        claimant.set_invite(town.id(), false);

        tracing::info!("player {player} joined town {}", town.id());
        self.ctx.notify(ClaimEvent::TownJoined {
            player,
            town: town.id(),
        });
        self.ctx.notify(ClaimEvent::CommandsChanged { player });
        Ok(Outcome::Applied)
    }

    /// Removes `player` from `town` at their own request.
    pub fn leave_town(&self, player: Uuid, town: Uuid) -> Result<Outcome, Rejection> {
        let town = self
            .get_town(town)
            .ok_or_else(|| Rejection::UnknownTown(town.to_string()))?;
        let _guard = self.town_lock.lock();
        self.ensure_live(&town)?;
        self.remove_member(&town, player)
    }

    /// Removes `player` from `town`. Owner only.
    pub fn kick_member(&self, actor: Uuid, town: Uuid, player: Uuid) -> Result<Outcome, Rejection> {
        let town = self.owned_town(actor, town)?;
        let _guard = self.town_lock.lock();
        self.ensure_live(&town)?;
        self.remove_member(&town, player)
    }

    /// Changes the roster rank of a member. Owner only.
    ///
    /// Granting [`Rank::Owner`] transfers ownership. The owner's own roster
    /// rank cannot be changed any other way.
    pub fn set_member_rank(
        &self,
        actor: Uuid,
        town: Uuid,
        player: Uuid,
        rank: Rank,
    ) -> Result<Outcome, Rejection> {
        if rank == Rank::Owner {
            return self.transfer_town(actor, town, player);
        }
        let town = self.owned_town(actor, town)?;
        let _guard = self.town_lock.lock();
        self.ensure_live(&town)?;
        if player == town.owner() {
            return Err(Rejection::SelfRankChange);
        }
        if !town.is_member(player) {
            return Err(Rejection::NotAMember {
                player,
                town: town.id(),
            });
        }
        let changed = town.set_member(player, Some(rank));
        if changed {
            self.ctx.notify(ClaimEvent::RankChanged {
                claimant: town.id(),
                target: player,
                rank: Some(rank),
            });
        }
        Ok(Outcome::from_changed(changed))
    }

    /// Hands the town to another member. Owner only.
    pub fn transfer_town(
        &self,
        actor: Uuid,
        town: Uuid,
        new_owner: Uuid,
    ) -> Result<Outcome, Rejection> {
        let town = self.owned_town(actor, town)?;
        let _guard = self.town_lock.lock();
        self.ensure_live(&town)?;
        if !town.is_member(new_owner) {
            return Err(Rejection::NotAMember {
                player: new_owner,
                town: town.id(),
            });
        }
        let previous = town.owner();
        if !town.transfer_owner(new_owner) {
            return Ok(Outcome::Unchanged);
        }
        tracing::info!("town {} transferred from {previous} to {new_owner}", town.id());
        self.ctx.notify(ClaimEvent::CommandsChanged { player: previous });
        self.ctx.notify(ClaimEvent::CommandsChanged { player: new_owner });
        Ok(Outcome::Applied)
    }

    fn remove_member(&self, town: &ClaimantTown, player: Uuid) -> Result<Outcome, Rejection> {
        if player == town.owner() {
            return Err(Rejection::OwnerCannotLeave(town.id()));
        }
        if !town.set_member(player, None) {
            return Err(Rejection::NotAMember {
                player,
                town: town.id(),
            });
        }
        self.memberships.remove_if(&player, |_, id| *id == town.id());
        tracing::info!("player {player} left town {}", town.id());
        self.ctx.notify(ClaimEvent::TownLeft {
            player,
            town: town.id(),
        });
        self.ctx.notify(ClaimEvent::CommandsChanged { player });
        Ok(Outcome::Applied)
    }

    /// Fails if `town` was deleted after it was looked up. Call with
    /// `town_lock` held.
    fn ensure_live(&self, town: &ClaimantTown) -> Result<(), Rejection> {
        if self.towns.contains_key(&town.id()) {
            Ok(())
        } else {
            Err(Rejection::UnknownTown(town.id().to_string()))
        }
    }

    /// Looks up `town` and checks that `actor` owns it or is the server.
    fn owned_town(&self, actor: Uuid, town: Uuid) -> Result<ClaimantTown, Rejection> {
        let town = self
            .get_town(town)
            .ok_or_else(|| Rejection::UnknownTown(town.to_string()))?;
        if actor != town.owner() && !is_server(actor) {
            return Err(Rejection::NotTownOwner(town.id()));
        }
        Ok(town)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Writes every dirty claimant. Every claimant is attempted; the first
    /// failure is returned after the pass. Returns the number written.
    pub fn save_all(&self) -> Result<usize, StoreError> {
        let dirty: Vec<Arc<Claimant>> = self
            .players
            .iter()
            .chain(self.towns.iter())
            .filter(|entry| entry.value().is_dirty())
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut saved = 0;
        let mut first_error = None;
        for claimant in dirty {
            match claimant.save() {
                Ok(()) => saved += 1,
                Err(err) => {
                    tracing::warn!("claimant {} not saved: {err}", claimant.id());
                    first_error.get_or_insert(err);
                }
            }
        }
        tracing::debug!("save pass wrote {saved} claimant(s)");
        match first_error {
            Some(err) => Err(err),
            None => Ok(saved),
        }
    }

    /// Drops a player from the cache, writing it first if dirty.
    ///
    /// Returns `false` if the player stays cached: the write failed, a
    /// handle to it is still held elsewhere, or it changed again after the
    /// write. Towns are never evicted.
    pub fn evict(&self, player: Uuid) -> bool {
        let Some(claimant) = self
            .players
            .get(&player)
            .map(|entry| Arc::clone(entry.value()))
        else {
            return true;
        };
        if claimant.is_dirty()
            && let Err(err) = claimant.save()
        {
            tracing::warn!("player {player} kept in cache: {err}");
            return false;
        }
        drop(claimant);
        let removed = self
            .players
            .remove_if(&player, |_, cached| {
                Arc::strong_count(cached) == 1 && !cached.is_dirty()
            })
            .is_some();
        if !removed && self.players.contains_key(&player) {
            tracing::debug!("player {player} still in use, kept in cache");
            return false;
        }
        true
    }

    /// Ids of every cached player with a pending invite to `town`.
    pub fn pending_invites(&self, town: Uuid) -> BTreeSet<Uuid> {
        self.players
            .iter()
            .filter(|entry| entry.value().has_invite(town))
            .map(|entry| *entry.key())
            .collect()
    }
}

impl ClaimantPlayer {
    /// The town this player belongs to.
    pub fn town(&self, registry: &ClaimRegistry) -> Option<ClaimantTown> {
        registry.town_of(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ChannelListener;
    use crate::rank::{ClaimSetting, Permission};
    use crate::store::{ClaimStore, MemoryStore, RonFileStore};

    fn registry() -> (ClaimRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let registry = ClaimRegistry::new(ClaimContext::new(Arc::clone(&store) as Arc<dyn ClaimStore>));
        (registry, store)
    }

    #[test]
    fn test_get_player_claim_defaults_without_writing() {
        let (registry, store) = registry();
        let id = Uuid::new_v4();
        let player = registry.get_player_claim(id);
        assert_eq!(player.id(), id);
        assert!(player.friends().is_empty());
        assert!(store.is_empty());
        assert!(Arc::ptr_eq(
            player.claimant(),
            registry.get_player_claim(id).claimant()
        ));
    }

    #[test]
    fn test_concurrent_lookup_yields_single_instance() {
        let (registry, _store) = registry();
        let id = Uuid::new_v4();
        let handles: Vec<Arc<Claimant>> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| Arc::clone(registry.get_player_claim(id).claimant())))
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });
        assert!(handles.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(registry.player_count(), 1);
    }

    #[test]
    fn test_player_state_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        let friend = Uuid::new_v4();
        {
            let registry = ClaimRegistry::new(ClaimContext::new(Arc::new(RonFileStore::new(dir.path()))));
            let player = registry.get_player_claim(id);
            player.update_friend(friend, Some(Rank::Ally)).unwrap();
            player.update_permission(Permission::Storage, Rank::Owner);
            player.update_setting(ClaimSetting::FireSpread, true);
        }
        let registry = ClaimRegistry::new(ClaimContext::new(Arc::new(RonFileStore::new(dir.path()))));
        let player = registry.get_player_claim(id);
        assert_eq!(player.friend_rank(friend), Rank::Ally);
        assert_eq!(player.permission_requirement(Permission::Storage), Rank::Owner);
        assert!(player.setting(ClaimSetting::FireSpread));
    }

    #[test]
    fn test_make_town_claim_registers_founder() {
        let (registry, store) = registry();
        let founder = Uuid::new_v4();
        let town = registry.make_town_claim(founder, "Rivendell").unwrap();

        assert_eq!(town.owner(), founder);
        assert_eq!(town.friend_rank(founder), Rank::Owner);
        let found = registry.get_player_claim(founder).town(&registry).unwrap();
        assert_eq!(found.id(), town.id());
        assert_eq!(found.owner(), founder);
        assert!(store.get(ClaimantKind::Town, town.id()).is_some());
        assert_eq!(
            town.update_friend(town.id(), Some(Rank::Enemy)),
            Err(Rejection::SelfRankChange)
        );
    }

    #[test]
    fn test_town_names_are_case_insensitive() {
        let (registry, _store) = registry();
        registry.make_town_claim(Uuid::new_v4(), "Rivendell").unwrap();
        assert_eq!(
            registry.make_town_claim(Uuid::new_v4(), "RIVENDELL").unwrap_err(),
            Rejection::TownNameTaken("RIVENDELL".to_string())
        );
        assert!(registry.get_town_claim("rivendell").is_some());
        assert!(matches!(
            registry.make_town_claim(Uuid::new_v4(), "bad name"),
            Err(Rejection::InvalidTownName(_))
        ));
    }

    #[test]
    fn test_founder_cannot_found_twice() {
        let (registry, _store) = registry();
        let founder = Uuid::new_v4();
        let town = registry.make_town_claim(founder, "Bree").unwrap();
        assert_eq!(
            registry.make_town_claim(founder, "Archet").unwrap_err(),
            Rejection::AlreadyInTown {
                player: founder,
                town: town.id()
            }
        );
    }

    #[test]
    fn test_invite_join_leave_cycle() {
        let (registry, _store) = registry();
        let owner = Uuid::new_v4();
        let player = Uuid::new_v4();
        let town = registry.make_town_claim(owner, "Bree").unwrap();

        assert_eq!(
            registry.join_town(player, town.id()),
            Err(Rejection::NotInvited {
                player,
                town: town.id()
            })
        );
        assert_eq!(
            registry.invite_to_town(player, town.id(), player),
            Err(Rejection::NotTownOwner(town.id()))
        );
        assert_eq!(registry.invite_to_town(owner, town.id(), player), Ok(Outcome::Applied));
        assert_eq!(registry.invite_to_town(owner, town.id(), player), Ok(Outcome::Unchanged));
        assert_eq!(registry.join_town(player, town.id()), Ok(Outcome::Applied));

        assert_eq!(town.friend_rank(player), DEFAULT_MEMBER_RANK);
        assert!(registry.get_player_claim(player).invites().is_empty());
        assert_eq!(registry.town_of(player).unwrap().id(), town.id());

        assert_eq!(
            registry.leave_town(owner, town.id()),
            Err(Rejection::OwnerCannotLeave(town.id()))
        );
        assert_eq!(registry.leave_town(player, town.id()), Ok(Outcome::Applied));
        assert!(registry.town_of(player).is_none());
        assert_eq!(town.friend_rank(player), Rank::Enemy);
    }

    #[test]
    fn test_explicit_demotion_of_member_is_respected() {
        let (registry, _store) = registry();
        let owner = Uuid::new_v4();
        let player = Uuid::new_v4();
        let town = registry.make_town_claim(owner, "Bree").unwrap();
        registry.invite_to_town(owner, town.id(), player).unwrap();
        registry.join_town(player, town.id()).unwrap();

        town.update_friend(player, Some(Rank::Passive)).unwrap();
        assert_eq!(town.friend_rank(player), Rank::Passive);
        assert!(!town.can_player_do(player, Permission::Blocks));
    }

    #[test]
    fn test_set_member_rank_and_transfer() {
        let (registry, _store) = registry();
        let owner = Uuid::new_v4();
        let player = Uuid::new_v4();
        let town = registry.make_town_claim(owner, "Bree").unwrap();
        registry.invite_to_town(owner, town.id(), player).unwrap();
        registry.join_town(player, town.id()).unwrap();

        assert_eq!(
            registry.set_member_rank(owner, town.id(), player, Rank::Passive),
            Ok(Outcome::Applied)
        );
        assert_eq!(town.member_rank(player), Some(Rank::Passive));
        assert_eq!(
            registry.set_member_rank(owner, town.id(), owner, Rank::Ally),
            Err(Rejection::SelfRankChange)
        );
        assert_eq!(
            registry.set_member_rank(owner, town.id(), player, Rank::Owner),
            Ok(Outcome::Applied)
        );
        assert_eq!(town.owner(), player);
        assert_eq!(town.member_rank(owner), Some(Rank::Ally));
        assert_eq!(
            registry.kick_member(owner, town.id(), player),
            Err(Rejection::NotTownOwner(town.id()))
        );
        assert_eq!(registry.kick_member(player, town.id(), owner), Ok(Outcome::Applied));
        assert!(registry.town_of(owner).is_none());
    }

    #[test]
    fn test_rename_updates_name_index() {
        let (registry, _store) = registry();
        let owner = Uuid::new_v4();
        let town = registry.make_town_claim(owner, "Bree").unwrap();
        registry.make_town_claim(Uuid::new_v4(), "Archet").unwrap();

        assert_eq!(
            registry.rename_town(owner, town.id(), "archet"),
            Err(Rejection::TownNameTaken("archet".to_string()))
        );
        assert_eq!(registry.rename_town(owner, town.id(), "Staddle"), Ok(Outcome::Applied));
        assert!(registry.get_town_claim("bree").is_none());
        assert_eq!(registry.get_town_claim("staddle").unwrap().id(), town.id());
        assert_eq!(registry.rename_town(owner, town.id(), "Staddle"), Ok(Outcome::Unchanged));
    }

    #[test]
    fn test_delete_town_clears_indexes_and_store() {
        let store = Arc::new(MemoryStore::new());
        let (listener, events) = ChannelListener::new(32);
        let registry = ClaimRegistry::new(
            ClaimContext::new(Arc::clone(&store) as Arc<dyn ClaimStore>)
                .with_listener(Arc::new(listener)),
        );
        let owner = Uuid::new_v4();
        let member = Uuid::new_v4();
        let invitee = Uuid::new_v4();
        let town = registry.make_town_claim(owner, "Bree").unwrap();
        registry.invite_to_town(owner, town.id(), member).unwrap();
        registry.join_town(member, town.id()).unwrap();
        registry.invite_to_town(owner, town.id(), invitee).unwrap();

        assert_eq!(
            registry.delete_town(member, town.id()),
            Err(Rejection::NotTownOwner(town.id()))
        );
        let disbanded = registry.delete_town(owner, town.id()).unwrap();
        assert_eq!(disbanded.members.len(), 2);
        assert!(registry.get_town(town.id()).is_none());
        assert!(registry.get_town_claim("Bree").is_none());
        assert!(registry.town_of(member).is_none());
        assert!(registry.get_player_claim(invitee).invites().is_empty());
        assert!(store.get(ClaimantKind::Town, town.id()).is_none());
        assert!(registry.town_caches().is_empty());

        let received: Vec<ClaimEvent> = events.try_iter().collect();
        assert!(received.contains(&ClaimEvent::TownDisbanded {
            town: town.id(),
            members: disbanded.members.clone()
        }));
        assert!(received.contains(&ClaimEvent::CommandsChanged { player: member }));
    }

    #[test]
    fn test_server_may_administer_towns() {
        let (registry, _store) = registry();
        let town = registry.make_town_claim(Uuid::new_v4(), "Bree").unwrap();
        assert_eq!(
            registry.rename_town(crate::SPAWN_ID, town.id(), "Archet"),
            Ok(Outcome::Applied)
        );
        assert!(registry.delete_town(crate::SPAWN_ID, town.id()).is_ok());
    }

    #[test]
    fn test_load_towns_rebuilds_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let owner = Uuid::new_v4();
        let member = Uuid::new_v4();
        let town_id = {
            let registry = ClaimRegistry::new(ClaimContext::new(Arc::new(RonFileStore::new(dir.path()))));
            let town = registry.make_town_claim(owner, "Rivendell").unwrap();
            registry.invite_to_town(owner, town.id(), member).unwrap();
            registry.join_town(member, town.id()).unwrap();
            town.id()
        };
        let registry = ClaimRegistry::open(ClaimContext::new(Arc::new(RonFileStore::new(dir.path())))).unwrap();
        assert_eq!(registry.town_count(), 1);
        assert_eq!(registry.get_town_claim("RIVENDELL").unwrap().id(), town_id);
        assert_eq!(registry.town_of(member).unwrap().id(), town_id);
        assert_eq!(registry.town_of(owner).unwrap().owner(), owner);
    }

    #[test]
    fn test_save_all_flushes_deferred_changes() {
        let store = Arc::new(MemoryStore::new());
        let registry = ClaimRegistry::new(
            ClaimContext::new(Arc::clone(&store) as Arc<dyn ClaimStore>).with_save_on_mutation(false),
        );
        let player = registry.get_player_claim(Uuid::new_v4());
        player.update_friend(Uuid::new_v4(), Some(Rank::Ally)).unwrap();
        assert!(player.is_dirty());
        assert!(store.is_empty());

        assert_eq!(registry.save_all().unwrap(), 1);
        assert!(!player.is_dirty());
        assert_eq!(store.len(), 1);
        assert_eq!(registry.save_all().unwrap(), 0);
    }

    #[test]
    fn test_save_all_reports_failure() {
        let store = Arc::new(MemoryStore::new());
        let registry = ClaimRegistry::new(ClaimContext::new(Arc::clone(&store) as Arc<dyn ClaimStore>));
        let player = registry.get_player_claim(Uuid::new_v4());
        store.set_read_only(true);
        player.update_setting(ClaimSetting::Pvp, true);
        assert!(matches!(registry.save_all(), Err(StoreError::ReadOnly)));
        assert!(player.is_dirty());
        let id = player.id();
        drop(player);
        assert!(!registry.evict(id));

        store.set_read_only(false);
        assert!(registry.evict(id));
        assert_eq!(registry.player_count(), 0);
        assert!(registry.get_player_claim(id).setting(ClaimSetting::Pvp));
    }

    #[test]
    fn test_evict_keeps_player_while_handle_is_held() {
        let (registry, _store) = registry();
        let id = Uuid::new_v4();
        let ally = Uuid::new_v4();
        let held = registry.get_player_claim(id);

        assert!(!registry.evict(id));
        let fresh = registry.get_player_claim(id);
        assert!(Arc::ptr_eq(held.claimant(), fresh.claimant()));
        held.update_friend(ally, Some(Rank::Ally)).unwrap();
        assert_eq!(fresh.friend_rank(ally), Rank::Ally);

        drop(held);
        drop(fresh);
        assert!(registry.evict(id));
        assert_eq!(registry.player_count(), 0);
        assert_eq!(registry.get_player_claim(id).friend_rank(ally), Rank::Ally);
    }

    #[test]
    fn test_evict_keeps_deferred_change_until_saved() {
        let store = Arc::new(MemoryStore::new());
        let registry = ClaimRegistry::new(
            ClaimContext::new(Arc::clone(&store) as Arc<dyn ClaimStore>).with_save_on_mutation(false),
        );
        let id = Uuid::new_v4();
        registry
            .get_player_claim(id)
            .update_setting(ClaimSetting::Pvp, true);
        assert!(store.is_empty());

        assert!(registry.evict(id));
        assert!(store.get(ClaimantKind::Player, id).is_some());
        assert!(registry.get_player_claim(id).setting(ClaimSetting::Pvp));
    }

    #[test]
    fn test_stale_town_handle_cannot_resurrect_town() {
        let dir = tempfile::tempdir().unwrap();
        let founder = Uuid::new_v4();
        let registry = ClaimRegistry::new(ClaimContext::new(Arc::new(RonFileStore::new(dir.path()))));
        let town = registry.make_town_claim(founder, "Bree").unwrap();
        let stale = registry.get_town_claim("bree").unwrap();
        registry.delete_town(founder, town.id()).unwrap();

        assert!(stale.is_retired());
        assert_eq!(stale.update_setting(ClaimSetting::Pvp, true), Outcome::Unchanged);
        assert_eq!(
            stale.update_friend(Uuid::new_v4(), Some(Rank::Ally)),
            Ok(Outcome::Unchanged)
        );
        stale.save().unwrap();
        assert_eq!(
            registry.rename_town(founder, town.id(), "Archet"),
            Err(Rejection::UnknownTown(town.id().to_string()))
        );
        assert_eq!(
            registry.delete_town(founder, town.id()),
            Err(Rejection::UnknownTown(town.id().to_string()))
        );

        let reopened = ClaimRegistry::open(ClaimContext::new(Arc::new(RonFileStore::new(dir.path())))).unwrap();
        assert_eq!(reopened.town_count(), 0);
        assert!(reopened.town_of(founder).is_none());
        assert!(reopened.get_town_claim("Bree").is_none());
        assert!(reopened.make_town_claim(founder, "Bree").is_ok());
    }

    #[test]
    fn test_loading_player_drops_invites_to_unknown_towns() {
        let (registry, store) = registry();
        let owner = Uuid::new_v4();
        let town = registry.make_town_claim(owner, "Bree").unwrap();
        let gone = Uuid::new_v4();
        let id = Uuid::new_v4();
        let mut record = ClaimantRecord::new_player(id);
        if let Role::Player { invites } = &mut record.role {
            invites.insert(gone);
            invites.insert(town.id());
        }
        store.save(&record).unwrap();

        let player = registry.get_player_claim(id);
        assert_eq!(player.invites(), BTreeSet::from([town.id()]));
        assert_eq!(registry.pending_invites(town.id()), BTreeSet::from([id]));
        assert!(registry.pending_invites(gone).is_empty());
    }
}
