//! Ownership of a single chunk column.
//!
//! A column is either unclaimed, owned whole by one claimant, or divided into
//! Y intervals by a [`ClaimSlice`]. Never both: switching between whole and
//! sliced ownership discards the previous mode's data.

use std::collections::BTreeSet;

use homestead_claimant::{
    Access, ClaimRegistry, ClaimSetting, ClaimantRef, Outcome, Permission, is_server,
};
use uuid::Uuid;

use crate::pos::ColumnBounds;
use crate::slice::{ClaimSlice, owner_access};

/// Current ownership mode of a column.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ChunkOwnership {
    /// Nobody owns anything in the column.
    #[default]
    Unclaimed,
    /// One claimant owns the whole column.
    Whole(ClaimantRef),
    /// The column is divided into owned Y intervals. Never empty.
    Sliced(ClaimSlice),
}

/// Ownership state of one chunk column.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkClaim {
    bounds: ColumnBounds,
    ownership: ChunkOwnership,
}

impl ChunkClaim {
    /// An unclaimed column with the given limits.
    pub fn new(bounds: ColumnBounds) -> Self {
        Self {
            bounds,
            ownership: ChunkOwnership::Unclaimed,
        }
    }

    /// A column owned whole by `owner`.
    pub fn whole(bounds: ColumnBounds, owner: ClaimantRef) -> Self {
        Self {
            bounds,
            ownership: ChunkOwnership::Whole(owner),
        }
    }

    /// Vertical limits of the column.
    pub fn bounds(&self) -> ColumnBounds {
        self.bounds
    }

    /// Current ownership mode.
    pub fn ownership(&self) -> &ChunkOwnership {
        &self.ownership
    }

    /// Returns `true` if nothing in the column is owned.
    pub fn is_unclaimed(&self) -> bool {
        matches!(self.ownership, ChunkOwnership::Unclaimed)
    }

    /// The whole-column owner, if the column is not sliced.
    pub fn whole_owner(&self) -> Option<ClaimantRef> {
        match self.ownership {
            ChunkOwnership::Whole(owner) => Some(owner),
            _ => None,
        }
    }

    /// The slice, if the column is divided.
    pub fn slice(&self) -> Option<&ClaimSlice> {
        match &self.ownership {
            ChunkOwnership::Sliced(slice) => Some(slice),
            _ => None,
        }
    }

    /// Who owns height `y`.
    pub fn owner_at(&self, y: i32) -> Option<ClaimantRef> {
        match &self.ownership {
            ChunkOwnership::Unclaimed => None,
            ChunkOwnership::Whole(owner) => Some(*owner),
            ChunkOwnership::Sliced(slice) => slice.get(y).map(|claim| claim.owner),
        }
    }

    /// Every claimant owning part of the column.
    pub fn owners(&self) -> BTreeSet<ClaimantRef> {
        match &self.ownership {
            ChunkOwnership::Unclaimed => BTreeSet::new(),
            ChunkOwnership::Whole(owner) => BTreeSet::from([*owner]),
            ChunkOwnership::Sliced(slice) => slice.owners(),
        }
    }

    /// Returns `true` if `owner` owns any part of the column.
    pub fn is_owned_by(&self, owner: ClaimantRef) -> bool {
        match &self.ownership {
            ChunkOwnership::Unclaimed => false,
            ChunkOwnership::Whole(whole) => *whole == owner,
            ChunkOwnership::Sliced(slice) => slice.iter().any(|claim| claim.owner == owner),
        }
    }

    /// Returns `true` if anything in `lower..=upper` is owned.
    pub fn overlaps(&self, lower: i32, upper: i32) -> bool {
        match &self.ownership {
            ChunkOwnership::Unclaimed => false,
            ChunkOwnership::Whole(_) => self.bounds.clamp_range(lower, upper).is_some(),
            ChunkOwnership::Sliced(slice) => slice.overlaps(lower, upper),
        }
    }

    /// Permission check at height `y`. Unowned heights are wilderness.
    pub fn access(
        &self,
        registry: &ClaimRegistry,
        actor: Uuid,
        permission: Permission,
        y: i32,
    ) -> Access {
        match self.owner_at(y) {
            Some(owner) => owner_access(registry, owner, actor, permission),
            None => Access::Wilderness,
        }
    }

    /// Returns `true` if `actor` may perform `permission` at height `y`.
    pub fn can_player_do(
        &self,
        registry: &ClaimRegistry,
        permission: Permission,
        actor: Uuid,
        y: i32,
    ) -> bool {
        self.access(registry, actor, permission, y).is_allowed()
    }

    /// Value of `setting` at height `y`.
    pub fn is_setting(&self, registry: &ClaimRegistry, y: i32, setting: ClaimSetting) -> bool {
        setting_for(registry, self.owner_at(y), setting)
    }

    // --- Mutation ---

    /// Gives `upper..=lower` to `owner` (or clears it), dividing the column.
    ///
    /// A whole-owned column loses its whole owner first, even when `owner`
    /// is `None`. This cannot be undone. A range entirely outside the column
    /// changes nothing.
    pub fn update_slice_owner(
        &mut self,
        owner: Option<ClaimantRef>,
        upper: i32,
        lower: i32,
    ) -> Outcome {
        if self.bounds.clamp_range(lower, upper).is_none() {
            return Outcome::Unchanged;
        }
        let (mut slice, mut outcome) = match std::mem::take(&mut self.ownership) {
            ChunkOwnership::Sliced(slice) => (slice, Outcome::Unchanged),
            ChunkOwnership::Whole(previous) => {
                tracing::debug!("whole owner {} replaced by slices", previous.id);
                (ClaimSlice::new(self.bounds), Outcome::Applied)
            }
            ChunkOwnership::Unclaimed => (ClaimSlice::new(self.bounds), Outcome::Unchanged),
        };
        if slice.displace(owner, upper, lower).is_applied() {
            slice.consolidate();
            outcome = Outcome::Applied;
        }
        self.ownership = ChunkOwnership::Sliced(slice);
        self.normalize();
        self.debug_check();
        outcome
    }

    /// Gives the whole column to `owner`, or unclaims it. Discards any slice.
    pub fn update_whole_owner(&mut self, owner: Option<ClaimantRef>) -> Outcome {
        let next = match owner {
            Some(owner) => ChunkOwnership::Whole(owner),
            None => ChunkOwnership::Unclaimed,
        };
        if self.ownership == next {
            return Outcome::Unchanged;
        }
        if let ChunkOwnership::Sliced(slice) = &self.ownership {
            tracing::debug!("discarding {} slice interval(s)", slice.len());
        }
        self.ownership = next;
        Outcome::Applied
    }

    /// Removes everything `owner` owns in the column. Returns `true` if
    /// anything changed.
    pub fn release(&mut self, owner: ClaimantRef) -> bool {
        let changed = match &mut self.ownership {
            ChunkOwnership::Unclaimed => false,
            ChunkOwnership::Whole(whole) => *whole == owner,
            ChunkOwnership::Sliced(slice) => slice.release(owner) > 0,
        };
        if changed && self.whole_owner().is_some() {
            self.ownership = ChunkOwnership::Unclaimed;
        }
        self.normalize();
        changed
    }

    /// Drops all ownership except the server's.
    pub fn reset(&mut self) -> bool {
        let changed = match &mut self.ownership {
            ChunkOwnership::Unclaimed => false,
            ChunkOwnership::Whole(owner) => !is_server(owner.id),
            ChunkOwnership::Sliced(slice) => slice.reset() > 0,
        };
        if changed && self.whole_owner().is_some() {
            self.ownership = ChunkOwnership::Unclaimed;
        }
        self.normalize();
        changed
    }

    /// An empty slice means unclaimed.
    fn normalize(&mut self) {
        if let ChunkOwnership::Sliced(slice) = &self.ownership
            && slice.is_empty()
        {
            self.ownership = ChunkOwnership::Unclaimed;
        }
    }

    fn debug_check(&self) {
        if let ChunkOwnership::Sliced(slice) = &self.ownership {
            debug_assert!(!slice.is_empty(), "sliced column with no intervals");
            debug_assert!(slice.is_consistent(), "inconsistent slice: {slice:?}");
        }
    }
}

/// Setting value for a position owned by `owner`, or the wilderness default.
pub(crate) fn setting_for(
    registry: &ClaimRegistry,
    owner: Option<ClaimantRef>,
    setting: ClaimSetting,
) -> bool {
    match owner.and_then(|owner| registry.resolve(owner)) {
        Some(claimant) => claimant.setting(setting),
        None => setting.wilderness_default(),
    }
}
