//! Tagged results for claim operations and permission checks.
//!
//! Mutations return `Result<Outcome, Rejection>` so a caller can tell a
//! denied request apart from a request that had nothing to do. Permission
//! checks return an [`Access`] that records why access was granted or not.

use uuid::Uuid;

use crate::rank::Rank;

/// Successful result of a mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// State changed.
    Applied,
    /// The request was valid but the state already matched it.
    Unchanged,
}

impl Outcome {
    /// Returns `true` if state changed.
    pub fn is_applied(self) -> bool {
        self == Outcome::Applied
    }

    /// `Applied` when `changed`, otherwise `Unchanged`.
    pub fn from_changed(changed: bool) -> Self {
        if changed {
            Outcome::Applied
        } else {
            Outcome::Unchanged
        }
    }
}

/// Reason a claim or town operation was refused.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// A claimant tried to change its own rank.
    #[error("cannot change your own rank")]
    SelfRankChange,
    /// The target is the reserved server identity.
    #[error("the server identity cannot be ranked")]
    ReservedIdentity,
    /// Only the town owner may do this.
    #[error("only the owner of town {0} may do that")]
    NotTownOwner(Uuid),
    /// The player already belongs to a town.
    #[error("player {player} already belongs to town {town}")]
    AlreadyInTown {
        /// Player that was asked to join.
        player: Uuid,
        /// Town the player belongs to.
        town: Uuid,
    },
    /// The player has no pending invite from this town.
    #[error("player {player} has no invite from town {town}")]
    NotInvited {
        /// Player that tried to join.
        player: Uuid,
        /// Town that did not invite them.
        town: Uuid,
    },
    /// The player is not on the town roster.
    #[error("player {player} is not a member of town {town}")]
    NotAMember {
        /// Player that was targeted.
        player: Uuid,
        /// Town whose roster was checked.
        town: Uuid,
    },
    /// The owner must transfer ownership or disband instead of leaving.
    #[error("the owner cannot leave town {0}")]
    OwnerCannotLeave(Uuid),
    /// Another town already uses this name (case-insensitive).
    #[error("a town named {0:?} already exists")]
    TownNameTaken(String),
    /// The name is empty, too long, or contains forbidden characters.
    #[error("invalid town name {0:?}")]
    InvalidTownName(String),
    /// No town with this id or name is known.
    #[error("unknown town {0}")]
    UnknownTown(String),
    /// Part of the requested region is already claimed.
    #[error("{0} chunk column(s) in the region are already claimed")]
    RegionConflict(usize),
}

/// Result of a permission check at a position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Nobody owns the position.
    Wilderness,
    /// The actor owns the claim.
    Owner,
    /// The actor is the server identity.
    Server,
    /// The actor's rank meets the requirement.
    Granted {
        /// Rank the actor holds with the owner.
        rank: Rank,
        /// Rank the permission requires.
        required: Rank,
    },
    /// The actor's rank is too low.
    Denied {
        /// Rank the actor holds with the owner.
        rank: Rank,
        /// Rank the permission requires.
        required: Rank,
    },
}

impl Access {
    /// Returns `true` unless access was denied.
    pub fn is_allowed(self) -> bool {
        !matches!(self, Access::Denied { .. })
    }

    /// Classifies a rank comparison.
    pub fn from_ranks(rank: Rank, required: Rank) -> Self {
        if rank.can_perform(required) {
            Access::Granted { rank, required }
        } else {
            Access::Denied { rank, required }
        }
    }
}
