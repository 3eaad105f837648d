//! Persisted form of a claimant.
//!
//! A [`ClaimantRecord`] is the plain data behind every live
//! [`Claimant`](crate::Claimant): what the store reads and writes, and what
//! the claimant's lock protects.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rank::{ClaimSetting, Permission, Rank};

/// The two kinds of claimant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClaimantKind {
    /// A single player.
    Player,
    /// A town grouping several players.
    Town,
}

impl ClaimantKind {
    /// Directory name used by file-backed stores.
    pub fn dir_name(self) -> &'static str {
        match self {
            ClaimantKind::Player => "players",
            ClaimantKind::Town => "towns",
        }
    }
}

/// Kind-specific claimant state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Player state. Town membership is not stored here: the town roster is
    /// authoritative and the registry derives a player's town from it.
    Player {
        /// Towns that invited this player and have not been answered.
        #[serde(default)]
        invites: BTreeSet<Uuid>,
    },
    /// Town state.
    Town {
        /// Founder or current owner; always a roster member with `Owner` rank.
        owner: Uuid,
        /// Member roster with each member's town rank.
        #[serde(default)]
        members: BTreeMap<Uuid, Rank>,
    },
}

impl Role {
    /// Kind this role belongs to.
    pub fn kind(&self) -> ClaimantKind {
        match self {
            Role::Player { .. } => ClaimantKind::Player,
            Role::Town { .. } => ClaimantKind::Town,
        }
    }
}

/// Everything persisted about one claimant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimantRecord {
    /// Claimant identity.
    pub id: Uuid,
    /// Display name (player name or town name).
    #[serde(default)]
    pub name: String,
    /// Explicit rank grants to other identities.
    #[serde(default)]
    pub friends: BTreeMap<Uuid, Rank>,
    /// Per-claimant required-rank overrides.
    #[serde(default)]
    pub permissions: BTreeMap<Permission, Rank>,
    /// Claim-wide toggles that differ from the kind default.
    #[serde(default)]
    pub settings: BTreeMap<ClaimSetting, bool>,
    /// Kind-specific state.
    pub role: Role,
}

impl ClaimantRecord {
    /// Fresh player record with default settings and no grants.
    pub fn new_player(id: Uuid) -> Self {
        Self {
            id,
            name: String::new(),
            friends: BTreeMap::new(),
            permissions: BTreeMap::new(),
            settings: BTreeMap::new(),
            role: Role::Player {
                invites: BTreeSet::new(),
            },
        }
    }

    /// Fresh town record whose roster holds only the founder as owner.
    pub fn new_town(id: Uuid, name: impl Into<String>, founder: Uuid) -> Self {
        let mut members = BTreeMap::new();
        members.insert(founder, Rank::Owner);
        Self {
            id,
            name: name.into(),
            friends: BTreeMap::new(),
            permissions: BTreeMap::new(),
            settings: BTreeMap::new(),
            role: Role::Town {
                owner: founder,
                members,
            },
        }
    }

    /// Kind of this record.
    pub fn kind(&self) -> ClaimantKind {
        self.role.kind()
    }
}
