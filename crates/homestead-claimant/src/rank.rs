//! Rank, permission and setting tables.
//!
//! Ranks are totally ordered by power. Every [`Permission`] carries a
//! built-in required rank; a [`PermissionTable`] holds the server-wide
//! requirements and individual claimants may override entries again.

use serde::{Deserialize, Serialize};

use crate::record::ClaimantKind;

// ---------------------------------------------------------------------------
// Rank
// ---------------------------------------------------------------------------

/// Relationship level an actor holds with respect to a claimant.
///
/// Declaration order matches power so the derived `Ord` is the rank order.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Rank {
    /// No relationship; the default for unknown actors.
    #[default]
    Enemy,
    /// Tolerated visitor.
    Passive,
    /// Trusted friend or town member.
    Ally,
    /// Full control.
    Owner,
}

impl Rank {
    /// All ranks, weakest first.
    pub const ALL: [Rank; 4] = [Rank::Enemy, Rank::Passive, Rank::Ally, Rank::Owner];

    /// Numeric power: `Owner = 2`, `Ally = 1`, `Passive = 0`, `Enemy = -1`.
    pub fn power(self) -> i8 {
        match self {
            Rank::Enemy => -1,
            Rank::Passive => 0,
            Rank::Ally => 1,
            Rank::Owner => 2,
        }
    }

    /// Returns `true` if an actor holding `self` meets the `required` rank.
    pub fn can_perform(self, required: Rank) -> bool {
        self.power() >= required.power()
    }

    /// Lower-case name used in commands and logs.
    pub fn name(self) -> &'static str {
        match self {
            Rank::Enemy => "enemy",
            Rank::Passive => "passive",
            Rank::Ally => "ally",
            Rank::Owner => "owner",
        }
    }

    /// Parses a rank name case-insensitively.
    pub fn from_name(name: &str) -> Option<Rank> {
        Rank::ALL
            .into_iter()
            .find(|rank| rank.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Permission
// ---------------------------------------------------------------------------

/// Category of in-world action gated by a required rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    /// Breaking and placing blocks.
    Blocks,
    /// Opening chests, barrels and other containers.
    Storage,
    /// Doors, trapdoors and gates.
    Doors,
    /// Buttons, levers and pressure plates.
    Redstone,
    /// Sleeping in beds and setting spawn.
    Beds,
    /// Mounting rideable entities.
    Ride,
    /// Hurting passive creatures.
    HarmPassive,
    /// Trading with villagers and shop signs.
    Trade,
    /// Harvesting crops.
    Harvest,
    /// Using crafting stations.
    Craft,
    /// Teleporting to warps inside the claim.
    Warp,
}

impl Permission {
    /// Number of permissions.
    pub const COUNT: usize = 11;

    /// Every permission, in declaration order.
    pub const ALL: [Permission; Permission::COUNT] = [
        Permission::Blocks,
        Permission::Storage,
        Permission::Doors,
        Permission::Redstone,
        Permission::Beds,
        Permission::Ride,
        Permission::HarmPassive,
        Permission::Trade,
        Permission::Harvest,
        Permission::Craft,
        Permission::Warp,
    ];

    /// Rank required when neither the server nor the claimant overrides it.
    pub fn default_required_rank(self) -> Rank {
        match self {
            Permission::Doors | Permission::Trade | Permission::Craft | Permission::Warp => {
                Rank::Passive
            }
            Permission::Blocks
            | Permission::Storage
            | Permission::Redstone
            | Permission::Beds
            | Permission::Ride
            | Permission::HarmPassive
            | Permission::Harvest => Rank::Ally,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// PermissionTable
// ---------------------------------------------------------------------------

/// Server-wide required rank for every permission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionTable {
    required: [Rank; Permission::COUNT],
}

impl PermissionTable {
    /// Table holding each permission's built-in default.
    pub fn builtin() -> Self {
        let mut required = [Rank::Enemy; Permission::COUNT];
        for permission in Permission::ALL {
            required[permission.index()] = permission.default_required_rank();
        }
        Self { required }
    }

    /// Required rank for `permission`.
    pub fn required(&self, permission: Permission) -> Rank {
        self.required[permission.index()]
    }

    /// Replaces the required rank for `permission`.
    pub fn set(&mut self, permission: Permission, rank: Rank) {
        self.required[permission.index()] = rank;
    }
}

impl Default for PermissionTable {
    fn default() -> Self {
        Self::builtin()
    }
}

// ---------------------------------------------------------------------------
// ClaimSetting
// ---------------------------------------------------------------------------

/// Claim-wide boolean toggle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClaimSetting {
    /// Creepers destroy blocks.
    CreeperGrief,
    /// TNT and other explosions destroy blocks.
    ExplosionGrief,
    /// Fire spreads and burns blocks.
    FireSpread,
    /// Players may hurt each other.
    Pvp,
    /// Hostile mobs spawn naturally.
    MobSpawning,
}

impl ClaimSetting {
    /// Every setting, in declaration order.
    pub const ALL: [ClaimSetting; 5] = [
        ClaimSetting::CreeperGrief,
        ClaimSetting::ExplosionGrief,
        ClaimSetting::FireSpread,
        ClaimSetting::Pvp,
        ClaimSetting::MobSpawning,
    ];

    /// Value in unclaimed land.
    pub fn wilderness_default(self) -> bool {
        true
    }

    /// Value inside a claim whose owner never changed the setting.
    pub fn claimed_default(self, kind: ClaimantKind) -> bool {
        match self {
            ClaimSetting::CreeperGrief
            | ClaimSetting::ExplosionGrief
            | ClaimSetting::FireSpread
            | ClaimSetting::Pvp => false,
            ClaimSetting::MobSpawning => kind == ClaimantKind::Player,
        }
    }
}
