//! Claimants, ranks and permissions for land claims.
//!
//! Players and towns own land and rank other players. The
//! [`ClaimRegistry`] holds one shared instance per claimant id in front of a
//! [`ClaimStore`], and every rank or setting change is visible to all land
//! that references the claimant as soon as it is made.

pub mod claimant;
pub mod context;
pub mod notify;
pub mod outcome;
pub mod rank;
pub mod record;
pub mod registry;
pub mod store;

pub use claimant::{Claimant, ClaimantPlayer, ClaimantRef, ClaimantTown, SPAWN_ID, is_server};
pub use context::{ClaimContext, TownNameRules};
pub use notify::{ChannelListener, ClaimEvent, ClaimListener, NoopListener};
pub use outcome::{Access, Outcome, Rejection};
pub use rank::{ClaimSetting, Permission, PermissionTable, Rank};
pub use record::{ClaimantKind, ClaimantRecord, Role};
pub use registry::{ClaimRegistry, DEFAULT_MEMBER_RANK, DisbandedTown};
pub use store::{ClaimStore, MemoryStore, RonFileStore, StoreError};
