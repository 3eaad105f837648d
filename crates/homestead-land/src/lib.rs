//! Land ownership: who owns which chunk column, and which heights inside it.
//!
//! Each world keeps a map of claimed columns. A column is unclaimed, owned
//! whole by one claimant, or divided into Y intervals by a [`ClaimSlice`].
//! [`ClaimWorld::can_player_do`] is the permission check every interaction
//! site calls; unowned positions are wilderness and permit everything.

mod chunk;
mod error;
mod land;
mod pos;
mod region;
mod slice;
mod snapshot;
mod world;

pub use chunk::{ChunkClaim, ChunkOwnership};
pub use error::LandStoreError;
pub use land::LandClaims;
pub use pos::{BlockPos, CHUNK_SHIFT, ChunkPos, ColumnBounds, ColumnHeights};
pub use region::{
    ClaimRegion, can_claim_slices, claim_slices, conflicts, try_claim_slices, unclaim_slices,
};
pub use slice::{ClaimSlice, InnerClaim};
pub use snapshot::{ColumnRecord, WorldClaimsRecord};
pub use world::ClaimWorld;
