//! Bulk claims over a rectangle of chunk columns and a Y band.
//!
//! [`claim_slices`] and [`can_claim_slices`] are separate calls, so two
//! claimers can both pass the check before either acts.
//! [`try_claim_slices`] closes that window by holding the world's region
//! lock across both steps. Single-column edits are not blocked by it.

use homestead_claimant::{ClaimantRef, Rejection};
use serde::{Deserialize, Serialize};

use crate::pos::ChunkPos;
use crate::world::ClaimWorld;

/// A rectangle of chunk columns (inclusive corners) and a Y band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRegion {
    /// Corner with the smallest coordinates.
    pub min: ChunkPos,
    /// Corner with the largest coordinates.
    pub max: ChunkPos,
    /// Lowest Y of the band (inclusive).
    pub lower: i32,
    /// Highest Y of the band (inclusive).
    pub upper: i32,
}

impl ClaimRegion {
    /// Creates a region from any two opposite corners and band limits in
    /// either order.
    pub fn new(a: ChunkPos, b: ChunkPos, lower: i32, upper: i32) -> Self {
        Self {
            min: ChunkPos::new(a.x.min(b.x), a.z.min(b.z)),
            max: ChunkPos::new(a.x.max(b.x), a.z.max(b.z)),
            lower: lower.min(upper),
            upper: lower.max(upper),
        }
    }

    /// Every column in the rectangle, row by row.
    pub fn columns(&self) -> impl Iterator<Item = ChunkPos> {
        let (min, max) = (self.min, self.max);
        (min.z..=max.z).flat_map(move |z| (min.x..=max.x).map(move |x| ChunkPos::new(x, z)))
    }

    /// Number of columns in the rectangle.
    pub fn column_count(&self) -> usize {
        let width = (i64::from(self.max.x) - i64::from(self.min.x) + 1) as usize;
        let depth = (i64::from(self.max.z) - i64::from(self.min.z) + 1) as usize;
        width * depth
    }
}

/// Gives the region's band in every column to `owner`, or clears it.
/// Returns the number of columns changed.
pub fn claim_slices(
    world: &ClaimWorld,
    owner: Option<ClaimantRef>,
    region: &ClaimRegion,
) -> Result<usize, Rejection> {
    let _guard = world.lock_regions();
    apply(world, owner, region)
}

/// Returns `true` if no column in the region owns anything inside the band.
pub fn can_claim_slices(world: &ClaimWorld, region: &ClaimRegion) -> bool {
    conflicts(world, region) == 0
}

/// Number of columns in the region with any owned height inside the band.
/// A whole-owned column always conflicts.
pub fn conflicts(world: &ClaimWorld, region: &ClaimRegion) -> usize {
    region
        .columns()
        .filter(|&chunk| {
            world
                .column(chunk)
                .is_some_and(|column| column.overlaps(region.lower, region.upper))
        })
        .count()
}

/// Clears the region's band in every column. Returns the number of columns
/// changed.
pub fn unclaim_slices(world: &ClaimWorld, region: &ClaimRegion) -> usize {
    let _guard = world.lock_regions();
    // Clearing never names an owner, so it cannot be rejected.
    apply(world, None, region).unwrap_or(0)
}

/// Checks and claims the region as one step.
///
/// Fails with [`Rejection::RegionConflict`] and changes nothing if any
/// column already owns part of the band.
pub fn try_claim_slices(
    world: &ClaimWorld,
    owner: ClaimantRef,
    region: &ClaimRegion,
) -> Result<usize, Rejection> {
    let _guard = world.lock_regions();
    let conflicting = conflicts(world, region);
    if conflicting > 0 {
        return Err(Rejection::RegionConflict(conflicting));
    }
    apply(world, Some(owner), region)
}

fn apply(
    world: &ClaimWorld,
    owner: Option<ClaimantRef>,
    region: &ClaimRegion,
) -> Result<usize, Rejection> {
    let mut changed = 0;
    for chunk in region.columns() {
        if world
            .update_slice_owner(chunk, owner, region.upper, region.lower)?
            .is_applied()
        {
            changed += 1;
        }
    }
    tracing::debug!(
        "{}: region {:?}..={:?} y {}..={} -> {:?}, {changed} column(s) changed",
        world.name(),
        region.min,
        region.max,
        region.lower,
        region.upper,
        owner.map(|owner| owner.id)
    );
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use homestead_claimant::{ClaimContext, ClaimRegistry, MemoryStore};
    use uuid::Uuid;

    use super::*;
    use crate::pos::ColumnBounds;

    fn world() -> ClaimWorld {
        let registry = Arc::new(ClaimRegistry::new(ClaimContext::new(Arc::new(
            MemoryStore::new(),
        ))));
        ClaimWorld::new("overworld", Arc::new(ColumnBounds::new(0, 255)), registry)
    }

    #[test]
    fn test_region_normalizes_corners() {
        let region = ClaimRegion::new(ChunkPos::new(2, -1), ChunkPos::new(0, 1), 80, 10);
        assert_eq!(region.min, ChunkPos::new(0, -1));
        assert_eq!(region.max, ChunkPos::new(2, 1));
        assert_eq!((region.lower, region.upper), (10, 80));
        assert_eq!(region.column_count(), 9);
        assert_eq!(region.columns().count(), 9);
    }

    #[test]
    fn test_claim_then_conflict_then_unclaim() {
        let world = world();
        let owner = ClaimantRef::player(Uuid::new_v4());
        let region = ClaimRegion::new(ChunkPos::new(0, 0), ChunkPos::new(2, 2), 0, 255);
        assert!(can_claim_slices(&world, &region));
        assert_eq!(claim_slices(&world, Some(owner), &region), Ok(9));
        assert_eq!(claim_slices(&world, Some(owner), &region), Ok(0));

        let overlap = ClaimRegion::new(ChunkPos::new(2, 2), ChunkPos::new(3, 3), 0, 255);
        assert!(!can_claim_slices(&world, &overlap));
        assert_eq!(conflicts(&world, &overlap), 1);

        let corner = ClaimRegion::new(ChunkPos::new(2, 2), ChunkPos::new(2, 2), 0, 255);
        assert_eq!(unclaim_slices(&world, &corner), 1);
        assert!(can_claim_slices(&world, &overlap));
    }

    #[test]
    fn test_disjoint_band_does_not_conflict() {
        let world = world();
        let owner = ClaimantRef::player(Uuid::new_v4());
        let low = ClaimRegion::new(ChunkPos::new(0, 0), ChunkPos::new(1, 1), 0, 63);
        let high = ClaimRegion::new(ChunkPos::new(0, 0), ChunkPos::new(1, 1), 64, 255);
        claim_slices(&world, Some(owner), &low).unwrap();
        assert!(can_claim_slices(&world, &high));
    }

    #[test]
    fn test_whole_owned_column_conflicts() {
        let world = world();
        world.update_player_owner(ChunkPos::new(0, 0), Uuid::new_v4());
        let region = ClaimRegion::new(ChunkPos::new(0, 0), ChunkPos::new(0, 0), 200, 210);
        assert_eq!(conflicts(&world, &region), 1);
    }

    #[test]
    fn test_try_claim_rejects_without_mutation() {
        let world = world();
        let a = ClaimantRef::player(Uuid::new_v4());
        let b = ClaimantRef::player(Uuid::new_v4());
        let first = ClaimRegion::new(ChunkPos::new(0, 0), ChunkPos::new(0, 0), 0, 100);
        let second = ClaimRegion::new(ChunkPos::new(0, 0), ChunkPos::new(1, 0), 50, 150);
        try_claim_slices(&world, a, &first).unwrap();

        assert_eq!(
            try_claim_slices(&world, b, &second),
            Err(Rejection::RegionConflict(1))
        );
        assert_eq!(world.len(), 1);
        assert_eq!(world.claimed_columns(b), 0);
    }

    #[test]
    fn test_concurrent_try_claims_never_overlap() {
        let world = world();
        let claimers: Vec<ClaimantRef> =
            (0..6).map(|_| ClaimantRef::player(Uuid::new_v4())).collect();
        let region = ClaimRegion::new(ChunkPos::new(0, 0), ChunkPos::new(3, 3), 0, 255);

        let wins: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = claimers
                .iter()
                .map(|&owner| {
                    let world = &world;
                    let region = &region;
                    scope.spawn(move || try_claim_slices(world, owner, region).is_ok())
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| usize::from(handle.join().unwrap()))
                .sum()
        });

        assert_eq!(wins, 1);
        let owners: Vec<usize> = claimers
            .iter()
            .map(|&owner| world.claimed_columns(owner))
            .collect();
        assert_eq!(owners.iter().filter(|&&count| count == 16).count(), 1);
        assert_eq!(owners.iter().sum::<usize>(), 16);
    }
}
