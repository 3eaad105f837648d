//! Per-column Y-interval ownership.
//!
//! A [`ClaimSlice`] maps the lower bound of each owned interval to an
//! [`InnerClaim`]. Stored intervals never overlap and always lie inside the
//! column's [`ColumnBounds`]. Unclaimed heights are gaps, never entries.
//!
//! The slice itself is not synchronized; the world's column map serializes
//! every access to one column.

use std::collections::{BTreeMap, BTreeSet};

use homestead_claimant::{Access, ClaimRegistry, ClaimantRef, Outcome, Permission, is_server};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pos::ColumnBounds;

// ---------------------------------------------------------------------------
// InnerClaim
// ---------------------------------------------------------------------------

/// One owned Y interval, `lower..=upper`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerClaim {
    /// Owning claimant.
    pub owner: ClaimantRef,
    /// Lowest owned Y (inclusive).
    pub lower: i32,
    /// Highest owned Y (inclusive).
    pub upper: i32,
}

impl InnerClaim {
    /// Creates an interval, ordering the bounds.
    pub fn new(owner: ClaimantRef, lower: i32, upper: i32) -> Self {
        Self {
            owner,
            lower: lower.min(upper),
            upper: lower.max(upper),
        }
    }

    /// Returns `true` if `y` lies inside the interval.
    pub fn contains(&self, y: i32) -> bool {
        (self.lower..=self.upper).contains(&y)
    }

    /// Returns `true` if the interval shares at least one Y with `lower..=upper`.
    pub fn intersects(&self, lower: i32, upper: i32) -> bool {
        self.lower <= upper && lower <= self.upper
    }

    /// Permission check for `actor` inside this interval.
    ///
    /// The owner short-circuits. Otherwise the owning claimant's rank for
    /// `actor` is compared against its requirement for `permission`. An owner
    /// that no longer resolves is treated as wilderness.
    pub fn access(&self, registry: &ClaimRegistry, actor: Uuid, permission: Permission) -> Access {
        owner_access(registry, self.owner, actor, permission)
    }

    /// Returns `true` if `actor` may perform `permission` inside this interval.
    pub fn can_player_do(
        &self,
        registry: &ClaimRegistry,
        actor: Uuid,
        permission: Permission,
    ) -> bool {
        self.access(registry, actor, permission).is_allowed()
    }
}

/// Resolves `owner` and checks `actor` against it.
pub(crate) fn owner_access(
    registry: &ClaimRegistry,
    owner: ClaimantRef,
    actor: Uuid,
    permission: Permission,
) -> Access {
    if actor == owner.id {
        return Access::Owner;
    }
    match registry.resolve(owner) {
        Some(claimant) => claimant.access(actor, permission),
        None => Access::Wilderness,
    }
}

// ---------------------------------------------------------------------------
// ClaimSlice
// ---------------------------------------------------------------------------

/// Sparse, non-overlapping interval map for one chunk column.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClaimSlice {
    bounds: ColumnBounds,
    /// Keyed by `InnerClaim::lower`.
    entries: BTreeMap<i32, InnerClaim>,
}

impl ClaimSlice {
    /// Creates an empty slice for a column with the given limits.
    pub fn new(bounds: ColumnBounds) -> Self {
        Self {
            bounds,
            entries: BTreeMap::new(),
        }
    }

    /// Vertical limits of the column.
    pub fn bounds(&self) -> ColumnBounds {
        self.bounds
    }

    /// Number of stored intervals.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing in the column is owned.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored intervals, bottom to top.
    pub fn iter(&self) -> impl Iterator<Item = &InnerClaim> {
        self.entries.values()
    }

    /// Every distinct owner in the column.
    pub fn owners(&self) -> BTreeSet<ClaimantRef> {
        self.entries.values().map(|claim| claim.owner).collect()
    }

    /// The interval covering `y`, if any. O(log n).
    pub fn get(&self, y: i32) -> Option<&InnerClaim> {
        self.entries
            .range(..=y)
            .next_back()
            .map(|(_, claim)| claim)
            .filter(|claim| y <= claim.upper)
    }

    /// Returns `true` if any stored interval intersects `lower..=upper`.
    pub fn overlaps(&self, lower: i32, upper: i32) -> bool {
        match self.bounds.clamp_range(lower, upper) {
            Some((lower, upper)) => self
                .entries
                .range(..=upper)
                .next_back()
                .is_some_and(|(_, claim)| claim.upper >= lower),
            None => false,
        }
    }

    /// Gives `upper..=lower` (in either order) to `owner`, or clears it when
    /// `owner` is `None`.
    ///
    /// The range is clamped to the column. Every stored interval that
    /// intersects it is removed; the parts of those intervals above and below
    /// the range are stored again with their original owner. A range that
    /// lies entirely outside the column changes nothing.
    pub fn displace(&mut self, owner: Option<ClaimantRef>, upper: i32, lower: i32) -> Outcome {
        let Some((lower, upper)) = self.bounds.clamp_range(lower, upper) else {
            return Outcome::Unchanged;
        };

        // Walking down from `upper`, uppers only decrease, so the first entry
        // ending below `lower` ends the overlap. This also catches the entry
        // that starts below `lower` and reaches into the range.
        let hits: Vec<InnerClaim> = self
            .entries
            .range(..=upper)
            .rev()
            .map(|(_, claim)| *claim)
            .take_while(|claim| claim.upper >= lower)
            .collect();

        let unchanged = match (owner, hits.as_slice()) {
            (None, []) => true,
            (Some(owner), [only]) => {
                only.owner == owner && only.lower <= lower && only.upper >= upper
            }
            _ => false,
        };
        if unchanged {
            return Outcome::Unchanged;
        }

        for old in hits {
            self.entries.remove(&old.lower);
            if old.lower < lower {
                self.store(InnerClaim::new(old.owner, old.lower, lower - 1));
            }
            if old.upper > upper {
                self.store(InnerClaim::new(old.owner, upper + 1, old.upper));
            }
        }
        if let Some(owner) = owner {
            self.store(InnerClaim::new(owner, lower, upper));
        }

        debug_assert!(self.is_consistent(), "slice overlap after displace: {self:?}");
        Outcome::Applied
    }

    /// Removes the interval starting at `lower`.
    pub fn remove(&mut self, lower: i32) -> Option<InnerClaim> {
        self.entries.remove(&lower)
    }

    /// Removes `claim` if exactly that interval is stored.
    pub fn remove_claim(&mut self, claim: &InnerClaim) -> bool {
        if self.entries.get(&claim.lower) == Some(claim) {
            self.entries.remove(&claim.lower);
            true
        } else {
            false
        }
    }

    /// The interval starting right above `claim`, if any.
    pub fn upper_neighbor(&self, claim: &InnerClaim) -> Option<&InnerClaim> {
        let above = claim.upper.checked_add(1)?;
        self.entries.get(&above)
    }

    /// The interval ending right below `claim`, if any.
    pub fn lower_neighbor(&self, claim: &InnerClaim) -> Option<&InnerClaim> {
        let below = claim.lower.checked_sub(1)?;
        self.get(below).filter(|found| found.upper == below)
    }

    /// Returns `true` if the interval right above `claim` has the same owner.
    pub fn has_upper_neighbor(&self, claim: &InnerClaim) -> bool {
        self.upper_neighbor(claim)
            .is_some_and(|found| found.owner == claim.owner)
    }

    /// Returns `true` if the interval right below `claim` has the same owner.
    pub fn has_lower_neighbor(&self, claim: &InnerClaim) -> bool {
        self.lower_neighbor(claim)
            .is_some_and(|found| found.owner == claim.owner)
    }

    /// Merges touching intervals with the same owner. Returns the number of
    /// merges performed.
    pub fn consolidate(&mut self) -> usize {
        let mut merged = 0;
        let mut cursor = self.entries.keys().next().copied();
        while let Some(lower) = cursor {
            let Some(current) = self.entries.get(&lower).copied() else {
                break;
            };
            let next = self.upper_neighbor(&current).copied();
            match next {
                Some(next) if next.owner == current.owner => {
                    self.entries.remove(&next.lower);
                    self.store(InnerClaim::new(current.owner, current.lower, next.upper));
                    merged += 1;
                }
                _ => {
                    cursor = self
                        .entries
                        .range(lower + 1..)
                        .next()
                        .map(|(&key, _)| key);
                }
            }
        }
        merged
    }

    /// Drops every interval not owned by the server identity.
    pub fn reset(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, claim| is_server(claim.owner.id));
        before - self.entries.len()
    }

    /// Drops every interval owned by `owner`. Returns the number removed.
    pub fn release(&mut self, owner: ClaimantRef) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, claim| claim.owner != owner);
        before - self.entries.len()
    }

    /// Checks that intervals are ordered, disjoint, keyed by their lower
    /// bound and inside the column.
    pub fn is_consistent(&self) -> bool {
        let mut previous_upper: Option<i32> = None;
        for (&key, claim) in &self.entries {
            if key != claim.lower
                || claim.lower > claim.upper
                || !self.bounds.contains(claim.lower)
                || !self.bounds.contains(claim.upper)
            {
                return false;
            }
            if previous_upper.is_some_and(|upper| upper >= claim.lower) {
                return false;
            }
            previous_upper = Some(claim.upper);
        }
        true
    }

    fn store(&mut self, claim: InnerClaim) {
        self.entries.insert(claim.lower, claim);
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn owner(n: u128) -> ClaimantRef {
        ClaimantRef::player(Uuid::from_u128(n))
    }

    fn slice() -> ClaimSlice {
        ClaimSlice::new(ColumnBounds::new(-64, 319))
    }

    fn intervals(slice: &ClaimSlice) -> Vec<(i32, i32, ClaimantRef)> {
        slice
            .iter()
            .map(|claim| (claim.lower, claim.upper, claim.owner))
            .collect()
    }

    #[test]
    fn test_get_finds_covering_interval_only() {
        let mut s = slice();
        let a = owner(1);
        s.displace(Some(a), 63, 0);
        assert_eq!(s.get(30).map(|c| c.owner), Some(a));
        assert_eq!(s.get(0).map(|c| c.owner), Some(a));
        assert_eq!(s.get(63).map(|c| c.owner), Some(a));
        assert!(s.get(64).is_none());
        assert!(s.get(100).is_none());
        assert!(s.get(-1).is_none());
    }

    #[test]
    fn test_displace_splits_into_three() {
        let mut s = slice();
        let (a, b) = (owner(1), owner(2));
        s.displace(Some(a), 100, 0);
        assert_eq!(s.displace(Some(b), 60, 40), Outcome::Applied);
        assert_eq!(
            intervals(&s),
            vec![(0, 39, a), (40, 60, b), (61, 100, a)]
        );
    }

    #[test]
    fn test_displace_catches_left_overlap() {
        let mut s = slice();
        let (a, b) = (owner(1), owner(2));
        s.displace(Some(a), 50, 0);
        s.displace(Some(b), 80, 30);
        assert_eq!(intervals(&s), vec![(0, 29, a), (30, 80, b)]);
    }

    #[test]
    fn test_displace_spanning_many_intervals() {
        let mut s = slice();
        let (a, b, c) = (owner(1), owner(2), owner(3));
        s.displace(Some(a), 9, 0);
        s.displace(Some(b), 19, 10);
        s.displace(Some(a), 29, 20);
        s.displace(Some(b), 39, 30);
        s.displace(Some(c), 34, 5);
        assert_eq!(
            intervals(&s),
            vec![(0, 4, a), (5, 34, c), (35, 39, b)]
        );
    }

    #[test]
    fn test_displace_none_clears() {
        let mut s = slice();
        let a = owner(1);
        s.displace(Some(a), 100, 0);
        assert_eq!(s.displace(None, 60, 40), Outcome::Applied);
        assert_eq!(intervals(&s), vec![(0, 39, a), (61, 100, a)]);
        assert_eq!(s.displace(None, 60, 40), Outcome::Unchanged);
        s.displace(None, 319, -64);
        assert!(s.is_empty());
    }

    #[test]
    fn test_displace_is_idempotent() {
        let mut s = slice();
        let (a, b) = (owner(1), owner(2));
        s.displace(Some(a), 200, -10);
        s.displace(Some(b), 90, 20);
        let once = s.clone();
        assert_eq!(s.displace(Some(b), 90, 20), Outcome::Unchanged);
        assert_eq!(s, once);
    }

    #[test]
    fn test_displace_clamps_to_column() {
        let mut s = ClaimSlice::new(ColumnBounds::new(0, 255));
        let a = owner(1);
        s.displace(Some(a), 1000, -1000);
        assert_eq!(intervals(&s), vec![(0, 255, a)]);
        assert_eq!(s.displace(Some(owner(2)), 400, 300), Outcome::Unchanged);
        assert!(s.is_consistent());
    }

    #[test]
    fn test_displace_accepts_reversed_bounds() {
        let mut s = slice();
        let a = owner(1);
        s.displace(Some(a), 10, 20);
        assert_eq!(intervals(&s), vec![(10, 20, a)]);
    }

    #[test]
    fn test_random_displace_sequence_keeps_invariants() {
        let bounds = ColumnBounds::new(-64, 319);
        let mut s = ClaimSlice::new(bounds);
        // Reference model: one owner slot per Y.
        let mut model: Vec<Option<ClaimantRef>> = vec![None; 384];
        let mut rng = ChaCha8Rng::seed_from_u64(0x5EED);

        for _ in 0..500 {
            let a = rng.random_range(-80..340);
            let b = rng.random_range(-80..340);
            let who = match rng.random_range(0..4u128) {
                0 => None,
                n => Some(owner(n)),
            };
            s.displace(who, a, b);
            if let Some((lo, hi)) = bounds.clamp_range(a, b) {
                for y in lo..=hi {
                    model[(y + 64) as usize] = who;
                }
            }
            assert!(s.is_consistent());
        }

        for y in -64..=319 {
            assert_eq!(s.get(y).map(|c| c.owner), model[(y + 64) as usize], "y = {y}");
        }
    }

    #[test]
    fn test_consolidate_merges_touching_runs() {
        let mut s = slice();
        let (a, b) = (owner(1), owner(2));
        s.displace(Some(a), 9, 0);
        s.displace(Some(a), 19, 10);
        s.displace(Some(a), 29, 20);
        s.displace(Some(b), 39, 30);
        s.displace(Some(a), 50, 41);
        assert_eq!(s.consolidate(), 2);
        assert_eq!(
            intervals(&s),
            vec![(0, 29, a), (30, 39, b), (41, 50, a)]
        );
        assert_eq!(s.consolidate(), 0);
    }

    #[test]
    fn test_neighbors() {
        let mut s = slice();
        let (a, b) = (owner(1), owner(2));
        s.displace(Some(a), 9, 0);
        s.displace(Some(a), 19, 10);
        s.displace(Some(b), 29, 20);
        let middle = *s.get(15).unwrap();
        assert!(s.has_lower_neighbor(&middle));
        assert!(!s.has_upper_neighbor(&middle));
        assert_eq!(s.upper_neighbor(&middle).map(|c| c.owner), Some(b));
        let top = *s.get(25).unwrap();
        assert!(!s.has_upper_neighbor(&top));
        assert!(s.lower_neighbor(&top).is_some());
    }

    #[test]
    fn test_reset_keeps_server_intervals() {
        let mut s = slice();
        s.displace(Some(ClaimantRef::spawn()), 80, 60);
        s.displace(Some(owner(1)), 40, 0);
        s.displace(Some(owner(2)), 120, 100);
        assert_eq!(s.reset(), 2);
        assert_eq!(intervals(&s), vec![(60, 80, ClaimantRef::spawn())]);
    }

    #[test]
    fn test_remove_and_release() {
        let mut s = slice();
        let (a, b) = (owner(1), owner(2));
        s.displace(Some(a), 9, 0);
        s.displace(Some(b), 19, 10);
        s.displace(Some(a), 29, 20);
        let first = *s.get(0).unwrap();
        assert!(s.remove_claim(&first));
        assert!(!s.remove_claim(&first));
        assert_eq!(s.remove(10).map(|c| c.owner), Some(b));
        assert_eq!(s.release(a), 1);
        assert!(s.is_empty());
    }

    #[test]
    fn test_overlaps() {
        let mut s = slice();
        s.displace(Some(owner(1)), 63, 0);
        assert!(s.overlaps(50, 100));
        assert!(s.overlaps(-10, 0));
        assert!(!s.overlaps(64, 255));
        assert!(!s.overlaps(400, 500));
    }
}
