//! Block and chunk-column coordinates, and vertical column limits.

use serde::{Deserialize, Serialize};

/// Blocks per chunk side, as a shift.
pub const CHUNK_SHIFT: i32 = 4;

/// Horizontal position of a 16x16 chunk column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    /// Chunk-grid X coordinate.
    pub x: i32,
    /// Chunk-grid Z coordinate.
    pub z: i32,
}

impl ChunkPos {
    /// Creates a chunk position.
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// A block position in world coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    /// World X.
    pub x: i32,
    /// World Y (height).
    pub y: i32,
    /// World Z.
    pub z: i32,
}

impl BlockPos {
    /// Creates a block position.
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The chunk column containing this block. Floors toward negative
    /// infinity, so block `-1` lies in chunk `-1`.
    pub fn chunk(self) -> ChunkPos {
        ChunkPos {
            x: self.x >> CHUNK_SHIFT,
            z: self.z >> CHUNK_SHIFT,
        }
    }
}

/// Inclusive vertical limits of a chunk column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnBounds {
    /// Lowest valid Y (inclusive).
    pub min_y: i32,
    /// Highest valid Y (inclusive).
    pub max_y: i32,
}

impl Default for ColumnBounds {
    fn default() -> Self {
        Self {
            min_y: -64,
            max_y: 319,
        }
    }
}

impl ColumnBounds {
    /// Creates bounds, swapping the arguments if given in reverse.
    pub fn new(min_y: i32, max_y: i32) -> Self {
        Self {
            min_y: min_y.min(max_y),
            max_y: min_y.max(max_y),
        }
    }

    /// Returns `true` if `y` lies inside the column.
    pub fn contains(self, y: i32) -> bool {
        (self.min_y..=self.max_y).contains(&y)
    }

    /// Orders and clamps `[a, b]` to the column. `None` when nothing of the
    /// range lies inside it.
    pub fn clamp_range(self, a: i32, b: i32) -> Option<(i32, i32)> {
        let lower = a.min(b).max(self.min_y);
        let upper = a.max(b).min(self.max_y);
        (lower <= upper).then_some((lower, upper))
    }
}

/// Source of per-column vertical limits.
pub trait ColumnHeights: Send + Sync {
    /// Vertical limits of the column at `chunk`.
    fn bounds(&self, chunk: ChunkPos) -> ColumnBounds;
}

/// Every column shares the same limits.
impl ColumnHeights for ColumnBounds {
    fn bounds(&self, _chunk: ChunkPos) -> ColumnBounds {
        *self
    }
}
