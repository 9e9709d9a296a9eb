//! Core block types and helpers.
//!
//! This module exposes the compact `BlockId` used in voxel storage, the
//! well-known ids the terrain generator refers to, the `BlockRegistry`
//! holding per-block metadata (solidity, atlas tiles, tinting), and the
//! loader/watcher used for hot-reloading block data from RON files.

/// Type used throughout the runtime to represent a compact block identifier.
///
/// This is intentionally a `u8` to keep chunk storage memory-efficient;
/// the value space is reserved for growth well past the built-in set.
pub type BlockId = u8;

/// Well-known block ids the terrain generator and tests refer to directly.
///
/// These are the compiled-in defaults; RON block files may add more ids or
/// override the metadata of these, but the numeric values below are fixed.
pub mod blocks {
    use super::BlockId;

    /// The block id used to represent empty space (no block present).
    pub const AIR: BlockId = 0;
    pub const STONE: BlockId = 1;
    pub const DIRT: BlockId = 2;
    pub const GRASS: BlockId = 3;
    pub const BEDROCK: BlockId = 4;
    pub const SAND: BlockId = 5;
}

/// Loader/watchers for block RON files.
pub mod loader;

/// Block registry and related data structures.
pub mod registry;

pub use registry::{BlockDef, BlockRegistry, FaceTiles, OcclusionTable};
