//! Block definitions and the `BlockRegistry`.
//!
//! Blocks carry the metadata the mesher needs: a solidity flag, per-face
//! atlas tile indices, and whether the top face takes the biome surface
//! tint. The registry ships with compiled-in defaults for the core block
//! set and can be extended or overridden from RON files (see `loader`).
//!
//! Example:
//! ```rust
//! use regolith::block::{blocks, BlockRegistry};
//!
//! let registry = BlockRegistry::built_in();
//! assert!(registry.is_solid(blocks::STONE));
//! assert!(!registry.is_solid(blocks::AIR));
//! // Grass uses a distinct top tile.
//! let grass = registry.get(blocks::GRASS).unwrap();
//! assert_ne!(grass.tiles.top, grass.tiles.side);
//! ```

use crate::atlas::FaceKind;
use crate::block::{blocks, BlockId};
use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-face atlas tile indices for one block type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct FaceTiles {
    pub top: u16,    // Tile sampled by the +Y face
    pub bottom: u16, // Tile sampled by the -Y face
    pub side: u16,   // Tile sampled by the four lateral faces
}

impl FaceTiles {
    /// All faces sample the same tile.
    #[must_use]
    pub fn uniform(tile: u16) -> Self {
        Self { top: tile, bottom: tile, side: tile }
    }

    #[must_use]
    pub fn for_kind(&self, kind: FaceKind) -> u16 {
        match kind {
            FaceKind::Top => self.top,
            FaceKind::Bottom => self.bottom,
            FaceKind::Side => self.side,
        }
    }
}

/// Definition of a single block type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDef {
    pub name: String,
    pub id: BlockId,
    #[serde(default = "BlockDef::default_solid")]
    pub solid: bool, // Solid blocks cull neighboring faces.
    #[serde(default)]
    pub tiles: FaceTiles,
    #[serde(default)]
    pub tint_top: bool, // Top face takes the biome surface tint (grass).
    #[serde(default)]
    pub transparent: bool, // Transparent blocks never cull neighbor faces.
}

impl BlockDef {
    fn default_solid() -> bool { true }
}

impl Default for BlockDef {
    fn default() -> Self {
        Self {
            name: "stone".to_string(),
            id: blocks::STONE,
            solid: true,
            tiles: FaceTiles::uniform(1),
            tint_top: false,
            transparent: false,
        }
    }
}

/// Registry of all known block types, keyed by id and by name.
#[derive(Resource, Default, Clone)]
pub struct BlockRegistry {
    defs: HashMap<BlockId, BlockDef>,
    by_name: HashMap<String, BlockId>,
}

impl BlockRegistry {
    /// Registry containing only the compiled-in core block set.
    ///
    /// Tile indices follow the default atlas convention: tile 0 is reserved
    /// for a "missing" checker, solids occupy the first atlas row, and grass
    /// has dedicated top/side tiles.
    #[must_use]
    pub fn built_in() -> Self {
        let mut registry = Self::default();
        registry.register(BlockDef {
            name: "stone".to_string(),
            id: blocks::STONE,
            solid: true,
            tiles: FaceTiles::uniform(1),
            tint_top: false,
            transparent: false,
        });
        registry.register(BlockDef {
            name: "dirt".to_string(),
            id: blocks::DIRT,
            solid: true,
            tiles: FaceTiles::uniform(2),
            tint_top: false,
            transparent: false,
        });
        registry.register(BlockDef {
            name: "grass".to_string(),
            id: blocks::GRASS,
            solid: true,
            tiles: FaceTiles { top: 3, bottom: 2, side: 4 },
            tint_top: true,
            transparent: false,
        });
        registry.register(BlockDef {
            name: "bedrock".to_string(),
            id: blocks::BEDROCK,
            solid: true,
            tiles: FaceTiles::uniform(5),
            tint_top: false,
            transparent: false,
        });
        registry.register(BlockDef {
            name: "sand".to_string(),
            id: blocks::SAND,
            solid: true,
            tiles: FaceTiles::uniform(6),
            tint_top: false,
            transparent: false,
        });
        registry
    }

    /// Insert or replace a block definition.
    pub fn register(&mut self, def: BlockDef) {
        self.by_name.insert(def.name.clone(), def.id);
        self.defs.insert(def.id, def);
    }

    #[must_use]
    pub fn get(&self, id: BlockId) -> Option<&BlockDef> {
        self.defs.get(&id)
    }

    /// Lookup numeric ID for a block `name`.
    #[must_use]
    pub fn id_for_name(&self, name: &str) -> Option<BlockId> {
        self.by_name.get(name).copied()
    }

    /// Whether `id` is a solid block. Air and unknown ids are not solid,
    /// so a registry gap renders holes rather than hiding geometry.
    #[must_use]
    pub fn is_solid(&self, id: BlockId) -> bool {
        if id == blocks::AIR {
            return false;
        }
        self.defs.get(&id).map_or(false, |d| d.solid)
    }

    /// Whether a face against `id` is culled: solid and not
    /// transparent-flagged.
    #[must_use]
    pub fn occludes(&self, id: BlockId) -> bool {
        if id == blocks::AIR {
            return false;
        }
        self.defs.get(&id).map_or(false, |d| d.solid && !d.transparent)
    }

    /// Iterate over every registered definition.
    pub fn defs(&self) -> impl Iterator<Item = &BlockDef> {
        self.defs.values()
    }

    /// Atlas tile for a block face. Unknown ids fall back to tile 0.
    #[must_use]
    pub fn face_tile(&self, id: BlockId, kind: FaceKind) -> u16 {
        self.defs.get(&id).map_or(0, |d| d.tiles.for_kind(kind))
    }

    /// Whether the top face of `id` takes the biome surface tint.
    #[must_use]
    pub fn tints_top(&self, id: BlockId) -> bool {
        self.defs.get(&id).map_or(false, |d| d.tint_top)
    }

    /// Number of registered definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Snapshot the occlusion of every possible id into a flat table.
    ///
    /// Mesh tasks index this instead of doing a hash lookup per voxel face.
    #[must_use]
    pub fn occlusion_table(&self) -> OcclusionTable {
        let mut occludes = [false; 256];
        for (&id, def) in &self.defs {
            occludes[id as usize] = def.solid && !def.transparent;
        }
        occludes[blocks::AIR as usize] = false;
        OcclusionTable { occludes }
    }
}

/// Flat per-id occlusion snapshot used in the meshing hot loop.
#[derive(Clone)]
pub struct OcclusionTable {
    occludes: [bool; 256],
}

impl OcclusionTable {
    #[inline]
    #[must_use]
    pub fn occludes(&self, id: BlockId) -> bool {
        self.occludes[id as usize]
    }
}
