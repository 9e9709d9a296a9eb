//! Atlas: voxel face tables and texture-atlas UV math.
//!
//! This module defines the compile-time cube/face lookup tables used by the
//! mesher and the `AtlasLayout` descriptor used to resolve a tile index into
//! UV bounds. Types here are intentionally minimal data containers; the
//! atlas image itself is produced and owned by the surrounding program.

use bevy::math::IVec3;
use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};

/// The eight corners of a unit cube, indexed by the face tables below.
///
/// Corner order: bit 0 = +X, bit 1 = +Y, bit 2 = +Z.
pub const CUBE_CORNERS: [[f32; 3]; 8] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 1.0],
    [0.0, 1.0, 1.0],
    [1.0, 1.0, 1.0],
];

/// Number of cube faces.
pub const FACE_COUNT: usize = 6;

/// Static description of one cube face.
///
/// `corners` index into [`CUBE_CORNERS`] in emission order (two CCW
/// triangles are formed as `0,1,2` / `0,2,3` when viewed from outside).
pub struct Face {
    pub corners: [usize; 4], // corner indices, counter-clockwise from outside
    pub normal: [f32; 3],    // outward face normal
    pub offset: IVec3,       // voxel-space step toward the face neighbor
}

/// Which atlas tile a face samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaceKind {
    Top,    // +Y face
    Bottom, // -Y face
    Side,   // the four lateral faces
}

/// The six faces in the canonical order `(-Z, +Z, +Y, -Y, -X, +X)`.
///
/// Every consumer (mesher, neighbor masks, tests) indexes faces in this
/// order; the index doubles as the bit position in neighbor-presence masks.
pub const FACES: [Face; FACE_COUNT] = [
    // -Z (back)
    Face { corners: [1, 0, 2, 3], normal: [0.0, 0.0, -1.0], offset: IVec3::new(0, 0, -1) },
    // +Z (front)
    Face { corners: [4, 5, 7, 6], normal: [0.0, 0.0, 1.0], offset: IVec3::new(0, 0, 1) },
    // +Y (top)
    Face { corners: [2, 6, 7, 3], normal: [0.0, 1.0, 0.0], offset: IVec3::new(0, 1, 0) },
    // -Y (bottom)
    Face { corners: [0, 1, 5, 4], normal: [0.0, -1.0, 0.0], offset: IVec3::new(0, -1, 0) },
    // -X (left)
    Face { corners: [0, 4, 6, 2], normal: [-1.0, 0.0, 0.0], offset: IVec3::new(-1, 0, 0) },
    // +X (right)
    Face { corners: [5, 1, 3, 7], normal: [1.0, 0.0, 0.0], offset: IVec3::new(1, 0, 0) },
];

/// Face index constants matching the canonical order above.
pub mod face_index {
    pub const NEG_Z: usize = 0;
    pub const POS_Z: usize = 1;
    pub const POS_Y: usize = 2;
    pub const NEG_Y: usize = 3;
    pub const NEG_X: usize = 4;
    pub const POS_X: usize = 5;
}

/// Map a face index in canonical order to the atlas tile it samples.
#[must_use]
pub fn face_kind(face: usize) -> FaceKind {
    match face {
        face_index::POS_Y => FaceKind::Top,
        face_index::NEG_Y => FaceKind::Bottom,
        _ => FaceKind::Side,
    }
}

/// Axis-aligned UV bounds (min/max U and V) for a single texture tile.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UVBounds {
    pub min_u: f32, // Minimum U coordinate.
    pub max_u: f32, // Maximum U coordinate.
    pub min_v: f32, // Minimum V coordinate.
    pub max_v: f32, // Maximum V coordinate.
}

/// Describes the tile grid of the texture atlas the renderer samples.
///
/// The atlas source is external; the runtime only needs its grid shape to
/// compute UVs. `padding` is the UV inset applied to every tile edge so
/// bilinear filtering does not bleed between neighboring tiles.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AtlasLayout {
    #[serde(default = "AtlasLayout::default_tiles")]
    pub tiles_wide: u32, // Number of tile columns in the atlas image.
    #[serde(default = "AtlasLayout::default_tiles")]
    pub tiles_high: u32, // Number of tile rows in the atlas image.
    #[serde(default = "AtlasLayout::default_padding")]
    pub padding: f32, // Per-side UV inset preventing seam bleeding.
}

impl AtlasLayout {
    fn default_tiles() -> u32 { 8 }
    fn default_padding() -> f32 { 0.001 }
}

impl Default for AtlasLayout {
    fn default() -> Self {
        Self {
            tiles_wide: Self::default_tiles(),
            tiles_high: Self::default_tiles(),
            padding: Self::default_padding(),
        }
    }
}

impl AtlasLayout {
    /// Resolve a tile index into UV bounds.
    ///
    /// Tiles are numbered row-major from the top-left of the atlas image;
    /// UV space is bottom-origin, so the V range is flipped relative to the
    /// tile row. Out-of-range indices wrap into the grid, which keeps the
    /// mesher total even when a registry references a tile the atlas does
    /// not have.
    ///
    /// # Arguments
    /// * `tile` - flat tile index (`row * tiles_wide + column`)
    ///
    /// # Return
    /// `UVBounds` for the tile, inset by `padding` on each side.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn tile_uvs(&self, tile: u16) -> UVBounds {
        debug_assert!(self.tiles_wide > 0 && self.tiles_high > 0);
        let tile = u32::from(tile) % (self.tiles_wide * self.tiles_high);
        let col = tile % self.tiles_wide;
        let row = tile / self.tiles_wide;

        let tile_w = 1.0 / self.tiles_wide as f32;
        let tile_h = 1.0 / self.tiles_high as f32;

        // Atlas rows are top-origin; UV rows are bottom-origin.
        let flipped_row = self.tiles_high - 1 - row;

        UVBounds {
            min_u: col as f32 * tile_w + self.padding,
            max_u: (col + 1) as f32 * tile_w - self.padding,
            min_v: flipped_row as f32 * tile_h + self.padding,
            max_v: (flipped_row + 1) as f32 * tile_h - self.padding,
        }
    }

    /// Tile size in UV space before padding, as `(width, height)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn tile_extent(&self) -> (f32, f32) {
        (1.0 / self.tiles_wide as f32, 1.0 / self.tiles_high as f32)
    }
}

/// Per-face UV bounds for a block type.
///
/// Stores the `UVBounds` for the top, bottom and side faces so the mesher
/// can sample the correct tile for each face without re-deriving it.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockAtlasUVs {
    pub top: UVBounds,    // UVs for the top face.
    pub bottom: UVBounds, // UVs for the bottom face.
    pub side: UVBounds,   // UVs for the side faces.
}

/// Precomputed block-id → per-face UV bounds for the whole registry.
///
/// Rebuilt when the block registry reloads; lookups in the meshing hot
/// loop are a flat map probe instead of tile arithmetic per face.
#[derive(Resource, Clone, Default)]
pub struct AtlasUVMap {
    block_uvs: std::collections::HashMap<crate::block::BlockId, BlockAtlasUVs>,
    default_uvs: BlockAtlasUVs,
}

impl AtlasUVMap {
    /// Resolve every registered block's face tiles against the layout.
    #[must_use]
    pub fn build(layout: &AtlasLayout, registry: &crate::block::BlockRegistry) -> Self {
        let mut block_uvs = std::collections::HashMap::new();
        for def in registry.defs() {
            block_uvs.insert(
                def.id,
                BlockAtlasUVs {
                    top: layout.tile_uvs(def.tiles.top),
                    bottom: layout.tile_uvs(def.tiles.bottom),
                    side: layout.tile_uvs(def.tiles.side),
                },
            );
        }
        Self {
            block_uvs,
            default_uvs: BlockAtlasUVs {
                top: layout.tile_uvs(0),
                bottom: layout.tile_uvs(0),
                side: layout.tile_uvs(0),
            },
        }
    }

    /// UV bounds for a block face; unknown ids fall back to tile 0.
    #[must_use]
    pub fn face_uvs(&self, block: crate::block::BlockId, kind: FaceKind) -> UVBounds {
        let uvs = self.block_uvs.get(&block).unwrap_or(&self.default_uvs);
        match kind {
            FaceKind::Top => uvs.top,
            FaceKind::Bottom => uvs.bottom,
            FaceKind::Side => uvs.side,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_offsets_match_canonical_order() {
        let expected = [
            IVec3::new(0, 0, -1),
            IVec3::new(0, 0, 1),
            IVec3::new(0, 1, 0),
            IVec3::new(0, -1, 0),
            IVec3::new(-1, 0, 0),
            IVec3::new(1, 0, 0),
        ];
        for (face, want) in FACES.iter().zip(expected) {
            assert_eq!(face.offset, want);
        }
    }

    #[test]
    fn face_corners_lie_on_face_plane() {
        // Every corner of a face must sit on the plane the normal points
        // away from, i.e. its coordinate along the face axis is constant.
        for face in &FACES {
            let axis = face
                .normal
                .iter()
                .position(|&n| n != 0.0)
                .expect("normal has an axis");
            let positive = face.normal[axis] > 0.0;
            for &ci in &face.corners {
                let coord = CUBE_CORNERS[ci][axis];
                assert_eq!(coord, if positive { 1.0 } else { 0.0 });
            }
        }
    }

    #[test]
    fn tile_zero_is_top_left_in_flipped_v() {
        let layout = AtlasLayout { tiles_wide: 4, tiles_high: 4, padding: 0.0 };
        let uv = layout.tile_uvs(0);
        // First tile row maps to the topmost V band.
        assert_eq!(uv.min_u, 0.0);
        assert_eq!(uv.max_u, 0.25);
        assert_eq!(uv.min_v, 0.75);
        assert_eq!(uv.max_v, 1.0);
    }

    #[test]
    fn padding_insets_every_side() {
        let layout = AtlasLayout { tiles_wide: 2, tiles_high: 2, padding: 0.01 };
        let uv = layout.tile_uvs(3);
        assert!(uv.min_u > 0.5 && uv.max_u < 1.0);
        assert!(uv.min_v > 0.0 && uv.max_v < 0.5);
    }

    #[test]
    fn out_of_range_tile_wraps() {
        let layout = AtlasLayout { tiles_wide: 2, tiles_high: 2, padding: 0.0 };
        assert_eq!(layout.tile_uvs(4), layout.tile_uvs(0));
    }

    #[test]
    fn uv_map_resolves_per_face_tiles() {
        use crate::block::{blocks, BlockRegistry};

        let layout = AtlasLayout::default();
        let registry = BlockRegistry::built_in();
        let map = AtlasUVMap::build(&layout, &registry);

        let grass = registry.get(blocks::GRASS).unwrap();
        assert_eq!(map.face_uvs(blocks::GRASS, FaceKind::Top), layout.tile_uvs(grass.tiles.top));
        assert_eq!(map.face_uvs(blocks::GRASS, FaceKind::Side), layout.tile_uvs(grass.tiles.side));
        assert_ne!(
            map.face_uvs(blocks::GRASS, FaceKind::Top),
            map.face_uvs(blocks::GRASS, FaceKind::Side)
        );
        // Unknown ids fall back to tile 0.
        assert_eq!(map.face_uvs(200, FaceKind::Top), layout.tile_uvs(0));
    }
}
