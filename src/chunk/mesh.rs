//! Chunk meshing: voxel grids to renderable vertex/index buffers.
//!
//! The mesher walks every non-air voxel and emits one quad per face whose
//! neighbor is not solid. Neighbor reads inside the chunk hit the grid
//! directly; reads across the chunk border consult the read-only snapshot
//! of the adjacent chunk taken at task start. When a neighbor chunk is not
//! loaded at all the mesher falls back to the terrain-height surrogate:
//! a border voxel below the sampled surface counts as solid (face culled),
//! one above counts as air (face emitted). Without that rule, streaming
//! edges flash as solid walls and unloaded hillsides render their insides.

use super::{chunk_origin, CancelFlag, ChunkCoord, ChunkVoxels, CHUNK_SIZE, CHUNK_SIZE_I32};
use crate::atlas::{face_kind, AtlasUVMap, FaceKind, CUBE_CORNERS, FACES, FACE_COUNT};
use crate::block::{blocks, BlockRegistry};
use crate::terrain::TerrainSampler;
use bevy::math::IVec3;
use std::sync::Arc;

/// Triangle indices at the width the vertex count requires.
///
/// 16-bit while the vertex count fits in `u16`, 32-bit beyond that; the
/// renderer must consume either.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MeshIndices {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl MeshIndices {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            MeshIndices::U16(v) => v.len(),
            MeshIndices::U32(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Finished mesh data for one chunk revision.
///
/// Positions are chunk-local; the chunk's world origin travels alongside
/// the buffer to the renderer.
pub struct MeshBuffer {
    pub coord: ChunkCoord,
    /// Revision of the chunk the buffer was built from; the upload manager
    /// discards the buffer if the chunk has moved past it.
    pub revision: u64,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub colors: Vec<[f32; 4]>,
    pub indices: MeshIndices,
}

impl MeshBuffer {
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Quads emitted (every face is 4 vertices).
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.positions.len() / 4
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Read-only neighbor grids in canonical face order, taken at task start.
///
/// Absent entries mean the neighbor chunk is not loaded (or not yet
/// generated); the mesher covers those borders with the terrain surrogate.
#[derive(Default, Clone)]
pub struct NeighborSnapshots {
    grids: [Option<Arc<ChunkVoxels>>; FACE_COUNT],
}

impl NeighborSnapshots {
    pub fn set(&mut self, face: usize, grid: Arc<ChunkVoxels>) {
        self.grids[face] = Some(grid);
    }

    #[must_use]
    pub fn get(&self, face: usize) -> Option<&ChunkVoxels> {
        self.grids[face].as_deref()
    }

    /// Face-bit mask of present neighbors, stored on the chunk so the
    /// streaming controller knows which borders still mesh against the
    /// surrogate.
    #[must_use]
    pub fn present_mask(&self) -> u8 {
        let mut mask = 0u8;
        for (i, grid) in self.grids.iter().enumerate() {
            if grid.is_some() {
                mask |= 1 << i;
            }
        }
        mask
    }
}

/// Recyclable mesh build storage.
///
/// Buffers are large and short-lived; the upload manager hands consumed
/// storage back to the pool and the next build starts from it instead of
/// allocating. The working index buffer is 32-bit; the final width is
/// chosen when the build finishes.
#[derive(Default)]
pub struct MeshStorage {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub colors: Vec<[f32; 4]>,
    pub indices: Vec<u32>,
}

impl MeshStorage {
    fn clear(&mut self) {
        self.positions.clear();
        self.normals.clear();
        self.uvs.clear();
        self.colors.clear();
        self.indices.clear();
    }
}

const NEUTRAL_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// Build a mesh buffer for one chunk.
///
/// Deterministic for identical inputs: voxels are visited in `z,y,x` order
/// and faces in the canonical face order, so vertex/index layouts are
/// reproducible. Returns `None` when `cancel` was observed mid-build.
///
/// # Arguments
/// * `coord`, `revision` - identity stamped onto the buffer
/// * `voxels` - the chunk's grid snapshot
/// * `neighbors` - border grids in canonical face order
/// * `registry` - block metadata (occlusion, tinting)
/// * `uvs` - precomputed per-block face UVs
/// * `sampler` - terrain sampler backing the absent-neighbor surrogate
/// * `cancel` - cooperative cancellation, checked per Z row
/// * `storage` - recycled build storage from the mesh-buffer pool
#[must_use]
#[allow(clippy::too_many_arguments, clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_precision_loss)]
pub fn build_chunk_mesh(
    coord: ChunkCoord,
    revision: u64,
    voxels: &ChunkVoxels,
    neighbors: &NeighborSnapshots,
    registry: &BlockRegistry,
    uvs: &AtlasUVMap,
    sampler: &TerrainSampler,
    cancel: &CancelFlag,
    storage: MeshStorage,
) -> Option<MeshBuffer> {
    let occlusion = registry.occlusion_table();
    let origin = chunk_origin(coord);

    let mut out = storage;
    out.clear();

    for z in 0..CHUNK_SIZE {
        if cancel.is_cancelled() {
            return None;
        }
        for y in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                let block = voxels.get(x, y, z);
                if block == blocks::AIR {
                    continue;
                }

                let local = IVec3::new(x as i32, y as i32, z as i32);
                for (face_i, face) in FACES.iter().enumerate() {
                    let neighbor = local + face.offset;
                    let neighbor_occludes = if in_chunk(neighbor) {
                        occlusion.occludes(voxels.get(
                            neighbor.x as usize,
                            neighbor.y as usize,
                            neighbor.z as usize,
                        ))
                    } else if let Some(grid) = neighbors.get(face_i) {
                        let wrapped = IVec3::new(
                            neighbor.x.rem_euclid(CHUNK_SIZE_I32),
                            neighbor.y.rem_euclid(CHUNK_SIZE_I32),
                            neighbor.z.rem_euclid(CHUNK_SIZE_I32),
                        );
                        occlusion.occludes(grid.get(
                            wrapped.x as usize,
                            wrapped.y as usize,
                            wrapped.z as usize,
                        ))
                    } else {
                        // Absent neighbor: terrain-height surrogate.
                        let world = origin + neighbor;
                        sampler.surface_solid_below(
                            f64::from(world.x),
                            f64::from(world.z),
                            world.y,
                        )
                    };

                    if neighbor_occludes {
                        continue;
                    }

                    let kind = face_kind(face_i);
                    let color = if kind == FaceKind::Top && registry.tints_top(block) {
                        sampler.surface_tint(f64::from(origin.x + local.x), f64::from(origin.z + local.z))
                    } else {
                        NEUTRAL_COLOR
                    };
                    emit_face(&mut out, local, face_i, color, uvs.face_uvs(block, kind));
                }
            }
        }
    }

    let vertex_count = out.positions.len();
    let indices = if vertex_count <= usize::from(u16::MAX) {
        MeshIndices::U16(out.indices.into_iter().map(|i| i as u16).collect())
    } else {
        MeshIndices::U32(out.indices)
    };

    Some(MeshBuffer {
        coord,
        revision,
        positions: out.positions,
        normals: out.normals,
        uvs: out.uvs,
        colors: out.colors,
        indices,
    })
}

#[inline]
fn in_chunk(p: IVec3) -> bool {
    p.x >= 0 && p.x < CHUNK_SIZE_I32 && p.y >= 0 && p.y < CHUNK_SIZE_I32 && p.z >= 0 && p.z < CHUNK_SIZE_I32
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn emit_face(
    out: &mut MeshStorage,
    local: IVec3,
    face_i: usize,
    color: [f32; 4],
    uv: crate::atlas::UVBounds,
) {
    let face = &FACES[face_i];
    debug_assert!(u32::try_from(out.positions.len()).is_ok());
    let base = out.positions.len() as u32;

    let uv_corners = [
        [uv.min_u, uv.min_v],
        [uv.max_u, uv.min_v],
        [uv.max_u, uv.max_v],
        [uv.min_u, uv.max_v],
    ];

    for (corner, uv_corner) in face.corners.iter().zip(uv_corners) {
        let offset = CUBE_CORNERS[*corner];
        out.positions.push([
            local.x as f32 + offset[0],
            local.y as f32 + offset[1],
            local.z as f32 + offset[2],
        ]);
        out.normals.push(face.normal);
        out.colors.push(color);
        out.uvs.push(uv_corner);
    }

    out.indices
        .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{face_index, AtlasLayout};
    use crate::block::BlockDef;
    use crate::chunk::generation::generate_chunk_voxels;
    use crate::terrain::TerrainSettings;

    fn flat_sampler(surface: i32) -> TerrainSampler {
        TerrainSampler::new(TerrainSettings::flat(surface))
    }

    fn mesh_with(
        voxels: &ChunkVoxels,
        coord: ChunkCoord,
        neighbors: &NeighborSnapshots,
        sampler: &TerrainSampler,
    ) -> MeshBuffer {
        let registry = BlockRegistry::built_in();
        let uvs = AtlasUVMap::build(&AtlasLayout::default(), &registry);
        build_chunk_mesh(
            coord,
            1,
            voxels,
            neighbors,
            &registry,
            &uvs,
            sampler,
            &CancelFlag::new(),
            MeshStorage::default(),
        )
        .expect("not cancelled")
    }

    fn stone_filled() -> ChunkVoxels {
        let mut grid = ChunkVoxels::new(Vec::new());
        for z in 0..CHUNK_SIZE {
            for y in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    grid.set(x, y, z, blocks::STONE);
                }
            }
        }
        grid
    }

    fn count_faces_with_normal(buffer: &MeshBuffer, normal: [f32; 3]) -> usize {
        buffer
            .normals
            .iter()
            .filter(|n| **n == normal)
            .count()
            / 4
    }

    #[test]
    fn single_block_island_emits_six_faces() {
        let mut grid = ChunkVoxels::new(Vec::new());
        grid.set(8, 8, 8, blocks::STONE);
        // Surrogate below the block so no border is involved anyway.
        let buffer = mesh_with(&grid, ChunkCoord::new(0, 0, 0), &NeighborSnapshots::default(), &flat_sampler(0));

        assert_eq!(buffer.vertex_count(), 24);
        assert_eq!(buffer.indices.len(), 36);
        assert_eq!(buffer.face_count(), 6);
        assert!(matches!(buffer.indices, MeshIndices::U16(_)));

        // Every UV sits inside the stone tile.
        let registry = BlockRegistry::built_in();
        let uvs = AtlasUVMap::build(&AtlasLayout::default(), &registry);
        let side = uvs.face_uvs(blocks::STONE, FaceKind::Side);
        for uv in &buffer.uvs {
            assert!(uv[0] >= side.min_u && uv[0] <= side.max_u, "u {}", uv[0]);
            assert!(uv[1] >= side.min_v && uv[1] <= side.max_v, "v {}", uv[1]);
        }
    }

    #[test]
    fn adjacent_solid_pair_shares_no_interface_faces() {
        let mut grid = ChunkVoxels::new(Vec::new());
        grid.set(5, 5, 5, blocks::STONE);
        grid.set(6, 5, 5, blocks::STONE);
        let buffer = mesh_with(&grid, ChunkCoord::new(0, 0, 0), &NeighborSnapshots::default(), &flat_sampler(0));

        // Two cubes, one shared interface: 10 faces total, and none of the
        // +X faces of the left cube / -X faces of the right cube on x=6.
        assert_eq!(buffer.face_count(), 10);
        let plus_x = count_faces_with_normal(&buffer, [1.0, 0.0, 0.0]);
        let minus_x = count_faces_with_normal(&buffer, [-1.0, 0.0, 0.0]);
        assert_eq!(plus_x, 1);
        assert_eq!(minus_x, 1);
    }

    #[test]
    fn transparent_neighbor_does_not_cull() {
        let mut registry = BlockRegistry::built_in();
        registry.register(BlockDef {
            name: "glass".to_string(),
            id: 10,
            solid: true,
            tiles: crate::block::FaceTiles::uniform(8),
            tint_top: false,
            transparent: true,
        });
        let uvs = AtlasUVMap::build(&AtlasLayout::default(), &registry);

        let mut grid = ChunkVoxels::new(Vec::new());
        grid.set(5, 5, 5, blocks::STONE);
        grid.set(6, 5, 5, 10);
        let buffer = build_chunk_mesh(
            ChunkCoord::new(0, 0, 0),
            1,
            &grid,
            &NeighborSnapshots::default(),
            &registry,
            &uvs,
            &flat_sampler(0),
            &CancelFlag::new(),
            MeshStorage::default(),
        )
        .expect("not cancelled");

        // The stone face against the glass block is emitted; the glass
        // face against the stone is culled (stone occludes).
        assert_eq!(buffer.face_count(), 11);
    }

    #[test]
    fn exposed_voxel_gets_exactly_one_face_per_air_interface() {
        let mut grid = ChunkVoxels::new(Vec::new());
        grid.set(8, 8, 8, blocks::STONE);
        grid.set(8, 9, 8, blocks::STONE);
        let buffer = mesh_with(&grid, ChunkCoord::new(0, 0, 0), &NeighborSnapshots::default(), &flat_sampler(0));
        // Vertical pair: 10 faces, exactly one +Y (top of the stack) and one
        // -Y (bottom of the stack).
        assert_eq!(buffer.face_count(), 10);
        assert_eq!(count_faces_with_normal(&buffer, [0.0, 1.0, 0.0]), 1);
        assert_eq!(count_faces_with_normal(&buffer, [0.0, -1.0, 0.0]), 1);
    }

    #[test]
    fn flat_chunk_meshes_to_grass_tops_only() {
        // Flat world at y=8: every border column of the surrogate has the
        // same surface, so lateral and bottom border faces are culled and
        // only the 16x16 grass tops remain.
        let sampler = flat_sampler(8);
        let coord = ChunkCoord::new(0, 0, 0);
        let grid = generate_chunk_voxels(coord, &sampler, &CancelFlag::new(), Vec::new()).unwrap();
        let buffer = mesh_with(&grid, coord, &NeighborSnapshots::default(), &sampler);

        assert_eq!(buffer.face_count(), CHUNK_SIZE * CHUNK_SIZE);
        assert_eq!(count_faces_with_normal(&buffer, [0.0, 1.0, 0.0]), 256);
    }

    #[test]
    fn grass_tops_take_biome_tint_and_sides_stay_white() {
        let sampler = flat_sampler(8);
        let coord = ChunkCoord::new(0, 0, 0);
        let mut grid = ChunkVoxels::new(Vec::new());
        grid.set(4, 8, 4, blocks::GRASS);
        let buffer = mesh_with(&grid, coord, &NeighborSnapshots::default(), &sampler);

        let tint = sampler.surface_tint(4.0, 4.0);
        assert_ne!(tint, NEUTRAL_COLOR);
        let mut tinted = 0;
        let mut white = 0;
        for (normal, color) in buffer.normals.iter().zip(&buffer.colors) {
            if *normal == [0.0, 1.0, 0.0] {
                assert_eq!(*color, tint);
                tinted += 1;
            } else {
                assert_eq!(*color, NEUTRAL_COLOR);
                white += 1;
            }
        }
        assert_eq!(tinted, 4);
        assert_eq!(white, buffer.vertex_count() - 4);
    }

    #[test]
    fn buried_chunk_with_absent_neighbors_meshes_empty() {
        // Deep below a tall flat surface: the surrogate reports every
        // border voxel as solid, so an unloaded hillside never shows its
        // interior.
        let sampler = flat_sampler(200);
        let coord = ChunkCoord::new(0, 2, 0);
        let grid = generate_chunk_voxels(coord, &sampler, &CancelFlag::new(), Vec::new()).unwrap();
        let buffer = mesh_with(&grid, coord, &NeighborSnapshots::default(), &sampler);
        assert!(buffer.is_empty());
    }

    #[test]
    fn border_face_above_surrogate_surface_is_emitted() {
        let sampler = flat_sampler(8);
        let mut grid = ChunkVoxels::new(Vec::new());
        // A lone block on the +X border, well above the flat surface.
        grid.set(15, 12, 4, blocks::STONE);
        let buffer = mesh_with(&grid, ChunkCoord::new(0, 0, 0), &NeighborSnapshots::default(), &sampler);
        // All six faces present: the +X border neighbor sits above the
        // surrogate surface and counts as air.
        assert_eq!(buffer.face_count(), 6);
        assert_eq!(count_faces_with_normal(&buffer, [1.0, 0.0, 0.0]), 1);
    }

    #[test]
    fn boundary_faces_cull_against_present_neighbor() {
        // Two horizontally adjacent stone-filled chunks; meshing B with A's
        // snapshot present must produce no faces on the shared plane.
        let sampler = flat_sampler(0);
        let a = Arc::new(stone_filled());
        let b = stone_filled();

        let mut neighbors = NeighborSnapshots::default();
        neighbors.set(face_index::NEG_X, Arc::clone(&a));
        let with_neighbor = mesh_with(&b, ChunkCoord::new(1, 0, 0), &neighbors, &sampler);
        assert_eq!(count_faces_with_normal(&with_neighbor, [-1.0, 0.0, 0.0]), 0);

        // Drop A: the -X border now meshes against the surrogate, which is
        // air above the flat surface, so the wall appears.
        let without_neighbor =
            mesh_with(&b, ChunkCoord::new(1, 0, 0), &NeighborSnapshots::default(), &sampler);
        let wall = count_faces_with_normal(&without_neighbor, [-1.0, 0.0, 0.0]);
        // Rows y=1..16 are above the surrogate surface (y=0 stays culled).
        assert_eq!(wall, CHUNK_SIZE * (CHUNK_SIZE - 1));
    }

    #[test]
    fn meshing_is_deterministic() {
        let sampler = TerrainSampler::new(TerrainSettings::default());
        let coord = ChunkCoord::new(2, 1, -3);
        let grid = generate_chunk_voxels(coord, &sampler, &CancelFlag::new(), Vec::new()).unwrap();
        let a = mesh_with(&grid, coord, &NeighborSnapshots::default(), &sampler);
        let b = mesh_with(&grid, coord, &NeighborSnapshots::default(), &sampler);
        assert_eq!(a.positions, b.positions);
        assert_eq!(a.uvs, b.uvs);
        assert_eq!(a.colors, b.colors);
        assert_eq!(a.indices, b.indices);
    }

    #[test]
    fn cancel_drops_the_build() {
        let sampler = flat_sampler(8);
        let coord = ChunkCoord::new(0, 0, 0);
        let grid = generate_chunk_voxels(coord, &sampler, &CancelFlag::new(), Vec::new()).unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let registry = BlockRegistry::built_in();
        let uvs = AtlasUVMap::build(&AtlasLayout::default(), &registry);
        let out = build_chunk_mesh(
            coord,
            1,
            &grid,
            &NeighborSnapshots::default(),
            &registry,
            &uvs,
            &sampler,
            &cancel,
            MeshStorage::default(),
        );
        assert!(out.is_none());
    }

    #[test]
    fn present_mask_tracks_snapshots() {
        let mut neighbors = NeighborSnapshots::default();
        assert_eq!(neighbors.present_mask(), 0);
        neighbors.set(face_index::POS_X, Arc::new(ChunkVoxels::new(Vec::new())));
        neighbors.set(face_index::NEG_Z, Arc::new(ChunkVoxels::new(Vec::new())));
        assert_eq!(
            neighbors.present_mask(),
            (1 << face_index::POS_X) | (1 << face_index::NEG_Z)
        );
    }
}
