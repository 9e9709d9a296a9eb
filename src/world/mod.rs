//! World storage and block access.
//!
//! The `ChunkMap` resource is the single owner of every live chunk; all
//! state-machine transitions and voxel mutations go through it on the main
//! thread. This module also carries the world↔chunk coordinate math and the
//! block-edit barrier: an edit mutates the grid copy-on-write (in-flight
//! readers keep their snapshot), bumps the revision, cancels the now-stale
//! mesh work and flags the affected chunks for remesh.
//!
//! # Example:
//! ```
//! use regolith::world::{world_to_chunk, chunk_to_world};
//! use bevy::math::IVec3;
//!
//! let (coord, local) = world_to_chunk(IVec3::new(35, -3, 18));
//! assert_eq!(coord, IVec3::new(2, -1, 1));
//! assert_eq!(local, IVec3::new(3, 13, 2));
//! assert_eq!(chunk_to_world(coord, local), IVec3::new(35, -3, 18));
//! ```

use crate::block::{blocks, BlockId};
use crate::chunk::streaming::PendingMeshes;
use crate::chunk::{Chunk, ChunkCoord, GenState, CHUNK_SIZE_I32};
use crate::horizon::SummaryBus;
use crate::terrain::TerrainSampler;
use bevy::log::warn;
use bevy::math::IVec3;
use bevy::prelude::{Event, EventReader, Resource};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared handle to the world's immutable terrain sampler.
///
/// Cloned into every worker task; the sampler is read-only after
/// construction, so sharing is lock-free.
#[derive(Resource, Clone)]
pub struct WorldTerrain(pub Arc<TerrainSampler>);

/// The streaming map: every live chunk, keyed by coordinate.
///
/// Exactly one `Chunk` per live coordinate; workers never hold `&mut`
/// into this map, they receive `Arc` snapshots of the grids instead.
#[derive(Resource, Default)]
pub struct ChunkMap {
    pub chunks: HashMap<ChunkCoord, Chunk>,
}

impl ChunkMap {
    #[must_use]
    pub fn get(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.chunks.get(&coord)
    }

    #[must_use]
    pub fn get_mut(&mut self, coord: ChunkCoord) -> Option<&mut Chunk> {
        self.chunks.get_mut(&coord)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Read the block at world coordinates.
    ///
    /// Unloaded chunks and chunks whose voxels are not yet final read as
    /// `AIR`.
    #[must_use]
    pub fn get_block(&self, world_pos: IVec3) -> BlockId {
        let (coord, local) = world_to_chunk(world_pos);
        let Some(chunk) = self.chunks.get(&coord) else {
            return blocks::AIR;
        };
        if !chunk.voxels_ready() {
            return blocks::AIR;
        }
        chunk.voxels.as_ref().map_or(blocks::AIR, |v| {
            v.get(local.x as usize, local.y as usize, local.z as usize)
        })
    }

    /// Mutate one voxel of a loaded chunk.
    ///
    /// Copy-on-write through `Arc::make_mut`: a mesh task that snapshotted
    /// the grid keeps reading its snapshot while the map moves to the
    /// edited copy. Bumps the revision so buffers built from the old grid
    /// are discarded, and marks the chunk for remesh.
    ///
    /// # Return
    /// The edited chunk's coordinate and local voxel position, or `None`
    /// when the target chunk is absent or its voxels are not yet final.
    pub fn set_block(&mut self, world_pos: IVec3, block: BlockId) -> Option<(ChunkCoord, IVec3)> {
        let (coord, local) = world_to_chunk(world_pos);
        let chunk = self.chunks.get_mut(&coord)?;
        if !chunk.voxels_ready() {
            return None;
        }

        let voxels = chunk.voxels.as_mut()?;
        let grid = Arc::make_mut(voxels);
        grid.set(local.x as usize, local.y as usize, local.z as usize, block);
        chunk.revision += 1;
        chunk.needs_remesh = true;
        if chunk.state == GenState::MeshReady {
            chunk.state = GenState::Meshing;
        }
        Some((coord, local))
    }
}

/// Split world coordinates into chunk coordinate and local voxel position.
#[must_use]
pub fn world_to_chunk(world_pos: IVec3) -> (ChunkCoord, IVec3) {
    let coord = IVec3::new(
        world_pos.x.div_euclid(CHUNK_SIZE_I32),
        world_pos.y.div_euclid(CHUNK_SIZE_I32),
        world_pos.z.div_euclid(CHUNK_SIZE_I32),
    );
    let local = IVec3::new(
        world_pos.x.rem_euclid(CHUNK_SIZE_I32),
        world_pos.y.rem_euclid(CHUNK_SIZE_I32),
        world_pos.z.rem_euclid(CHUNK_SIZE_I32),
    );
    (coord, local)
}

/// Inverse of [`world_to_chunk`].
#[must_use]
pub fn chunk_to_world(coord: ChunkCoord, local: IVec3) -> IVec3 {
    coord * CHUNK_SIZE_I32 + local
}

/// A block mutation request from the outer program.
#[derive(Event, Debug, Clone, Copy)]
pub struct BlockEdit {
    pub position: IVec3, // World-space voxel position.
    pub block: BlockId,  // New block id (AIR removes).
}

#[inline]
fn f32_floor_to_i32(v: f32) -> i32 {
    debug_assert!(
        v.is_finite() && (-2_147_483_648.0_f32..=2_147_483_647.0_f32).contains(&v),
        "coordinate out of i32 range",
    );
    #[allow(clippy::cast_possible_truncation)]
    {
        v.floor() as i32
    }
}

/// March a ray through loaded voxels to find the block being targeted.
///
/// Steps in small increments from `origin` along `direction` until a
/// non-air voxel is hit or `max_distance` is exhausted.
///
/// # Arguments
/// * `map` - the live chunk map
/// * `origin` - ray start (usually the camera position)
/// * `direction` - ray direction (normalized internally)
/// * `max_distance` - how far to search, in world units
///
/// # Return
/// `(hit_block_pos, last_air_pos)`: the hit voxel and the adjacent cell
/// the ray came from, which is where a placed block would go.
#[must_use]
pub fn raycast_block(
    map: &ChunkMap,
    origin: bevy::math::Vec3,
    direction: bevy::math::Vec3,
    max_distance: f32,
) -> Option<(IVec3, IVec3)> {
    let step = direction.normalize() * 0.1;
    let mut pos = origin;
    let mut last_air_pos = IVec3::new(
        f32_floor_to_i32(pos.x),
        f32_floor_to_i32(pos.y),
        f32_floor_to_i32(pos.z),
    );

    let mut distance = 0.0;
    while distance < max_distance {
        let block_pos = IVec3::new(
            f32_floor_to_i32(pos.x),
            f32_floor_to_i32(pos.y),
            f32_floor_to_i32(pos.z),
        );
        if map.get_block(block_pos) != blocks::AIR {
            return Some((block_pos, last_air_pos));
        }
        last_air_pos = block_pos;
        pos += step;
        distance += 0.1;
    }
    None
}

/// Faces of the chunk a local voxel position touches, as a face-bit mask
/// in canonical face order. Non-zero only for border voxels.
#[must_use]
pub fn boundary_faces(local: IVec3) -> u8 {
    let mut mask = 0u8;
    if local.z == 0 {
        mask |= 1 << crate::atlas::face_index::NEG_Z;
    }
    if local.z == CHUNK_SIZE_I32 - 1 {
        mask |= 1 << crate::atlas::face_index::POS_Z;
    }
    if local.y == CHUNK_SIZE_I32 - 1 {
        mask |= 1 << crate::atlas::face_index::POS_Y;
    }
    if local.y == 0 {
        mask |= 1 << crate::atlas::face_index::NEG_Y;
    }
    if local.x == 0 {
        mask |= 1 << crate::atlas::face_index::NEG_X;
    }
    if local.x == CHUNK_SIZE_I32 - 1 {
        mask |= 1 << crate::atlas::face_index::POS_X;
    }
    mask
}

/// Apply queued block edits with the main-thread write barrier.
///
/// Per edit: cancel in-flight mesh work made stale by the mutation, apply
/// it copy-on-write, bump the revision, flag the chunk (and any boundary
/// neighbors) for remesh and invalidate the published column summary.
#[allow(clippy::needless_pass_by_value)]
pub fn apply_block_edits(
    mut edits: EventReader<BlockEdit>,
    mut map: bevy::prelude::ResMut<ChunkMap>,
    mut pending_meshes: bevy::prelude::ResMut<PendingMeshes>,
    mut bus: bevy::prelude::ResMut<SummaryBus>,
) {
    for edit in edits.read() {
        let (target, _) = world_to_chunk(edit.position);

        // The edited chunk's own in-flight mesh is stale either way.
        pending_meshes.cancel_for(target);

        let Some((coord, local)) = map.set_block(edit.position, edit.block) else {
            warn!("dropping edit at {:?}: chunk not ready", edit.position);
            continue;
        };
        pending_meshes.queue_remesh(coord);
        bus.invalidate(coord);

        // Edits on a chunk border change the neighbor's culling too.
        let mask = boundary_faces(local);
        for (face_i, face) in crate::atlas::FACES.iter().enumerate() {
            if mask & (1 << face_i) == 0 {
                continue;
            }
            let neighbor_coord = coord + face.offset;
            pending_meshes.cancel_for(neighbor_coord);
            if let Some(neighbor) = map.get_mut(neighbor_coord) {
                if neighbor.voxels_ready() {
                    neighbor.needs_remesh = true;
                    if neighbor.state == GenState::MeshReady {
                        neighbor.state = GenState::Meshing;
                    }
                    pending_meshes.queue_remesh(neighbor_coord);
                }
            }
        }
    }
}
