//! Chunk data structures and the chunk pipeline.
//!
//! This module defines the `Chunk` bookkeeping record owned by the
//! streaming controller, the shared read-only `ChunkVoxels` grid produced by
//! the generation task, the explicit generation state machine, and the
//! cancellation/pooling primitives the pipeline is built on. The pipeline
//! stages live in the submodules: `generation` fills grids, `mesh` turns
//! them into buffers, `summary` extracts per-column records, `streaming`
//! schedules all of it and `upload` hands finished buffers to the renderer.

use crate::block::{blocks, BlockId};
use crate::terrain::BiomeId;
use bevy::math::IVec3;
use bevy::prelude::Resource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod generation;
pub mod mesh;
pub mod stats;
pub mod streaming;
pub mod summary;
pub mod upload;

pub use mesh::{MeshBuffer, MeshIndices};
pub use stats::RuntimeStats;
pub use streaming::{ChunkStreamingConfig, Viewer, WorkerBudget};
pub use summary::ColumnSummary;
pub use upload::{RenderSink, RenderTarget};

/// Edge length of a chunk, identical on all three axes (cubic chunks).
pub const CHUNK_SIZE: usize = 16;
/// Voxels per chunk.
pub const CHUNK_VOLUME: usize = CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE;
/// Columns per chunk.
pub const CHUNK_AREA: usize = CHUNK_SIZE * CHUNK_SIZE;

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub const CHUNK_SIZE_I32: i32 = CHUNK_SIZE as i32;

/// 3D integer lattice coordinate uniquely identifying a chunk.
pub type ChunkCoord = IVec3;

/// World-space origin (minimum corner) of a chunk.
#[must_use]
pub fn chunk_origin(coord: ChunkCoord) -> IVec3 {
    coord * CHUNK_SIZE_I32
}

/// Chebyshev distance between two chunk coords, the metric every streaming
/// radius and priority in this crate uses.
#[must_use]
pub fn chunk_distance(a: ChunkCoord, b: ChunkCoord) -> i32 {
    let d = (a - b).abs();
    d.x.max(d.y).max(d.z)
}

/// Generation state machine for a chunk.
///
/// Transitions run exclusively on the main thread:
/// `Empty → Generating → VoxelsReady → Meshing → MeshReady`, with
/// `MeshReady → Meshing` on invalidation (block edit or neighbor becoming
/// ready). Retirement removes the chunk from the map from any state.
/// The variant order matters: readiness checks compare with `>=`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum GenState {
    Empty,
    Generating,
    VoxelsReady,
    Meshing,
    MeshReady,
}

/// Dense voxel grid of one chunk plus the per-column generation metadata
/// the mesher and summary scan reuse.
///
/// Shared behind `Arc`: the generation task fills it exactly once, then
/// every reader (mesh tasks, summaries, block queries) sees an immutable
/// snapshot. Block edits go through `Arc::make_mut` on the main thread, so
/// a task that cloned the Arc keeps reading the grid it started with.
#[derive(Clone)]
pub struct ChunkVoxels {
    blocks: Vec<BlockId>,
    column_biomes: [BiomeId; CHUNK_AREA],
}

impl ChunkVoxels {
    /// An all-air grid reusing pooled storage when available.
    #[must_use]
    pub fn new(mut storage: Vec<BlockId>) -> Self {
        storage.clear();
        storage.resize(CHUNK_VOLUME, blocks::AIR);
        Self {
            blocks: storage,
            column_biomes: [BiomeId::Plains; CHUNK_AREA],
        }
    }

    #[inline]
    fn index(x: usize, y: usize, z: usize) -> usize {
        x + y * CHUNK_SIZE + z * CHUNK_SIZE * CHUNK_SIZE
    }

    /// Read a block at local coordinates. Out-of-bounds reads are `AIR`.
    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize, z: usize) -> BlockId {
        if x >= CHUNK_SIZE || y >= CHUNK_SIZE || z >= CHUNK_SIZE {
            blocks::AIR
        } else {
            self.blocks[Self::index(x, y, z)]
        }
    }

    /// Write a block at local coordinates. Out-of-bounds writes are ignored.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, block: BlockId) {
        if x < CHUNK_SIZE && y < CHUNK_SIZE && z < CHUNK_SIZE {
            self.blocks[Self::index(x, y, z)] = block;
        }
    }

    /// Dominant biome of a column, recorded by the generation task.
    #[inline]
    #[must_use]
    pub fn column_biome(&self, x: usize, z: usize) -> BiomeId {
        self.column_biomes[x + z * CHUNK_SIZE]
    }

    /// Split access to the raw block and biome storage for the generator's
    /// data-parallel fill. Layout: blocks `x + y*16 + z*256`, biomes
    /// `x + z*16`.
    pub(crate) fn raw_parts_mut(&mut self) -> (&mut [BlockId], &mut [BiomeId]) {
        (&mut self.blocks, &mut self.column_biomes)
    }

    /// Mutable access to a whole column's Y-stride.
    pub fn column_mut(&mut self, x: usize, z: usize) -> impl Iterator<Item = &mut BlockId> {
        self.blocks
            .iter_mut()
            .skip(Self::index(x, 0, z))
            .step_by(CHUNK_SIZE)
            .take(CHUNK_SIZE)
    }

    /// Move the block storage out for pooling. Consumes the grid.
    #[must_use]
    pub(crate) fn into_storage(self) -> Vec<BlockId> {
        self.blocks
    }

    /// True when every voxel is air.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|&b| b == blocks::AIR)
    }
}

/// Bookkeeping record for one live chunk, owned by the streaming map.
pub struct Chunk {
    pub coord: ChunkCoord,
    pub state: GenState,
    /// Incremented on every transition into `VoxelsReady` and on every
    /// block edit; mesh buffers carry the revision they were built from.
    pub revision: u64,
    /// The voxel grid; `None` until the generation task publishes.
    pub voxels: Option<Arc<ChunkVoxels>>,
    /// Coalescing flag: set when this chunk needs a fresh mesh, cleared
    /// when the mesh request is dispatched.
    pub needs_remesh: bool,
    /// Whether the renderer currently holds a mesh for this chunk.
    pub mesh_live: bool,
    /// Face-bit mask (canonical face order) of the neighbors whose voxels
    /// were present when the current mesh was built. Used by the
    /// neighbor-remesh discipline to refine edges exactly once.
    pub meshed_neighbors: u8,
    /// Cached column summaries from the last completed mesh pass.
    pub summary: Option<Arc<[ColumnSummary]>>,
}

impl Chunk {
    #[must_use]
    pub fn new(coord: ChunkCoord) -> Self {
        Self {
            coord,
            state: GenState::Empty,
            revision: 0,
            voxels: None,
            needs_remesh: false,
            mesh_live: false,
            meshed_neighbors: 0,
            summary: None,
        }
    }

    /// Whether this chunk's voxels are final enough for readers.
    #[must_use]
    pub fn voxels_ready(&self) -> bool {
        self.state >= GenState::VoxelsReady && self.voxels.is_some()
    }
}

/// Cooperative cancellation token shared between the main thread and one
/// worker task. Checked at batch boundaries (per column, per face row).
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// How many recycled voxel grids the pool keeps before dropping extras.
const GRID_POOL_CAP: usize = 64;

/// Pool of voxel-grid storage, refilled when chunks retire.
///
/// Generation churns one grid per streamed chunk; recycling the backing
/// vectors keeps the steady-state allocation rate near zero.
#[derive(Resource, Default)]
pub struct GridPool {
    free: Vec<Vec<BlockId>>,
}

impl GridPool {
    /// Take storage for one grid, reusing a retired grid when available.
    #[must_use]
    pub fn acquire(&mut self) -> Vec<BlockId> {
        self.free
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(CHUNK_VOLUME))
    }

    /// Return storage to the pool.
    pub fn release(&mut self, storage: Vec<BlockId>) {
        if self.free.len() < GRID_POOL_CAP {
            self.free.push(storage);
        }
    }

    /// Reclaim a retired chunk's grid if this map held the only reference.
    pub fn reclaim(&mut self, voxels: Option<Arc<ChunkVoxels>>) {
        if let Some(arc) = voxels {
            if let Ok(grid) = Arc::try_unwrap(arc) {
                self.release(grid.into_storage());
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.free.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }
}

/// How many recycled mesh storages the pool keeps before dropping extras.
const MESH_POOL_CAP: usize = 64;

/// Pool of mesh build storage, refilled as the upload manager consumes
/// buffers.
#[derive(Resource, Default)]
pub struct MeshBufferPool {
    free: Vec<mesh::MeshStorage>,
}

impl MeshBufferPool {
    #[must_use]
    pub fn acquire(&mut self) -> mesh::MeshStorage {
        self.free.pop().unwrap_or_default()
    }

    pub fn release(&mut self, storage: mesh::MeshStorage) {
        if self.free.len() < MESH_POOL_CAP {
            self.free.push(storage);
        }
    }

    /// Tear a consumed buffer back into recyclable storage.
    ///
    /// 16-bit index buffers were converted at build time and cannot be
    /// reused as the 32-bit working buffer; the attribute vectors carry
    /// most of the capacity either way.
    pub fn reclaim_buffer(&mut self, buffer: MeshBuffer) {
        let indices = match buffer.indices {
            MeshIndices::U32(v) => v,
            MeshIndices::U16(_) => Vec::new(),
        };
        self.release(mesh::MeshStorage {
            positions: buffer.positions,
            normals: buffer.normals,
            uvs: buffer.uvs,
            colors: buffer.colors,
            indices,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.free.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voxel_index_round_trip() {
        let mut grid = ChunkVoxels::new(Vec::new());
        grid.set(3, 7, 11, blocks::STONE);
        assert_eq!(grid.get(3, 7, 11), blocks::STONE);
        assert_eq!(grid.get(3, 7, 12), blocks::AIR);
        // Out-of-bounds reads are air, writes are ignored.
        assert_eq!(grid.get(16, 0, 0), blocks::AIR);
        grid.set(0, 16, 0, blocks::STONE);
        assert_eq!(grid.get(0, 15, 0), blocks::AIR);
    }

    #[test]
    fn column_iterates_y_stride() {
        let mut grid = ChunkVoxels::new(Vec::new());
        for (y, slot) in grid.column_mut(5, 9).enumerate() {
            *slot = if y < 4 { blocks::DIRT } else { blocks::AIR };
        }
        for y in 0..CHUNK_SIZE {
            let want = if y < 4 { blocks::DIRT } else { blocks::AIR };
            assert_eq!(grid.get(5, y, 9), want, "y={y}");
        }
        // Neighboring columns untouched.
        assert_eq!(grid.get(4, 0, 9), blocks::AIR);
        assert_eq!(grid.get(5, 0, 8), blocks::AIR);
    }

    #[test]
    fn state_order_supports_readiness_comparison() {
        assert!(GenState::VoxelsReady > GenState::Generating);
        assert!(GenState::MeshReady > GenState::Meshing);
        assert!(GenState::Empty < GenState::Generating);
    }

    #[test]
    fn cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn grid_pool_recycles_storage() {
        let mut pool = GridPool::default();
        let grid = ChunkVoxels::new(pool.acquire());
        let arc = Arc::new(grid);
        pool.reclaim(Some(arc));
        assert_eq!(pool.len(), 1);

        // A second reference blocks reclamation.
        let arc = Arc::new(ChunkVoxels::new(pool.acquire()));
        let _held = Arc::clone(&arc);
        pool.reclaim(Some(arc));
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn chunk_distance_is_chebyshev() {
        let a = ChunkCoord::new(0, 0, 0);
        assert_eq!(chunk_distance(a, ChunkCoord::new(3, -1, 2)), 3);
        assert_eq!(chunk_distance(a, ChunkCoord::new(0, 5, 0)), 5);
        assert_eq!(chunk_distance(a, a), 0);
    }
}
