//! Chunk streaming and pipeline scheduling.
//!
//! The streaming controller decides which chunks must exist for the current
//! viewer position, allocates them, queues terrain and mesh work onto the
//! async compute pool with bounded per-category parallelism, collects
//! finished results on the main thread (the single serialization point for
//! every state-machine transition), retires chunks that leave the view
//! sphere, and keeps chunk borders converging through the neighbor-remesh
//! discipline.

use super::generation::{generate_chunk_voxels, TerrainBuildResult};
use super::mesh::{build_chunk_mesh, MeshBuffer, NeighborSnapshots};
use super::summary::{scan_columns, ColumnSummary};
use super::upload::{RenderTarget, UploadQueues};
use super::{
    chunk_distance, CancelFlag, Chunk, ChunkCoord, GenState, GridPool, MeshBufferPool,
    RuntimeStats, CHUNK_SIZE_I32,
};
use crate::atlas::{AtlasUVMap, FACES};
use crate::block::BlockRegistry;
use crate::horizon::SummaryBus;
use crate::world::{ChunkMap, WorldTerrain};
use bevy::log::info;
use bevy::math::Vec3;
use bevy::prelude::{Res, ResMut, Resource, Time};
use bevy::tasks::{AsyncComputeTaskPool, Task};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// The viewer the world streams around. The surrounding program writes the
/// position every frame; everything else in the pipeline derives from it.
#[derive(Resource, Default)]
pub struct Viewer {
    pub position: Vec3,
}

impl Viewer {
    /// Chunk coordinate containing the viewer.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn chunk(&self) -> ChunkCoord {
        let size = CHUNK_SIZE_I32 as f32;
        ChunkCoord::new(
            (self.position.x / size).floor() as i32,
            (self.position.y / size).floor() as i32,
            (self.position.z / size).floor() as i32,
        )
    }
}

/// Configuration parameters controlling streaming distances and pacing.
#[derive(Resource, Clone, Debug)]
pub struct ChunkStreamingConfig {
    pub horizontal_radius: i32, // Chunks kept loaded around the viewer (x/z).
    pub vertical_radius: i32,   // Chunks kept loaded above/below (y).
    pub unload_buffer: i32,     // Extra ring beyond the radii before retiring.
    pub max_allocations_per_tick: usize, // New chunks allocated per update.
    pub priority_radius: i32,   // Uploads inside this radius use the fast queue.
}

impl Default for ChunkStreamingConfig {
    fn default() -> Self {
        Self {
            horizontal_radius: 6,
            vertical_radius: 2,
            unload_buffer: 2,
            max_allocations_per_tick: 24,
            priority_radius: 3,
        }
    }
}

/// Bounded in-flight parallelism per task category.
///
/// Tasks beyond the cap wait in the queues; the compute pool itself is
/// shared, the caps keep either category from monopolizing it.
#[derive(Resource, Clone, Copy, Debug)]
pub struct WorkerBudget {
    pub terrain: usize,
    pub mesh: usize,
}

impl Default for WorkerBudget {
    fn default() -> Self {
        let cores = std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get);
        let per_category = cores.saturating_sub(2).max(1);
        Self { terrain: per_category, mesh: per_category }
    }
}

/// An in-flight terrain generation task.
pub struct TerrainTask {
    pub coord: ChunkCoord,
    pub cancel: CancelFlag,
    pub task: Task<TerrainBuildResult>,
}

/// Terrain work: a distance-ordered queue plus the in-flight tasks.
#[derive(Resource, Default)]
pub struct PendingTerrain {
    pub queue: Vec<ChunkCoord>,
    queued: HashSet<ChunkCoord>,
    pub tasks: Vec<TerrainTask>,
}

impl PendingTerrain {
    /// Queue a coordinate once; repeats are coalesced.
    pub fn enqueue(&mut self, coord: ChunkCoord) {
        if self.queued.insert(coord) {
            self.queue.push(coord);
        }
    }

    /// Drop a queued coordinate (retirement).
    pub fn forget(&mut self, coord: ChunkCoord) {
        if self.queued.remove(&coord) {
            self.queue.retain(|c| *c != coord);
        }
    }

    /// Cancel any in-flight task producing for `coord`.
    pub fn cancel_for(&mut self, coord: ChunkCoord) {
        for task in &self.tasks {
            if task.coord == coord {
                task.cancel.cancel();
            }
        }
    }

    /// Queued plus in-flight work, for the debug counters.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.queue.len() + self.tasks.len()
    }
}

/// What a finished mesh task hands back: the buffer plus the column
/// summaries chained onto the same worker pass.
pub struct MeshJobOutput {
    pub buffer: MeshBuffer,
    pub summary: Vec<ColumnSummary>,
}

/// An in-flight mesh build task.
pub struct MeshTask {
    pub coord: ChunkCoord,
    pub revision: u64,
    pub cancel: CancelFlag,
    pub task: Task<Option<MeshJobOutput>>,
}

/// Mesh work: a distance-ordered queue plus the in-flight tasks.
#[derive(Resource, Default)]
pub struct PendingMeshes {
    pub queue: Vec<ChunkCoord>,
    queued: HashSet<ChunkCoord>,
    pub tasks: Vec<MeshTask>,
}

impl PendingMeshes {
    /// Queue a (re)mesh once; repeats are coalesced.
    pub fn queue_remesh(&mut self, coord: ChunkCoord) {
        if self.queued.insert(coord) {
            self.queue.push(coord);
        }
    }

    pub fn forget(&mut self, coord: ChunkCoord) {
        if self.queued.remove(&coord) {
            self.queue.retain(|c| *c != coord);
        }
    }

    pub fn cancel_for(&mut self, coord: ChunkCoord) {
        for task in &self.tasks {
            if task.coord == coord {
                task.cancel.cancel();
            }
        }
    }

    /// Whether a task for `coord` is already on the pool.
    #[must_use]
    pub fn has_task(&self, coord: ChunkCoord) -> bool {
        self.tasks.iter().any(|t| t.coord == coord)
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.queue.len() + self.tasks.len()
    }
}

/// Whether `coord` lies within the given radii of `center`.
#[must_use]
fn in_range(coord: ChunkCoord, center: ChunkCoord, horizontal: i32, vertical: i32) -> bool {
    let d = (coord - center).abs();
    d.x.max(d.z) <= horizontal && d.y <= vertical
}

/// Streaming priority: horizontal Chebyshev distance dominates, vertical
/// distance breaks ties (columns load before caps above/below them).
#[must_use]
fn stream_priority(coord: ChunkCoord, center: ChunkCoord) -> i32 {
    let d = (coord - center).abs();
    d.x.max(d.z) * 4 + d.y
}

/// Per-update streaming pass: retire what left the sphere (plus buffer),
/// allocate what entered it, nearest first and rate-limited.
#[allow(clippy::needless_pass_by_value, clippy::too_many_arguments)]
pub fn stream_chunks(
    viewer: Res<Viewer>,
    config: Res<ChunkStreamingConfig>,
    mut map: ResMut<ChunkMap>,
    mut pending_terrain: ResMut<PendingTerrain>,
    mut pending_meshes: ResMut<PendingMeshes>,
    mut pool: ResMut<GridPool>,
    mut stats: ResMut<RuntimeStats>,
    mut target: ResMut<RenderTarget>,
    mut bus: ResMut<SummaryBus>,
) {
    let center = viewer.chunk();

    // Retirement: everything outside the expanded sphere. The buffer ring
    // keeps boundary chunks from thrashing as the viewer wanders.
    let retire_h = config.horizontal_radius + config.unload_buffer;
    let retire_v = config.vertical_radius + config.unload_buffer;
    let to_retire: Vec<ChunkCoord> = map
        .chunks
        .keys()
        .filter(|c| !in_range(**c, center, retire_h, retire_v))
        .copied()
        .collect();

    for coord in to_retire {
        pending_terrain.cancel_for(coord);
        pending_terrain.forget(coord);
        pending_meshes.cancel_for(coord);
        pending_meshes.forget(coord);

        if let Some(chunk) = map.chunks.remove(&coord) {
            if chunk.mesh_live {
                target.0.retire_mesh(coord);
            }
            pool.reclaim(chunk.voxels);
            stats.remove_chunk(coord);
            bus.invalidate(coord);
        }
    }

    // Allocation: missing coords inside the sphere, nearest first, capped
    // per tick so a teleport does not stall the frame.
    let mut missing: Vec<(i32, ChunkCoord)> = Vec::new();
    for dx in -config.horizontal_radius..=config.horizontal_radius {
        for dz in -config.horizontal_radius..=config.horizontal_radius {
            for dy in -config.vertical_radius..=config.vertical_radius {
                let coord = center + ChunkCoord::new(dx, dy, dz);
                if !map.chunks.contains_key(&coord) {
                    missing.push((stream_priority(coord, center), coord));
                }
            }
        }
    }
    missing.sort_by_key(|(priority, _)| *priority);

    for (_, coord) in missing.into_iter().take(config.max_allocations_per_tick) {
        map.chunks.insert(coord, Chunk::new(coord));
        pending_terrain.enqueue(coord);
    }
}

/// Move queued terrain work onto the compute pool, nearest first, up to
/// the category's in-flight cap.
#[allow(clippy::needless_pass_by_value)]
pub fn dispatch_terrain_tasks(
    viewer: Res<Viewer>,
    budget: Res<WorkerBudget>,
    terrain: Res<WorldTerrain>,
    mut map: ResMut<ChunkMap>,
    mut pending: ResMut<PendingTerrain>,
    mut pool: ResMut<GridPool>,
) {
    if pending.queue.is_empty() {
        return;
    }
    let center = viewer.chunk();
    pending.queue.sort_by_key(|c| stream_priority(*c, center));

    let task_pool = AsyncComputeTaskPool::get();
    while pending.tasks.len() < budget.terrain && !pending.queue.is_empty() {
        let coord = pending.queue.remove(0);
        pending.queued.remove(&coord);

        // Retired (or otherwise moved on) while queued.
        let Some(chunk) = map.get_mut(coord) else { continue };
        if chunk.state != GenState::Empty {
            continue;
        }
        chunk.state = GenState::Generating;

        let cancel = CancelFlag::new();
        let flag = cancel.clone();
        let sampler = Arc::clone(&terrain.0);
        let storage = pool.acquire();
        let task = task_pool.spawn(async move {
            crate::debug::record_thread_global("chunk_terrain_task");
            let voxels = generate_chunk_voxels(coord, &sampler, &flag, storage);
            TerrainBuildResult { coord, voxels }
        });
        pending.tasks.push(TerrainTask { coord, cancel, task });
    }
}

/// Drain finished terrain tasks: publish grids, advance the state machine,
/// queue the chunk's first mesh and wake neighbors whose meshes were built
/// while this chunk was absent.
pub fn collect_terrain_results(
    mut map: ResMut<ChunkMap>,
    mut pending: ResMut<PendingTerrain>,
    mut meshes: ResMut<PendingMeshes>,
    mut pool: ResMut<GridPool>,
) {
    let mut newly_ready: Vec<ChunkCoord> = Vec::new();
    let mut regenerate: Vec<ChunkCoord> = Vec::new();

    pending.tasks.retain_mut(|t| {
        if !t.task.is_finished() {
            return true;
        }
        let Ok(result) = catch_unwind(AssertUnwindSafe(|| {
            futures::executor::block_on(&mut t.task)
        })) else {
            return false;
        };

        match map.get_mut(result.coord) {
            Some(chunk) if chunk.state == GenState::Generating => {
                if let Some(grid) = result.voxels {
                    chunk.voxels = Some(Arc::new(grid));
                    chunk.state = GenState::VoxelsReady;
                    chunk.revision += 1;
                    chunk.needs_remesh = true;
                    newly_ready.push(result.coord);
                } else {
                    // Cancelled but still wanted: back to the queue.
                    chunk.state = GenState::Empty;
                    regenerate.push(result.coord);
                }
            }
            _ => {
                // Retired while generating; recycle the storage.
                if let Some(grid) = result.voxels {
                    pool.release(grid.into_storage());
                }
            }
        }
        false
    });

    for coord in regenerate {
        pending.enqueue(coord);
    }

    for coord in newly_ready {
        meshes.queue_remesh(coord);

        // Neighbor-remesh discipline: a neighbor whose current mesh was
        // built while this chunk was absent revisits its edge faces. The
        // opposite face index is the pair partner in the canonical order.
        for (face_i, face) in FACES.iter().enumerate() {
            let neighbor_coord = coord + face.offset;
            let Some(neighbor) = map.get_mut(neighbor_coord) else { continue };
            let opposite = face_i ^ 1;
            if neighbor.state >= GenState::Meshing
                && neighbor.meshed_neighbors & (1 << opposite) == 0
            {
                neighbor.needs_remesh = true;
                if neighbor.state == GenState::MeshReady {
                    neighbor.state = GenState::Meshing;
                }
                meshes.queue_remesh(neighbor_coord);
            }
        }
    }
}

/// Move queued mesh work onto the compute pool.
///
/// A mesh may start only when the chunk and every *present* neighbor are
/// at least `VoxelsReady`; absent neighbors are covered by the edge-policy
/// surrogate and do not block. Snapshots of the grids are taken here, on
/// the main thread, so they are consistent by construction.
#[allow(clippy::needless_pass_by_value, clippy::too_many_arguments)]
pub fn dispatch_mesh_tasks(
    viewer: Res<Viewer>,
    budget: Res<WorkerBudget>,
    terrain: Res<WorldTerrain>,
    registry: Res<BlockRegistry>,
    atlas: Res<AtlasUVMap>,
    mut map: ResMut<ChunkMap>,
    mut pending: ResMut<PendingMeshes>,
    mut buffer_pool: ResMut<MeshBufferPool>,
) {
    if pending.queue.is_empty() {
        return;
    }
    let center = viewer.chunk();
    pending.queue.sort_by_key(|c| stream_priority(*c, center));

    let task_pool = AsyncComputeTaskPool::get();
    let mut deferred: Vec<ChunkCoord> = Vec::new();

    while pending.tasks.len() < budget.mesh && !pending.queue.is_empty() {
        let coord = pending.queue.remove(0);

        let Some(chunk) = map.get(coord) else {
            pending.queued.remove(&coord);
            continue;
        };
        if !chunk.voxels_ready() || pending.has_task(coord) {
            deferred.push(coord);
            continue;
        }

        // Gate on present-but-unready neighbors; take snapshots of the
        // ready ones in the same pass.
        let mut neighbors = NeighborSnapshots::default();
        let mut gated = false;
        for (face_i, face) in FACES.iter().enumerate() {
            if let Some(neighbor) = map.get(coord + face.offset) {
                if neighbor.voxels_ready() {
                    let grid = neighbor
                        .voxels
                        .as_ref()
                        .expect("ready chunk has voxels");
                    neighbors.set(face_i, Arc::clone(grid));
                } else {
                    gated = true;
                    break;
                }
            }
        }
        if gated {
            deferred.push(coord);
            continue;
        }

        pending.queued.remove(&coord);
        let mask = neighbors.present_mask();
        let chunk = map.get_mut(coord).expect("chunk checked above");
        chunk.state = GenState::Meshing;
        chunk.needs_remesh = false;
        chunk.meshed_neighbors = mask;
        let revision = chunk.revision;
        let voxels = Arc::clone(chunk.voxels.as_ref().expect("ready chunk has voxels"));

        let cancel = CancelFlag::new();
        let flag = cancel.clone();
        let sampler = Arc::clone(&terrain.0);
        let registry = registry.clone();
        let uvs = atlas.clone();
        let storage = buffer_pool.acquire();
        let task = task_pool.spawn(async move {
            crate::debug::record_thread_global("chunk_mesh_task");
            let buffer = build_chunk_mesh(
                coord, revision, &voxels, &neighbors, &registry, &uvs, &sampler, &flag, storage,
            )?;
            let summary = scan_columns(coord, &voxels);
            Some(MeshJobOutput { buffer, summary })
        });
        pending.tasks.push(MeshTask { coord, revision, cancel, task });
    }

    // Blocked coords stay queued; the next pass re-sorts them anyway.
    pending.queue.extend(deferred);
}

/// Drain finished mesh tasks: advance states, publish summaries, route
/// buffers into the upload queues, and drop anything stale or retired.
#[allow(clippy::needless_pass_by_value, clippy::too_many_arguments)]
pub fn collect_mesh_results(
    viewer: Res<Viewer>,
    config: Res<ChunkStreamingConfig>,
    mut map: ResMut<ChunkMap>,
    mut pending: ResMut<PendingMeshes>,
    mut uploads: ResMut<UploadQueues>,
    mut bus: ResMut<SummaryBus>,
    mut stats: ResMut<RuntimeStats>,
    mut target: ResMut<RenderTarget>,
    mut buffer_pool: ResMut<MeshBufferPool>,
) {
    let center = viewer.chunk();
    let mut requeue: Vec<ChunkCoord> = Vec::new();

    pending.tasks.retain_mut(|t| {
        if !t.task.is_finished() {
            return true;
        }
        let Ok(output) = catch_unwind(AssertUnwindSafe(|| {
            futures::executor::block_on(&mut t.task)
        })) else {
            return false;
        };
        let Some(chunk) = map.get_mut(t.coord) else {
            // Retired while meshing; the buffer dies here.
            return false;
        };

        match output {
            None => {
                // Cancelled. If the chunk is still wanted the remesh flag
                // is set (edit path) or will be set by whoever cancelled.
                if chunk.state == GenState::Meshing {
                    chunk.state = GenState::VoxelsReady;
                }
                if chunk.needs_remesh {
                    requeue.push(t.coord);
                }
            }
            Some(out) => {
                if out.buffer.revision != chunk.revision {
                    // Built from voxels that no longer exist.
                    stats.stale_buffers_discarded += 1;
                    buffer_pool.reclaim_buffer(out.buffer);
                    requeue.push(t.coord);
                } else {
                    chunk.state = GenState::MeshReady;
                    let summary: Arc<[ColumnSummary]> = Arc::from(out.summary);
                    chunk.summary = Some(Arc::clone(&summary));
                    bus.publish(t.coord, summary);

                    if out.buffer.is_empty() {
                        // Nothing to draw; replace any previous mesh with
                        // nothing rather than uploading an empty buffer.
                        if chunk.mesh_live {
                            target.0.retire_mesh(t.coord);
                            chunk.mesh_live = false;
                        }
                        stats.update_chunk(t.coord, 0);
                        buffer_pool.reclaim_buffer(out.buffer);
                    } else {
                        let priority =
                            chunk_distance(t.coord, center) <= config.priority_radius;
                        uploads.push(out.buffer, priority);
                    }

                    if chunk.needs_remesh {
                        requeue.push(t.coord);
                    }
                }
            }
        }
        false
    });

    for coord in requeue {
        pending.queue_remesh(coord);
    }
}

/// Refresh the inspection counters exposed by `RuntimeStats`.
#[allow(clippy::needless_pass_by_value)]
pub fn refresh_runtime_stats(
    map: Res<ChunkMap>,
    terrain: Res<PendingTerrain>,
    meshes: Res<PendingMeshes>,
    uploads: Res<UploadQueues>,
    mut stats: ResMut<RuntimeStats>,
) {
    stats.loaded_chunks = map.len();
    stats.terrain_queue_depth = terrain.depth();
    stats.mesh_queue_depth = meshes.depth();
    stats.pending_remesh = map.chunks.values().filter(|c| c.needs_remesh).count();
    stats.upload_queue_depth = uploads.len();
}

/// Lightweight diagnostics for streaming, logged at most once per second.
#[derive(Resource, Default)]
pub struct StreamingDiagnostics {
    pub last_log_seconds: f64,
}

#[allow(clippy::needless_pass_by_value)]
pub fn streaming_diagnostics(
    time: Res<Time>,
    mut diag: ResMut<StreamingDiagnostics>,
    stats: Res<RuntimeStats>,
) {
    let now = time.elapsed_seconds_f64();
    if now - diag.last_log_seconds > 1.0 {
        diag.last_log_seconds = now;
        info!(
            "streaming: loaded={} terrain_q={} mesh_q={} upload_q={} remesh={} tris={} uploads/frame={}",
            stats.loaded_chunks,
            stats.terrain_queue_depth,
            stats.mesh_queue_depth,
            stats.upload_queue_depth,
            stats.pending_remesh,
            stats.total_triangles,
            stats.uploads_last_frame,
        );
    }
}
