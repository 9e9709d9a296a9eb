//! Frame-budgeted mesh upload to the renderer.
//!
//! Finished mesh buffers queue here and are applied on the main thread a
//! few per frame: a priority FIFO for chunks close to the viewer, a normal
//! FIFO for the rest. The per-frame pass is bounded both by an upload
//! count and by wall time, and the count adapts to the measured frame time
//! within a clamped range. Before a buffer is applied its revision is
//! checked against the chunk's current revision; stale buffers are
//! discarded (they were built from voxels that no longer exist).
//!
//! The renderer itself is external: the `RenderSink` trait is the seam the
//! surrounding program implements, and handoff is an atomic replace of
//! whatever the sink held for that chunk coordinate.

use super::{chunk_origin, ChunkCoord, MeshBuffer, MeshBufferPool};
use crate::chunk::RuntimeStats;
use crate::world::ChunkMap;
use bevy::math::Vec3;
use bevy::prelude::{Res, ResMut, Resource, Time};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// The seam to the external renderer.
///
/// `apply_mesh` replaces whatever resource the sink holds for
/// `buffer.coord` in one step; `retire_mesh` drops it. Both are called
/// only from the main thread.
pub trait RenderSink: Send + Sync + 'static {
    fn apply_mesh(&mut self, origin: Vec3, buffer: &MeshBuffer);
    fn retire_mesh(&mut self, coord: ChunkCoord);
}

/// Resource wrapper holding the program's render sink.
#[derive(Resource)]
pub struct RenderTarget(pub Box<dyn RenderSink>);

/// Sink that discards everything; used headless and as the default.
pub struct NullRenderSink;

impl RenderSink for NullRenderSink {
    fn apply_mesh(&mut self, _origin: Vec3, _buffer: &MeshBuffer) {}
    fn retire_mesh(&mut self, _coord: ChunkCoord) {}
}

/// What a recording sink saw, for tests and the demo binary.
#[derive(Default)]
pub struct RecordingLog {
    pub applied: Vec<(ChunkCoord, u64, usize)>, // (coord, revision, triangles)
    pub retired: Vec<ChunkCoord>,
}

/// Sink that records applications; clones share the log so a test can keep
/// a handle after moving the sink into `RenderTarget`.
#[derive(Clone, Default)]
pub struct RecordingRenderSink {
    pub log: Arc<Mutex<RecordingLog>>,
}

impl RenderSink for RecordingRenderSink {
    fn apply_mesh(&mut self, _origin: Vec3, buffer: &MeshBuffer) {
        if let Ok(mut log) = self.log.lock() {
            log.applied
                .push((buffer.coord, buffer.revision, buffer.triangle_count()));
        }
    }

    fn retire_mesh(&mut self, coord: ChunkCoord) {
        if let Ok(mut log) = self.log.lock() {
            log.retired.push(coord);
        }
    }
}

/// The two upload FIFOs.
#[derive(Resource, Default)]
pub struct UploadQueues {
    pub priority: VecDeque<MeshBuffer>, // Chunks within the priority radius.
    pub normal: VecDeque<MeshBuffer>,
}

impl UploadQueues {
    pub fn push(&mut self, buffer: MeshBuffer, priority: bool) {
        if priority {
            self.priority.push_back(buffer);
        } else {
            self.normal.push_back(buffer);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.priority.len() + self.normal.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.priority.is_empty() && self.normal.is_empty()
    }

    fn pop(&mut self) -> Option<MeshBuffer> {
        self.priority.pop_front().or_else(|| self.normal.pop_front())
    }
}

/// Per-frame upload limits with dynamic adjustment.
#[derive(Resource, Clone, Debug)]
pub struct UploadBudget {
    /// Configured target; the dynamic value is clamped to ±50% of this.
    pub configured_uploads_per_frame: usize,
    /// Current per-frame cap, adjusted by frame-time headroom.
    pub max_uploads_per_frame: usize,
    /// Wall-time cap for one frame's upload pass.
    pub time_budget: Duration,
    /// Frame time the adjustment steers toward.
    pub target_frame_time: Duration,
}

impl Default for UploadBudget {
    fn default() -> Self {
        Self::new(4, Duration::from_millis(8), Duration::from_micros(16_600))
    }
}

impl UploadBudget {
    #[must_use]
    pub fn new(uploads_per_frame: usize, time_budget: Duration, target_frame_time: Duration) -> Self {
        Self {
            configured_uploads_per_frame: uploads_per_frame.max(1),
            max_uploads_per_frame: uploads_per_frame.max(1),
            time_budget,
            target_frame_time,
        }
    }

    /// The clamp range for the dynamic cap: ±50% of the configured value.
    #[must_use]
    pub fn bounds(&self) -> (usize, usize) {
        let lo = (self.configured_uploads_per_frame / 2).max(1);
        let hi = (self.configured_uploads_per_frame * 3 / 2).max(1);
        (lo, hi)
    }

    /// Nudge the cap by one based on the previous frame's time.
    pub fn adjust(&mut self, frame_time: Duration) {
        let (lo, hi) = self.bounds();
        let fast = self.target_frame_time.mul_f32(0.8);
        let slow = self.target_frame_time.mul_f32(1.2);
        if frame_time < fast && self.max_uploads_per_frame < hi {
            self.max_uploads_per_frame += 1;
        } else if frame_time > slow && self.max_uploads_per_frame > lo {
            self.max_uploads_per_frame -= 1;
        }
    }
}

/// One frame's upload pass. Pops priority-first, verifies the revision
/// guard, applies through the sink, and stops at whichever limit is hit
/// first. Remaining buffers stay queued for subsequent frames.
///
/// # Return
/// Number of buffers applied.
pub fn drain_uploads(
    queues: &mut UploadQueues,
    budget: &UploadBudget,
    map: &mut ChunkMap,
    sink: &mut dyn RenderSink,
    stats: &mut RuntimeStats,
    pool: &mut MeshBufferPool,
) -> usize {
    let start = Instant::now();
    let mut applied = 0usize;

    while applied < budget.max_uploads_per_frame && start.elapsed() < budget.time_budget {
        let Some(buffer) = queues.pop() else { break };

        let Some(chunk) = map.get_mut(buffer.coord) else {
            // Retired while queued; nothing references the grid anymore.
            pool.reclaim_buffer(buffer);
            continue;
        };
        if buffer.revision != chunk.revision {
            stats.stale_buffers_discarded += 1;
            pool.reclaim_buffer(buffer);
            continue;
        }

        let origin = chunk_origin(buffer.coord).as_vec3();
        sink.apply_mesh(origin, &buffer);
        chunk.mesh_live = true;
        stats.update_chunk(buffer.coord, buffer.triangle_count());
        applied += 1;
        pool.reclaim_buffer(buffer);
    }

    stats.uploads_last_frame = applied;
    stats.upload_time_last_frame = start.elapsed();
    applied
}

/// System wrapper: run the upload pass and let the budget adapt to the
/// frame time.
#[allow(clippy::needless_pass_by_value)]
pub fn upload_meshes(
    time: Res<Time>,
    mut queues: ResMut<UploadQueues>,
    mut budget: ResMut<UploadBudget>,
    mut map: ResMut<ChunkMap>,
    mut target: ResMut<RenderTarget>,
    mut stats: ResMut<RuntimeStats>,
    mut pool: ResMut<MeshBufferPool>,
) {
    drain_uploads(
        &mut queues,
        &budget,
        &mut map,
        target.0.as_mut(),
        &mut stats,
        &mut pool,
    );
    budget.adjust(time.delta());
}
