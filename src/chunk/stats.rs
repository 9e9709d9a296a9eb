//! Runtime statistics and the debug/inspection counters.
//!
//! `RuntimeStats` tracks per-chunk triangle counts plus the pipeline
//! counters the debug surface exposes: loaded chunks, per-category queue
//! depths, uploads and wall time spent by the last frame's upload pass, and
//! the size of the pending-remesh set.
//!
//! # Example:
//! ```
//! use regolith::chunk::RuntimeStats;
//! use bevy::math::IVec3;
//! let mut stats = RuntimeStats::default();
//! stats.update_chunk(IVec3::new(0, 0, 0), 100);
//! assert_eq!(stats.total_triangles, 100);
//! ```

use super::ChunkCoord;
use bevy::prelude::Resource;
use std::collections::HashMap;
use std::time::Duration;

/// Aggregated runtime counters, updated by the pipeline systems each frame.
#[derive(Resource, Default)]
pub struct RuntimeStats {
    pub per_chunk_triangles: HashMap<ChunkCoord, usize>,
    pub total_triangles: usize,
    /// Live chunks in the streaming map.
    pub loaded_chunks: usize,
    /// Terrain tasks in flight plus queued.
    pub terrain_queue_depth: usize,
    /// Mesh tasks in flight plus queued.
    pub mesh_queue_depth: usize,
    /// Chunks currently flagged for remesh.
    pub pending_remesh: usize,
    /// Buffers waiting in the upload queues.
    pub upload_queue_depth: usize,
    /// Mesh buffers applied during the last frame.
    pub uploads_last_frame: usize,
    /// Wall time the last frame's upload pass consumed.
    pub upload_time_last_frame: Duration,
    /// Stale buffers discarded by the revision guard since startup.
    pub stale_buffers_discarded: usize,
}

impl RuntimeStats {
    /// Update the triangle count for a chunk and adjust the global total.
    ///
    /// # Arguments
    /// * `coord` - chunk the count belongs to
    /// * `tri_count` - triangle count of the chunk's latest mesh
    pub fn update_chunk(&mut self, coord: ChunkCoord, tri_count: usize) {
        let prev = self.per_chunk_triangles.insert(coord, tri_count).unwrap_or(0);
        self.total_triangles = self.total_triangles + tri_count - prev;
    }

    /// Remove a chunk's stats (e.g. when retiring) and adjust the total.
    pub fn remove_chunk(&mut self, coord: ChunkCoord) {
        if let Some(prev) = self.per_chunk_triangles.remove(&coord) {
            self.total_triangles = self.total_triangles.saturating_sub(prev);
        }
    }

    /// Return the top N chunks sorted by triangle count (descending).
    #[must_use]
    pub fn top_chunks(&self, n: usize) -> Vec<(ChunkCoord, usize)> {
        let mut entries: Vec<(ChunkCoord, usize)> = self
            .per_chunk_triangles
            .iter()
            .map(|(k, v)| (*k, *v))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.into_iter().take(n).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::IVec3;

    #[test]
    fn totals_follow_updates_and_removal() {
        let mut stats = RuntimeStats::default();
        let a = IVec3::new(0, 0, 0);
        let b = IVec3::new(1, 0, 0);
        stats.update_chunk(a, 100);
        stats.update_chunk(b, 50);
        assert_eq!(stats.total_triangles, 150);

        // Re-meshing replaces, not adds.
        stats.update_chunk(a, 40);
        assert_eq!(stats.total_triangles, 90);

        stats.remove_chunk(b);
        assert_eq!(stats.total_triangles, 40);
        stats.remove_chunk(b);
        assert_eq!(stats.total_triangles, 40);
    }

    #[test]
    fn top_chunks_sorts_descending() {
        let mut stats = RuntimeStats::default();
        for (i, tris) in [(0, 10), (1, 90), (2, 40)] {
            stats.update_chunk(IVec3::new(i, 0, 0), tris);
        }
        let top = stats.top_chunks(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0], (IVec3::new(1, 0, 0), 90));
        assert_eq!(top[1], (IVec3::new(2, 0, 0), 40));
    }
}
