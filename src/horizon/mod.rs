//! Column-summary bus: publishes per-column surface metadata to the
//! distant-horizon subscriber.
//!
//! The pipeline hands finished summaries to the `SummaryBus` resource;
//! once per frame the bus flushes them as `SummaryReady` /
//! `SummaryInvalidated` events (coalesced to at most one event per chunk
//! per frame) and maintains the derived 2D horizon map: for every
//! `(cx, cz)` chunk column, the per-column maximum surface world-Y and its
//! tint across the vertical stack of live chunks. Subscribers that only
//! want a far-field height field read the map and never see voxels.

use crate::chunk::{ChunkCoord, ColumnSummary, CHUNK_AREA};
use crate::terrain::BiomeWeights;
use bevy::math::IVec2;
use bevy::prelude::{Event, EventWriter, Resource};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Fired when a chunk's column summaries are (re)published.
#[derive(Event)]
pub struct SummaryReady {
    pub coord: ChunkCoord,
    /// One record per column, indexed `x + z * CHUNK_SIZE`.
    pub columns: Arc<[ColumnSummary]>,
}

/// Fired when a chunk's summaries stop being valid (retirement or edit).
#[derive(Event)]
pub struct SummaryInvalidated {
    pub coord: ChunkCoord,
}

/// One column of the aggregated horizon map.
#[derive(Clone, Copy, Debug)]
pub struct HorizonColumn {
    pub surface_world_y: i32, // Max surface height across the vertical stack.
    pub tint: [f32; 4],       // Surface tint of the winning chunk's biome.
    pub has_surface: bool,
}

impl Default for HorizonColumn {
    fn default() -> Self {
        Self {
            surface_world_y: crate::chunk::summary::NO_SURFACE_Y,
            tint: [1.0, 1.0, 1.0, 1.0],
            has_surface: false,
        }
    }
}

/// Aggregated per-(cx,cz) tile of horizon columns.
pub struct HorizonTile {
    pub columns: Box<[HorizonColumn; CHUNK_AREA]>,
}

impl Default for HorizonTile {
    fn default() -> Self {
        Self {
            columns: Box::new([HorizonColumn::default(); CHUNK_AREA]),
        }
    }
}

/// The bus resource: pending publications, pending invalidations and the
/// derived horizon map.
#[derive(Resource, Default)]
pub struct SummaryBus {
    /// Latest summaries per chunk, staged until the flush system runs.
    /// Re-publishing the same chunk within a frame overwrites (coalesces).
    pending_publish: HashMap<ChunkCoord, Arc<[ColumnSummary]>>,
    /// Chunks invalidated this frame, coalesced into one event each.
    pending_invalidate: HashSet<ChunkCoord>,
    /// Summaries of every live published chunk, for re-aggregation.
    published: HashMap<ChunkCoord, Arc<[ColumnSummary]>>,
    /// Derived far-field map keyed by `(cx, cz)`.
    tiles: HashMap<IVec2, HorizonTile>,
}

impl SummaryBus {
    /// Stage a chunk's summaries for publication this frame.
    ///
    /// Callers only hand over summaries of chunks whose voxels are final;
    /// the pipeline publishes from the mesh task's output, which runs after
    /// generation by construction.
    pub fn publish(&mut self, coord: ChunkCoord, columns: Arc<[ColumnSummary]>) {
        self.pending_invalidate.remove(&coord);
        self.pending_publish.insert(coord, columns);
    }

    /// Stage an invalidation (chunk retired or voxels mutated). The set
    /// coalesces repeats into one event per chunk per frame.
    pub fn invalidate(&mut self, coord: ChunkCoord) {
        self.pending_publish.remove(&coord);
        self.published.remove(&coord);
        self.pending_invalidate.insert(coord);
    }

    /// Aggregated horizon tile for a chunk column, if any chunk in the
    /// stack has published.
    #[must_use]
    pub fn tile(&self, column: IVec2) -> Option<&HorizonTile> {
        self.tiles.get(&column)
    }

    #[must_use]
    pub fn published_chunks(&self) -> usize {
        self.published.len()
    }

    fn rebuild_tile(&mut self, column: IVec2) {
        let stack: Vec<&Arc<[ColumnSummary]>> = self
            .published
            .iter()
            .filter(|(coord, _)| coord.x == column.x && coord.z == column.y)
            .map(|(_, s)| s)
            .collect();

        if stack.is_empty() {
            self.tiles.remove(&column);
            return;
        }

        let mut tile = HorizonTile::default();
        for summaries in stack {
            for (i, summary) in summaries.iter().enumerate() {
                if !summary.has_surface {
                    continue;
                }
                let slot = &mut tile.columns[i];
                if !slot.has_surface || summary.surface_world_y > slot.surface_world_y {
                    *slot = HorizonColumn {
                        surface_world_y: summary.surface_world_y,
                        tint: BiomeWeights::pure(summary.surface_biome).surface_tint(),
                        has_surface: true,
                    };
                }
            }
        }
        self.tiles.insert(column, tile);
    }
}

/// Flush the bus once per frame: update the horizon map and emit the
/// coalesced events.
pub fn flush_summary_bus(
    mut bus: bevy::prelude::ResMut<SummaryBus>,
    mut ready: EventWriter<SummaryReady>,
    mut invalidated: EventWriter<SummaryInvalidated>,
) {
    if bus.pending_publish.is_empty() && bus.pending_invalidate.is_empty() {
        return;
    }

    let publishes: Vec<(ChunkCoord, Arc<[ColumnSummary]>)> = bus.pending_publish.drain().collect();
    let invalidations: Vec<ChunkCoord> = bus.pending_invalidate.drain().collect();

    let mut touched_columns = HashSet::new();
    for (coord, columns) in publishes {
        bus.published.insert(coord, Arc::clone(&columns));
        touched_columns.insert(IVec2::new(coord.x, coord.z));
        ready.send(SummaryReady { coord, columns });
    }
    for coord in invalidations {
        touched_columns.insert(IVec2::new(coord.x, coord.z));
        invalidated.send(SummaryInvalidated { coord });
    }

    for column in touched_columns {
        bus.rebuild_tile(column);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::blocks;
    use crate::chunk::summary::NO_SURFACE_Y;
    use crate::chunk::CHUNK_SIZE;
    use crate::terrain::BiomeId;

    fn summaries(world_y: i32, block: u8) -> Arc<[ColumnSummary]> {
        let mut v = Vec::with_capacity(CHUNK_AREA);
        for _ in 0..CHUNK_AREA {
            v.push(ColumnSummary {
                surface_local_y: world_y.rem_euclid(CHUNK_SIZE as i32) as u8,
                surface_world_y: world_y,
                surface_block: block,
                surface_biome: BiomeId::Plains,
                has_surface: true,
            });
        }
        Arc::from(v)
    }

    fn flush(bus: &mut SummaryBus) -> (usize, usize) {
        // Drive the flush logic without an `App` by replicating its body.
        let publishes: Vec<_> = bus.pending_publish.drain().collect();
        let invalidations: Vec<_> = bus.pending_invalidate.drain().collect();
        let ready = publishes.len();
        let gone = invalidations.len();
        let mut touched = HashSet::new();
        for (coord, columns) in publishes {
            bus.published.insert(coord, columns);
            touched.insert(IVec2::new(coord.x, coord.z));
        }
        for coord in invalidations {
            touched.insert(IVec2::new(coord.x, coord.z));
        }
        for column in touched {
            bus.rebuild_tile(column);
        }
        (ready, gone)
    }

    #[test]
    fn vertical_stack_aggregates_to_max() {
        let mut bus = SummaryBus::default();
        bus.publish(ChunkCoord::new(0, 0, 0), summaries(8, blocks::GRASS));
        bus.publish(ChunkCoord::new(0, 1, 0), summaries(24, blocks::STONE));
        flush(&mut bus);

        let tile = bus.tile(IVec2::new(0, 0)).expect("tile exists");
        assert!(tile.columns.iter().all(|c| c.surface_world_y == 24));
    }

    #[test]
    fn republish_within_frame_coalesces() {
        let mut bus = SummaryBus::default();
        let coord = ChunkCoord::new(0, 0, 0);
        bus.publish(coord, summaries(8, blocks::GRASS));
        bus.publish(coord, summaries(9, blocks::GRASS));
        let (ready, _) = flush(&mut bus);
        assert_eq!(ready, 1);
        let tile = bus.tile(IVec2::new(0, 0)).unwrap();
        assert_eq!(tile.columns[0].surface_world_y, 9);
    }

    #[test]
    fn invalidation_removes_chunk_from_aggregate() {
        let mut bus = SummaryBus::default();
        bus.publish(ChunkCoord::new(0, 0, 0), summaries(8, blocks::GRASS));
        bus.publish(ChunkCoord::new(0, 1, 0), summaries(24, blocks::STONE));
        flush(&mut bus);

        bus.invalidate(ChunkCoord::new(0, 1, 0));
        flush(&mut bus);

        let tile = bus.tile(IVec2::new(0, 0)).expect("tile exists");
        assert!(tile.columns.iter().all(|c| c.surface_world_y == 8));
    }

    #[test]
    fn last_invalidation_drops_the_tile() {
        let mut bus = SummaryBus::default();
        let coord = ChunkCoord::new(2, 0, 3);
        bus.publish(coord, summaries(8, blocks::GRASS));
        flush(&mut bus);
        assert!(bus.tile(IVec2::new(2, 3)).is_some());

        bus.invalidate(coord);
        flush(&mut bus);
        assert!(bus.tile(IVec2::new(2, 3)).is_none());
        assert_eq!(bus.published_chunks(), 0);
    }

    #[test]
    fn publish_after_invalidate_wins() {
        let mut bus = SummaryBus::default();
        let coord = ChunkCoord::new(0, 0, 0);
        bus.invalidate(coord);
        bus.publish(coord, summaries(8, blocks::GRASS));
        flush(&mut bus);
        assert!(bus.tile(IVec2::new(0, 0)).is_some());
    }

    #[test]
    fn airless_columns_do_not_aggregate() {
        let mut bus = SummaryBus::default();
        let mut v = Vec::with_capacity(CHUNK_AREA);
        for _ in 0..CHUNK_AREA {
            v.push(ColumnSummary {
                surface_local_y: 0,
                surface_world_y: NO_SURFACE_Y,
                surface_block: blocks::AIR,
                surface_biome: BiomeId::Plains,
                has_surface: false,
            });
        }
        bus.publish(ChunkCoord::new(0, 0, 0), Arc::from(v));
        flush(&mut bus);
        let tile = bus.tile(IVec2::new(0, 0)).expect("tile exists");
        assert!(tile.columns.iter().all(|c| !c.has_surface));
    }
}
