//! Column summaries: per-(x,z) surface metadata for the horizon renderer.
//!
//! One record per column of a chunk, found by scanning top-down for the
//! first non-air voxel. The scan is chained onto the mesh task (so it runs
//! on a worker, after the voxels are final) and delivered to the summary
//! bus together with the finished mesh.

use super::{chunk_origin, ChunkCoord, ChunkVoxels, CHUNK_AREA, CHUNK_SIZE};
use crate::block::{blocks, BlockId};
use crate::terrain::BiomeId;

/// Sentinel world-Y for columns with no surface.
pub const NO_SURFACE_Y: i32 = i32::MIN;

/// Surface metadata of one (x,z) column inside a chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnSummary {
    pub surface_local_y: u8, // Local Y of the topmost non-air voxel.
    pub surface_world_y: i32, // World Y of that voxel, or `NO_SURFACE_Y`.
    pub surface_block: BlockId, // Topmost non-air block.
    pub surface_biome: BiomeId, // Dominant biome of the column.
    pub has_surface: bool,
}

impl ColumnSummary {
    fn empty(biome: BiomeId) -> Self {
        Self {
            surface_local_y: 0,
            surface_world_y: NO_SURFACE_Y,
            surface_block: blocks::AIR,
            surface_biome: biome,
            has_surface: false,
        }
    }
}

/// Scan every column of a chunk, top to bottom.
///
/// # Return
/// `CHUNK_AREA` records indexed `x + z * CHUNK_SIZE`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn scan_columns(coord: ChunkCoord, voxels: &ChunkVoxels) -> Vec<ColumnSummary> {
    let origin = chunk_origin(coord);
    let mut out = Vec::with_capacity(CHUNK_AREA);

    for z in 0..CHUNK_SIZE {
        for x in 0..CHUNK_SIZE {
            let biome = voxels.column_biome(x, z);
            let mut summary = ColumnSummary::empty(biome);
            for y in (0..CHUNK_SIZE).rev() {
                let block = voxels.get(x, y, z);
                if block != blocks::AIR {
                    summary = ColumnSummary {
                        surface_local_y: y as u8,
                        surface_world_y: origin.y + y as i32,
                        surface_block: block,
                        surface_biome: biome,
                        has_surface: true,
                    };
                    break;
                }
            }
            out.push(summary);
        }
    }

    debug_assert_eq!(out.len(), CHUNK_AREA);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::generation::generate_chunk_voxels;
    use crate::chunk::CancelFlag;
    use crate::terrain::{TerrainSampler, TerrainSettings};

    #[test]
    fn flat_chunk_reports_grass_surface() {
        let sampler = TerrainSampler::new(TerrainSettings::flat(8));
        let coord = ChunkCoord::new(0, 0, 0);
        let grid = generate_chunk_voxels(coord, &sampler, &CancelFlag::new(), Vec::new())
            .expect("not cancelled");
        let summaries = scan_columns(coord, &grid);

        assert_eq!(summaries.len(), CHUNK_AREA);
        for (i, s) in summaries.iter().enumerate() {
            assert!(s.has_surface, "column {i}");
            assert_eq!(s.surface_local_y, 8);
            assert_eq!(s.surface_world_y, 8);
            assert_eq!(s.surface_block, blocks::GRASS);
        }
    }

    #[test]
    fn air_chunk_reports_no_surface() {
        let sampler = TerrainSampler::new(TerrainSettings::flat(8));
        let coord = ChunkCoord::new(0, 3, 0);
        let grid = generate_chunk_voxels(coord, &sampler, &CancelFlag::new(), Vec::new())
            .expect("not cancelled");
        for s in scan_columns(coord, &grid) {
            assert!(!s.has_surface);
            assert_eq!(s.surface_world_y, NO_SURFACE_Y);
            assert_eq!(s.surface_block, blocks::AIR);
        }
    }

    #[test]
    fn world_y_accounts_for_chunk_origin() {
        let sampler = TerrainSampler::new(TerrainSettings::flat(24));
        let coord = ChunkCoord::new(0, 1, 0);
        let grid = generate_chunk_voxels(coord, &sampler, &CancelFlag::new(), Vec::new())
            .expect("not cancelled");
        let summaries = scan_columns(coord, &grid);
        // Surface at world y 24 = local y 8 in the cy=1 chunk.
        assert!(summaries.iter().all(|s| s.surface_world_y == 24));
        assert!(summaries.iter().all(|s| s.surface_local_y == 8));
    }

    #[test]
    fn partial_column_finds_topmost_block() {
        let mut grid = ChunkVoxels::new(Vec::new());
        grid.set(4, 2, 4, blocks::STONE);
        grid.set(4, 9, 4, blocks::SAND);
        let summaries = scan_columns(ChunkCoord::new(0, 0, 0), &grid);
        let s = summaries[4 + 4 * CHUNK_SIZE];
        assert!(s.has_surface);
        assert_eq!(s.surface_local_y, 9);
        assert_eq!(s.surface_block, blocks::SAND);
    }
}
