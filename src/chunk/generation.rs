//! Chunk terrain generation.
//!
//! A generation task owns its output grid exclusively until it publishes:
//! the fill is data-parallel over the chunk's Z slices (each slice holds 16
//! columns writing disjoint memory), sampling biome weights and the blended
//! height curve once per column and writing the Y stride with the block
//! selection rules. The cooperative cancel flag is checked between slices;
//! a cancelled fill discards its partial output.

use super::{chunk_origin, CancelFlag, ChunkCoord, ChunkVoxels, CHUNK_AREA, CHUNK_SIZE};
use crate::block::BlockId;
use crate::terrain::TerrainSampler;
use rayon::prelude::*;

/// Output of one finished generation task.
pub struct TerrainBuildResult {
    pub coord: ChunkCoord,
    /// `None` when the task observed cancellation; partial fills are
    /// discarded, never published.
    pub voxels: Option<ChunkVoxels>,
}

/// Fill a voxel grid for `coord` from the terrain sampler.
///
/// Deterministic: the same coord, sampler settings and seed produce a
/// byte-identical grid. Returns `None` if `cancel` was set before the fill
/// finished.
///
/// # Arguments
/// * `coord` - chunk coordinate to generate
/// * `sampler` - shared read-only terrain sampler
/// * `cancel` - cooperative cancellation token, checked per Z slice
/// * `storage` - recycled block storage from the grid pool
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn generate_chunk_voxels(
    coord: ChunkCoord,
    sampler: &TerrainSampler,
    cancel: &CancelFlag,
    storage: Vec<BlockId>,
) -> Option<ChunkVoxels> {
    let mut grid = ChunkVoxels::new(storage);
    let origin = chunk_origin(coord);

    let (blocks, biomes) = grid.raw_parts_mut();
    let fill = blocks
        .par_chunks_mut(CHUNK_AREA)
        .zip(biomes.par_chunks_mut(CHUNK_SIZE))
        .enumerate()
        .try_for_each(|(z, (slice, biome_row))| {
            if cancel.is_cancelled() {
                return Err(());
            }
            let world_z = origin.z + z as i32;
            for x in 0..CHUNK_SIZE {
                let world_x = origin.x + x as i32;
                let column = sampler.sample_column(f64::from(world_x), f64::from(world_z));
                biome_row[x] = column.dominant;
                for y in 0..CHUNK_SIZE {
                    let world_y = origin.y + y as i32;
                    slice[x + y * CHUNK_SIZE] =
                        sampler.select_block(world_y, &column.height, column.dominant);
                }
            }
            Ok(())
        });

    match fill {
        Ok(()) => Some(grid),
        Err(()) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::blocks;
    use crate::terrain::TerrainSettings;

    fn sampler(settings: TerrainSettings) -> TerrainSampler {
        TerrainSampler::new(settings)
    }

    #[test]
    fn generation_is_byte_identical() {
        let sampler = sampler(TerrainSettings::default());
        let coord = ChunkCoord::new(3, 1, -2);
        let a = generate_chunk_voxels(coord, &sampler, &CancelFlag::new(), Vec::new())
            .expect("not cancelled");
        let b = generate_chunk_voxels(coord, &sampler, &CancelFlag::new(), Vec::new())
            .expect("not cancelled");
        for z in 0..CHUNK_SIZE {
            for y in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    assert_eq!(a.get(x, y, z), b.get(x, y, z), "at ({x},{y},{z})");
                }
            }
        }
    }

    #[test]
    fn flat_plane_layout_at_origin_chunk() {
        // Flat-grass scenario: base height 8, zero height multiplier.
        let sampler = sampler(TerrainSettings::flat(8));
        let grid = generate_chunk_voxels(
            ChunkCoord::new(0, 0, 0),
            &sampler,
            &CancelFlag::new(),
            Vec::new(),
        )
        .expect("not cancelled");

        for x in 0..CHUNK_SIZE {
            for z in 0..CHUNK_SIZE {
                assert_eq!(grid.get(x, 0, z), blocks::BEDROCK);
                for y in 1..=3 {
                    assert_eq!(grid.get(x, y, z), blocks::STONE, "({x},{y},{z})");
                }
                for y in 4..=7 {
                    assert_eq!(grid.get(x, y, z), blocks::DIRT, "({x},{y},{z})");
                }
                assert_eq!(grid.get(x, 8, z), blocks::GRASS);
                for y in 9..CHUNK_SIZE {
                    assert_eq!(grid.get(x, y, z), blocks::AIR, "({x},{y},{z})");
                }
            }
        }
    }

    #[test]
    fn chunk_above_surface_is_all_air() {
        let sampler = sampler(TerrainSettings::flat(8));
        let grid = generate_chunk_voxels(
            ChunkCoord::new(0, 1, 0),
            &sampler,
            &CancelFlag::new(),
            Vec::new(),
        )
        .expect("not cancelled");
        assert!(grid.is_empty());
    }

    #[test]
    fn chunk_below_ground_is_solid() {
        let sampler = sampler(TerrainSettings::flat(200));
        let grid = generate_chunk_voxels(
            ChunkCoord::new(0, 2, 0),
            &sampler,
            &CancelFlag::new(),
            Vec::new(),
        )
        .expect("not cancelled");
        for z in 0..CHUNK_SIZE {
            for y in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    assert_ne!(grid.get(x, y, z), blocks::AIR, "({x},{y},{z})");
                }
            }
        }
    }

    #[test]
    fn pre_set_cancel_discards_output() {
        let sampler = sampler(TerrainSettings::default());
        let cancel = CancelFlag::new();
        cancel.cancel();
        let out = generate_chunk_voxels(ChunkCoord::new(0, 0, 0), &sampler, &cancel, Vec::new());
        assert!(out.is_none());
    }

    #[test]
    fn column_biomes_are_recorded() {
        let sampler = sampler(TerrainSettings::default());
        let grid = generate_chunk_voxels(
            ChunkCoord::new(0, 0, 0),
            &sampler,
            &CancelFlag::new(),
            Vec::new(),
        )
        .expect("not cancelled");
        for x in 0..CHUNK_SIZE {
            for z in 0..CHUNK_SIZE {
                let want = sampler
                    .sample_column(f64::from(x as i32), f64::from(z as i32))
                    .dominant;
                assert_eq!(grid.column_biome(x, z), want, "({x},{z})");
            }
        }
    }
}
