//! Runtime wiring: resources, system ordering and the startup prewarm.
//!
//! `VoxelWorldPlugin` packages the whole chunk pipeline for the
//! surrounding program. The program supplies the viewer position (writing
//! the `Viewer` resource), optionally a `RenderTarget` sink for finished
//! meshes, and drives the app schedule; everything else (streaming,
//! generation, meshing, uploads, summary publication) runs from here.
//!
//! The pipeline systems are chained: every state-machine transition
//! happens in a fixed order inside one `Update` pass, which is what makes
//! the main thread the single serialization point.

use crate::atlas::AtlasUVMap;
use crate::block::loader as block_loader;
use crate::chunk::streaming::{
    collect_mesh_results, collect_terrain_results, dispatch_mesh_tasks, dispatch_terrain_tasks,
    refresh_runtime_stats, stream_chunks, streaming_diagnostics, PendingMeshes, PendingTerrain,
    StreamingDiagnostics,
};
use crate::chunk::upload::{upload_meshes, NullRenderSink, RenderTarget, UploadBudget, UploadQueues};
use crate::chunk::{
    ChunkStreamingConfig, GridPool, MeshBufferPool, RuntimeStats, Viewer, WorkerBudget,
};
use crate::debug::{handle_debug_dump_requests, DebugDumpRequest};
use crate::horizon::{flush_summary_bus, SummaryBus, SummaryInvalidated, SummaryReady};
use crate::settings::loader as settings_loader;
use crate::settings::Settings;
use crate::terrain::TerrainSampler;
use crate::world::{apply_block_edits, BlockEdit, ChunkMap, WorldTerrain};
use bevy::app::{App, Plugin, Update};
use bevy::log::{info, warn};
use bevy::prelude::{IntoSystemConfigs, Res, ResMut, Resource, Time};
use std::sync::Arc;

impl Default for RenderTarget {
    fn default() -> Self {
        RenderTarget(Box::new(NullRenderSink))
    }
}

/// Tracks the initial generation burst around the spawn point.
///
/// Until the initial sphere settles (or the timeout passes) the outer
/// program typically holds the player; the runtime itself only logs.
#[derive(Resource)]
pub struct PrewarmState {
    pub elapsed: f32,
    pub timeout: f32,
    pub complete: bool,
}

impl PrewarmState {
    #[must_use]
    pub fn new(timeout: f32) -> Self {
        Self { elapsed: 0.0, timeout, complete: false }
    }
}

/// Watch the pipeline settle; warn and continue when the timeout passes.
#[allow(clippy::needless_pass_by_value)]
pub fn track_prewarm(
    time: Res<Time>,
    mut prewarm: ResMut<PrewarmState>,
    map: Res<ChunkMap>,
    terrain: Res<PendingTerrain>,
    meshes: Res<PendingMeshes>,
    uploads: Res<UploadQueues>,
) {
    if prewarm.complete {
        return;
    }
    prewarm.elapsed += time.delta_seconds();

    let settled =
        !map.is_empty() && terrain.depth() == 0 && meshes.depth() == 0 && uploads.is_empty();
    if settled {
        prewarm.complete = true;
        info!(
            "prewarm complete: {} chunks in {:.1}s",
            map.len(),
            prewarm.elapsed
        );
    } else if prewarm.elapsed > prewarm.timeout {
        prewarm.complete = true;
        warn!(
            "prewarm timed out after {:.1}s; continuing with partial world",
            prewarm.elapsed
        );
    }
}

/// The voxel world runtime as a Bevy plugin.
///
/// Insert a `RenderTarget` before adding the plugin to receive mesh
/// buffers; otherwise they are applied to a null sink (headless).
pub struct VoxelWorldPlugin {
    pub settings: Settings,
}

impl Default for VoxelWorldPlugin {
    fn default() -> Self {
        Self { settings: settings_loader::load_settings_from_dir("data/settings") }
    }
}

impl VoxelWorldPlugin {
    /// Build the runtime from explicit settings (tests, embedding).
    #[must_use]
    pub fn with_settings(settings: Settings) -> Self {
        Self { settings }
    }
}

impl Plugin for VoxelWorldPlugin {
    fn build(&self, app: &mut App) {
        let settings = self.settings.clone();
        let sampler = Arc::new(TerrainSampler::new(settings.terrain.clone()));

        let registry = block_loader::load_blocks_from_dir("data/blocks");
        app.insert_resource(AtlasUVMap::build(&settings.atlas, &registry));
        app.insert_resource(registry);

        app.insert_resource(WorldTerrain(sampler));
        app.insert_resource(ChunkStreamingConfig::from(&settings.streaming));
        app.insert_resource(UploadBudget::from(&settings.upload));
        app.insert_resource(PrewarmState::new(settings.prewarm_timeout_seconds));
        app.insert_resource(settings);

        app.init_resource::<ChunkMap>();
        app.init_resource::<Viewer>();
        app.init_resource::<WorkerBudget>();
        app.init_resource::<PendingTerrain>();
        app.init_resource::<PendingMeshes>();
        app.init_resource::<UploadQueues>();
        app.init_resource::<GridPool>();
        app.init_resource::<MeshBufferPool>();
        app.init_resource::<RuntimeStats>();
        app.init_resource::<SummaryBus>();
        app.init_resource::<StreamingDiagnostics>();
        app.init_resource::<RenderTarget>();

        app.insert_resource(
            block_loader::setup_block_watcher("data/blocks")
                .unwrap_or_else(|_| block_loader::BlockWatcher::stub()),
        );
        app.insert_resource(
            settings_loader::setup_settings_watcher("data/settings")
                .unwrap_or_else(|_| settings_loader::SettingsWatcher::stub()),
        );

        app.add_event::<BlockEdit>();
        app.add_event::<SummaryReady>();
        app.add_event::<SummaryInvalidated>();
        app.add_event::<DebugDumpRequest>();

        // The pipeline proper runs in a fixed order each frame.
        app.add_systems(
            Update,
            (
                apply_block_edits,
                stream_chunks,
                dispatch_terrain_tasks,
                collect_terrain_results,
                dispatch_mesh_tasks,
                collect_mesh_results,
                upload_meshes,
                flush_summary_bus,
                refresh_runtime_stats,
            )
                .chain(),
        );

        // Housekeeping that does not care about pipeline ordering.
        app.add_systems(
            Update,
            (
                track_prewarm,
                streaming_diagnostics,
                settings_loader::check_settings_changes,
                block_loader::check_block_changes,
                handle_debug_dump_requests,
            ),
        );
    }
}
