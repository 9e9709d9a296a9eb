//! Headless demo: stream the world under a scripted viewer.
//!
//! Walks a viewer along +X at walking speed for a minute, logging the
//! pipeline's progress. No renderer is attached; mesh buffers land in the
//! null sink and the interesting output is the streaming diagnostics.

use bevy::app::{AppExit, ScheduleRunnerPlugin};
use bevy::log::LogPlugin;
use bevy::prelude::*;
use regolith::chunk::{RuntimeStats, Viewer};
use regolith::VoxelWorldPlugin;
use std::time::Duration;

const WALK_SPEED: f32 = 12.0; // blocks per second
const DEMO_SECONDS: f32 = 60.0;

fn main() {
    let mut app = App::new();
    app.add_plugins(
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(1.0 / 60.0))),
    );
    app.add_plugins(LogPlugin::default());
    app.add_plugins(VoxelWorldPlugin::default());
    app.insert_resource(Viewer { position: Vec3::new(8.0, 40.0, 8.0) });
    app.add_systems(Update, (walk_viewer, finish_after_demo));
    app.run();
}

fn walk_viewer(time: Res<Time>, mut viewer: ResMut<Viewer>) {
    viewer.position.x += WALK_SPEED * time.delta_seconds();
}

#[allow(clippy::needless_pass_by_value)]
fn finish_after_demo(time: Res<Time>, stats: Res<RuntimeStats>, mut exit: EventWriter<AppExit>) {
    if time.elapsed_seconds() >= DEMO_SECONDS {
        info!(
            "demo done: {} chunks live, {} triangles, {} stale buffers discarded",
            stats.loaded_chunks, stats.total_triangles, stats.stale_buffers_discarded
        );
        exit.send(AppExit::Success);
    }
}
