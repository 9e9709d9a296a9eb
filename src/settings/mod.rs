//! Runtime settings, types and defaults.
//!
//! Settings are stored as a RON file under `data/settings/` and are
//! hot-reloadable using the RON watcher utilities (see
//! `ron::setup_ron_watcher`). Streaming and upload tunables apply live;
//! the terrain section (including the seed) is read once when the world
//! is created and stays immutable for its lifetime.

use crate::atlas::AtlasLayout;
use crate::chunk::upload::UploadBudget;
use crate::chunk::ChunkStreamingConfig;
use crate::terrain::TerrainSettings;
use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Streaming distances and pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingSettings {
    #[serde(default = "StreamingSettings::default_horizontal_radius")]
    pub horizontal_radius: i32, // Chunks kept loaded around the viewer (x/z).
    #[serde(default = "StreamingSettings::default_vertical_radius")]
    pub vertical_radius: i32, // Chunks kept loaded above/below the viewer.
    #[serde(default = "StreamingSettings::default_unload_buffer")]
    pub unload_buffer: i32, // Extra ring before chunks retire (anti-thrash).
    #[serde(default = "StreamingSettings::default_max_allocations_per_tick")]
    pub max_allocations_per_tick: usize, // New chunk allocations per update.
    #[serde(default = "StreamingSettings::default_priority_radius")]
    pub priority_radius: i32, // Uploads inside this radius jump the queue.
}

impl StreamingSettings {
    fn default_horizontal_radius() -> i32 { 6 }
    fn default_vertical_radius() -> i32 { 2 }
    fn default_unload_buffer() -> i32 { 2 }
    fn default_max_allocations_per_tick() -> usize { 24 }
    fn default_priority_radius() -> i32 { 3 }
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            horizontal_radius: Self::default_horizontal_radius(),
            vertical_radius: Self::default_vertical_radius(),
            unload_buffer: Self::default_unload_buffer(),
            max_allocations_per_tick: Self::default_max_allocations_per_tick(),
            priority_radius: Self::default_priority_radius(),
        }
    }
}

impl From<&StreamingSettings> for ChunkStreamingConfig {
    fn from(s: &StreamingSettings) -> Self {
        Self {
            horizontal_radius: s.horizontal_radius.max(1),
            vertical_radius: s.vertical_radius.max(0),
            unload_buffer: s.unload_buffer.max(0),
            max_allocations_per_tick: s.max_allocations_per_tick.max(1),
            priority_radius: s.priority_radius.max(0),
        }
    }
}

/// Frame-budget tunables for the upload manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    #[serde(default = "UploadSettings::default_uploads_per_frame")]
    pub uploads_per_frame: usize, // Target mesh applications per frame.
    #[serde(default = "UploadSettings::default_time_budget_ms")]
    pub time_budget_ms: u64, // Wall-time cap for one frame's upload pass.
    #[serde(default = "UploadSettings::default_target_frame_ms")]
    pub target_frame_ms: f32, // Frame time the dynamic budget steers toward.
}

impl UploadSettings {
    fn default_uploads_per_frame() -> usize { 4 }
    fn default_time_budget_ms() -> u64 { 8 }
    fn default_target_frame_ms() -> f32 { 16.6 }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            uploads_per_frame: Self::default_uploads_per_frame(),
            time_budget_ms: Self::default_time_budget_ms(),
            target_frame_ms: Self::default_target_frame_ms(),
        }
    }
}

impl From<&UploadSettings> for UploadBudget {
    fn from(s: &UploadSettings) -> Self {
        UploadBudget::new(
            s.uploads_per_frame,
            Duration::from_millis(s.time_budget_ms),
            Duration::from_secs_f32((s.target_frame_ms / 1000.0).max(0.001)),
        )
    }
}

/// Top-level settings.
#[derive(Resource, Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub streaming: StreamingSettings,
    #[serde(default)]
    pub upload: UploadSettings,
    #[serde(default)]
    pub atlas: AtlasLayout,
    #[serde(default)]
    pub terrain: TerrainSettings,
    #[serde(default = "Settings::default_prewarm_timeout_seconds")]
    pub prewarm_timeout_seconds: f32, // Startup generation window before giving up.
}

impl Settings {
    fn default_prewarm_timeout_seconds() -> f32 { 12.0 }

    #[must_use]
    pub fn defaults() -> Self {
        Settings::default()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            streaming: StreamingSettings::default(),
            upload: UploadSettings::default(),
            atlas: AtlasLayout::default(),
            terrain: TerrainSettings::default(),
            prewarm_timeout_seconds: Self::default_prewarm_timeout_seconds(),
        }
    }
}

pub mod loader;
