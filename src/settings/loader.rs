//! Settings loading and hot-reloading.
//!
//! Settings are loaded from RON files in the `data/settings` directory. If
//! multiple RON files are present, the first successfully parsed `Settings`
//! is used; if none parse, defaults apply. The watcher reloads on change
//! and re-applies the live-tunable sections (streaming, upload) to their
//! runtime resources; terrain settings stay frozen for the world's life.

use crate::atlas::AtlasUVMap;
use crate::block::BlockRegistry;
use crate::chunk::upload::UploadBudget;
use crate::chunk::ChunkStreamingConfig;
use crate::ron_loader::{load_ron_files, setup_ron_watcher};
use crate::settings::Settings;
use bevy::log::info;
use bevy::prelude::{Res, ResMut, Resource};

#[derive(Resource)]
pub struct SettingsWatcher(pub crate::ron::RonWatcher);

/// Load settings from `path` (directory). If multiple `.ron` files are
/// present the first parsed `Settings` is used; otherwise defaults.
///
/// # Example
/// ```no_run
/// use regolith::settings::loader::load_settings_from_dir;
/// let settings = load_settings_from_dir("data/settings");
/// ```
#[must_use]
pub fn load_settings_from_dir(path: &str) -> Settings {
    let items: Vec<Settings> = load_ron_files(path);
    items.into_iter().next().unwrap_or_else(Settings::defaults)
}

/// Create a watcher for the settings directory (hot-reload).
///
/// # Errors
/// Returns the underlying `notify::Error` when the directory cannot be
/// watched.
pub fn setup_settings_watcher(path: &str) -> Result<SettingsWatcher, notify::Error> {
    setup_ron_watcher(path).map(SettingsWatcher)
}

/// Check the watcher; on change reload the `Settings` resource and
/// re-apply the live-tunable sections.
#[allow(clippy::needless_pass_by_value)]
pub fn check_settings_changes(
    watcher: Res<SettingsWatcher>,
    registry: Res<BlockRegistry>,
    mut settings: ResMut<Settings>,
    mut streaming: ResMut<ChunkStreamingConfig>,
    mut budget: ResMut<UploadBudget>,
    mut uv_map: ResMut<AtlasUVMap>,
) {
    if !watcher.0.take_changed() {
        return;
    }
    info!("settings changed, reloading");
    *settings = load_settings_from_dir("data/settings");
    *streaming = ChunkStreamingConfig::from(&settings.streaming);
    *budget = UploadBudget::from(&settings.upload);
    *uv_map = AtlasUVMap::build(&settings.atlas, &registry);
}

impl SettingsWatcher {
    #[must_use]
    pub fn stub() -> Self {
        SettingsWatcher(crate::ron::RonWatcher::stub())
    }
}
