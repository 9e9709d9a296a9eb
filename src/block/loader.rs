//! Loader and watcher for block RON files.
//!
//! Block definitions live under `data/blocks/`. The compiled-in core set is
//! always present; RON files layer additional blocks (or overrides) on top,
//! and a filesystem watcher lets those files be edited while the runtime is
//! live.
//!
//! # Example
//! ```no_run
//! use regolith::block::loader as block_loader;
//!
//! let registry = block_loader::load_blocks_from_dir("data/blocks");
//! let watcher = block_loader::setup_block_watcher("data/blocks")
//!     .unwrap_or_else(|_| block_loader::BlockWatcher::stub());
//! ```

use super::registry::{BlockDef, BlockRegistry};
use crate::atlas::AtlasUVMap;
use crate::ron_loader::{load_ron_files, setup_ron_watcher};
use crate::settings::Settings;
use bevy::log::info;
use bevy::prelude::{Res, ResMut, Resource};

#[derive(Resource)]
pub struct BlockWatcher(pub crate::ron::RonWatcher);

/// Load block definitions from RON files in `path`, layered over the
/// compiled-in core set.
///
/// # Arguments
/// * `path` - Directory containing block RON files (e.g. "data/blocks").
///
/// # Return
/// A `BlockRegistry` with the built-in blocks plus everything parsed from
/// the directory. Parse failures are skipped with a warning.
#[must_use]
pub fn load_blocks_from_dir(path: &str) -> BlockRegistry {
    let mut registry = BlockRegistry::built_in();
    let defs: Vec<BlockDef> = load_ron_files(path);
    for def in defs {
        registry.register(def);
    }
    registry
}

/// Set up a file watcher for the block data directory.
///
/// # Errors
/// Returns `Err` when the watcher cannot be created, e.g. the path does not
/// exist or the filesystem-watcher backend fails to initialize.
pub fn setup_block_watcher(path: &str) -> Result<BlockWatcher, notify::Error> {
    setup_ron_watcher(path).map(BlockWatcher)
}

/// Check the watcher and reload the registry when block files changed.
///
/// Intended to run every frame; cheap when nothing changed. The UV map is
/// derived from the registry, so it rebuilds in the same pass.
#[allow(clippy::needless_pass_by_value)]
pub fn check_block_changes(
    watcher: Res<BlockWatcher>,
    settings: Res<Settings>,
    mut registry: ResMut<BlockRegistry>,
    mut uv_map: ResMut<AtlasUVMap>,
) {
    if watcher.0.take_changed() {
        info!("block data changed, reloading");
        *registry = load_blocks_from_dir("data/blocks");
        *uv_map = AtlasUVMap::build(&settings.atlas, &registry);
    }
}

impl BlockWatcher {
    /// Create a stub `BlockWatcher` without an active OS watcher.
    #[must_use]
    pub fn stub() -> Self {
        BlockWatcher(crate::ron::RonWatcher::stub())
    }
}
