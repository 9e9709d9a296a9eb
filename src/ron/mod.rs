//! Utilities for loading RON files and watching directories for changes.
//!
//! This module provides a small helper for reading RON files from disk and a
//! filesystem watcher resource that sets a shared boolean when files change.
//! The watcher is used for hot-reloading RON-based configuration (blocks,
//! runtime settings) during development.

use bevy::log::warn;
use bevy::prelude::Resource;
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Resource)]
/// File-watcher resource for RON hot-reload.
pub struct RonWatcher {
    pub changed: Arc<Mutex<bool>>, // Shared boolean set to `true` when watched files change.
    _watcher: Option<RecommendedWatcher>, // watcher handle kept to prevent immediate drop.
}

impl RonWatcher {
    /// Create a stub `RonWatcher` that does not have an active OS watcher.
    ///
    /// Useful as a fallback when watcher creation fails or when running on
    /// platforms without notify support.
    #[must_use]
    pub fn stub() -> Self {
        RonWatcher {
            changed: Arc::new(Mutex::new(false)),
            _watcher: None,
        }
    }

    /// Read and clear the changed flag, recovering a poisoned lock.
    #[must_use]
    pub fn take_changed(&self) -> bool {
        let mut flag = match self.changed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("ron watcher mutex poisoned; recovering");
                poisoned.into_inner()
            }
        };
        let was = *flag;
        *flag = false;
        was
    }
}

/// Load all `.ron` files from a directory and deserialize them into `T`.
///
/// # Arguments
/// * `path` - Directory path to scan for `.ron` files.
///
/// # Return
/// A `Vec<T>` containing all successfully deserialized items found in the
/// directory. Files that fail to parse are skipped with a logged warning.
#[must_use]
pub fn load_ron_files<T: DeserializeOwned>(path: &str) -> Vec<T> {
    let mut items = Vec::new();

    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(_) => return items,
    };

    for entry in entries.flatten() {
        let file_path = entry.path();
        let is_ron = file_path.extension().map_or(false, |ext| ext == "ron");
        if !is_ron || !entry.metadata().map_or(false, |m| m.is_file()) {
            continue;
        }
        let content = match std::fs::read_to_string(&file_path) {
            Ok(content) => content,
            Err(e) => {
                warn!("failed to read {}: {e}", file_path.display());
                continue;
            }
        };
        match ron::from_str::<T>(&content) {
            Ok(item) => items.push(item),
            Err(e) => warn!("failed to parse {}: {e:?}", file_path.display()),
        }
    }

    items
}

/// Create a `RonWatcher` that watches a directory for modifications.
///
/// The returned watcher's `changed` flag is set to `true` when any file
/// under `path` is created, modified or removed.
///
/// # Errors
/// Returns the underlying `notify::Error` when the path does not exist or
/// the filesystem-watcher backend fails to initialize.
pub fn setup_ron_watcher(path: &str) -> Result<RonWatcher, notify::Error> {
    let changed = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&changed);

    let mut watcher = RecommendedWatcher::new(
        move |event: Result<notify::Event, notify::Error>| {
            if event.is_ok() {
                if let Ok(mut guard) = flag.lock() {
                    *guard = true;
                }
            }
        },
        Config::default(),
    )?;
    watcher.watch(Path::new(path), RecursiveMode::NonRecursive)?;

    Ok(RonWatcher {
        changed,
        _watcher: Some(watcher),
    })
}
