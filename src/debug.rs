//! Debug utilities: a diagnostics dump written to a timestamped text file
//! in `./debug-dumps/`, and a global thread-usage map recorded by worker
//! tasks.
//!
//! This is useful for capturing a snapshot of the runtime's internal state
//! (queue depths, upload pacing, worker thread spread) without attaching a
//! profiler.

use crate::chunk::RuntimeStats;
use crate::horizon::SummaryBus;
use crate::world::ChunkMap;
use bevy::log::{info, warn};
use bevy::prelude::{Event, EventReader, Res};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::SystemTime;
use sysinfo::{PidExt, ProcessExt, System, SystemExt};

// Global, thread-safe collector for instrumenting background worker
// threads. This is instrumentation, not runtime state: it only ever grows
// a map of system name -> thread ids.
static GLOBAL_THREAD_MAP: OnceLock<Mutex<HashMap<String, HashSet<String>>>> = OnceLock::new();

/// Record the current thread id for `system` from any thread (worker or
/// main). Safe to call from async/rayon worker tasks.
pub fn record_thread_global(system: &str) {
    let tid = format!("{:?}", std::thread::current().id());
    let map = GLOBAL_THREAD_MAP.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = match map.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.entry(system.to_string()).or_default().insert(tid);
}

/// Snapshot of the global thread map (system -> sorted thread ids).
#[must_use]
pub fn snapshot_global_thread_map() -> HashMap<String, Vec<String>> {
    let map = GLOBAL_THREAD_MAP.get_or_init(|| Mutex::new(HashMap::new()));
    let guard = match map.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard
        .iter()
        .map(|(k, s)| {
            let mut v: Vec<_> = s.iter().cloned().collect();
            v.sort();
            (k.clone(), v)
        })
        .collect()
}

/// Request a diagnostics dump (sent by the surrounding program, e.g. on a
/// debug key).
#[derive(Event, Default)]
pub struct DebugDumpRequest;

/// Write a diagnostics dump for each queued request.
#[allow(clippy::needless_pass_by_value)]
pub fn handle_debug_dump_requests(
    mut requests: EventReader<DebugDumpRequest>,
    stats: Res<RuntimeStats>,
    map: Res<ChunkMap>,
    bus: Res<SummaryBus>,
) {
    if requests.is_empty() {
        return;
    }
    requests.clear();
    match write_debug_dump(&stats, &map, &bus) {
        Ok(path) => info!("debug dump written to {}", path.display()),
        Err(e) => warn!("debug dump failed: {e}"),
    }
}

/// Write the dump file and return its path.
///
/// # Errors
/// Propagates filesystem errors from creating `debug-dumps/` or the file.
pub fn write_debug_dump(
    stats: &RuntimeStats,
    map: &ChunkMap,
    bus: &SummaryBus,
) -> std::io::Result<PathBuf> {
    fs::create_dir_all("debug-dumps")?;
    let now: DateTime<Utc> = SystemTime::now().into();
    let path = PathBuf::from(format!(
        "debug-dumps/runtime-{}.txt",
        now.format("%Y%m%d-%H%M%S")
    ));

    let mut out = String::new();
    let _ = writeln!(out, "regolith runtime dump @ {}", now.to_rfc3339());
    let _ = writeln!(out, "\n== streaming ==");
    let _ = writeln!(out, "  loaded chunks:        {}", stats.loaded_chunks);
    let _ = writeln!(out, "  terrain queue depth:  {}", stats.terrain_queue_depth);
    let _ = writeln!(out, "  mesh queue depth:     {}", stats.mesh_queue_depth);
    let _ = writeln!(out, "  pending remesh:       {}", stats.pending_remesh);
    let _ = writeln!(out, "  upload queue depth:   {}", stats.upload_queue_depth);
    let _ = writeln!(out, "  uploads last frame:   {}", stats.uploads_last_frame);
    let _ = writeln!(
        out,
        "  upload time last:     {:?}",
        stats.upload_time_last_frame
    );
    let _ = writeln!(
        out,
        "  stale discards:       {}",
        stats.stale_buffers_discarded
    );
    let _ = writeln!(out, "  total triangles:      {}", stats.total_triangles);
    let _ = writeln!(out, "  published summaries:  {}", bus.published_chunks());
    let _ = writeln!(out, "  live map entries:     {}", map.len());

    let _ = writeln!(out, "\n== heaviest chunks ==");
    for (coord, tris) in stats.top_chunks(10) {
        let _ = writeln!(out, "  {coord:?} -> {tris} triangles");
    }

    let _ = writeln!(out, "\n== worker threads ==");
    let threads = snapshot_global_thread_map();
    if threads.is_empty() {
        let _ = writeln!(out, "  no instrumented tasks recorded");
    } else {
        let mut names: Vec<_> = threads.keys().collect();
        names.sort();
        for name in names {
            let _ = writeln!(out, "  {} -> {}", name, threads[name].join(", "));
        }
    }

    let _ = writeln!(out, "\n== process ==");
    let mut system = System::new();
    if let Ok(pid) = sysinfo::get_current_pid() {
        system.refresh_process(pid);
        if let Some(process) = system.process(pid) {
            let _ = writeln!(out, "  pid:    {}", pid.as_u32());
            let _ = writeln!(out, "  memory: {} KiB", process.memory());
        }
    }

    fs::write(&path, out)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_map_records_callers() {
        record_thread_global("test_system_a");
        record_thread_global("test_system_a");
        let snapshot = snapshot_global_thread_map();
        let threads = snapshot.get("test_system_a").expect("recorded");
        assert_eq!(threads.len(), 1);
    }
}
