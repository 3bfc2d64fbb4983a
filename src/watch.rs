//! File system watcher for live reload.
//!
//! Watches the content root, every content subdirectory present at startup,
//! the templates root and its `include/` directory. Directories created later
//! are not picked up until the server restarts.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐    ┌───────────┐    ┌──────────────┐    ┌───────────────┐
//! │ notify   │───▶│ Debouncer │───▶│ build_site() │───▶│ ReloadChannel │
//! │ events   │    │ (300ms)   │    │ full rebuild │    │ notify()      │
//! └──────────┘    └───────────┘    └──────┬───────┘    └───────────────┘
//!                                         │ error
//!                                         ▼
//!                                  log, keep serving the last good build
//! ```

use crate::{build::build_site, config::SiteConfig, debug, log, serve::ReloadChannel};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher, event::ModifyKind};
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    sync::mpsc::{self, RecvTimeoutError},
    time::{Duration, Instant},
};
use walkdir::WalkDir;

// =============================================================================
// Constants
// =============================================================================

const DEBOUNCE_MS: u64 = 300;

// =============================================================================
// Path Utilities
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Format path relative to the project root for log display.
fn rel_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

/// Writes and creations count; metadata-only changes (touch, chmod) do not.
const fn is_relevant(event: &Event) -> bool {
    match event.kind {
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) | EventKind::Create(_) => true,
        _ => false,
    }
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events so one save triggers one rebuild.
struct Debouncer {
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            pending: FxHashSet::default(),
            last_event: None,
        }
    }

    fn add(&mut self, event: Event) {
        for path in event.paths {
            if !is_temp_file(&path) {
                self.pending.insert(path);
            }
        }
        self.last_event = Some(Instant::now());
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        let mut paths: Vec<_> = self.pending.drain().collect();
        paths.sort();
        paths
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_secs(60)
        } else {
            Duration::from_millis(DEBOUNCE_MS)
        }
    }
}

// =============================================================================
// Rebuild
// =============================================================================

/// Rebuild the whole site and signal a waiting browser on success.
///
/// A failed build is logged and leaves the previous output in place.
fn rebuild(config: &SiteConfig, channel: &ReloadChannel) -> bool {
    match build_site(config) {
        Ok(_) => {
            let waiting = channel.waiting();
            if channel.notify() {
                debug!("reload signal delivered ({waiting} listeners waiting)");
            } else {
                debug!("no reload listener waiting, signal dropped");
            }
            true
        }
        Err(e) => {
            log!("watch"; "compilation error: {e:#}");
            false
        }
    }
}

fn handle_changes(paths: &[PathBuf], config: &SiteConfig, channel: &ReloadChannel) {
    let root = config.get_root();
    let changed: Vec<_> = paths.iter().map(|p| rel_path(p, root)).collect();
    log!("watch"; "{} changed, rebuilding...", changed.join(", "));
    rebuild(config, channel);
}

// =============================================================================
// Watcher Setup
// =============================================================================

/// Directories to watch, each non-recursively.
///
/// Hidden content directories are pruned like the loader prunes them.
fn watch_dirs(config: &SiteConfig) -> Vec<PathBuf> {
    let build = &config.build;
    let mut dirs = vec![
        build.content.clone(),
        build.includes(),
        build.templates.clone(),
    ];

    let subdirs = WalkDir::new(&build.content)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_dir())
        .map(walkdir::DirEntry::into_path);
    dirs.extend(subdirs);
    dirs
}

fn setup_watchers(watcher: &mut impl Watcher, config: &SiteConfig) -> Result<()> {
    let root = config.get_root();
    let mut watched = 0;

    for dir in watch_dirs(config) {
        if !dir.is_dir() {
            debug!("not watching missing '{}'", dir.display());
            continue;
        }
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;
        debug!("watching '{}'", rel_path(&dir, root));
        watched += 1;
    }

    log!("watch"; "watching {watched} directories for changes");
    Ok(())
}

// =============================================================================
// Public API
// =============================================================================

/// Start blocking file watcher with debouncing and live rebuild.
///
/// Runs until the watcher's event channel closes.
pub fn watch_for_changes_blocking(
    config: &'static SiteConfig,
    channel: &ReloadChannel,
) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    setup_watchers(&mut watcher, config)?;

    let mut debouncer = Debouncer::new();

    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) => {
                debug!("watched file changed: {:?}", event.paths);
                debouncer.add(event);
            }
            Ok(Err(e)) => log!("watch"; "watcher error: {e}"),
            Err(RecvTimeoutError::Timeout) if debouncer.ready() => {
                handle_changes(&debouncer.take(), config, channel);
            }
            Err(RecvTimeoutError::Disconnected) => break,
            // Irrelevant events, timeout without pending changes
            _ => {}
        }
    }

    Ok(())
}
