//! OS file watching.
//!
//! Uses the notify crate to subscribe to a directory recursively and turns
//! its events into the four notifications a tree understands.

use notify::event::{MetadataKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A filesystem change, reduced to what the tree cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    Created(PathBuf),
    Changed(PathBuf),
    Deleted(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

/// Translates one notify event.
///
/// Only name, size, write-time and rename changes are reported; access
/// and other metadata changes are dropped.
pub fn translate(event: Event) -> Vec<FsEvent> {
    let Event { kind, paths, .. } = event;

    match kind {
        EventKind::Create(_) => paths.into_iter().map(FsEvent::Created).collect(),
        EventKind::Remove(_) => paths.into_iter().map(FsEvent::Deleted).collect(),

        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = paths.into_iter();
            match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => vec![FsEvent::Renamed { from, to }],
                (Some(only), None) => vec![by_existence(only)],
                _ => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.into_iter().map(FsEvent::Deleted).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.into_iter().map(FsEvent::Created).collect()
        }
        // Backends that can't pair rename halves (FSEvents, polling).
        EventKind::Modify(ModifyKind::Name(_)) => paths.into_iter().map(by_existence).collect(),

        EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)) => {
            paths.into_iter().map(FsEvent::Changed).collect()
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => paths.into_iter().map(FsEvent::Changed).collect(),

        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn by_existence(path: PathBuf) -> FsEvent {
    if path.exists() {
        FsEvent::Created(path)
    } else {
        FsEvent::Deleted(path)
    }
}

/// A live recursive subscription. Dropping it unsubscribes.
pub struct FsSubscription {
    watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FsSubscription {
    /// Watches `root` recursively, calling `handler` for every translated
    /// event on the notify thread.
    pub fn start<F>(root: &Path, handler: F) -> Result<Self, notify::Error>
    where
        F: Fn(FsEvent) + Send + 'static,
    {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    for change in translate(event) {
                        debug!("File event: {:?}", change);
                        handler(change);
                    }
                }
                Err(e) => warn!("Watch error: {}", e),
            }
        })?;

        watcher.watch(root, RecursiveMode::Recursive)?;

        info!("Watching {} for changes", root.display());

        Ok(Self {
            watcher,
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for FsSubscription {
    fn drop(&mut self) {
        if let Err(e) = self.watcher.unwatch(&self.root) {
            debug!("Unwatching {} failed: {}", self.root.display(), e);
        }
        info!("Stopped watching {}", self.root.display());
    }
}
