//! File change notifications.
//!
//! The index only consumes change events. `FileEvent` is the unit of work the
//! controller applies; with the `watch` feature, [`Watcher`] turns debounced
//! `notify` notifications into paths on a tokio channel and [`run`] feeds
//! them to an [`IndexController`](crate::incremental::IndexController) one at
//! a time.

use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A change to one workspace file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileChangeKind,
}

impl FileEvent {
    pub fn new(path: PathBuf, kind: FileChangeKind) -> Self {
        Self { path, kind }
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(path.into(), FileChangeKind::Created)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(path.into(), FileChangeKind::Modified)
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(path.into(), FileChangeKind::Deleted)
    }
}

#[cfg(feature = "watch")]
pub use notify_watcher::{Watcher, run};

#[cfg(feature = "watch")]
mod notify_watcher {
    use crate::discovery::FileDiscovery;
    use crate::incremental::IndexController;
    use anyhow::{Context, Result};
    use notify::{RecommendedWatcher, RecursiveMode};
    use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Recursive, debounced watcher over a workspace root.
    ///
    /// Only paths accepted by [`FileDiscovery::matches`] are forwarded.
    /// Dropping the watcher stops notifications and closes the channel.
    pub struct Watcher {
        _debouncer: Debouncer<RecommendedWatcher>,
        rx: mpsc::UnboundedReceiver<PathBuf>,
    }

    impl Watcher {
        pub fn new(root: &Path, discovery: FileDiscovery, debounce: Duration) -> Result<Self> {
            let (tx, rx) = mpsc::unbounded_channel();
            let mut debouncer = new_debouncer(debounce, move |res: DebounceEventResult| match res {
                Ok(events) => {
                    for event in events {
                        if discovery.matches(&event.path) {
                            // Receiver gone means the watcher is shutting down.
                            let _ = tx.send(event.path);
                        }
                    }
                }
                Err(e) => tracing::warn!("Watch error: {}", e),
            })
            .context("Failed to create file watcher")?;

            debouncer
                .watcher()
                .watch(root, RecursiveMode::Recursive)
                .with_context(|| format!("Failed to watch {}", root.display()))?;
            tracing::info!("Watching {}", root.display());

            Ok(Self {
                _debouncer: debouncer,
                rx,
            })
        }

        /// Next changed path, or `None` once the watcher is gone.
        pub async fn next_path(&mut self) -> Option<PathBuf> {
            self.rx.recv().await
        }
    }

    /// Apply changes until the watcher stops.
    ///
    /// Events are handled sequentially; a newer change to the same file is
    /// simply applied after the older one.
    pub async fn run(controller: &IndexController, mut watcher: Watcher) {
        while let Some(path) = watcher.next_path().await {
            if let Some(kind) = controller.apply_path_change(&path).await {
                tracing::info!("{:?} {}", kind, path.display());
            }
        }
    }
}
