use anyhow::{Context, Result};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::any::Any;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Stream of changed paths from a [`FolderWatcher`]. Watching stops when
/// this is dropped.
pub struct WatchSubscription {
    events: mpsc::UnboundedReceiver<PathBuf>,
    pending: Option<PathBuf>,
    _guard: Box<dyn Any + Send>,
}

impl WatchSubscription {
    /// `guard` is kept alive for as long as the subscription.
    pub fn new(events: mpsc::UnboundedReceiver<PathBuf>, guard: impl Any + Send) -> Self {
        Self {
            events,
            pending: None,
            _guard: Box::new(guard),
        }
    }

    /// Waits for a change, then for `quiet` to pass without further changes.
    /// Returns the last changed path, or `None` once the watch has ended.
    ///
    /// Cancel safe: a change seen before the future is dropped is kept, and
    /// the next call restarts its quiet period.
    pub async fn next_settled(&mut self, quiet: Duration) -> Option<PathBuf> {
        if self.pending.is_none() {
            self.pending = Some(self.events.recv().await?);
        }

        loop {
            match tokio::time::timeout(quiet, self.events.recv()).await {
                Ok(Some(path)) => self.pending = Some(path),
                Ok(None) | Err(_) => return self.pending.take(),
            }
        }
    }
}

/// Filesystem change notifications for a set of folders.
pub trait FolderWatcher: Send + Sync {
    fn watch(&self, paths: &[PathBuf]) -> Result<WatchSubscription>;
}

/// Native watcher (inotify, FSEvents, kqueue, ...) through `notify`.
pub struct NotifyWatcher;

impl FolderWatcher for NotifyWatcher {
    fn watch(&self, paths: &[PathBuf]) -> Result<WatchSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_relevant(&event.kind) => {
                for path in event.paths {
                    if is_hidden(&path) {
                        continue;
                    }
                    debug!("Change detected: {:?} {}", event.kind, path.display());
                    let _ = tx.send(path);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Watch error: {}", e),
        })
        .context("Failed to create file watcher")?;

        for path in paths {
            watcher
                .watch(path, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch {}", path.display()))?;
            info!("Watching {}", path.display());
        }

        Ok(WatchSubscription::new(rx, watcher))
    }
}

/// Writes, renames and attribute changes count; reads and removals do not.
pub fn is_relevant(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) => true,
        EventKind::Modify(modify) => matches!(
            modify,
            ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Metadata(_) | ModifyKind::Any
        ),
        _ => false,
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}
