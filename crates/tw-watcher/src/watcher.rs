//! Recursive notification source.
//!
//! [`FileWatcher`] runs a `notify` watcher on tokio's blocking pool and
//! translates raw notifications into [`FileSystemEvent`]s for an
//! [`EventSink`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 Blocking Thread (spawn_blocking)             │
//! │  ┌───────────────────┐    ┌─────────────┐    ┌────────────┐  │
//! │  │ RecommendedWatcher│ -> │ translate   │ -> │ FileFilter │  │
//! │  │ (notify)          │    │ (kind, dirs)│    │            │  │
//! │  └───────────────────┘    └─────────────┘    └─────┬──────┘  │
//! └────────────────────────────────────────────────────│─────────┘
//!                                                      │ dispatch
//!                                                      ▼
//!                                                  EventSink
//! ```
//!
//! Only creations, modifications and moves are reported. Deletions, access
//! notifications and events for directories are dropped here.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tw_watcher::{EventSink, FileSystemEvent, FileWatcher, PatternFilter};
//! use camino::Utf8Path;
//!
//! struct Print;
//!
//! impl EventSink for Print {
//!     fn on_event(&self, event: FileSystemEvent) {
//!         println!("{}: {}", event.kind, event.target_path());
//!     }
//! }
//!
//! # async fn example() -> Result<(), tw_watcher::WatchError> {
//! let watcher = FileWatcher::start(
//!     Utf8Path::new("/media/jobs"),
//!     PatternFilter::new("*.xlsx")?,
//!     Arc::new(Print),
//! )?;
//!
//! // ... later
//! watcher.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecursiveMode, Watcher};
use smallvec::SmallVec;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::WatchError;
use crate::events::{FileSystemEvent, FsEventKind};
use crate::filter::FileFilter;
use crate::handler::EventSink;

/// A recursive watch over one directory tree.
///
/// # Lifecycle
///
/// 1. **Start**: [`FileWatcher::start`] validates the path and spawns a
///    blocking task owning the notify watcher.
/// 2. **Delivery**: every accepted event is dispatched to the sink on the
///    notify callback thread.
/// 3. **Shutdown**: [`shutdown`](Self::shutdown) stops the watcher and
///    waits for the task. Dropping sends the stop signal without waiting.
pub struct FileWatcher {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task_handle: Option<JoinHandle<Result<(), WatchError>>>,
    watch_path: Utf8PathBuf,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("watch_path", &self.watch_path)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// Starts watching `path` recursively.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::PathNotFound`] if `path` does not exist and
    /// [`WatchError::Io`] if it cannot be canonicalized. Failures of the
    /// notify backend surface from [`shutdown`](Self::shutdown).
    pub fn start<F, S>(path: &Utf8Path, filter: F, sink: Arc<S>) -> Result<Self, WatchError>
    where
        F: FileFilter,
        S: EventSink,
    {
        if !path.exists() {
            return Err(WatchError::path_not_found(path));
        }
        let watch_path = path.canonicalize_utf8()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task_path = watch_path.clone();
        let task_handle = tokio::task::spawn_blocking(move || {
            run_watcher_loop(&task_path, filter, sink, shutdown_rx)
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(task_handle),
            watch_path,
        })
    }

    /// Returns the canonical path being watched.
    #[must_use]
    pub fn watch_path(&self) -> &Utf8Path {
        &self.watch_path
    }

    /// Returns `true` while the watcher task is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some() && self.task_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the watcher and waits for its task to finish.
    ///
    /// The notify backend is dropped before this returns, so no new
    /// notifications are delivered. A callback already running on the
    /// backend's own thread may still finish dispatching to the sink.
    ///
    /// # Errors
    ///
    /// Returns the error the notify backend failed with, or
    /// [`WatchError::Worker`] if the task panicked.
    pub async fn shutdown(mut self) -> Result<(), WatchError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|source| WatchError::Worker {
                    worker: "file watcher",
                    source,
                })??;
        }
        Ok(())
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn run_watcher_loop<F, S>(
    path: &Utf8Path,
    filter: F,
    sink: Arc<S>,
    shutdown_rx: oneshot::Receiver<()>,
) -> Result<(), WatchError>
where
    F: FileFilter,
    S: EventSink,
{
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let event = match res {
            Ok(event) => event,
            Err(error) => {
                warn!(error = %error, "Watcher error");
                return;
            }
        };
        for event in translate(event) {
            if event.target_path().is_dir() {
                continue;
            }
            if !passes(&filter, &event) {
                trace!(path = %event.target_path(), "Filtered out file event");
                continue;
            }
            sink.dispatch(event);
        }
    })?;

    watcher.watch(path.as_std_path(), RecursiveMode::Recursive)?;
    info!(path = %path, "File watcher started");

    // Dropping the watcher at the end of this function stops the callbacks.
    let _ = shutdown_rx.blocking_recv();

    info!(path = %path, "File watcher stopped");
    Ok(())
}

/// A move passes if either end matches, so renaming a matching file to any
/// other name is still seen.
fn passes<F: FileFilter>(filter: &F, event: &FileSystemEvent) -> bool {
    event.paths().any(|path| filter.should_process(path))
}

/// Converts one notify event into zero or more filesystem events.
///
/// Renames reported as a single event with both paths become one move with
/// a destination. A rename reported by one half only, or without saying
/// which half, becomes a move of each path it names.
fn translate(event: notify::Event) -> SmallVec<[FileSystemEvent; 2]> {
    let kind = match event.kind {
        EventKind::Create(_) => FsEventKind::Created,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter().filter_map(utf8);
            return match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => smallvec::smallvec![FileSystemEvent::moved(from, to)],
                (Some(to), None) => {
                    smallvec::smallvec![FileSystemEvent::new(FsEventKind::Moved, to)]
                }
                _ => SmallVec::new(),
            };
        }
        EventKind::Modify(ModifyKind::Name(_)) => FsEventKind::Moved,
        EventKind::Modify(_) => FsEventKind::Modified,
        EventKind::Remove(_) | EventKind::Access(_) | EventKind::Any | EventKind::Other => {
            return SmallVec::new();
        }
    };

    event
        .paths
        .into_iter()
        .filter_map(utf8)
        .map(|path| FileSystemEvent::new(kind, path))
        .collect()
}

fn utf8(path: PathBuf) -> Option<Utf8PathBuf> {
    match Utf8PathBuf::try_from(path) {
        Ok(path) => Some(path),
        Err(e) => {
            let error = WatchError::non_utf8_path(e.into_path_buf());
            debug!(error = %error, "Skipping file event");
            None
        }
    }
}
