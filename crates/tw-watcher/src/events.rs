//! Event and work-item types.
//!
//! # Event Flow
//!
//! ```text
//! notify event ──► FileSystemEvent ──► EventHandler
//!                                          │
//!                     ┌────────────────────┴───────────────┐
//!                     ▼                                    ▼
//!              DebounceRegister                (forward_immediately)
//!                     │                                    │
//!                     ▼                                    │
//!              ScanWorker sweep                            │
//!                     │                                    │
//!                     ▼                                    ▼
//!            WorkItem::Process(Created, ..)    WorkItem::Process(Created, ..)
//!                     └───────────────┬────────────────────┘
//!                                     ▼
//!                            ProcessingWorker
//! ```

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// The kind of filesystem change that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsEventKind {
    /// A file appeared.
    Created,
    /// A file's contents or metadata changed.
    Modified,
    /// A file was renamed or moved.
    Moved,
}

impl FsEventKind {
    /// Returns the lowercase label used in logs.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Moved => "moved",
        }
    }
}

impl fmt::Display for FsEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single filesystem change, immutable once built.
///
/// # Examples
///
/// ```
/// use tw_watcher::{FileSystemEvent, FsEventKind};
/// use camino::Utf8PathBuf;
///
/// let event = FileSystemEvent::new(FsEventKind::Modified, Utf8PathBuf::from("/b/cuts/A.xlsx"));
/// assert_eq!(event.target_path().as_str(), "/b/cuts/A.xlsx");
/// assert_eq!(event.file_name(), Some("A.xlsx"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystemEvent {
    /// What happened.
    pub kind: FsEventKind,

    /// The path reported by the source. For moves this is the old location.
    pub path: Utf8PathBuf,

    /// The new location of a moved file, when the source reports it.
    pub dest_path: Option<Utf8PathBuf>,

    /// When the event was received.
    pub timestamp: Instant,
}

impl FileSystemEvent {
    /// Creates a new event stamped with the current instant.
    #[inline]
    #[must_use]
    pub fn new(kind: FsEventKind, path: Utf8PathBuf) -> Self {
        Self {
            kind,
            path,
            dest_path: None,
            timestamp: Instant::now(),
        }
    }

    /// Creates a [`FsEventKind::Created`] event.
    #[inline]
    #[must_use]
    pub fn created(path: Utf8PathBuf) -> Self {
        Self::new(FsEventKind::Created, path)
    }

    /// Creates a [`FsEventKind::Moved`] event from `from` to `to`.
    #[inline]
    #[must_use]
    pub fn moved(from: Utf8PathBuf, to: Utf8PathBuf) -> Self {
        Self {
            dest_path: Some(to),
            ..Self::new(FsEventKind::Moved, from)
        }
    }

    /// Returns the path the file lives at after the event.
    ///
    /// This is the destination of a move when known, otherwise [`path`](Self::path).
    #[inline]
    #[must_use]
    pub fn target_path(&self) -> &Utf8Path {
        self.dest_path.as_deref().unwrap_or(&self.path)
    }

    /// Returns every path the event touches: the source, then the move
    /// destination if there is one.
    pub fn paths(&self) -> impl Iterator<Item = &Utf8Path> {
        std::iter::once(self.path.as_path()).chain(self.dest_path.as_deref())
    }

    /// Returns the file name of the target path.
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.target_path().file_name()
    }
}

/// An entry of the processing queue.
///
/// [`WorkItem::Shutdown`] is the stop message: the processing worker exits
/// as soon as it dequeues it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    /// Process the event under the given kind tag.
    Process(FsEventKind, FileSystemEvent),
    /// No more work.
    Shutdown,
}

impl WorkItem {
    /// Creates the item a directory sweep emits for a discovered file.
    #[inline]
    #[must_use]
    pub fn discovered(path: Utf8PathBuf) -> Self {
        Self::Process(FsEventKind::Created, FileSystemEvent::created(path))
    }

    /// Creates an item forwarding a raw event.
    ///
    /// Forwarded events are tagged [`FsEventKind::Created`] like sweep
    /// results; the event itself keeps its original kind.
    #[inline]
    #[must_use]
    pub fn forward(event: FileSystemEvent) -> Self {
        Self::Process(FsEventKind::Created, event)
    }

    /// Returns the event carried by this item, if any.
    #[inline]
    #[must_use]
    pub const fn event(&self) -> Option<&FileSystemEvent> {
        match self {
            Self::Process(_, event) => Some(event),
            Self::Shutdown => None,
        }
    }
}
