//! Directory debounce register.
//!
//! The register is the single authority on which directories are waiting
//! for a sweep. Every directory is in exactly one of three states:
//!
//! ```text
//!            register                begin_sweep             release
//!  absent ─────────────► pending ─────────────────► sweeping ─────────► absent
//!                        │    ▲                        │
//!              register  │    │ release (re-armed)     │ register
//!              (no-op)   ▼    │                        ▼
//!                      pending └──────────────── sweeping + re-arm
//! ```
//!
//! The registration timestamp is taken on `absent -> pending` only. Later
//! registrations never move it, so a directory under constant writes is
//! still swept no later than one settle window after its first event.
//!
//! Membership and timestamp live in one map behind one mutex: a directory
//! is either present with its timestamp or absent, never half-registered.
//! Queuing onto the scan channel happens under the same lock, so the
//! channel holds each pending directory exactly once.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use crate::error::WatchError;

/// Receiving end of the scan queue, consumed by the
/// [`ScanWorker`](crate::ScanWorker).
pub type ScanQueue = mpsc::UnboundedReceiver<Utf8PathBuf>;

/// Outcome of [`DebounceRegister::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The directory was absent and is now queued for a sweep.
    Queued,
    /// The directory was already waiting; nothing changed.
    AlreadyPending,
    /// The directory is being swept; it will be queued again on release.
    Rearmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    Sweeping { rearm: Option<Instant> },
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    registered_at: Instant,
    phase: Phase,
}

/// Concurrency-safe set of directories awaiting their settle window.
///
/// Shared between the event handler (notify callback thread) and the scan
/// worker. All operations take the internal lock briefly and never block on
/// I/O.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tw_watcher::{DebounceRegister, Registration};
/// use camino::Utf8Path;
///
/// let (register, mut queue) = DebounceRegister::new(Duration::from_secs(5));
/// let dir = Utf8Path::new("/m/c1/briefing/cuts");
///
/// assert_eq!(register.register(dir).unwrap(), Registration::Queued);
/// assert_eq!(register.register(dir).unwrap(), Registration::AlreadyPending);
///
/// assert_eq!(queue.try_recv().unwrap(), dir);
/// assert!(queue.try_recv().is_err());
/// ```
#[derive(Debug)]
pub struct DebounceRegister {
    settle_window: Duration,
    entries: Mutex<FxHashMap<Utf8PathBuf, Entry>>,
    scan_tx: mpsc::UnboundedSender<Utf8PathBuf>,
}

impl DebounceRegister {
    /// Creates an empty register and the queue its directories are sent on.
    #[must_use]
    pub fn new(settle_window: Duration) -> (Self, ScanQueue) {
        let (scan_tx, scan_rx) = mpsc::unbounded_channel();
        let register = Self {
            settle_window,
            entries: Mutex::new(FxHashMap::default()),
            scan_tx,
        };
        (register, scan_rx)
    }

    /// Returns the configured settle window.
    #[inline]
    #[must_use]
    pub const fn settle_window(&self) -> Duration {
        self.settle_window
    }

    /// Registers `dir` for a delayed sweep, stamped with the current instant.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::ChannelClosed`] if the scan worker is gone. The
    /// directory is not left registered in that case.
    pub fn register(&self, dir: &Utf8Path) -> Result<Registration, WatchError> {
        self.register_at(dir, Instant::now())
    }

    /// Registers `dir` as if the event had arrived at `now`.
    pub fn register_at(&self, dir: &Utf8Path, now: Instant) -> Result<Registration, WatchError> {
        let mut entries = self.entries.lock();
        match entries.get_mut(dir) {
            Some(Entry {
                phase: Phase::Pending,
                ..
            }) => Ok(Registration::AlreadyPending),
            Some(Entry {
                phase: Phase::Sweeping { rearm },
                ..
            }) => {
                rearm.get_or_insert(now);
                debug!(dir = %dir, "Registration during sweep, re-armed");
                Ok(Registration::Rearmed)
            }
            None => {
                self.scan_tx
                    .send(dir.to_owned())
                    .map_err(|_| WatchError::ChannelClosed)?;
                entries.insert(
                    dir.to_owned(),
                    Entry {
                        registered_at: now,
                        phase: Phase::Pending,
                    },
                );
                debug!(dir = %dir, "Directory pending");
                Ok(Registration::Queued)
            }
        }
    }

    /// Returns when `dir` was first registered, if it is registered.
    #[must_use]
    pub fn registered_at(&self, dir: &Utf8Path) -> Option<Instant> {
        self.entries.lock().get(dir).map(|e| e.registered_at)
    }

    /// Returns how much of the settle window is left for `dir` at `now`.
    ///
    /// Zero once the window has elapsed; `None` if `dir` is not registered.
    #[must_use]
    pub fn remaining(&self, dir: &Utf8Path, now: Instant) -> Option<Duration> {
        self.registered_at(dir).map(|registered_at| {
            self.settle_window
                .saturating_sub(now.saturating_duration_since(registered_at))
        })
    }

    /// Marks `dir` as being swept.
    ///
    /// Returns `false` if `dir` was not pending.
    pub fn begin_sweep(&self, dir: &Utf8Path) -> bool {
        let mut entries = self.entries.lock();
        match entries.get_mut(dir) {
            Some(entry) if entry.phase == Phase::Pending => {
                entry.phase = Phase::Sweeping { rearm: None };
                true
            }
            _ => false,
        }
    }

    /// Removes `dir` after its sweep.
    ///
    /// If an event arrived during the sweep the directory is queued again
    /// with that event's timestamp and `Ok(true)` is returned.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::ChannelClosed`] if a re-armed directory cannot
    /// be queued. It is removed in that case.
    pub fn release(&self, dir: &Utf8Path) -> Result<bool, WatchError> {
        let mut entries = self.entries.lock();
        let Some(phase) = entries.get(dir).map(|e| e.phase) else {
            return Ok(false);
        };
        match phase {
            Phase::Sweeping {
                rearm: Some(registered_at),
            } => {
                if self.scan_tx.send(dir.to_owned()).is_err() {
                    entries.remove(dir);
                    return Err(WatchError::ChannelClosed);
                }
                entries.insert(
                    dir.to_owned(),
                    Entry {
                        registered_at,
                        phase: Phase::Pending,
                    },
                );
                debug!(dir = %dir, "Directory re-queued after sweep");
                Ok(true)
            }
            Phase::Sweeping { rearm: None } | Phase::Pending => {
                entries.remove(dir);
                Ok(false)
            }
        }
    }

    /// Returns `true` if `dir` is pending or being swept.
    #[must_use]
    pub fn is_registered(&self, dir: &Utf8Path) -> bool {
        self.entries.lock().contains_key(dir)
    }

    /// Returns `true` if `dir` is being swept right now.
    #[must_use]
    pub fn is_sweeping(&self, dir: &Utf8Path) -> bool {
        self.entries
            .lock()
            .get(dir)
            .is_some_and(|e| matches!(e.phase, Phase::Sweeping { .. }))
    }

    /// Returns the number of registered directories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if no directory is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
