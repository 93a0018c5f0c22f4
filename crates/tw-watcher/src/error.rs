//! Error types for the tw-watcher crate.
//!
//! [`WatchError`] covers the pipeline plumbing (notification source,
//! channels, worker tasks). [`ProcessError`] covers the per-file processing
//! stage and never stops the pipeline.

use camino::Utf8PathBuf;

/// Errors that can occur while starting, running or stopping the pipeline.
///
/// # Error Recovery Strategy
///
/// - **Non-UTF-8 path** ([`WatchError::NonUtf8Path`]): logged, the path is skipped
/// - **Channel closed** ([`WatchError::ChannelClosed`]): the stage that hit it stops
/// - **Worker task failure** ([`WatchError::Worker`]): reported at shutdown
/// - Everything else is a startup failure and is returned to the caller
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Failed to initialize or operate the notify watcher.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The watched root does not exist.
    #[error("path does not exist: {0}")]
    PathNotFound(Utf8PathBuf),

    /// A queue between two pipeline stages was closed unexpectedly.
    #[error("pipeline channel closed unexpectedly")]
    ChannelClosed,

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// The filename pattern could not be compiled.
    #[error("invalid filename pattern: {0}")]
    Pattern(#[from] globset::Error),

    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] tw_core::ConfigError),

    /// A worker task panicked or was aborted.
    #[error("{worker} task failed: {source}")]
    Worker {
        /// Which worker failed.
        worker: &'static str,
        /// The join failure.
        #[source]
        source: tokio::task::JoinError,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchError {
    /// Creates a new [`WatchError::PathNotFound`] error.
    #[inline]
    pub fn path_not_found(path: impl Into<Utf8PathBuf>) -> Self {
        Self::PathNotFound(path.into())
    }

    /// Creates a new [`WatchError::NonUtf8Path`] error.
    #[inline]
    pub fn non_utf8_path(path: impl Into<std::path::PathBuf>) -> Self {
        Self::NonUtf8Path(path.into())
    }
}

/// Errors raised while processing a single discovered spreadsheet.
///
/// The processing worker logs these and moves on to the next item.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The companion document the spreadsheet depends on is missing.
    #[error("companion document does not exist: {0}")]
    MissingCompanion(Utf8PathBuf),

    /// The spreadsheet has no usable file stem.
    #[error("cannot derive a companion name from {0}")]
    NoStem(Utf8PathBuf),

    /// The downstream command ran but reported failure.
    #[error("command '{program}' exited with {status}")]
    CommandFailed {
        /// Program that was run.
        program: String,
        /// Exit status it reported.
        status: std::process::ExitStatus,
    },

    /// The downstream command could not be started.
    #[error("failed to start '{program}': {source}")]
    Spawn {
        /// Program that was run.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
