//! Configuration structures for the tag watcher.
//!
//! This module provides configuration types for every stage of the pipeline:
//!
//! - [`WatchConfig`] - Watched root and filename pattern
//! - [`DebounceConfig`] - Settle window and main-loop heartbeat
//! - [`LayoutConfig`] - Directory names that mark a cut-list folder
//! - [`ProcessingConfig`] - Companion document lookup and downstream command
//! - [`LogConfig`] - Rotating log file location
//! - [`Config`] - Root configuration combining all settings
//!
//! All configuration types implement [`Default`] with the values used in
//! production, and every section is `#[serde(default)]` so a JSON file only
//! needs to name the options it overrides.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for the filesystem notification source.
///
/// # Examples
///
/// ```
/// use tw_core::WatchConfig;
///
/// let config = WatchConfig::default();
/// assert_eq!(config.pattern, "*.xlsx");
/// assert!(!config.forward_immediately);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Root directory watched recursively.
    pub root: Utf8PathBuf,

    /// Filename glob an event must match, compared case-insensitively.
    pub pattern: String,

    /// Also enqueue accepted events directly for processing, without
    /// waiting for the directory sweep.
    pub forward_immediately: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: Utf8PathBuf::new(),
            pattern: "*.xlsx".to_owned(),
            forward_immediately: false,
        }
    }
}

/// Timing of the directory debounce and of the controller loop.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tw_core::DebounceConfig;
///
/// let config = DebounceConfig::default();
/// assert_eq!(config.settle_window(), Duration::from_secs(5));
/// assert_eq!(config.heartbeat(), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Settle window in milliseconds, measured from the first event seen
    /// for a directory.
    pub settle_ms: u64,

    /// Heartbeat interval of the controller loop in milliseconds.
    pub heartbeat_ms: u64,

    /// Number of processing workers. Only one is ever started; the value is
    /// validated and logged.
    pub worker_threads: usize,
}

impl DebounceConfig {
    /// Returns the settle window as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Returns the heartbeat interval as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            settle_ms: 5_000,
            heartbeat_ms: 1_000,
            worker_threads: 4,
        }
    }
}

/// Directory names that identify a spreadsheet of interest.
///
/// A file is of interest when its parent directory is named
/// [`cut_list_dir`](Self::cut_list_dir) and its grandparent is named
/// [`briefing_dir`](Self::briefing_dir).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Name of the directory holding the cut-list spreadsheets.
    pub cut_list_dir: String,

    /// Name of the directory that must contain the cut-list directory.
    pub briefing_dir: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            cut_list_dir: "Listas de Corte e Etiquetas".to_owned(),
            briefing_dir: "briefing".to_owned(),
        }
    }
}

/// Settings for the processing stage that consumes swept files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Suffix appended to the spreadsheet stem to name its companion PDF.
    pub companion_suffix: String,

    /// Secondary spreadsheet used to cross-reference extracted data.
    pub mapping_file: Utf8PathBuf,

    /// External program invoked for each ready job. `None` only logs jobs.
    pub command: Option<String>,
}

impl ProcessingConfig {
    /// Returns the companion document file name for a spreadsheet stem.
    ///
    /// # Examples
    ///
    /// ```
    /// use tw_core::ProcessingConfig;
    ///
    /// let config = ProcessingConfig::default();
    /// assert_eq!(config.companion_file_name("Cozinha"), "Cozinha_ETQs.pdf");
    /// ```
    #[must_use]
    pub fn companion_file_name(&self, stem: &str) -> String {
        format!("{stem}{}.pdf", self.companion_suffix)
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            companion_suffix: "_ETQs".to_owned(),
            mapping_file: Utf8PathBuf::from("MAPPING.xlsx"),
            command: None,
        }
    }
}

/// Location of the rotating log file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Directory receiving the log files. Created on startup.
    pub dir: Utf8PathBuf,

    /// File name prefix of the rotated files.
    pub file_prefix: String,

    /// Number of rotated files kept on disk.
    pub max_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: Utf8PathBuf::from("logs"),
            file_prefix: "tag-watcher".to_owned(),
            max_files: 3,
        }
    }
}

/// Root configuration for the tag watcher.
///
/// # Examples
///
/// ```
/// use tw_core::Config;
///
/// let config = Config::default();
/// let json = serde_json::to_string_pretty(&config).unwrap();
/// assert!(json.contains("settle_ms"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Notification source configuration.
    pub watch: WatchConfig,

    /// Debounce timing.
    pub debounce: DebounceConfig,

    /// Recognised directory layout.
    pub layout: LayoutConfig,

    /// Processing stage configuration.
    pub processing: ProcessingConfig,

    /// Logging configuration.
    pub log: LogConfig,
}

impl Config {
    /// Loads a configuration from a JSON file.
    ///
    /// Missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid JSON for this structure.
    pub fn from_json_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Checks the options that would otherwise fail deep inside the pipeline.
    ///
    /// The watched root is not checked here; the watcher reports a missing
    /// root itself.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce.settle_ms == 0 {
            return Err(ConfigError::invalid_option(
                "debounce.settle_ms",
                "must be greater than zero",
            ));
        }
        if self.debounce.heartbeat_ms == 0 {
            return Err(ConfigError::invalid_option(
                "debounce.heartbeat_ms",
                "must be greater than zero",
            ));
        }
        if self.debounce.worker_threads == 0 {
            return Err(ConfigError::invalid_option(
                "debounce.worker_threads",
                "must be at least one",
            ));
        }
        if self.layout.cut_list_dir.trim().is_empty() {
            return Err(ConfigError::invalid_option(
                "layout.cut_list_dir",
                "must not be empty",
            ));
        }
        if self.layout.briefing_dir.trim().is_empty() {
            return Err(ConfigError::invalid_option(
                "layout.briefing_dir",
                "must not be empty",
            ));
        }
        if let Err(e) = globset::Glob::new(&self.watch.pattern) {
            return Err(ConfigError::invalid_option("watch.pattern", e.to_string()));
        }
        Ok(())
    }
}
