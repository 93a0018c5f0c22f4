//! Core configuration and errors for the tag watcher.
//!
//! This crate provides the foundational types shared across the workspace:
//!
//! - [`Config`] and its sections, loadable from JSON and overlaid by the CLI
//! - [`ConfigError`] for loading and validation failures
//!
//! Nothing here touches the filesystem watcher or the async runtime.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;

pub use config::{
    Config, DebounceConfig, LayoutConfig, LogConfig, ProcessingConfig, WatchConfig,
};
pub use error::ConfigError;
