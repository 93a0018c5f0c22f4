//! Change detection, debounced directory sweeps and serialized processing
//! for cut-list spreadsheets.
//!
//! # Overview
//!
//! A cut-list spreadsheet lives directly inside
//! `<job>/briefing/Listas de Corte e Etiquetas/`. Saving one produces a
//! burst of notifications (temporary file, rename, several modifications).
//! This crate turns such bursts into a single reconciliation sweep of the
//! affected directory, and feeds every file found to one processor, one at
//! a time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── notify callback thread ─────────────────┐
//! │ FileWatcher ─► PatternFilter ─► EventHandler ─► PathClassifier      │
//! └──────────────────────────────────────│──────────────────────────────┘
//!                        register(dir)   │   (forward_immediately)
//!                                        ▼            │
//!                              DebounceRegister       │
//!                                        │ scan queue │
//!                                        ▼            │
//!                   ScanWorker (settle window, sweep) │
//!                                        │            │
//!                                        ▼            ▼
//!                                   processing queue (FIFO)
//!                                        │
//!                                        ▼
//!                      ProcessingWorker ─► Processor (e.g. CompanionProcessor)
//! ```
//!
//! [`Pipeline`] owns all of it and shuts it down in order.
//!
//! # Usage
//!
//! ```no_run
//! use tw_core::Config;
//! use tw_watcher::{FileSystemEvent, FsEventKind, Pipeline};
//!
//! # async fn example() -> Result<(), tw_watcher::WatchError> {
//! let mut config = Config::default();
//! config.watch.root = "/media/jobs".into();
//!
//! let process = |kind: FsEventKind, event: &FileSystemEvent| -> anyhow::Result<()> {
//!     println!("{kind}: {}", event.path);
//!     Ok(())
//! };
//! let pipeline = Pipeline::start(&config, process)?;
//!
//! let report = pipeline.shutdown().await?;
//! assert_eq!(report.failed, 0);
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Startup problems are [`WatchError`]s. Nothing after startup stops the
//! pipeline: classification misses are logged at debug, walk failures count
//! as empty sweeps and processor errors ([`ProcessError`] among them) are
//! logged by the processing worker.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod classifier;
pub mod companion;
pub mod debounce;
pub mod error;
pub mod events;
pub mod filter;
pub mod handler;
pub mod pipeline;
pub mod processor;
pub mod sweep;
pub mod watcher;

pub use classifier::PathClassifier;
pub use companion::{
    CommandHandler, CompanionJob, CompanionProcessor, DocumentHandler, LoggingHandler,
};
pub use debounce::{DebounceRegister, Registration, ScanQueue};
pub use error::{ProcessError, WatchError};
pub use events::{FileSystemEvent, FsEventKind, WorkItem};
pub use filter::{AcceptAllFilter, FileFilter, PatternFilter};
pub use handler::{Disposition, EventHandler, EventSink};
pub use pipeline::{Pipeline, ShutdownReport};
pub use processor::{
    ProcessingStats, ProcessingWorker, Processor, WorkQueue, WorkSender, work_queue,
};
pub use sweep::{DirectorySweeper, ScanStats, ScanWorker};
pub use watcher::FileWatcher;
