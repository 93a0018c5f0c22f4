//! Lifecycle of a running watcher.
//!
//! [`Pipeline::start`] wires the stages together and starts them in
//! dependency order: processing worker, scan worker, then the notification
//! source. Shutdown runs the reverse:
//!
//! 1. stop the [`FileWatcher`] and wait for its task;
//! 2. cancel the [`ScanWorker`] and wait for it (a walk in progress still
//!    emits its files, a settle-window wait is abandoned);
//! 3. push [`WorkItem::Shutdown`] and wait for the processing worker to
//!    drain everything queued before it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8Path;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use tw_core::Config;

use crate::classifier::PathClassifier;
use crate::debounce::DebounceRegister;
use crate::error::WatchError;
use crate::events::WorkItem;
use crate::filter::PatternFilter;
use crate::handler::EventHandler;
use crate::processor::{ProcessingStats, ProcessingWorker, Processor, WorkSender, work_queue};
use crate::sweep::{ScanStats, ScanWorker};
use crate::watcher::FileWatcher;

/// Summary returned once every stage has stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Items the processor handled successfully.
    pub processed: usize,
    /// Items whose processing failed or panicked.
    pub failed: usize,
    /// Directory sweeps performed.
    pub sweeps: usize,
    /// Files discovered by sweeps.
    pub files_found: usize,
    /// Directories still waiting for their settle window at shutdown.
    pub abandoned_directories: usize,
}

impl ShutdownReport {
    fn new(scan: ScanStats, processing: ProcessingStats) -> Self {
        Self {
            processed: processing.processed,
            failed: processing.failed,
            sweeps: scan.sweeps,
            files_found: scan.files_found,
            abandoned_directories: scan.abandoned,
        }
    }
}

/// A running watcher: notification source, debounce register and both
/// workers.
///
/// # Examples
///
/// ```no_run
/// use tw_core::Config;
/// use tw_watcher::{CompanionProcessor, LoggingHandler, Pipeline};
///
/// # async fn example() -> Result<(), tw_watcher::WatchError> {
/// let config = Config::default();
/// let processor = CompanionProcessor::new(&config.layout, &config.processing, LoggingHandler);
///
/// let pipeline = Pipeline::start(&config, processor)?;
/// let report = pipeline
///     .run_until(async {
///         let _ = tokio::signal::ctrl_c().await;
///     })
///     .await?;
/// println!("processed {} files", report.processed);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Pipeline {
    watcher: FileWatcher,
    handler: Arc<EventHandler>,
    register: Arc<DebounceRegister>,
    work_tx: WorkSender,
    cancel: CancellationToken,
    scan_task: JoinHandle<ScanStats>,
    process_task: JoinHandle<ProcessingStats>,
    heartbeat: Duration,
}

impl Pipeline {
    /// Validates `config` and starts every stage.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Config`] for an invalid configuration,
    /// [`WatchError::Pattern`] for a bad filename glob and
    /// [`WatchError::PathNotFound`] if the watched root does not exist.
    pub fn start<P: Processor>(config: &Config, processor: P) -> Result<Self, WatchError> {
        config.validate()?;
        let filter = PatternFilter::new(&config.watch.pattern)?;
        if !config.watch.root.exists() {
            return Err(WatchError::path_not_found(&config.watch.root));
        }

        let classifier = Arc::new(PathClassifier::new(&config.layout));
        let (register, scan_queue) = DebounceRegister::new(config.debounce.settle_window());
        let register = Arc::new(register);
        let (work_tx, work_rx) = work_queue();
        let cancel = CancellationToken::new();

        let process_task = ProcessingWorker::new(processor).spawn(work_rx);
        let scan_task = ScanWorker::new(Arc::clone(&register), work_tx.clone())
            .spawn(scan_queue, cancel.clone());

        let handler = Arc::new(
            EventHandler::new(classifier, Arc::clone(&register), work_tx.clone())
                .with_forward_immediately(config.watch.forward_immediately),
        );

        let watcher = match FileWatcher::start(&config.watch.root, filter, Arc::clone(&handler)) {
            Ok(watcher) => watcher,
            Err(error) => {
                cancel.cancel();
                let _ = work_tx.send(WorkItem::Shutdown);
                return Err(error);
            }
        };

        debug!(
            worker_threads = config.debounce.worker_threads,
            "Worker thread count is reserved; one processing worker runs"
        );
        info!(
            root = %watcher.watch_path(),
            pattern = %config.watch.pattern,
            settle_ms = config.debounce.settle_ms,
            forward_immediately = config.watch.forward_immediately,
            "Watching for cut-list changes"
        );

        Ok(Self {
            watcher,
            handler,
            register,
            work_tx,
            cancel,
            scan_task,
            process_task,
            heartbeat: config.debounce.heartbeat(),
        })
    }

    /// Returns the canonical watched root.
    #[must_use]
    pub fn watch_path(&self) -> &Utf8Path {
        self.watcher.watch_path()
    }

    /// Returns the handler the notification source feeds.
    ///
    /// Events dispatched to it directly go through the same classification
    /// and debounce path as notifications.
    #[must_use]
    pub fn handler(&self) -> &Arc<EventHandler> {
        &self.handler
    }

    /// Returns the debounce register.
    #[must_use]
    pub fn register(&self) -> &DebounceRegister {
        &self.register
    }

    /// Idles until `signal` completes, then shuts down.
    ///
    /// A heartbeat fires every `heartbeat_ms` while waiting. If the
    /// notification source dies on its own the pipeline shuts down too.
    pub async fn run_until<F>(self, signal: F) -> Result<ShutdownReport, WatchError>
    where
        F: Future<Output = ()>,
    {
        let mut heartbeat = tokio::time::interval(self.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(signal);

        loop {
            tokio::select! {
                () = &mut signal => {
                    info!("Shutdown requested");
                    break;
                }
                _ = heartbeat.tick() => {
                    if !self.watcher.is_running() {
                        warn!("File watcher stopped unexpectedly");
                        break;
                    }
                    trace!(pending = self.register.len(), "Heartbeat");
                }
            }
        }

        self.shutdown().await
    }

    /// Stops every stage in order and reports what was done.
    ///
    /// Every item queued for processing before the stop message is
    /// processed before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Worker`] if a worker task panicked, or the
    /// error the notification source failed with. All stages are stopped
    /// in either case.
    pub async fn shutdown(self) -> Result<ShutdownReport, WatchError> {
        let Self {
            watcher,
            handler,
            register,
            work_tx,
            cancel,
            scan_task,
            process_task,
            ..
        } = self;

        let watcher_result = watcher.shutdown().await;
        if let Err(error) = &watcher_result {
            error!(error = %error, "File watcher failed");
        }
        drop(handler);
        debug!("File watcher stopped");

        cancel.cancel();
        let (scan, processing) = stop_workers(scan_task, work_tx, process_task).await?;
        debug!(pending = register.len(), "Workers stopped");

        let report = ShutdownReport::new(scan, processing);
        info!(
            processed = report.processed,
            failed = report.failed,
            abandoned_directories = report.abandoned_directories,
            "Pipeline stopped"
        );
        watcher_result.map(|()| report)
    }
}

/// Joins the scan worker, then stops and joins the processing worker.
///
/// The processing worker is always stopped and drained, even when the scan
/// worker failed; that failure is returned afterwards.
async fn stop_workers(
    scan_task: JoinHandle<ScanStats>,
    work_tx: WorkSender,
    process_task: JoinHandle<ProcessingStats>,
) -> Result<(ScanStats, ProcessingStats), WatchError> {
    let scan = scan_task.await.map_err(|source| WatchError::Worker {
        worker: "scan worker",
        source,
    });
    if let Err(error) = &scan {
        error!(error = %error, "Scan worker failed");
    }

    if work_tx.send(WorkItem::Shutdown).is_err() {
        warn!("Processing worker already gone");
    }
    drop(work_tx);
    let processing = process_task.await.map_err(|source| WatchError::Worker {
        worker: "processing worker",
        source,
    })?;

    Ok((scan?, processing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{FileSystemEvent, FsEventKind};
    use camino::Utf8PathBuf;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn test_failed_scan_worker_still_drains_processing() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let process = move |_: FsEventKind, event: &FileSystemEvent| -> anyhow::Result<()> {
            sink.lock().push(event.path.clone());
            Ok(())
        };

        let (work_tx, work_rx) = work_queue();
        let process_task = ProcessingWorker::new(process).spawn(work_rx);
        for name in ["A.xlsx", "B.xlsx"] {
            work_tx
                .send(WorkItem::discovered(Utf8PathBuf::from(name)))
                .unwrap();
        }
        let scan_task: JoinHandle<ScanStats> = tokio::spawn(async { panic!("walk exploded") });

        let err = stop_workers(scan_task, work_tx, process_task)
            .await
            .unwrap_err();

        assert!(matches!(err, WatchError::Worker { worker: "scan worker", .. }));
        assert_eq!(*seen.lock(), ["A.xlsx", "B.xlsx"]);
    }

    #[tokio::test]
    async fn test_stop_workers_reports_both() {
        let (work_tx, work_rx) = work_queue();
        let noop = |_: FsEventKind, _: &FileSystemEvent| -> anyhow::Result<()> { Ok(()) };
        let process_task = ProcessingWorker::new(noop).spawn(work_rx);
        work_tx
            .send(WorkItem::discovered(Utf8PathBuf::from("A.xlsx")))
            .unwrap();
        let scan_task = tokio::spawn(async {
            ScanStats {
                sweeps: 1,
                files_found: 1,
                abandoned: 0,
            }
        });

        let (scan, processing) = stop_workers(scan_task, work_tx, process_task)
            .await
            .unwrap();

        assert_eq!(scan.sweeps, 1);
        assert_eq!(processing.processed, 1);
    }
}
