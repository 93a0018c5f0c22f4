//! The processing queue and its single consumer.
//!
//! Items are processed strictly in queue order, one at a time. The
//! [`Processor`] runs on the blocking pool but the worker awaits each call
//! before dequeuing the next, so two calls never overlap and processors need
//! no locking of their own.
//!
//! A processor error or panic is logged and the worker moves on. There is
//! no retry and no dead-letter queue.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::events::{FileSystemEvent, FsEventKind, WorkItem};

/// Sending half of the processing queue.
pub type WorkSender = mpsc::UnboundedSender<WorkItem>;

/// Receiving half of the processing queue.
pub type WorkQueue = mpsc::UnboundedReceiver<WorkItem>;

/// Creates an empty processing queue.
#[must_use]
pub fn work_queue() -> (WorkSender, WorkQueue) {
    mpsc::unbounded_channel()
}

/// The downstream capability invoked for each queued file.
///
/// Implementations are called synchronously from a blocking thread, never
/// concurrently with themselves.
///
/// Closures with the matching signature implement this trait:
///
/// ```
/// use tw_watcher::{FileSystemEvent, FsEventKind, Processor};
///
/// let processor = |kind: FsEventKind, event: &FileSystemEvent| -> anyhow::Result<()> {
///     println!("{kind}: {}", event.path);
///     Ok(())
/// };
/// # fn assert_processor<P: Processor>(_: &P) {}
/// # assert_processor(&processor);
/// ```
pub trait Processor: Send + Sync + 'static {
    /// Processes one file. Errors are logged by the worker.
    fn process(&self, kind: FsEventKind, event: &FileSystemEvent) -> anyhow::Result<()>;
}

impl<F> Processor for F
where
    F: Fn(FsEventKind, &FileSystemEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn process(&self, kind: FsEventKind, event: &FileSystemEvent) -> anyhow::Result<()> {
        self(kind, event)
    }
}

/// Counters reported by a [`ProcessingWorker`] when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingStats {
    /// Items processed successfully.
    pub processed: usize,
    /// Items whose processing returned an error or panicked.
    pub failed: usize,
}

/// The single consumer of the processing queue.
pub struct ProcessingWorker<P> {
    processor: Arc<P>,
}

impl<P> std::fmt::Debug for ProcessingWorker<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingWorker").finish_non_exhaustive()
    }
}

impl<P: Processor> ProcessingWorker<P> {
    /// Creates a worker around `processor`.
    #[must_use]
    pub fn new(processor: P) -> Self {
        Self {
            processor: Arc::new(processor),
        }
    }

    /// Creates a worker around a shared processor.
    #[must_use]
    pub const fn from_shared(processor: Arc<P>) -> Self {
        Self { processor }
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    pub fn spawn(self, queue: WorkQueue) -> JoinHandle<ProcessingStats> {
        tokio::spawn(self.run(queue))
    }

    /// Drains `queue` until [`WorkItem::Shutdown`] or until every sender is
    /// dropped.
    pub async fn run(self, mut queue: WorkQueue) -> ProcessingStats {
        let mut stats = ProcessingStats::default();

        while let Some(item) = queue.recv().await {
            let (kind, event) = match item {
                WorkItem::Process(kind, event) => (kind, event),
                WorkItem::Shutdown => {
                    debug!("Shutdown received, processing worker exiting");
                    break;
                }
            };

            info!(kind = %kind, path = %event.path, "Processing event");
            let path = event.path.clone();
            let processor = Arc::clone(&self.processor);
            let outcome =
                tokio::task::spawn_blocking(move || processor.process(kind, &event)).await;

            match outcome {
                Ok(Ok(())) => stats.processed += 1,
                Ok(Err(error)) => {
                    stats.failed += 1;
                    error!(kind = %kind, path = %path, error = ?error, "Processing failed");
                }
                Err(join_error) => {
                    stats.failed += 1;
                    error!(kind = %kind, path = %path, error = %join_error, "Processing panicked");
                }
            }
        }

        debug!(
            processed = stats.processed,
            failed = stats.failed,
            "Processing worker stopped"
        );
        stats
    }
}
