//! Routing of filtered notifications.
//!
//! The [`FileWatcher`](crate::FileWatcher) hands every event that passed
//! its [`FileFilter`](crate::FileFilter) to an [`EventSink`]. The sink used
//! in production is [`EventHandler`], which classifies the event's paths and
//! registers their directories with the [`DebounceRegister`].
//!
//! Sinks run on the notify callback thread. They must not block on I/O
//! beyond the classifier's first look at a path.

use std::sync::Arc;

use camino::Utf8PathBuf;
use smallvec::SmallVec;
use tracing::{debug, error, info};

use crate::classifier::PathClassifier;
use crate::debounce::{DebounceRegister, Registration};
use crate::events::{FileSystemEvent, FsEventKind, WorkItem};
use crate::processor::WorkSender;

/// Receiver of filtered filesystem events.
///
/// The three callbacks default to [`on_event`](Self::on_event), so a sink
/// that treats all kinds alike only implements that one.
pub trait EventSink: Send + Sync + 'static {
    /// Called for every event not handled by a kind-specific callback.
    fn on_event(&self, event: FileSystemEvent);

    /// A file appeared.
    fn on_created(&self, event: FileSystemEvent) {
        self.on_event(event);
    }

    /// A file changed.
    fn on_modified(&self, event: FileSystemEvent) {
        self.on_event(event);
    }

    /// A file was moved or renamed.
    fn on_moved(&self, event: FileSystemEvent) {
        self.on_event(event);
    }

    /// Dispatches `event` to the callback for its kind.
    fn dispatch(&self, event: FileSystemEvent) {
        match event.kind {
            FsEventKind::Created => self.on_created(event),
            FsEventKind::Modified => self.on_modified(event),
            FsEventKind::Moved => self.on_moved(event),
        }
    }
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn on_event(&self, event: FileSystemEvent) {
        (**self).on_event(event);
    }

    fn on_created(&self, event: FileSystemEvent) {
        (**self).on_created(event);
    }

    fn on_modified(&self, event: FileSystemEvent) {
        (**self).on_modified(event);
    }

    fn on_moved(&self, event: FileSystemEvent) {
        (**self).on_moved(event);
    }
}

/// What [`EventHandler::handle`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// No path of the event is a file of interest.
    Rejected,
    /// The parent directory of the first accepted path went through the
    /// register.
    Registered(Registration),
    /// The scan queue is closed; the pipeline is shutting down.
    Dropped,
}

/// Classifies events and feeds the debounce register.
#[derive(Debug)]
pub struct EventHandler {
    classifier: Arc<PathClassifier>,
    register: Arc<DebounceRegister>,
    work_tx: WorkSender,
    forward_immediately: bool,
}

impl EventHandler {
    /// Creates a handler that only registers directories.
    #[must_use]
    pub const fn new(
        classifier: Arc<PathClassifier>,
        register: Arc<DebounceRegister>,
        work_tx: WorkSender,
    ) -> Self {
        Self {
            classifier,
            register,
            work_tx,
            forward_immediately: false,
        }
    }

    /// Also enqueue each accepted event for processing right away, in
    /// addition to registering its directory.
    #[must_use]
    pub const fn with_forward_immediately(mut self, forward: bool) -> Self {
        self.forward_immediately = forward;
        self
    }

    /// Returns the classifier this handler consults.
    #[must_use]
    pub fn classifier(&self) -> &PathClassifier {
        &self.classifier
    }

    /// Classifies `event` and registers the directory of each accepted path.
    ///
    /// The source path is judged first. A move is accepted if either its
    /// source or its destination lies in a cut-list directory, so moving a
    /// spreadsheet out of one still sweeps what is left behind.
    pub fn handle(&self, event: FileSystemEvent) -> Disposition {
        let mut dirs: SmallVec<[Utf8PathBuf; 2]> = SmallVec::new();
        for path in event.paths() {
            let path = self.classifier.canonicalize(path);
            if !self.classifier.is_valid(&path) {
                debug!(
                    kind = %event.kind,
                    path = %path,
                    "Ignoring file outside a cut-list directory"
                );
                continue;
            }
            info!(kind = %event.kind, path = %path, "Cut-list file changed");
            let Some(dir) = path.parent() else {
                continue;
            };
            if !dirs.iter().any(|d| d == dir) {
                dirs.push(dir.to_owned());
            }
        }

        let mut disposition = Disposition::Rejected;
        for dir in &dirs {
            let outcome = match self.register.register(dir) {
                Ok(registration) => Disposition::Registered(registration),
                Err(error) => {
                    error!(dir = %dir, error = %error, "Could not schedule directory sweep");
                    Disposition::Dropped
                }
            };
            if disposition == Disposition::Rejected || outcome == Disposition::Dropped {
                disposition = outcome;
            }
        }

        if disposition != Disposition::Rejected
            && self.forward_immediately
            && self.work_tx.send(WorkItem::forward(event)).is_err()
        {
            error!("Processing queue closed, event not forwarded");
        }

        disposition
    }
}

impl EventSink for EventHandler {
    fn on_event(&self, event: FileSystemEvent) {
        self.handle(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debounce::ScanQueue;
    use crate::processor::{WorkQueue, work_queue};
    use camino::Utf8Path;
    use std::time::Duration;
    use tw_core::LayoutConfig;

    const CUTS: &str = "/m/c1/briefing/Listas de Corte e Etiquetas";

    struct Fixture {
        handler: EventHandler,
        scans: ScanQueue,
        work: WorkQueue,
        register: Arc<DebounceRegister>,
    }

    fn fixture(forward: bool) -> Fixture {
        let classifier = Arc::new(PathClassifier::new(&LayoutConfig::default()));
        let (register, scans) = DebounceRegister::new(Duration::from_secs(5));
        let register = Arc::new(register);
        let (work_tx, work) = work_queue();
        let handler = EventHandler::new(classifier, Arc::clone(&register), work_tx)
            .with_forward_immediately(forward);
        Fixture {
            handler,
            scans,
            work,
            register,
        }
    }

    fn path(name: &str) -> Utf8PathBuf {
        Utf8Path::new(CUTS).join(name)
    }

    #[test]
    fn test_accepted_event_registers_parent() {
        let mut fx = fixture(false);

        let disposition = fx.handler.handle(FileSystemEvent::created(path("A.xlsx")));

        assert_eq!(disposition, Disposition::Registered(Registration::Queued));
        assert_eq!(fx.scans.try_recv().unwrap(), CUTS);
        assert!(fx.register.is_registered(Utf8Path::new(CUTS)));
        assert!(fx.work.try_recv().is_err());
    }

    #[test]
    fn test_create_then_modify_registers_once() {
        let mut fx = fixture(false);

        fx.handler.dispatch(FileSystemEvent::created(path("A.xlsx")));
        fx.handler
            .dispatch(FileSystemEvent::new(FsEventKind::Modified, path("A.xlsx")));
        fx.handler
            .dispatch(FileSystemEvent::new(FsEventKind::Modified, path("B.xlsx")));

        assert_eq!(fx.scans.try_recv().unwrap(), CUTS);
        assert!(fx.scans.try_recv().is_err());
        assert_eq!(fx.register.len(), 1);
    }

    #[test]
    fn test_rejected_event_touches_no_queue() {
        let mut fx = fixture(true);

        let disposition = fx
            .handler
            .handle(FileSystemEvent::created(Utf8PathBuf::from("/m/c1/other/A.xlsx")));

        assert_eq!(disposition, Disposition::Rejected);
        assert!(fx.scans.try_recv().is_err());
        assert!(fx.work.try_recv().is_err());
        assert!(fx.register.is_empty());
    }

    #[test]
    fn test_forward_immediately_enqueues_event_as_created() {
        let mut fx = fixture(true);

        fx.handler
            .dispatch(FileSystemEvent::new(FsEventKind::Modified, path("A.xlsx")));

        match fx.work.try_recv().unwrap() {
            WorkItem::Process(kind, event) => {
                assert_eq!(kind, FsEventKind::Created);
                assert_eq!(event.kind, FsEventKind::Modified);
                assert_eq!(event.path, path("A.xlsx"));
            }
            WorkItem::Shutdown => panic!("unexpected shutdown item"),
        }
        // The directory is still registered for a sweep.
        assert_eq!(fx.scans.try_recv().unwrap(), CUTS);
    }

    #[test]
    fn test_move_out_of_cut_list_sweeps_source_directory() {
        let mut fx = fixture(false);

        let out = FileSystemEvent::moved(
            path("A.xlsx"),
            Utf8PathBuf::from("/m/c1/arquivo/A.xlsx"),
        );
        assert_eq!(
            fx.handler.handle(out),
            Disposition::Registered(Registration::Queued)
        );

        assert_eq!(fx.scans.try_recv().unwrap(), CUTS);
        assert!(fx.scans.try_recv().is_err());
    }

    #[test]
    fn test_move_into_cut_list_sweeps_destination_directory() {
        let mut fx = fixture(false);

        let into = FileSystemEvent::moved(Utf8PathBuf::from("/tmp/A.xlsx"), path("A.xlsx"));
        assert_eq!(
            fx.handler.handle(into),
            Disposition::Registered(Registration::Queued)
        );

        assert_eq!(fx.scans.try_recv().unwrap(), CUTS);
        assert!(fx.scans.try_recv().is_err());
    }

    #[test]
    fn test_move_between_cut_lists_sweeps_both() {
        let mut fx = fixture(false);
        let other = "/m/c2/briefing/Listas de Corte e Etiquetas";

        let across = FileSystemEvent::moved(path("A.xlsx"), Utf8Path::new(other).join("A.xlsx"));
        fx.handler.handle(across);

        assert_eq!(fx.scans.try_recv().unwrap(), CUTS);
        assert_eq!(fx.scans.try_recv().unwrap(), other);
        assert_eq!(fx.register.len(), 2);

        // A rename inside one directory registers it once.
        let mut fx = fixture(false);
        fx.handler
            .handle(FileSystemEvent::moved(path("~$A.tmp"), path("A.xlsx")));
        assert_eq!(fx.register.len(), 1);
    }

    #[test]
    fn test_move_outside_layout_is_rejected() {
        let mut fx = fixture(true);

        let away = FileSystemEvent::moved(
            Utf8PathBuf::from("/m/c1/a/A.xlsx"),
            Utf8PathBuf::from("/m/c1/b/A.xlsx"),
        );
        assert_eq!(fx.handler.handle(away), Disposition::Rejected);
        assert!(fx.scans.try_recv().is_err());
        assert!(fx.work.try_recv().is_err());
    }

    #[test]
    fn test_closed_scan_queue_drops_event() {
        let Fixture { handler, scans, .. } = fixture(false);
        drop(scans);

        assert_eq!(
            handler.handle(FileSystemEvent::created(path("A.xlsx"))),
            Disposition::Dropped
        );
    }
}
