//! Directory sweeps and the delayed-scan worker.
//!
//! The [`ScanWorker`] consumes the scan queue fed by the
//! [`DebounceRegister`]. For each directory it waits out whatever is left of
//! the settle window, walks the directory recursively with
//! [`DirectorySweeper`], and emits one [`WorkItem::discovered`] per file.
//! The sweep is a reconciliation: every file present is reported as
//! created, whether or not it was touched.
//!
//! Walks run on the blocking pool. Unreadable entries are skipped and a
//! directory that vanished before its sweep yields zero files.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use ignore::WalkBuilder;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::debounce::{DebounceRegister, ScanQueue};
use crate::error::WatchError;
use crate::events::WorkItem;
use crate::processor::WorkSender;

/// Recursive file enumeration for a swept directory.
///
/// Hidden files and ignore files are not special-cased: every regular file
/// below the directory is reported, in file-name order per directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectorySweeper {
    follow_links: bool,
}

impl DirectorySweeper {
    /// Creates a sweeper that does not follow symbolic links.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            follow_links: false,
        }
    }

    /// Configures whether to follow symbolic links.
    #[must_use]
    pub const fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Returns every regular file below `dir`.
    ///
    /// Walk errors (permission denied, entries removed mid-walk, `dir`
    /// itself missing) are logged and skipped.
    #[must_use]
    pub fn sweep(&self, dir: &Utf8Path) -> Vec<Utf8PathBuf> {
        let walker = WalkBuilder::new(dir)
            .standard_filters(false)
            .follow_links(self.follow_links)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        let mut files = Vec::new();
        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(error) => {
                    debug!(dir = %dir, error = %error, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            match Utf8PathBuf::from_path_buf(entry.into_path()) {
                Ok(path) => files.push(path),
                Err(path) => {
                    let error = WatchError::non_utf8_path(path);
                    warn!(dir = %dir, error = %error, "Skipping file in sweep");
                }
            }
        }
        files
    }
}

/// Counters reported by a [`ScanWorker`] when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Directories swept.
    pub sweeps: usize,
    /// Files emitted to the processing queue.
    pub files_found: usize,
    /// Directories still registered when the worker stopped.
    pub abandoned: usize,
}

/// The delayed-scan worker.
///
/// Exactly one runs per pipeline. It is stopped through its
/// [`CancellationToken`]: a settle-window wait is abandoned immediately, a
/// walk in progress completes and its files are emitted first.
#[derive(Debug)]
pub struct ScanWorker {
    register: Arc<DebounceRegister>,
    sweeper: DirectorySweeper,
    work_tx: WorkSender,
}

impl ScanWorker {
    /// Creates a worker that sweeps directories from `register` into `work_tx`.
    #[must_use]
    pub fn new(register: Arc<DebounceRegister>, work_tx: WorkSender) -> Self {
        Self {
            register,
            sweeper: DirectorySweeper::new(),
            work_tx,
        }
    }

    /// Replaces the sweeper used for walks.
    #[must_use]
    pub const fn with_sweeper(mut self, sweeper: DirectorySweeper) -> Self {
        self.sweeper = sweeper;
        self
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    pub fn spawn(self, queue: ScanQueue, cancel: CancellationToken) -> JoinHandle<ScanStats> {
        tokio::spawn(self.run(queue, cancel))
    }

    /// Consumes the scan queue until cancelled or until the queue closes.
    pub async fn run(self, mut queue: ScanQueue, cancel: CancellationToken) -> ScanStats {
        let mut stats = ScanStats::default();
        debug!(settle_ms = self.register.settle_window().as_millis(), "Scan worker started");

        loop {
            let dir = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = queue.recv() => match next {
                    Some(dir) => dir,
                    None => break,
                },
            };

            let Some(remaining) = self.register.remaining(&dir, Instant::now()) else {
                warn!(dir = %dir, "Queued directory is not registered, skipping");
                continue;
            };
            if !remaining.is_zero() {
                debug!(
                    dir = %dir,
                    remaining_ms = remaining.as_millis(),
                    "Waiting for directory to settle"
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(remaining) => {}
                }
            }

            self.register.begin_sweep(&dir);
            let emitted = self.sweep(&dir).await;
            stats.sweeps += 1;

            match self.register.release(&dir) {
                Ok(true) => debug!(dir = %dir, "Changes arrived during sweep, sweeping again"),
                Ok(false) => {}
                Err(error) => warn!(dir = %dir, error = %error, "Could not re-queue directory"),
            }

            match emitted {
                Ok(count) => stats.files_found += count,
                Err(error) => {
                    error!(error = %error, "Processing queue closed, stopping scan worker");
                    break;
                }
            }
        }

        stats.abandoned = self.register.len();
        if stats.abandoned > 0 {
            info!(
                abandoned = stats.abandoned,
                "Scan worker stopped with directories still pending"
            );
        }
        debug!(sweeps = stats.sweeps, files = stats.files_found, "Scan worker stopped");
        stats
    }

    async fn sweep(&self, dir: &Utf8Path) -> Result<usize, WatchError> {
        let sweeper = self.sweeper;
        let target = dir.to_owned();
        let files = match tokio::task::spawn_blocking(move || sweeper.sweep(&target)).await {
            Ok(files) => files,
            Err(join_error) => {
                error!(dir = %dir, error = %join_error, "Directory walk failed");
                Vec::new()
            }
        };

        info!(dir = %dir, files = files.len(), "Swept directory");
        let count = files.len();
        for path in files {
            info!(path = %path, "Found file");
            self.work_tx
                .send(WorkItem::discovered(path))
                .map_err(|_| WatchError::ChannelClosed)?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::FsEventKind;
    use crate::processor::{WorkQueue, work_queue};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    const SETTLE: Duration = Duration::from_secs(5);

    fn cut_list_dir(temp: &TempDir, files: &[&str]) -> Utf8PathBuf {
        let root = Utf8Path::from_path(temp.path()).expect("Invalid path");
        let dir = root.join("c1/briefing/Listas de Corte e Etiquetas");
        fs::create_dir_all(&dir).expect("mkdir");
        for name in files {
            fs::write(dir.join(name), b"x").expect("write");
        }
        dir
    }

    fn discovered_path(item: WorkItem) -> Utf8PathBuf {
        match item {
            WorkItem::Process(FsEventKind::Created, event) => event.path,
            other => panic!("unexpected item {other:?}"),
        }
    }

    fn start(
        register: &Arc<DebounceRegister>,
        queue: ScanQueue,
    ) -> (JoinHandle<ScanStats>, WorkQueue, CancellationToken) {
        let (work_tx, work_rx) = work_queue();
        let cancel = CancellationToken::new();
        let handle = ScanWorker::new(Arc::clone(register), work_tx).spawn(queue, cancel.clone());
        (handle, work_rx, cancel)
    }

    #[test]
    fn test_sweeper_is_recursive_and_sorted() {
        let temp = TempDir::new().expect("tempdir");
        let dir = cut_list_dir(&temp, &["b.xlsx", "a.xlsx", ".hidden.xlsx"]);
        fs::create_dir_all(dir.join("old")).expect("mkdir");
        fs::write(dir.join("old/c.xlsx"), b"x").expect("write");

        let names: Vec<_> = DirectorySweeper::new()
            .sweep(&dir)
            .iter()
            .map(|p| p.strip_prefix(&dir).expect("prefix").to_string())
            .collect();
        assert_eq!(names, vec![".hidden.xlsx", "a.xlsx", "b.xlsx", "old/c.xlsx"]);
    }

    #[test]
    fn test_sweeper_missing_directory_is_empty() {
        let files = DirectorySweeper::new().sweep(Utf8Path::new("/nonexistent/tw/sweep"));
        assert!(files.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_fires_after_settle_window() {
        let temp = TempDir::new().expect("tempdir");
        let dir = cut_list_dir(&temp, &["A.xlsx"]);
        let (register, queue) = DebounceRegister::new(SETTLE);
        let register = Arc::new(register);

        let t0 = Instant::now();
        register.register(&dir).expect("register");
        let (handle, mut work_rx, cancel) = start(&register, queue);

        let item = tokio::time::timeout(Duration::from_secs(30), work_rx.recv())
            .await
            .expect("no item before timeout")
            .expect("queue closed");
        let elapsed = t0.elapsed();
        assert!(elapsed >= SETTLE, "swept too early: {elapsed:?}");
        assert!(elapsed < SETTLE + Duration::from_secs(1), "swept too late: {elapsed:?}");
        assert_eq!(discovered_path(item), dir.join("A.xlsx"));

        cancel.cancel();
        let stats = handle.await.expect("worker panicked");
        assert_eq!(stats.sweeps, 1);
        assert_eq!(stats.files_found, 1);
        assert_eq!(stats.abandoned, 0);
        assert!(register.is_empty());
        assert!(work_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_registration_does_not_reset_window() {
        let temp = TempDir::new().expect("tempdir");
        let dir = cut_list_dir(&temp, &["A.xlsx"]);
        let (register, queue) = DebounceRegister::new(SETTLE);
        let register = Arc::new(register);

        let t0 = Instant::now();
        register.register(&dir).expect("register");
        let (handle, mut work_rx, cancel) = start(&register, queue);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            register.register(&dir).expect("register"),
            crate::debounce::Registration::AlreadyPending
        );

        let _item = work_rx.recv().await.expect("queue closed");
        let elapsed = t0.elapsed();
        assert!(elapsed < SETTLE + Duration::from_secs(1), "window was reset: {elapsed:?}");

        cancel.cancel();
        handle.await.expect("worker panicked");
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_produces_single_sweep() {
        let temp = TempDir::new().expect("tempdir");
        let dir = cut_list_dir(&temp, &["A.xlsx", "B.xlsx"]);
        let (register, queue) = DebounceRegister::new(SETTLE);
        let register = Arc::new(register);
        let (handle, mut work_rx, cancel) = start(&register, queue);

        for _ in 0..20 {
            register.register(&dir).expect("register");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let first = discovered_path(work_rx.recv().await.expect("queue closed"));
        let second = discovered_path(work_rx.recv().await.expect("queue closed"));
        assert_eq!(first, dir.join("A.xlsx"));
        assert_eq!(second, dir.join("B.xlsx"));

        // Well past another window: nothing else arrives.
        tokio::time::sleep(SETTLE * 3).await;
        assert!(work_rx.try_recv().is_err());

        cancel.cancel();
        let stats = handle.await.expect("worker panicked");
        assert_eq!(stats.sweeps, 1);
        assert_eq!(stats.files_found, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vanished_directory_is_an_empty_sweep() {
        let temp = TempDir::new().expect("tempdir");
        let dir = cut_list_dir(&temp, &["A.xlsx"]);
        let (register, queue) = DebounceRegister::new(SETTLE);
        let register = Arc::new(register);

        register.register(&dir).expect("register");
        fs::remove_dir_all(&dir).expect("rm");
        let (handle, mut work_rx, cancel) = start(&register, queue);

        tokio::time::sleep(SETTLE * 2).await;
        assert!(work_rx.try_recv().is_err());
        assert!(register.is_empty());

        cancel.cancel();
        let stats = handle.await.expect("worker panicked");
        assert_eq!(stats.sweeps, 1);
        assert_eq!(stats.files_found, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_during_walk_still_emits_files() {
        let temp = TempDir::new().expect("tempdir");
        let names: Vec<String> = (0..200).map(|n| format!("{n:03}.xlsx")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let dir = cut_list_dir(&temp, &refs);
        let (register, queue) = DebounceRegister::new(Duration::from_millis(1));
        let register = Arc::new(register);

        register.register(&dir).expect("register");
        let (handle, mut work_rx, cancel) = start(&register, queue);

        // Cancel as soon as the walk has begun (or, on a fast machine, has
        // already finished).
        while !register.is_sweeping(&dir) && register.is_registered(&dir) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        cancel.cancel();
        let stats = handle.await.expect("worker panicked");

        assert_eq!(stats.sweeps, 1);
        assert_eq!(stats.files_found, names.len());
        assert_eq!(stats.abandoned, 0);
        let mut emitted = Vec::new();
        while let Ok(item) = work_rx.try_recv() {
            emitted.push(discovered_path(item));
        }
        let expected: Vec<_> = names.iter().map(|n| dir.join(n)).collect();
        assert_eq!(emitted, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_abandons_settle_wait() {
        let temp = TempDir::new().expect("tempdir");
        let dir = cut_list_dir(&temp, &["A.xlsx"]);
        let (register, queue) = DebounceRegister::new(SETTLE);
        let register = Arc::new(register);

        register.register(&dir).expect("register");
        let (handle, mut work_rx, cancel) = start(&register, queue);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let before = Instant::now();
        cancel.cancel();
        let stats = handle.await.expect("worker panicked");

        assert!(before.elapsed() < SETTLE);
        assert_eq!(stats.sweeps, 0);
        assert_eq!(stats.abandoned, 1);
        assert!(work_rx.try_recv().is_err());
    }
}
