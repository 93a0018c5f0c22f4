//! CLI entry point for the cut-list tag watcher.
//!
//! Watches a tree of job folders and, once a cut-list directory has been
//! quiet for the settle window, hands every spreadsheet in it to the
//! processing stage.
//!
//! # Usage
//!
//! ```bash
//! tag-watcher [OPTIONS] [COMMAND]
//!
//! # Watch until Ctrl-C (the default command)
//! tag-watcher --watching-dir /media/jobs run
//!
//! # Check which paths would be picked up
//! tag-watcher classify "/media/jobs/obra-01/briefing/Listas de Corte e Etiquetas/A.xlsx"
//!
//! # Process one directory now, without waiting for changes
//! tag-watcher sweep "/media/jobs/obra-01/briefing/Listas de Corte e Etiquetas"
//! ```
//!
//! Every option can also be given as a `TAG_WATCHER_*` environment
//! variable, including from a `.env` file in the working directory.

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{WrapErr, eyre};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use tw_core::{Config, ConfigError, LogConfig};
use tw_watcher::{
    CommandHandler, CompanionProcessor, DirectorySweeper, DocumentHandler, LoggingHandler,
    PathClassifier, Pipeline, ProcessingWorker, WorkItem, work_queue,
};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Watches cut-list folders and processes their spreadsheets once they
/// settle.
#[derive(Parser, Debug)]
#[command(name = "tag-watcher", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute. Defaults to `run`.
    #[command(subcommand)]
    command: Option<Commands>,

    /// JSON configuration file. Options given here or in the environment
    /// override it.
    #[arg(short, long, global = true, env = "TAG_WATCHER_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Root directory watched recursively.
    #[arg(short, long, global = true, env = "TAG_WATCHER_WATCHING_DIR")]
    watching_dir: Option<Utf8PathBuf>,

    /// Settle window in seconds, measured from the first change.
    #[arg(long, global = true, env = "TAG_WATCHER_DELAY_FOR_SCAN")]
    delay_for_scan: Option<u64>,

    /// Main loop heartbeat in seconds.
    #[arg(long, global = true, env = "TAG_WATCHER_SLEEP_DURATION")]
    sleep_duration: Option<u64>,

    /// Worker thread count (reserved; one processing worker runs).
    #[arg(long, global = true, env = "TAG_WATCHER_NUM_WORKER_THREADS")]
    num_worker_threads: Option<usize>,

    /// Name of the directory holding cut-list spreadsheets.
    #[arg(long, global = true, env = "TAG_WATCHER_CUT_LIST_DIR")]
    cut_list_dir: Option<String>,

    /// Name of the directory that must contain the cut-list directory.
    #[arg(long, global = true, env = "TAG_WATCHER_BRIEFING_DIR")]
    briefing_dir: Option<String>,

    /// Filename glob, matched case-insensitively.
    #[arg(long, global = true, env = "TAG_WATCHER_PATTERN")]
    pattern: Option<String>,

    /// Also process accepted events right away, before the sweep.
    #[arg(long, global = true, env = "TAG_WATCHER_FORWARD_IMMEDIATELY")]
    forward_immediately: Option<bool>,

    /// Mapping spreadsheet handed to the processing command.
    #[arg(long, global = true, env = "TAG_WATCHER_MAPPING_FILE")]
    mapping_file: Option<Utf8PathBuf>,

    /// Suffix of the companion document name (`<stem><suffix>.pdf`).
    #[arg(long, global = true, env = "TAG_WATCHER_COMPANION_SUFFIX")]
    companion_suffix: Option<String>,

    /// Program run for each ready spreadsheet. Receives the document,
    /// spreadsheet and mapping paths as its last arguments.
    #[arg(long, global = true, env = "TAG_WATCHER_EXEC")]
    exec: Option<String>,

    /// Directory for the rotating log files.
    #[arg(long, global = true, env = "TAG_WATCHER_LOG_DIR")]
    log_dir: Option<Utf8PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Commands {
    /// Watch the root until interrupted.
    Run,

    /// Print whether each path would be picked up.
    Classify {
        /// Paths to classify.
        #[arg(required = true)]
        paths: Vec<Utf8PathBuf>,
    },

    /// Sweep one directory now and process every file found.
    Sweep {
        /// Directory to sweep.
        dir: Utf8PathBuf,
    },
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Loads variables from `.env` in the working directory, if there is one.
fn load_dotenv() -> color_eyre::Result<()> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(error) if error.not_found() => Ok(()),
        Err(error) => Err(error).wrap_err("Failed to load .env file"),
    }
}

/// Initializes console and rolling-file logging.
///
/// Respects `RUST_LOG` if set. Otherwise uses `debug` with `--verbose` or
/// `info` by default, with `notify` held at `warn`.
///
/// The returned guard flushes the file writer when dropped and must live
/// until the process exits.
fn init_tracing(log: &LogConfig, verbose: bool, no_color: bool) -> color_eyre::Result<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},notify=warn"))
    });

    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    std::fs::create_dir_all(&log.dir)
        .wrap_err_with(|| format!("Failed to create log directory {}", log.dir))?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&log.file_prefix)
        .filename_suffix("log")
        .max_log_files(log.max_files)
        .build(&log.dir)
        .wrap_err("Failed to open log file")?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi))
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .with(filter)
        .try_init()
        .map_err(|e| eyre!("Failed to initialize tracing: {e}"))?;

    Ok(guard)
}

/// Builds a [`Config`] from the optional JSON file and the CLI overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be loaded or the result is invalid.
fn build_config(cli: &Cli) -> color_eyre::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_json_file(path)
            .wrap_err_with(|| format!("Failed to load configuration from {path}"))?,
        None => Config::default(),
    };

    if let Some(root) = &cli.watching_dir {
        config.watch.root.clone_from(root);
    }
    if let Some(pattern) = &cli.pattern {
        config.watch.pattern.clone_from(pattern);
    }
    if let Some(forward) = cli.forward_immediately {
        config.watch.forward_immediately = forward;
    }
    if let Some(secs) = cli.delay_for_scan {
        config.debounce.settle_ms = secs.saturating_mul(1000);
    }
    if let Some(secs) = cli.sleep_duration {
        config.debounce.heartbeat_ms = secs.saturating_mul(1000);
    }
    if let Some(threads) = cli.num_worker_threads {
        config.debounce.worker_threads = threads;
    }
    if let Some(name) = &cli.cut_list_dir {
        config.layout.cut_list_dir.clone_from(name);
    }
    if let Some(name) = &cli.briefing_dir {
        config.layout.briefing_dir.clone_from(name);
    }
    if let Some(mapping) = &cli.mapping_file {
        config.processing.mapping_file.clone_from(mapping);
    }
    if let Some(suffix) = &cli.companion_suffix {
        config.processing.companion_suffix.clone_from(suffix);
    }
    if let Some(exec) = &cli.exec {
        config.processing.command = Some(exec.clone());
    }
    if let Some(dir) = &cli.log_dir {
        config.log.dir.clone_from(dir);
    }

    config.validate()?;
    Ok(config)
}

/// Checks that the watched root is set and is a directory.
fn validate_root(root: &Utf8Path) -> Result<(), ConfigError> {
    if root.as_str().is_empty() {
        return Err(ConfigError::InvalidPath {
            path: root.to_owned(),
            reason: "no directory given; pass --watching-dir or set TAG_WATCHER_WATCHING_DIR"
                .to_owned(),
        });
    }
    if !root.exists() {
        return Err(ConfigError::MissingDirectory(root.to_owned()));
    }
    if !root.is_dir() {
        return Err(ConfigError::InvalidPath {
            path: root.to_owned(),
            reason: "not a directory".to_owned(),
        });
    }
    Ok(())
}

/// Creates the processor configured for `config`.
fn create_processor(config: &Config) -> CompanionProcessor<Box<dyn DocumentHandler>> {
    let handler: Box<dyn DocumentHandler> =
        match config.processing.command.as_deref().and_then(CommandHandler::parse) {
            Some(command) => {
                info!(program = command.program(), "Jobs are passed to an external command");
                Box::new(command)
            }
            None => Box::new(LoggingHandler),
        };
    CompanionProcessor::new(&config.layout, &config.processing, handler)
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Watches until Ctrl-C (or SIGTERM on Unix), then shuts down in order.
async fn run_watch(config: &Config) -> color_eyre::Result<()> {
    validate_root(&config.watch.root)?;

    let pipeline = Pipeline::start(config, create_processor(config))?;
    let report = pipeline.run_until(shutdown_signal()).await?;

    info!(
        report = %serde_json::to_string(&report)?,
        "Tag watcher stopped"
    );
    Ok(())
}

/// Completes on the first interrupt or termination signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(error = %error, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    () = ctrl_c => {}
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(error) => {
                warn!(error = %error, "Cannot listen for SIGTERM");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}

/// Prints the classifier verdict for each path.
fn run_classify(config: &Config, paths: &[Utf8PathBuf]) -> color_eyre::Result<()> {
    let classifier = PathClassifier::new(&config.layout);

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    for path in paths {
        let canonical = classifier.canonicalize(path);
        let verdict = if classifier.is_valid(&canonical) {
            "accepted"
        } else {
            "rejected"
        };
        writeln!(handle, "{verdict}\t{canonical}")?;
    }
    Ok(())
}

/// Sweeps `dir` once and processes every file found, in order.
async fn run_sweep(config: &Config, dir: &Utf8Path) -> color_eyre::Result<()> {
    validate_root(dir)?;
    let dir = dir.canonicalize_utf8()?;

    let target = dir.clone();
    let files = tokio::task::spawn_blocking(move || DirectorySweeper::new().sweep(&target)).await?;
    info!(dir = %dir, files = files.len(), "Swept directory");

    let (work_tx, work_rx) = work_queue();
    for path in files {
        work_tx
            .send(WorkItem::discovered(path))
            .map_err(|_| eyre!("Processing queue closed"))?;
    }
    work_tx
        .send(WorkItem::Shutdown)
        .map_err(|_| eyre!("Processing queue closed"))?;

    let stats = ProcessingWorker::new(create_processor(config)).run(work_rx).await;

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", serde_json::to_string_pretty(&stats)?)?;
    if stats.failed > 0 {
        return Err(eyre!(
            "{} of {} files failed",
            stats.failed,
            stats.processed + stats.failed
        ));
    }
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Environment from .env, then CLI arguments
    load_dotenv()?;
    let cli = Cli::parse();

    // 3. Configuration, then logging (the log directory is configurable)
    let config = build_config(&cli)?;
    let _guard = init_tracing(&config.log, cli.verbose, cli.no_color)?;

    // 4. Route to the command
    match cli.command.clone().unwrap_or(Commands::Run) {
        Commands::Run => run_watch(&config).await,
        Commands::Classify { paths } => run_classify(&config, &paths),
        Commands::Sweep { dir } => run_sweep(&config, &dir).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tag-watcher").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    #[test]
    fn test_defaults_to_run() {
        let cli = parse(&["--watching-dir", "/media/jobs"]);
        assert_eq!(cli.command, None);
        assert_eq!(cli.watching_dir.as_deref(), Some(Utf8Path::new("/media/jobs")));
    }

    #[test]
    fn test_overrides_apply_on_defaults() {
        let cli = parse(&[
            "--delay-for-scan",
            "2",
            "--sleep-duration",
            "3",
            "--cut-list-dir",
            "cuts",
            "--pattern",
            "*.xlsm",
            "--forward-immediately",
            "true",
            "--exec",
            "label-tool --dpi 500",
            "run",
        ]);
        let config = build_config(&cli).expect("valid config");

        assert_eq!(cli.command, Some(Commands::Run));
        assert_eq!(config.debounce.settle_ms, 2_000);
        assert_eq!(config.debounce.heartbeat_ms, 3_000);
        assert_eq!(config.layout.cut_list_dir, "cuts");
        assert_eq!(config.layout.briefing_dir, "briefing");
        assert_eq!(config.watch.pattern, "*.xlsm");
        assert!(config.watch.forward_immediately);
        assert_eq!(config.processing.command.as_deref(), Some("label-tool --dpi 500"));
    }

    #[test]
    fn test_file_then_flags() {
        let temp = tempfile::tempdir().expect("Failed to create temp directory");
        let path = Utf8PathBuf::from_path_buf(temp.path().join("config.json")).expect("utf8");
        std::fs::write(
            &path,
            r#"{ "debounce": { "settle_ms": 750 }, "layout": { "briefing_dir": "brief" } }"#,
        )
        .expect("write");

        let cli = parse(&["--config", path.as_str(), "--briefing-dir", "override"]);
        let config = build_config(&cli).expect("valid config");

        assert_eq!(config.debounce.settle_ms, 750);
        assert_eq!(config.layout.briefing_dir, "override");
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = parse(&["--delay-for-scan", "0"]);
        assert!(build_config(&cli).is_err());
    }

    #[test]
    fn test_classify_requires_paths() {
        assert!(Cli::try_parse_from(["tag-watcher", "classify"]).is_err());
        let cli = parse(&["classify", "a.xlsx", "b.xlsx"]);
        assert_eq!(
            cli.command,
            Some(Commands::Classify {
                paths: vec!["a.xlsx".into(), "b.xlsx".into()]
            })
        );
    }

    #[test]
    fn test_validate_root() {
        assert!(matches!(
            validate_root(Utf8Path::new("")),
            Err(ConfigError::InvalidPath { .. })
        ));
        match validate_root(Utf8Path::new("/nonexistent/jobs")) {
            Err(ConfigError::MissingDirectory(path)) => assert_eq!(path, "/nonexistent/jobs"),
            other => panic!("Expected MissingDirectory, got {other:?}"),
        }

        let temp = tempfile::tempdir().expect("Failed to create temp directory");
        let root = Utf8Path::from_path(temp.path()).expect("utf8");
        assert!(validate_root(root).is_ok());

        let file = root.join("jobs.txt");
        std::fs::write(&file, "x").expect("write");
        assert!(matches!(
            validate_root(&file),
            Err(ConfigError::InvalidPath { reason, .. }) if reason == "not a directory"
        ));
    }
}
