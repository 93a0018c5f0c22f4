//! Companion-document lookup for cut-list spreadsheets.
//!
//! Every cut-list spreadsheet `<stem>.xlsx` is expected to have a label
//! document `<stem><suffix>.pdf` next to it. [`CompanionProcessor`] locates
//! that document and hands the pair, together with the mapping
//! spreadsheet, to a [`DocumentHandler`].

use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{error, info};

use tw_core::{LayoutConfig, ProcessingConfig};

use crate::error::ProcessError;
use crate::events::{FileSystemEvent, FsEventKind};
use crate::processor::Processor;

/// A spreadsheet paired with its companion document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionJob {
    /// The cut-list spreadsheet, canonicalized.
    pub spreadsheet: Utf8PathBuf,
    /// The label document next to it.
    pub document: Utf8PathBuf,
    /// The mapping spreadsheet.
    pub mapping: Utf8PathBuf,
}

/// Downstream consumer of [`CompanionJob`]s.
pub trait DocumentHandler: Send + Sync + 'static {
    /// Handles one job. Errors are reported by the processing worker.
    fn handle(&self, job: &CompanionJob) -> anyhow::Result<()>;
}

impl<H: DocumentHandler + ?Sized> DocumentHandler for Box<H> {
    fn handle(&self, job: &CompanionJob) -> anyhow::Result<()> {
        (**self).handle(job)
    }
}

/// Records each job in the log and does nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl DocumentHandler for LoggingHandler {
    fn handle(&self, job: &CompanionJob) -> anyhow::Result<()> {
        info!(
            spreadsheet = %job.spreadsheet,
            document = %job.document,
            mapping = %job.mapping,
            "Companion document ready"
        );
        Ok(())
    }
}

/// Runs an external program for each job.
///
/// The program receives the document, spreadsheet and mapping paths as its
/// last three arguments, after any arguments given in the command line.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    program: String,
    args: Vec<String>,
}

impl CommandHandler {
    /// Splits `command_line` on whitespace into a program and its leading
    /// arguments. Returns `None` for a blank command line.
    #[must_use]
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut words = command_line.split_whitespace().map(str::to_owned);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }

    /// Returns the program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl DocumentHandler for CommandHandler {
    fn handle(&self, job: &CompanionJob) -> anyhow::Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&job.document)
            .arg(&job.spreadsheet)
            .arg(&job.mapping)
            .status()
            .map_err(|source| ProcessError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(ProcessError::CommandFailed {
                program: self.program.clone(),
                status,
            }
            .into());
        }
        info!(program = %self.program, document = %job.document, "Command finished");
        Ok(())
    }
}

/// A [`Processor`] that pairs each spreadsheet with its companion document.
#[derive(Debug)]
pub struct CompanionProcessor<H> {
    cut_list_dir: String,
    processing: ProcessingConfig,
    handler: H,
}

impl<H: DocumentHandler> CompanionProcessor<H> {
    /// Creates a processor for the given layout and naming rules.
    #[must_use]
    pub fn new(layout: &LayoutConfig, processing: &ProcessingConfig, handler: H) -> Self {
        Self {
            cut_list_dir: layout.cut_list_dir.clone(),
            processing: processing.clone(),
            handler,
        }
    }

    /// Returns the expected companion document for `spreadsheet`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NoStem`] if the path has no file stem.
    pub fn companion_path(&self, spreadsheet: &Utf8Path) -> Result<Utf8PathBuf, ProcessError> {
        let stem = spreadsheet
            .file_stem()
            .ok_or_else(|| ProcessError::NoStem(spreadsheet.to_owned()))?;
        Ok(spreadsheet.with_file_name(self.processing.companion_file_name(stem)))
    }

    /// Returns `true` if `path` is not a directory and has the cut-list
    /// directory among its ancestors.
    pub fn verify(&self, path: &Utf8Path) -> bool {
        if path.is_dir() {
            return false;
        }
        path.ancestors()
            .skip(1)
            .any(|dir| dir.file_name() == Some(self.cut_list_dir.as_str()))
    }

    /// Builds the job for `spreadsheet` without running the handler.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::MissingCompanion`] if the companion document
    /// does not exist.
    pub fn job_for(&self, spreadsheet: &Utf8Path) -> Result<CompanionJob, ProcessError> {
        let spreadsheet = spreadsheet
            .canonicalize_utf8()
            .unwrap_or_else(|_| spreadsheet.to_owned());
        if !self.verify(&spreadsheet) {
            error!(path = %spreadsheet, "Spreadsheet is not inside a cut-list directory");
        }

        let document = self.companion_path(&spreadsheet)?;
        if !document.is_file() {
            return Err(ProcessError::MissingCompanion(document));
        }

        Ok(CompanionJob {
            spreadsheet,
            document,
            mapping: self.processing.mapping_file.clone(),
        })
    }
}

impl<H: DocumentHandler> Processor for CompanionProcessor<H> {
    fn process(&self, _kind: FsEventKind, event: &FileSystemEvent) -> anyhow::Result<()> {
        let job = self.job_for(event.target_path())?;
        self.handler.handle(&job)
    }
}
