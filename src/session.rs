//! Import session: version check, resume and the run itself
//!
//! ```text
//!            inspect()
//!   ┌───────────┼──────────────────┐
//!   ▼           ▼                  ▼
//! Fresh   VersionMismatch      Resumable
//!   │           │ StartFresh       │ Resume: skip processed files
//!   │           │ (Abort → error)  │ StartFresh: wipe
//!   └───────────┴───────┬──────────┘
//!                       ▼ prepare()
//!                    Running ── run() ──► Done | Aborted
//! ```

use crate::catalog::scan::total_bytes;
use crate::catalog::{CatalogFile, UNKNOWN};
use crate::db::{keys, Destination};
use crate::error::{IngestError, Result};
use crate::pipeline::{execute, PipelineOptions, ProgressTracker, Strategy};
use crate::progress::ProgressSink;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(TOSEC-v\d{4}-\d{2}-\d{2})").expect("Invalid version regex"));

/// Dataset version tag found anywhere in `path`, else `"Unknown"`
pub fn extract_dataset_version(path: &Path) -> String {
    let text = path.to_string_lossy();
    VERSION_RE
        .captures(&text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Lifecycle of an import session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing to resume; the destination will be wiped
    Fresh,
    /// The destination holds another dataset version
    VersionMismatch,
    /// Same version and some files already committed
    Resumable,
    Running,
    Done,
    Aborted,
}

/// Caller's answer to a mismatch or resume question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDecision {
    /// Skip files already committed
    Resume,
    /// Wipe the destination and import everything
    StartFresh,
    /// Leave the destination untouched
    Abort,
}

/// Totals of a finished (or stopped) run
#[derive(Debug, Clone)]
pub struct ImportTotals {
    /// Files handled this run (imported, skipped or failed)
    pub files: u64,
    pub records: u64,
    pub errors: u64,
    pub skipped: u64,
    /// Bytes of catalog files handled this run
    pub bytes: u64,
    pub duration: Duration,
    /// Rows in the destination after the run
    pub total_roms: u64,
    /// Stopped by a cancellation request
    pub interrupted: bool,
}

/// One import of a scanned catalog into a destination
pub struct ImportSession<'a> {
    db: &'a mut dyn Destination,
    state: SessionState,
    input_version: String,
    stored_version: Option<String>,
    processed: HashSet<String>,
    total_bytes: u64,
    done_bytes: u64,
}

impl<'a> ImportSession<'a> {
    /// Open a session against `db` for the catalog rooted at `input`
    pub fn inspect(db: &'a mut dyn Destination, input: &Path) -> Result<Self> {
        db.create_schema_if_missing()?;
        let input_version = extract_dataset_version(input);
        let stored_version = db.get_metadata(keys::TOSEC_VERSION)?;
        let processed = db.processed_file_names()?;

        let state = match &stored_version {
            Some(stored) if *stored != input_version => SessionState::VersionMismatch,
            _ if !processed.is_empty() => SessionState::Resumable,
            _ => SessionState::Fresh,
        };
        info!(
            input_version = %input_version,
            stored_version = stored_version.as_deref().unwrap_or("-"),
            processed = processed.len(),
            state = ?state,
            "Session inspected"
        );

        Ok(Self {
            db,
            state,
            input_version,
            stored_version,
            processed,
            total_bytes: 0,
            done_bytes: 0,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn input_version(&self) -> &str {
        &self.input_version
    }

    pub fn stored_version(&self) -> Option<&str> {
        self.stored_version.as_deref()
    }

    /// Number of files already committed by earlier runs
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// Apply the caller's decision and return the files still to import
    pub fn prepare(&mut self, files: Vec<CatalogFile>, decision: ResumeDecision) -> Result<Vec<CatalogFile>> {
        // An empty scan never touches the database
        if files.is_empty() {
            self.state = SessionState::Aborted;
            return Err(IngestError::NoCatalogFiles);
        }
        self.total_bytes = total_bytes(&files);

        let resume = match (self.state, decision) {
            (SessionState::VersionMismatch, ResumeDecision::StartFresh) => false,
            (SessionState::VersionMismatch, _) => {
                self.state = SessionState::Aborted;
                return Err(IngestError::VersionMismatch {
                    database: self.stored_version.clone().unwrap_or_default(),
                    input: self.input_version.clone(),
                });
            }
            (SessionState::Resumable, ResumeDecision::Resume) => true,
            (SessionState::Resumable, ResumeDecision::StartFresh) => false,
            (SessionState::Resumable, ResumeDecision::Abort) => {
                self.state = SessionState::Aborted;
                return Err(IngestError::Interrupted);
            }
            (SessionState::Fresh, _) => false,
            (state, _) => {
                return Err(IngestError::Session(format!(
                    "cannot prepare a session in state {state:?}"
                )))
            }
        };

        let files = if resume {
            let (done, todo): (Vec<_>, Vec<_>) = files
                .into_iter()
                .partition(|f| self.processed.contains(&f.file_name));
            self.done_bytes = total_bytes(&done);
            info!(
                skipped = done.len(),
                remaining = todo.len(),
                "Resuming previous import"
            );
            todo
        } else {
            self.db.wipe_all()?;
            self.db.create_schema_if_missing()?;
            self.db.set_metadata(keys::TOSEC_VERSION, &self.input_version)?;
            self.processed.clear();
            self.done_bytes = 0;
            info!(version = %self.input_version, files = files.len(), "Starting fresh import");
            files
        };

        self.state = SessionState::Running;
        Ok(files)
    }

    /// Bytes already covered by earlier runs, for the progress start point
    pub fn resumed_bytes(&self) -> u64 {
        self.done_bytes
    }

    /// Bytes of every scanned file, including resumed ones
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Run `strategy` over the prepared files
    pub fn run(
        &mut self,
        strategy: Strategy,
        files: &[CatalogFile],
        options: &PipelineOptions,
        sink: &dyn ProgressSink,
        cancel: &AtomicBool,
    ) -> Result<ImportTotals> {
        if self.state != SessionState::Running {
            return Err(IngestError::Session(
                "session must be prepared before running".into(),
            ));
        }

        self.db.set_metadata(keys::STATUS, "running")?;
        self.db.set_metadata(keys::STRATEGY, strategy.as_str())?;
        self.db
            .set_metadata(keys::LAST_RUN_AT, &chrono::Utc::now().to_rfc3339())?;

        let start = Instant::now();
        let mut progress = ProgressTracker::new(sink, self.done_bytes, self.total_bytes);
        let outcome = execute(strategy, files, &mut *self.db, options, &mut progress, cancel);
        sink.finish();

        if let Some(fatal) = outcome.fatal {
            self.state = SessionState::Aborted;
            error!(error = %fatal, "Import aborted");
            if let Err(e) = self.db.set_metadata(keys::STATUS, "aborted") {
                warn!(error = %e, "Failed to record aborted status");
            }
            return Err(fatal);
        }

        let total_roms = if outcome.interrupted {
            self.state = SessionState::Aborted;
            self.db.set_metadata(keys::STATUS, "aborted")?;
            warn!("Import interrupted; rerun to resume");
            0
        } else {
            let total = self.db.finalize()?;
            self.db.set_metadata(keys::STATUS, "completed")?;
            self.state = SessionState::Done;
            total
        };

        let handled = outcome.files_imported + outcome.errors + outcome.skipped;
        let totals = ImportTotals {
            files: handled,
            records: outcome.records,
            errors: outcome.errors,
            skipped: outcome.skipped,
            bytes: progress.current().saturating_sub(self.done_bytes),
            duration: start.elapsed(),
            total_roms,
            interrupted: outcome.interrupted,
        };
        info!(
            files = totals.files,
            records = totals.records,
            errors = totals.errors,
            skipped = totals.skipped,
            "Import finished"
        );
        Ok(totals)
    }
}
