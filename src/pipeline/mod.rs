//! Import pipeline: scheduling and the three execution strategies
//!
//! # Architecture
//!
//! ```text
//!                       files (resume-filtered)
//!                               │
//!              ┌────────────────┼──────────────────────┐
//!              ▼                ▼                      ▼
//!   ┌────────────────┐  ┌────────────────┐   ┌──────────────────┐
//!   │   In-Memory    │  │     Staged     │   │      Direct      │
//!   │ pool: parse to │  │ pool: parse to │   │ serial: stream   │
//!   │ Vec<RomRecord> │  │ parquet chunks │   │ into Arrow batch │
//!   └───────┬────────┘  └───────┬────────┘   └────────┬─────────┘
//!           │ RecordBuffer      │ bulk load           │ per-file tx
//!           ▼                   ▼                     ▼
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │                 Destination (roms + checkpoint)              │
//!   └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Workers never touch the destination. The coordinator (the calling
//! thread) is the sole owner of buffers, totals and the checkpoint set.

pub mod buffer;
pub mod direct;
pub mod in_memory;
pub mod scheduler;
pub mod staged;

pub use buffer::RecordBuffer;
pub use scheduler::{effective_workers, Scheduler, SchedulerReport};

use crate::catalog::{CatalogFile, RomRecord};
use crate::db::Destination;
use crate::error::{FileOutcome, IngestError, ParseError, ParseResult};
use crate::parser::open_records;
use crate::progress::ProgressSink;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, warn};

/// Records between cancellation checks while parsing
const CANCEL_CHECK_INTERVAL: usize = 1024;

/// Execution strategy, fixed for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Parse whole files in workers, batch inserts from an in-memory buffer
    InMemory,
    /// Stage Parquet chunks on disk, then bulk load once
    Staged,
    /// Stream each file into Arrow batches inserted in one transaction
    Direct,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::InMemory => "in-memory",
            Strategy::Staged => "staged",
            Strategy::Direct => "direct",
        }
    }

    /// Whether the strategy runs parse tasks on the worker pool
    pub fn uses_pool(&self) -> bool {
        !matches!(self, Strategy::Direct)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables shared by the strategies
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Requested worker count (0 = one per CPU)
    pub workers: usize,

    /// Records per In-Memory flush
    pub batch_size: usize,

    /// Records per staging chunk
    pub chunk_rows: usize,

    /// Rows per Direct-mode Arrow batch
    pub direct_buffer_rows: usize,

    /// Staging directory for the Staged strategy
    pub temp_dir: PathBuf,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            batch_size: 1000,
            chunk_rows: 500_000,
            direct_buffer_rows: 50_000,
            temp_dir: PathBuf::from("temp_chunks"),
        }
    }
}

/// Totals of one strategy run
#[derive(Debug, Default)]
pub struct StrategyOutcome {
    /// Records extracted and handed to the destination path
    pub records: u64,

    /// Files that failed with a recoverable error
    pub errors: u64,

    /// Files of unknown format
    pub skipped: u64,

    /// Files whose records were extracted without error
    pub files_imported: u64,

    /// The error that ended the run early, if any
    pub fatal: Option<IngestError>,

    /// The run stopped because of a cancellation request
    pub interrupted: bool,
}

impl StrategyOutcome {
    /// Count a per-file outcome and log it
    pub fn tally(&mut self, outcome: FileOutcome) {
        match &outcome {
            FileOutcome::Imported { file, records } => {
                self.files_imported += 1;
                self.records += records;
                debug!(file = %file, records, "File imported");
            }
            FileOutcome::Skipped { file, reason } => {
                self.skipped += 1;
                warn!(file = %file, reason = %reason, "Skipping file");
            }
            FileOutcome::Failed { file, error } => {
                self.errors += 1;
                error!(file = %file, error = %error, "Failed to import file");
            }
        }
    }

    /// Handle a per-file error: recoverable errors are tallied, fatal
    /// errors are returned.
    pub fn tally_error(&mut self, file: &CatalogFile, err: IngestError) -> Result<(), IngestError> {
        if err.is_fatal() {
            return Err(err);
        }
        if matches!(err, IngestError::Parse(ParseError::Cancelled(_))) {
            return Ok(());
        }
        self.tally(FileOutcome::Failed {
            file: file.file_name.clone(),
            error: err.to_string(),
        });
        Ok(())
    }
}

/// Advances a progress sink by catalog file bytes
pub struct ProgressTracker<'a> {
    sink: &'a dyn ProgressSink,
    current: u64,
    total: u64,
}

impl<'a> ProgressTracker<'a> {
    /// Start at `initial` of `total` bytes
    pub fn new(sink: &'a dyn ProgressSink, initial: u64, total: u64) -> Self {
        sink.update(initial, total);
        Self {
            sink,
            current: initial,
            total,
        }
    }

    pub fn advance(&mut self, bytes: u64) {
        self.current = self.current.saturating_add(bytes);
        self.sink.update(self.current, self.total);
    }

    pub fn set_stats(&self, records: u64, errors: u64) {
        self.sink.set_stats(records, errors);
    }

    /// The underlying sink, usable while the tracker is mutably borrowed
    pub fn sink(&self) -> &'a dyn ProgressSink {
        self.sink
    }

    pub fn current(&self) -> u64 {
        self.current
    }
}

/// Parse a whole file, checking `cancel` periodically.
///
/// Returns `Ok(None)` for files of unknown format.
pub fn collect_records(file: &CatalogFile, cancel: &AtomicBool) -> ParseResult<Option<Vec<RomRecord>>> {
    let Some(stream) = open_records(file)? else {
        return Ok(None);
    };
    let mut records = Vec::new();
    for (i, record) in stream.enumerate() {
        if i % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            return Err(ParseError::Cancelled(file.path.clone()));
        }
        records.push(record?);
    }
    Ok(Some(records))
}

/// Run one strategy over `files`
pub fn execute(
    strategy: Strategy,
    files: &[CatalogFile],
    db: &mut dyn Destination,
    options: &PipelineOptions,
    progress: &mut ProgressTracker<'_>,
    cancel: &AtomicBool,
) -> StrategyOutcome {
    match strategy {
        Strategy::InMemory => in_memory::run(files, db, options, progress, cancel),
        Strategy::Staged => staged::run(files, db, options, progress, cancel),
        Strategy::Direct => direct::run(files, db, options, progress, cancel),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::progress::CallbackProgress;
    use std::cell::RefCell;

    #[test]
    fn test_strategy_names() {
        assert_eq!(Strategy::InMemory.to_string(), "in-memory");
        assert!(Strategy::Staged.uses_pool());
        assert!(!Strategy::Direct.uses_pool());
    }

    #[test]
    fn test_tally() {
        let mut outcome = StrategyOutcome::default();
        outcome.tally(FileOutcome::Imported {
            file: "a.dat".into(),
            records: 5,
        });
        outcome.tally(FileOutcome::Skipped {
            file: "b.dat".into(),
            reason: "unknown format".into(),
        });
        let file = CatalogFile::new("/x/c.dat", 0);
        let recoverable: IngestError = ParseError::Cmp {
            path: file.path.clone(),
            position: 0,
            reason: "unterminated block".into(),
        }
        .into();
        assert!(outcome.tally_error(&file, recoverable).is_ok());
        let cancelled: IngestError = ParseError::Cancelled(file.path.clone()).into();
        assert!(outcome.tally_error(&file, cancelled).is_ok());
        let fatal: IngestError = DbError::Schema("gone".into()).into();
        assert!(outcome.tally_error(&file, fatal).is_err());

        assert_eq!(outcome.records, 5);
        assert_eq!(outcome.files_imported, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.errors, 1);
    }

    #[test]
    fn test_progress_tracker_advances_by_bytes() {
        let seen = RefCell::new(Vec::new());
        let sink = CallbackProgress::new(|c, t| seen.borrow_mut().push((c, t)));
        let mut tracker = ProgressTracker::new(&sink, 100, 400);
        tracker.advance(50);
        tracker.advance(250);
        assert_eq!(tracker.current(), 400);
        assert_eq!(*seen.borrow(), vec![(100, 400), (150, 400), (400, 400)]);
    }
}
