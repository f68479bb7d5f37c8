//! Direct strategy: each file is streamed into bounded Arrow batches and
//! handed to the destination inside one per-file transaction.
//!
//! No worker pool and no intermediate files. A file that fails part way is
//! rolled back, so it contributes no rows and is not marked processed.

use crate::catalog::CatalogFile;
use crate::db::Destination;
use crate::error::{DbError, FileOutcome, IngestError, ParseError};
use crate::parquet::columns::RomColumns;
use crate::parser::{open_records, RecordStream};
use crate::pipeline::{PipelineOptions, ProgressTracker, StrategyOutcome, CANCEL_CHECK_INTERVAL};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

fn stream_into(
    file: &CatalogFile,
    stream: RecordStream,
    db: &mut dyn Destination,
    buffer_rows: usize,
    cancel: &AtomicBool,
) -> Result<u64, IngestError> {
    let mut columns = RomColumns::with_capacity(buffer_rows.min(64 * 1024));
    let mut rows = 0u64;

    for (i, record) in stream.enumerate() {
        if i % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            return Err(ParseError::Cancelled(file.path.clone()).into());
        }
        columns.push(&record?);
        if columns.len() >= buffer_rows {
            let batch = columns.finish().map_err(DbError::from)?;
            rows += db.insert_columnar(&batch)?;
        }
    }
    if !columns.is_empty() {
        let batch = columns.finish().map_err(DbError::from)?;
        rows += db.insert_columnar(&batch)?;
    }
    Ok(rows)
}

/// Import one file in its own transaction. `Ok(None)` for unknown formats.
fn import_file(
    file: &CatalogFile,
    db: &mut dyn Destination,
    buffer_rows: usize,
    cancel: &AtomicBool,
) -> Result<Option<u64>, IngestError> {
    let Some(stream) = open_records(file)? else {
        return Ok(None);
    };
    debug!(file = %file.file_name, format = %stream.format(), "Streaming file");

    db.begin_file()?;
    let result = stream_into(file, stream, db, buffer_rows, cancel)
        .and_then(|rows| db.commit_file(&file.file_name).map(|_| rows).map_err(IngestError::from));
    match result {
        Ok(rows) => Ok(Some(rows)),
        Err(e) => {
            if let Err(rb) = db.rollback_file() {
                warn!(file = %file.file_name, error = %rb, "Rollback failed");
            }
            Err(e)
        }
    }
}

/// Run the Direct strategy over `files`, serially
pub fn run(
    files: &[CatalogFile],
    db: &mut dyn Destination,
    options: &PipelineOptions,
    progress: &mut ProgressTracker<'_>,
    cancel: &AtomicBool,
) -> StrategyOutcome {
    let buffer_rows = options.direct_buffer_rows.max(1);
    let mut outcome = StrategyOutcome::default();

    info!(files = files.len(), buffer_rows, "Starting direct import");

    for file in files {
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        let result = import_file(file, db, buffer_rows, cancel);
        progress.advance(file.size);

        match result {
            Ok(Some(records)) => outcome.tally(FileOutcome::Imported {
                file: file.file_name.clone(),
                records,
            }),
            Ok(None) => outcome.tally(FileOutcome::Skipped {
                file: file.file_name.clone(),
                reason: "unknown format".into(),
            }),
            Err(e) => {
                if let Err(fatal) = outcome.tally_error(file, e) {
                    error!(file = %file.file_name, error = %fatal, "Direct import aborted");
                    cancel.store(true, Ordering::SeqCst);
                    outcome.fatal = Some(fatal);
                    break;
                }
            }
        }
        progress.set_stats(outcome.records, outcome.errors);
    }

    if outcome.fatal.is_none() && cancel.load(Ordering::SeqCst) {
        outcome.interrupted = true;
    }
    outcome
}
