//! In-Memory strategy: workers parse whole files, the coordinator batches
//! their records into the destination.

use crate::catalog::CatalogFile;
use crate::db::Destination;
use crate::error::{FileOutcome, IngestError};
use crate::pipeline::{
    collect_records, PipelineOptions, ProgressTracker, RecordBuffer, Scheduler, StrategyOutcome,
};
use std::sync::atomic::AtomicBool;
use tracing::{error, info};

/// Run the In-Memory strategy over `files`
pub fn run(
    files: &[CatalogFile],
    db: &mut dyn Destination,
    options: &PipelineOptions,
    progress: &mut ProgressTracker<'_>,
    cancel: &AtomicBool,
) -> StrategyOutcome {
    let scheduler = Scheduler::new(options.workers);
    let mut buffer = RecordBuffer::new(options.batch_size);
    let mut outcome = StrategyOutcome::default();
    let sink = progress.sink();

    info!(
        files = files.len(),
        workers = scheduler.workers(),
        batch_size = options.batch_size,
        "Starting in-memory import"
    );

    let report = scheduler.run(
        files,
        progress,
        cancel,
        |file, cancel| collect_records(file, cancel).map_err(IngestError::from),
        |file, result| {
            match result {
                Ok(Some(records)) => {
                    outcome.tally(FileOutcome::Imported {
                        file: file.file_name.clone(),
                        records: records.len() as u64,
                    });
                    buffer.append(file.file_name.clone(), records);
                    buffer.flush_if_full(&mut *db)?;
                }
                Ok(None) => outcome.tally(FileOutcome::Skipped {
                    file: file.file_name.clone(),
                    reason: "unknown format".into(),
                }),
                Err(e) => outcome.tally_error(file, e)?,
            }
            sink.set_stats(outcome.records, outcome.errors);
            Ok(())
        },
    );

    outcome.interrupted = report.interrupted;
    if let Some(fatal) = report.fatal {
        error!(error = %fatal, "In-memory import aborted");
        outcome.fatal = Some(fatal);
        return outcome;
    }

    // Files already handed to the buffer are complete, even when interrupted
    if let Err(e) = buffer.drain(db) {
        error!(error = %e, "Final flush failed");
        outcome.fatal = Some(e.into());
    }
    outcome
}
