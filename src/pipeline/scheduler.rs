//! Bounded worker pool for per-file parse tasks
//!
//! ```text
//!   task queue (indices, pre-filled)
//!        │
//!   ┌────┴─────┬──────────┐
//!   ▼          ▼          ▼
//! ingest-0  ingest-1 … ingest-N     scoped threads, no shared mutable state
//!   │          │          │
//!   └────┬─────┴──────────┘
//!        ▼
//!   result channel (bounded) ──► coordinator: handler(file, result)
//! ```
//!
//! With fewer than two effective workers every task runs in the calling
//! thread, in file order.

use crate::catalog::CatalogFile;
use crate::error::{IngestError, WorkerError};
use crate::pipeline::ProgressTracker;
use crossbeam_channel::{bounded, unbounded};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, error, warn};

/// Maximum in-flight results per worker before workers block
const RESULTS_PER_WORKER: usize = 2;

/// Pool size for a requested worker count: `min(requested, cpus)`, with 0
/// meaning one per CPU.
pub fn effective_workers(requested: usize) -> usize {
    let cpus = num_cpus::get().max(1);
    if requested == 0 {
        cpus
    } else {
        requested.min(cpus)
    }
}

/// How a scheduler run ended
#[derive(Debug, Default)]
pub struct SchedulerReport {
    /// Files whose results reached the handler
    pub completed: usize,

    /// First fatal error (from the handler or a worker failure)
    pub fatal: Option<IngestError>,

    /// Stopped by the cancellation flag
    pub interrupted: bool,
}

/// Dispatches per-file tasks serially or across a worker pool
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    workers: usize,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Scheduler {
    /// Scheduler for a requested worker count (see [`effective_workers`])
    pub fn new(requested: usize) -> Self {
        Self {
            workers: effective_workers(requested),
        }
    }

    /// Scheduler that always runs in the calling thread
    pub fn serial() -> Self {
        Self { workers: 1 }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn is_parallel(&self) -> bool {
        self.workers >= 2
    }

    /// Run `task` for every file and feed each result to `handler` in
    /// completion order.
    ///
    /// `task` runs on worker threads and must observe `cancel`. `handler`
    /// runs on the calling thread; returning an error stops dispatch, sets
    /// `cancel` and ends the run with that error as the fatal error.
    pub fn run<T, F, H>(
        &self,
        files: &[CatalogFile],
        progress: &mut ProgressTracker<'_>,
        cancel: &AtomicBool,
        task: F,
        handler: H,
    ) -> SchedulerReport
    where
        T: Send,
        F: Fn(&CatalogFile, &AtomicBool) -> Result<T, IngestError> + Sync,
        H: FnMut(&CatalogFile, Result<T, IngestError>) -> Result<(), IngestError>,
    {
        if self.is_parallel() && files.len() > 1 {
            self.run_parallel(files, progress, cancel, task, handler)
        } else {
            Self::run_serial(files, progress, cancel, task, handler)
        }
    }

    fn run_serial<T, F, H>(
        files: &[CatalogFile],
        progress: &mut ProgressTracker<'_>,
        cancel: &AtomicBool,
        task: F,
        mut handler: H,
    ) -> SchedulerReport
    where
        F: Fn(&CatalogFile, &AtomicBool) -> Result<T, IngestError>,
        H: FnMut(&CatalogFile, Result<T, IngestError>) -> Result<(), IngestError>,
    {
        let mut report = SchedulerReport::default();
        for file in files {
            if cancel.load(Ordering::SeqCst) {
                report.interrupted = true;
                break;
            }
            let result = task(file, cancel);
            progress.advance(file.size);
            report.completed += 1;
            if let Err(e) = handler(file, result) {
                cancel.store(true, Ordering::SeqCst);
                report.fatal = Some(e);
                break;
            }
        }
        if report.fatal.is_none() && cancel.load(Ordering::SeqCst) {
            report.interrupted = true;
        }
        report
    }

    fn run_parallel<T, F, H>(
        &self,
        files: &[CatalogFile],
        progress: &mut ProgressTracker<'_>,
        cancel: &AtomicBool,
        task: F,
        mut handler: H,
    ) -> SchedulerReport
    where
        T: Send,
        F: Fn(&CatalogFile, &AtomicBool) -> Result<T, IngestError> + Sync,
        H: FnMut(&CatalogFile, Result<T, IngestError>) -> Result<(), IngestError>,
    {
        let mut report = SchedulerReport::default();
        let workers = self.workers.min(files.len());

        let (task_tx, task_rx) = unbounded::<usize>();
        for index in 0..files.len() {
            // Receiver is alive; this cannot fail
            let _ = task_tx.send(index);
        }
        drop(task_tx);

        let (result_tx, result_rx) = bounded::<(usize, Result<T, IngestError>)>(
            workers * RESULTS_PER_WORKER,
        );
        let task = &task;

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for id in 0..workers {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                let spawned = thread::Builder::new()
                    .name(format!("ingest-{}", id))
                    .spawn_scoped(scope, move || {
                        while let Ok(index) = task_rx.recv() {
                            if cancel.load(Ordering::Relaxed) {
                                break;
                            }
                            let result = task(&files[index], cancel);
                            if result_tx.send((index, result)).is_err() {
                                break;
                            }
                        }
                    });
                match spawned {
                    Ok(handle) => handles.push((id, handle)),
                    Err(e) => {
                        error!(worker = id, error = %e, "Failed to spawn worker");
                        cancel.store(true, Ordering::SeqCst);
                        report.fatal = Some(
                            WorkerError::InitFailed {
                                id,
                                reason: e.to_string(),
                            }
                            .into(),
                        );
                        break;
                    }
                }
            }
            drop(result_tx);
            debug!(workers = handles.len(), files = files.len(), "Worker pool started");

            if report.fatal.is_none() {
                for (index, result) in result_rx.iter() {
                    let file = &files[index];
                    progress.advance(file.size);
                    report.completed += 1;
                    if let Err(e) = handler(file, result) {
                        cancel.store(true, Ordering::SeqCst);
                        report.fatal = Some(e);
                        break;
                    }
                }
            }
            // Unblock workers waiting on a full result channel
            drop(result_rx);

            for (id, handle) in handles {
                if let Err(payload) = handle.join() {
                    let message = panic_message(payload.as_ref());
                    error!(worker = id, message = %message, "Worker panicked");
                    if report.fatal.is_none() {
                        cancel.store(true, Ordering::SeqCst);
                        report.fatal = Some(WorkerError::Panicked { id, message }.into());
                    }
                }
            }
        });

        if report.fatal.is_none() && cancel.load(Ordering::SeqCst) {
            report.interrupted = true;
            warn!(
                completed = report.completed,
                total = files.len(),
                "Run interrupted"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DbError, ParseError};
    use crate::progress::{CallbackProgress, NoProgress};
    use std::cell::Cell;
    use std::collections::HashSet;

    fn files(n: usize) -> Vec<CatalogFile> {
        (0..n)
            .map(|i| CatalogFile::new(format!("/dats/Sys/file{i}.dat"), 10))
            .collect()
    }

    #[test]
    fn test_effective_workers() {
        let cpus = num_cpus::get().max(1);
        assert_eq!(effective_workers(0), cpus);
        assert_eq!(effective_workers(1), 1);
        assert_eq!(effective_workers(10_000), cpus);
    }

    #[test]
    fn test_serial_preserves_order() {
        let files = files(5);
        let sink = NoProgress;
        let mut progress = ProgressTracker::new(&sink, 0, 50);
        let cancel = AtomicBool::new(false);
        let mut seen = Vec::new();

        let report = Scheduler::serial().run(
            &files,
            &mut progress,
            &cancel,
            |file, _| Ok(file.file_name.clone()),
            |_, result| {
                seen.push(result.unwrap());
                Ok(())
            },
        );

        assert_eq!(report.completed, 5);
        assert!(report.fatal.is_none());
        assert!(!report.interrupted);
        assert_eq!(seen[0], "file0.dat");
        assert_eq!(seen[4], "file4.dat");
        assert_eq!(progress.current(), 50);
    }

    #[test]
    fn test_parallel_delivers_every_result() {
        let files = files(40);
        let last = Cell::new(0u64);
        let sink = CallbackProgress::new(|c, _| last.set(c));
        let mut progress = ProgressTracker::new(&sink, 0, 400);
        let cancel = AtomicBool::new(false);
        let mut seen = HashSet::new();

        let scheduler = Scheduler { workers: 4 };
        let report = scheduler.run(
            &files,
            &mut progress,
            &cancel,
            |file, _| Ok(file.file_name.clone()),
            |_, result| {
                seen.insert(result.unwrap());
                Ok(())
            },
        );

        assert_eq!(report.completed, 40);
        assert_eq!(seen.len(), 40);
        assert_eq!(last.get(), 400);
    }

    #[test]
    fn test_recoverable_task_errors_reach_handler() {
        let files = files(6);
        let sink = NoProgress;
        let mut progress = ProgressTracker::new(&sink, 0, 60);
        let cancel = AtomicBool::new(false);
        let mut failures = 0;

        let report = Scheduler { workers: 3 }.run(
            &files,
            &mut progress,
            &cancel,
            |file, _| {
                if file.file_name == "file2.dat" {
                    Err(ParseError::Cancelled(file.path.clone()).into())
                } else {
                    Ok(())
                }
            },
            |_, result| {
                if result.is_err() {
                    failures += 1;
                }
                Ok(())
            },
        );

        assert_eq!(report.completed, 6);
        assert_eq!(failures, 1);
        assert!(report.fatal.is_none());
    }

    #[test]
    fn test_fatal_handler_error_stops_run() {
        let files = files(100);
        let sink = NoProgress;
        let mut progress = ProgressTracker::new(&sink, 0, 1000);
        let cancel = AtomicBool::new(false);
        let mut calls_after_fatal = 0;
        let mut failed = false;

        let report = Scheduler { workers: 4 }.run(
            &files,
            &mut progress,
            &cancel,
            |_, _| Ok(()),
            |file, _| {
                if failed {
                    calls_after_fatal += 1;
                }
                if file.file_name == "file3.dat" {
                    failed = true;
                    Err(DbError::Schema("disk is full".into()).into())
                } else {
                    Ok(())
                }
            },
        );

        assert!(report.fatal.is_some());
        assert!(!report.interrupted);
        assert!(cancel.load(Ordering::SeqCst));
        assert_eq!(calls_after_fatal, 0);
    }

    #[test]
    fn test_worker_panic_is_reported() {
        let files = files(8);
        let sink = NoProgress;
        let mut progress = ProgressTracker::new(&sink, 0, 80);
        let cancel = AtomicBool::new(false);

        let report = Scheduler { workers: 2 }.run(
            &files,
            &mut progress,
            &cancel,
            |file, _| {
                if file.file_name == "file1.dat" {
                    panic!("boom");
                }
                Ok(())
            },
            |_, _| Ok(()),
        );

        assert!(matches!(
            report.fatal,
            Some(IngestError::Worker(WorkerError::Panicked { .. }))
        ));
    }

    #[test]
    fn test_cancel_before_start_interrupts() {
        let files = files(3);
        let sink = NoProgress;
        let mut progress = ProgressTracker::new(&sink, 0, 30);
        let cancel = AtomicBool::new(true);

        let report = Scheduler::serial().run(
            &files,
            &mut progress,
            &cancel,
            |_, _| Ok(()),
            |_, _| Ok(()),
        );
        assert_eq!(report.completed, 0);
        assert!(report.interrupted);
    }
}
