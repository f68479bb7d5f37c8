//! Staged strategy: workers write Parquet chunks to a staging directory,
//! then one bulk load moves everything into the destination.
//!
//! Memory stays bounded by the chunk size no matter how large a single
//! catalog file is.

use crate::catalog::CatalogFile;
use crate::db::Destination;
use crate::error::{FileOutcome, IngestError, ParseError, StagingError};
use crate::parquet::chunk::{safe_chunk_stem, ChunkSummary, ChunkWriter, CHUNK_PATTERN};
use crate::parser::open_records;
use crate::pipeline::{
    PipelineOptions, ProgressTracker, Scheduler, StrategyOutcome, CANCEL_CHECK_INTERVAL,
};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

/// Marker file identifying a directory this importer created for staging
pub const STAGING_MARKER: &str = ".dat-ingest-staging";

/// Staging directory, cleared on creation and removed on drop
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    /// Remove leftovers of an earlier run at `path` and create it empty.
    ///
    /// A non-empty directory without the staging marker is left alone and
    /// reported as [`StagingError::ForeignDirectory`].
    pub fn prepare(path: &Path) -> Result<Self, StagingError> {
        let io_err = |source| StagingError::Io {
            path: path.to_path_buf(),
            source,
        };
        if path.exists() {
            if !path.is_dir() {
                return Err(StagingError::ForeignDirectory(path.to_path_buf()));
            }
            let owned = path.join(STAGING_MARKER).is_file();
            let empty = fs::read_dir(path).map_err(io_err)?.next().is_none();
            if !owned && !empty {
                return Err(StagingError::ForeignDirectory(path.to_path_buf()));
            }
            fs::remove_dir_all(path).map_err(io_err)?;
        }
        fs::create_dir_all(path).map_err(io_err)?;
        fs::write(path.join(STAGING_MARKER), b"").map_err(io_err)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %self.path.display(), error = %e, "Failed to remove staging directory");
            }
        }
    }
}

/// Unique chunk stem per file. Files sharing a base name get `_1`, `_2`...
pub fn assign_chunk_stems(files: &[CatalogFile]) -> Vec<String> {
    let mut used = HashSet::with_capacity(files.len());
    files
        .iter()
        .map(|file| {
            let mut base = safe_chunk_stem(&file.file_name);
            if base.is_empty() {
                base.push_str("chunk");
            }
            let mut stem = base.clone();
            let mut n = 1;
            while !used.insert(stem.clone()) {
                stem = format!("{base}_{n}");
                n += 1;
            }
            stem
        })
        .collect()
}

/// Stream one file into chunks. Any failure removes this file's chunks.
fn stage_file(
    file: &CatalogFile,
    dir: &Path,
    stem: &str,
    rows_per_chunk: usize,
    cancel: &AtomicBool,
) -> Result<Option<ChunkSummary>, IngestError> {
    let Some(stream) = open_records(file)? else {
        return Ok(None);
    };
    let mut writer = ChunkWriter::new(dir, stem, rows_per_chunk);
    for (i, record) in stream.enumerate() {
        if i % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            writer.discard();
            return Err(ParseError::Cancelled(file.path.clone()).into());
        }
        let pushed = match record {
            Ok(record) => writer.push(&record).map_err(IngestError::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = pushed {
            writer.discard();
            return Err(e);
        }
    }
    Ok(Some(writer.finish()?))
}

/// Run the Staged strategy over `files`
pub fn run(
    files: &[CatalogFile],
    db: &mut dyn Destination,
    options: &PipelineOptions,
    progress: &mut ProgressTracker<'_>,
    cancel: &AtomicBool,
) -> StrategyOutcome {
    let mut outcome = StrategyOutcome::default();
    let staging = match StagingDir::prepare(&options.temp_dir) {
        Ok(staging) => staging,
        Err(e) => {
            error!(dir = %options.temp_dir.display(), error = %e, "Cannot prepare staging directory");
            outcome.fatal = Some(e.into());
            return outcome;
        }
    };

    let stems: HashMap<&Path, String> = files
        .iter()
        .map(|f| f.path.as_path())
        .zip(assign_chunk_stems(files))
        .collect();
    let scheduler = Scheduler::new(options.workers);
    let sink = progress.sink();
    let mut completed: Vec<String> = Vec::new();

    info!(
        files = files.len(),
        workers = scheduler.workers(),
        chunk_rows = options.chunk_rows,
        dir = %staging.path().display(),
        "Starting staged import"
    );

    let report = scheduler.run(
        files,
        progress,
        cancel,
        |file, cancel| {
            let stem = stems
                .get(file.path.as_path())
                .map(String::as_str)
                .unwrap_or("chunk");
            stage_file(file, staging.path(), stem, options.chunk_rows, cancel)
        },
        |file, result| {
            match result {
                Ok(Some(summary)) => {
                    outcome.tally(FileOutcome::Imported {
                        file: file.file_name.clone(),
                        records: summary.rows,
                    });
                    completed.push(file.file_name.clone());
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
        error!(error = %fatal, "Staged import aborted");
        outcome.fatal = Some(fatal);
        return outcome;
    }

    match db.bulk_load_from_directory(staging.path(), CHUNK_PATTERN, &completed) {
        Ok(rows) => info!(rows, files = completed.len(), "Staged chunks loaded"),
        Err(e) => {
            error!(error = %e, "Bulk load failed");
            outcome.fatal = Some(e.into());
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CatalogDb, DbConfig};
    use crate::pipeline::fixtures::sample_tree;
    use crate::progress::NoProgress;
    use tempfile::tempdir;

    #[test]
    fn test_assign_chunk_stems_dedupes() {
        let files = vec![
            CatalogFile::new("/a/Sys - Games.dat", 1),
            CatalogFile::new("/b/Sys - Games.dat", 1),
            CatalogFile::new("/c/Sys - Games.dat", 1),
            CatalogFile::new("/d/Other.dat", 1),
        ];
        assert_eq!(
            assign_chunk_stems(&files),
            vec!["Sys-Games.dat", "Sys-Games.dat_1", "Sys-Games.dat_2", "Other.dat"]
        );
    }

    #[test]
    fn test_staging_dir_lifecycle() {
        let root = tempdir().unwrap();
        let path = root.path().join("chunks");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(STAGING_MARKER), b"").unwrap();
        fs::write(path.join("stale_part_0.parquet"), b"old").unwrap();

        {
            let staging = StagingDir::prepare(&path).unwrap();
            let names: Vec<_> = fs::read_dir(staging.path())
                .unwrap()
                .map(|e| e.unwrap().file_name())
                .collect();
            assert_eq!(names, vec![std::ffi::OsString::from(STAGING_MARKER)]);
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_staging_dir_refuses_foreign_directory() {
        let root = tempdir().unwrap();
        let path = root.path().join("photos");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("holiday.jpg"), b"keep me").unwrap();

        let err = StagingDir::prepare(&path).unwrap_err();
        assert!(matches!(err, StagingError::ForeignDirectory(_)));
        let err: IngestError = err.into();
        assert!(err.is_fatal());
        assert_eq!(fs::read(path.join("holiday.jpg")).unwrap(), b"keep me");

        let empty = root.path().join("empty");
        fs::create_dir_all(&empty).unwrap();
        drop(StagingDir::prepare(&empty).unwrap());
        assert!(!empty.exists());
    }

    #[test]
    fn test_staged_import() {
        let dir = tempdir().unwrap();
        let files = sample_tree(&dir.path().join("dats"));
        let mut db = CatalogDb::open_in_memory(DbConfig::default()).unwrap();
        db.create_schema_if_missing().unwrap();

        let temp_dir = dir.path().join("temp_chunks");
        let options = PipelineOptions {
            workers: 2,
            chunk_rows: 1,
            temp_dir: temp_dir.clone(),
            ..Default::default()
        };
        let sink = NoProgress;
        let mut progress = ProgressTracker::new(&sink, 0, 0);
        let cancel = AtomicBool::new(false);
        let outcome = run(&files, &mut db, &options, &mut progress, &cancel);

        assert!(outcome.fatal.is_none());
        assert_eq!(outcome.records, 4);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.errors, 1);
        assert_eq!(db.rom_count().unwrap(), 4);
        assert_eq!(db.processed_file_names().unwrap().len(), 2);
        assert!(!temp_dir.exists());
    }
}
