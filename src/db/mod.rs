//! Destination storage for ROM records
//!
//! The import pipeline writes through the [`Destination`] trait; the
//! shipped implementation is [`CatalogDb`], backed by SQLite.
//!
//! # Write paths
//!
//! ```text
//! ┌──────────────────────────┐   insert_batch(records, completed_files)
//! │ In-Memory: RecordBuffer  │ ─────────────────────────────────────┐
//! └──────────────────────────┘                                      │
//! ┌──────────────────────────┐   bulk_load_from_directory(dir, ...) │
//! │ Staged: *.parquet chunks │ ──────────────────────────────────┐  │
//! └──────────────────────────┘                                   │  │
//! ┌──────────────────────────┐   begin_file / insert_columnar /  │  │
//! │ Direct: Arrow batches    │   commit_file | rollback_file     │  │
//! └──────────────────────────┘ ───────────────────────────────┐  │  │
//!                                                             ▼  ▼  ▼
//!                                  ┌───────────────────────────────────┐
//!                                  │ roms + processed_files (one tx)   │
//!                                  └───────────────────────────────────┘
//! ```
//!
//! Every path marks a source file as processed in the same transaction that
//! commits its rows, so the checkpoint set never names a file whose rows
//! are missing.

pub mod schema;
pub mod writer;

pub use schema::{keys, SCHEMA_VERSION};
pub use writer::{CatalogDb, DbConfig, WriterStats};

use crate::catalog::RomRecord;
use crate::error::DbResult;
use arrow::record_batch::RecordBatch;
use std::collections::HashSet;
use std::path::Path;

/// Storage engine receiving records and holding the import checkpoint
pub trait Destination {
    /// Create tables if they do not exist yet
    fn create_schema_if_missing(&mut self) -> DbResult<()>;

    /// Insert records and mark `completed_files` processed, atomically.
    /// Returns the number of rows inserted.
    fn insert_batch(&mut self, records: &[RomRecord], completed_files: &[String]) -> DbResult<u64>;

    /// Load every file in `dir` whose name matches the glob `pattern` and
    /// mark `completed_files` processed, atomically.
    fn bulk_load_from_directory(
        &mut self,
        dir: &Path,
        pattern: &str,
        completed_files: &[String],
    ) -> DbResult<u64>;

    fn get_metadata(&self, key: &str) -> DbResult<Option<String>>;

    fn set_metadata(&mut self, key: &str, value: &str) -> DbResult<()>;

    /// Delete all records, checkpoints and metadata
    fn wipe_all(&mut self) -> DbResult<()>;

    /// Base names of every file whose records are committed
    fn processed_file_names(&self) -> DbResult<HashSet<String>>;

    /// Open the transaction for one source file
    fn begin_file(&mut self) -> DbResult<()>;

    /// Insert a columnar batch inside the open file transaction
    fn insert_columnar(&mut self, batch: &RecordBatch) -> DbResult<u64>;

    /// Mark the file processed and commit its transaction
    fn commit_file(&mut self, file_name: &str) -> DbResult<()>;

    /// Discard the open file transaction, if any
    fn rollback_file(&mut self) -> DbResult<()>;

    /// Build indexes and record totals after a run. Returns the row count.
    fn finalize(&mut self) -> DbResult<u64>;
}
