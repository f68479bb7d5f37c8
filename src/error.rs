//! Error types for dat-ingest
//!
//! This module defines the error hierarchy for the import pipeline:
//! - Size token normalization errors
//! - Per-file parse errors (XML, CMP, I/O)
//! - Destination database errors
//! - Staging (Parquet chunk) errors
//! - Configuration and worker pool errors
//!
//! Every error can be classified as per-file recoverable or session-fatal
//! with [`IngestError::is_fatal`]. Recoverable errors are logged and counted
//! by the coordinator; fatal errors stop the worker pool and end the session.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for dat-ingest
#[derive(Error, Debug)]
pub enum IngestError {
    /// Parsing a catalog file failed
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Destination database errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Staging chunk errors
    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors outside of a single file parse
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The destination holds a different dataset version
    #[error("Dataset version mismatch (database: {database}, input: {input}); a wipe is required")]
    VersionMismatch { database: String, input: String },

    /// Session operations called out of order
    #[error("Session error: {0}")]
    Session(String),

    /// The input scan found nothing to import
    #[error("No .dat files found in the input directory")]
    NoCatalogFiles,

    /// Interrupted by signal
    #[error("Operation interrupted by signal")]
    Interrupted,
}

/// Size token normalization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SizeError {
    /// Token looked hexadecimal (`0x`/`$`) but was not
    #[error("Invalid hex size format: '{0}'")]
    InvalidSizeFormat(String),

    /// No decimal digits, or the value does not fit in 64 bits
    #[error("Unparsable size format: '{0}'")]
    UnparsableSize(String),
}

/// Errors raised while extracting records from one catalog file
#[derive(Error, Debug)]
pub enum ParseError {
    /// Reading the file failed
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Malformed XML
    #[error("Malformed XML in '{path}' at byte {position}: {reason}")]
    Xml {
        path: PathBuf,
        position: u64,
        reason: String,
    },

    /// Malformed ClrMamePro text (unterminated block or string)
    #[error("Malformed CMP data in '{path}' at byte {position}: {reason}")]
    Cmp {
        path: PathBuf,
        position: u64,
        reason: String,
    },

    /// A ROM carried a size that could not be normalized
    #[error("Bad size for rom '{rom}' in '{path}': {source}")]
    Size {
        path: PathBuf,
        rom: String,
        #[source]
        source: SizeError,
    },

    /// The parse was cancelled because the session is shutting down
    #[error("Parse of '{0}' cancelled")]
    Cancelled(PathBuf),
}

/// Destination database errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to open or create the database file
    #[error("Failed to open database at '{path}': {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    /// Schema error
    #[error("Database schema error: {0}")]
    Schema(String),

    /// Transaction protocol misuse (commit without begin, etc.)
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Reading a columnar batch failed
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Reading or writing a Parquet file failed
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Sidecar metadata serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid bulk-load file pattern
    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Staging chunk errors (Staged strategy)
#[derive(Error, Debug)]
pub enum StagingError {
    /// Arrow error while assembling a chunk
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet writer error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// I/O error on the staging directory
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The staging path holds files that a previous run did not create
    #[error("Refusing to clear '{0}': not a staging directory from a previous run")]
    ForeignDirectory(PathBuf),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 0 (auto) and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid batch size
    #[error("Invalid batch size {size}: must be between {min} and {max}")]
    InvalidBatchSize { size: usize, min: usize, max: usize },

    /// Invalid chunk or buffer size
    #[error("Invalid {name} {size}: must be at least 1")]
    InvalidChunkSize { name: &'static str, size: usize },

    /// Input directory error
    #[error("Invalid input directory '{path}': {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },
}

/// Worker pool errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker thread could not be spawned
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },
}

/// Category of a session-fatal error, used for user-facing hints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    /// No space left on a device
    DiskFull,
    /// A filesystem is mounted read-only
    ReadOnly,
    /// Memory allocation failure
    OutOfMemory,
    /// The destination database failed
    Destination,
    /// Worker pool failure
    Worker,
    /// Anything else that cannot continue (config, interrupt, version)
    Other,
}

/// Phrases found in resource-exhaustion errors that arrive as strings
/// (SQLite, Parquet external errors, OS messages on various platforms).
const EXHAUSTION_PHRASES: &[(&str, FatalKind)] = &[
    ("no space left", FatalKind::DiskFull),
    ("not enough space", FatalKind::DiskFull),
    ("disk is full", FatalKind::DiskFull),
    ("disk full", FatalKind::DiskFull),
    ("read-only file system", FatalKind::ReadOnly),
    ("readonly database", FatalKind::ReadOnly),
    ("out of memory", FatalKind::OutOfMemory),
    ("cannot allocate memory", FatalKind::OutOfMemory),
];

/// Classify an I/O error as resource exhaustion
pub fn io_exhaustion(err: &io::Error) -> Option<FatalKind> {
    match err.kind() {
        io::ErrorKind::StorageFull => return Some(FatalKind::DiskFull),
        io::ErrorKind::ReadOnlyFilesystem => return Some(FatalKind::ReadOnly),
        io::ErrorKind::OutOfMemory => return Some(FatalKind::OutOfMemory),
        _ => {}
    }
    // ENOSPC, EROFS, ENOMEM, EDQUOT
    match err.raw_os_error() {
        Some(28) | Some(122) => Some(FatalKind::DiskFull),
        Some(30) => Some(FatalKind::ReadOnly),
        Some(12) => Some(FatalKind::OutOfMemory),
        _ => message_exhaustion(&err.to_string()),
    }
}

/// Classify an error message as resource exhaustion
pub fn message_exhaustion(message: &str) -> Option<FatalKind> {
    let lower = message.to_lowercase();
    EXHAUSTION_PHRASES
        .iter()
        .find(|(phrase, _)| lower.contains(phrase))
        .map(|(_, kind)| *kind)
}

impl IngestError {
    /// Returns the fatal category, or `None` if this error only affects one file
    pub fn fatal_kind(&self) -> Option<FatalKind> {
        match self {
            IngestError::Parse(e) => match e {
                ParseError::Io { source, .. } => io_exhaustion(source),
                _ => None,
            },
            IngestError::Staging(e) => match e {
                StagingError::Io { source, .. } => io_exhaustion(source),
                StagingError::ForeignDirectory(_) => Some(FatalKind::Other),
                other => message_exhaustion(&other.to_string()),
            },
            IngestError::Database(e) => {
                Some(message_exhaustion(&e.to_string()).unwrap_or(FatalKind::Destination))
            }
            IngestError::Io(e) => Some(io_exhaustion(e).unwrap_or(FatalKind::Other)),
            IngestError::Worker(_) => Some(FatalKind::Worker),
            IngestError::Config(_)
            | IngestError::VersionMismatch { .. }
            | IngestError::Session(_)
            | IngestError::NoCatalogFiles
            | IngestError::Interrupted => Some(FatalKind::Other),
        }
    }

    /// Check if this error must terminate the whole session
    pub fn is_fatal(&self) -> bool {
        self.fatal_kind().is_some()
    }
}

/// Result type alias for IngestError
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type alias for DbError
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Result type alias for ParseError
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Represents the outcome of importing a single catalog file
#[derive(Debug)]
pub enum FileOutcome {
    /// Records extracted and handed to the strategy
    Imported { file: String, records: u64 },

    /// Unknown format, skipped without error
    Skipped { file: String, reason: String },

    /// Failed with a recoverable error
    Failed { file: String, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_errors_are_recoverable() {
        let err: IngestError = ParseError::Xml {
            path: "a.dat".into(),
            position: 10,
            reason: "unexpected end".into(),
        }
        .into();
        assert!(!err.is_fatal());

        let err: IngestError = ParseError::Size {
            path: "a.dat".into(),
            rom: "x.bin".into(),
            source: SizeError::UnparsableSize("abc".into()),
        }
        .into();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_disk_full_is_fatal() {
        let err: IngestError = ParseError::Io {
            path: "a.dat".into(),
            source: io::Error::from_raw_os_error(28),
        }
        .into();
        assert_eq!(err.fatal_kind(), Some(FatalKind::DiskFull));

        let err: IngestError = StagingError::Io {
            path: "chunk.parquet".into(),
            source: io::Error::new(io::ErrorKind::Other, "Read-only file system"),
        }
        .into();
        assert_eq!(err.fatal_kind(), Some(FatalKind::ReadOnly));
    }

    #[test]
    fn test_plain_read_error_is_recoverable() {
        let err: IngestError = ParseError::Io {
            path: "a.dat".into(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        }
        .into();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_database_errors_are_fatal() {
        let err: IngestError = DbError::Schema("missing table".into()).into();
        assert_eq!(err.fatal_kind(), Some(FatalKind::Destination));

        let err: IngestError = DbError::Transaction("database or disk is full".into()).into();
        assert_eq!(err.fatal_kind(), Some(FatalKind::DiskFull));
    }

    #[test]
    fn test_message_exhaustion() {
        assert_eq!(
            message_exhaustion("OSError: [Errno 28] No space left on device"),
            Some(FatalKind::DiskFull)
        );
        assert_eq!(message_exhaustion("unexpected token"), None);
    }
}
