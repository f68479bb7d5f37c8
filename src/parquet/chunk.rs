//! Staging chunk files for the Staged strategy
//!
//! Each source file is streamed into one or more SNAPPY-compressed Parquet
//! chunks named `<safe-name>_part_<index>.parquet`. A chunk is written each
//! time `rows_per_chunk` records have accumulated, plus one for the tail.

use crate::catalog::RomRecord;
use crate::error::StagingError;
use crate::parquet::columns::RomColumns;
use crate::parquet::schema::rom_schema_ref;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Glob pattern matching every chunk in a staging directory
pub const CHUNK_PATTERN: &str = "*.parquet";

/// Strip every character other than alphanumerics and `._-`
pub fn safe_chunk_stem(file_name: &str) -> String {
    file_name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect()
}

/// Chunk file name for a stem and part index
pub fn chunk_file_name(stem: &str, index: usize) -> String {
    format!("{stem}_part_{index}.parquet")
}

fn chunk_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build()
}

/// Write one batch as a complete Parquet file
pub fn write_chunk(path: &Path, batch: &RecordBatch) -> Result<(), StagingError> {
    let file = File::create(path).map_err(|source| StagingError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = ArrowWriter::try_new(file, rom_schema_ref(), Some(chunk_properties()))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

/// Totals for one fully staged source file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkSummary {
    pub rows: u64,
    pub chunks: usize,
}

/// Streams the records of one source file into numbered chunk files
pub struct ChunkWriter {
    dir: PathBuf,
    stem: String,
    rows_per_chunk: usize,
    columns: RomColumns,
    written: Vec<PathBuf>,
    rows: u64,
}

impl ChunkWriter {
    /// Create a writer for `stem` inside the staging directory `dir`
    pub fn new(dir: &Path, stem: impl Into<String>, rows_per_chunk: usize) -> Self {
        let rows_per_chunk = rows_per_chunk.max(1);
        Self {
            dir: dir.to_path_buf(),
            stem: stem.into(),
            rows_per_chunk,
            columns: RomColumns::with_capacity(rows_per_chunk.min(64 * 1024)),
            written: Vec::new(),
            rows: 0,
        }
    }

    /// Buffer a record, writing a chunk once the buffer is full
    pub fn push(&mut self, record: &RomRecord) -> Result<(), StagingError> {
        self.columns.push(record);
        self.rows += 1;
        if self.columns.len() >= self.rows_per_chunk {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StagingError> {
        if self.columns.is_empty() {
            return Ok(());
        }
        let batch = self.columns.finish()?;
        let path = self
            .dir
            .join(chunk_file_name(&self.stem, self.written.len()));
        // Track before writing so a partial file is removed on discard
        self.written.push(path.clone());
        write_chunk(&path, &batch)?;
        debug!(chunk = %path.display(), rows = batch.num_rows(), "Chunk written");
        Ok(())
    }

    /// Write the tail chunk and return the totals. On failure every chunk
    /// of this source is removed.
    pub fn finish(mut self) -> Result<ChunkSummary, StagingError> {
        if let Err(e) = self.flush() {
            self.discard();
            return Err(e);
        }
        Ok(ChunkSummary {
            rows: self.rows,
            chunks: self.written.len(),
        })
    }

    /// Remove every chunk this writer produced
    pub fn discard(self) {
        for path in self.written {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(chunk = %path.display(), error = %e, "Failed to remove chunk");
                }
            }
        }
    }
}
