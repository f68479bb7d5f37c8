//! SQLite destination for ROM records
//!
//! # Performance Characteristics
//!
//! - Batched inserts inside one transaction per flush
//! - Prepared statements for minimal parsing overhead
//! - WAL mode; `synchronous = OFF` only in turbo mode
//! - Indexes built once after the run, not maintained during inserts

use crate::catalog::RomRecord;
use crate::db::schema::{self, keys};
use crate::db::Destination;
use crate::error::{DbError, DbResult};
use crate::parquet::columns::RomBatchView;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Destination settings
#[derive(Debug, Clone, Copy, Default)]
pub struct DbConfig {
    /// Disable fsync on commit
    pub turbo: bool,
}

/// Statistics about write operations
#[derive(Debug, Default)]
pub struct WriterStats {
    /// Total rows written
    pub rows_written: AtomicU64,

    /// Total transactions committed
    pub batches_committed: AtomicU64,

    /// Total files marked processed
    pub files_marked: AtomicU64,
}

impl WriterStats {
    pub fn rows_written(&self) -> u64 {
        self.rows_written.load(Ordering::Relaxed)
    }

    pub fn batches_committed(&self) -> u64 {
        self.batches_committed.load(Ordering::Relaxed)
    }

    pub fn files_marked(&self) -> u64 {
        self.files_marked.load(Ordering::Relaxed)
    }
}

/// SQLite-backed catalog database
pub struct CatalogDb {
    conn: Connection,

    /// Whether a per-file transaction is open
    in_file: bool,

    stats: WriterStats,
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Insert every row of a batch view using the cached statement
fn insert_view(conn: &Connection, view: &RomBatchView<'_>) -> DbResult<u64> {
    let mut stmt = conn.prepare_cached(schema::INSERT_ROM)?;
    for row in view.rows() {
        stmt.execute(params![
            row.filename,
            row.platform,
            row.category,
            row.game_name,
            row.title,
            row.release_year,
            row.description,
            row.rom_name,
            row.size,
            row.crc,
            row.md5,
            row.sha1,
            row.status,
            row.system,
        ])?;
    }
    Ok(view.len() as u64)
}

/// Insert every row of a Parquet file (caller owns the transaction)
fn insert_parquet_file(conn: &Connection, path: &Path) -> DbResult<u64> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let mut rows = 0u64;
    for batch in reader {
        let batch = batch?;
        rows += insert_view(conn, &RomBatchView::new(&batch)?)?;
    }
    Ok(rows)
}

fn mark_processed(conn: &Connection, files: &[String]) -> DbResult<()> {
    let processed_at = now_rfc3339();
    let mut stmt = conn.prepare_cached(
        "INSERT OR REPLACE INTO processed_files (filename, processed_at) VALUES (?1, ?2)",
    )?;
    for file in files {
        stmt.execute(params![file, processed_at])?;
    }
    Ok(())
}

impl CatalogDb {
    /// Open (or create) a database file
    pub fn open(path: &Path, config: DbConfig) -> DbResult<Self> {
        let conn = Connection::open(path).map_err(|e| DbError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        schema::apply_write_pragmas(&conn, config.turbo)?;
        debug!(path = %path.display(), turbo = config.turbo, "Database opened");

        Ok(Self {
            conn,
            in_file: false,
            stats: WriterStats::default(),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory(config: DbConfig) -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::apply_write_pragmas(&conn, config.turbo)?;
        Ok(Self {
            conn,
            in_file: false,
            stats: WriterStats::default(),
        })
    }

    /// Underlying connection, for read queries and export
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Get writer statistics
    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }

    /// Number of rows in the `roms` table
    pub fn rom_count(&self) -> DbResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM roms", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Insert every row of one Parquet file in a single transaction
    pub fn import_parquet_file(&mut self, path: &Path) -> DbResult<u64> {
        let tx = self.conn.unchecked_transaction()?;
        let rows = insert_parquet_file(&tx, path)?;
        tx.commit()?;
        self.stats.rows_written.fetch_add(rows, Ordering::Relaxed);
        self.stats.batches_committed.fetch_add(1, Ordering::Relaxed);
        Ok(rows)
    }
}

impl Destination for CatalogDb {
    fn create_schema_if_missing(&mut self) -> DbResult<()> {
        schema::create_schema(&self.conn)?;
        if schema::get_metadata(&self.conn, keys::SCHEMA_VERSION)?.is_none() {
            schema::set_metadata(
                &self.conn,
                keys::SCHEMA_VERSION,
                &schema::SCHEMA_VERSION.to_string(),
            )?;
        }
        schema::set_metadata(&self.conn, keys::IMPORTER_VERSION, env!("CARGO_PKG_VERSION"))?;
        Ok(())
    }

    fn insert_batch(&mut self, records: &[RomRecord], completed_files: &[String]) -> DbResult<u64> {
        if records.is_empty() && completed_files.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(schema::INSERT_ROM)?;
            for r in records {
                stmt.execute(params![
                    r.filename,
                    r.platform,
                    r.category,
                    r.game_name,
                    r.title,
                    r.release_year,
                    r.description,
                    r.rom_name,
                    r.size,
                    r.crc,
                    r.md5,
                    r.sha1,
                    r.status,
                    r.system,
                ])?;
            }
        }
        mark_processed(&tx, completed_files)?;
        tx.commit()?;

        let rows = records.len() as u64;
        self.stats.rows_written.fetch_add(rows, Ordering::Relaxed);
        self.stats.batches_committed.fetch_add(1, Ordering::Relaxed);
        self.stats
            .files_marked
            .fetch_add(completed_files.len() as u64, Ordering::Relaxed);
        debug!(rows, files = completed_files.len(), "Batch committed");
        Ok(rows)
    }

    fn bulk_load_from_directory(
        &mut self,
        dir: &Path,
        pattern: &str,
        completed_files: &[String],
    ) -> DbResult<u64> {
        let pattern = glob::Pattern::new(pattern)?;
        let mut chunks: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| pattern.matches(name))
            })
            .map(|entry| entry.path())
            .collect();
        chunks.sort();

        let tx = self.conn.unchecked_transaction()?;
        let mut rows = 0u64;
        for chunk in &chunks {
            rows += insert_parquet_file(&tx, chunk)?;
        }
        mark_processed(&tx, completed_files)?;
        tx.commit()?;

        self.stats.rows_written.fetch_add(rows, Ordering::Relaxed);
        self.stats.batches_committed.fetch_add(1, Ordering::Relaxed);
        self.stats
            .files_marked
            .fetch_add(completed_files.len() as u64, Ordering::Relaxed);
        info!(chunks = chunks.len(), rows, "Bulk load committed");
        Ok(rows)
    }

    fn get_metadata(&self, key: &str) -> DbResult<Option<String>> {
        schema::get_metadata(&self.conn, key)
    }

    fn set_metadata(&mut self, key: &str, value: &str) -> DbResult<()> {
        schema::set_metadata(&self.conn, key, value)
    }

    fn wipe_all(&mut self) -> DbResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM roms", [])?;
        tx.execute("DELETE FROM processed_files", [])?;
        tx.execute("DELETE FROM db_metadata", [])?;
        tx.commit()?;
        info!("Database wiped");
        Ok(())
    }

    fn processed_file_names(&self) -> DbResult<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT filename FROM processed_files")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(names)
    }

    fn begin_file(&mut self) -> DbResult<()> {
        if self.in_file {
            return Err(DbError::Transaction(
                "begin_file called while a file transaction is open".into(),
            ));
        }
        self.conn.execute_batch("BEGIN")?;
        self.in_file = true;
        Ok(())
    }

    fn insert_columnar(&mut self, batch: &RecordBatch) -> DbResult<u64> {
        if !self.in_file {
            return Err(DbError::Transaction(
                "insert_columnar called outside a file transaction".into(),
            ));
        }
        let rows = insert_view(&self.conn, &RomBatchView::new(batch)?)?;
        self.stats.rows_written.fetch_add(rows, Ordering::Relaxed);
        Ok(rows)
    }

    fn commit_file(&mut self, file_name: &str) -> DbResult<()> {
        if !self.in_file {
            return Err(DbError::Transaction(
                "commit_file called without begin_file".into(),
            ));
        }
        mark_processed(&self.conn, &[file_name.to_string()])?;
        self.conn.execute_batch("COMMIT")?;
        self.in_file = false;
        self.stats.batches_committed.fetch_add(1, Ordering::Relaxed);
        self.stats.files_marked.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn rollback_file(&mut self) -> DbResult<()> {
        if !self.in_file {
            return Ok(());
        }
        self.in_file = false;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn finalize(&mut self) -> DbResult<u64> {
        schema::create_indexes(&self.conn)?;
        let total = self.rom_count()?;
        schema::set_metadata(&self.conn, keys::TOTAL_ROMS, &total.to_string())?;
        schema::optimize_for_reads(&self.conn)?;
        info!(
            total_roms = total,
            rows_written = self.stats.rows_written(),
            transactions = self.stats.batches_committed(),
            files_marked = self.stats.files_marked(),
            "Database finalized"
        );
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parquet::chunk::ChunkWriter;
    use crate::parquet::columns::records_to_batch;
    use tempfile::tempdir;

    fn record(file: &str, rom: &str, size: i64) -> RomRecord {
        RomRecord {
            filename: file.into(),
            platform: "P".into(),
            category: "Standard".into(),
            game_name: "G (1990)".into(),
            title: "G".into(),
            release_year: Some(1990),
            description: String::new(),
            rom_name: rom.into(),
            size,
            crc: "abcd".into(),
            md5: String::new(),
            sha1: String::new(),
            status: "good".into(),
            system: "S".into(),
        }
    }

    fn db() -> CatalogDb {
        let mut db = CatalogDb::open_in_memory(DbConfig::default()).unwrap();
        db.create_schema_if_missing().unwrap();
        db
    }

    #[test]
    fn test_insert_batch_marks_files() {
        let mut db = db();
        let rows = db
            .insert_batch(
                &[record("a.dat", "1", 1), record("a.dat", "2", 2)],
                &["a.dat".to_string()],
            )
            .unwrap();
        assert_eq!(rows, 2);
        assert_eq!(db.rom_count().unwrap(), 2);
        assert!(db.processed_file_names().unwrap().contains("a.dat"));
        assert_eq!(db.stats().batches_committed(), 1);
        assert_eq!(db.stats().rows_written(), 2);
        assert_eq!(db.stats().files_marked(), 1);

        let year: Option<i32> = db
            .conn()
            .query_row("SELECT release_year FROM roms LIMIT 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(year, Some(1990));
    }

    #[test]
    fn test_wipe_all() {
        let mut db = db();
        db.insert_batch(&[record("a.dat", "1", 1)], &["a.dat".to_string()])
            .unwrap();
        db.set_metadata(keys::TOSEC_VERSION, "TOSEC-v2020-01-01").unwrap();

        db.wipe_all().unwrap();
        assert_eq!(db.rom_count().unwrap(), 0);
        assert!(db.processed_file_names().unwrap().is_empty());
        assert_eq!(db.get_metadata(keys::TOSEC_VERSION).unwrap(), None);
    }

    #[test]
    fn test_file_transaction_commit_and_rollback() {
        let mut db = db();
        let batch = records_to_batch(&[record("a.dat", "1", 1), record("a.dat", "2", 2)]).unwrap();

        db.begin_file().unwrap();
        assert_eq!(db.insert_columnar(&batch).unwrap(), 2);
        db.commit_file("a.dat").unwrap();

        db.begin_file().unwrap();
        db.insert_columnar(&batch).unwrap();
        db.rollback_file().unwrap();

        assert_eq!(db.rom_count().unwrap(), 2);
        let processed = db.processed_file_names().unwrap();
        assert_eq!(processed.len(), 1);
        assert!(processed.contains("a.dat"));
    }

    #[test]
    fn test_transaction_protocol_errors() {
        let mut db = db();
        let batch = records_to_batch(&[record("a.dat", "1", 1)]).unwrap();
        assert!(db.insert_columnar(&batch).is_err());
        assert!(db.commit_file("a.dat").is_err());

        db.begin_file().unwrap();
        assert!(db.begin_file().is_err());
        db.rollback_file().unwrap();
    }

    #[test]
    fn test_bulk_load_from_directory() {
        let dir = tempdir().unwrap();
        let mut writer = ChunkWriter::new(dir.path(), "a.dat", 2);
        for i in 0..3 {
            writer.push(&record("a.dat", &i.to_string(), i)).unwrap();
        }
        writer.finish().unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut db = db();
        let rows = db
            .bulk_load_from_directory(dir.path(), "*.parquet", &["a.dat".to_string()])
            .unwrap();
        assert_eq!(rows, 3);
        assert_eq!(db.rom_count().unwrap(), 3);
        assert!(db.processed_file_names().unwrap().contains("a.dat"));
    }

    #[test]
    fn test_finalize_records_total() {
        let dir = tempdir().unwrap();
        let mut db = CatalogDb::open(&dir.path().join("t.db"), DbConfig { turbo: true }).unwrap();
        db.create_schema_if_missing().unwrap();
        db.insert_batch(&[record("a.dat", "1", 1)], &[]).unwrap();

        assert_eq!(db.finalize().unwrap(), 1);
        assert_eq!(
            db.get_metadata(keys::TOTAL_ROMS).unwrap(),
            Some("1".to_string())
        );
        assert_eq!(
            db.get_metadata(keys::SCHEMA_VERSION).unwrap(),
            Some(schema::SCHEMA_VERSION.to_string())
        );
    }
}
