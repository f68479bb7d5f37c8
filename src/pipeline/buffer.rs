//! Accumulates whole-file record sets for batched inserts

use crate::catalog::RomRecord;
use crate::db::Destination;
use crate::error::DbResult;
use tracing::debug;

/// Records of completed files waiting to be inserted.
///
/// Files are appended whole, so a flush always carries every record of the
/// files it marks processed.
#[derive(Debug)]
pub struct RecordBuffer {
    records: Vec<RomRecord>,
    files: Vec<String>,
    batch_size: usize,
}

impl RecordBuffer {
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            records: Vec::with_capacity(batch_size),
            files: Vec::new(),
            batch_size,
        }
    }

    /// Add every record of one completed file
    pub fn append(&mut self, file_name: String, records: Vec<RomRecord>) {
        self.records.extend(records);
        self.files.push(file_name);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.files.is_empty()
    }

    pub fn pending_files(&self) -> usize {
        self.files.len()
    }

    /// Flush once the buffered record count reaches the batch size
    pub fn flush_if_full(&mut self, db: &mut dyn Destination) -> DbResult<u64> {
        if self.records.len() >= self.batch_size {
            self.drain(db)
        } else {
            Ok(0)
        }
    }

    /// Insert everything buffered and mark the buffered files processed
    pub fn drain(&mut self, db: &mut dyn Destination) -> DbResult<u64> {
        if self.is_empty() {
            return Ok(0);
        }
        let inserted = db.insert_batch(&self.records, &self.files)?;
        debug!(
            rows = inserted,
            files = self.files.len(),
            "Flushed record buffer"
        );
        self.records.clear();
        self.files.clear();
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CatalogDb, DbConfig};
    use crate::catalog::RomRecord;

    fn records(n: usize, file: &str) -> Vec<RomRecord> {
        (0..n)
            .map(|i| RomRecord {
                filename: file.into(),
                platform: "P".into(),
                category: "C".into(),
                game_name: format!("g{i}"),
                title: format!("g{i}"),
                release_year: None,
                description: String::new(),
                rom_name: format!("r{i}"),
                size: i as i64,
                crc: String::new(),
                md5: String::new(),
                sha1: String::new(),
                status: "good".into(),
                system: "S".into(),
            })
            .collect()
    }

    fn db() -> CatalogDb {
        let mut db = CatalogDb::open_in_memory(DbConfig::default()).unwrap();
        db.create_schema_if_missing().unwrap();
        db
    }

    #[test]
    fn test_flush_waits_for_batch_size() {
        let mut db = db();
        let mut buffer = RecordBuffer::new(5);

        buffer.append("a.dat".into(), records(3, "a.dat"));
        assert_eq!(buffer.flush_if_full(&mut db).unwrap(), 0);
        assert_eq!(db.rom_count().unwrap(), 0);

        buffer.append("b.dat".into(), records(3, "b.dat"));
        assert_eq!(buffer.flush_if_full(&mut db).unwrap(), 6);
        assert!(buffer.is_empty());
        assert_eq!(db.rom_count().unwrap(), 6);

        let done = db.processed_file_names().unwrap();
        assert!(done.contains("a.dat") && done.contains("b.dat"));
    }

    #[test]
    fn test_drain_marks_empty_files() {
        let mut db = db();
        let mut buffer = RecordBuffer::new(1000);
        buffer.append("empty.dat".into(), Vec::new());
        assert!(!buffer.is_empty());
        assert_eq!(buffer.drain(&mut db).unwrap(), 0);
        assert!(db.processed_file_names().unwrap().contains("empty.dat"));
        assert_eq!(buffer.pending_files(), 0);
    }
}
