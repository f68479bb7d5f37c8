//! DAT file parsing
//!
//! ```text
//!   CatalogFile
//!       │
//!       ▼
//!   detect_format (first 1 KB)
//!       │
//!       ├── Xml ──► XmlRecords  (quick-xml event stream)
//!       ├── Cmp ──► CmpRecords  (depth-counting block scanner)
//!       └── Unknown ──► skipped
//!                         │
//!                         ▼
//!               RecordStream: Iterator<Item = Result<RomRecord>>
//! ```
//!
//! Both dialects yield the same normalized [`RomRecord`]s. A stream ends
//! after its first error; the error fails only that file.

pub mod cmp;
pub mod detect;
pub mod size;
pub mod xml;

pub use cmp::CmpRecords;
pub use detect::{detect_format, DatFormat};
pub use size::normalize_size;
pub use xml::XmlRecords;

use crate::catalog::{CatalogFile, RomRecord};
use crate::error::{ParseError, ParseResult};
use std::fs::File;
use std::io::BufReader;

/// A one-pass record stream over a detected catalog file
pub enum RecordStream {
    Xml(XmlRecords<BufReader<File>>),
    Cmp(CmpRecords),
}

impl RecordStream {
    /// Detected dialect of this stream
    pub fn format(&self) -> DatFormat {
        match self {
            RecordStream::Xml(_) => DatFormat::Xml,
            RecordStream::Cmp(_) => DatFormat::Cmp,
        }
    }
}

impl Iterator for RecordStream {
    type Item = ParseResult<RomRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            RecordStream::Xml(records) => records.next(),
            RecordStream::Cmp(records) => records.next(),
        }
    }
}

/// Detect the dialect of a file and open a record stream over it.
///
/// Returns `Ok(None)` for files of unknown format. Failing to open or read
/// the file is an error for that file.
pub fn open_records(file: &CatalogFile) -> ParseResult<Option<RecordStream>> {
    let format = detect_format(&file.path).map_err(|source| ParseError::Io {
        path: file.path.clone(),
        source,
    })?;

    match format {
        DatFormat::Xml => XmlRecords::open(file).map(|r| Some(RecordStream::Xml(r))),
        DatFormat::Cmp => CmpRecords::open(file).map(|r| Some(RecordStream::Cmp(r))),
        DatFormat::Unknown => Ok(None),
    }
}

/// Parse a whole file into memory.
///
/// Returns `Ok(None)` for files of unknown format.
pub fn parse_file(file: &CatalogFile) -> ParseResult<Option<Vec<RomRecord>>> {
    match open_records(file)? {
        Some(stream) => stream.collect::<ParseResult<Vec<_>>>().map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_open_records_dispatches_by_format() {
        let dir = tempdir().unwrap();
        let xml = dir.path().join("X - Games.dat");
        fs::write(
            &xml,
            r#"<?xml version="1.0"?><datafile><game name="a"><rom name="a.bin" size="1"/></game></datafile>"#,
        )
        .unwrap();
        let cmp = dir.path().join("C - Games.dat");
        fs::write(&cmp, r#"game ( name "b" rom ( name "b.bin" size 2 ) )"#).unwrap();
        let junk = dir.path().join("J - Games.dat");
        fs::write(&junk, "nothing to see").unwrap();

        let stream = open_records(&CatalogFile::from_path(&xml).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(stream.format(), DatFormat::Xml);
        assert_eq!(stream.count(), 1);

        let records = parse_file(&CatalogFile::from_path(&cmp).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].size, 2);

        assert!(parse_file(&CatalogFile::from_path(&junk).unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_unreadable_file_is_error() {
        let dir = tempdir().unwrap();
        let file = CatalogFile::new(dir.path().join("gone.dat"), 0);
        assert!(matches!(open_records(&file), Err(ParseError::Io { .. })));
    }
}
