//! Column builders and readers for ROM record batches

use crate::catalog::RomRecord;
use crate::parquet::schema::rom_schema_ref;
use arrow::array::{
    Array, ArrayRef, Int32Array, Int32Builder, Int64Array, Int64Builder, StringArray,
    StringBuilder,
};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

/// Accumulates records column by column until finished into a RecordBatch
pub struct RomColumns {
    filename: StringBuilder,
    platform: StringBuilder,
    category: StringBuilder,
    game_name: StringBuilder,
    title: StringBuilder,
    release_year: Int32Builder,
    description: StringBuilder,
    rom_name: StringBuilder,
    size: Int64Builder,
    crc: StringBuilder,
    md5: StringBuilder,
    sha1: StringBuilder,
    status: StringBuilder,
    system: StringBuilder,
    rows: usize,
}

impl Default for RomColumns {
    fn default() -> Self {
        Self::with_capacity(1024)
    }
}

impl RomColumns {
    /// Create builders sized for `rows` records
    pub fn with_capacity(rows: usize) -> Self {
        let text = || StringBuilder::with_capacity(rows, rows * 16);
        Self {
            filename: text(),
            platform: text(),
            category: text(),
            game_name: text(),
            title: text(),
            release_year: Int32Builder::with_capacity(rows),
            description: text(),
            rom_name: text(),
            size: Int64Builder::with_capacity(rows),
            crc: text(),
            md5: text(),
            sha1: text(),
            status: text(),
            system: text(),
            rows: 0,
        }
    }

    /// Append one record
    pub fn push(&mut self, record: &RomRecord) {
        self.filename.append_value(&record.filename);
        self.platform.append_value(&record.platform);
        self.category.append_value(&record.category);
        self.game_name.append_value(&record.game_name);
        self.title.append_value(&record.title);
        self.release_year.append_option(record.release_year);
        self.description.append_value(&record.description);
        self.rom_name.append_value(&record.rom_name);
        self.size.append_value(record.size);
        self.crc.append_value(&record.crc);
        self.md5.append_value(&record.md5);
        self.sha1.append_value(&record.sha1);
        self.status.append_value(&record.status);
        self.system.append_value(&record.system);
        self.rows += 1;
    }

    /// Number of buffered rows
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Drain the builders into a RecordBatch, leaving them empty
    pub fn finish(&mut self) -> Result<RecordBatch, ArrowError> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(self.filename.finish()),
            Arc::new(self.platform.finish()),
            Arc::new(self.category.finish()),
            Arc::new(self.game_name.finish()),
            Arc::new(self.title.finish()),
            Arc::new(self.release_year.finish()),
            Arc::new(self.description.finish()),
            Arc::new(self.rom_name.finish()),
            Arc::new(self.size.finish()),
            Arc::new(self.crc.finish()),
            Arc::new(self.md5.finish()),
            Arc::new(self.sha1.finish()),
            Arc::new(self.status.finish()),
            Arc::new(self.system.finish()),
        ];
        self.rows = 0;
        RecordBatch::try_new(rom_schema_ref(), columns)
    }
}

/// Build a RecordBatch from a slice of records
pub fn records_to_batch(records: &[RomRecord]) -> Result<RecordBatch, ArrowError> {
    let mut columns = RomColumns::with_capacity(records.len());
    for record in records {
        columns.push(record);
    }
    columns.finish()
}

/// Borrowed row view over one ROM record in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RomRow<'a> {
    pub filename: &'a str,
    pub platform: &'a str,
    pub category: &'a str,
    pub game_name: &'a str,
    pub title: &'a str,
    pub release_year: Option<i32>,
    pub description: &'a str,
    pub rom_name: &'a str,
    pub size: i64,
    pub crc: &'a str,
    pub md5: &'a str,
    pub sha1: &'a str,
    pub status: &'a str,
    pub system: &'a str,
}

impl RomRow<'_> {
    pub fn to_record(&self) -> RomRecord {
        RomRecord {
            filename: self.filename.to_string(),
            platform: self.platform.to_string(),
            category: self.category.to_string(),
            game_name: self.game_name.to_string(),
            title: self.title.to_string(),
            release_year: self.release_year,
            description: self.description.to_string(),
            rom_name: self.rom_name.to_string(),
            size: self.size,
            crc: self.crc.to_string(),
            md5: self.md5.to_string(),
            sha1: self.sha1.to_string(),
            status: self.status.to_string(),
            system: self.system.to_string(),
        }
    }
}

/// Typed, name-resolved access to the columns of a ROM RecordBatch
pub struct RomBatchView<'a> {
    filename: &'a StringArray,
    platform: &'a StringArray,
    category: &'a StringArray,
    game_name: &'a StringArray,
    title: &'a StringArray,
    release_year: &'a Int32Array,
    description: &'a StringArray,
    rom_name: &'a StringArray,
    size: &'a Int64Array,
    crc: &'a StringArray,
    md5: &'a StringArray,
    sha1: &'a StringArray,
    status: &'a StringArray,
    system: &'a StringArray,
    rows: usize,
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, ArrowError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| ArrowError::SchemaError(format!("missing column '{name}'")))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ArrowError::SchemaError(format!("column '{name}' has unexpected type")))
}

/// Null strings read as empty, null sizes as 0
fn text(array: &StringArray, row: usize) -> &str {
    if array.is_null(row) {
        ""
    } else {
        array.value(row)
    }
}

impl<'a> RomBatchView<'a> {
    /// Resolve every column by name, failing on a missing or mistyped column
    pub fn new(batch: &'a RecordBatch) -> Result<Self, ArrowError> {
        Ok(Self {
            filename: column(batch, "filename")?,
            platform: column(batch, "platform")?,
            category: column(batch, "category")?,
            game_name: column(batch, "game_name")?,
            title: column(batch, "title")?,
            release_year: column(batch, "release_year")?,
            description: column(batch, "description")?,
            rom_name: column(batch, "rom_name")?,
            size: column(batch, "size")?,
            crc: column(batch, "crc")?,
            md5: column(batch, "md5")?,
            sha1: column(batch, "sha1")?,
            status: column(batch, "status")?,
            system: column(batch, "system")?,
            rows: batch.num_rows(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Row at index `i` (must be `< len()`)
    pub fn row(&self, i: usize) -> RomRow<'a> {
        RomRow {
            filename: text(self.filename, i),
            platform: text(self.platform, i),
            category: text(self.category, i),
            game_name: text(self.game_name, i),
            title: text(self.title, i),
            release_year: (!self.release_year.is_null(i)).then(|| self.release_year.value(i)),
            description: text(self.description, i),
            rom_name: text(self.rom_name, i),
            size: if self.size.is_null(i) { 0 } else { self.size.value(i) },
            crc: text(self.crc, i),
            md5: text(self.md5, i),
            sha1: text(self.sha1, i),
            status: text(self.status, i),
            system: text(self.system, i),
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = RomRow<'a>> + '_ {
        (0..self.rows).map(move |i| self.row(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, year: Option<i32>) -> RomRecord {
        RomRecord {
            filename: "f.dat".into(),
            platform: "P".into(),
            category: "C".into(),
            game_name: "G".into(),
            title: "G".into(),
            release_year: year,
            description: String::new(),
            rom_name: name.into(),
            size: 7,
            crc: "00".into(),
            md5: String::new(),
            sha1: String::new(),
            status: "good".into(),
            system: "S".into(),
        }
    }

    #[test]
    fn test_builders_reset_after_finish() {
        let mut columns = RomColumns::default();
        columns.push(&record("a", Some(1990)));
        columns.push(&record("b", None));
        assert_eq!(columns.len(), 2);

        let batch = columns.finish().unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 14);
        assert!(columns.is_empty());

        let again = columns.finish().unwrap();
        assert_eq!(again.num_rows(), 0);
    }

    #[test]
    fn test_view_reads_back_rows() {
        let input = vec![record("a", Some(1990)), record("b", None)];
        let batch = records_to_batch(&input).unwrap();
        let view = RomBatchView::new(&batch).unwrap();

        let output: Vec<RomRecord> = view.rows().map(|r| r.to_record()).collect();
        assert_eq!(output, input);
    }

    #[test]
    fn test_view_rejects_foreign_batch() {
        use arrow::datatypes::{DataType, Field, Schema};
        let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, false)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1i64]))]).unwrap();
        assert!(RomBatchView::new(&batch).is_err());
    }
}
