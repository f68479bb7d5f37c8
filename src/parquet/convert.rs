//! Parquet export and import of the `roms` table
//!
//! Export streams the table into one ZSTD-compressed Parquet file with
//! column statistics and writes a `<file>.json` sidecar next to it. Import
//! loads any Parquet file with the ROM schema in a single transaction.

use crate::catalog::RomRecord;
use crate::db::schema::{self, keys};
use crate::db::{CatalogDb, Destination};
use crate::error::DbResult;
use crate::parquet::columns::RomColumns;
use crate::parquet::schema::rom_schema_ref;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::errors::ParquetError;
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

/// Configuration for Parquet export
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Number of rows per row group
    pub row_group_size: usize,
    /// ZSTD compression level (1-22)
    pub compression_level: i32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            row_group_size: 100_000,
            compression_level: 3,
        }
    }
}

/// Statistics from an export operation
#[derive(Debug, Clone)]
pub struct ExportStats {
    pub rows_exported: u64,
    pub bytes_written: u64,
    pub sidecar: PathBuf,
}

/// Progress callback type: (rows done, rows total)
pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send>;

/// Build Parquet writer properties with ZSTD compression and column statistics.
fn writer_properties(config: &ExportConfig) -> DbResult<WriterProperties> {
    if config.row_group_size == 0 {
        return Err(ParquetError::General("row group size must be at least 1".into()).into());
    }
    let level = ZstdLevel::try_new(config.compression_level)?;
    Ok(WriterProperties::builder()
        .set_compression(Compression::ZSTD(level))
        .set_statistics_enabled(EnabledStatistics::Chunk)
        .set_max_row_group_size(config.row_group_size)
        .build())
}

fn sidecar_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".json");
    PathBuf::from(name)
}

/// Export every row of the `roms` table to `output`.
pub fn export_to_parquet(
    db: &CatalogDb,
    output: &Path,
    config: ExportConfig,
    progress: Option<ProgressCallback>,
) -> DbResult<ExportStats> {
    let total = db.rom_count()?;
    let props = writer_properties(&config)?;
    let file = File::create(output)?;
    let mut writer = ArrowWriter::try_new(file, rom_schema_ref(), Some(props))?;

    info!(output = %output.display(), rows = total, "Exporting to Parquet");

    let mut columns = RomColumns::with_capacity(config.row_group_size.min(64 * 1024));
    let mut exported = 0u64;
    {
        let mut stmt = db.conn().prepare(schema::SELECT_ROMS)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            columns.push(&RomRecord {
                filename: row.get(0)?,
                platform: row.get(1)?,
                category: row.get(2)?,
                game_name: row.get(3)?,
                title: row.get(4)?,
                release_year: row.get(5)?,
                description: row.get(6)?,
                rom_name: row.get(7)?,
                size: row.get(8)?,
                crc: row.get(9)?,
                md5: row.get(10)?,
                sha1: row.get(11)?,
                status: row.get(12)?,
                system: row.get(13)?,
            });

            if columns.len() >= config.row_group_size {
                exported += columns.len() as u64;
                writer.write(&columns.finish()?)?;
                if let Some(ref cb) = progress {
                    cb(exported, total);
                }
            }
        }
    }

    if !columns.is_empty() {
        exported += columns.len() as u64;
        writer.write(&columns.finish()?)?;
    }
    writer.close()?;

    if let Some(cb) = progress {
        cb(exported, total);
    }

    let sidecar = sidecar_path(output);
    let metadata = serde_json::json!({
        "rows": exported,
        "dataset_version": db.get_metadata(keys::TOSEC_VERSION)?,
        "schema_version": schema::SCHEMA_VERSION,
        "exported_at": chrono::Utc::now().to_rfc3339(),
        "importer_version": env!("CARGO_PKG_VERSION"),
    });
    serde_json::to_writer_pretty(File::create(&sidecar)?, &metadata)?;

    let bytes_written = std::fs::metadata(output)?.len();
    info!(rows = exported, bytes = bytes_written, "Export complete");

    Ok(ExportStats {
        rows_exported: exported,
        bytes_written,
        sidecar,
    })
}

/// Import every row of a Parquet file, creating the schema if needed
pub fn import_from_parquet(db: &mut CatalogDb, input: &Path) -> DbResult<u64> {
    db.create_schema_if_missing()?;
    info!(input = %input.display(), "Importing from Parquet");
    let rows = db.import_parquet_file(input)?;
    let total = db.finalize()?;
    info!(rows, total, "Import complete");
    Ok(rows)
}
