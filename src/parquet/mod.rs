//! Columnar (Arrow / Parquet) support
//!
//! # Module Structure
//!
//! - `schema`: Canonical Arrow schema (14 columns)
//! - `columns`: Record → column builders, and typed batch views for reading
//! - `chunk`: Staging chunk files for the Staged strategy
//! - `convert`: Export / import of the `roms` table

pub mod chunk;
pub mod columns;
pub mod convert;
pub mod schema;

pub use chunk::{safe_chunk_stem, ChunkSummary, ChunkWriter, CHUNK_PATTERN};
pub use columns::{records_to_batch, RomBatchView, RomColumns, RomRow};
pub use convert::{export_to_parquet, import_from_parquet, ExportConfig, ExportStats};
pub use schema::{rom_schema, rom_schema_ref};
