//! dat-ingest - TOSEC / ClrMamePro DAT Catalog Importer
//!
//! Imports large collections of ROM catalog files ("DATs") into a single
//! SQLite database with one row per ROM. Interrupted imports resume from
//! the last committed file.
//!
//! # Features
//!
//! - **Two dialects**: Logiqx XML (`<datafile>`, MAME) and ClrMamePro
//!   parenthesis-delimited text, detected from the first kilobyte.
//!
//! - **Three strategies**: In-Memory (batched inserts), Staged (Parquet
//!   chunks + one bulk load) and Direct (streamed Arrow batches, one
//!   transaction per file).
//!
//! - **Checkpointing**: a file is marked processed in the same transaction
//!   that commits its rows.
//!
//! - **Parquet round trip**: export the `roms` table to ZSTD Parquet and
//!   load it back.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │           input dir (recursive *.dat scan, sorted)           │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │ ImportSession: version check, resume filter, status metadata │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Scheduler ── worker threads ── detect → XML / CMP parser    │
//! │      │                                  → RomRecord stream   │
//! │      ▼ (single coordinator)                                  │
//! │  In-Memory buffer │ Staged chunks │ Direct Arrow batches     │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                ▼
//!                     ┌─────────────────────┐
//!                     │  SQLite (tosec.db)  │
//!                     │  roms, checkpoints, │
//!                     │  metadata           │
//!                     └─────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Import a TOSEC release
//! dat-ingest scan -i ~/TOSEC-v2023-06-01 -o tosec.db -w 8
//!
//! # Query results
//! sqlite3 tosec.db "SELECT title, rom_name, crc FROM roms WHERE platform = 'Sega 32X'"
//! ```

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod parquet;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod session;

pub use catalog::{CatalogFile, RomRecord};
pub use config::{CliArgs, ImportConfig};
pub use db::{CatalogDb, DbConfig, Destination};
pub use error::{IngestError, Result};
pub use pipeline::Strategy;
pub use session::{ImportSession, ResumeDecision, SessionState};
