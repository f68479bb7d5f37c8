//! Database schema definitions and creation
//!
//! This module defines the SQLite schema for storing ROM records, the
//! checkpoint table of processed catalog files, and run metadata.

use crate::error::DbResult;
use rusqlite::Connection;

/// Current schema version for migrations
pub const SCHEMA_VERSION: u32 = 1;

/// SQL to create the main ROM table
const CREATE_ROMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS roms (
    id INTEGER PRIMARY KEY,
    filename TEXT NOT NULL,       -- source catalog file (base name)
    platform TEXT NOT NULL,
    category TEXT NOT NULL,
    game_name TEXT NOT NULL,
    title TEXT NOT NULL,
    release_year INTEGER,         -- NULL when the name carries no (YYYY)
    description TEXT NOT NULL,
    rom_name TEXT NOT NULL,
    size INTEGER NOT NULL,        -- bytes
    crc TEXT NOT NULL,
    md5 TEXT NOT NULL,
    sha1 TEXT NOT NULL,
    status TEXT NOT NULL,
    system TEXT NOT NULL
)
"#;

/// SQL to create the checkpoint table
const CREATE_PROCESSED_FILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS processed_files (
    filename TEXT PRIMARY KEY,
    processed_at TEXT NOT NULL    -- RFC 3339
)
"#;

/// SQL to create the metadata table
const CREATE_METADATA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS db_metadata (
    key TEXT PRIMARY KEY,
    value TEXT
)
"#;

/// SQL to create indexes for common lookups
const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_roms_rom_name ON roms(rom_name)",
    "CREATE INDEX IF NOT EXISTS idx_roms_crc ON roms(crc)",
    "CREATE INDEX IF NOT EXISTS idx_roms_md5 ON roms(md5)",
    "CREATE INDEX IF NOT EXISTS idx_roms_sha1 ON roms(sha1)",
    "CREATE INDEX IF NOT EXISTS idx_roms_filename ON roms(filename)",
];

/// Insert statement shared by every write path
pub const INSERT_ROM: &str = "INSERT INTO roms (filename, platform, category, game_name, title, release_year, description, rom_name, size, crc, md5, sha1, status, system)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)";

/// Select statement in schema column order
pub const SELECT_ROMS: &str = "SELECT filename, platform, category, game_name, title, release_year, description, rom_name, size, crc, md5, sha1, status, system
     FROM roms ORDER BY id";

/// SQLite pragmas for write throughput
const WRITE_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA cache_size = -128000;     -- 128MB cache
PRAGMA temp_store = MEMORY;
PRAGMA mmap_size = 536870912;    -- 512MB mmap
PRAGMA wal_autocheckpoint = 10000;
"#;

/// Durable commits (default)
const SAFE_SYNC: &str = "PRAGMA synchronous = FULL;";

/// Turbo mode: commits are not fsynced
const TURBO_SYNC: &str = "PRAGMA synchronous = OFF;";

/// Apply write pragmas. `turbo` trades durability for speed.
pub fn apply_write_pragmas(conn: &Connection, turbo: bool) -> DbResult<()> {
    conn.execute_batch(WRITE_PRAGMAS)?;
    conn.execute_batch(if turbo { TURBO_SYNC } else { SAFE_SYNC })?;
    Ok(())
}

/// Create tables if they do not exist yet
pub fn create_schema(conn: &Connection) -> DbResult<()> {
    conn.execute(CREATE_ROMS_TABLE, [])?;
    conn.execute(CREATE_PROCESSED_FILES_TABLE, [])?;
    conn.execute(CREATE_METADATA_TABLE, [])?;
    Ok(())
}

/// Create indexes (called after a run for better insert performance)
pub fn create_indexes(conn: &Connection) -> DbResult<()> {
    for sql in CREATE_INDEXES {
        conn.execute(sql, [])?;
    }
    Ok(())
}

/// Restore durable settings and refresh planner statistics
pub fn optimize_for_reads(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(SAFE_SYNC)?;
    conn.execute("ANALYZE", [])?;
    Ok(())
}

/// Store a metadata value
pub fn set_metadata(conn: &Connection, key: &str, value: &str) -> DbResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO db_metadata (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// Get a metadata value
pub fn get_metadata(conn: &Connection, key: &str) -> DbResult<Option<String>> {
    let result = conn.query_row(
        "SELECT value FROM db_metadata WHERE key = ?1",
        [key],
        |row| row.get(0),
    );

    match result {
        Ok(value) => Ok(value),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Metadata keys used by the importer
pub mod keys {
    /// Dataset version tag (`TOSEC-vYYYY-MM-DD` or `Unknown`)
    pub const TOSEC_VERSION: &str = "tosec_version";

    /// Schema version
    pub const SCHEMA_VERSION: &str = "schema_version";

    /// Importer version
    pub const IMPORTER_VERSION: &str = "importer_version";

    /// Run status: "running", "completed", "aborted"
    pub const STATUS: &str = "status";

    /// Strategy of the last run
    pub const STRATEGY: &str = "strategy";

    /// Timestamp of the last run (RFC 3339)
    pub const LAST_RUN_AT: &str = "last_run_at";

    /// Total ROM rows after the last run
    pub const TOTAL_ROMS: &str = "total_roms";
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn table_count(conn: &Connection, name: &str) -> i32 {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [name],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_create_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_write_pragmas(&conn, false).unwrap();
        create_schema(&conn).unwrap();

        assert_eq!(table_count(&conn, "roms"), 1);
        assert_eq!(table_count(&conn, "processed_files"), 1);
        assert_eq!(table_count(&conn, "db_metadata"), 1);

        // Idempotent
        create_schema(&conn).unwrap();
    }

    #[test]
    fn test_metadata() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();

        set_metadata(&conn, keys::TOSEC_VERSION, "TOSEC-v2023-01-01").unwrap();
        assert_eq!(
            get_metadata(&conn, keys::TOSEC_VERSION).unwrap(),
            Some("TOSEC-v2023-01-01".to_string())
        );

        set_metadata(&conn, keys::TOSEC_VERSION, "TOSEC-v2024-01-01").unwrap();
        assert_eq!(
            get_metadata(&conn, keys::TOSEC_VERSION).unwrap(),
            Some("TOSEC-v2024-01-01".to_string())
        );

        assert_eq!(get_metadata(&conn, "nonexistent").unwrap(), None);
    }

    #[test]
    fn test_create_indexes() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        create_indexes(&conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name LIKE 'idx_roms_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 5);
    }
}
