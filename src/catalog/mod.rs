//! Catalog data model
//!
//! A catalog file is one DAT description file covering a platform/category.
//! Every file yields zero or more [`RomRecord`]s, the unit of output stored
//! in the destination database.
//!
//! ```text
//!   <input>/<system>/<Platform> - <Category> (TOSEC-v2023-01-01).dat
//!              │          │            │
//!              │          │            └── category ("Standard" if absent)
//!              │          └── platform
//!              └── system (parent directory name)
//! ```

pub mod names;
pub mod scan;

pub use names::{derive_title_year, split_platform_category};
pub use scan::scan_dat_files;

use std::path::{Path, PathBuf};

/// Fallback for names that cannot be derived
pub const UNKNOWN: &str = "Unknown";

/// Category used when the filename has no `" - "` separator
pub const DEFAULT_CATEGORY: &str = "Standard";

/// Status used when a ROM carries none
pub const DEFAULT_STATUS: &str = "good";

/// One catalog file found by the directory scan. Immutable after the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogFile {
    /// Full path to the file
    pub path: PathBuf,

    /// Base filename, used as checkpoint identity
    pub file_name: String,

    /// Parent directory name
    pub system: String,

    /// Segment of the filename before the first `" - "`
    pub platform: String,

    /// Remainder of the filename up to the `(TOSEC` tag
    pub category: String,

    /// File size in bytes at scan time
    pub size: u64,
}

impl CatalogFile {
    /// Build a catalog file from a path with a known size
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let system = path
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string());
        let (platform, category) = split_platform_category(&file_name);

        Self {
            path,
            file_name,
            system,
            platform,
            category,
            size,
        }
    }

    /// Build a catalog file from a path, reading its size from the filesystem
    pub fn from_path(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let size = std::fs::metadata(&path)?.len();
        Ok(Self::new(path, size))
    }
}

/// One normalized ROM row
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RomRecord {
    pub filename: String,
    pub platform: String,
    pub category: String,
    pub game_name: String,
    pub title: String,
    pub release_year: Option<i32>,
    pub description: String,
    pub rom_name: String,

    /// Normalized size in bytes, never negative
    pub size: i64,

    pub crc: String,
    pub md5: String,
    pub sha1: String,
    pub status: String,
    pub system: String,
}

/// Game-level fields shared by every ROM of one game entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameEntry {
    pub name: String,
    pub title: String,
    pub release_year: Option<i32>,
    pub description: String,
}

impl GameEntry {
    /// Build a game entry from its raw name and description
    pub fn new(name: &str, description: &str) -> Self {
        let (title, release_year) = derive_title_year(name);
        Self {
            name: name.to_string(),
            title,
            release_year,
            description: description.to_string(),
        }
    }
}

/// Raw ROM fields as found in either dialect, before normalization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRom {
    pub name: String,
    pub size: Option<String>,
    pub crc: Option<String>,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub status: Option<String>,
}

impl RomRecord {
    /// Assemble a record from its file, game and already-normalized ROM fields
    pub fn assemble(file: &CatalogFile, game: &GameEntry, rom: RawRom, size: i64) -> Self {
        Self {
            filename: file.file_name.clone(),
            platform: file.platform.clone(),
            category: file.category.clone(),
            game_name: game.name.clone(),
            title: game.title.clone(),
            release_year: game.release_year,
            description: game.description.clone(),
            rom_name: rom.name,
            size,
            crc: rom.crc.unwrap_or_default(),
            md5: rom.md5.unwrap_or_default(),
            sha1: rom.sha1.unwrap_or_default(),
            status: rom
                .status
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_STATUS.to_string()),
            system: file.system.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_file_derivation() {
        let file = CatalogFile::new(
            "/data/Commodore/Commodore C64 - Games - [D64] (TOSEC-v2023-01-01_CM).dat",
            42,
        );
        assert_eq!(
            file.file_name,
            "Commodore C64 - Games - [D64] (TOSEC-v2023-01-01_CM).dat"
        );
        assert_eq!(file.system, "Commodore");
        assert_eq!(file.platform, "Commodore C64");
        assert_eq!(file.category, "Games - [D64]");
        assert_eq!(file.size, 42);
    }

    #[test]
    fn test_catalog_file_without_parent() {
        let file = CatalogFile::new("Sega 32X.dat", 0);
        assert_eq!(file.system, UNKNOWN);
        assert_eq!(file.platform, "Sega 32X");
        assert_eq!(file.category, DEFAULT_CATEGORY);
    }

    #[test]
    fn test_assemble_defaults() {
        let file = CatalogFile::new("/x/Atari/Atari 2600 - Games.dat", 0);
        let game = GameEntry::new("Pitfall (1982)(Activision)", "");
        let rom = RawRom {
            name: "pitfall.bin".into(),
            ..Default::default()
        };
        let record = RomRecord::assemble(&file, &game, rom, 4096);

        assert_eq!(record.title, "Pitfall");
        assert_eq!(record.release_year, Some(1982));
        assert_eq!(record.crc, "");
        assert_eq!(record.status, DEFAULT_STATUS);
        assert_eq!(record.system, "Atari");
        assert_eq!(record.size, 4096);
    }
}
