//! Recursive directory scan for catalog files

use super::CatalogFile;
use crate::error::{ConfigError, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Catalog file extension, matched case-insensitively
const DAT_PATTERN: &str = "*.dat";

/// Recursively collect every `*.dat` file under `root`, sorted by path.
///
/// Entries that cannot be read are logged and skipped. Files sharing a base
/// name with another file are kept but warned about, since the base name is
/// the checkpoint identity.
pub fn scan_dat_files(root: &Path) -> Result<Vec<CatalogFile>> {
    if !root.is_dir() {
        return Err(ConfigError::InvalidInput {
            path: root.to_path_buf(),
            reason: "not a directory".into(),
        }
        .into());
    }

    let pattern = glob::Pattern::new(DAT_PATTERN).expect("valid dat pattern");
    let options = glob::MatchOptions {
        case_sensitive: false,
        ..Default::default()
    };

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| pattern.matches_with(name, options));
        if !matches {
            continue;
        }

        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Cannot stat catalog file");
                0
            }
        };
        files.push(CatalogFile::new(entry.into_path(), size));
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    warn_duplicate_names(&files);
    debug!(count = files.len(), root = %root.display(), "Scan complete");

    Ok(files)
}

fn warn_duplicate_names(files: &[CatalogFile]) {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for file in files {
        *seen.entry(file.file_name.as_str()).or_default() += 1;
    }
    for (name, count) in seen.into_iter().filter(|(_, c)| *c > 1) {
        warn!(
            file = name,
            count, "Duplicate catalog filename in different directories; they share one checkpoint entry"
        );
    }
}

/// Total size in bytes of a file list
pub fn total_bytes(files: &[CatalogFile]) -> u64 {
    files.iter().map(|f| f.size).sum()
}
