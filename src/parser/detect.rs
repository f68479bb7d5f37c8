//! DAT dialect detection from the leading bytes of a file

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Number of leading bytes inspected
pub const SNIFF_LEN: usize = 1024;

const XML_MARKERS: &[&str] = &["<?xml", "<datafile", "<mame"];
const CMP_MARKERS: &[&str] = &["clrmamepro", "rom (", "game ("];

/// Detected DAT dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatFormat {
    /// Logiqx XML (`<datafile>`) or MAME XML
    Xml,
    /// ClrMamePro parenthesis-delimited text
    Cmp,
    /// Neither; the file is skipped
    Unknown,
}

impl fmt::Display for DatFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatFormat::Xml => write!(f, "xml"),
            DatFormat::Cmp => write!(f, "cmp"),
            DatFormat::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classify a byte prefix. Invalid UTF-8 is substituted, never an error.
pub fn classify(prefix: &[u8]) -> DatFormat {
    let head = &prefix[..prefix.len().min(SNIFF_LEN)];
    let text = String::from_utf8_lossy(head).to_lowercase();

    if XML_MARKERS.iter().any(|m| text.contains(m)) {
        DatFormat::Xml
    } else if CMP_MARKERS.iter().any(|m| text.contains(m)) {
        DatFormat::Cmp
    } else {
        DatFormat::Unknown
    }
}

/// Detect the dialect of a file by reading at most [`SNIFF_LEN`] bytes
pub fn detect_format(path: &Path) -> io::Result<DatFormat> {
    let file = File::open(path)?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut head)?;
    Ok(classify(&head))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_classify_xml() {
        assert_eq!(classify(b"<?xml version=\"1.0\"?>"), DatFormat::Xml);
        assert_eq!(classify(b"  <DATAFILE>"), DatFormat::Xml);
        assert_eq!(classify(b"<mame build=\"0.250\">"), DatFormat::Xml);
    }

    #[test]
    fn test_classify_cmp() {
        assert_eq!(classify(b"clrmamepro (\n\tname \"x\"\n)"), DatFormat::Cmp);
        assert_eq!(classify(b"GAME (\n name \"a\" )"), DatFormat::Cmp);
    }

    #[test]
    fn test_marker_beyond_sniff_window_is_ignored() {
        let mut data = vec![b' '; SNIFF_LEN];
        data.extend_from_slice(b"<?xml");
        assert_eq!(classify(&data), DatFormat::Unknown);
    }

    #[test]
    fn test_binary_file_is_unknown() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("noise.dat");
        let data: Vec<u8> = (0..1024u32).map(|i| (i * 7 % 251) as u8 | 0x80).collect();
        fs::write(&path, data).unwrap();

        assert_eq!(detect_format(&path).unwrap(), DatFormat::Unknown);
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempdir().unwrap();
        assert!(detect_format(&dir.path().join("missing.dat")).is_err());
    }
}
