//! Name helpers shared by both DAT dialects

use super::{DEFAULT_CATEGORY, UNKNOWN};
use regex::Regex;
use std::sync::LazyLock;

/// Text before the first `(`
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)(\s*\(|$)").expect("valid title regex"));

/// First four-digit parenthesized token
static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d{4})\)").expect("valid year regex"));

/// Split a game name into its title and optional release year.
///
/// An empty name yields `("Unknown", None)`.
pub fn derive_title_year(name: &str) -> (String, Option<i32>) {
    if name.is_empty() {
        return (UNKNOWN.to_string(), None);
    }

    let title = TITLE_RE
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| name.trim().to_string());

    let year = YEAR_RE
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok());

    (title, year)
}

/// Derive platform and category from a catalog filename
pub fn split_platform_category(file_name: &str) -> (String, String) {
    let stem = match file_name.rfind('.') {
        Some(idx) => &file_name[..idx],
        None => file_name,
    };
    let clean = match stem.find("(TOSEC") {
        Some(idx) => stem[..idx].trim(),
        None => stem,
    };

    match clean.split_once(" - ") {
        Some((platform, category)) => {
            let category = category.trim();
            let category = if category.is_empty() {
                DEFAULT_CATEGORY
            } else {
                category
            };
            (platform.trim().to_string(), category.to_string())
        }
        None => (clean.trim().to_string(), DEFAULT_CATEGORY.to_string()),
    }
}
