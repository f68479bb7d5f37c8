//! Size token normalization
//!
//! DAT files carry sizes as plain decimals, hex (`0x1F`, `$1F`) or
//! unit-suffixed strings (`1kb`, `10 MB`, `2g`). Everything is normalized to
//! a byte count.

use crate::error::SizeError;
use regex::Regex;
use std::sync::LazyLock;

static DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("valid digits regex"));

const KIB: i64 = 1024;
const MIB: i64 = 1024 * 1024;
const GIB: i64 = 1024 * 1024 * 1024;

/// Normalize a raw size token into a byte count.
///
/// Absent or blank tokens normalize to 0.
pub fn normalize_size(raw: Option<&str>) -> Result<i64, SizeError> {
    let token = match raw {
        Some(s) => s.trim().to_lowercase(),
        None => return Ok(0),
    };
    if token.is_empty() {
        return Ok(0);
    }

    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix('$')) {
        return parse_hex(hex, &token);
    }

    let multiplier = unit_multiplier(&token);
    let digits = DIGITS_RE
        .find(&token)
        .ok_or_else(|| SizeError::UnparsableSize(token.clone()))?;

    digits
        .as_str()
        .parse::<i64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| SizeError::UnparsableSize(token.clone()))
}

fn parse_hex(hex: &str, token: &str) -> Result<i64, SizeError> {
    let hex = hex.trim();
    if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(SizeError::InvalidSizeFormat(token.to_string()));
    }
    i64::from_str_radix(hex, 16).map_err(|_| SizeError::UnparsableSize(token.to_string()))
}

fn has_unit(token: &str, unit: char) -> bool {
    token.contains(&format!("{unit}b"))
        || token.contains(&format!("{unit} "))
        || token.ends_with(unit)
}

fn unit_multiplier(token: &str) -> i64 {
    if has_unit(token, 'k') {
        KIB
    } else if has_unit(token, 'm') {
        MIB
    } else if has_unit(token, 'g') {
        GIB
    } else {
        1
    }
}
