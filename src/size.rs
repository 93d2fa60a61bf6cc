//! Human-readable byte sizes ("5GB", "100MB", "1.5TB").
//!
//! Units are binary: 1 KB = 1024 B.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    /// `<number>[unit]` after trimming and upper-casing. Unit defaults to bytes.
    static ref SIZE_REGEX: Regex = Regex::new(r"^(\d+(?:\.\d+)?)\s*(B|KB|MB|GB|TB)?$").unwrap();
}

const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SizeError {
    #[error("invalid size format: \"{0}\" (use a format like \"5GB\", \"100MB\", \"1.5TB\")")]
    InvalidSizeFormat(String),
    #[error("invalid size value: \"{0}\"")]
    InvalidSizeValue(String),
}

fn multiplier(unit: &str) -> f64 {
    let exp = UNITS.iter().position(|u| *u == unit).unwrap_or(0);
    1024f64.powi(exp as i32)
}

/// Parse a size string into a byte count, flooring fractional bytes.
pub fn parse_size(input: &str) -> Result<u64, SizeError> {
    let normalized = input.trim().to_uppercase();
    let caps = SIZE_REGEX
        .captures(&normalized)
        .ok_or_else(|| SizeError::InvalidSizeFormat(input.to_string()))?;

    let value: f64 = caps[1]
        .parse()
        .map_err(|_| SizeError::InvalidSizeFormat(input.to_string()))?;
    let unit = caps.get(2).map_or("B", |m| m.as_str());

    let bytes = (value * multiplier(unit)).floor();
    if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
        return Err(SizeError::InvalidSizeValue(input.to_string()));
    }
    Ok(bytes as u64)
}

/// Render a byte count with the largest unit whose value is at least 1,
/// rounded to two decimals.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;
    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    let rounded = (size * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit_index])
}

/// clap value parser for size flags.
pub fn parse_size_arg(input: &str) -> Result<u64, String> {
    parse_size(input).map_err(|e| e.to_string())
}
