//! Time string parsing utilities.
//!
//! Clip boundaries arrive as `HH:MM:SS[.mmm]` or `MM:SS` strings. Parsing is
//! total: it never fails and maps anything it cannot read to zero, so callers
//! must check the shape with [`is_valid_time_string`] first.

use std::sync::LazyLock;

use regex::Regex;

/// Accepted clip boundary shapes: `MM:SS`, `HH:MM:SS`, optional `.mmm`.
static TIME_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d{1,2}:)?[0-5]?\d:[0-5]\d(?:\.\d{1,3})?$").expect("valid time regex")
});

/// Parse a time string to whole seconds.
///
/// Segments are read right to left as seconds, minutes and hours; each
/// earlier segment is worth sixty of the one after it. Fractional seconds are
/// truncated. Empty input yields `0`, as does any segment that is not a
/// non-negative number.
///
/// # Examples
/// ```
/// use cliptrim_models::timestamp::parse_time_to_seconds;
/// assert_eq!(parse_time_to_seconds("00:03:01"), 181);
/// assert_eq!(parse_time_to_seconds("04:05"), 245);
/// assert_eq!(parse_time_to_seconds(""), 0);
/// ```
pub fn parse_time_to_seconds(text: &str) -> u64 {
    let text = text.trim();
    if text.is_empty() {
        return 0;
    }

    text.split(':')
        .fold(0u64, |acc, segment| acc.saturating_mul(60).saturating_add(segment_seconds(segment)))
}

fn segment_seconds(segment: &str) -> u64 {
    segment
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.trunc() as u64)
        .unwrap_or(0)
}

/// Clip duration in seconds (`end - start`). May be zero or negative; the
/// caller rejects anything that is not strictly positive.
pub fn compute_duration(start: &str, end: &str) -> i64 {
    let start = parse_time_to_seconds(start) as i128;
    let end = parse_time_to_seconds(end) as i128;
    (end - start).clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Check that a string has one of the accepted time shapes.
pub fn is_valid_time_string(text: &str) -> bool {
    TIME_STRING.is_match(text.trim())
}

/// Format seconds as `HH:MM:SS`.
pub fn format_seconds(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    format!("{:02}:{:02}:{:02}", hours, mins, secs)
}
