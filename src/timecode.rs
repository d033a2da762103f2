//! Timecode normalization for marker export
//!
//! Marker timecodes arrive either as a number of seconds or as an
//! `HH:MM:SS[:FF]` string. Frames are always counted at 25 fps.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::types::TimeFormat;

/// Fixed frame rate used for frame display
pub const FRAMES_PER_SECOND: u32 = 25;

/// Marker fields holding timecodes
pub const TIMECODE_FIELDS: [&str; 3] = ["tcrIn", "tcrOut", "duration"];

// Absorbs float noise such as 0.28 * 25 = 6.999999999
const FRAME_EPSILON: f64 = 1e-6;

fn timecode_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9]{2}:[0-9]{2}:[0-9]{2}(:[0-9]{2})?$")
            .expect("timecode pattern is valid")
    })
}

/// True when `text` is already `HH:MM:SS` or `HH:MM:SS:FF`
pub fn is_timecode(text: &str) -> bool {
    timecode_pattern().is_match(text)
}

pub fn is_timecode_field(field: &str) -> bool {
    TIMECODE_FIELDS.contains(&field)
}

/// Format a non-negative number of seconds
///
/// Returns `None` for negative or non-finite input.
pub fn format_seconds(seconds: f64, format: TimeFormat) -> Option<String> {
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }

    let whole = seconds.floor();
    let total = whole as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    match format {
        TimeFormat::Seconds => Some(format!("{:02}:{:02}:{:02}", hours, minutes, secs)),
        TimeFormat::Frames => {
            let frames = ((seconds - whole) * FRAMES_PER_SECOND as f64 + FRAME_EPSILON).floor()
                as u32;
            let frames = frames.min(FRAMES_PER_SECOND - 1);
            Some(format!(
                "{:02}:{:02}:{:02}:{:02}",
                hours, minutes, secs, frames
            ))
        }
    }
}

/// Normalize a timecode cell to the requested display format
///
/// Unparseable values become an empty string.
pub fn normalize_timecode(value: &Value, format: TimeFormat) -> String {
    match value {
        Value::Number(n) => n
            .as_f64()
            .and_then(|seconds| format_seconds(seconds, format))
            .unwrap_or_default(),
        Value::String(s) => normalize_timecode_text(s, format),
        _ => String::new(),
    }
}

fn normalize_timecode_text(text: &str, format: TimeFormat) -> String {
    let text = text.trim();
    if is_timecode(text) {
        return match format {
            TimeFormat::Seconds => text.get(..8).unwrap_or_default().to_string(),
            TimeFormat::Frames => text.to_string(),
        };
    }

    text.parse::<f64>()
        .ok()
        .and_then(|seconds| format_seconds(seconds, format))
        .unwrap_or_default()
}

/// Parse `HH:MM:SS`, `HH:MM:SS.mmm` or `HH:MM:SS:FF` into seconds
pub fn parse_timecode(text: &str) -> Option<f64> {
    let parts: Vec<&str> = text.trim().split(':').collect();

    match parts.as_slice() {
        [h, m, s] => Some(number(h)?.trunc() * 3600.0 + number(m)?.trunc() * 60.0 + number(s)?),
        [h, m, s, f] => Some(
            number(h)? * 3600.0
                + number(m)? * 60.0
                + number(s)?
                + number(f)? / FRAMES_PER_SECOND as f64,
        ),
        _ => None,
    }
}

fn number(part: &str) -> Option<f64> {
    part.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}
