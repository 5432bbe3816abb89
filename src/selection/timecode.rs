//! Timecode text parsing and formatting for the selection fields.

/// Parse `H:MM:SS`, `MM:SS` or `SS` into seconds.
///
/// Only the last component may carry a fraction; hours and minutes must be
/// plain digit runs. Any other shape yields `None`.
pub fn parse_timecode(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let parts: Vec<&str> = text.split(':').collect();
    let (whole, last) = match parts.as_slice() {
        [seconds] => (&[][..], *seconds),
        [rest @ .., seconds] if rest.len() <= 2 => (rest, *seconds),
        _ => return None,
    };
    let seconds = parse_seconds(last)?;
    if whole.is_empty() {
        return Some(seconds);
    }
    let mut total = 0.0;
    for part in whole {
        total = total * 60.0 + parse_whole(part)?;
    }
    if seconds < 0.0 {
        return None;
    }
    Some(total * 60.0 + seconds)
}

/// Render seconds as `HH:MM:SS`, flooring to whole seconds.
///
/// Negative, NaN and infinite inputs render as `00:00:00`. Hours grow past two
/// digits instead of wrapping.
pub fn format_timecode(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "00:00:00".to_string();
    }
    let total = seconds.floor() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

/// Re-render a field in canonical form when it parses; otherwise keep the text.
pub fn normalize_timecode_text(text: &str) -> String {
    match parse_timecode(text) {
        Some(seconds) => format_timecode(seconds),
        None => text.to_string(),
    }
}

fn parse_whole(part: &str) -> Option<f64> {
    if part.is_empty() || !part.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    part.parse::<u64>().ok().map(|value| value as f64)
}

fn parse_seconds(part: &str) -> Option<f64> {
    let valid_chars = part
        .bytes()
        .all(|byte| byte.is_ascii_digit() || byte == b'.' || byte == b'-' || byte == b'+');
    if part.is_empty() || !valid_chars {
        return None;
    }
    part.parse::<f64>().ok().filter(|value| value.is_finite())
}
