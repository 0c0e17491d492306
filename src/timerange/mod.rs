//! Timestamp parsing for clip boundaries.
//!
//! Accepts `SS`, `MM:SS` and `HH:MM:SS`. Components are plain non-negative
//! integers and are not range-checked against each other, so `"90"` and
//! `"01:30"` both mean ninety seconds.

use std::fmt;
use std::time::Duration;

use crate::ClipError;

/// A validated clip window: where it starts and how long it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Offset from the start of the stream
    pub start: Duration,

    /// Length of the clip, always greater than zero
    pub length: Duration,
}

impl TimeRange {
    /// Exclusive end offset of the window
    pub fn end(&self) -> Duration {
        self.start + self.length
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            format_timestamp(self.start),
            format_timestamp(self.end())
        )
    }
}

/// Parse a single `SS`, `MM:SS` or `HH:MM:SS` timestamp
pub fn parse(text: &str) -> Result<Duration, ClipError> {
    let malformed = || ClipError::MalformedTimestamp(text.to_string());

    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(malformed());
    }

    let mut seconds: u64 = 0;
    for part in &parts {
        // u64::from_str accepts a leading '+', which is not a timestamp digit
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let value: u64 = part.parse().map_err(|_| malformed())?;
        seconds = seconds
            .checked_mul(60)
            .and_then(|s| s.checked_add(value))
            .ok_or_else(malformed)?;
    }

    Ok(Duration::from_secs(seconds))
}

/// Parse both endpoints and build a [`TimeRange`], rejecting empty or inverted windows
pub fn to_duration(start_text: &str, end_text: &str) -> Result<TimeRange, ClipError> {
    let start = parse(start_text)?;
    let end = parse(end_text)?;

    if end <= start {
        return Err(ClipError::InvalidRange {
            start: start_text.to_string(),
            end: end_text.to_string(),
        });
    }

    Ok(TimeRange {
        start,
        length: end - start,
    })
}

/// Render a duration as `HH:MM:SS`
pub fn format_timestamp(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}
