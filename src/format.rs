//! Human-readable timestamps for decisions.
//!
//! Timestamps are stored in UTC epoch milliseconds; the display offset only changes how they are
//! printed, never what is stored or compared.

use chrono::{DateTime, FixedOffset, Offset, Utc};

const SECONDS_PER_MINUTE: i32 = 60;
// chrono rejects offsets of a full day or more.
const MAX_OFFSET_MINUTES: i32 = 24 * 60 - 1;

/// Formats epoch-millisecond timestamps at a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFormatter {
    offset: FixedOffset,
}

impl Default for TimeFormatter {
    fn default() -> Self {
        Self::utc()
    }
}

impl TimeFormatter {
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Offset east of UTC in minutes (`-180` for UTC-3). `None` if a day or more.
    pub fn with_offset_minutes(minutes: i32) -> Option<Self> {
        if minutes.abs() > MAX_OFFSET_MINUTES {
            return None;
        }
        FixedOffset::east_opt(minutes * SECONDS_PER_MINUTE).map(|offset| Self { offset })
    }

    pub fn offset_minutes(&self) -> i32 {
        self.offset.local_minus_utc() / SECONDS_PER_MINUTE
    }

    /// `HH:MM:SS`.
    pub fn time(&self, millis: u64) -> String {
        self.render(millis, "%H:%M:%S")
    }

    fn render(&self, millis: u64, pattern: &str) -> String {
        let millis = i64::try_from(millis).unwrap_or(i64::MAX);
        match DateTime::<Utc>::from_timestamp_millis(millis) {
            Some(at) => at.with_timezone(&self.offset).format(pattern).to_string(),
            None => format!("@{millis}ms"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2023-11-15T18:30:05Z
    const NOV_15_2023: u64 = 1_700_073_005_000;

    #[test]
    fn utc_time() {
        let fmt = TimeFormatter::utc();
        assert_eq!(fmt.time(NOV_15_2023), "18:30:05");
    }

    #[test]
    fn negative_offset_shifts_display_only() {
        let fmt = TimeFormatter::with_offset_minutes(-180).unwrap();
        assert_eq!(fmt.offset_minutes(), -180);
        assert_eq!(fmt.time(NOV_15_2023), "15:30:05");
    }

    #[test]
    fn rejects_offsets_of_a_day_or_more() {
        assert!(TimeFormatter::with_offset_minutes(24 * 60).is_none());
        assert!(TimeFormatter::with_offset_minutes(-24 * 60).is_none());
        assert!(TimeFormatter::with_offset_minutes(14 * 60).is_some());
    }
}
