//! Time ranges for CalDAV filters.
//!
//! CalDAV `time-range` and `expand` elements carry UTC timestamps in the
//! iCalendar basic format (`YYYYMMDDTHHMMSSZ`). [`TimeRange`] holds a
//! half-open `[start, end)` window and knows how to render both bounds.

use chrono::{DateTime, Months, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format used by CalDAV for UTC date-times.
pub const CALDAV_DATETIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Formats a datetime for CalDAV time-range filters (UTC, basic format).
pub fn format_caldav_datetime(dt: DateTime<Utc>) -> String {
    dt.format(CALDAV_DATETIME_FORMAT).to_string()
}

/// Parses a CalDAV UTC timestamp such as `20250205T143000Z`.
pub fn parse_caldav_datetime(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), CALDAV_DATETIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// A half-open `[start, end)` query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start of the window.
    pub start: DateTime<Utc>,
    /// Exclusive end of the window.
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Months looked behind and ahead by [`TimeRange::default_window`].
    pub const DEFAULT_WINDOW_MONTHS: u32 = 6;

    /// Creates a new time range.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The window used when a query does not name one: six months either
    /// side of `now`.
    pub fn default_window(now: DateTime<Utc>) -> Self {
        let months = Months::new(Self::DEFAULT_WINDOW_MONTHS);
        // Saturates at the chrono bounds.
        let start = now.checked_sub_months(months).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let end = now.checked_add_months(months).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { start, end }
    }

    /// The default window around the current time.
    pub fn around_now() -> Self {
        Self::default_window(Utc::now())
    }

    /// Returns the start bound formatted for CalDAV.
    pub fn start_str(&self) -> String {
        format_caldav_datetime(self.start)
    }

    /// Returns the end bound formatted for CalDAV.
    pub fn end_str(&self) -> String {
        format_caldav_datetime(self.end)
    }

    /// Returns true if `dt` falls inside the window.
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        dt >= self.start && dt < self.end
    }
}
