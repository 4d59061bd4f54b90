//! Time-window resolution: turning region-local dates and times into UTC instants, and deciding
//! which lifecycle phase a batch is in at a given instant.
//!
//! Schedules are anchored to a fixed UTC offset (`+05:30` unless configured otherwise), never to
//! the server's or the client's locale.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// `+05:30`, the offset batch schedules are written in.
pub const DEFAULT_UTC_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// Lifecycle phase of a batch. Derived on every read, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum BatchPhase {
    Upcoming,
    Live,
    Expired,
    Cancelled,
}

impl BatchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchPhase::Upcoming => "Upcoming",
            BatchPhase::Live => "Live",
            BatchPhase::Expired => "Expired",
            BatchPhase::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling policy shared by validation, listing and the credential gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleRules {
    /// Offset in which `date`/`startTime`/`endTime` inputs are interpreted.
    pub offset: FixedOffset,
    /// Shortest allowed batch.
    pub min_duration: Duration,
    /// How close to `endAt` a live batch counts as expiring soon.
    pub expiring_soon_window: Duration,
}

impl Default for ScheduleRules {
    fn default() -> Self {
        Self {
            offset: FixedOffset::east_opt(DEFAULT_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix()),
            min_duration: Duration::minutes(10),
            expiring_soon_window: Duration::minutes(10),
        }
    }
}

impl ScheduleRules {
    /// Interpret `date` + `time` in the configured offset.
    pub fn combine(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        combine(date, time, self.offset)
    }

    /// The local calendar date and wall time of `instant` in the configured offset.
    pub fn local_parts(&self, instant: DateTime<Utc>) -> (NaiveDate, NaiveTime) {
        let local = instant.with_timezone(&self.offset);
        (local.date_naive(), local.time())
    }

    pub fn is_expiring_soon(&self, window: &TimeWindow, is_cancelled: bool, now: DateTime<Utc>) -> bool {
        window.phase(is_cancelled, now) == BatchPhase::Live && window.end_at <= now + self.expiring_soon_window
    }
}

/// Interpret a local date and wall time at a fixed UTC offset, yielding an absolute instant.
pub fn combine(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> DateTime<Utc> {
    let local = date.and_time(time);
    (local - Duration::seconds(i64::from(offset.local_minus_utc()))).and_utc()
}

/// Phase of a batch at `now`. `Cancelled` wins over every temporal state; both window bounds are
/// inclusive for `Live`.
pub fn classify(start_at: DateTime<Utc>, end_at: DateTime<Utc>, is_cancelled: bool, now: DateTime<Utc>) -> BatchPhase {
    if is_cancelled {
        BatchPhase::Cancelled
    } else if now < start_at {
        BatchPhase::Upcoming
    } else if now <= end_at {
        BatchPhase::Live
    } else {
        BatchPhase::Expired
    }
}

/// A resolved `[start_at, end_at)` interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Self {
        Self { start_at, end_at }
    }

    pub fn duration(&self) -> Duration {
        self.end_at - self.start_at
    }

    pub fn phase(&self, is_cancelled: bool, now: DateTime<Utc>) -> BatchPhase {
        classify(self.start_at, self.end_at, is_cancelled, now)
    }

    /// Closed-start/open-end overlap: touching endpoints do not overlap.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start_at < other.end_at && other.start_at < self.end_at
    }
}

/// Parse a strict `YYYY-MM-DD` calendar date.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let bytes = input.as_bytes();
    let shaped = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d").ok()
}

/// Parse a strict 24-hour `HH:mm` wall time.
pub fn parse_time(input: &str) -> Option<NaiveTime> {
    let bytes = input.as_bytes();
    let shaped = bytes.len() == 5
        && bytes.iter().enumerate().all(|(i, b)| match i {
            2 => *b == b':',
            _ => b.is_ascii_digit(),
        });
    if !shaped {
        return None;
    }
    NaiveTime::parse_from_str(input, "%H:%M").ok()
}
