//! Timestamp parsing and month arithmetic shared by the query and store layers.
//!
//! Stored and requested timestamps are wall-clock values in the site
//! timezone. Inputs carrying an explicit offset (RFC 3339) are converted into
//! that timezone before the offset is dropped.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::error::AlmanacError;

/// Naive formats accepted for full timestamps, most common first.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// A parsed timestamp input, remembering whether a time of day was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Timestamp {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Timestamp {
    /// Parse a timestamp string, interpreting offsets relative to `tz`.
    ///
    /// Returns `None` for anything that is not a recognized format.
    pub(crate) fn parse(s: &str, tz: &Tz) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(Timestamp::DateTime(dt.with_timezone(tz).naive_local()));
        }

        for format in DATETIME_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                return Some(Timestamp::DateTime(naive));
            }
        }

        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .map(Timestamp::Date)
    }

    /// Bare dates resolve to midnight.
    pub(crate) fn start_of_day(self) -> NaiveDateTime {
        match self {
            Timestamp::Date(date) => date.and_time(NaiveTime::MIN),
            Timestamp::DateTime(dt) => dt,
        }
    }

    /// Bare dates resolve to the last second of the day.
    pub(crate) fn end_of_day(self) -> NaiveDateTime {
        match self {
            Timestamp::Date(date) => date.and_time(last_second()),
            Timestamp::DateTime(dt) => dt,
        }
    }

    /// Bare dates resolve to the following midnight, for half-open ranges.
    pub(crate) fn exclusive_end(self) -> Option<NaiveDateTime> {
        match self {
            Timestamp::Date(date) => date.succ_opt().map(|d| d.and_time(NaiveTime::MIN)),
            Timestamp::DateTime(dt) => Some(dt),
        }
    }
}

fn last_second() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

// ── Months ──────────────────────────────────────────────────────────────────

/// Parse a strict `YYYY-MM` year-month string.
pub(crate) fn parse_year_month(s: &str) -> Option<(i32, u32)> {
    let (year, month) = s.trim().split_once('-')?;
    if year.len() != 4 || month.len() != 2 {
        return None;
    }
    if !year.bytes().all(|b| b.is_ascii_digit()) || !month.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    (1..=12).contains(&month).then_some((year, month))
}

/// Midnight on the first day of the given month.
pub(crate) fn first_of_month(year: i32, month: u32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, 1).map(|d| d.and_time(NaiveTime::MIN))
}

/// Midnight on the first day of the month after the given one.
pub(crate) fn first_of_next_month(year: i32, month: u32) -> Option<NaiveDateTime> {
    let (y, m) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    first_of_month(y, m)
}

/// Midnight on the first day of the month containing `dt`.
pub(crate) fn month_start_of(dt: NaiveDateTime) -> Option<NaiveDateTime> {
    first_of_month(dt.year(), dt.month())
}

/// Midnight on the first day of the month after the one containing `dt`.
pub(crate) fn month_end_of(dt: NaiveDateTime) -> Option<NaiveDateTime> {
    first_of_next_month(dt.year(), dt.month())
}

// ── Timezones ───────────────────────────────────────────────────────────────

/// Parse an IANA timezone string into `Tz`.
pub(crate) fn parse_timezone(s: &str) -> Result<Tz, AlmanacError> {
    s.parse::<Tz>()
        .map_err(|_| AlmanacError::InvalidParameter(format!("unknown timezone '{s}'")))
}

/// The current wall-clock time in `tz`.
pub(crate) fn now_in(tz: &Tz) -> NaiveDateTime {
    Utc::now().with_timezone(tz).naive_local()
}
