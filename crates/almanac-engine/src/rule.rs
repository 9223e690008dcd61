//! Recurrence frequencies and date stepping.
//!
//! Monthly and yearly steps clamp to the last day of a shorter target month:
//! a series starting on Jan 31 falls on Feb 28 (Feb 29 in leap years), and a
//! Feb 29 yearly series falls on Feb 28 in non-leap years. Clamping is always
//! computed from the series anchor, so a clamped step never shifts later ones
//! (Jan 31, Feb 28, Mar 31, Apr 30, ...).

use std::fmt;
use std::str::FromStr;

use chrono::{Days, Months, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::AlmanacError;

/// How often an event repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// A single, non-recurring event.
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn is_recurring(self) -> bool {
        self != Frequency::None
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::None => "none",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
        }
    }

    /// The next occurrence after `from`, or `None` for non-recurring events
    /// and on overflow.
    pub fn next(self, from: NaiveDateTime) -> Option<NaiveDateTime> {
        self.nth(from, 1)
    }

    /// The `n`-th step of a series anchored at `anchor`; step 0 is the anchor
    /// itself.
    ///
    /// Returns `None` when `n > 0` for a non-recurring event, or when the
    /// result falls outside chrono's representable range.
    pub fn nth(self, anchor: NaiveDateTime, n: u32) -> Option<NaiveDateTime> {
        if n == 0 {
            return Some(anchor);
        }
        match self {
            Frequency::None => None,
            Frequency::Daily => anchor.checked_add_days(Days::new(u64::from(n))),
            Frequency::Weekly => anchor.checked_add_days(Days::new(7 * u64::from(n))),
            // chrono clamps the day-of-month to the target month's length.
            Frequency::Monthly => anchor.checked_add_months(Months::new(n)),
            Frequency::Yearly => anchor.checked_add_months(Months::new(n.checked_mul(12)?)),
        }
    }

    /// Fixed step length in days, for frequencies that have one.
    pub(crate) fn fixed_days(self) -> Option<i64> {
        match self {
            Frequency::Daily => Some(1),
            Frequency::Weekly => Some(7),
            _ => None,
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = AlmanacError;

    /// Case-insensitive. An empty string is an unset field and means `none`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Frequency::None),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "yearly" => Ok(Frequency::Yearly),
            other => Err(AlmanacError::InvalidDefinition(format!(
                "unknown frequency '{other}'"
            ))),
        }
    }
}
