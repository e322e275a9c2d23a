//! UTC day arithmetic and the injectable notion of "today".
//!
//! # Invariants
//! - Stored dates are epoch milliseconds of UTC midnight.
//! - "today" is always evaluated at the moment a caller asks, never cached.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// Source of the current UTC calendar day.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Wall-clock implementation backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        normalized_utc_date_for_today()
    }
}

/// Returns the current date truncated to midnight UTC.
pub fn normalized_utc_date_for_today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Converts a calendar day to epoch milliseconds at UTC midnight.
pub fn to_epoch_millis(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Converts epoch milliseconds to the UTC calendar day containing them.
///
/// Returns `None` when the value is outside chrono's representable range.
pub fn from_epoch_millis(millis: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(millis).map(|value| value.date_naive())
}
