//! Stateless UTC <-> user-local mapping.
//!
//! Storage is always UTC; the scheduler reasons about the user's wall clock
//! (preferred times of day, weekly busy blocks, "due today").

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::ValidationError;

/// A user's timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserClock {
    tz: Tz,
}

impl UserClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn utc() -> Self {
        Self { tz: Tz::UTC }
    }

    /// Parse an IANA name, falling back to UTC for unknown zones.
    pub fn parse(name: &str) -> Self {
        match name.parse::<Tz>() {
            Ok(tz) => Self { tz },
            Err(_) => {
                tracing::warn!(timezone = name, "unknown timezone, falling back to UTC");
                Self::utc()
            }
        }
    }

    /// Strict variant of [`parse`](Self::parse) for user input.
    pub fn try_parse(name: &str) -> Result<Self, ValidationError> {
        name.parse::<Tz>()
            .map(Self::new)
            .map_err(|_| ValidationError::invalid("timezone", format!("unknown timezone '{name}'")))
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Wall-clock time for a UTC instant.
    pub fn to_local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.tz).naive_local()
    }

    /// UTC instant for a wall-clock time.
    ///
    /// Ambiguous times (DST fall-back) take the earlier mapping; times inside
    /// a DST gap are shifted forward one hour.
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        match self.tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
            LocalResult::None => {
                let shifted = local + Duration::hours(1);
                match self.tz.from_local_datetime(&shifted) {
                    LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
                    LocalResult::None => Utc.from_utc_datetime(&local),
                }
            }
        }
    }

    /// Whether the wall-clock span `[start, start + minutes)` really lasts
    /// `minutes`. False when either end falls in a DST gap or the span
    /// crosses a DST transition.
    pub fn spans_exactly(&self, start: NaiveDateTime, minutes: u32) -> bool {
        let end = start + Duration::minutes(i64::from(minutes));
        let exists = |local: &NaiveDateTime| !matches!(self.tz.from_local_datetime(local), LocalResult::None);
        exists(&start) && exists(&end) && self.to_utc(end) - self.to_utc(start) == end - start
    }

    /// The user's calendar date at `now`.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.to_local(now).date()
    }

    /// UTC instant of the user's local midnight starting `date`.
    pub fn local_midnight_utc(&self, date: NaiveDate) -> DateTime<Utc> {
        self.to_utc(date.and_time(NaiveTime::default()))
    }

    /// UTC bounds `[start, end)` covering local dates `first..=last`.
    pub fn range_utc(&self, first: NaiveDate, last: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let end_date = last.succ_opt().unwrap_or(last);
        (self.local_midnight_utc(first), self.local_midnight_utc(end_date))
    }
}

impl Default for UserClock {
    fn default() -> Self {
        Self::utc()
    }
}
