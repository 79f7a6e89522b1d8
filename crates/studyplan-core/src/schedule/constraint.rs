use chrono::{Datelike, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::{check_day_of_week, UserId};
use crate::error::ValidationError;

fn check_window(start: NaiveTime, end: NaiveTime) -> Result<(), ValidationError> {
    if start >= end {
        return Err(ValidationError::invalid(
            "end_time",
            format!("end ({end}) must be after start ({start})"),
        ));
    }
    Ok(())
}

/// `[start, end)` overlap of a weekly window with a local interval that may
/// span midnight.
fn weekly_window_overlaps(
    day_of_week: u8,
    start: NaiveTime,
    end: NaiveTime,
    from: NaiveDateTime,
    to: NaiveDateTime,
) -> bool {
    let mut day = from.date();
    while day.and_time(NaiveTime::default()) < to {
        if day.weekday().num_days_from_monday() as u8 == day_of_week {
            let block_start = day.and_time(start);
            let block_end = day.and_time(end);
            if block_start < to && block_end > from {
                return true;
            }
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    false
}

/// A recurring weekly busy time the user entered themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConstraint {
    pub id: i64,
    pub user_id: UserId,
    pub title: String,
    /// 0=Mon ... 6=Sun
    pub day_of_week: u8,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub is_hard: bool,
}

impl UserConstraint {
    pub fn new(
        user_id: UserId,
        title: impl Into<String>,
        day_of_week: u8,
        start: NaiveTime,
        end: NaiveTime,
        is_hard: bool,
    ) -> Result<Self, ValidationError> {
        check_window(start, end)?;
        Ok(Self {
            id: 0,
            user_id,
            title: title.into(),
            day_of_week: check_day_of_week(day_of_week)?,
            start,
            end,
            is_hard,
        })
    }

    /// Whether this block intersects the local interval `[from, to)`.
    pub fn overlaps(&self, from: NaiveDateTime, to: NaiveDateTime) -> bool {
        weekly_window_overlaps(self.day_of_week, self.start, self.end, from, to)
    }
}

/// A recurring class meeting. Always blocking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassBlock {
    pub id: i64,
    pub user_id: UserId,
    pub name: String,
    /// 0=Mon ... 6=Sun
    pub day_of_week: u8,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ClassBlock {
    pub fn new(
        user_id: UserId,
        name: impl Into<String>,
        day_of_week: u8,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<Self, ValidationError> {
        check_window(start, end)?;
        Ok(Self {
            id: 0,
            user_id,
            name: name.into(),
            day_of_week: check_day_of_week(day_of_week)?,
            start,
            end,
        })
    }

    /// Whether this block intersects the local interval `[from, to)`.
    pub fn overlaps(&self, from: NaiveDateTime, to: NaiveDateTime) -> bool {
        weekly_window_overlaps(self.day_of_week, self.start, self.end, from, to)
    }
}
