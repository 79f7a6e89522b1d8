use serde::{Deserialize, Serialize};

use super::UserId;
use crate::error::ValidationError;

/// Named part of the day a user may prefer to study in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    /// 05:00 - 11:59
    Morning,
    /// 12:00 - 16:59
    Afternoon,
    /// 17:00 - 21:59
    Evening,
    /// 22:00 - 04:59, wrapping past midnight
    Night,
}

impl TimeOfDay {
    pub const ALL: [TimeOfDay; 4] = [
        TimeOfDay::Morning,
        TimeOfDay::Afternoon,
        TimeOfDay::Evening,
        TimeOfDay::Night,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }

    /// Inclusive `(start_hour, end_hour)`; `start > end` means the range wraps.
    pub fn hour_range(&self) -> (u32, u32) {
        match self {
            TimeOfDay::Morning => (5, 11),
            TimeOfDay::Afternoon => (12, 16),
            TimeOfDay::Evening => (17, 21),
            TimeOfDay::Night => (22, 4),
        }
    }

    /// Hours of a single calendar date covered by this window.
    ///
    /// Night yields 22-23 and 0-4 of the same date.
    pub fn hours(&self) -> Vec<u32> {
        let (start, end) = self.hour_range();
        if start <= end {
            (start..=end).collect()
        } else {
            (start..24).chain(0..=end).collect()
        }
    }
}

/// Which parts of the day the user is willing to study in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreferredTimes {
    #[serde(default)]
    pub morning: bool,
    #[serde(default)]
    pub afternoon: bool,
    #[serde(default)]
    pub evening: bool,
    #[serde(default)]
    pub night: bool,
}

impl Default for PreferredTimes {
    /// Evening only.
    fn default() -> Self {
        Self {
            morning: false,
            afternoon: false,
            evening: true,
            night: false,
        }
    }
}

impl PreferredTimes {
    /// Parse the stored JSON map, falling back to evening-only on bad data.
    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str::<PreferredTimes>(raw) {
            Ok(times) => times,
            Err(err) => {
                tracing::warn!(error = %err, "malformed preferred times, using evening-only default");
                Self::default()
            }
        }
    }

    pub fn to_json(&self) -> String {
        // Plain bool struct, serialization cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn is_enabled(&self, part: TimeOfDay) -> bool {
        match part {
            TimeOfDay::Morning => self.morning,
            TimeOfDay::Afternoon => self.afternoon,
            TimeOfDay::Evening => self.evening,
            TimeOfDay::Night => self.night,
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = TimeOfDay> + '_ {
        TimeOfDay::ALL.into_iter().filter(|p| self.is_enabled(*p))
    }

    /// Build from a comma-separated list such as `morning,evening`.
    pub fn parse_list(list: &str) -> Result<Self, ValidationError> {
        let mut times = PreferredTimes {
            morning: false,
            afternoon: false,
            evening: false,
            night: false,
        };
        for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part {
                "morning" => times.morning = true,
                "afternoon" => times.afternoon = true,
                "evening" => times.evening = true,
                "night" => times.night = true,
                other => {
                    return Err(ValidationError::invalid(
                        "preferred_times",
                        format!("unknown time of day '{other}'"),
                    ))
                }
            }
        }
        Ok(times)
    }
}

/// The scheduling-relevant part of a user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    /// Weekly study-hour quota.
    pub weekly_hours: u32,
    /// IANA timezone name.
    pub timezone: String,
    pub preferred_times: PreferredTimes,
}

impl UserProfile {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            weekly_hours: 10,
            timezone: "UTC".to_string(),
            preferred_times: PreferredTimes::default(),
        }
    }
}

/// Per-user study habits. Always fully populated; absent rows use
/// [`StudyPreference::default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyPreference {
    #[serde(default = "default_max_consecutive_hours")]
    pub max_consecutive_hours: u32,
    /// Minutes of rest after each session.
    #[serde(default = "default_break_duration")]
    pub break_duration: u32,
    /// Minutes per regular session.
    #[serde(default = "default_session_length")]
    pub preferred_session_length: u32,
    #[serde(default = "default_true")]
    pub weekend_study: bool,
    /// Minutes after a session's end before it is marked missed.
    #[serde(default = "default_grace_minutes")]
    pub grace_minutes: u32,
    #[serde(default = "default_days_per_week")]
    pub days_per_week: u32,
}

fn default_max_consecutive_hours() -> u32 {
    2
}
fn default_break_duration() -> u32 {
    15
}
fn default_session_length() -> u32 {
    60
}
fn default_true() -> bool {
    true
}
fn default_grace_minutes() -> u32 {
    30
}
fn default_days_per_week() -> u32 {
    5
}

impl Default for StudyPreference {
    fn default() -> Self {
        Self {
            max_consecutive_hours: default_max_consecutive_hours(),
            break_duration: default_break_duration(),
            preferred_session_length: default_session_length(),
            weekend_study: default_true(),
            grace_minutes: default_grace_minutes(),
            days_per_week: default_days_per_week(),
        }
    }
}

impl StudyPreference {
    /// Reject values the scheduler cannot work with.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.preferred_session_length == 0 {
            return Err(ValidationError::invalid(
                "preferred_session_length",
                "must be at least 1 minute",
            ));
        }
        if self.max_consecutive_hours == 0 {
            return Err(ValidationError::invalid(
                "max_consecutive_hours",
                "must be at least 1 hour",
            ));
        }
        if !(1..=7).contains(&self.days_per_week) {
            return Err(ValidationError::invalid(
                "days_per_week",
                format!("must be between 1 and 7, got {}", self.days_per_week),
            ));
        }
        Ok(())
    }
}
