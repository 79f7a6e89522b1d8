use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{SessionId, SubjectId, TaskId, UserId};
use crate::error::ValidationError;

/// Lifecycle state of a study session.
///
///   PLANNED ───────> COMPLETED   (user action)
///      │
///      ├──────────> MISSED      (automatic, end + grace elapsed, unlocked)
///      │
///      └──────────> CANCELED    (user action)
///
/// `Completed`, `Missed` and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Planned,
    Completed,
    Missed,
    Canceled,
}

impl SessionStatus {
    /// Check if a transition is valid.
    pub fn can_transition_to(&self, to: &SessionStatus) -> bool {
        matches!(
            (self, to),
            (
                SessionStatus::Planned,
                SessionStatus::Completed | SessionStatus::Missed | SessionStatus::Canceled
            )
        )
    }

    /// Get valid next states for this state.
    pub fn valid_transitions(&self) -> &[SessionStatus] {
        match self {
            SessionStatus::Planned => &[
                SessionStatus::Completed,
                SessionStatus::Missed,
                SessionStatus::Canceled,
            ],
            _ => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Planned => "planned",
            SessionStatus::Completed => "completed",
            SessionStatus::Missed => "missed",
            SessionStatus::Canceled => "canceled",
        }
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Planned
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(SessionStatus::Planned),
            "completed" => Ok(SessionStatus::Completed),
            "missed" => Ok(SessionStatus::Missed),
            "canceled" => Ok(SessionStatus::Canceled),
            other => Err(ValidationError::invalid("status", format!("unknown status '{other}'"))),
        }
    }
}

/// What kind of work a session is for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    Learn,
    Practice,
    Review,
    Assignment,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Learn => "learn",
            SessionType::Practice => "practice",
            SessionType::Review => "review",
            SessionType::Assignment => "assignment",
        }
    }
}

impl Default for SessionType {
    fn default() -> Self {
        SessionType::Learn
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "learn" => Ok(SessionType::Learn),
            "practice" => Ok(SessionType::Practice),
            "review" => Ok(SessionType::Review),
            "assignment" => Ok(SessionType::Assignment),
            other => Err(ValidationError::invalid(
                "session_type",
                format!("unknown session type '{other}'"),
            )),
        }
    }
}

/// A persisted, time-blocked study session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudySession {
    pub id: SessionId,
    pub user_id: UserId,
    pub subject_id: SubjectId,
    pub task_id: Option<TaskId>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SessionStatus,
    pub session_type: SessionType,
    pub locked: bool,
    pub actual_minutes: Option<u32>,
    pub productivity_rating: Option<u8>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set once the session's minutes have been moved into the makeup queue.
    #[serde(default)]
    pub makeup_queued: bool,
}

impl StudySession {
    /// Create a planned session; rejects `end <= start`.
    pub fn planned(
        user_id: UserId,
        subject_id: SubjectId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if end_time <= start_time {
            return Err(ValidationError::InvalidTimeRange {
                start: start_time,
                end: end_time,
            });
        }
        Ok(Self {
            id: 0,
            user_id,
            subject_id,
            task_id: None,
            start_time,
            end_time,
            status: SessionStatus::Planned,
            session_type: SessionType::Learn,
            locked: false,
            actual_minutes: None,
            productivity_rating: None,
            completed_at: None,
            makeup_queued: false,
        })
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    /// Boolean view of `status` for display layers.
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    /// Minutes actually studied, falling back to the planned duration.
    pub fn actual_or_planned_minutes(&self) -> i64 {
        self.actual_minutes
            .map(i64::from)
            .unwrap_or_else(|| self.duration_minutes())
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && self.end_time > start
    }

    /// Apply a status change, enforcing the lifecycle.
    pub fn transition(&mut self, to: SessionStatus) -> Result<(), ValidationError> {
        if !self.status.can_transition_to(&to) {
            return Err(ValidationError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// How a caller identifies a session at the interface boundary.
///
/// `Id` is the canonical form. `Composite` accepts the legacy
/// `Subject/YYYY-MM-DD/HH:MM` references produced by older calendar views;
/// the store resolves it by subject name and local start time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRef {
    Id(SessionId),
    Composite {
        subject_name: String,
        local_start: NaiveDateTime,
    },
}

impl FromStr for SessionRef {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<SessionId>() {
            return Ok(SessionRef::Id(id));
        }

        // Split from the right so subject names may contain '/'
        let mut parts = s.rsplitn(3, '/');
        let (time, date, subject) = match (parts.next(), parts.next(), parts.next()) {
            (Some(t), Some(d), Some(n)) if !n.is_empty() => (t, d, n),
            _ => {
                return Err(ValidationError::invalid(
                    "session",
                    format!("expected an id or Subject/YYYY-MM-DD/HH:MM, got '{s}'"),
                ))
            }
        };
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| ValidationError::invalid("session", format!("bad date '{date}': {e}")))?;
        let time = NaiveTime::parse_from_str(time, "%H:%M")
            .map_err(|e| ValidationError::invalid("session", format!("bad time '{time}': {e}")))?;

        Ok(SessionRef::Composite {
            subject_name: subject.to_string(),
            local_start: date.and_time(time),
        })
    }
}
