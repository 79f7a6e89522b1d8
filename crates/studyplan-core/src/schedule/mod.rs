//! Data model for subjects, tasks, sessions, preferences and recurring
//! busy times.
//!
//! Every entity carries the owning `user_id`; the store never reads across
//! users and the scheduler only ever sees one user's rows.

mod constraint;
mod preference;
mod session;
mod subject;

pub use constraint::{ClassBlock, UserConstraint};
pub use preference::{PreferredTimes, StudyPreference, TimeOfDay, UserProfile};
pub use session::{SessionRef, SessionStatus, SessionType, StudySession};
pub use subject::{Subject, Task};

pub type UserId = i64;
pub type SubjectId = i64;
pub type TaskId = i64;
pub type SessionId = i64;

/// Default display color for subjects.
pub const DEFAULT_SUBJECT_COLOR: &str = "#3498db";

/// Check a 1-5 rating-style field.
pub(crate) fn check_scale(
    field: &str,
    value: u8,
) -> Result<u8, crate::error::ValidationError> {
    if (1..=5).contains(&value) {
        Ok(value)
    } else {
        Err(crate::error::ValidationError::invalid(
            field,
            format!("must be between 1 and 5, got {value}"),
        ))
    }
}

/// Check a weekday index (0=Mon ... 6=Sun).
pub(crate) fn check_day_of_week(value: u8) -> Result<u8, crate::error::ValidationError> {
    if value <= 6 {
        Ok(value)
    } else {
        Err(crate::error::ValidationError::invalid(
            "day_of_week",
            format!("must be between 0 (Mon) and 6 (Sun), got {value}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_bounds() {
        assert!(check_scale("priority", 1).is_ok());
        assert!(check_scale("priority", 5).is_ok());
        assert!(check_scale("priority", 0).is_err());
        assert!(check_scale("priority", 6).is_err());
    }

    #[test]
    fn weekday_bounds() {
        assert!(check_day_of_week(6).is_ok());
        assert!(check_day_of_week(7).is_err());
    }
}
