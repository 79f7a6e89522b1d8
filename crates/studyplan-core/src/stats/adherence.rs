//! Planned versus actual study time.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::{SessionStatus, StudySession, SubjectId};

/// Planned and studied minutes over a window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannedVsActual {
    pub planned_minutes: i64,
    pub actual_minutes: i64,
    /// `actual / planned` as a percentage, capped at 100.
    pub adherence_rate: f64,
    pub completed_sessions: u32,
    pub planned_sessions: u32,
}

/// Missed sessions for one subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissedStats {
    pub count: u32,
    pub minutes: i64,
}

/// Monday and Sunday of the week containing `today`.
pub fn week_bounds(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    (monday, monday + Duration::days(6))
}

/// Compare planned with studied time for sessions starting in `[start, end)`.
///
/// Canceled sessions are not counted as planned. Studied time uses the
/// recorded actual minutes and falls back to the planned length.
pub fn planned_vs_actual(
    sessions: &[StudySession],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> PlannedVsActual {
    let mut stats = PlannedVsActual::default();
    for session in sessions
        .iter()
        .filter(|s| s.start_time >= start && s.start_time < end)
        .filter(|s| s.status != SessionStatus::Canceled)
    {
        stats.planned_sessions += 1;
        stats.planned_minutes += session.duration_minutes();
        if session.is_completed() {
            stats.completed_sessions += 1;
            stats.actual_minutes += session.actual_or_planned_minutes();
        }
    }

    if stats.planned_minutes > 0 {
        let rate = stats.actual_minutes as f64 / stats.planned_minutes as f64 * 100.0;
        stats.adherence_rate = (rate.min(100.0) * 10.0).round() / 10.0;
    }
    stats
}

/// Missed session count and planned minutes per subject.
pub fn missed_summary(sessions: &[StudySession]) -> BTreeMap<SubjectId, MissedStats> {
    let mut summary: BTreeMap<SubjectId, MissedStats> = BTreeMap::new();
    for session in sessions.iter().filter(|s| s.status == SessionStatus::Missed) {
        let entry = summary.entry(session.subject_id).or_default();
        entry.count += 1;
        entry.minutes += session.duration_minutes();
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, h, 0, 0).unwrap()
    }

    fn session(subject: SubjectId, start: DateTime<Utc>, status: SessionStatus) -> StudySession {
        let mut s = StudySession::planned(1, subject, start, start + Duration::hours(1)).unwrap();
        s.status = status;
        s
    }

    #[test]
    fn week_runs_monday_to_sunday() {
        let wednesday = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        let (monday, sunday) = week_bounds(wednesday);
        assert_eq!(monday, NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
        assert_eq!(sunday, NaiveDate::from_ymd_opt(2025, 3, 16).unwrap());
        assert_eq!(week_bounds(monday).0, monday);
    }

    #[test]
    fn adherence_uses_actual_minutes() {
        let mut short = session(1, at(10, 17), SessionStatus::Completed);
        short.actual_minutes = Some(30);
        let full = session(1, at(11, 17), SessionStatus::Completed);
        let missed = session(2, at(12, 17), SessionStatus::Missed);
        let canceled = session(2, at(13, 17), SessionStatus::Canceled);
        let next_week = session(1, at(17, 17), SessionStatus::Completed);

        let stats = planned_vs_actual(
            &[short, full, missed, canceled, next_week],
            at(10, 0),
            at(17, 0),
        );
        assert_eq!(stats.planned_sessions, 3);
        assert_eq!(stats.planned_minutes, 180);
        assert_eq!(stats.actual_minutes, 90);
        assert_eq!(stats.completed_sessions, 2);
        assert_eq!(stats.adherence_rate, 50.0);
    }

    #[test]
    fn adherence_is_capped() {
        let mut long = session(1, at(10, 17), SessionStatus::Completed);
        long.actual_minutes = Some(150);
        assert_eq!(planned_vs_actual(&[long], at(10, 0), at(17, 0)).adherence_rate, 100.0);
        assert_eq!(planned_vs_actual(&[], at(10, 0), at(17, 0)).adherence_rate, 0.0);
    }

    #[test]
    fn missed_grouped_by_subject() {
        let summary = missed_summary(&[
            session(1, at(10, 17), SessionStatus::Missed),
            session(1, at(11, 17), SessionStatus::Missed),
            session(2, at(12, 17), SessionStatus::Missed),
            session(2, at(13, 17), SessionStatus::Planned),
        ]);
        assert_eq!(summary[&1], MissedStats { count: 2, minutes: 120 });
        assert_eq!(summary[&2], MissedStats { count: 1, minutes: 60 });
    }
}
