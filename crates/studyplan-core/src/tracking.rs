//! Missed-session detection and makeup bookkeeping.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::{SessionStatus, StudySession, SubjectId, UserId};

/// Minutes owed to a subject because sessions were missed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakeupEntry {
    pub id: i64,
    pub user_id: UserId,
    pub subject_id: SubjectId,
    pub minutes: u32,
    /// Last day the entry is live.
    pub expires_at: NaiveDate,
}

impl MakeupEntry {
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expires_at < today
    }
}

/// Finds planned sessions whose grace period has run out.
pub struct MissedSessionTracker {
    grace: Duration,
}

impl MissedSessionTracker {
    pub fn new(grace_minutes: u32) -> Self {
        Self {
            grace: Duration::minutes(i64::from(grace_minutes)),
        }
    }

    /// Whether `session` should move to `Missed` at `now`.
    ///
    /// Locked sessions are never marked automatically.
    pub fn is_overdue(&self, session: &StudySession, now: DateTime<Utc>) -> bool {
        session.status == SessionStatus::Planned
            && !session.locked
            && session.end_time + self.grace <= now
    }

    pub fn overdue<'a>(
        &self,
        sessions: &'a [StudySession],
        now: DateTime<Utc>,
    ) -> Vec<&'a StudySession> {
        sessions.iter().filter(|s| self.is_overdue(s, now)).collect()
    }
}

/// Aggregates missed time into per-subject makeup minutes.
pub struct MakeupQueue;

impl MakeupQueue {
    /// Planned minutes per subject for missed sessions not yet queued.
    pub fn aggregate(missed: &[StudySession]) -> BTreeMap<SubjectId, u32> {
        let mut minutes = BTreeMap::new();
        for session in missed
            .iter()
            .filter(|s| s.status == SessionStatus::Missed && !s.makeup_queued)
        {
            *minutes.entry(session.subject_id).or_insert(0) +=
                session.duration_minutes().max(0) as u32;
        }
        minutes
    }

    /// Expiry date for minutes queued on `today`.
    pub fn expiry(today: NaiveDate, expiry_days: u32) -> NaiveDate {
        today + Duration::days(i64::from(expiry_days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap()
    }

    fn session(subject: SubjectId, start: DateTime<Utc>, minutes: i64) -> StudySession {
        StudySession::planned(1, subject, start, start + Duration::minutes(minutes)).unwrap()
    }

    #[test]
    fn overdue_respects_grace_and_lock() {
        let tracker = MissedSessionTracker::new(30);
        let ended_at_ten = session(1, at(9, 0), 60);
        let mut locked = session(1, at(8, 0), 60);
        locked.locked = true;
        let mut completed = session(1, at(7, 0), 60);
        completed.status = SessionStatus::Completed;

        assert!(!tracker.is_overdue(&ended_at_ten, at(10, 29)));
        assert!(tracker.is_overdue(&ended_at_ten, at(10, 30)));

        let all = vec![ended_at_ten, locked, completed];
        let overdue = tracker.overdue(&all, at(12, 0));
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].start_time, at(9, 0));
    }

    #[test]
    fn aggregate_skips_already_queued() {
        let mut a = session(1, at(9, 0), 60);
        let mut b = session(1, at(11, 0), 45);
        let mut c = session(2, at(13, 0), 30);
        let mut queued = session(2, at(15, 0), 90);
        for s in [&mut a, &mut b, &mut c, &mut queued] {
            s.status = SessionStatus::Missed;
        }
        queued.makeup_queued = true;

        let totals = MakeupQueue::aggregate(&[a, b, c, queued]);
        assert_eq!(totals.get(&1), Some(&105));
        assert_eq!(totals.get(&2), Some(&30));
    }

    #[test]
    fn expiry_is_inclusive() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let entry = MakeupEntry {
            id: 1,
            user_id: 1,
            subject_id: 1,
            minutes: 60,
            expires_at: MakeupQueue::expiry(today, 7),
        };
        assert!(!entry.is_expired(today + Duration::days(7)));
        assert!(entry.is_expired(today + Duration::days(8)));
    }
}
