//! Missed-session and makeup jobs against an in-memory store.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use studyplan_core::planner::{cleanup_expired_makeup, mark_missed, queue_makeup};
use studyplan_core::{SessionStatus, SessionStore, StudyDb, StudySession, Subject, UserProfile};

fn utc(day: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, h, m, 0).unwrap()
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
}

struct Fixture {
    db: StudyDb,
    user: i64,
    math: i64,
    art: i64,
}

fn fixture() -> Fixture {
    let db = StudyDb::open_memory().unwrap();
    let user = db.upsert_user(&UserProfile::new(0, "Ada")).unwrap();
    let math = db
        .add_subject(&Subject::new(0, user, "Math", 4, 3).unwrap())
        .unwrap();
    let art = db
        .add_subject(&Subject::new(0, user, "Art", 2, 2).unwrap())
        .unwrap();
    Fixture { db, user, math, art }
}

fn session(f: &Fixture, subject: i64, start: DateTime<Utc>, minutes: i64) -> i64 {
    f.db.add_session(
        &StudySession::planned(f.user, subject, start, start + Duration::minutes(minutes)).unwrap(),
    )
    .unwrap()
}

#[test]
fn mark_missed_selects_exactly_the_overdue_sessions() {
    let f = fixture();
    let now = utc(10, 20, 0);
    // Ends 19:30, grace 30 -> overdue exactly at 20:00
    let boundary = session(&f, f.math, utc(10, 18, 0), 90);
    // Ends 19:31 -> one minute short
    let inside_grace = session(&f, f.math, utc(10, 19, 30), 1);
    let locked = session(&f, f.art, utc(10, 9, 0), 60);
    f.db.set_locked(f.user, locked, true).unwrap();
    let canceled = session(&f, f.art, utc(10, 11, 0), 60);
    f.db.cancel_session(f.user, canceled).unwrap();
    let done = session(&f, f.art, utc(10, 13, 0), 60);
    f.db.complete_session(f.user, done, None, Some(3), utc(10, 14, 0))
        .unwrap();
    let future = session(&f, f.math, utc(11, 17, 0), 60);

    assert_eq!(mark_missed(&f.db, f.user, 30, now).unwrap(), 1);

    let missed: Vec<i64> = f
        .db
        .sessions_with_status(f.user, SessionStatus::Missed)
        .unwrap()
        .iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(missed, vec![boundary]);
    for (id, status) in [
        (inside_grace, SessionStatus::Planned),
        (locked, SessionStatus::Planned),
        (canceled, SessionStatus::Canceled),
        (done, SessionStatus::Completed),
        (future, SessionStatus::Planned),
    ] {
        assert_eq!(f.db.get_session(f.user, id).unwrap().status, status);
    }
}

#[test]
fn makeup_minutes_accumulate_without_double_counting() {
    let f = fixture();
    session(&f, f.math, utc(10, 9, 0), 60);
    session(&f, f.math, utc(10, 11, 0), 45);
    session(&f, f.art, utc(10, 13, 0), 30);
    assert_eq!(mark_missed(&f.db, f.user, 30, utc(10, 18, 0)).unwrap(), 3);

    let first = queue_makeup(&f.db, f.user, date(10), 7).unwrap();
    assert_eq!(first.get(&f.math), Some(&105));
    assert_eq!(first.get(&f.art), Some(&30));
    assert!(queue_makeup(&f.db, f.user, date(10), 7).unwrap().is_empty());

    // A later miss extends the live math entry
    session(&f, f.math, utc(12, 9, 0), 60);
    mark_missed(&f.db, f.user, 30, utc(12, 18, 0)).unwrap();
    queue_makeup(&f.db, f.user, date(12), 7).unwrap();

    let entries = f.db.list_makeup(f.user).unwrap();
    assert_eq!(entries.len(), 2);
    let math = entries.iter().find(|e| e.subject_id == f.math).unwrap();
    assert_eq!(math.minutes, 165);
    assert_eq!(math.expires_at, date(19));
    let art = entries.iter().find(|e| e.subject_id == f.art).unwrap();
    assert_eq!(art.expires_at, date(17));
}

#[test]
fn cleanup_removes_exactly_the_expired_entries() {
    let f = fixture();
    f.db.upsert_makeup(f.user, f.math, 60, date(1), date(9)).unwrap();
    f.db.upsert_makeup(f.user, f.art, 30, date(1), date(10)).unwrap();

    let other = f.db.upsert_user(&UserProfile::new(0, "Grace")).unwrap();
    let other_subject = f
        .db
        .add_subject(&Subject::new(0, other, "Chemistry", 3, 3).unwrap())
        .unwrap();
    f.db.upsert_makeup(other, other_subject, 45, date(1), date(8)).unwrap();

    assert_eq!(cleanup_expired_makeup(&f.db, date(10)).unwrap(), 2);
    let left = f.db.list_makeup(f.user).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].subject_id, f.art);
    assert!(f.db.list_makeup(other).unwrap().is_empty());
    assert_eq!(cleanup_expired_makeup(&f.db, date(10)).unwrap(), 0);
}
